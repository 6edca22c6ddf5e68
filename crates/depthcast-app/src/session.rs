//! Session manager: event-driven glue between the negotiated peer
//! connection and the sinks, plus orderly teardown.
//!
//! # Flow
//! 1. Create the peer and subscribe its event stream (before negotiation,
//!    so an early track arrival is queued, not lost)
//! 2. Run the offer/answer exchange; bail out cleanly if no offer exists
//! 3. Service events until interrupted or the connection ends:
//!    each video track gets its own frame pump task
//! 4. Tear down in order: pumps → display → peer connection → recorder
//!
//! Teardown consumes the session's resources, so it can only run once per
//! session; the underlying stops (`RecordingSink::stop`, peer close) are
//! individually idempotent on top of that.

use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use depthcast_core::{EncodedFrame, ReceiverConfig, TrackKind};
use depthcast_peer::{negotiate, FrameSource, IceWait, NegotiationOutcome, PeerEvent, ReceiverPeer};
use depthcast_signaling::SignalingClient;
use depthcast_sink::{DisplayPipeline, RecordingSink};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// A pump gives up once this many reads fail back-to-back, so a broken
/// track cannot spin a tight error loop forever.
const MAX_CONSECUTIVE_FRAME_ERRORS: u32 = 10;

pub async fn run(config: ReceiverConfig) -> Result<()> {
    let signaling = SignalingClient::new(config.server_url.clone());
    let peer = ReceiverPeer::new()
        .await
        .context("failed to create peer connection")?;

    // Handlers first: no track or state event fired during negotiation is lost.
    let mut events = peer.subscribe_events();

    let ice = IceWait {
        poll_interval: config.ice_poll_interval,
        timeout: config.ice_gather_timeout,
    };
    let outcome = match negotiate(&signaling, &peer, ice).await {
        Ok(outcome) => outcome,
        Err(e) => {
            peer.close().await;
            return Err(e).context("negotiation failed");
        }
    };
    if outcome == NegotiationOutcome::Aborted {
        peer.close().await;
        info!("No session available; exiting.");
        return Ok(());
    }

    // Created only after negotiation succeeds: an aborted run leaves no file.
    let recorder = Arc::new(Mutex::new(match &config.record_to {
        Some(path) => RecordingSink::to_file(path),
        None => RecordingSink::discard(),
    }));

    let (shutdown_tx, shutdown_rx) = watch::channel(true);
    let mut pumps: Vec<JoinHandle<PumpStats>> = Vec::new();
    let mut display: Option<DisplayFeed> = None;
    let mut fatal: Option<anyhow::Error> = None;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let reason = loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("Interrupt received, shutting down");
                break "interrupted";
            }

            event = events.recv() => match event {
                Some(PeerEvent::TrackArrived { kind, id, source }) => {
                    info!("Received {kind} track ({id})");
                    if kind != TrackKind::Video {
                        // Accepted but unsinked; the device also sends audio
                        // we have no use for.
                        continue;
                    }
                    if let Err(e) = recorder.lock().unwrap().start() {
                        fatal = Some(
                            anyhow::Error::new(e).context("failed to start recording sink"),
                        );
                        break "recorder_error";
                    }
                    if config.visualize && display.is_none() {
                        display = Some(DisplayFeed::spawn());
                    }
                    let feed = display.as_ref().map(|d| d.sender());
                    pumps.push(tokio::spawn(run_pump(
                        source,
                        id,
                        Arc::clone(&recorder),
                        feed,
                        shutdown_rx.clone(),
                    )));
                }
                Some(PeerEvent::DataChannelOpened { label }) => {
                    info!("Received data channel: {label}");
                }
                Some(PeerEvent::ConnectionStateChanged(state)) => {
                    info!("Peer connection state: {state}");
                    if state.is_terminal() {
                        break "connection_ended";
                    }
                }
                None => break "event_stream_closed",
            }
        }
    };

    info!("Session ending ({reason})");
    teardown(shutdown_tx, pumps, display, &peer, &recorder).await;

    match fatal {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

// MARK: - Teardown

/// Stop order matters: pumps and display go first so no sink is handed a
/// frame after its source, the connection releases the transport next, and
/// the recorder flushes last.
async fn teardown(
    shutdown_tx: watch::Sender<bool>,
    pumps: Vec<JoinHandle<PumpStats>>,
    display: Option<DisplayFeed>,
    peer: &ReceiverPeer,
    recorder: &Arc<Mutex<RecordingSink>>,
) {
    let _ = shutdown_tx.send(false);
    for pump in pumps {
        match pump.await {
            Ok(stats) => debug!("Frame pump finished with {} frame(s)", stats.frames),
            Err(e) => warn!("Frame pump task failed: {e}"),
        }
    }

    if let Some(display) = display {
        display.shutdown().await;
    }

    peer.close().await;

    if let Err(e) = recorder.lock().unwrap().stop() {
        warn!("Recorder stop failed: {e}");
    }
}

// MARK: - Frame pump

struct PumpStats {
    frames: u64,
}

/// Reads frames off one video track until the track ends, the shutdown flag
/// flips, or too many consecutive reads fail. Every retrieved frame goes to
/// the recorder; the display feed gets a copy for as long as it is alive.
async fn run_pump(
    mut source: Box<dyn FrameSource>,
    track_id: String,
    recorder: Arc<Mutex<RecordingSink>>,
    mut display_tx: Option<mpsc::Sender<EncodedFrame>>,
    mut shutdown: watch::Receiver<bool>,
) -> PumpStats {
    let mut frames: u64 = 0;
    let mut consecutive_errors: u32 = 0;

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || !*shutdown.borrow() {
                    break;
                }
            }

            read = source.next_frame() => match read {
                Ok(Some(frame)) => {
                    consecutive_errors = 0;
                    frames += 1;
                    if frames == 1 {
                        info!("Track {track_id}: first frame received");
                    } else if frames % 300 == 0 {
                        info!("Track {track_id}: {frames} frames received");
                    }

                    if let Some(tx) = &display_tx {
                        match tx.try_send(frame.clone()) {
                            Ok(()) => {}
                            // Display lagging behind the stream; skip the frame.
                            Err(mpsc::error::TrySendError::Full(_)) => {}
                            Err(mpsc::error::TrySendError::Closed(_)) => {
                                info!("Track {track_id}: display gone, continuing without it");
                                display_tx = None;
                            }
                        }
                    }

                    if let Err(e) = recorder.lock().unwrap().write_frame(&frame) {
                        warn!("Track {track_id}: recorder write failed: {e}");
                    }
                }
                Ok(None) => {
                    info!("Track {track_id} ended after {frames} frame(s)");
                    break;
                }
                Err(e) => {
                    consecutive_errors += 1;
                    warn!("Track {track_id}: frame error ({consecutive_errors} consecutive): {e}");
                    if consecutive_errors >= MAX_CONSECUTIVE_FRAME_ERRORS {
                        warn!("Track {track_id}: giving up after repeated frame errors");
                        break;
                    }
                }
            }
        }
    }

    PumpStats { frames }
}

// MARK: - Display feed

/// Owns the blocking display thread and the channel feeding it.
///
/// GStreamer wants the window and its message loop on a single OS thread,
/// so frames cross over an mpsc channel into `spawn_blocking`. Closing the
/// channel (or the window) ends the thread.
struct DisplayFeed {
    tx: mpsc::Sender<EncodedFrame>,
    thread: JoinHandle<()>,
}

impl DisplayFeed {
    fn spawn() -> Self {
        let (tx, mut rx) = mpsc::channel::<EncodedFrame>(64);
        let thread = tokio::task::spawn_blocking(move || {
            let mut pipeline = match DisplayPipeline::open() {
                Ok(pipeline) => pipeline,
                Err(e) => {
                    warn!("Display unavailable: {e}");
                    return;
                }
            };

            while let Some(frame) = rx.blocking_recv() {
                if !pipeline.is_alive() {
                    info!("Display window closed");
                    break;
                }
                if let Err(e) = pipeline.push_frame(&frame) {
                    warn!("Error displaying video: {e}");
                }
            }

            pipeline.close();
            info!("Display loop exited after {} frame(s)", pipeline.frames_pushed());
        });

        Self { tx, thread }
    }

    fn sender(&self) -> mpsc::Sender<EncodedFrame> {
        self.tx.clone()
    }

    async fn shutdown(self) {
        drop(self.tx);
        if let Err(e) = self.thread.await {
            warn!("Display thread failed: {e}");
        }
    }
}
