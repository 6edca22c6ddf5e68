//! `webrtc`-crate-backed peer connection for the receiving side.
//!
//! One `ReceiverPeer` exists per process run. Lifecycle events are fanned in
//! to a single mpsc channel consumed by the session manager, so handler
//! registration is one call that must happen before negotiation starts.

use std::sync::Arc;

use depthcast_core::{LinkState, NegotiationError, SessionPayload, TrackKind};
use tokio::sync::mpsc;
use tracing::{info, warn};

use async_trait::async_trait;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_gathering_state::RTCIceGatheringState;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;

use crate::negotiate::NegotiationTarget;
use crate::track::{FrameSource, TrackFrameSource};

// MARK: - PeerEvent

/// Lifecycle events surfaced to the session manager.
pub enum PeerEvent {
    TrackArrived {
        kind: TrackKind,
        id: String,
        source: Box<dyn FrameSource>,
    },
    DataChannelOpened {
        label: String,
    },
    ConnectionStateChanged(LinkState),
}

// MARK: - ReceiverPeer

pub struct ReceiverPeer {
    pc: Arc<RTCPeerConnection>,
}

impl ReceiverPeer {
    /// Builds the engine (default codecs + default interceptors) and opens a
    /// fresh, unnegotiated peer connection.
    pub async fn new() -> Result<Self, NegotiationError> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs().map_err(engine_err)?;

        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine).map_err(engine_err)?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let pc = api
            .new_peer_connection(RTCConfiguration::default())
            .await
            .map_err(engine_err)?;

        Ok(Self { pc: Arc::new(pc) })
    }

    /// Registers every lifecycle handler and returns the event stream.
    ///
    /// Must be called before `negotiate` so early track and state events are
    /// queued rather than lost.
    pub fn subscribe_events(&self) -> mpsc::Receiver<PeerEvent> {
        let (tx, rx) = mpsc::channel(32);

        let track_tx = tx.clone();
        self.pc.on_track(Box::new(move |track, _receiver, _transceiver| {
            let tx = track_tx.clone();
            Box::pin(async move {
                let kind = track_kind(track.kind());
                let id = track.id();
                let source = Box::new(TrackFrameSource::new(track));
                let _ = tx.send(PeerEvent::TrackArrived { kind, id, source }).await;
            })
        }));

        let dc_tx = tx.clone();
        self.pc.on_data_channel(Box::new(move |channel| {
            let tx = dc_tx.clone();
            Box::pin(async move {
                let _ = tx
                    .send(PeerEvent::DataChannelOpened { label: channel.label().to_string() })
                    .await;
            })
        }));

        let state_tx = tx;
        self.pc
            .on_peer_connection_state_change(Box::new(move |state| {
                let tx = state_tx.clone();
                Box::pin(async move {
                    let _ = tx
                        .send(PeerEvent::ConnectionStateChanged(link_state(state)))
                        .await;
                })
            }));

        // Observability only: these never drive control flow.
        self.pc.on_ice_connection_state_change(Box::new(move |state| {
            Box::pin(async move {
                info!("ICE connection state: {state}");
            })
        }));
        self.pc.on_ice_gathering_state_change(Box::new(move |state| {
            Box::pin(async move {
                info!("ICE gathering state: {state}");
            })
        }));

        rx
    }

    /// Releases the transport. The underlying close is idempotent.
    pub async fn close(&self) {
        if let Err(e) = self.pc.close().await {
            warn!("Peer connection close reported: {e}");
        }
    }
}

fn engine_err(e: impl std::fmt::Display) -> NegotiationError {
    NegotiationError::Engine(e.to_string())
}

fn track_kind(kind: RTPCodecType) -> TrackKind {
    match kind {
        RTPCodecType::Video => TrackKind::Video,
        RTPCodecType::Audio => TrackKind::Audio,
        _ => TrackKind::Unknown,
    }
}

fn link_state(state: RTCPeerConnectionState) -> LinkState {
    match state {
        RTCPeerConnectionState::New => LinkState::New,
        RTCPeerConnectionState::Connecting => LinkState::Connecting,
        RTCPeerConnectionState::Connected => LinkState::Connected,
        RTCPeerConnectionState::Disconnected => LinkState::Disconnected,
        RTCPeerConnectionState::Failed => LinkState::Failed,
        RTCPeerConnectionState::Closed => LinkState::Closed,
        _ => LinkState::New,
    }
}

// MARK: - NegotiationTarget impl

#[async_trait]
impl NegotiationTarget for ReceiverPeer {
    async fn apply_remote_offer(&self, offer: SessionPayload) -> Result<(), NegotiationError> {
        let desc = RTCSessionDescription::offer(offer.sdp).map_err(engine_err)?;
        self.pc.set_remote_description(desc).await.map_err(engine_err)
    }

    async fn create_answer(&self) -> Result<SessionPayload, NegotiationError> {
        let answer = self.pc.create_answer(None).await.map_err(engine_err)?;
        Ok(SessionPayload::answer(answer.sdp))
    }

    async fn commit_local_answer(&self, answer: SessionPayload) -> Result<(), NegotiationError> {
        let desc = RTCSessionDescription::answer(answer.sdp).map_err(engine_err)?;
        self.pc.set_local_description(desc).await.map_err(engine_err)
    }

    fn ice_gathering_complete(&self) -> bool {
        self.pc.ice_gathering_state() == RTCIceGatheringState::Complete
    }

    async fn final_local_description(&self) -> Option<SessionPayload> {
        self.pc
            .local_description()
            .await
            .map(|desc| SessionPayload::answer(desc.sdp))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_types_map_to_track_kinds() {
        assert_eq!(track_kind(RTPCodecType::Video), TrackKind::Video);
        assert_eq!(track_kind(RTPCodecType::Audio), TrackKind::Audio);
        assert_eq!(track_kind(RTPCodecType::Unspecified), TrackKind::Unknown);
    }

    #[test]
    fn terminal_connection_states_map_as_terminal() {
        assert!(link_state(RTCPeerConnectionState::Failed).is_terminal());
        assert!(link_state(RTCPeerConnectionState::Closed).is_terminal());
        assert!(!link_state(RTCPeerConnectionState::Connected).is_terminal());
        assert!(!link_state(RTCPeerConnectionState::Disconnected).is_terminal());
    }
}
