//! Per-track frame source: RTP packets in, H.264 access units out.
//!
//! `read_rtp` hands back raw RTP payloads, so video needs FU-A/STAP-A
//! reassembly (RFC 6184) before a sink can use it. The `webrtc` crate's
//! H.264 depacketizer emits Annex B NAL units; packets belonging to one
//! access unit are accumulated until the RTP marker bit closes it.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use depthcast_core::EncodedFrame;
use thiserror::Error;
use tracing::debug;
use webrtc::rtp::codecs::h264::H264Packet;
use webrtc::rtp::packetizer::Depacketizer;
use webrtc::track::track_remote::TrackRemote;

use std::sync::Arc;

/// RTP video clock rate (RFC 6184).
const VIDEO_CLOCK_HZ: u64 = 90_000;

// MARK: - FrameSource trait

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("Failed to depacketize RTP payload: {0}")]
    Depacketize(String),
}

/// A live, ordered sequence of frames read off one inbound track.
///
/// `Ok(None)` is the terminal read: the track yields no more frames and the
/// pump loop must exit. An `Err` is a single failed read; the caller logs it
/// and keeps reading.
#[async_trait]
pub trait FrameSource: Send {
    async fn next_frame(&mut self) -> Result<Option<EncodedFrame>, FrameError>;
}

// MARK: - TrackFrameSource

/// `FrameSource` over a remote webrtc track.
pub struct TrackFrameSource {
    track: Arc<TrackRemote>,
    depacketizer: H264Packet,
    assembler: AccessUnitAssembler,
}

impl TrackFrameSource {
    pub fn new(track: Arc<TrackRemote>) -> Self {
        Self {
            track,
            depacketizer: H264Packet::default(),
            assembler: AccessUnitAssembler::new(),
        }
    }
}

#[async_trait]
impl FrameSource for TrackFrameSource {
    async fn next_frame(&mut self) -> Result<Option<EncodedFrame>, FrameError> {
        loop {
            let (packet, _attributes) = match self.track.read_rtp().await {
                Ok(read) => read,
                Err(e) => {
                    // Terminal: the underlying connection closed the track.
                    debug!("Track {} read ended: {e}", self.track.id());
                    return Ok(None);
                }
            };

            let chunk = self
                .depacketizer
                .depacketize(&packet.payload)
                .map_err(|e| FrameError::Depacketize(e.to_string()))?;

            if let Some(frame) =
                self.assembler
                    .push(chunk, packet.header.timestamp, packet.header.marker)
            {
                return Ok(Some(frame));
            }
        }
    }
}

// MARK: - AccessUnitAssembler

/// Accumulates depacketized Annex B chunks into whole access units.
///
/// An FU-A fragment that is not yet complete depacketizes to an empty chunk;
/// the marker bit on the last packet of an access unit closes the frame.
struct AccessUnitAssembler {
    buffer: BytesMut,
    timestamp: u32,
}

impl AccessUnitAssembler {
    fn new() -> Self {
        Self { buffer: BytesMut::new(), timestamp: 0 }
    }

    fn push(&mut self, chunk: Bytes, rtp_timestamp: u32, marker: bool) -> Option<EncodedFrame> {
        if !chunk.is_empty() {
            if self.buffer.is_empty() {
                self.timestamp = rtp_timestamp;
            }
            self.buffer.extend_from_slice(&chunk);
        }

        if !marker || self.buffer.is_empty() {
            return None;
        }

        let data = self.buffer.split().freeze();
        Some(EncodedFrame {
            is_keyframe: contains_idr(&data),
            timestamp_us: rtp_to_us(self.timestamp),
            data,
        })
    }
}

fn rtp_to_us(timestamp: u32) -> u64 {
    timestamp as u64 * 1_000_000 / VIDEO_CLOCK_HZ
}

/// Scans Annex B data for an IDR slice or SPS (NAL types 5 and 7).
fn contains_idr(data: &[u8]) -> bool {
    let mut i = 0;
    while i + 3 < data.len() {
        let start_code_len = if data[i] == 0 && data[i + 1] == 0 && data[i + 2] == 1 {
            3
        } else if i + 4 < data.len()
            && data[i] == 0
            && data[i + 1] == 0
            && data[i + 2] == 0
            && data[i + 3] == 1
        {
            4
        } else {
            i += 1;
            continue;
        };

        if let Some(&nal_header) = data.get(i + start_code_len) {
            let nal_type = nal_header & 0x1f;
            if nal_type == 5 || nal_type == 7 {
                return true;
            }
        }
        i += start_code_len;
    }
    false
}
