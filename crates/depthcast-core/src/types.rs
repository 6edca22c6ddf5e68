use serde::{Deserialize, Serialize};

// MARK: - SdpKind

/// Which half of the offer/answer exchange a session description is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    Offer,
    Answer,
}

impl std::fmt::Display for SdpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Offer => write!(f, "offer"),
            Self::Answer => write!(f, "answer"),
        }
    }
}

// MARK: - SessionPayload

/// A session description as it travels over the signaling channel.
///
/// Serializes to the device's wire shape: `{"type": "offer", "sdp": "v=0..."}`.
/// The answer we post back uses the same two field names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionPayload {
    #[serde(rename = "type")]
    pub kind: SdpKind,
    pub sdp: String,
}

impl SessionPayload {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self { kind: SdpKind::Offer, sdp: sdp.into() }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self { kind: SdpKind::Answer, sdp: sdp.into() }
    }

    /// An offer we can actually negotiate against: right kind, non-empty body.
    pub fn is_usable_offer(&self) -> bool {
        self.kind == SdpKind::Offer && !self.sdp.trim().is_empty()
    }
}

// MARK: - NegotiationState

/// Progress of one offer/answer exchange. Transitions are one-directional;
/// `Aborted` is the only terminal failure state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationState {
    Idle,
    RemoteSet,
    AnswerCreated,
    LocalSet,
    IceGathering,
    IceComplete,
    AnswerSent,
    Established,
    Aborted,
}

impl std::fmt::Display for NegotiationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

// MARK: - TrackKind

/// Media kind of an inbound track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Video,
    Audio,
    Unknown,
}

impl std::fmt::Display for TrackKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Video => write!(f, "video"),
            Self::Audio => write!(f, "audio"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

// MARK: - LinkState

/// Peer connection lifecycle as surfaced to the session manager.
///
/// `Disconnected` is not terminal: the transport may still recover the path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl LinkState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Failed | Self::Closed)
    }
}

impl std::fmt::Display for LinkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

// MARK: - EncodedFrame

/// One H.264 access unit (Annex B) received from the peer.
///
/// Frames are transient: the track source hands ownership to the pump, which
/// hands it to the sinks. `data` is a cheap refcounted handle.
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    pub data: bytes::Bytes,
    pub timestamp_us: u64,
    pub is_keyframe: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offer_payload_deserializes_device_shape() {
        let json = r#"{"type": "offer", "sdp": "v=0\r\no=- 0 0 IN IP4 0.0.0.0\r\n"}"#;
        let payload: SessionPayload = serde_json::from_str(json).expect("valid offer payload");
        assert_eq!(payload.kind, SdpKind::Offer);
        assert!(payload.sdp.starts_with("v=0"));
        assert!(payload.is_usable_offer());
    }

    #[test]
    fn answer_payload_serializes_type_and_sdp_fields() {
        let json = serde_json::to_value(SessionPayload::answer("v=0")).unwrap();
        assert_eq!(json["type"], "answer");
        assert_eq!(json["sdp"], "v=0");
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let json = r#"{"type": "pranswer", "sdp": "v=0"}"#;
        assert!(serde_json::from_str::<SessionPayload>(json).is_err());
    }

    #[test]
    fn answer_or_empty_body_is_not_a_usable_offer() {
        assert!(!SessionPayload::answer("v=0").is_usable_offer());
        assert!(!SessionPayload::offer("   ").is_usable_offer());
    }
}
