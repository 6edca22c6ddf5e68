//! WebRTC peer side of the receiver: engine construction, lifecycle event
//! fan-in, the offer/answer negotiation state machine and the per-track
//! frame source.

pub mod negotiate;
pub mod peer;
pub mod track;

pub use negotiate::{negotiate, IceWait, NegotiationOutcome, NegotiationTarget};
pub use peer::{PeerEvent, ReceiverPeer};
pub use track::{FrameError, FrameSource, TrackFrameSource};
