use thiserror::Error;

#[derive(Error, Debug)]
pub enum SignalingError {
    #[error("Signaling endpoint unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Malformed signaling payload: {reason}")]
    MalformedPayload { reason: String },
}

#[derive(Error, Debug)]
pub enum NegotiationError {
    #[error("Retrieved offer is not usable: {reason}")]
    MalformedOffer { reason: String },

    #[error("Negotiation engine error: {0}")]
    Engine(String),

    #[error("ICE gathering did not complete within {ms}ms")]
    IceGatherTimeout { ms: u64 },
}

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Recording I/O error: {0}")]
    Recording(#[from] std::io::Error),

    #[error("Failed to open display pipeline: {0}")]
    DisplayInit(String),

    #[error("Display rejected frame: {0}")]
    DisplayPush(String),
}
