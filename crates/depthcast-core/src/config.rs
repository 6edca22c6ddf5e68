use std::path::PathBuf;
use std::time::Duration;

/// Receiver-side session configuration, assembled from the CLI surface.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceiverConfig {
    /// Base URL of the device's signaling host (scheme always present).
    pub server_url: String,
    /// Output file for received video (raw H.264 elementary stream).
    /// `None` means received video is discarded.
    pub record_to: Option<PathBuf>,
    /// Open a live video window showing the stream.
    pub visualize: bool,
    /// How often to re-check the ICE gathering state during negotiation.
    pub ice_poll_interval: Duration,
    /// Abort negotiation if ICE gathering has not completed by then.
    pub ice_gather_timeout: Duration,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1".to_string(),
            record_to: None,
            visualize: false,
            ice_poll_interval: Duration::from_millis(100),
            ice_gather_timeout: Duration::from_secs(10),
        }
    }
}

/// Prefixes `http://` when the operator passed a bare address.
pub fn normalize_server_url(addr: &str) -> String {
    if addr.starts_with("http://") || addr.starts_with("https://") {
        addr.to_string()
    } else {
        format!("http://{addr}")
    }
}
