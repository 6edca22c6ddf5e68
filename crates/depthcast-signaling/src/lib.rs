//! HTTP signaling client (receiver role).
//!
//! The streaming device exposes a minimal polling handshake, not a persistent
//! channel: one GET to fetch its pending offer, one POST to hand back our
//! answer. All ICE candidates are gathered before the answer is posted, so
//! nothing else ever travels over this channel (non-trickle).
//!
//! # Lifecycle
//!
//! ```text
//! 1. SignalingClient::new(base_url)
//! 2. client.retrieve_offer()          ← GET  {base}/getOffer
//! 3. client.send_answer(&answer)      ← POST {base}/answer  (fire-and-forget)
//! ```
//!
//! Transport failures are logged and absorbed here: an unreachable host turns
//! into "no offer available" on the fetch side, and into a warning on the
//! post side. The device applies the answer asynchronously, so the caller
//! never blocks on the POST having succeeded.

use async_trait::async_trait;
use depthcast_core::SessionPayload;
use tracing::{debug, warn};

// MARK: - Signaling trait

/// The negotiation coordinator's view of the signaling exchange.
#[async_trait]
pub trait Signaling: Send + Sync {
    /// Fetch the device's pending offer. `None` means "no session available"
    /// (host unreachable, non-2xx status, or a body that is not an offer).
    async fn retrieve_offer(&self) -> Option<SessionPayload>;

    /// Post the local answer. Failures are logged, never raised.
    async fn send_answer(&self, answer: &SessionPayload);
}

// MARK: - SignalingClient

pub struct SignalingClient {
    base_url: String,
    http: reqwest::Client,
}

impl SignalingClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            http: reqwest::Client::new(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl Signaling for SignalingClient {
    async fn retrieve_offer(&self) -> Option<SessionPayload> {
        let url = self.endpoint("getOffer");
        let resp = match self.http.get(&url).send().await {
            Ok(resp) => resp,
            Err(e) => {
                warn!("Error while requesting an offer from {url}: {e}");
                return None;
            }
        };

        let status = resp.status();
        if !status.is_success() {
            warn!("Offer request to {url} answered with {status}");
            return None;
        }

        match resp.json::<SessionPayload>().await {
            Ok(payload) => {
                debug!("Retrieved {} ({} bytes of SDP)", payload.kind, payload.sdp.len());
                Some(payload)
            }
            Err(e) => {
                warn!("Offer response from {url} was not a session payload: {e}");
                None
            }
        }
    }

    async fn send_answer(&self, answer: &SessionPayload) {
        let url = self.endpoint("answer");
        match self.http.post(&url).json(answer).send().await {
            Ok(resp) => {
                let status = resp.status();
                // Body is read and discarded; only the status matters for logging.
                let _ = resp.bytes().await;
                if status.is_success() {
                    debug!("Answer accepted by {url}");
                } else {
                    warn!("Answer post to {url} answered with {status}");
                }
            }
            Err(e) => {
                warn!("Error while sending the answer to {url}: {e}");
            }
        }
    }
}
