//! Offer/answer negotiation state machine.
//!
//! ```text
//! Idle → RemoteSet → AnswerCreated → LocalSet → IceGathering
//!      → IceComplete → AnswerSent → Established
//! ```
//!
//! `Aborted` is the one terminal failure state, entered only when the
//! signaling host has no offer for us; the caller exits cleanly without a
//! session. Everything else that goes wrong is a hard `NegotiationError`.
//!
//! ICE runs non-trickle: the answer is not posted until the gathering state
//! reports complete, so the posted SDP carries every candidate line.

use std::time::Duration;

use async_trait::async_trait;
use depthcast_core::{NegotiationError, NegotiationState, SessionPayload};
use depthcast_signaling::Signaling;
use tracing::{info, warn};

// MARK: - NegotiationTarget trait

/// The coordinator's view of the peer connection. One production impl
/// (`ReceiverPeer`); test impls drive the state machine without a network.
#[async_trait]
pub trait NegotiationTarget: Send + Sync {
    /// Commit the retrieved offer as the remote description.
    async fn apply_remote_offer(&self, offer: SessionPayload) -> Result<(), NegotiationError>;

    /// Ask the engine for an answer matching the committed remote offer.
    async fn create_answer(&self) -> Result<SessionPayload, NegotiationError>;

    /// Commit the answer as the local description. Kicks off ICE gathering.
    async fn commit_local_answer(&self, answer: SessionPayload) -> Result<(), NegotiationError>;

    /// Monotonic: once true, never false again within this negotiation.
    fn ice_gathering_complete(&self) -> bool;

    /// The finalized local description, candidate lines included.
    async fn final_local_description(&self) -> Option<SessionPayload>;
}

// MARK: - IceWait

/// Bounds on the ICE gathering wait.
#[derive(Debug, Clone, Copy)]
pub struct IceWait {
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl Default for IceWait {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            timeout: Duration::from_secs(10),
        }
    }
}

// MARK: - Outcome

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationOutcome {
    /// Answer posted; the session is live and tracks may start arriving.
    Established,
    /// No offer was available. No connection was negotiated, no answer sent.
    Aborted,
}

// MARK: - negotiate

/// Drives one complete offer/answer exchange.
///
/// The caller must have registered its event handlers on the peer before
/// calling this, so nothing fired during or right after negotiation is lost.
pub async fn negotiate<S, P>(
    signaling: &S,
    peer: &P,
    ice: IceWait,
) -> Result<NegotiationOutcome, NegotiationError>
where
    S: Signaling + ?Sized,
    P: NegotiationTarget + ?Sized,
{
    let mut state = NegotiationState::Idle;

    let offer = match signaling.retrieve_offer().await {
        Some(offer) => offer,
        None => {
            warn!("No offer available from the signaling host; aborting");
            advance(&mut state, NegotiationState::Aborted);
            return Ok(NegotiationOutcome::Aborted);
        }
    };

    if !offer.is_usable_offer() {
        return Err(NegotiationError::MalformedOffer {
            reason: format!("kind={}, {} bytes of SDP", offer.kind, offer.sdp.len()),
        });
    }

    peer.apply_remote_offer(offer).await?;
    advance(&mut state, NegotiationState::RemoteSet);

    let answer = peer.create_answer().await?;
    advance(&mut state, NegotiationState::AnswerCreated);

    peer.commit_local_answer(answer).await?;
    advance(&mut state, NegotiationState::LocalSet);

    // Committing the local description starts gathering as a side effect.
    advance(&mut state, NegotiationState::IceGathering);
    let started = tokio::time::Instant::now();
    loop {
        if peer.ice_gathering_complete() {
            break;
        }
        if started.elapsed() >= ice.timeout {
            return Err(NegotiationError::IceGatherTimeout {
                ms: ice.timeout.as_millis() as u64,
            });
        }
        tokio::time::sleep(ice.poll_interval).await;
    }
    advance(&mut state, NegotiationState::IceComplete);

    let answer = peer.final_local_description().await.ok_or_else(|| {
        NegotiationError::Engine("local description missing after ICE completion".to_string())
    })?;

    signaling.send_answer(&answer).await;
    advance(&mut state, NegotiationState::AnswerSent);
    info!("Finished ICE candidate lookup, answer sent");

    advance(&mut state, NegotiationState::Established);
    Ok(NegotiationOutcome::Established)
}

fn advance(state: &mut NegotiationState, next: NegotiationState) {
    info!("Negotiation: {state} -> {next}");
    *state = next;
}

#[cfg(test)]
mod tests {
    use super::*;
    use depthcast_core::SdpKind;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeSignaling {
        offer: Option<SessionPayload>,
        sent: Mutex<Vec<SessionPayload>>,
    }

    #[async_trait]
    impl Signaling for FakeSignaling {
        async fn retrieve_offer(&self) -> Option<SessionPayload> {
            self.offer.clone()
        }

        async fn send_answer(&self, answer: &SessionPayload) {
            self.sent.lock().unwrap().push(answer.clone());
        }
    }

    /// Reports ICE gathering complete after `gathering_polls` checks.
    struct FakePeer {
        gathering_polls: usize,
        polls_seen: AtomicUsize,
        engine_calls: AtomicUsize,
        fail_create_answer: bool,
    }

    impl FakePeer {
        fn completing_after(polls: usize) -> Self {
            Self {
                gathering_polls: polls,
                polls_seen: AtomicUsize::new(0),
                engine_calls: AtomicUsize::new(0),
                fail_create_answer: false,
            }
        }
    }

    #[async_trait]
    impl NegotiationTarget for FakePeer {
        async fn apply_remote_offer(&self, offer: SessionPayload) -> Result<(), NegotiationError> {
            assert_eq!(offer.kind, SdpKind::Offer);
            self.engine_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn create_answer(&self) -> Result<SessionPayload, NegotiationError> {
            self.engine_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_create_answer {
                return Err(NegotiationError::Engine("no codec intersection".into()));
            }
            Ok(SessionPayload::answer("v=0\r\n"))
        }

        async fn commit_local_answer(&self, answer: SessionPayload) -> Result<(), NegotiationError> {
            assert_eq!(answer.kind, SdpKind::Answer);
            self.engine_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn ice_gathering_complete(&self) -> bool {
            let seen = self.polls_seen.fetch_add(1, Ordering::SeqCst) + 1;
            seen >= self.gathering_polls
        }

        async fn final_local_description(&self) -> Option<SessionPayload> {
            Some(SessionPayload::answer(
                "v=0\r\na=candidate:1 1 udp 2130706431 10.0.0.1 51000 typ host\r\n",
            ))
        }
    }

    fn fast_ice() -> IceWait {
        IceWait { poll_interval: Duration::from_millis(100), timeout: Duration::from_secs(5) }
    }

    #[tokio::test(start_paused = true)]
    async fn valid_offer_reaches_established_and_sends_one_answer() {
        let signaling = FakeSignaling {
            offer: Some(SessionPayload::offer("v=0\r\n")),
            ..Default::default()
        };
        let peer = FakePeer::completing_after(1);

        let outcome = negotiate(&signaling, &peer, fast_ice()).await.unwrap();

        assert_eq!(outcome, NegotiationOutcome::Established);
        let sent = signaling.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].kind, SdpKind::Answer);
        assert!(sent[0].sdp.contains("a=candidate"));
    }

    #[tokio::test(start_paused = true)]
    async fn absent_offer_aborts_without_touching_the_peer() {
        let signaling = FakeSignaling::default();
        let peer = FakePeer::completing_after(1);

        let outcome = negotiate(&signaling, &peer, fast_ice()).await.unwrap();

        assert_eq!(outcome, NegotiationOutcome::Aborted);
        assert!(signaling.sent.lock().unwrap().is_empty());
        assert_eq!(peer.engine_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn blocks_until_the_gathering_state_reports_complete() {
        let signaling = FakeSignaling {
            offer: Some(SessionPayload::offer("v=0\r\n")),
            ..Default::default()
        };
        let peer = FakePeer::completing_after(4);

        let outcome = negotiate(&signaling, &peer, fast_ice()).await.unwrap();

        assert_eq!(outcome, NegotiationOutcome::Established);
        // [gathering, gathering, gathering, complete], all four observed.
        assert_eq!(peer.polls_seen.load(Ordering::SeqCst), 4);
        assert_eq!(signaling.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn gathering_that_never_completes_times_out() {
        let signaling = FakeSignaling {
            offer: Some(SessionPayload::offer("v=0\r\n")),
            ..Default::default()
        };
        let peer = FakePeer::completing_after(usize::MAX);

        let err = negotiate(&signaling, &peer, fast_ice()).await.unwrap_err();

        assert!(matches!(err, NegotiationError::IceGatherTimeout { ms: 5000 }));
        assert!(signaling.sent.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn payload_of_the_wrong_kind_is_a_fatal_malformed_offer() {
        let signaling = FakeSignaling {
            offer: Some(SessionPayload::answer("v=0\r\n")),
            ..Default::default()
        };
        let peer = FakePeer::completing_after(1);

        let err = negotiate(&signaling, &peer, fast_ice()).await.unwrap_err();

        assert!(matches!(err, NegotiationError::MalformedOffer { .. }));
        assert_eq!(peer.engine_calls.load(Ordering::SeqCst), 0);
        assert!(signaling.sent.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn engine_failure_propagates_and_no_answer_is_sent() {
        let signaling = FakeSignaling {
            offer: Some(SessionPayload::offer("v=0\r\n")),
            ..Default::default()
        };
        let peer = FakePeer {
            fail_create_answer: true,
            ..FakePeer::completing_after(1)
        };

        let err = negotiate(&signaling, &peer, fast_ice()).await.unwrap_err();

        assert!(matches!(err, NegotiationError::Engine(_)));
        assert!(signaling.sent.lock().unwrap().is_empty());
    }
}
