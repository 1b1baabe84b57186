//! Cached access to the synthesis endpoint credential.
//!
//! The broker holds at most one credential, published through an
//! [`ArcSwapOption`] so readers never block. A credential is considered valid
//! until `refresh_margin` seconds before its expiry. Refreshes are serialized
//! by an async mutex and re-checked after acquiring it, so a burst of callers
//! on an expired credential triggers a single issuer call.
//!
//! When a refresh fails the previous credential, if any, is handed out again.
//! Callers that were already waiting on that failed attempt share its outcome
//! rather than each calling the issuer in turn.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::issuer::CredentialIssuer;
use crate::core::error::{SynthesisError, SynthesisResult};

/// Default time before expiry at which a credential is refreshed.
pub const DEFAULT_REFRESH_MARGIN: Duration = Duration::from_secs(300);

/// Region plus bearer token for the synthesis endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointCredential {
    pub region: String,
    pub token: String,
    /// Expiry in epoch seconds, taken from the token's `exp` claim
    pub expires_at: i64,
}

impl EndpointCredential {
    fn is_valid_at(&self, now: i64, margin: Duration) -> bool {
        now < self.expires_at.saturating_sub(margin.as_secs() as i64)
    }
}

/// Observable broker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerState {
    Empty,
    Valid,
    Stale,
}

/// Source of endpoint credentials for the synthesis client.
#[async_trait]
pub trait EndpointProvider: Send + Sync {
    async fn get_endpoint(&self) -> SynthesisResult<Arc<EndpointCredential>>;
}

pub struct CredentialBroker {
    issuer: Arc<dyn CredentialIssuer>,
    current: ArcSwapOption<EndpointCredential>,
    /// Completed issuer calls, bumped under `refresh_lock`
    attempts: AtomicU64,
    /// Outcome of the last failed attempt, `None` after a success
    refresh_lock: Mutex<Option<SynthesisError>>,
    refresh_margin: Duration,
}

fn now_epoch() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

impl CredentialBroker {
    pub fn new(issuer: Arc<dyn CredentialIssuer>, refresh_margin: Duration) -> Self {
        Self {
            issuer,
            current: ArcSwapOption::empty(),
            attempts: AtomicU64::new(0),
            refresh_lock: Mutex::new(None),
            refresh_margin,
        }
    }

    pub fn state(&self) -> BrokerState {
        match self.current.load().as_ref() {
            None => BrokerState::Empty,
            Some(c) if c.is_valid_at(now_epoch(), self.refresh_margin) => BrokerState::Valid,
            Some(_) => BrokerState::Stale,
        }
    }

    fn valid_current(&self) -> Option<Arc<EndpointCredential>> {
        self.current
            .load_full()
            .filter(|c| c.is_valid_at(now_epoch(), self.refresh_margin))
    }

    /// Stale credential, or the error of the last failed attempt.
    fn fallback(
        &self,
        previous: Option<Arc<EndpointCredential>>,
        error: &SynthesisError,
    ) -> SynthesisResult<Arc<EndpointCredential>> {
        match previous {
            Some(stale) => {
                warn!(
                    error = %error,
                    expires_at = stale.expires_at,
                    "Credential refresh failed, reusing previous credential"
                );
                Ok(stale)
            }
            None => Err(match error {
                SynthesisError::CredentialUnavailable(_) => error.clone(),
                other => SynthesisError::CredentialUnavailable(other.to_string()),
            }),
        }
    }

    /// `seen` is the attempt count observed before waiting for the lock.
    /// Callers that queued behind an attempt take its outcome instead of
    /// calling the issuer again.
    async fn refresh(&self, seen: u64) -> SynthesisResult<Arc<EndpointCredential>> {
        let mut last_error = self.refresh_lock.lock().await;

        if let Some(credential) = self.valid_current() {
            return Ok(credential);
        }

        let previous = self.current.load_full();
        let attempted_meanwhile = self.attempts.load(Ordering::Acquire) != seen;
        if let Some(error) = last_error.as_ref().filter(|_| attempted_meanwhile) {
            return self.fallback(previous, error);
        }

        let outcome = self.issuer.issue().await;
        self.attempts.fetch_add(1, Ordering::Release);

        match outcome {
            Ok(credential) => {
                info!(
                    region = %credential.region,
                    expires_at = credential.expires_at,
                    "Endpoint credential refreshed"
                );
                let credential = Arc::new(credential);
                self.current.store(Some(Arc::clone(&credential)));
                *last_error = None;
                Ok(credential)
            }
            Err(e) => {
                let result = self.fallback(previous, &e);
                *last_error = Some(e);
                result
            }
        }
    }
}

#[async_trait]
impl EndpointProvider for CredentialBroker {
    async fn get_endpoint(&self) -> SynthesisResult<Arc<EndpointCredential>> {
        let seen = self.attempts.load(Ordering::Acquire);
        if let Some(credential) = self.valid_current() {
            return Ok(credential);
        }
        self.refresh(seen).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;

    struct ScriptedIssuer {
        calls: AtomicUsize,
        responses: std::sync::Mutex<VecDeque<SynthesisResult<EndpointCredential>>>,
        delay: Duration,
    }

    impl ScriptedIssuer {
        fn new(responses: Vec<SynthesisResult<EndpointCredential>>) -> Arc<Self> {
            Self::with_delay(responses, Duration::ZERO)
        }

        fn with_delay(
            responses: Vec<SynthesisResult<EndpointCredential>>,
            delay: Duration,
        ) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                responses: std::sync::Mutex::new(responses.into()),
                delay,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CredentialIssuer for ScriptedIssuer {
        async fn issue(&self) -> SynthesisResult<EndpointCredential> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(SynthesisError::CredentialUnavailable("exhausted".into())))
        }
    }

    fn credential(region: &str, expires_in: i64) -> EndpointCredential {
        EndpointCredential {
            region: region.to_string(),
            token: format!("token-{region}"),
            expires_at: now_epoch() + expires_in,
        }
    }

    fn failure() -> SynthesisResult<EndpointCredential> {
        Err(SynthesisError::CredentialUnavailable("endpoint down".into()))
    }

    #[tokio::test]
    async fn test_valid_credential_is_cached() {
        let issuer = ScriptedIssuer::new(vec![Ok(credential("eastus", 3600))]);
        let broker = CredentialBroker::new(issuer.clone(), DEFAULT_REFRESH_MARGIN);
        assert_eq!(broker.state(), BrokerState::Empty);

        let first = broker.get_endpoint().await.unwrap();
        let second = broker.get_endpoint().await.unwrap();

        assert_eq!(issuer.calls(), 1);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(broker.state(), BrokerState::Valid);
    }

    #[tokio::test]
    async fn test_refreshes_inside_margin() {
        // Expires in 100s, inside the 300s margin
        let issuer = ScriptedIssuer::new(vec![
            Ok(credential("westus", 100)),
            Ok(credential("eastus", 3600)),
        ]);
        let broker = CredentialBroker::new(issuer.clone(), DEFAULT_REFRESH_MARGIN);

        let first = broker.get_endpoint().await.unwrap();
        assert_eq!(first.region, "westus");
        assert_eq!(broker.state(), BrokerState::Stale);

        let second = broker.get_endpoint().await.unwrap();
        assert_eq!(second.region, "eastus");
        assert_eq!(issuer.calls(), 2);
        assert_eq!(broker.state(), BrokerState::Valid);
    }

    #[tokio::test]
    async fn test_failed_refresh_falls_back_to_previous() {
        let issuer = ScriptedIssuer::new(vec![Ok(credential("westus", 10)), failure()]);
        let broker = CredentialBroker::new(issuer.clone(), DEFAULT_REFRESH_MARGIN);

        broker.get_endpoint().await.unwrap();
        let fallback = broker.get_endpoint().await.unwrap();

        assert_eq!(fallback.region, "westus");
        assert_eq!(issuer.calls(), 2);
        assert_eq!(broker.state(), BrokerState::Stale);
    }

    #[tokio::test]
    async fn test_failure_without_previous_is_error() {
        let issuer = ScriptedIssuer::new(vec![failure()]);
        let broker = CredentialBroker::new(issuer.clone(), DEFAULT_REFRESH_MARGIN);

        let err = broker.get_endpoint().await.unwrap_err();
        assert!(matches!(err, SynthesisError::CredentialUnavailable(_)));
        assert_eq!(broker.state(), BrokerState::Empty);
    }

    #[tokio::test]
    async fn test_non_credential_error_is_mapped() {
        let issuer = ScriptedIssuer::new(vec![Err(SynthesisError::Transport("reset".into()))]);
        let broker = CredentialBroker::new(issuer, DEFAULT_REFRESH_MARGIN);

        let err = broker.get_endpoint().await.unwrap_err();
        assert!(matches!(err, SynthesisError::CredentialUnavailable(_)));
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_refresh() {
        let issuer = ScriptedIssuer::with_delay(
            vec![Ok(credential("eastus", 3600))],
            Duration::from_millis(50),
        );
        let broker = Arc::new(CredentialBroker::new(issuer.clone(), DEFAULT_REFRESH_MARGIN));

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let broker = Arc::clone(&broker);
                tokio::spawn(async move { broker.get_endpoint().await })
            })
            .collect();

        for handle in handles {
            let credential = handle.await.unwrap().unwrap();
            assert_eq!(credential.region, "eastus");
        }
        assert_eq!(issuer.calls(), 1);
    }

    #[tokio::test]
    async fn test_waiters_share_a_failed_refresh() {
        let delay = Duration::from_millis(100);
        let issuer = ScriptedIssuer::with_delay(vec![Ok(credential("westus", 10)), failure()], delay);
        let broker = Arc::new(CredentialBroker::new(issuer.clone(), DEFAULT_REFRESH_MARGIN));

        broker.get_endpoint().await.unwrap();
        assert_eq!(broker.state(), BrokerState::Stale);

        let started = tokio::time::Instant::now();
        let handles: Vec<_> = (0..10)
            .map(|_| {
                let broker = Arc::clone(&broker);
                tokio::spawn(async move { broker.get_endpoint().await })
            })
            .collect();

        for handle in handles {
            let credential = handle.await.unwrap().unwrap();
            assert_eq!(credential.region, "westus");
        }

        assert_eq!(issuer.calls(), 2);
        assert!(started.elapsed() < delay * 4, "took {:?}", started.elapsed());
    }

    #[tokio::test]
    async fn test_waiters_share_a_failed_first_issue() {
        let issuer = ScriptedIssuer::with_delay(vec![failure()], Duration::from_millis(50));
        let broker = Arc::new(CredentialBroker::new(issuer.clone(), DEFAULT_REFRESH_MARGIN));

        let handles: Vec<_> = (0..5)
            .map(|_| {
                let broker = Arc::clone(&broker);
                tokio::spawn(async move { broker.get_endpoint().await })
            })
            .collect();

        for handle in handles {
            let err = handle.await.unwrap().unwrap_err();
            assert_eq!(err, SynthesisError::CredentialUnavailable("endpoint down".into()));
        }
        assert_eq!(issuer.calls(), 1);
    }

    #[tokio::test]
    async fn test_later_caller_retries_after_failure() {
        let issuer = ScriptedIssuer::new(vec![
            Ok(credential("westus", 10)),
            failure(),
            Ok(credential("eastus", 3600)),
        ]);
        let broker = CredentialBroker::new(issuer.clone(), DEFAULT_REFRESH_MARGIN);

        broker.get_endpoint().await.unwrap();
        assert_eq!(broker.get_endpoint().await.unwrap().region, "westus");
        assert_eq!(broker.get_endpoint().await.unwrap().region, "eastus");
        assert_eq!(issuer.calls(), 3);
    }

    #[test]
    fn test_validity_boundary() {
        let c = EndpointCredential {
            region: "r".into(),
            token: "t".into(),
            expires_at: 1_000,
        };
        let margin = Duration::from_secs(300);
        assert!(c.is_valid_at(699, margin));
        assert!(!c.is_valid_at(700, margin));
    }
}
