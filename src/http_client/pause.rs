//! Site-wide request pause.
//!
//! When the source site answers 429 or 503 every page request is held back
//! for a fixed window instead of hammering the server.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::{debug, warn};

/// How long requests are held after a rate-limit answer.
pub const DEFAULT_PAUSE: Duration = Duration::from_secs(15 * 60);

/// Shared gate that blocks requests until a pause window has elapsed.
#[derive(Debug, Clone)]
pub struct PauseGate {
    window: Duration,
    paused_until: Arc<RwLock<Option<Instant>>>,
}

impl Default for PauseGate {
    fn default() -> Self {
        Self::new(DEFAULT_PAUSE)
    }
}

impl PauseGate {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            paused_until: Arc::new(RwLock::new(None)),
        }
    }

    /// Check if a status code is a rate-limit answer.
    pub fn is_rate_limit(status_code: u16) -> bool {
        matches!(status_code, 429 | 503)
    }

    /// Start a pause window. Returns false if a pause was already running.
    pub async fn pause(&self, status_code: u16) -> bool {
        let mut until = self.paused_until.write().await;
        let now = Instant::now();
        if matches!(*until, Some(t) if t > now) {
            return false;
        }
        warn!(
            "Received HTTP {}, pausing requests for {:?}",
            status_code, self.window
        );
        *until = Some(now + self.window);
        true
    }

    /// Time left before requests may proceed.
    pub async fn remaining(&self) -> Duration {
        let until = self.paused_until.read().await;
        until
            .map(|t| t.saturating_duration_since(Instant::now()))
            .unwrap_or(Duration::ZERO)
    }

    /// Wait until no pause is in effect.
    pub async fn wait(&self) {
        loop {
            let remaining = self.remaining().await;
            if remaining.is_zero() {
                return;
            }
            debug!("Requests paused: waiting {:?}", remaining);
            tokio::time::sleep(remaining).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_rate_limit() {
        assert!(PauseGate::is_rate_limit(429));
        assert!(PauseGate::is_rate_limit(503));
        assert!(!PauseGate::is_rate_limit(500));
        assert!(!PauseGate::is_rate_limit(404));
    }

    #[tokio::test]
    async fn test_pause_is_not_restarted_while_running() {
        let gate = PauseGate::new(Duration::from_secs(60));
        assert!(gate.remaining().await.is_zero());
        assert!(gate.pause(429).await);
        assert!(!gate.pause(503).await);
        assert!(gate.remaining().await > Duration::from_secs(50));
    }

    #[tokio::test]
    async fn test_wait_returns_after_window() {
        let gate = PauseGate::new(Duration::from_millis(20));
        gate.pause(429).await;
        gate.wait().await;
        assert!(gate.remaining().await.is_zero());
    }
}
