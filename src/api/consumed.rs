//! Callback tokens already handed to the identity provider.
//!
//! Entries only need to outlive the token itself: once a magic-link or OAuth
//! token has expired the provider rejects it anyway, so it is forgotten here.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

/// Longest lifetime of a discovery magic-link / OAuth token.
pub const TOKEN_LIFETIME: Duration = Duration::from_secs(60 * 60);

/// Upper bound on remembered tokens; the oldest is evicted past it.
pub const MAX_TRACKED_TOKENS: usize = 10_000;

pub struct ConsumedTokens {
    lifetime: Duration,
    capacity: usize,
    seen: Mutex<HashMap<String, Instant>>,
}

impl Default for ConsumedTokens {
    fn default() -> Self {
        Self::new(TOKEN_LIFETIME, MAX_TRACKED_TOKENS)
    }
}

impl ConsumedTokens {
    pub fn new(lifetime: Duration, capacity: usize) -> Self {
        Self {
            lifetime,
            capacity: capacity.max(1),
            seen: Mutex::new(HashMap::new()),
        }
    }

    /// Marks `token` as used. Returns `false` when it was already used.
    pub async fn consume(&self, token: &str) -> bool {
        self.consume_at(token, Instant::now()).await
    }

    async fn consume_at(&self, token: &str, now: Instant) -> bool {
        let mut seen = self.seen.lock().await;
        seen.retain(|_, used_at| now.saturating_duration_since(*used_at) < self.lifetime);

        if seen.contains_key(token) {
            return false;
        }

        if seen.len() >= self.capacity {
            let oldest = seen
                .iter()
                .min_by_key(|(_, used_at)| **used_at)
                .map(|(t, _)| t.clone());
            if let Some(oldest) = oldest {
                tracing::warn!("consumed-token registry full; evicting the oldest entry");
                seen.remove(&oldest);
            }
        }

        seen.insert(token.to_string(), now);
        true
    }

    pub async fn len(&self) -> usize {
        self.seen.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_use_is_rejected() {
        let tokens = ConsumedTokens::default();
        assert!(tokens.consume("tok-1").await);
        assert!(!tokens.consume("tok-1").await);
        assert!(tokens.consume("tok-2").await);
    }

    #[tokio::test]
    async fn expired_entries_are_dropped() {
        let tokens = ConsumedTokens::new(Duration::from_secs(60), 100);
        let start = Instant::now();

        for i in 0..50 {
            assert!(tokens.consume_at(&format!("junk-{i}"), start).await);
        }
        assert_eq!(tokens.len().await, 50);

        let later = start + Duration::from_secs(61);
        assert!(tokens.consume_at("fresh", later).await);
        assert_eq!(tokens.len().await, 1);
        // An expired token is no longer remembered.
        assert!(tokens.consume_at("junk-0", later).await);
    }

    #[tokio::test]
    async fn registry_never_exceeds_capacity() {
        let tokens = ConsumedTokens::new(TOKEN_LIFETIME, 3);
        let start = Instant::now();

        for i in 0..10u64 {
            let at = start + Duration::from_millis(i);
            assert!(tokens.consume_at(&format!("tok-{i}"), at).await);
        }
        assert_eq!(tokens.len().await, 3);

        let at = start + Duration::from_millis(20);
        assert!(!tokens.consume_at("tok-9", at).await);
        assert!(tokens.consume_at("tok-0", at).await);
    }
}
