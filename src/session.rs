//! In-memory session tokens with opportunistic expiry.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use rand::rngs::OsRng;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Token table shared by every in-flight request. All access goes through a
/// single exclusive lock; expired entries are swept on the authentication
/// path rather than by a background timer.
#[derive(Debug)]
pub struct SessionStore {
    ttl: Duration,
    tokens: Mutex<HashMap<String, Instant>>,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            tokens: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Mints a new session and returns its token.
    pub async fn create(&self) -> String {
        let token = new_token();
        let mut tokens = self.tokens.lock().await;
        let now = Instant::now();
        tokens.retain(|_, expires_at| *expires_at > now);
        tokens.insert(token.clone(), now + self.ttl);
        token
    }

    /// True while the token exists and has not expired. Expired entries are
    /// swept before the check.
    pub async fn validate(&self, token: &str) -> bool {
        let mut tokens = self.tokens.lock().await;
        let now = Instant::now();
        tokens.retain(|_, expires_at| *expires_at > now);
        tokens.contains_key(token)
    }

    pub async fn invalidate(&self, token: &str) {
        self.tokens.lock().await.remove(token);
    }

    /// Removes exactly the entries whose expiry has passed.
    pub async fn sweep_expired(&self) {
        let mut tokens = self.tokens.lock().await;
        let now = Instant::now();
        tokens.retain(|_, expires_at| *expires_at > now);
    }

    #[cfg(test)]
    pub(crate) async fn insert_with_expiry(&self, token: &str, expires_at: Instant) {
        self.tokens
            .lock()
            .await
            .insert(token.to_string(), expires_at);
    }

    #[cfg(test)]
    pub(crate) async fn len(&self) -> usize {
        self.tokens.lock().await.len()
    }
}

/// 32 bytes from the OS CSPRNG, URL-safe base64 without padding.
fn new_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
