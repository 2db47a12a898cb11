//! Caching token source with optional asynchronous background refresh.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};

use super::{Token, TokenStoreError};

/// Window before expiry in which a background refresh is kicked off while
/// the current token keeps being served.
const STALE_WINDOW_MS: u64 = 3 * 60 * 1000;

/// Anything that can produce a token on demand.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn token(&self) -> Result<Token, TokenStoreError>;
}

struct State {
    cached: RwLock<Option<Token>>,
    /// Held while a refresh (foreground or background) is in flight so only
    /// one runs at a time.
    refresh: Mutex<()>,
}

/// Wraps a [`TokenSource`] and serves the last-known-good token to
/// concurrent readers. When async refresh is enabled, a token nearing
/// expiry is refreshed on a detached task; a reader blocks only when no
/// valid token has ever been issued yet.
pub struct CachedTokenSource {
    inner: Arc<dyn TokenSource>,
    state: Arc<State>,
    async_refresh: bool,
}

impl CachedTokenSource {
    pub fn new(inner: Arc<dyn TokenSource>, async_refresh: bool) -> Self {
        CachedTokenSource {
            inner,
            state: Arc::new(State {
                cached: RwLock::new(None),
                refresh: Mutex::new(()),
            }),
            async_refresh,
        }
    }

    async fn fetch_and_store(
        inner: &dyn TokenSource,
        state: &State,
    ) -> Result<Token, TokenStoreError> {
        let token = inner.token().await?;
        *state.cached.write().await = Some(token.clone());
        Ok(token)
    }

    fn spawn_background_refresh(&self) {
        let inner = Arc::clone(&self.inner);
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            let Ok(_guard) = state.refresh.try_lock() else {
                return; // a refresh is already in flight
            };
            // Failures are ignored here; the cached token is still served
            // and a foreground fetch will surface the error once it expires.
            let _ = Self::fetch_and_store(inner.as_ref(), &state).await;
        });
    }
}

#[async_trait]
impl TokenSource for CachedTokenSource {
    async fn token(&self) -> Result<Token, TokenStoreError> {
        if let Some(token) = self.state.cached.read().await.clone()
            && token.is_valid()
        {
            if self.async_refresh && token.expires_within(STALE_WINDOW_MS) {
                self.spawn_background_refresh();
            }
            return Ok(token);
        }

        let _guard = self.state.refresh.lock().await;
        // Another caller may have refreshed while we waited for the lock.
        if let Some(token) = self.state.cached.read().await.clone()
            && token.is_valid()
        {
            return Ok(token);
        }
        Self::fetch_and_store(self.inner.as_ref(), &self.state).await
    }
}
