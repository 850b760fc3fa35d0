//! Authentication session
//!
//! Holds the active keypair and the relay bearer token, and owns the
//! single in-flight token refresh.
//!
//! ```text
//!  caller A ──401──┐
//!  caller B ──401──┼──► refresh slot ──► POST /auth ──► token
//!  caller C ──401──┘        (one shared future, joined by all)
//!                                     │
//!                        401/403 ─────┴──► logout (keys erased)
//! ```
//!
//! Every login and logout bumps a generation counter. Work started under an
//! older generation must not write its results back; callers capture
//! [`AuthSession::generation`] and check [`AuthSession::is_current`].

use std::future::Future;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;

use crate::error::{ChatError, ChatResult};
use crate::identity::KeyPair;
use crate::relay::{AuthRequest, RelayApi, RelayError};
use crate::sync::events::{emit, ChatEvent};
use crate::types::now_millis;

type RefreshFuture = Shared<BoxFuture<'static, Result<String, RelayError>>>;

#[derive(Default)]
struct SessionState {
    keypair: Option<Arc<KeyPair>>,
    token: Option<String>,
    generation: u64,
}

/// Active identity plus relay token.
pub struct AuthSession {
    relay: Arc<dyn RelayApi>,
    state: RwLock<SessionState>,
    refresh: Mutex<Option<(u64, RefreshFuture)>>,
    events: broadcast::Sender<ChatEvent>,
}

impl AuthSession {
    pub fn new(relay: Arc<dyn RelayApi>, events: broadcast::Sender<ChatEvent>) -> Self {
        Self {
            relay,
            state: RwLock::new(SessionState::default()),
            refresh: Mutex::new(None),
            events,
        }
    }

    /// Install `keypair` as the active identity and authenticate it.
    ///
    /// The identity stays installed if the relay is unreachable; the token is
    /// fetched again on the next request. A relay rejection logs out.
    pub async fn login(&self, keypair: KeyPair) -> ChatResult<String> {
        self.install(keypair);
        self.refresh_token().await
    }

    /// Install `keypair` without contacting the relay; the token is fetched
    /// by the first authenticated request.
    pub fn install(&self, keypair: KeyPair) {
        let public_key = keypair.public_key_hex();
        {
            let mut state = self.state.write();
            state.keypair = Some(Arc::new(keypair));
            state.token = None;
            state.generation += 1;
        }
        self.refresh.lock().take();

        tracing::info!(public_key = %public_key, "identity installed");
        emit(&self.events, ChatEvent::LoggedIn { public_key });
    }

    /// Drop the keypair and token. In-flight work from this identity is discarded.
    pub fn logout(&self) {
        let was_logged_in = {
            let mut state = self.state.write();
            state.token = None;
            state.generation += 1;
            state.keypair.take().is_some()
        };
        self.refresh.lock().take();

        if was_logged_in {
            tracing::info!("session closed");
            emit(&self.events, ChatEvent::LoggedOut);
        }
    }

    /// Log out only if `generation` is still the active one.
    fn logout_if_current(&self, generation: u64) {
        if self.is_current(generation) {
            self.logout();
        }
    }

    pub fn keypair(&self) -> Option<Arc<KeyPair>> {
        self.state.read().keypair.clone()
    }

    pub fn public_key_hex(&self) -> Option<String> {
        self.state.read().keypair.as_ref().map(|k| k.public_key_hex())
    }

    pub fn is_logged_in(&self) -> bool {
        self.state.read().keypair.is_some()
    }

    pub fn token(&self) -> Option<String> {
        self.state.read().token.clone()
    }

    pub fn generation(&self) -> u64 {
        self.state.read().generation
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.state.read().generation == generation
    }

    /// Fetch a fresh token, joining a refresh already in flight.
    pub async fn refresh_token(&self) -> ChatResult<String> {
        let (generation, refresh) = {
            let mut slot = self.refresh.lock();
            let (keypair, generation) = {
                let state = self.state.read();
                let keypair = state.keypair.clone().ok_or(ChatError::NotAuthenticated)?;
                (keypair, state.generation)
            };

            match slot.as_ref() {
                Some((slot_generation, pending)) if *slot_generation == generation => {
                    (generation, pending.clone())
                }
                _ => {
                    let relay = self.relay.clone();
                    let pending = async move {
                        let request = AuthRequest::sign(&keypair, now_millis());
                        relay.authenticate(&request).await
                    }
                    .boxed()
                    .shared();
                    *slot = Some((generation, pending.clone()));
                    tracing::debug!("token refresh started");
                    (generation, pending)
                }
            }
        };

        let result = refresh.clone().await;

        {
            let mut slot = self.refresh.lock();
            if matches!(slot.as_ref(), Some((_, pending)) if pending.ptr_eq(&refresh)) {
                *slot = None;
            }
        }

        match result {
            Ok(token) => {
                let mut state = self.state.write();
                if state.generation != generation {
                    return Err(ChatError::SessionClosed(
                        "identity changed during token refresh".to_string(),
                    ));
                }
                state.token = Some(token.clone());
                Ok(token)
            }
            Err(e) if e.is_auth() => {
                tracing::warn!(error = %e, "relay rejected login, logging out");
                self.logout_if_current(generation);
                Err(e.into())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Current token, authenticating first if there is none.
    pub async fn current_token(&self) -> ChatResult<String> {
        if let Some(token) = self.token() {
            return Ok(token);
        }
        self.refresh_token().await
    }

    /// A token to use after `rejected` was refused.
    ///
    /// If another caller already replaced the token, that one is reused
    /// instead of starting a second refresh.
    async fn token_after_rejection(&self, rejected: &str) -> ChatResult<String> {
        match self.token() {
            Some(token) if token != rejected => Ok(token),
            _ => self.refresh_token().await,
        }
    }

    /// Run an authenticated relay request, refreshing the token and retrying
    /// once if it is rejected.
    pub async fn call<T, F, Fut>(&self, op: F) -> ChatResult<T>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T, RelayError>>,
    {
        let token = self.current_token().await?;
        match op(token.clone()).await {
            Err(e) if e.is_auth() => {
                tracing::debug!(error = %e, "token refused, refreshing");
                let fresh = self.token_after_rejection(&token).await?;
                op(fresh).await.map_err(ChatError::from)
            }
            other => other.map_err(ChatError::from),
        }
    }
}
