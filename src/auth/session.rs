// src/auth/session.rs
use crate::auth::token::{generate_token_default, token_tag};
use crate::db::{keys, PrefsStore};
use crate::errors::OverlayError;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use log::info;
use std::rc::Rc;

/// Sign-in state as seen by the overlay. Signed-out users get a "sign in"
/// badge instead of numbers.
#[async_trait(?Send)]
pub trait AuthBoundary {
    async fn is_logged_in(&self) -> bool;
    async fn login(&self) -> Result<(), OverlayError>;
    /// Token sent with API requests, if any.
    async fn bearer_token(&self) -> Option<String>;
    /// True when `login` writes through the preferences store, so a running
    /// preference listener already hears about it.
    fn announces_changes(&self) -> bool {
        false
    }
}

/// Session kept in the preferences store, so writing it is also the
/// auth-change notification.
pub struct SessionAuth {
    store: Rc<PrefsStore>,
    ttl: Duration,
}

impl SessionAuth {
    pub fn new(store: Rc<PrefsStore>) -> Self {
        Self {
            store,
            ttl: Duration::days(7),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// The stored token when it has not expired.
    pub async fn current_token(&self) -> Result<Option<String>, OverlayError> {
        let token: Option<String> = self.store.get(keys::SESSION_TOKEN).await?;
        let expires: Option<DateTime<Utc>> = self.store.get(keys::SESSION_EXPIRES_AT).await?;
        Ok(match (token, expires) {
            (Some(token), Some(expires)) if expires > Utc::now() => Some(token),
            _ => None,
        })
    }

    pub async fn logout(&self) -> Result<(), OverlayError> {
        self.store.remove(keys::SESSION_TOKEN).await?;
        self.store.remove(keys::SESSION_EXPIRES_AT).await?;
        info!("signed out");
        Ok(())
    }
}

#[async_trait(?Send)]
impl AuthBoundary for SessionAuth {
    async fn is_logged_in(&self) -> bool {
        matches!(self.current_token().await, Ok(Some(_)))
    }

    async fn login(&self) -> Result<(), OverlayError> {
        let token = generate_token_default();
        let expires_at = Utc::now() + self.ttl;
        // Expiry first: the token write is what flips the signed-in state.
        self.store.set(keys::SESSION_EXPIRES_AT, &expires_at).await?;
        self.store.set(keys::SESSION_TOKEN, &token).await?;
        info!("signed in, session {} until {expires_at}", token_tag(&token));
        Ok(())
    }

    async fn bearer_token(&self) -> Option<String> {
        self.current_token().await.ok().flatten()
    }

    fn announces_changes(&self) -> bool {
        true
    }
}
