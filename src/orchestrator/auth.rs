//! # Auth Registry
//!
//! Checks client credentials against the configured user list and issues
//! opaque session tokens. Tokens are random v4 UUIDs, recorded in a
//! token-to-username map that lives for the process lifetime.

use std::collections::HashMap;

use log::warn;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::common::config::UserEntry;

/// Credential store and session-token registry.
pub struct AuthRegistry {
    /// username -> password, seeded from configuration.
    credentials: HashMap<String, String>,
    /// token -> username, grown on each successful authentication.
    sessions: Mutex<HashMap<String, String>>,
}

impl AuthRegistry {
    pub fn new(users: &[UserEntry]) -> Self {
        let credentials = users
            .iter()
            .map(|user| (user.username.clone(), user.password.clone()))
            .collect();
        Self {
            credentials,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Verify a username/password pair. On success a fresh unguessable
    /// token is issued and recorded; on failure `None` is returned and no
    /// state changes.
    pub async fn verify(&self, username: &str, password: &str) -> Option<String> {
        match self.credentials.get(username) {
            Some(expected) if expected == password => {
                let token = Uuid::new_v4().to_string();
                self.sessions
                    .lock()
                    .await
                    .insert(token.clone(), username.to_string());
                Some(token)
            }
            _ => {
                warn!("authentication failed for user {}", username);
                None
            }
        }
    }

    /// Resolve a session token to the username it was issued for.
    pub async fn user_of(&self, token: &str) -> Option<String> {
        self.sessions.lock().await.get(token).cloned()
    }
}
