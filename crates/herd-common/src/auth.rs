use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::{Arc, Mutex};

use rand::RngCore;
use serde::Serialize;
use tracing::warn;

use crate::config::AuthConfig;
use crate::error::{HerdError, Result};

/// User details returned for a valid session token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Profile {
    pub uid: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub groups: Vec<String>,
}

/// The authentication capability.
///
/// One instance lives for the whole process and is closed on shutdown.
/// Implementations are responsible for their own synchronisation; session
/// storage is deliberately behind this boundary so an external store can be
/// substituted without touching the core.
pub trait Authenticator: Send + Sync {
    fn login(&self, username: &str, password: &str) -> Result<String>;
    fn logout(&self, token: &str) -> Result<()>;
    fn info(&self, token: &str) -> Option<Profile>;
    fn close(&self);
}

/// Builds the authenticator selected by the config block. Unknown or absent
/// types fall back to the guest authenticator.
pub fn from_config(config: Option<&AuthConfig>) -> Arc<dyn Authenticator> {
    match config {
        Some(auth) if auth.kind == "guest" => Arc::new(GuestAuthenticator::new()),
        Some(auth) => {
            warn!("unknown auth type '{}', falling back to guest", auth.kind);
            Arc::new(GuestAuthenticator::new())
        }
        None => {
            warn!("authentication is not configured, using guest sessions");
            Arc::new(GuestAuthenticator::new())
        }
    }
}

/// Process-local sessions: any username/password pair is accepted and a
/// fresh token is issued per login.
pub struct GuestAuthenticator {
    sessions: Mutex<HashMap<String, Profile>>,
}

impl GuestAuthenticator {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for GuestAuthenticator {
    fn default() -> Self {
        Self::new()
    }
}

impl Authenticator for GuestAuthenticator {
    fn login(&self, username: &str, _password: &str) -> Result<String> {
        let token = generate_token();
        let mut sessions = self.sessions.lock().unwrap();
        sessions.insert(
            token.clone(),
            Profile {
                uid: username.to_string(),
                ..Profile::default()
            },
        );
        Ok(token)
    }

    fn logout(&self, token: &str) -> Result<()> {
        let mut sessions = self.sessions.lock().unwrap();
        if sessions.remove(token).is_some() {
            Ok(())
        } else {
            Err(HerdError::Unauthorized("user has not logged in".into()))
        }
    }

    fn info(&self, token: &str) -> Option<Profile> {
        self.sessions.lock().unwrap().get(token).cloned()
    }

    fn close(&self) {
        self.sessions.lock().unwrap().clear();
    }
}

/// 32 random bytes rendered as lowercase hex.
fn generate_token() -> String {
    let mut key = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut key);
    key.iter().fold(String::with_capacity(64), |mut out, b| {
        let _ = write!(out, "{b:02x}");
        out
    })
}
