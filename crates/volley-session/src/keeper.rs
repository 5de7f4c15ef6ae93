//! The session registry: persistent id → issued token and identity.

use std::collections::HashMap;

use rand::Rng;
use volley_protocol::{PersistentId, ProfilePayload};

use crate::token::{mint_token, TokenClaims, SESSION_TTL_MS};
use crate::SessionError;

/// Display names are clamped to this many characters.
const MAX_NAME_LEN: usize = 20;

/// One device's current session.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub persistent_id: PersistentId,
    pub token: String,
    pub name: String,
    pub expires_at: u64,
    pub profile: Option<ProfilePayload>,
}

/// Issues and tracks session tokens, keyed by persistent id.
///
/// A fresh token is minted on every registration and on every identity
/// change (rename, profile link), so the client always holds a token
/// matching what the server believes about the device.
pub struct SessionKeeper {
    secret: Vec<u8>,
    ttl_ms: u64,
    sessions: HashMap<PersistentId, SessionRecord>,
}

impl SessionKeeper {
    pub fn new(secret: Vec<u8>) -> Self {
        Self { secret, ttl_ms: SESSION_TTL_MS, sessions: HashMap::new() }
    }

    /// Overrides the token TTL. Test hook; production keeps 14 days.
    pub fn with_ttl(mut self, ttl_ms: u64) -> Self {
        self.ttl_ms = ttl_ms;
        self
    }

    /// Verifies a client-presented token against this keeper's secret.
    pub fn verify(&self, token: &str, now: u64) -> Result<TokenClaims, SessionError> {
        crate::token::verify_token(&self.secret, token, now)
    }

    /// Registers a device: validates any prior token, picks the display
    /// name, and issues a fresh token bound to the persistent id.
    ///
    /// A prior token is advisory — if it fails verification the device
    /// simply re-bootstraps as a first-time visitor. A valid prior token
    /// carries the linked profile fields forward.
    pub fn register(
        &mut self,
        persistent_id: &PersistentId,
        requested_name: &str,
        prior_token: Option<&str>,
        now: u64,
    ) -> SessionRecord {
        let prior = prior_token
            .and_then(|t| self.verify(t, now).ok())
            .filter(|claims| claims.pid == persistent_id.0);

        let name = sanitize_name(requested_name).unwrap_or_else(|| {
            prior
                .as_ref()
                .and_then(|c| sanitize_name(&c.name))
                .unwrap_or_else(|| "Player".to_string())
        });

        let profile = self
            .sessions
            .get(persistent_id)
            .and_then(|r| r.profile.clone());

        let record = self.issue(persistent_id, name, profile, &prior, now);
        tracing::debug!(
            persistent_id = %persistent_id,
            renewed = prior.is_some(),
            "session registered"
        );
        record
    }

    /// Changes the display name and re-issues the token.
    pub fn rename(
        &mut self,
        persistent_id: &PersistentId,
        new_name: &str,
        now: u64,
    ) -> Option<SessionRecord> {
        let name = sanitize_name(new_name)?;
        let existing = self.sessions.get(persistent_id)?;
        let profile = existing.profile.clone();
        Some(self.issue(persistent_id, name, profile, &None, now))
    }

    /// Attaches (or clears) a linked profile and re-issues the token.
    pub fn set_profile(
        &mut self,
        persistent_id: &PersistentId,
        profile: Option<ProfilePayload>,
        now: u64,
    ) -> Option<SessionRecord> {
        let existing = self.sessions.get(persistent_id)?;
        let name = existing.name.clone();
        Some(self.issue(persistent_id, name, profile, &None, now))
    }

    pub fn get(&self, persistent_id: &PersistentId) -> Option<&SessionRecord> {
        self.sessions.get(persistent_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn issue(
        &mut self,
        persistent_id: &PersistentId,
        name: String,
        profile: Option<ProfilePayload>,
        prior: &Option<TokenClaims>,
        now: u64,
    ) -> SessionRecord {
        let expires_at = now + self.ttl_ms;
        // Profile fields ride along from the stored session when present,
        // otherwise from the prior token (a restarted server has an empty
        // registry but clients still hold signed profile claims).
        let (uid, fc, un) = match &profile {
            Some(p) => (
                Some(p.profile_id.0.clone()),
                Some(p.friend_code.0.clone()),
                p.username.clone(),
            ),
            None => prior
                .as_ref()
                .map(|c| (c.uid.clone(), c.fc.clone(), c.un.clone()))
                .unwrap_or((None, None, None)),
        };
        let claims = TokenClaims {
            pid: persistent_id.0.clone(),
            name: name.clone(),
            exp: expires_at,
            nonce: rand::rng().random(),
            uid,
            fc,
            un,
        };
        let token = mint_token(&self.secret, &claims)
            .expect("claims are always serializable");

        let record = SessionRecord {
            persistent_id: persistent_id.clone(),
            token,
            name,
            expires_at,
            profile,
        };
        self.sessions.insert(persistent_id.clone(), record.clone());
        record
    }
}

/// Trims, strips control characters, clamps length. `None` when nothing
/// printable remains.
fn sanitize_name(raw: &str) -> Option<String> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| !c.is_control())
        .take(MAX_NAME_LEN)
        .collect();
    let cleaned = cleaned.trim().to_string();
    (!cleaned.is_empty()).then_some(cleaned)
}
