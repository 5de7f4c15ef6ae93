//! Identity-store data shapes.

use serde::{Deserialize, Serialize};
use volley_protocol::{FriendCode, ProfileId, ProfilePayload};

/// A profile as the core sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileSnapshot {
    pub profile_id: ProfileId,
    pub nickname: String,
    pub friend_code: FriendCode,
    pub username: Option<String>,
    pub is_guest: bool,
}

impl ProfileSnapshot {
    /// The wire shape of this profile.
    pub fn payload(&self) -> ProfilePayload {
        ProfilePayload {
            profile_id: self.profile_id.clone(),
            nickname: self.nickname.clone(),
            friend_code: self.friend_code.clone(),
            username: self.username.clone(),
            guest: self.is_guest,
        }
    }
}

/// A pending (unverified) linked account.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingAccount {
    pub account_id: String,
    pub email: String,
    /// One-time verification code handed to the mailer.
    pub verification_code: String,
    pub expires_at: u64,
}

/// A verified account row, as returned by login lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountRow {
    pub account_id: String,
    pub profile_id: ProfileId,
    pub email: String,
    pub username: String,
    pub password_hash: String,
    pub email_verified: bool,
    pub suspended: bool,
}

/// Knobs for the verification flow.
#[derive(Debug, Clone, Copy)]
pub struct VerificationPolicy {
    pub code_ttl_ms: u64,
    pub resend_cooldown_ms: u64,
    pub resend_per_hour_cap: u32,
    pub max_attempts: u32,
}

impl Default for VerificationPolicy {
    fn default() -> Self {
        Self {
            code_ttl_ms: 15 * 60 * 1000,
            resend_cooldown_ms: 60 * 1000,
            resend_per_hour_cap: 5,
            max_attempts: 6,
        }
    }
}
