//! In-memory identity store.
//!
//! Presence (`online` on friend rows) is the server's knowledge, not
//! the store's: every entry is returned with `online = false` and the
//! caller overlays live presence.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use rand::Rng;
use volley_protocol::{
    FriendCode, FriendEntry, FriendRequestEntry, FriendsState, ProfileId,
};

use crate::{
    AccountRow, IdentityError, IdentityStore, PendingAccount, ProfileSnapshot,
};

#[derive(Debug, Clone)]
struct Profile {
    id: ProfileId,
    nickname: String,
    friend_code: FriendCode,
    username: Option<String>,
    is_guest: bool,
}

impl Profile {
    fn snapshot(&self) -> ProfileSnapshot {
        ProfileSnapshot {
            profile_id: self.id.clone(),
            nickname: self.nickname.clone(),
            friend_code: self.friend_code.clone(),
            username: self.username.clone(),
            is_guest: self.is_guest,
        }
    }
}

#[derive(Debug, Clone)]
struct Account {
    account_id: String,
    profile_id: ProfileId,
    email: String,
    username: String,
    password_hash: String,
    verified: bool,
    suspended: bool,
    otp: String,
    otp_expires_at: u64,
    otp_attempts: u32,
    last_sent_at: u64,
    hour_window_start: u64,
    sends_in_hour: u32,
}

#[derive(Debug, Clone)]
struct FriendRequest {
    id: String,
    from: ProfileId,
    to: ProfileId,
    sent_at: u64,
}

#[derive(Default)]
struct State {
    profiles: HashMap<ProfileId, Profile>,
    device_profiles: HashMap<String, ProfileId>,
    accounts_by_email: HashMap<String, Account>,
    taken_usernames: HashSet<String>,
    friends: HashMap<ProfileId, HashSet<ProfileId>>,
    requests: HashMap<String, FriendRequest>,
    next_id: u64,
}

impl State {
    fn fresh_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }

    fn fresh_friend_code(&mut self) -> FriendCode {
        loop {
            let n: u32 = rand::rng().random_range(0..1_000_000);
            let code = FriendCode(format!("VLY-{n:06}"));
            if !self
                .profiles
                .values()
                .any(|p| p.friend_code == code)
            {
                return code;
            }
        }
    }

    fn create_profile(&mut self, nickname: &str, is_guest: bool) -> ProfileId {
        let id = ProfileId(self.fresh_id("prof"));
        let friend_code = self.fresh_friend_code();
        self.profiles.insert(
            id.clone(),
            Profile {
                id: id.clone(),
                nickname: nickname.to_string(),
                friend_code,
                username: None,
                is_guest,
            },
        );
        id
    }

    fn entry_for(&self, id: &ProfileId) -> Option<FriendEntry> {
        self.profiles.get(id).map(|p| FriendEntry {
            profile_id: p.id.clone(),
            nickname: p.nickname.clone(),
            friend_code: p.friend_code.clone(),
            online: false,
        })
    }

    fn request_entry(&self, req: &FriendRequest) -> FriendRequestEntry {
        let from_nickname = self
            .profiles
            .get(&req.from)
            .map(|p| p.nickname.clone())
            .unwrap_or_default();
        FriendRequestEntry {
            request_id: req.id.clone(),
            from_profile_id: req.from.clone(),
            from_nickname,
            to_profile_id: req.to.clone(),
            sent_at: req.sent_at,
        }
    }
}

/// The in-process [`IdentityStore`].
#[derive(Default)]
pub struct MemoryIdentityStore {
    state: Mutex<State>,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn six_digit_code() -> String {
    format!("{:06}", rand::rng().random_range(0..1_000_000u32))
}

impl IdentityStore for MemoryIdentityStore {
    async fn ensure_guest_profile(
        &self,
        persistent_id: &str,
        nickname: &str,
    ) -> Result<ProfileSnapshot, IdentityError> {
        let mut state = self.lock();
        if let Some(existing) = state.device_profiles.get(persistent_id) {
            let existing = existing.clone();
            if let Some(profile) = state.profiles.get(&existing) {
                return Ok(profile.snapshot());
            }
        }
        let id = state.create_profile(nickname, true);
        state
            .device_profiles
            .insert(persistent_id.to_string(), id.clone());
        tracing::debug!(profile = %id, "guest profile created");
        Ok(state.profiles[&id].snapshot())
    }

    async fn set_active_profile_for_device(
        &self,
        persistent_id: &str,
        profile_id: &ProfileId,
    ) -> Result<ProfileSnapshot, IdentityError> {
        let mut state = self.lock();
        let profile = state
            .profiles
            .get(profile_id)
            .cloned()
            .ok_or(IdentityError::ProfileNotFound)?;
        state
            .device_profiles
            .insert(persistent_id.to_string(), profile_id.clone());
        Ok(profile.snapshot())
    }

    async fn switch_to_guest_profile_for_device(
        &self,
        persistent_id: &str,
        fallback_nickname: &str,
    ) -> Result<ProfileSnapshot, IdentityError> {
        let mut state = self.lock();
        let id = state.create_profile(fallback_nickname, true);
        state
            .device_profiles
            .insert(persistent_id.to_string(), id.clone());
        Ok(state.profiles[&id].snapshot())
    }

    async fn get_profile_snapshot_by_id(
        &self,
        profile_id: &ProfileId,
    ) -> Result<Option<ProfileSnapshot>, IdentityError> {
        Ok(self.lock().profiles.get(profile_id).map(|p| p.snapshot()))
    }

    async fn set_nickname(
        &self,
        profile_id: &ProfileId,
        nickname: &str,
    ) -> Result<ProfileSnapshot, IdentityError> {
        let mut state = self.lock();
        let profile = state
            .profiles
            .get_mut(profile_id)
            .ok_or(IdentityError::ProfileNotFound)?;
        profile.nickname = nickname.to_string();
        Ok(profile.snapshot())
    }

    async fn create_pending_linked_account(
        &self,
        profile_id: &ProfileId,
        email: &str,
        username: &str,
        password_hash: &str,
        code_ttl_ms: u64,
        now: u64,
    ) -> Result<PendingAccount, IdentityError> {
        let mut state = self.lock();
        let email_key = email.to_ascii_lowercase();
        let username_key = username.to_ascii_lowercase();

        let profile = state
            .profiles
            .get(profile_id)
            .ok_or(IdentityError::ProfileNotFound)?;
        if profile.username.is_some() {
            return Err(IdentityError::ProfileAlreadyLinked);
        }
        if state.accounts_by_email.contains_key(&email_key) {
            return Err(IdentityError::EmailAlreadyUsed);
        }
        if state.taken_usernames.contains(&username_key) {
            return Err(IdentityError::UsernameTaken);
        }

        let account_id = state.fresh_id("acct");
        let otp = six_digit_code();
        let account = Account {
            account_id: account_id.clone(),
            profile_id: profile_id.clone(),
            email: email.to_string(),
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            verified: false,
            suspended: false,
            otp: otp.clone(),
            otp_expires_at: now + code_ttl_ms,
            otp_attempts: 0,
            last_sent_at: now,
            hour_window_start: now,
            sends_in_hour: 1,
        };
        state.taken_usernames.insert(username_key);
        state.accounts_by_email.insert(email_key, account);

        Ok(PendingAccount {
            account_id,
            email: email.to_string(),
            verification_code: otp,
            expires_at: now + code_ttl_ms,
        })
    }

    async fn resend_verification(
        &self,
        email: &str,
        code_ttl_ms: u64,
        cooldown_ms: u64,
        per_hour_cap: u32,
        now: u64,
    ) -> Result<PendingAccount, IdentityError> {
        let mut state = self.lock();
        let account = state
            .accounts_by_email
            .get_mut(&email.to_ascii_lowercase())
            .ok_or(IdentityError::ProfileNotFound)?;

        let since_last = now.saturating_sub(account.last_sent_at);
        if since_last < cooldown_ms {
            return Err(IdentityError::VerificationRateLimited {
                retry_after_ms: cooldown_ms - since_last,
            });
        }
        if now.saturating_sub(account.hour_window_start) >= 3_600_000 {
            account.hour_window_start = now;
            account.sends_in_hour = 0;
        }
        if account.sends_in_hour >= per_hour_cap {
            let retry_after_ms = (account.hour_window_start + 3_600_000)
                .saturating_sub(now);
            return Err(IdentityError::VerificationRateLimited {
                retry_after_ms,
            });
        }

        account.otp = six_digit_code();
        account.otp_expires_at = now + code_ttl_ms;
        account.otp_attempts = 0;
        account.last_sent_at = now;
        account.sends_in_hour += 1;

        Ok(PendingAccount {
            account_id: account.account_id.clone(),
            email: account.email.clone(),
            verification_code: account.otp.clone(),
            expires_at: account.otp_expires_at,
        })
    }

    async fn verify_email_code(
        &self,
        email: &str,
        otp: &str,
        max_attempts: u32,
        now: u64,
    ) -> Result<ProfileSnapshot, IdentityError> {
        let mut state = self.lock();
        let account = state
            .accounts_by_email
            .get_mut(&email.to_ascii_lowercase())
            .ok_or(IdentityError::InvalidVerificationCode)?;

        if now >= account.otp_expires_at {
            return Err(IdentityError::VerificationCodeExpired);
        }
        if account.otp_attempts >= max_attempts {
            return Err(IdentityError::InvalidVerificationCode);
        }
        if account.otp != otp {
            account.otp_attempts += 1;
            return Err(IdentityError::InvalidVerificationCode);
        }

        account.verified = true;
        let profile_id = account.profile_id.clone();
        let username = account.username.clone();
        let profile = state
            .profiles
            .get_mut(&profile_id)
            .ok_or(IdentityError::ProfileNotFound)?;
        profile.username = Some(username);
        profile.is_guest = false;
        Ok(profile.snapshot())
    }

    async fn find_account_by_login(
        &self,
        email_or_username: &str,
    ) -> Result<Option<AccountRow>, IdentityError> {
        let state = self.lock();
        let key = email_or_username.to_ascii_lowercase();
        let account = state
            .accounts_by_email
            .get(&key)
            .or_else(|| {
                state
                    .accounts_by_email
                    .values()
                    .find(|a| a.username.to_ascii_lowercase() == key)
            });
        Ok(account.map(|a| AccountRow {
            account_id: a.account_id.clone(),
            profile_id: a.profile_id.clone(),
            email: a.email.clone(),
            username: a.username.clone(),
            password_hash: a.password_hash.clone(),
            email_verified: a.verified,
            suspended: a.suspended,
        }))
    }

    // -- Friends ------------------------------------------------------

    async fn get_friends_state(
        &self,
        profile_id: &ProfileId,
    ) -> Result<FriendsState, IdentityError> {
        let state = self.lock();
        if !state.profiles.contains_key(profile_id) {
            return Err(IdentityError::ProfileNotFound);
        }
        let friends = state
            .friends
            .get(profile_id)
            .map(|set| {
                set.iter().filter_map(|id| state.entry_for(id)).collect()
            })
            .unwrap_or_default();
        let incoming = state
            .requests
            .values()
            .filter(|r| r.to == *profile_id)
            .map(|r| state.request_entry(r))
            .collect();
        let outgoing = state
            .requests
            .values()
            .filter(|r| r.from == *profile_id)
            .map(|r| state.request_entry(r))
            .collect();
        Ok(FriendsState { friends, incoming, outgoing })
    }

    async fn search_friend_profiles(
        &self,
        profile_id: &ProfileId,
        query: &str,
        limit: usize,
    ) -> Result<Vec<FriendEntry>, IdentityError> {
        let state = self.lock();
        let needle = query.trim().to_ascii_lowercase();
        if needle.is_empty() {
            return Ok(Vec::new());
        }
        let limit = limit.clamp(1, 25);
        let mut hits: Vec<FriendEntry> = state
            .profiles
            .values()
            .filter(|p| p.id != *profile_id)
            .filter(|p| {
                p.nickname.to_ascii_lowercase().contains(&needle)
                    || p.friend_code.0.to_ascii_lowercase() == needle
                    || p.username
                        .as_deref()
                        .is_some_and(|u| {
                            u.to_ascii_lowercase().contains(&needle)
                        })
            })
            .filter_map(|p| state.entry_for(&p.id))
            .collect();
        hits.sort_by(|a, b| a.nickname.cmp(&b.nickname));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn send_friend_request(
        &self,
        from: &ProfileId,
        to: &ProfileId,
        now: u64,
    ) -> Result<FriendRequestEntry, IdentityError> {
        let mut state = self.lock();
        if from == to {
            return Err(IdentityError::AlreadyFriends);
        }
        if !state.profiles.contains_key(to) || !state.profiles.contains_key(from)
        {
            return Err(IdentityError::ProfileNotFound);
        }
        if state
            .friends
            .get(from)
            .is_some_and(|set| set.contains(to))
        {
            return Err(IdentityError::AlreadyFriends);
        }
        let duplicate = state.requests.values().any(|r| {
            (r.from == *from && r.to == *to)
                || (r.from == *to && r.to == *from)
        });
        if duplicate {
            return Err(IdentityError::FriendRequestAlreadyExists);
        }

        let id = state.fresh_id("freq");
        let request = FriendRequest {
            id: id.clone(),
            from: from.clone(),
            to: to.clone(),
            sent_at: now,
        };
        let entry = state.request_entry(&request);
        state.requests.insert(id, request);
        Ok(entry)
    }

    async fn respond_friend_request(
        &self,
        profile_id: &ProfileId,
        request_id: &str,
        accept: bool,
    ) -> Result<FriendRequestEntry, IdentityError> {
        let mut state = self.lock();
        let addressed_to_caller = state
            .requests
            .get(request_id)
            .is_some_and(|r| r.to == *profile_id);
        if !addressed_to_caller {
            return Err(IdentityError::FriendRequestNotFound);
        }
        let request = state
            .requests
            .remove(request_id)
            .expect("checked above");
        if accept {
            state
                .friends
                .entry(request.from.clone())
                .or_default()
                .insert(request.to.clone());
            state
                .friends
                .entry(request.to.clone())
                .or_default()
                .insert(request.from.clone());
        }
        Ok(state.request_entry(&request))
    }

    async fn are_friends(
        &self,
        a: &ProfileId,
        b: &ProfileId,
    ) -> Result<bool, IdentityError> {
        Ok(self
            .lock()
            .friends
            .get(a)
            .is_some_and(|set| set.contains(b)))
    }
}
