//! The identity store: profiles, linked accounts, and the friend graph.
//!
//! The game core treats identity as an external collaborator behind the
//! [`IdentityStore`] trait — it calls these operations from socket-event
//! paths (never from the tick) and maps failures to stable error codes
//! at the boundary. [`MemoryIdentityStore`] is the in-process
//! implementation; a relational one must be interchangeable behind the
//! same trait.

#![allow(async_fn_in_trait)]

mod error;
mod memory;
mod types;

pub use error::IdentityError;
pub use memory::MemoryIdentityStore;
pub use types::{AccountRow, PendingAccount, ProfileSnapshot, VerificationPolicy};

use std::future::Future;

use volley_protocol::{FriendEntry, FriendRequestEntry, FriendsState, ProfileId};

/// Operations the game core consumes.
///
/// `Send + Sync + 'static` so the store can be shared across connection
/// tasks; implementations handle their own interior synchronization.
pub trait IdentityStore: Send + Sync + 'static {
    /// Returns the device's active profile, creating a guest profile on
    /// first sight.
    fn ensure_guest_profile(
        &self,
        persistent_id: &str,
        nickname: &str,
    ) -> impl Future<Output = Result<ProfileSnapshot, IdentityError>> + Send;

    /// Binds a device to an existing profile (after login).
    fn set_active_profile_for_device(
        &self,
        persistent_id: &str,
        profile_id: &ProfileId,
    ) -> impl Future<Output = Result<ProfileSnapshot, IdentityError>> + Send;

    /// Detaches a device from its linked profile, back to a guest one.
    fn switch_to_guest_profile_for_device(
        &self,
        persistent_id: &str,
        fallback_nickname: &str,
    ) -> impl Future<Output = Result<ProfileSnapshot, IdentityError>> + Send;

    /// Looks up a profile by id.
    fn get_profile_snapshot_by_id(
        &self,
        profile_id: &ProfileId,
    ) -> impl Future<Output = Result<Option<ProfileSnapshot>, IdentityError>> + Send;

    /// Renames a profile's nickname.
    fn set_nickname(
        &self,
        profile_id: &ProfileId,
        nickname: &str,
    ) -> impl Future<Output = Result<ProfileSnapshot, IdentityError>> + Send;

    /// Starts an email/password link for a profile; the returned code
    /// must be verified before the account activates.
    fn create_pending_linked_account(
        &self,
        profile_id: &ProfileId,
        email: &str,
        username: &str,
        password_hash: &str,
        code_ttl_ms: u64,
        now: u64,
    ) -> impl Future<Output = Result<PendingAccount, IdentityError>> + Send;

    /// Re-sends the verification code, subject to cooldown and hourly
    /// caps.
    fn resend_verification(
        &self,
        email: &str,
        code_ttl_ms: u64,
        cooldown_ms: u64,
        per_hour_cap: u32,
        now: u64,
    ) -> impl Future<Output = Result<PendingAccount, IdentityError>> + Send;

    /// Verifies an emailed one-time code.
    fn verify_email_code(
        &self,
        email: &str,
        otp: &str,
        max_attempts: u32,
        now: u64,
    ) -> impl Future<Output = Result<ProfileSnapshot, IdentityError>> + Send;

    /// Finds an account by email or username.
    fn find_account_by_login(
        &self,
        email_or_username: &str,
    ) -> impl Future<Output = Result<Option<AccountRow>, IdentityError>> + Send;

    // -- Friends ------------------------------------------------------

    /// The full friends view for a profile.
    fn get_friends_state(
        &self,
        profile_id: &ProfileId,
    ) -> impl Future<Output = Result<FriendsState, IdentityError>> + Send;

    /// Searches profiles by nickname, username, or friend code.
    fn search_friend_profiles(
        &self,
        profile_id: &ProfileId,
        query: &str,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<FriendEntry>, IdentityError>> + Send;

    /// Sends a friend request.
    fn send_friend_request(
        &self,
        from: &ProfileId,
        to: &ProfileId,
        now: u64,
    ) -> impl Future<Output = Result<FriendRequestEntry, IdentityError>> + Send;

    /// Accepts or declines a pending request addressed to `profile_id`.
    fn respond_friend_request(
        &self,
        profile_id: &ProfileId,
        request_id: &str,
        accept: bool,
    ) -> impl Future<Output = Result<FriendRequestEntry, IdentityError>> + Send;

    /// Whether two profiles are friends.
    fn are_friends(
        &self,
        a: &ProfileId,
        b: &ProfileId,
    ) -> impl Future<Output = Result<bool, IdentityError>> + Send;
}
