//! Party invites.
//!
//! Invites are valid only while the target room sits in the lobby
//! state: starting a match, emptying the room, or the 45-second TTL all
//! cancel them. The table is process-wide and keyed by invite id.

use std::collections::HashMap;

use volley_protocol::{PartyInvitePayload, ProfileId, RoomCode};

/// How long an invite stays answerable.
pub const PARTY_INVITE_TTL_MS: u64 = 45_000;

/// One pending invite.
#[derive(Debug, Clone, PartialEq)]
pub struct PartyInvite {
    pub invite_id: String,
    pub from_profile_id: ProfileId,
    pub from_nickname: String,
    pub to_profile_id: ProfileId,
    pub room_code: RoomCode,
    pub expires_at: u64,
}

impl PartyInvite {
    /// The wire payload for `party:inviteReceived` / `party:inviteSent`.
    pub fn payload(&self) -> PartyInvitePayload {
        PartyInvitePayload {
            invite_id: self.invite_id.clone(),
            from_profile_id: self.from_profile_id.clone(),
            from_nickname: self.from_nickname.clone(),
            room_code: self.room_code.clone(),
            expires_at: self.expires_at,
        }
    }
}

/// All pending invites.
#[derive(Default)]
pub struct PartyInvites {
    invites: HashMap<String, PartyInvite>,
    next_id: u64,
}

impl PartyInvites {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an invite. An existing pending invite from the same
    /// inviter to the same target is replaced.
    pub fn create(
        &mut self,
        from_profile_id: ProfileId,
        from_nickname: String,
        to_profile_id: ProfileId,
        room_code: RoomCode,
        now: u64,
    ) -> PartyInvite {
        self.invites.retain(|_, inv| {
            !(inv.from_profile_id == from_profile_id
                && inv.to_profile_id == to_profile_id)
        });
        self.next_id += 1;
        let invite = PartyInvite {
            invite_id: format!("pinv-{}", self.next_id),
            from_profile_id,
            from_nickname,
            to_profile_id,
            room_code,
            expires_at: now + PARTY_INVITE_TTL_MS,
        };
        self.invites.insert(invite.invite_id.clone(), invite.clone());
        invite
    }

    /// Looks up an invite if it is still valid at `now`.
    pub fn get_valid(&self, invite_id: &str, now: u64) -> Option<&PartyInvite> {
        self.invites
            .get(invite_id)
            .filter(|inv| inv.expires_at > now)
    }

    /// Removes an invite (answered, either way).
    pub fn remove(&mut self, invite_id: &str) -> Option<PartyInvite> {
        self.invites.remove(invite_id)
    }

    /// Removes and returns invites past their TTL.
    pub fn take_expired(&mut self, now: u64) -> Vec<PartyInvite> {
        let expired: Vec<String> = self
            .invites
            .values()
            .filter(|inv| inv.expires_at <= now)
            .map(|inv| inv.invite_id.clone())
            .collect();
        expired
            .into_iter()
            .filter_map(|id| self.invites.remove(&id))
            .collect()
    }

    /// Removes and returns every invite targeting a room. Called when
    /// the room leaves the lobby state or is deleted.
    pub fn cancel_for_room(&mut self, room_code: &RoomCode) -> Vec<PartyInvite> {
        let cancelled: Vec<String> = self
            .invites
            .values()
            .filter(|inv| inv.room_code == *room_code)
            .map(|inv| inv.invite_id.clone())
            .collect();
        cancelled
            .into_iter()
            .filter_map(|id| self.invites.remove(&id))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.invites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.invites.is_empty()
    }
}
