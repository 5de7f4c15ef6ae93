//! Frames and per-event dispatch metadata.
//!
//! A frame is an event plus an optional acknowledgement id. The ack id
//! exists for the handful of request/response events (`updateName`,
//! `friends:*`, `party:inviteRespond`, `ads:*`): the client picks an id,
//! the server echoes it on the response frame, everything else is a
//! plain emit.
//!
//! [`EventTag`] is the flat tag space over the inbound vocabulary. The
//! dispatcher uses it to charge the right token bucket *before* paying
//! the cost of handling the event, and the abuse log uses its wire name
//! in `rate_limit:<event>` reasons.

use serde::{Deserialize, Serialize};

use crate::{ClientEvent, ServerEvent};

// ---------------------------------------------------------------------------
// Frames
// ---------------------------------------------------------------------------

/// An inbound event with an optional client-chosen ack id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientFrame {
    #[serde(flatten)]
    pub event: ClientEvent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ack: Option<u64>,
}

impl From<ClientEvent> for ClientFrame {
    fn from(event: ClientEvent) -> Self {
        Self { event, ack: None }
    }
}

/// An outbound event, echoing the request's ack id when it answers one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerFrame {
    #[serde(flatten)]
    pub event: ServerEvent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ack: Option<u64>,
}

impl From<ServerEvent> for ServerFrame {
    fn from(event: ServerEvent) -> Self {
        Self { event, ack: None }
    }
}

impl ServerFrame {
    /// Attaches an ack id to an event.
    pub fn ack(event: ServerEvent, ack: Option<u64>) -> Self {
        Self { event, ack }
    }
}

// ---------------------------------------------------------------------------
// Frame decoding
// ---------------------------------------------------------------------------

/// Why an inbound frame could not be decoded.
///
/// The distinction matters for abuse accounting: a payload that fails
/// validation *for a known event* is a strike against that event, while
/// bytes that aren't even a tagged object are dropped silently.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// Not JSON, not an object, or no `event` string.
    #[error("malformed frame")]
    Malformed,

    /// The `event` tag names nothing in the vocabulary.
    #[error("unknown event {0:?}")]
    UnknownEvent(String),

    /// Known event, payload failed to validate.
    #[error("bad payload for {event:?}: {source}")]
    BadPayload {
        event: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Decodes an inbound frame, classifying failures per [`FrameError`].
///
/// Events whose payload is entirely optional may arrive without a
/// `data` key at all; an empty payload object is substituted before the
/// frame is rejected.
pub fn decode_client_frame(data: &[u8]) -> Result<ClientFrame, FrameError> {
    let value: serde_json::Value =
        serde_json::from_slice(data).map_err(|_| FrameError::Malformed)?;
    let obj = value.as_object().ok_or(FrameError::Malformed)?;
    let event_name = obj
        .get("event")
        .and_then(|v| v.as_str())
        .ok_or(FrameError::Malformed)?
        .to_string();
    let had_data = obj.contains_key("data");

    match serde_json::from_value::<ClientFrame>(value.clone()) {
        Ok(frame) => Ok(frame),
        Err(source) => {
            if !had_data {
                let mut padded = value;
                padded
                    .as_object_mut()
                    .expect("checked above")
                    .insert("data".into(), serde_json::json!({}));
                if let Ok(frame) = serde_json::from_value::<ClientFrame>(padded)
                {
                    return Ok(frame);
                }
            }
            if EventTag::from_wire_name(&event_name).is_some() {
                Err(FrameError::BadPayload { event: event_name, source })
            } else {
                Err(FrameError::UnknownEvent(event_name))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// EventTag — dispatch metadata
// ---------------------------------------------------------------------------

/// Token-bucket parameters for one event: at most `events` accepted per
/// rolling `window_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketSpec {
    pub events: u32,
    pub window_ms: u64,
}

impl BucketSpec {
    pub const fn per_second(events: u32) -> Self {
        Self { events, window_ms: 1_000 }
    }

    pub const fn per_ten_seconds(events: u32) -> Self {
        Self { events, window_ms: 10_000 }
    }
}

macro_rules! event_tags {
    ($( $variant:ident => $wire:literal, $bucket:expr, auth: $auth:literal; )+) => {
        /// Flat tag for every inbound event.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum EventTag {
            $( $variant, )+
        }

        impl EventTag {
            /// All tags, for iterating bucket tables.
            pub const ALL: &'static [EventTag] = &[ $( EventTag::$variant, )+ ];

            /// The event name as it appears on the wire.
            pub fn wire_name(&self) -> &'static str {
                match self {
                    $( EventTag::$variant => $wire, )+
                }
            }

            /// Reverse lookup from a wire name.
            pub fn from_wire_name(name: &str) -> Option<Self> {
                match name {
                    $( $wire => Some(EventTag::$variant), )+
                    _ => None,
                }
            }

            /// This event's rate-limit bucket.
            pub fn bucket(&self) -> BucketSpec {
                match self {
                    $( EventTag::$variant => $bucket, )+
                }
            }

            /// Whether the event requires a registered persistent id
            /// bound to the connection.
            pub fn requires_auth(&self) -> bool {
                match self {
                    $( EventTag::$variant => $auth, )+
                }
            }
        }
    };
}

event_tags! {
    RegisterPlayer       => "registerPlayer",        BucketSpec::per_ten_seconds(12), auth: false;
    UpdateName           => "updateName",            BucketSpec::per_ten_seconds(6),  auth: true;
    FriendsGetList       => "friends:getList",       BucketSpec::per_ten_seconds(30), auth: true;
    FriendsSearch        => "friends:search",        BucketSpec::per_ten_seconds(12), auth: true;
    FriendsSendRequest   => "friends:sendRequest",   BucketSpec::per_ten_seconds(12), auth: true;
    FriendsRespondRequest => "friends:respondRequest", BucketSpec::per_ten_seconds(18), auth: true;
    PartyInviteFriend    => "party:inviteFriend",    BucketSpec::per_ten_seconds(12), auth: true;
    PartyInviteRespond   => "party:inviteRespond",   BucketSpec::per_ten_seconds(18), auth: true;
    Pong                 => "pong",                  BucketSpec::per_ten_seconds(60), auth: false;
    ClientPing           => "clientPing",            BucketSpec::per_ten_seconds(30), auth: false;
    AdsGetState          => "ads:getState",          BucketSpec::per_ten_seconds(20), auth: true;
    AdsRewardedCompleted => "ads:rewardedCompleted", BucketSpec::per_ten_seconds(6),  auth: true;
    CreateRoom           => "createRoom",            BucketSpec::per_ten_seconds(4),  auth: true;
    JoinRoom             => "joinRoom",              BucketSpec::per_ten_seconds(6),  auth: true;
    PlayerReady          => "playerReady",           BucketSpec::per_ten_seconds(20), auth: true;
    ToggleReady          => "toggleReady",           BucketSpec::per_ten_seconds(20), auth: true;
    StartGame            => "startGame",             BucketSpec::per_ten_seconds(8),  auth: true;
    PlayerInput          => "playerInput",           BucketSpec::per_second(90),      auth: true;
    FireProjectile       => "fireProjectile",        BucketSpec::per_second(18),      auth: true;
    LeaveRoom            => "leaveRoom",             BucketSpec::per_ten_seconds(12), auth: true;
    RequestLobbyState    => "requestLobbyState",     BucketSpec::per_ten_seconds(20), auth: true;
    ReturnToLobby        => "returnToLobby",         BucketSpec::per_ten_seconds(20), auth: true;
    AckMatchResults      => "ackMatchResults",       BucketSpec::per_ten_seconds(12), auth: true;
    KickPlayer           => "kickPlayer",            BucketSpec::per_ten_seconds(8),  auth: true;
}

impl EventTag {
    /// The tag of a decoded event.
    pub fn of(event: &ClientEvent) -> Self {
        match event {
            ClientEvent::RegisterPlayer { .. } => EventTag::RegisterPlayer,
            ClientEvent::UpdateName { .. } => EventTag::UpdateName,
            ClientEvent::FriendsGetList => EventTag::FriendsGetList,
            ClientEvent::FriendsSearch { .. } => EventTag::FriendsSearch,
            ClientEvent::FriendsSendRequest { .. } => {
                EventTag::FriendsSendRequest
            }
            ClientEvent::FriendsRespondRequest { .. } => {
                EventTag::FriendsRespondRequest
            }
            ClientEvent::PartyInviteFriend { .. } => {
                EventTag::PartyInviteFriend
            }
            ClientEvent::PartyInviteRespond { .. } => {
                EventTag::PartyInviteRespond
            }
            ClientEvent::Pong => EventTag::Pong,
            ClientEvent::ClientPing { .. } => EventTag::ClientPing,
            ClientEvent::AdsGetState => EventTag::AdsGetState,
            ClientEvent::AdsRewardedCompleted { .. } => {
                EventTag::AdsRewardedCompleted
            }
            ClientEvent::CreateRoom { .. } => EventTag::CreateRoom,
            ClientEvent::JoinRoom { .. } => EventTag::JoinRoom,
            ClientEvent::PlayerReady => EventTag::PlayerReady,
            ClientEvent::ToggleReady => EventTag::ToggleReady,
            ClientEvent::StartGame => EventTag::StartGame,
            ClientEvent::PlayerInput(_) => EventTag::PlayerInput,
            ClientEvent::FireProjectile { .. } => EventTag::FireProjectile,
            ClientEvent::LeaveRoom => EventTag::LeaveRoom,
            ClientEvent::RequestLobbyState { .. } => {
                EventTag::RequestLobbyState
            }
            ClientEvent::ReturnToLobby { .. } => EventTag::ReturnToLobby,
            ClientEvent::AckMatchResults => EventTag::AckMatchResults,
            ClientEvent::KickPlayer { .. } => EventTag::KickPlayer,
        }
    }
}

impl std::fmt::Display for EventTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.wire_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InputFrame;

    #[test]
    fn test_decode_frame_with_ack() {
        let raw = br#"{"event":"updateName","data":{"newName":"Nova"},"ack":7}"#;
        let frame = decode_client_frame(raw).unwrap();
        assert_eq!(frame.ack, Some(7));
        assert_eq!(
            frame.event,
            ClientEvent::UpdateName { new_name: "Nova".into() }
        );
    }

    #[test]
    fn test_decode_frame_without_ack() {
        let raw = br#"{"event":"playerReady"}"#;
        let frame = decode_client_frame(raw).unwrap();
        assert_eq!(frame.ack, None);
        assert_eq!(frame.event, ClientEvent::PlayerReady);
    }

    #[test]
    fn test_decode_optional_payload_event_without_data() {
        // createRoom's payload is entirely optional; clients may omit
        // the data key outright.
        let frame = decode_client_frame(br#"{"event":"createRoom"}"#).unwrap();
        assert_eq!(
            frame.event,
            ClientEvent::CreateRoom { player_name: None }
        );
        let frame =
            decode_client_frame(br#"{"event":"requestLobbyState"}"#).unwrap();
        assert_eq!(
            frame.event,
            ClientEvent::RequestLobbyState { room_code: None }
        );
    }

    #[test]
    fn test_decode_required_payload_event_without_data_is_bad() {
        // joinRoom requires a room code; no data is still a bad payload.
        assert!(matches!(
            decode_client_frame(br#"{"event":"joinRoom"}"#),
            Err(FrameError::BadPayload { event, .. }) if event == "joinRoom"
        ));
    }

    #[test]
    fn test_decode_garbage_is_malformed() {
        assert!(matches!(
            decode_client_frame(b"not json"),
            Err(FrameError::Malformed)
        ));
        assert!(matches!(
            decode_client_frame(b"[1,2,3]"),
            Err(FrameError::Malformed)
        ));
    }

    #[test]
    fn test_decode_unknown_event_is_classified() {
        let raw = br#"{"event":"flyToMoon","data":{}}"#;
        assert!(matches!(
            decode_client_frame(raw),
            Err(FrameError::UnknownEvent(name)) if name == "flyToMoon"
        ));
    }

    #[test]
    fn test_decode_known_event_bad_payload_is_classified() {
        // playerInput with a string where a bool belongs: strike-worthy.
        let raw = br#"{"event":"playerInput","data":{"w":"yes","a":false,"s":false,"d":false,"angle":0,"charging":false,"seq":1}}"#;
        assert!(matches!(
            decode_client_frame(raw),
            Err(FrameError::BadPayload { event, .. }) if event == "playerInput"
        ));
    }

    #[test]
    fn test_event_tag_wire_names_round_trip() {
        for tag in EventTag::ALL {
            assert_eq!(
                EventTag::from_wire_name(tag.wire_name()),
                Some(*tag)
            );
        }
    }

    #[test]
    fn test_event_tag_of_matches_wire_name() {
        let ev = ClientEvent::PlayerInput(InputFrame::default());
        assert_eq!(EventTag::of(&ev), EventTag::PlayerInput);
        assert_eq!(EventTag::of(&ev).wire_name(), "playerInput");
    }

    #[test]
    fn test_bucket_specs_for_hot_events() {
        assert_eq!(
            EventTag::PlayerInput.bucket(),
            BucketSpec { events: 90, window_ms: 1_000 }
        );
        assert_eq!(
            EventTag::FireProjectile.bucket(),
            BucketSpec { events: 18, window_ms: 1_000 }
        );
        assert_eq!(
            EventTag::CreateRoom.bucket(),
            BucketSpec { events: 4, window_ms: 10_000 }
        );
    }

    #[test]
    fn test_register_and_ping_skip_auth() {
        assert!(!EventTag::RegisterPlayer.requires_auth());
        assert!(!EventTag::Pong.requires_auth());
        assert!(!EventTag::ClientPing.requires_auth());
        assert!(EventTag::PlayerInput.requires_auth());
        assert!(EventTag::CreateRoom.requires_auth());
    }

    #[test]
    fn test_server_frame_echoes_ack() {
        let frame = ServerFrame::ack(
            ServerEvent::Heartbeat { t: 5 },
            Some(3),
        );
        let json: serde_json::Value = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["ack"], 3);
        assert_eq!(json["event"], "heartbeat");
    }
}
