//! Inbound event handlers, grouped by concern.

pub(crate) mod ads;
pub(crate) mod gameplay;
pub(crate) mod lobby;
pub(crate) mod register;
pub(crate) mod social;

use volley_identity::IdentityStore;
use volley_protocol::{ConnectionId, ErrorCode, PersistentId, ServerEvent};

use crate::ServerState;

/// The persistent id bound to a connection, or an `authError` to the
/// caller.
pub(crate) fn require_auth<I: IdentityStore>(
    state: &ServerState<I>,
    conn: ConnectionId,
) -> Option<PersistentId> {
    let pid = state
        .gateway
        .meta(conn)
        .and_then(|meta| meta.persistent_id);
    if pid.is_none() {
        state.gateway.emit(
            conn,
            ServerEvent::AuthError {
                code: ErrorCode::AuthRequired,
                message: "register first".into(),
            },
        );
    }
    pid
}
