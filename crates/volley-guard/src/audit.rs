//! Append-only abuse audit.
//!
//! Three JSONL streams under the data directory:
//!
//! - `anti-cheat-recent.jsonl` — every strike.
//! - `anti-cheat-escalations.jsonl` — every warn/soft/hard escalation.
//! - `anti-cheat-room-snapshots.jsonl` — per-room aggregate snapshots at
//!   match end.
//!
//! Each line is a self-contained JSON object. Writes go through buffered
//! writers behind file-level locks; the tick never waits on them beyond
//! the in-memory append. [`AuditLog::flush`] is called on shutdown and
//! periodically from housekeeping.
//!
//! The most recent strikes are additionally kept in an in-memory ring
//! (capped at [`AuditLog::RING_CAPACITY`]) for the admin surface.

use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use volley_protocol::{ConnectionId, PersistentId, RoomCode};

use crate::{GuardAction, GuardError, StrikeReason};

/// One audited strike or escalation line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrikeRecord {
    pub ts: u64,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<RoomCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection: Option<ConnectionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player: Option<PersistentId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub details: serde_json::Value,
}

impl StrikeRecord {
    /// A bare record for `reason` at `ts`; context fields are filled by
    /// the caller's builder-style assignments.
    pub fn new(ts: u64, reason: StrikeReason) -> Self {
        Self {
            ts,
            reason: reason.as_str().into_owned(),
            action: None,
            room: None,
            connection: None,
            player: None,
            name: None,
            details: serde_json::Value::Null,
        }
    }

    pub fn action(mut self, action: GuardAction) -> Self {
        self.action = Some(action.as_str().to_string());
        self
    }

    pub fn room(mut self, room: RoomCode) -> Self {
        self.room = Some(room);
        self
    }

    pub fn connection(mut self, connection: ConnectionId) -> Self {
        self.connection = Some(connection);
        self
    }

    pub fn player(mut self, player: PersistentId, name: impl Into<String>) -> Self {
        self.player = Some(player);
        self.name = Some(name.into());
        self
    }

    pub fn details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}

struct Stream {
    writer: Option<Mutex<BufWriter<File>>>,
}

impl Stream {
    fn open(path: &Path) -> Result<Self, GuardError> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { writer: Some(Mutex::new(BufWriter::new(file))) })
    }

    fn disabled() -> Self {
        Self { writer: None }
    }

    fn append(&self, value: &impl Serialize) {
        let Some(writer) = &self.writer else { return };
        let Ok(line) = serde_json::to_vec(value) else { return };
        // A poisoned lock means another appender panicked mid-write;
        // the audit stream is best-effort, so keep going.
        let mut guard = match writer.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        let _ = guard.write_all(&line);
        let _ = guard.write_all(b"\n");
    }

    fn flush(&self) {
        if let Some(writer) = &self.writer {
            let mut guard = match writer.lock() {
                Ok(g) => g,
                Err(poisoned) => poisoned.into_inner(),
            };
            if let Err(e) = guard.flush() {
                tracing::warn!(error = %e, "audit flush failed");
            }
        }
    }
}

/// The append-only audit log plus the recent-strikes ring.
pub struct AuditLog {
    recent: Stream,
    escalations: Stream,
    room_snapshots: Stream,
    ring: Mutex<VecDeque<StrikeRecord>>,
}

impl AuditLog {
    /// Maximum strikes held in memory for the admin surface.
    pub const RING_CAPACITY: usize = 100;

    /// Opens (creating as needed) the three streams under `data_dir`.
    pub fn open(data_dir: &Path) -> Result<Self, GuardError> {
        std::fs::create_dir_all(data_dir)?;
        Ok(Self {
            recent: Stream::open(&data_dir.join("anti-cheat-recent.jsonl"))?,
            escalations: Stream::open(
                &data_dir.join("anti-cheat-escalations.jsonl"),
            )?,
            room_snapshots: Stream::open(
                &data_dir.join("anti-cheat-room-snapshots.jsonl"),
            )?,
            ring: Mutex::new(VecDeque::with_capacity(Self::RING_CAPACITY)),
        })
    }

    /// An audit log that keeps the ring but writes no files. For tests
    /// and ephemeral deployments.
    pub fn in_memory() -> Self {
        Self {
            recent: Stream::disabled(),
            escalations: Stream::disabled(),
            room_snapshots: Stream::disabled(),
            ring: Mutex::new(VecDeque::with_capacity(Self::RING_CAPACITY)),
        }
    }

    /// Appends a strike to the recent stream and the ring.
    pub fn record_strike(&self, record: StrikeRecord) {
        self.recent.append(&record);
        let mut ring = match self.ring.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        if ring.len() == Self::RING_CAPACITY {
            ring.pop_front();
        }
        ring.push_back(record);
    }

    /// Appends an escalation to the escalations stream.
    pub fn record_escalation(&self, record: StrikeRecord) {
        self.escalations.append(&record);
    }

    /// Appends a per-room aggregate snapshot.
    pub fn record_room_snapshot(&self, snapshot: &serde_json::Value) {
        self.room_snapshots.append(snapshot);
    }

    /// The most recent strikes, oldest first.
    pub fn recent_strikes(&self) -> Vec<StrikeRecord> {
        match self.ring.lock() {
            Ok(g) => g.iter().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().iter().cloned().collect(),
        }
    }

    /// Flushes all buffered writers.
    pub fn flush(&self) {
        self.recent.flush();
        self.escalations.flush();
        self.room_snapshots.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(ts: u64) -> StrikeRecord {
        StrikeRecord::new(ts, StrikeReason::FireRateViolation)
            .room(RoomCode::parse("12345").unwrap())
            .connection(ConnectionId(7))
            .player(PersistentId::parse("device-1").unwrap(), "Nova")
            .details(json!({ "sinceLastShotMs": 50 }))
    }

    #[test]
    fn test_strike_lines_are_self_contained_json() {
        let dir = tempfile::tempdir().unwrap();
        let log = AuditLog::open(dir.path()).unwrap();
        log.record_strike(record(1_000));
        log.record_strike(record(2_000));
        log.flush();

        let raw = std::fs::read_to_string(
            dir.path().join("anti-cheat-recent.jsonl"),
        )
        .unwrap();
        let lines: Vec<&str> = raw.lines().collect();
        assert_eq!(lines.len(), 2);
        for line in lines {
            let parsed: StrikeRecord = serde_json::from_str(line).unwrap();
            assert_eq!(parsed.reason, "fire_rate_violation");
            assert_eq!(parsed.name.as_deref(), Some("Nova"));
        }
    }

    #[test]
    fn test_escalations_go_to_their_own_stream() {
        let dir = tempfile::tempdir().unwrap();
        let log = AuditLog::open(dir.path()).unwrap();
        log.record_escalation(
            record(1_000).action(crate::GuardAction::SoftBlock),
        );
        log.flush();

        let escalations = std::fs::read_to_string(
            dir.path().join("anti-cheat-escalations.jsonl"),
        )
        .unwrap();
        assert_eq!(escalations.lines().count(), 1);
        let parsed: StrikeRecord =
            serde_json::from_str(escalations.lines().next().unwrap()).unwrap();
        assert_eq!(parsed.action.as_deref(), Some("softBlock"));

        let recent = std::fs::read_to_string(
            dir.path().join("anti-cheat-recent.jsonl"),
        )
        .unwrap();
        assert!(recent.is_empty());
    }

    #[test]
    fn test_ring_caps_at_capacity() {
        let log = AuditLog::in_memory();
        for i in 0..150 {
            log.record_strike(record(i));
        }
        let recent = log.recent_strikes();
        assert_eq!(recent.len(), AuditLog::RING_CAPACITY);
        // Oldest retained entry is strike 50.
        assert_eq!(recent.first().unwrap().ts, 50);
        assert_eq!(recent.last().unwrap().ts, 149);
    }

    #[test]
    fn test_in_memory_mode_writes_no_files() {
        let log = AuditLog::in_memory();
        log.record_strike(record(1_000));
        log.record_escalation(record(1_000));
        log.record_room_snapshot(&json!({"room": "12345"}));
        log.flush();
        assert_eq!(log.recent_strikes().len(), 1);
    }

    #[test]
    fn test_open_appends_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        {
            let log = AuditLog::open(dir.path()).unwrap();
            log.record_strike(record(1_000));
            log.flush();
        }
        {
            let log = AuditLog::open(dir.path()).unwrap();
            log.record_strike(record(2_000));
            log.flush();
        }
        let raw = std::fs::read_to_string(
            dir.path().join("anti-cheat-recent.jsonl"),
        )
        .unwrap();
        assert_eq!(raw.lines().count(), 2);
    }
}
