//! Server configuration from the environment.

use std::path::PathBuf;

use rand::RngCore;
use volley_guard::{GuardConfig, GuardMode};
use volley_tick::{DEFAULT_TICK_RATE_HZ, MAX_TICK_RATE_HZ, MIN_TICK_RATE_HZ};

/// Bounds for the full-snapshot interval.
const SNAPSHOT_INTERVAL_MIN_MS: u64 = 250;
const SNAPSHOT_INTERVAL_MAX_MS: u64 = 5_000;
const SNAPSHOT_INTERVAL_DEFAULT_MS: u64 = 1_000;

/// Everything the server reads from its environment.
#[derive(Debug, Clone)]
pub struct VolleyConfig {
    /// `PORT` — TCP port to listen on.
    pub port: u16,
    /// `TICK_RATE` — simulation rate in Hz, 10–60.
    pub tick_rate_hz: u32,
    /// `STATE_FULL_SNAPSHOT_INTERVAL_MS` — ceiling between full
    /// snapshots, 250–5000.
    pub snapshot_interval_ms: u64,
    /// `SESSION_SECRET` — HMAC key for session tokens.
    pub session_secret: Vec<u8>,
    /// `ANTI_CHEAT_*` — mode, thresholds, block durations.
    pub guard: GuardConfig,
    /// `DATA_DIR` — where the audit streams live.
    pub data_dir: PathBuf,
}

impl Default for VolleyConfig {
    fn default() -> Self {
        Self {
            port: 8443,
            tick_rate_hz: DEFAULT_TICK_RATE_HZ,
            snapshot_interval_ms: SNAPSHOT_INTERVAL_DEFAULT_MS,
            session_secret: random_secret(),
            guard: GuardConfig::default(),
            data_dir: PathBuf::from("./data"),
        }
    }
}

impl VolleyConfig {
    /// Reads the recognized environment variables, clamping anything
    /// out of range.
    pub fn from_env() -> Self {
        let defaults = GuardConfig::default();

        let session_secret = match std::env::var("SESSION_SECRET") {
            Ok(secret) if !secret.trim().is_empty() => {
                secret.into_bytes()
            }
            _ => {
                tracing::warn!(
                    "SESSION_SECRET not set, using an ephemeral secret; \
                     session tokens will not survive a restart"
                );
                random_secret()
            }
        };

        let mode = std::env::var("ANTI_CHEAT_MODE")
            .ok()
            .and_then(|raw| {
                raw.parse::<GuardMode>()
                    .map_err(|_| {
                        tracing::warn!(value = %raw, "unknown ANTI_CHEAT_MODE, defaulting to observe");
                    })
                    .ok()
            })
            .unwrap_or_default();

        let config = Self {
            port: env_parsed("PORT").unwrap_or(8443),
            tick_rate_hz: env_parsed("TICK_RATE")
                .unwrap_or(DEFAULT_TICK_RATE_HZ),
            snapshot_interval_ms: env_parsed(
                "STATE_FULL_SNAPSHOT_INTERVAL_MS",
            )
            .unwrap_or(SNAPSHOT_INTERVAL_DEFAULT_MS),
            session_secret,
            guard: GuardConfig {
                mode,
                warn_threshold: env_parsed("ANTI_CHEAT_WARN_THRESHOLD")
                    .unwrap_or(defaults.warn_threshold),
                soft_threshold: env_parsed("ANTI_CHEAT_SOFT_THRESHOLD")
                    .unwrap_or(defaults.soft_threshold),
                hard_threshold: env_parsed("ANTI_CHEAT_HARD_THRESHOLD")
                    .unwrap_or(defaults.hard_threshold),
                soft_block_ms: env_parsed("ANTI_CHEAT_SOFT_BLOCK_MS")
                    .unwrap_or(defaults.soft_block_ms),
                hard_block_ms: env_parsed("ANTI_CHEAT_HARD_BLOCK_MS")
                    .unwrap_or(defaults.hard_block_ms),
            },
            data_dir: std::env::var("DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./data")),
        };
        config.validated()
    }

    /// Clamps out-of-range values.
    pub fn validated(mut self) -> Self {
        if !(MIN_TICK_RATE_HZ..=MAX_TICK_RATE_HZ).contains(&self.tick_rate_hz)
        {
            tracing::warn!(
                rate = self.tick_rate_hz,
                "TICK_RATE out of range, clamping"
            );
            self.tick_rate_hz = self
                .tick_rate_hz
                .clamp(MIN_TICK_RATE_HZ, MAX_TICK_RATE_HZ);
        }
        if !(SNAPSHOT_INTERVAL_MIN_MS..=SNAPSHOT_INTERVAL_MAX_MS)
            .contains(&self.snapshot_interval_ms)
        {
            tracing::warn!(
                interval = self.snapshot_interval_ms,
                "STATE_FULL_SNAPSHOT_INTERVAL_MS out of range, clamping"
            );
            self.snapshot_interval_ms = self
                .snapshot_interval_ms
                .clamp(SNAPSHOT_INTERVAL_MIN_MS, SNAPSHOT_INTERVAL_MAX_MS);
        }
        self.guard = self.guard.clone().validated();
        self
    }

    /// The listen address.
    pub fn bind_addr(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }
}

fn env_parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|raw| raw.trim().parse().ok())
}

fn random_secret() -> Vec<u8> {
    let mut secret = vec![0u8; 32];
    rand::rng().fill_bytes(&mut secret);
    secret
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = VolleyConfig::default().validated();
        assert_eq!(config.tick_rate_hz, 30);
        assert_eq!(config.snapshot_interval_ms, 1_000);
        assert_eq!(config.session_secret.len(), 32);
    }

    #[test]
    fn test_validated_clamps_ranges() {
        let config = VolleyConfig {
            tick_rate_hz: 500,
            snapshot_interval_ms: 10,
            ..VolleyConfig::default()
        }
        .validated();
        assert_eq!(config.tick_rate_hz, 60);
        assert_eq!(config.snapshot_interval_ms, 250);
    }

    #[test]
    fn test_bind_addr_uses_port() {
        let config =
            VolleyConfig { port: 9100, ..VolleyConfig::default() };
        assert_eq!(config.bind_addr(), "0.0.0.0:9100");
    }
}
