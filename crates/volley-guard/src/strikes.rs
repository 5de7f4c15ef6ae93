//! Strike accumulation and escalation.

use std::str::FromStr;

/// Whether escalations gate gameplay or only get recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GuardMode {
    /// Count and log; never reject gameplay events.
    #[default]
    Observe,
    /// Blocks reject the gated events until they expire.
    Enforce,
}

impl FromStr for GuardMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "observe" => Ok(GuardMode::Observe),
            "enforce" => Ok(GuardMode::Enforce),
            _ => Err(()),
        }
    }
}

/// Escalation actions, in severity order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum GuardAction {
    Warn,
    SoftBlock,
    HardBlock,
}

impl GuardAction {
    /// The wire/audit string.
    pub fn as_str(&self) -> &'static str {
        match self {
            GuardAction::Warn => "warn",
            GuardAction::SoftBlock => "softBlock",
            GuardAction::HardBlock => "hardBlock",
        }
    }
}

impl std::fmt::Display for GuardAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Engine thresholds and block durations.
#[derive(Debug, Clone)]
pub struct GuardConfig {
    pub mode: GuardMode,
    /// Strikes inside the window before a warning.
    pub warn_threshold: u32,
    /// Strikes before a soft block.
    pub soft_threshold: u32,
    /// Strikes before a hard block.
    pub hard_threshold: u32,
    pub soft_block_ms: u64,
    pub hard_block_ms: u64,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            mode: GuardMode::Observe,
            warn_threshold: 3,
            soft_threshold: 6,
            hard_threshold: 10,
            soft_block_ms: 3_000,
            hard_block_ms: 8_000,
        }
    }
}

impl GuardConfig {
    /// Clamps nonsense values so the engine is always safe to run:
    /// thresholds at least 1 and non-decreasing in severity order.
    pub fn validated(mut self) -> Self {
        self.warn_threshold = self.warn_threshold.max(1);
        self.soft_threshold = self.soft_threshold.max(self.warn_threshold);
        self.hard_threshold = self.hard_threshold.max(self.soft_threshold);
        self
    }
}

/// Which gameplay gate an event passes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateKind {
    /// `playerInput`: rejected only under a hard block.
    Input,
    /// `fireProjectile`: rejected under soft and hard blocks.
    Fire,
}

/// Verdict for a gated event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Allowed,
    /// Rejected by an active block. `should_log` is true at most once
    /// per log-cooldown interval so a held block can't flood the audit
    /// stream.
    Blocked { action: GuardAction, until: u64, should_log: bool },
}

/// One escalation produced by a strike.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Escalation {
    pub action: GuardAction,
    /// Strikes in the window at the moment of escalation.
    pub strikes: u32,
    /// When the block lifts; `None` for warnings.
    pub until: Option<u64>,
}

/// Per-player strike bookkeeping. Embedded in the player record so it
/// resets together with it.
#[derive(Debug, Clone, Copy, Default)]
pub struct StrikeState {
    window_started_at: u64,
    strikes_in_window: u32,
    warned: bool,
    level: Option<GuardAction>,
    blocked_until: u64,
    last_block_log: u64,
}

impl StrikeState {
    /// Strikes in the current window.
    pub fn strikes(&self) -> u32 {
        self.strikes_in_window
    }

    /// The highest action reached in the current window.
    pub fn level(&self) -> Option<GuardAction> {
        self.level
    }

    /// Whether a block is active at `now` (mode-independent).
    pub fn blocked_at(&self, now: u64) -> bool {
        self.level
            .map_or(false, |l| l >= GuardAction::SoftBlock)
            && now < self.blocked_until
    }
}

/// Applies strikes to per-player state and answers gate questions.
///
/// The engine is pure bookkeeping: audit writes and event emission are
/// the caller's job, driven by the returned [`Escalation`]s and
/// `should_log` flags.
#[derive(Debug, Clone)]
pub struct StrikeEngine {
    config: GuardConfig,
}

impl StrikeEngine {
    /// Strike accumulation window.
    pub const WINDOW_MS: u64 = 15_000;
    /// Minimum spacing of audit lines while a block holds.
    pub const BLOCK_LOG_COOLDOWN_MS: u64 = 1_200;

    pub fn new(config: GuardConfig) -> Self {
        Self { config: config.validated() }
    }

    pub fn mode(&self) -> GuardMode {
        self.config.mode
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    /// Records one strike. Returns the escalation it triggered, if any.
    pub fn record(&self, state: &mut StrikeState, now: u64) -> Option<Escalation> {
        if now.saturating_sub(state.window_started_at) >= Self::WINDOW_MS {
            state.window_started_at = now;
            state.strikes_in_window = 0;
            state.warned = false;
            // An unexpired block outlives the strike window.
            if now >= state.blocked_until {
                state.level = None;
            }
        }
        state.strikes_in_window += 1;
        let strikes = state.strikes_in_window;

        if strikes >= self.config.hard_threshold
            && state.level != Some(GuardAction::HardBlock)
        {
            state.level = Some(GuardAction::HardBlock);
            state.blocked_until = now + self.config.hard_block_ms;
            return Some(Escalation {
                action: GuardAction::HardBlock,
                strikes,
                until: Some(state.blocked_until),
            });
        }
        if strikes >= self.config.soft_threshold
            && state.level.map_or(true, |l| l < GuardAction::SoftBlock)
        {
            state.level = Some(GuardAction::SoftBlock);
            state.blocked_until = now + self.config.soft_block_ms;
            return Some(Escalation {
                action: GuardAction::SoftBlock,
                strikes,
                until: Some(state.blocked_until),
            });
        }
        if strikes >= self.config.warn_threshold && !state.warned {
            state.warned = true;
            if state.level.is_none() {
                state.level = Some(GuardAction::Warn);
            }
            return Some(Escalation {
                action: GuardAction::Warn,
                strikes,
                until: None,
            });
        }
        None
    }

    /// Whether `kind` passes the player's current block state.
    ///
    /// Always [`GateDecision::Allowed`] in observe mode; the block state
    /// is still tracked, it just never bites.
    pub fn gate(
        &self,
        state: &mut StrikeState,
        kind: GateKind,
        now: u64,
    ) -> GateDecision {
        if self.config.mode == GuardMode::Observe {
            return GateDecision::Allowed;
        }
        let Some(level) = state.level else {
            return GateDecision::Allowed;
        };
        if now >= state.blocked_until {
            return GateDecision::Allowed;
        }
        let bites = match kind {
            GateKind::Fire => level >= GuardAction::SoftBlock,
            GateKind::Input => level >= GuardAction::HardBlock,
        };
        if !bites {
            return GateDecision::Allowed;
        }
        let should_log = now.saturating_sub(state.last_block_log)
            >= Self::BLOCK_LOG_COOLDOWN_MS;
        if should_log {
            state.last_block_log = now;
        }
        GateDecision::Blocked { action: level, until: state.blocked_until, should_log }
    }
}
