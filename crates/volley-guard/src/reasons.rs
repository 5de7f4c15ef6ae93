//! Strike reasons.
//!
//! Internally an enum; on the wire and in the audit log, the stable
//! snake_case strings that dashboards already filter on.

use std::borrow::Cow;

use volley_protocol::EventTag;

/// Why a strike was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrikeReason {
    /// Two shots closer together than the fire cadence allows.
    FireRateViolation,
    /// Fire angle diverged from the current input angle past the warning
    /// threshold but below the hard-reject threshold.
    FireAngleWarn,
    /// Fire angle diverged past the hard-reject threshold.
    FireAngleHardReject,
    /// Fire angle was not a finite number.
    FireAngleInvalid,
    /// Charge was not held long enough before firing.
    FireChargeViolation,
    /// Claimed muzzle origin is not where the shooter stands.
    FireOriginViolation,
    /// Segment from shooter to muzzle origin passes through cover.
    FirePathOccluded,
    /// Shooter already owns the maximum number of live projectiles.
    FireProjectileCap,
    /// Fired into an active block; still counted so a sustained
    /// violator reaches the next escalation.
    FireWhileBlocked,
    /// Fired with no recent movement input on record.
    FireStaleInput,
    /// Input sequence fell outside the accepted window.
    InputSeqWindowViolation,
    /// Input sequence outside the absolute sane range.
    InputSeqRangeViolation,
    /// Input angle was not a finite number.
    InputAngleInvalid,
    /// Movement-key toggling exceeded the spam meter.
    InputToggleSpam,
    /// A known event arrived with a payload that failed validation.
    MalformedPayload(EventTag),
    /// An event exceeded its token bucket.
    RateLimit(EventTag),
}

impl StrikeReason {
    /// The stable audit/wire string.
    pub fn as_str(&self) -> Cow<'static, str> {
        match self {
            StrikeReason::FireRateViolation => "fire_rate_violation".into(),
            StrikeReason::FireAngleWarn => "fire_angle_warn".into(),
            StrikeReason::FireAngleHardReject => {
                "fire_angle_hard_reject".into()
            }
            StrikeReason::FireAngleInvalid => "fire_angle_invalid".into(),
            StrikeReason::FireChargeViolation => {
                "fire_charge_violation".into()
            }
            StrikeReason::FireOriginViolation => {
                "fire_origin_violation".into()
            }
            StrikeReason::FirePathOccluded => "fire_path_occluded".into(),
            StrikeReason::FireProjectileCap => "fire_projectile_cap".into(),
            StrikeReason::FireWhileBlocked => "fire_while_blocked".into(),
            StrikeReason::FireStaleInput => "fire_stale_input".into(),
            StrikeReason::InputSeqWindowViolation => {
                "input_seq_window_violation".into()
            }
            StrikeReason::InputSeqRangeViolation => {
                "input_seq_range_violation".into()
            }
            StrikeReason::InputAngleInvalid => "input_angle_invalid".into(),
            StrikeReason::InputToggleSpam => "input_toggle_spam".into(),
            StrikeReason::MalformedPayload(tag) => {
                format!("malformed_payload:{}", tag.wire_name()).into()
            }
            StrikeReason::RateLimit(tag) => {
                format!("rate_limit:{}", tag.wire_name()).into()
            }
        }
    }
}

impl std::fmt::Display for StrikeReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_reasons_are_stable() {
        assert_eq!(
            StrikeReason::FireRateViolation.as_str(),
            "fire_rate_violation"
        );
        assert_eq!(
            StrikeReason::InputSeqWindowViolation.as_str(),
            "input_seq_window_violation"
        );
        assert_eq!(
            StrikeReason::InputToggleSpam.as_str(),
            "input_toggle_spam"
        );
        assert_eq!(
            StrikeReason::FireAngleHardReject.as_str(),
            "fire_angle_hard_reject"
        );
    }

    #[test]
    fn test_parameterized_reasons_embed_event_name() {
        assert_eq!(
            StrikeReason::RateLimit(EventTag::FireProjectile).as_str(),
            "rate_limit:fireProjectile"
        );
        assert_eq!(
            StrikeReason::MalformedPayload(EventTag::PlayerInput).as_str(),
            "malformed_payload:playerInput"
        );
    }
}
