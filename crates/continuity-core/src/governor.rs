//! The post-run governor: threshold-driven pressure tracking.
//!
//! Five heterogeneous signals are compared against two parallel threshold
//! sets. Two or more reasons at a level trigger that level's action.
//! Capability gating can only ever demote the decided action, so with
//! rehydration disabled no caller observes `Rehydrate`.

use crate::config::Capabilities;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Snapshot-level thresholds.
const SNAPSHOT_TURNS: u32 = 7;
const SNAPSHOT_BYTES: u64 = 90_000;
const SNAPSHOT_FILES: usize = 10;
const SNAPSHOT_DIFF_LINES: u64 = 160;
const SNAPSHOT_ELAPSED_MS: u64 = 25 * 60 * 1000;

/// Rehydrate-level thresholds.
const REHYDRATE_TURNS: u32 = 12;
const REHYDRATE_BYTES: u64 = 150_000;
const REHYDRATE_FILES: usize = 18;
const REHYDRATE_DIFF_LINES: u64 = 280;
const REHYDRATE_ELAPSED_MS: u64 = 50 * 60 * 1000;

/// Reasons required at one level before its action fires.
const MIN_REASONS: usize = 2;

/// Cumulative pressure signals for one sub-session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GovernorInputs {
    pub turns_since_snapshot: u32,
    pub total_injected_bytes: u64,
    pub changed_files_count: usize,
    pub diff_lines: u64,
    /// `None` means no prior snapshot, which counts as infinitely elapsed.
    pub elapsed_since_snapshot_ms: Option<u64>,
}

/// What the governor wants done after this turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GovernorAction {
    Ok,
    Snapshot,
    Rehydrate,
}

impl fmt::Display for GovernorAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GovernorAction::Ok => write!(f, "ok"),
            GovernorAction::Snapshot => write!(f, "snapshot"),
            GovernorAction::Rehydrate => write!(f, "rehydrate"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GovernorDecision {
    pub action: GovernorAction,
    pub reasons: Vec<String>,
}

impl GovernorDecision {
    fn ok() -> Self {
        Self {
            action: GovernorAction::Ok,
            reasons: Vec::new(),
        }
    }
}

/// Decide the raw action from pressure alone, before capability gating.
pub fn decide(inputs: &GovernorInputs) -> GovernorDecision {
    let elapsed = inputs.elapsed_since_snapshot_ms;
    let elapsed_at_least = |threshold: u64| elapsed.map(|ms| ms >= threshold).unwrap_or(true);

    let mut snapshot_reasons = Vec::new();
    let mut rehydrate_reasons = Vec::new();
    let mut check = |snapshot_hit: bool, rehydrate_hit: bool, reason: &str| {
        if snapshot_hit {
            snapshot_reasons.push(reason.to_string());
        }
        if rehydrate_hit {
            rehydrate_reasons.push(reason.to_string());
        }
    };

    check(
        inputs.turns_since_snapshot >= SNAPSHOT_TURNS,
        inputs.turns_since_snapshot >= REHYDRATE_TURNS,
        "turn-pressure",
    );
    check(
        inputs.total_injected_bytes >= SNAPSHOT_BYTES,
        inputs.total_injected_bytes >= REHYDRATE_BYTES,
        "byte-pressure",
    );
    check(
        inputs.changed_files_count >= SNAPSHOT_FILES,
        inputs.changed_files_count >= REHYDRATE_FILES,
        "file-pressure",
    );
    check(
        inputs.diff_lines >= SNAPSHOT_DIFF_LINES,
        inputs.diff_lines >= REHYDRATE_DIFF_LINES,
        "diff-pressure",
    );
    check(
        elapsed_at_least(SNAPSHOT_ELAPSED_MS),
        elapsed_at_least(REHYDRATE_ELAPSED_MS),
        "time-pressure",
    );

    if rehydrate_reasons.len() >= MIN_REASONS {
        GovernorDecision {
            action: GovernorAction::Rehydrate,
            reasons: rehydrate_reasons,
        }
    } else if snapshot_reasons.len() >= MIN_REASONS {
        GovernorDecision {
            action: GovernorAction::Snapshot,
            reasons: snapshot_reasons,
        }
    } else {
        GovernorDecision::ok()
    }
}

/// Degrade the decided action to whatever the deployment has enabled.
/// Reasons are preserved so telemetry can still explain the pressure.
pub fn gate(decision: GovernorDecision, caps: &Capabilities) -> GovernorDecision {
    let action = match decision.action {
        GovernorAction::Rehydrate if !caps.rehydrate_enabled => {
            if caps.snapshot_enabled {
                GovernorAction::Snapshot
            } else {
                GovernorAction::Ok
            }
        }
        GovernorAction::Snapshot if !caps.snapshot_enabled => GovernorAction::Ok,
        action => action,
    };
    GovernorDecision {
        action,
        reasons: decision.reasons,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet() -> GovernorInputs {
        GovernorInputs {
            turns_since_snapshot: 0,
            total_injected_bytes: 0,
            changed_files_count: 0,
            diff_lines: 0,
            elapsed_since_snapshot_ms: Some(0),
        }
    }

    #[test]
    fn quiet_session_is_ok() {
        let d = decide(&quiet());
        assert_eq!(d.action, GovernorAction::Ok);
        assert!(d.reasons.is_empty());
    }

    #[test]
    fn single_reason_is_not_enough() {
        let d = decide(&GovernorInputs {
            diff_lines: 200,
            ..quiet()
        });
        assert_eq!(d.action, GovernorAction::Ok);
    }

    #[test]
    fn two_snapshot_reasons_snapshot() {
        let d = decide(&GovernorInputs {
            turns_since_snapshot: 7,
            diff_lines: 210,
            ..quiet()
        });
        assert_eq!(d.action, GovernorAction::Snapshot);
        assert!(d.reasons.contains(&"turn-pressure".into()));
        assert!(d.reasons.contains(&"diff-pressure".into()));
    }

    #[test]
    fn two_rehydrate_reasons_rehydrate() {
        let d = decide(&GovernorInputs {
            turns_since_snapshot: 12,
            total_injected_bytes: 150_000,
            ..quiet()
        });
        assert_eq!(d.action, GovernorAction::Rehydrate);
        assert_eq!(d.reasons, vec!["turn-pressure", "byte-pressure"]);
    }

    #[test]
    fn missing_snapshot_counts_as_infinite_elapsed() {
        // No prior snapshot: time-pressure fires at both levels, so one
        // more rehydrate-level signal is enough.
        let d = decide(&GovernorInputs {
            turns_since_snapshot: 12,
            elapsed_since_snapshot_ms: None,
            ..quiet()
        });
        assert_eq!(d.action, GovernorAction::Rehydrate);
    }

    #[test]
    fn gating_degrades_rehydrate_to_snapshot() {
        let decision = GovernorDecision {
            action: GovernorAction::Rehydrate,
            reasons: vec!["turn-pressure".into(), "byte-pressure".into()],
        };
        let gated = gate(decision, &Capabilities::default());
        assert_eq!(gated.action, GovernorAction::Snapshot);
        assert_eq!(gated.reasons.len(), 2);
    }

    #[test]
    fn gating_degrades_to_ok_when_all_disabled() {
        let caps = Capabilities {
            snapshot_enabled: false,
            rehydrate_enabled: false,
        };
        let decision = GovernorDecision {
            action: GovernorAction::Rehydrate,
            reasons: vec!["turn-pressure".into(), "byte-pressure".into()],
        };
        assert_eq!(gate(decision, &caps).action, GovernorAction::Ok);
        let snapshot = GovernorDecision {
            action: GovernorAction::Snapshot,
            reasons: vec![],
        };
        assert_eq!(gate(snapshot, &caps).action, GovernorAction::Ok);
    }

    #[test]
    fn gating_passes_through_when_enabled() {
        let caps = Capabilities {
            snapshot_enabled: true,
            rehydrate_enabled: true,
        };
        let decision = GovernorDecision {
            action: GovernorAction::Rehydrate,
            reasons: vec![],
        };
        assert_eq!(gate(decision, &caps).action, GovernorAction::Rehydrate);
    }
}
