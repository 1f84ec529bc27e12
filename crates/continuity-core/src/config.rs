//! Engine configuration: operating mode, capabilities, session descriptors.
//!
//! Configuration is read once from the environment at engine construction.
//! Unknown values fall back to the documented default rather than failing —
//! the engine layers between a dispatcher and a provider and must never
//! refuse to start over a typo.

use crate::budget::TokenMode;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Operating mode of the whole engine.
///
/// `Off` makes both public operations no-ops. `Passive` computes and caches
/// packs and runs the governor for metrics, but returns prompts unchanged
/// and writes no artifacts. `Active` is full behavior.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContinuityMode {
    #[default]
    Off,
    Passive,
    Active,
}

impl fmt::Display for ContinuityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContinuityMode::Off => write!(f, "off"),
            ContinuityMode::Passive => write!(f, "passive"),
            ContinuityMode::Active => write!(f, "active"),
        }
    }
}

impl FromStr for ContinuityMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "off" => Ok(ContinuityMode::Off),
            "passive" => Ok(ContinuityMode::Passive),
            "active" => Ok(ContinuityMode::Active),
            other => Err(format!(
                "unknown continuity mode '{other}', expected 'off', 'passive' or 'active'"
            )),
        }
    }
}

/// Which conversation style the sub-session is running in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    Plan,
    Agent,
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionMode::Plan => write!(f, "plan"),
            SessionMode::Agent => write!(f, "agent"),
        }
    }
}

impl FromStr for SessionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "plan" => Ok(SessionMode::Plan),
            "agent" => Ok(SessionMode::Agent),
            other => Err(format!(
                "unknown session mode '{other}', expected 'plan' or 'agent'"
            )),
        }
    }
}

/// Model provider the dispatcher is about to invoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Claude,
    Codex,
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::Claude => write!(f, "claude"),
            Provider::Codex => write!(f, "codex"),
        }
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "claude" => Ok(Provider::Claude),
            "codex" => Ok(Provider::Codex),
            other => Err(format!(
                "unknown provider '{other}', expected 'claude' or 'codex'"
            )),
        }
    }
}

/// Which governor actions the deployment has opted into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub snapshot_enabled: bool,
    pub rehydrate_enabled: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            snapshot_enabled: true,
            rehydrate_enabled: false,
        }
    }
}

/// Static configuration the engine is constructed with.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub mode: ContinuityMode,
    /// Fallback token mode; a settings-table row overrides this.
    pub token_mode: TokenMode,
    pub capabilities: Capabilities,
}

impl EngineConfig {
    /// Read configuration from the process environment.
    ///
    /// `CONTINUITY_MODE` selects the mode; the legacy `CONTINUITY_ENABLED=1`
    /// alias maps to `active` when no mode is set. Unknown values substitute
    /// the default.
    pub fn from_env() -> Self {
        let mode = match std::env::var("CONTINUITY_MODE") {
            Ok(v) => v.parse().unwrap_or_default(),
            Err(_) => {
                if env_flag("CONTINUITY_ENABLED", false) {
                    ContinuityMode::Active
                } else {
                    ContinuityMode::Off
                }
            }
        };
        let token_mode = std::env::var("CONTINUITY_TOKEN_MODE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or_default();
        let capabilities = Capabilities {
            snapshot_enabled: env_flag("CONTINUITY_SNAPSHOT_ENABLED", true),
            rehydrate_enabled: env_flag("CONTINUITY_REHYDRATE_ENABLED", false),
        };
        Self {
            mode,
            token_mode,
            capabilities,
        }
    }
}

fn env_flag(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(v) => v == "1" || v.eq_ignore_ascii_case("true"),
        Err(_) => default,
    }
}
