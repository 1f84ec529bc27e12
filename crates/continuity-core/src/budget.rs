//! Byte and count budgets for pack assembly.
//!
//! Each [`TokenMode`] selects one of three static [`BudgetProfile`]s. The
//! profiles are hard ceilings: the assembler clamps the finished pack to
//! `max_pack_bytes`, and the context builder stops adding summaries once
//! `max_context_summary_bytes` would be exceeded.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How much context the engine is allowed to inject per turn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenMode {
    /// Tight budget for cost-sensitive sessions.
    Low,
    #[default]
    Normal,
    /// Generous budget for debugging pack contents.
    Debug,
}

impl TokenMode {
    pub fn profile(&self) -> BudgetProfile {
        match self {
            TokenMode::Low => BudgetProfile {
                max_pack_bytes: 14_000,
                max_context_files: 4,
                max_context_summary_bytes: 9_000,
                max_file_read_bytes: 90_000,
            },
            TokenMode::Normal => BudgetProfile {
                max_pack_bytes: 24_000,
                max_context_files: 8,
                max_context_summary_bytes: 16_000,
                max_file_read_bytes: 180_000,
            },
            TokenMode::Debug => BudgetProfile {
                max_pack_bytes: 42_000,
                max_context_files: 12,
                max_context_summary_bytes: 24_000,
                max_file_read_bytes: 300_000,
            },
        }
    }
}

impl fmt::Display for TokenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenMode::Low => write!(f, "low"),
            TokenMode::Normal => write!(f, "normal"),
            TokenMode::Debug => write!(f, "debug"),
        }
    }
}

impl FromStr for TokenMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(TokenMode::Low),
            "normal" => Ok(TokenMode::Normal),
            "debug" => Ok(TokenMode::Debug),
            other => Err(format!(
                "unknown token mode '{other}', expected 'low', 'normal' or 'debug'"
            )),
        }
    }
}

/// Hard ceilings applied while assembling one context pack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BudgetProfile {
    /// Byte cap on the whole labeled envelope (user prompt excluded).
    pub max_pack_bytes: usize,
    /// How many files the context pack may summarize.
    pub max_context_files: usize,
    /// Byte cap on the accumulated file summaries.
    pub max_context_summary_bytes: usize,
    /// Files larger than this are skipped entirely.
    pub max_file_read_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profiles_scale_monotonically() {
        let low = TokenMode::Low.profile();
        let normal = TokenMode::Normal.profile();
        let debug = TokenMode::Debug.profile();
        assert!(low.max_pack_bytes < normal.max_pack_bytes);
        assert!(normal.max_pack_bytes < debug.max_pack_bytes);
        assert!(low.max_context_files < normal.max_context_files);
        assert!(normal.max_context_summary_bytes < debug.max_context_summary_bytes);
    }

    #[test]
    fn normal_profile_values() {
        let p = TokenMode::Normal.profile();
        assert_eq!(p.max_pack_bytes, 24_000);
        assert_eq!(p.max_context_files, 8);
        assert_eq!(p.max_context_summary_bytes, 16_000);
        assert_eq!(p.max_file_read_bytes, 180_000);
    }

    #[test]
    fn mode_roundtrip() {
        assert_eq!("low".parse::<TokenMode>().unwrap(), TokenMode::Low);
        assert_eq!("NORMAL".parse::<TokenMode>().unwrap(), TokenMode::Normal);
        assert_eq!("debug".parse::<TokenMode>().unwrap(), TokenMode::Debug);
        assert!("verbose".parse::<TokenMode>().is_err());
    }

    #[test]
    fn default_is_normal() {
        assert_eq!(TokenMode::default(), TokenMode::Normal);
    }
}
