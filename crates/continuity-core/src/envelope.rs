//! The labeled envelope prepended to user prompts.
//!
//! Label strings and section order are an external contract: downstream
//! prompt templates and tests match on them byte-for-byte. Do not reword.

use crate::hash::clamp_by_bytes;
use crate::state::{normalize_prompt, StateIds};

pub const STATE_IDS_LABEL: &str = "[1CODE_CONTINUITY_STATE_IDS]";
pub const ANCHOR_LABEL: &str = "[1CODE_CONTINUITY_ANCHOR]";
pub const CONTEXT_LABEL: &str = "[1CODE_CONTINUITY_CONTEXT]";
pub const PLAN_CONTRACT_LABEL: &str = "[1CODE_PLAN_CONTRACT]";
pub const DELTA_LABEL: &str = "[1CODE_CONTINUITY_DELTA]";
pub const OBJECTIVE_LABEL: &str = "[1CODE_OBJECTIVE]";
pub const USER_REQUEST_LABEL: &str = "[1CODE_USER_REQUEST]";
pub const REHYDRATE_LABEL: &str = "[1CODE_CONTINUITY_REHYDRATE]";

/// Byte cap on the objective line.
const MAX_OBJECTIVE_BYTES: usize = 200;

/// First non-blank line of the prompt, clamped.
pub fn objective_line(prompt: &str) -> String {
    let line = prompt
        .lines()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("")
        .trim();
    clamp_by_bytes(line, MAX_OBJECTIVE_BYTES)
}

/// Plan-contract block for plan-mode turns: the contract id plus the
/// objective the plan is expected to satisfy.
pub fn plan_contract(prompt: &str) -> String {
    format!(
        "contract_id: {}\nobjective: {}",
        crate::hash::sha256_hex(&normalize_prompt(prompt)),
        objective_line(prompt)
    )
}

/// Assemble the full envelope, ending with the bare user-request label.
///
/// The caller appends `\n\n` and the original prompt after the clamp; the
/// stored pack therefore always ends with [`USER_REQUEST_LABEL`].
pub fn assemble_full(
    state_ids: &StateIds,
    anchor: &str,
    context: &str,
    plan_contract: Option<&str>,
    delta: &str,
    objective: &str,
    max_pack_bytes: usize,
) -> String {
    let mut sections = vec![
        section(STATE_IDS_LABEL, &state_ids.render()),
        section(ANCHOR_LABEL, anchor),
        section(CONTEXT_LABEL, context),
    ];
    if let Some(contract) = plan_contract {
        sections.push(section(PLAN_CONTRACT_LABEL, contract));
    }
    sections.push(section(DELTA_LABEL, delta));
    sections.push(section(OBJECTIVE_LABEL, objective));
    sections.push(USER_REQUEST_LABEL.to_string());
    clamp_by_bytes(&sections.join("\n\n"), max_pack_bytes)
}

/// Assemble the reduced envelope used once the model has already seen the
/// full pack for this cache key.
pub fn assemble_delta_only(
    state_ids: &StateIds,
    delta: &str,
    objective: &str,
    max_pack_bytes: usize,
) -> String {
    let sections = [
        section(STATE_IDS_LABEL, &state_ids.render()),
        section(DELTA_LABEL, delta),
        section(OBJECTIVE_LABEL, objective),
        USER_REQUEST_LABEL.to_string(),
    ];
    clamp_by_bytes(&sections.join("\n\n"), max_pack_bytes)
}

/// Final prompt: pack, blank line, original request.
pub fn compose_prompt(pack: &str, prompt: &str) -> String {
    format!("{pack}\n\n{prompt}")
}

fn section(label: &str, body: &str) -> String {
    format!("{label}\n{body}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids() -> StateIds {
        StateIds {
            anchor_pack_id: Some("a".repeat(8)),
            context_pack_id: Some("c".repeat(8)),
            plan_contract_id: None,
            delta_pack_id: Some("d".repeat(8)),
        }
    }

    // The label strings are an external contract; pin them byte-for-byte.
    #[test]
    fn label_strings_are_stable() {
        assert_eq!(STATE_IDS_LABEL, "[1CODE_CONTINUITY_STATE_IDS]");
        assert_eq!(ANCHOR_LABEL, "[1CODE_CONTINUITY_ANCHOR]");
        assert_eq!(CONTEXT_LABEL, "[1CODE_CONTINUITY_CONTEXT]");
        assert_eq!(PLAN_CONTRACT_LABEL, "[1CODE_PLAN_CONTRACT]");
        assert_eq!(DELTA_LABEL, "[1CODE_CONTINUITY_DELTA]");
        assert_eq!(OBJECTIVE_LABEL, "[1CODE_OBJECTIVE]");
        assert_eq!(USER_REQUEST_LABEL, "[1CODE_USER_REQUEST]");
        assert_eq!(REHYDRATE_LABEL, "[1CODE_CONTINUITY_REHYDRATE]");
    }

    #[test]
    fn full_envelope_section_order() {
        let pack = assemble_full(&ids(), "anchor", "context", None, "delta", "obj", 24_000);
        let positions: Vec<usize> = [
            STATE_IDS_LABEL,
            ANCHOR_LABEL,
            CONTEXT_LABEL,
            DELTA_LABEL,
            OBJECTIVE_LABEL,
            USER_REQUEST_LABEL,
        ]
        .iter()
        .map(|l| pack.find(l).unwrap())
        .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
        assert!(!pack.contains(PLAN_CONTRACT_LABEL));
        assert!(pack.ends_with(USER_REQUEST_LABEL));
    }

    #[test]
    fn plan_contract_slots_between_context_and_delta() {
        let pack = assemble_full(
            &ids(),
            "anchor",
            "context",
            Some("contract"),
            "delta",
            "obj",
            24_000,
        );
        let contract_pos = pack.find(PLAN_CONTRACT_LABEL).unwrap();
        assert!(pack.find(CONTEXT_LABEL).unwrap() < contract_pos);
        assert!(contract_pos < pack.find(DELTA_LABEL).unwrap());
    }

    #[test]
    fn delta_only_envelope_lacks_anchor_and_context() {
        let pack = assemble_delta_only(&ids(), "delta", "obj", 24_000);
        assert!(pack.starts_with(STATE_IDS_LABEL));
        assert!(!pack.contains(ANCHOR_LABEL));
        assert!(!pack.contains(CONTEXT_LABEL));
        assert!(pack.contains(DELTA_LABEL));
        assert!(pack.ends_with(USER_REQUEST_LABEL));
    }

    #[test]
    fn envelope_respects_byte_budget() {
        let big = "x".repeat(100_000);
        let pack = assemble_full(&ids(), &big, &big, None, &big, "obj", 14_000);
        assert!(pack.len() <= 14_000);
    }

    #[test]
    fn objective_is_first_non_blank_line() {
        assert_eq!(objective_line("\n\n  Fix the bug  \nmore"), "Fix the bug");
        assert_eq!(objective_line(""), "");
        assert!(objective_line(&"y".repeat(500)).len() <= 200);
    }

    #[test]
    fn compose_appends_prompt_after_blank_line() {
        assert_eq!(compose_prompt("PACK", "ask"), "PACK\n\nask");
    }
}
