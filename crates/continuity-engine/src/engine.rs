//! The engine facade: pre-run `apply` and post-run `record_run_outcome`.
//!
//! Both operations are infallible by contract. Every probe or store error
//! degrades to a conservative default and the turn proceeds; the worst
//! outcome is a prompt passed through unchanged. Callers must serialize
//! calls per sub-session (apply, run, record, in that order); distinct
//! sub-sessions may interleave freely since all shared stores upsert
//! idempotently.

use crate::anchor::build_anchor_pack;
use crate::context::{build_context_pack, ContextCaches};
use crate::delta::{build_delta_pack, failing_test_digest};
use crate::probe::RepoProbe;
use crate::telemetry::{TelemetryEvent, TelemetrySink};
use chrono::Utc;
use continuity_core::artifact::{
    adr_content, blocked_devlog_content, devlog_content, governor_devlog_content,
    rejected_content, ArtifactType, DevlogContext,
};
use continuity_core::budget::TokenMode;
use continuity_core::config::{ContinuityMode, EngineConfig, Provider, SessionMode};
use continuity_core::detector;
use continuity_core::envelope;
use continuity_core::governor::{self, GovernorAction, GovernorInputs};
use continuity_core::hash::{clamp_by_bytes, sha256_hex};
use continuity_core::message::{Message, MessageStore};
use continuity_core::safeguard;
use continuity_core::state::{
    anchor_pack_id, cache_key, task_fingerprint, SessionState, StateIds,
};
use continuity_db::artifact_store::ArtifactStore;
use continuity_db::pack_store::{PackCacheEntry, PackStore};
use continuity_db::session_store::SessionStore;
use continuity_db::settings_store::SettingsStore;
use redb::Database;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Provenance author recorded on every artifact the engine writes.
const CREATED_BY: &str = "continuity-engine";

/// Artifacts folded into a rehydrate carry-over.
const REHYDRATE_ARTIFACTS: usize = 6;

/// Byte cap on each carry-over artifact headline.
const REHYDRATE_HEADLINE_BYTES: usize = 180;

/// Byte cap on the carry-over's prompt excerpt.
const REHYDRATE_PROMPT_BYTES: usize = 600;

/// Reused-percent figures reported per envelope form.
const REUSED_OFF: u8 = 100;
const REUSED_MISS: u8 = 35;
const REUSED_FULL_HIT: u8 = 75;
const REUSED_DELTA_ONLY: u8 = 95;

/// Input to [`ContinuityEngine::apply`].
pub struct ApplyInput<'a> {
    pub sub_session_id: &'a str,
    pub cwd: &'a Path,
    pub project_path: Option<&'a Path>,
    pub prompt: &'a str,
    pub mode: SessionMode,
    pub provider: Provider,
}

/// Result of [`ContinuityEngine::apply`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyOutput {
    pub prompt: String,
    pub cache_hit: bool,
    pub injected_bytes: u64,
    pub reused_percent: u8,
    pub state_ids: StateIds,
}

/// Input to [`ContinuityEngine::record_run_outcome`].
pub struct OutcomeInput<'a> {
    pub sub_session_id: &'a str,
    pub cwd: &'a Path,
    pub project_path: Option<&'a Path>,
    pub provider: Provider,
    pub mode: SessionMode,
    pub prompt: &'a str,
    pub assistant_response: &'a str,
    pub injected_bytes: Option<u64>,
    pub was_error: bool,
}

/// Result of [`ContinuityEngine::record_run_outcome`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutcomeOutput {
    pub action: GovernorAction,
    pub reasons: Vec<String>,
}

impl OutcomeOutput {
    fn ok() -> Self {
        Self {
            action: GovernorAction::Ok,
            reasons: Vec::new(),
        }
    }
}

pub struct ContinuityEngine {
    db: Arc<Database>,
    messages: Arc<dyn MessageStore>,
    telemetry: Arc<dyn TelemetrySink>,
    config: EngineConfig,
    caches: ContextCaches,
    /// Hot tier in front of the pack cache.
    hot_packs: Mutex<HashMap<String, String>>,
    /// Cache key last served from cache per sub-session. A match on the
    /// next hit means the model has seen the full pack and a delta-only
    /// envelope suffices.
    protocol: Mutex<HashMap<String, String>>,
}

impl ContinuityEngine {
    pub fn new(
        db: Arc<Database>,
        messages: Arc<dyn MessageStore>,
        telemetry: Arc<dyn TelemetrySink>,
        config: EngineConfig,
    ) -> Self {
        Self {
            db,
            messages,
            telemetry,
            config,
            caches: ContextCaches::new(),
            hot_packs: Mutex::new(HashMap::new()),
            protocol: Mutex::new(HashMap::new()),
        }
    }

    /// Assemble and prepend the context pack for one turn.
    pub async fn apply(&self, input: ApplyInput<'_>) -> ApplyOutput {
        if self.config.mode == ContinuityMode::Off {
            return self.apply_off(&input);
        }

        let repo_root = input.project_path.unwrap_or(input.cwd);
        let probe = RepoProbe::new(repo_root);
        let repo_state = probe.snapshot();
        let budget = self.effective_token_mode().profile();
        let fingerprint = task_fingerprint(input.prompt);
        let key = cache_key(
            &fingerprint,
            &repo_state,
            input.provider,
            input.mode,
            budget.max_pack_bytes,
        );
        let root_str = repo_root.display().to_string();

        let mut state_ids = StateIds {
            anchor_pack_id: Some(anchor_pack_id(&root_str, &repo_state.head_commit)),
            context_pack_id: Some(sha256_hex(&key)),
            // The plan contract is pinned to the normalized prompt, which
            // is exactly the task fingerprint.
            plan_contract_id: (input.mode == SessionMode::Plan).then(|| fingerprint.clone()),
            delta_pack_id: None,
        };

        // The delta is rebuilt every turn, cache hit or not.
        let session_store = SessionStore::new(&self.db);
        let prev = session_store
            .get(input.sub_session_id)
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "session state read failed");
                None
            });
        let stored_messages = self
            .messages
            .load(input.sub_session_id)
            .unwrap_or_default()
            .map(|s| s.messages)
            .unwrap_or_default();
        let digest = failing_test_digest(&stored_messages);
        let unchanged = prev
            .as_ref()
            .map(|p| p.last_changed_files_hash == repo_state.changed_files_hash)
            .unwrap_or(false);
        let diff = if unchanged {
            String::new()
        } else {
            probe.diff_snippet().await
        };
        let delta = build_delta_pack(prev.as_ref(), &repo_state, input.prompt, &digest, &diff);
        state_ids.delta_pack_id = Some(sha256_hex(&delta));
        let objective = envelope::objective_line(input.prompt);

        if let Some(pack) = self.lookup_pack(&key) {
            return self.serve_hit(&input, &key, &pack, &delta, &objective, state_ids, &budget);
        }

        // Miss: build the full envelope.
        let anchor = build_anchor_pack(repo_root).await;
        let listing = probe.list_files().await;
        let context = build_context_pack(
            &self.db,
            &self.caches,
            repo_root,
            &listing,
            &repo_state,
            input.prompt,
            &budget,
        )
        .await;
        let contract =
            (input.mode == SessionMode::Plan).then(|| envelope::plan_contract(input.prompt));
        let pack = envelope::assemble_full(
            &state_ids,
            &anchor,
            &context,
            contract.as_deref(),
            &delta,
            &objective,
            budget.max_pack_bytes,
        );

        let entry = PackCacheEntry {
            key: key.clone(),
            task_fingerprint: fingerprint,
            changed_files_hash: repo_state.changed_files_hash.clone(),
            head_commit: repo_state.head_commit.clone(),
            provider: input.provider.to_string(),
            mode: input.mode.to_string(),
            budget_bytes: budget.max_pack_bytes,
            pack: pack.clone(),
            updated_at: Utc::now(),
        };
        if let Err(e) = PackStore::new(&self.db).upsert(&entry) {
            tracing::warn!(error = %e, "pack cache write failed");
        }
        self.hot_packs
            .lock()
            .unwrap()
            .insert(key.clone(), pack.clone());

        // Single commit point for apply's session-state write.
        let mut session = prev.unwrap_or_else(|| SessionState::new(input.sub_session_id));
        session.last_changed_files_hash = repo_state.changed_files_hash.clone();
        session.total_injected_bytes = pack.len() as u64;
        if let Err(e) = session_store.upsert(&session) {
            tracing::warn!(error = %e, "session state write failed");
        }

        // The model has not seen this pack yet; the next turn must serve
        // the full envelope before delta-only becomes safe.
        self.protocol.lock().unwrap().remove(input.sub_session_id);

        let composed = envelope::compose_prompt(&pack, input.prompt);
        let injected = composed.len().saturating_sub(input.prompt.len()) as u64;
        self.telemetry.emit(TelemetryEvent::PackMetrics {
            sub_session_id: input.sub_session_id.to_string(),
            provider: input.provider.to_string(),
            mode: input.mode.to_string(),
            cache_hit: false,
            reused_percent: REUSED_MISS,
            injected_bytes: injected,
        });

        ApplyOutput {
            prompt: self.outgoing_prompt(input.prompt, composed),
            cache_hit: false,
            injected_bytes: injected,
            reused_percent: REUSED_MISS,
            state_ids,
        }
    }

    /// Inspect the completed turn, write artifacts, and run the governor.
    pub async fn record_run_outcome(&self, input: OutcomeInput<'_>) -> OutcomeOutput {
        if self.config.mode == ContinuityMode::Off {
            return OutcomeOutput::ok();
        }
        let active = self.config.mode == ContinuityMode::Active;

        let repo_root = input.project_path.unwrap_or(input.cwd);
        let probe = RepoProbe::new(repo_root);
        let repo_state = probe.snapshot();
        let diff_lines = probe.diff_stats().await;

        let session_store = SessionStore::new(&self.db);
        let prev = session_store
            .get(input.sub_session_id)
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "session state read failed");
                None
            })
            .unwrap_or_else(|| SessionState::new(input.sub_session_id));
        let now = Utc::now();
        let turns = prev.turns_since_snapshot + 1;
        let bytes = prev.total_injected_bytes + input.injected_bytes.unwrap_or(0);
        let elapsed_ms = prev
            .last_snapshot_at
            .map(|at| (now - at).num_milliseconds().max(0) as u64);

        let settings = SettingsStore::new(&self.db).get().unwrap_or_default();
        let current_branch = probe.current_branch();
        let safeguard_decision = safeguard::evaluate(&settings, &current_branch);

        let gated = governor::gate(
            governor::decide(&GovernorInputs {
                turns_since_snapshot: turns,
                total_injected_bytes: bytes,
                changed_files_count: repo_state.changed_files.len(),
                diff_lines,
                elapsed_since_snapshot_ms: elapsed_ms,
            }),
            &self.config.capabilities,
        );

        let events = detector::detect(
            &repo_state,
            diff_lines,
            input.assistant_response,
            input.was_error,
        );
        if active {
            self.write_event_artifacts(&input, &repo_state, diff_lines, &settings,
                safeguard_decision, &events);
        }

        // Single commit point for record's session-state write.
        let mut session = prev;
        session.last_changed_files_hash = repo_state.changed_files_hash.clone();
        if gated.action == GovernorAction::Ok {
            session.turns_since_snapshot = turns;
            session.total_injected_bytes = bytes;
        } else {
            session.turns_since_snapshot = 0;
            session.total_injected_bytes = 0;
            session.last_snapshot_at = Some(now);
        }
        if let Err(e) = session_store.upsert(&session) {
            tracing::warn!(error = %e, "session state write failed");
        }

        self.telemetry.emit(TelemetryEvent::GovernorAction {
            sub_session_id: input.sub_session_id.to_string(),
            action: gated.action,
            reasons: gated.reasons.clone(),
        });
        if active && gated.action != GovernorAction::Ok {
            let fingerprint = format!(
                "{}:governor:{}:{}",
                repo_state.head_commit,
                gated.action,
                now.timestamp_millis()
            );
            self.write_artifact(
                input.sub_session_id,
                ArtifactType::Devlog,
                &fingerprint,
                &governor_devlog_content(gated.action, &gated.reasons),
            );
        }

        if safeguard_decision.requested {
            self.telemetry.emit(TelemetryEvent::Safeguard {
                sub_session_id: input.sub_session_id.to_string(),
                allowed: safeguard_decision.allowed,
                branch: current_branch.clone(),
            });
            if safeguard_decision.blocked() && active {
                let fingerprint =
                    safeguard::block_fingerprint(&repo_state.head_commit, &current_branch);
                self.write_artifact(
                    input.sub_session_id,
                    ArtifactType::Devlog,
                    &fingerprint,
                    &blocked_devlog_content(&current_branch, &settings.memory_branch),
                );
            }
        }

        if active && gated.action == GovernorAction::Rehydrate {
            self.rehydrate(input.sub_session_id, &gated.reasons, input.prompt);
        }

        OutcomeOutput {
            action: gated.action,
            reasons: gated.reasons,
        }
    }

    // ─── internals ──────────────────────────────────────────────────────

    fn apply_off(&self, input: &ApplyInput<'_>) -> ApplyOutput {
        let state_ids = StateIds {
            plan_contract_id: (input.mode == SessionMode::Plan)
                .then(|| task_fingerprint(input.prompt)),
            ..StateIds::none()
        };
        ApplyOutput {
            prompt: input.prompt.to_string(),
            cache_hit: false,
            injected_bytes: 0,
            reused_percent: REUSED_OFF,
            state_ids,
        }
    }

    /// Serve a pack-cache hit: full envelope on the first hit, delta-only
    /// once the model has already seen this exact pack.
    #[allow(clippy::too_many_arguments)]
    fn serve_hit(
        &self,
        input: &ApplyInput<'_>,
        key: &str,
        pack: &str,
        delta: &str,
        objective: &str,
        state_ids: StateIds,
        budget: &continuity_core::budget::BudgetProfile,
    ) -> ApplyOutput {
        let delta_ready = self
            .protocol
            .lock()
            .unwrap()
            .get(input.sub_session_id)
            .map(|last| last == key)
            .unwrap_or(false);

        let (envelope_text, reused) = if delta_ready {
            (
                envelope::assemble_delta_only(&state_ids, delta, objective, budget.max_pack_bytes),
                REUSED_DELTA_ONLY,
            )
        } else {
            (pack.to_string(), REUSED_FULL_HIT)
        };

        if let Err(e) = PackStore::new(&self.db).touch(key, Utc::now()) {
            tracing::warn!(error = %e, "pack cache touch failed");
        }
        self.protocol
            .lock()
            .unwrap()
            .insert(input.sub_session_id.to_string(), key.to_string());

        let composed = envelope::compose_prompt(&envelope_text, input.prompt);
        let injected = composed.len().saturating_sub(input.prompt.len()) as u64;
        self.telemetry.emit(TelemetryEvent::PackMetrics {
            sub_session_id: input.sub_session_id.to_string(),
            provider: input.provider.to_string(),
            mode: input.mode.to_string(),
            cache_hit: true,
            reused_percent: reused,
            injected_bytes: injected,
        });

        ApplyOutput {
            prompt: self.outgoing_prompt(input.prompt, composed),
            cache_hit: true,
            injected_bytes: injected,
            reused_percent: reused,
            state_ids,
        }
    }

    /// In passive mode the composed prompt is computed (and accounted for)
    /// but the original goes out.
    fn outgoing_prompt(&self, original: &str, composed: String) -> String {
        if self.config.mode == ContinuityMode::Passive {
            original.to_string()
        } else {
            composed
        }
    }

    fn lookup_pack(&self, key: &str) -> Option<String> {
        if let Some(pack) = self.hot_packs.lock().unwrap().get(key) {
            return Some(pack.clone());
        }
        match PackStore::new(&self.db).get(key) {
            Ok(Some(entry)) => {
                self.hot_packs
                    .lock()
                    .unwrap()
                    .insert(key.to_string(), entry.pack.clone());
                Some(entry.pack)
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(error = %e, "pack cache read failed");
                None
            }
        }
    }

    fn effective_token_mode(&self) -> TokenMode {
        let store = SettingsStore::new(&self.db);
        match store.exists() {
            Ok(true) => store
                .get()
                .map(|s| s.token_mode)
                .unwrap_or(self.config.token_mode),
            _ => self.config.token_mode,
        }
    }

    fn write_event_artifacts(
        &self,
        input: &OutcomeInput<'_>,
        repo_state: &continuity_core::state::RepoState,
        diff_lines: u64,
        settings: &continuity_core::settings::Settings,
        safeguard_decision: continuity_core::safeguard::SafeguardDecision,
        events: &continuity_core::detector::TurnEvents,
    ) {
        if events.devlog {
            let content = devlog_content(&DevlogContext {
                provider: input.provider,
                mode: input.mode,
                head_commit: &repo_state.head_commit,
                changed_files: &repo_state.changed_files,
                diff_lines,
                reasons: &events.reasons,
                settings,
                safeguard: safeguard_decision,
                prompt: input.prompt,
                assistant_response: input.assistant_response,
            });
            self.write_artifact(
                input.sub_session_id,
                ArtifactType::Devlog,
                &events.event_fingerprint,
                &content,
            );
        }
        if events.adr {
            let fingerprint = format!("{}:adr", events.event_fingerprint);
            self.write_artifact(
                input.sub_session_id,
                ArtifactType::Adr,
                &fingerprint,
                &adr_content(&events.boundary_files),
            );
        }
        if events.rejected_approach {
            if let Some(reason) = events.rejected_reason {
                let fingerprint = format!("{}:rejected", events.event_fingerprint);
                self.write_artifact(
                    input.sub_session_id,
                    ArtifactType::RejectedApproach,
                    &fingerprint,
                    &rejected_content(reason, input.prompt, input.assistant_response),
                );
            }
        }
    }

    fn write_artifact(
        &self,
        sub_session_id: &str,
        artifact_type: ArtifactType,
        event_fingerprint: &str,
        content: &str,
    ) {
        let store = ArtifactStore::new(&self.db);
        if let Err(e) =
            store.insert_if_new(sub_session_id, artifact_type, event_fingerprint, content, CREATED_BY)
        {
            tracing::warn!(error = %e, %artifact_type, "artifact write failed");
        }
    }

    /// Compact the session's message log into one structured carry-over.
    fn rehydrate(&self, sub_session_id: &str, reasons: &[String], latest_prompt: &str) {
        let session = match self.messages.load(sub_session_id) {
            Ok(Some(session)) => session,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(error = %e, "rehydrate load failed");
                return;
            }
        };
        let artifacts = ArtifactStore::new(&self.db)
            .recent(sub_session_id, None, REHYDRATE_ARTIFACTS)
            .unwrap_or_default();

        let reasons_line = if reasons.is_empty() {
            "governor-pressure".to_string()
        } else {
            reasons.join("; ")
        };
        let mut text = format!(
            "{}\nmode: {}\nreasons: {reasons_line}\n",
            envelope::REHYDRATE_LABEL,
            session.mode
        );
        for artifact in &artifacts {
            text.push_str(&format!(
                "- {}: {}\n",
                artifact.artifact_type,
                clamp_by_bytes(artifact.headline(), REHYDRATE_HEADLINE_BYTES)
            ));
        }
        text.push_str(&format!(
            "latest_user_prompt: {}",
            clamp_by_bytes(latest_prompt, REHYDRATE_PROMPT_BYTES)
        ));

        if let Err(e) = self
            .messages
            .replace_with_carryover(sub_session_id, Message::assistant(text))
        {
            tracing::warn!(error = %e, "rehydrate rewrite failed");
        }
        tracing::info!(sub_session_id, "rehydrated session log");
    }
}
