use anyhow::Result;
use clap::{Parser, Subcommand};
use continuity_core::artifact::ArtifactType;
use continuity_core::budget::TokenMode;
use continuity_core::config::{Capabilities, ContinuityMode, EngineConfig, Provider, SessionMode};
use continuity_core::settings::ArtifactPolicy;
use continuity_db::artifact_store::ArtifactStore;
use continuity_db::chat_store::ChatStore;
use continuity_db::session_store::SessionStore;
use continuity_db::settings_store::SettingsStore;
use continuity_engine::engine::{ApplyInput, ContinuityEngine};
use continuity_engine::telemetry::{init_logging, TracingSink};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(
    name = "continuity",
    about = "Inspect and exercise the continuity engine"
)]
struct Cli {
    /// Path to the database file.
    #[arg(long, default_value = "continuity.redb")]
    db: PathBuf,

    /// Output JSON-structured logs to console.
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show governor counters for a sub-session.
    Status {
        #[arg(long)]
        sub_session: String,
    },
    /// List recent artifacts for a sub-session.
    Artifacts {
        #[arg(long)]
        sub_session: String,
        /// Filter: devlog, adr, or rejected-approach.
        #[arg(long, value_name = "TYPE")]
        artifact_type: Option<String>,
        #[arg(long, default_value = "10")]
        limit: usize,
    },
    /// Show or change the singleton settings row.
    Settings {
        #[arg(long)]
        artifact_policy: Option<String>,
        #[arg(long)]
        auto_commit: Option<bool>,
        #[arg(long)]
        token_mode: Option<String>,
        #[arg(long)]
        memory_branch: Option<String>,
    },
    /// Dry-run a pack build against a repository and print the envelope.
    Pack {
        /// Repository to probe.
        #[arg(long, default_value = ".")]
        cwd: PathBuf,
        /// The user prompt to assemble context for.
        prompt: String,
        #[arg(long, default_value = "claude")]
        provider: String,
        #[arg(long, default_value = "agent")]
        mode: String,
        #[arg(long, default_value = "cli-dry-run")]
        sub_session: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.json_logs, "continuity=info")?;

    let db = Arc::new(continuity_db::open_db(&cli.db)?);

    match cli.command {
        Commands::Status { sub_session } => {
            match SessionStore::new(&db).get(&sub_session)? {
                Some(state) => {
                    println!("sub_session: {}", state.sub_session_id);
                    println!("turns_since_snapshot: {}", state.turns_since_snapshot);
                    println!("total_injected_bytes: {}", state.total_injected_bytes);
                    println!(
                        "last_snapshot_at: {}",
                        state
                            .last_snapshot_at
                            .map(|t| t.to_rfc3339())
                            .unwrap_or_else(|| "never".into())
                    );
                    println!("last_changed_files_hash: {}", state.last_changed_files_hash);
                }
                None => println!("no session state for '{sub_session}'"),
            }
        }

        Commands::Artifacts {
            sub_session,
            artifact_type,
            limit,
        } => {
            let type_filter = match artifact_type {
                Some(t) => Some(
                    t.parse::<ArtifactType>()
                        .map_err(|e| anyhow::anyhow!(e))?,
                ),
                None => None,
            };
            let artifacts = ArtifactStore::new(&db).recent(&sub_session, type_filter, limit)?;
            if artifacts.is_empty() {
                println!("no artifacts for '{sub_session}'");
            }
            for artifact in artifacts {
                println!(
                    "#{} [{}] {} ({})",
                    artifact.id,
                    artifact.artifact_type,
                    artifact.headline(),
                    artifact.created_at.to_rfc3339()
                );
            }
        }

        Commands::Settings {
            artifact_policy,
            auto_commit,
            token_mode,
            memory_branch,
        } => {
            let store = SettingsStore::new(&db);
            let mut settings = store.get()?;
            let mut changed = false;
            if let Some(policy) = artifact_policy {
                settings.artifact_policy = policy
                    .parse::<ArtifactPolicy>()
                    .map_err(|e| anyhow::anyhow!(e))?;
                changed = true;
            }
            if let Some(auto) = auto_commit {
                settings.auto_commit_to_memory_branch = auto;
                changed = true;
            }
            if let Some(mode) = token_mode {
                settings.token_mode = mode
                    .parse::<TokenMode>()
                    .map_err(|e| anyhow::anyhow!(e))?;
                changed = true;
            }
            if let Some(branch) = memory_branch {
                settings.memory_branch = branch;
                changed = true;
            }
            if changed {
                store.set(&settings)?;
            }
            println!("artifact_policy: {}", settings.artifact_policy);
            println!(
                "auto_commit_to_memory_branch: {}",
                settings.auto_commit_to_memory_branch
            );
            println!("token_mode: {}", settings.token_mode);
            println!("memory_branch: {}", settings.memory_branch);
        }

        Commands::Pack {
            cwd,
            prompt,
            provider,
            mode,
            sub_session,
        } => {
            let provider: Provider = provider.parse().map_err(|e: String| anyhow::anyhow!(e))?;
            let mode: SessionMode = mode.parse().map_err(|e: String| anyhow::anyhow!(e))?;
            let messages = Arc::new(ChatStore::new(db.clone()));
            let config = EngineConfig {
                mode: ContinuityMode::Active,
                token_mode: TokenMode::default(),
                capabilities: Capabilities::default(),
            };
            let engine =
                ContinuityEngine::new(db.clone(), messages, Arc::new(TracingSink), config);

            let out = engine
                .apply(ApplyInput {
                    sub_session_id: &sub_session,
                    cwd: &cwd,
                    project_path: None,
                    prompt: &prompt,
                    mode,
                    provider,
                })
                .await;

            println!("{}", out.prompt);
            eprintln!();
            eprintln!(
                "cache_hit: {} | reused: {}% | injected_bytes: {}",
                out.cache_hit, out.reused_percent, out.injected_bytes
            );
        }
    }

    Ok(())
}
