#![deny(unsafe_code)]

//! Packgate CLI: ask questions, manage the document index and inspect
//! policy and audit traces from the command line.

mod eval;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use packgate_config::{AppConfig, PolicyEngine};
use packgate_core::audit::{self, AuditSink, FileAuditSink, InMemoryAuditSink};
use packgate_core::{
    ChatRequest, DocIndex, Embedder, FilesystemSource, HashEmbedder, Orchestrator, PackRegistry,
    TermHashEmbedder, UserContext, build_info,
};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Packgate: policy-gated document retrieval and read-only tool answers.
#[derive(Parser)]
#[command(name = "packgate", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file.
    #[arg(short, long, env = "PACKGATE_CONFIG", default_value = "packgate.toml")]
    config: PathBuf,

    /// Increase log verbosity (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask a question as a given org and role set.
    Ask {
        /// The question.
        message: String,

        #[arg(long, default_value = "demo")]
        org: String,

        #[arg(long, default_value = "cli")]
        user: String,

        /// Comma-separated role names.
        #[arg(long, value_delimiter = ',', default_value = "Viewer")]
        roles: Vec<String>,

        /// Restrict routing to one pack.
        #[arg(long)]
        pack: Option<String>,

        #[arg(long)]
        session: Option<String>,

        /// Print the full response as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Drop and re-ingest documents for an org.
    Reindex {
        #[arg(long, default_value = "demo")]
        org: String,

        /// Only this pack (default: every pack).
        #[arg(long)]
        pack: Option<String>,
    },

    /// List registered packs and their tools.
    Packs {
        #[arg(long)]
        json: bool,
    },

    /// Validate the policy file and show effective grants.
    Policy {
        /// Show allowed packs and tools for these comma-separated roles.
        #[arg(long, value_delimiter = ',')]
        roles: Vec<String>,

        /// Print the parsed policy document.
        #[arg(long)]
        show: bool,
    },

    /// Print the audit events of a trace from the audit file.
    Trace {
        trace_id: String,

        /// Audit file to read (default: `audit.path` from the config).
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Run the golden evaluation cases.
    Eval {
        #[arg(long, default_value = "eval")]
        dir: PathBuf,
    },

    /// Show version and build information.
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_found = cli.config.exists();
    let mut config = if config_found {
        AppConfig::load(&cli.config)
            .await
            .with_context(|| format!("failed to load {}", cli.config.display()))?
    } else {
        AppConfig::default()
    };
    config.apply_env_overrides()?;

    let filter = match cli.verbose {
        0 => config.logging.level.as_str(),
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    if !config_found {
        info!(path = %cli.config.display(), "config file not found, using defaults");
    }
    debug!(?config, "configuration resolved");

    match cli.command {
        Commands::Ask {
            message,
            org,
            user,
            roles,
            pack,
            session,
            json,
        } => {
            let mut request = ChatRequest::new(UserContext::new(org, user, roles), message);
            if let Some(pack) = pack {
                request = request.with_pack_hint(pack);
            }
            if let Some(session) = session {
                request = request.with_session_id(session);
            }
            cmd_ask(&config, &request, json).await?
        }
        Commands::Reindex { org, pack } => cmd_reindex(&config, &org, pack.as_deref()).await?,
        Commands::Packs { json } => cmd_packs(json)?,
        Commands::Policy { roles, show } => cmd_policy(&config, &roles, show).await?,
        Commands::Trace { trace_id, file } => cmd_trace(&config, &trace_id, file)?,
        Commands::Eval { dir } => cmd_eval(&config, &dir).await?,
        Commands::Version => cmd_version(),
    }

    Ok(())
}

/// Build an orchestrator over the built-in packs from `config`.
async fn build_orchestrator(config: &AppConfig, audit: Arc<dyn AuditSink>) -> Result<Orchestrator> {
    let policy = PolicyEngine::load(&config.policy.path)
        .await
        .with_context(|| format!("failed to load policy {}", config.policy.path.display()))?;

    let dim = config.retrieval.embedding_dim;
    let embedder: Arc<dyn Embedder> = match config.retrieval.embedder.as_str() {
        "term_hash" => Arc::new(TermHashEmbedder::new(dim)),
        _ => Arc::new(HashEmbedder::new(dim)),
    };
    let index = match config.retrieval.backend.as_str() {
        "vector" => DocIndex::vector_only(embedder),
        _ => DocIndex::hybrid(embedder, config.retrieval.alpha),
    };
    let source = FilesystemSource::new(&config.data.data_dir)
        .with_chunking(config.data.chunk_size_chars, config.data.chunk_overlap_chars);

    info!(
        backend = %config.retrieval.backend,
        alpha = config.effective_alpha(),
        embedder = index.embedder_name(),
        data_dir = %config.data.data_dir.display(),
        "orchestrator configured"
    );

    Ok(Orchestrator::builder(PackRegistry::with_builtin(), Arc::new(policy))
        .index(Arc::new(index))
        .source(Arc::new(source))
        .audit(audit)
        .top_k(config.retrieval.top_k)
        .build())
}

fn audit_sink(config: &AppConfig) -> Result<Arc<dyn AuditSink>> {
    match (config.audit.sink.as_str(), &config.audit.path) {
        ("file", Some(path)) => Ok(Arc::new(
            FileAuditSink::open(path)
                .with_context(|| format!("failed to open audit file {}", path.display()))?,
        )),
        _ => Ok(Arc::new(InMemoryAuditSink::new())),
    }
}

async fn cmd_ask(config: &AppConfig, request: &ChatRequest, json: bool) -> Result<()> {
    let orchestrator = build_orchestrator(config, audit_sink(config)?).await?;
    let response = orchestrator.handle_chat(request);

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    println!("{}", response.answer);
    if !response.citations.is_empty() {
        println!("\nSources:");
        for citation in &response.citations {
            println!("- {} ({}) [{:.3}]", citation.title, citation.url, citation.score);
        }
    }
    for warning in &response.warnings {
        println!("warning: {warning}");
    }
    println!(
        "\ntrace {} | intent {} | packs [{}] | {} ms",
        response.meta.trace_id,
        response.meta.intent,
        response.meta.packs_used.join(", "),
        response.meta.latency_ms
    );
    Ok(())
}

async fn cmd_reindex(config: &AppConfig, org: &str, pack: Option<&str>) -> Result<()> {
    let orchestrator = build_orchestrator(config, audit_sink(config)?).await?;
    let report = orchestrator.reindex(org, pack)?;
    println!(
        "Reindexed {} for org '{}': removed {}, indexed {} chunks.",
        report.packs.join(", "),
        report.org_id,
        report.removed_docs,
        report.indexed_docs
    );
    Ok(())
}

fn cmd_packs(json: bool) -> Result<()> {
    let catalog = PackRegistry::with_builtin().catalog();
    if json {
        println!("{}", serde_json::to_string_pretty(&catalog)?);
        return Ok(());
    }
    for pack in catalog {
        println!("{} ({})", pack.pack_id, pack.display_name);
        println!("  keywords: {}", pack.keywords.join(", "));
        for tool in pack.tool_names {
            println!("  tool: {tool}");
        }
    }
    Ok(())
}

async fn cmd_policy(config: &AppConfig, roles: &[String], show: bool) -> Result<()> {
    let policy = PolicyEngine::load(&config.policy.path)
        .await
        .with_context(|| format!("failed to load policy {}", config.policy.path.display()))?;
    println!(
        "Policy at '{}' is valid (version {}, {} deny patterns, roles: {}).",
        config.policy.path.display(),
        policy.version(),
        policy.deny_pattern_count(),
        policy.roles().join(", ")
    );

    if !roles.is_empty() {
        let join = |items: std::collections::BTreeSet<String>| {
            items.into_iter().collect::<Vec<_>>().join(", ")
        };
        println!("Roles: {}", roles.join(", "));
        println!("Allowed packs: {}", join(policy.allowed_packs(roles)));
        println!("Allowed tools: {}", join(policy.allowed_tools(roles)));
    }
    if show {
        println!("{}", toml::to_string_pretty(policy.document())?);
    }
    Ok(())
}

fn cmd_trace(config: &AppConfig, trace_id: &str, file: Option<PathBuf>) -> Result<()> {
    let Some(path) = file.or_else(|| config.audit.path.clone()) else {
        bail!("no audit file configured; pass --file or set audit.path");
    };
    let events = audit::read_trace(&path, trace_id)?;
    for event in events {
        println!("{}", serde_json::to_string(&event)?);
    }
    Ok(())
}

async fn cmd_eval(config: &AppConfig, dir: &Path) -> Result<()> {
    let orchestrator = build_orchestrator(config, Arc::new(InMemoryAuditSink::new())).await?;
    let failures = eval::run(&orchestrator, dir)?;
    if failures.is_empty() {
        println!("All eval checks passed.");
        return Ok(());
    }
    println!("Eval failures:");
    for failure in &failures {
        println!("- {failure}");
    }
    bail!("{} eval check(s) failed", failures.len())
}

fn cmd_version() {
    let info = build_info::BuildInfo::current();
    println!("packgate {}", build_info::version_string());
    println!("target: {}", info.target);
    if let Some(built_at) = info.built_at {
        println!("built at: {built_at}");
    }
}
