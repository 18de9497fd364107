//! Dossier application binary - composition root.
//!
//! Ties together all Dossier crates into a single executable:
//! 1. Load configuration from TOML
//! 2. Open storage (SQLite) and rebuild the in-memory hybrid index
//! 3. Wire the ingestion pipeline, query engine, and access gate
//! 4. Dispatch the CLI command, or run the ingestion driver loop

mod cli;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use dossier_auth::{apikey, AccessGate};
use dossier_core::config::DossierConfig;
use dossier_core::ctx::Ctx;
use dossier_core::error::{DossierError, Result};
use dossier_core::types::{Role, SearchMode};
use dossier_index::{HashEmbedding, HybridIndex, SearchEngine, SearchRequest};
use dossier_ingest::{AttachmentSummary, IngestPipeline};
use dossier_storage::{ChunkRepository, Database, FileRepository, UserRepository};

use cli::{CliArgs, Command, UserAction};

/// Everything the command handlers need, wired once at startup.
struct App {
    config: DossierConfig,
    users: Arc<UserRepository>,
    files: Arc<FileRepository>,
    gate: AccessGate,
    pipeline: Arc<IngestPipeline>,
    engine: SearchEngine,
}

impl App {
    fn build(args: &CliArgs, config: &DossierConfig) -> Result<Self> {
        let data_dir = expand_home(&args.resolve_data_dir(&config.general.data_dir));
        std::fs::create_dir_all(&data_dir)?;

        let db_path = data_dir.join("dossier.db");
        let db = Arc::new(Database::new(&db_path)?);
        tracing::info!(path = %db_path.display(), "SQLite database opened");

        let users = Arc::new(UserRepository::new(Arc::clone(&db)));
        let files = Arc::new(FileRepository::new(Arc::clone(&db)));
        let chunks = Arc::new(ChunkRepository::new(Arc::clone(&db)));

        let index = HybridIndex::new();
        let embed_timeout = Duration::from_secs(config.embedding.timeout_secs);

        let pipeline = Arc::new(IngestPipeline::new(
            Arc::clone(&files),
            Arc::clone(&chunks),
            index.clone(),
            Arc::new(HashEmbedding::new()),
            config.chunking.clone(),
            embed_timeout,
        ));

        let restored = pipeline.rebuild_index()?;
        tracing::info!(chunks = restored, "Hybrid index ready");

        let engine = SearchEngine::new(
            index,
            Arc::clone(&chunks),
            Box::new(HashEmbedding::new()),
            config.search.clone(),
            embed_timeout,
        );

        let gate = AccessGate::new(Arc::clone(&users));

        Ok(Self {
            config: config.clone(),
            users,
            files,
            gate,
            pipeline,
            engine,
        })
    }
}

fn init_tracing(level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .init();
}

/// Expand ~ to the home directory in a path string.
fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(rest)
    } else {
        PathBuf::from(path)
    }
}

/// Flatten chunk content to one trimmed line for terminal output.
fn preview(content: &str) -> String {
    let flat = content.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() > 96 {
        let cut: String = flat.chars().take(96).collect();
        format!("{}...", cut)
    } else {
        flat
    }
}

/// Run the ingestion driver loop until killed.
async fn cmd_run(app: &App, retry_flag: bool) -> Result<()> {
    let interval_secs = app.config.ingest.poll_interval_secs.max(1);
    let retry_failed = retry_flag || app.config.ingest.retry_failed;
    tracing::info!(interval_secs, retry_failed, "Ingestion driver started");

    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
    loop {
        interval.tick().await;
        if let Err(e) = app.pipeline.process_pending(&Ctx::root(), retry_failed).await {
            tracing::error!(error = %e, "Pending-file scan failed");
        }
    }
}

async fn cmd_ingest(app: &App, args: &cli::IngestArgs) -> Result<()> {
    let key = cli::resolve_api_key(&args.api_key)?;
    let ctx = app.gate.authorize_ctx(&key, Role::Admin)?;

    let content = std::fs::read_to_string(&args.path)?;
    let filename = match &args.filename {
        Some(name) => name.clone(),
        None => args
            .path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default(),
    };

    let (file, chunk_count) = app
        .pipeline
        .register(&ctx, &filename, &args.applicant, &content)
        .await?;
    let summary = if chunk_count > 0 {
        app.pipeline
            .attach_embeddings(&ctx, file.file_id, false)
            .await?
    } else {
        AttachmentSummary::default()
    };

    println!(
        "Ingested file {} ({} chunks, {} embedded, {} failed)",
        file.file_id, chunk_count, summary.embedded, summary.failed
    );
    Ok(())
}

async fn cmd_search(app: &App, args: &cli::SearchArgs) -> Result<()> {
    let key = cli::resolve_api_key(&args.api_key)?;
    app.gate.authorize_ctx(&key, Role::Viewer)?;

    let mode = SearchMode::parse(&args.mode).ok_or_else(|| {
        DossierError::Validation(format!("unknown search mode '{}'", args.mode))
    })?;
    let request = SearchRequest {
        text: args.query.clone(),
        applicant: args.applicant.clone(),
        top_k: args.top_k.unwrap_or(app.config.search.default_top_k),
        mode,
    };

    let results = app.engine.search(&request).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else if results.is_empty() {
        println!("No results.");
    } else {
        for (position, result) in results.iter().enumerate() {
            println!(
                "{:2}. [{:.4}] file {} chunk {}",
                position + 1,
                result.score,
                result.chunk.file_id,
                result.chunk.chunk_index
            );
            println!("    {}", preview(&result.chunk.content));
        }
    }
    Ok(())
}

fn cmd_files(app: &App, args: &cli::FilesArgs) -> Result<()> {
    let key = cli::resolve_api_key(&args.api_key)?;
    app.gate.authorize_ctx(&key, Role::Viewer)?;

    let files = match &args.applicant {
        Some(applicant) => app.files.list_by_applicant(applicant)?,
        None => app.files.list_all()?,
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&files)?);
    } else if files.is_empty() {
        println!("No files registered.");
    } else {
        for file in &files {
            let status = if file.processed { "processed" } else { "pending" };
            println!(
                "{}\t{}\t{}\t{}",
                file.file_id, file.applicant, file.filename, status
            );
        }
    }
    Ok(())
}

async fn cmd_delete(app: &App, args: &cli::DeleteArgs) -> Result<()> {
    let key = cli::resolve_api_key(&args.api_key)?;
    let ctx = app.gate.authorize_ctx(&key, Role::Admin)?;

    app.pipeline.delete_file(&ctx, args.file_id).await?;
    println!("Deleted file {}", args.file_id);
    Ok(())
}

fn cmd_user_add(app: &App, email: &str, role_arg: &str) -> Result<()> {
    let role = Role::parse(role_arg)
        .ok_or_else(|| DossierError::Validation(format!("unknown role '{}'", role_arg)))?;
    if role == Role::Inactive {
        return Err(DossierError::Validation(
            "cannot provision an inactive user; deactivate with user set-role".to_string(),
        ));
    }
    if app.users.find_by_email(email)?.is_some() {
        return Err(DossierError::Validation(format!(
            "email {} is already registered",
            email
        )));
    }

    let (salt, api_key) = apikey::generate_key(app.config.auth.hmac_key.as_bytes(), email)?;
    let user = app.users.create(email, salt, &api_key)?;
    if role != Role::Viewer {
        app.users.set_role(user.user_id, role)?;
    }

    println!("Created user {} <{}> with role {}", user.user_id, user.email, role);
    println!("API key (shown once, store it now): {}", api_key);
    Ok(())
}

fn cmd_user_list(app: &App, json: bool) -> Result<()> {
    let users = app.users.list_all()?;

    if json {
        let redacted: Vec<serde_json::Value> = users
            .iter()
            .map(|user| {
                serde_json::json!({
                    "user_id": user.user_id,
                    "email": user.email,
                    "role": user.role.as_str(),
                    "has_key": user.api_key.is_some(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&redacted)?);
    } else if users.is_empty() {
        println!("No users provisioned.");
    } else {
        for user in &users {
            let key_state = if user.api_key.is_some() { "key set" } else { "no key" };
            println!("{}\t{}\t{}\t{}", user.user_id, user.email, user.role, key_state);
        }
    }
    Ok(())
}

fn cmd_user_set_role(app: &App, user_id: i64, role_arg: &str) -> Result<()> {
    let role = Role::parse(role_arg)
        .ok_or_else(|| DossierError::Validation(format!("unknown role '{}'", role_arg)))?;
    app.users.set_role(user_id, role)?;
    println!("Set role {} for user {}", role, user_id);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    let config_path = args.resolve_config_path();
    let config = DossierConfig::load_or_default(&config_path);

    let level = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.general.log_level.clone());
    init_tracing(&level);

    tracing::info!("Starting Dossier v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(path = %config_path.display(), "Configuration loaded");

    let app = App::build(&args, &config)?;

    match args.command {
        Command::Run(run) => cmd_run(&app, run.retry_failed).await,
        Command::Ingest(ingest) => cmd_ingest(&app, &ingest).await,
        Command::Search(search) => cmd_search(&app, &search).await,
        Command::Files(files) => cmd_files(&app, &files),
        Command::Delete(delete) => cmd_delete(&app, &delete).await,
        Command::User { action } => match action {
            UserAction::Add { email, role } => cmd_user_add(&app, &email, &role),
            UserAction::List { json } => cmd_user_list(&app, json),
            UserAction::SetRole { user_id, role } => cmd_user_set_role(&app, user_id, &role),
        },
    }
}
