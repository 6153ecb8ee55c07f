//! # EduGuide CLI (`eduguide`)
//!
//! The `eduguide` binary drives the library: it ingests course documents,
//! answers one-shot questions, runs an interactive chat session and reports
//! on profiles and the knowledge base.
//!
//! ## Usage
//!
//! ```bash
//! eduguide --config ./config/eduguide.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `eduguide ingest [FILES]... [--dir DIR]` | Rebuild the knowledge base from documents |
//! | `eduguide ask "<question>"` | Ask one question (tutor or advisor mode) |
//! | `eduguide chat` | Interactive chat session |
//! | `eduguide profiles` | List student profiles |
//! | `eduguide status` | Show the live knowledge base |
//! | `eduguide check` | Test connectivity to the model services |
//! | `eduguide completions <shell>` | Print shell completions |
//!
//! Credentials are read from the environment (or a `.env` file):
//! `GOOGLE_API_KEY` for Gemini, `OPENAI_API_KEY` for OpenAI.

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use eduguide::config::{self, Config};
use eduguide::embedding::{self, embed_query, DisabledProvider, EmbeddingProvider};
use eduguide::generation::{self, DisabledGenerator, GenerationProvider};
use eduguide::index::IndexStore;
use eduguide::ingest::{collect_documents, Ingestor};
use eduguide::models::UploadedDocument;
use eduguide::profile::{
    self, format_gpa, ProfileDirectory, ProfileRecord, ProfileSource, StandingStatus,
};
use eduguide::progress::ProgressMode;
use eduguide::responder::{AdvisorContext, Mode, Responder};
use eduguide::safety;
use eduguide::session::{ChatSession, ModeKind};

/// EduGuide: a Socratic tutor over your course documents and an academic
/// advisor over your student profile.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. When the file does not exist, built-in defaults are used.
#[derive(Parser)]
#[command(
    name = "eduguide",
    about = "EduGuide: retrieval-augmented tutor and academic advisor",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/eduguide.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rebuild the knowledge base from a batch of documents.
    ///
    /// The new index replaces the previous one only once it is complete.
    /// With no files and no `--dir`, the configured documents directory is used.
    Ingest {
        /// Documents to ingest (PDF, DOCX, PPTX, TXT, MD).
        files: Vec<PathBuf>,

        /// Also ingest every supported file under this directory.
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Progress output on stderr.
        #[arg(long, value_enum, default_value = "auto")]
        progress: ProgressArg,
    },

    /// Ask a single question and print the answer.
    Ask {
        question: String,

        #[arg(long, value_enum, default_value = "tutor")]
        mode: ModeArg,

        /// Profile identifier (file name in the profiles directory) or a path
        /// to a profile JSON file.
        #[arg(long)]
        profile: Option<String>,
    },

    /// Start an interactive chat session.
    ///
    /// Commands inside the session: `/mode tutor|advisor`, `/profile ID`,
    /// `/clear`, `/quit`.
    Chat {
        #[arg(long, value_enum, default_value = "tutor")]
        mode: ModeArg,

        #[arg(long)]
        profile: Option<String>,
    },

    /// List student profiles with their GPA and standing status.
    Profiles,

    /// Show the live knowledge base.
    Status,

    /// Embed and generate a short probe to verify credentials and connectivity.
    Check,

    /// Print shell completions.
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Tutor,
    Advisor,
}

impl From<ModeArg> for ModeKind {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Tutor => ModeKind::Tutor,
            ModeArg::Advisor => ModeKind::Advisor,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ProgressArg {
    Auto,
    Off,
    Human,
    Json,
}

impl ProgressArg {
    fn mode(self) -> ProgressMode {
        match self {
            ProgressArg::Auto => ProgressMode::default_for_tty(),
            ProgressArg::Off => ProgressMode::Off,
            ProgressArg::Human => ProgressMode::Human,
            ProgressArg::Json => ProgressMode::Json,
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();

    if let Commands::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "eduguide", &mut std::io::stdout());
        return Ok(());
    }

    let cfg = config::load_or_default(&cli.config)?;

    match cli.command {
        Commands::Ingest {
            files,
            dir,
            progress,
        } => {
            run_ingest(&cfg, &files, dir.as_deref(), progress.mode()).await?;
        }
        Commands::Ask {
            question,
            mode,
            profile,
        } => {
            run_ask(&cfg, &question, mode.into(), profile.as_deref()).await?;
        }
        Commands::Chat { mode, profile } => {
            run_chat(&cfg, mode.into(), profile).await?;
        }
        Commands::Profiles => list_profiles(&cfg),
        Commands::Status => show_status(&cfg)?,
        Commands::Check => run_check(&cfg).await?,
        Commands::Completions { .. } => {
            // Handled above (before config loading)
            unreachable!()
        }
    }

    Ok(())
}

/// Build the configured embedding provider; a missing credential yields a
/// disabled provider that reports the reason when used.
fn build_embedder(cfg: &Config) -> Arc<dyn EmbeddingProvider> {
    match embedding::create_provider(&cfg.embedding) {
        Ok(provider) => Arc::from(provider),
        Err(e) => {
            tracing::warn!(error = %e, "embedding provider unavailable");
            Arc::new(DisabledProvider::with_reason(format!("{:#}", e)))
        }
    }
}

fn build_generator(cfg: &Config) -> Arc<dyn GenerationProvider> {
    match generation::create_provider(&cfg.generation) {
        Ok(provider) => Arc::from(provider),
        Err(e) => {
            tracing::warn!(error = %e, "generation provider unavailable");
            Arc::new(DisabledGenerator::with_reason(format!("{:#}", e)))
        }
    }
}

fn build_responder(cfg: &Config) -> Responder {
    Responder::new(cfg, build_embedder(cfg), build_generator(cfg))
}

async fn run_ingest(
    cfg: &Config,
    files: &[PathBuf],
    dir: Option<&Path>,
    progress: ProgressMode,
) -> anyhow::Result<()> {
    let mut documents = Vec::new();
    for path in files {
        let bytes =
            std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        documents.push(UploadedDocument::new(name, bytes));
    }

    match dir {
        Some(dir) => documents.extend(collect_documents(dir)?),
        None if files.is_empty() => documents.extend(collect_documents(&cfg.paths.documents_dir)?),
        None => {}
    }

    let ingestor = Ingestor::new(cfg, build_embedder(cfg)).with_progress(progress.reporter());
    let report = ingestor.ingest(&documents).await?;

    println!("{}", report);
    for skipped in &report.skipped {
        println!("  skipped {}: {}", skipped.file, skipped.reason);
    }
    Ok(())
}

/// Resolve `--profile`: an existing file path is loaded directly, anything
/// else is looked up in the profiles directory.
fn advisor_context(cfg: &Config, profile: Option<&str>) -> (AdvisorContext, Option<ProfileRecord>) {
    match profile {
        Some(id) => {
            let path = Path::new(id);
            let record = if path.is_file() {
                profile::load(ProfileSource::Path(path))
            } else {
                ProfileDirectory::new(&cfg.paths.profiles_dir).load(id)
            };
            if let ProfileRecord::Invalid { reason } = &record {
                tracing::warn!(profile = id, %reason, "profile could not be loaded");
            }
            (AdvisorContext::from_record(&record), Some(record))
        }
        None => (AdvisorContext::none(), None),
    }
}

async fn run_ask(
    cfg: &Config,
    question: &str,
    mode: ModeKind,
    profile: Option<&str>,
) -> anyhow::Result<()> {
    if let Some(message) = safety::check(question) {
        println!("{}", message);
        return Ok(());
    }

    let responder = build_responder(cfg);
    let mode = match mode {
        ModeKind::Tutor => Mode::Tutor,
        ModeKind::Advisor => Mode::Advisor(advisor_context(cfg, profile).0),
    };
    let answer = responder.answer(&mode, question).await?;
    println!("{}", answer);
    Ok(())
}

fn describe_profile(id: &str, record: &ProfileRecord) -> String {
    match record {
        ProfileRecord::Invalid { .. } => format!("{} (no profile data available)", id),
        ProfileRecord::Loaded(p) => {
            let status = match record.standing_status() {
                StandingStatus::Warning => ", warning: GPA below 2.5",
                StandingStatus::Good => "",
                StandingStatus::Unknown => ", GPA not on record",
            };
            format!(
                "{} (GPA {}, {}){}",
                record.display_name(id),
                format_gpa(p.gpa),
                record.standing_text(),
                status
            )
        }
    }
}

async fn run_chat(cfg: &Config, mode: ModeKind, profile: Option<String>) -> anyhow::Result<()> {
    let responder = build_responder(cfg);
    let mut session = ChatSession::new(mode);
    let mut profile_id = profile;
    let (mut advisor, mut record) = advisor_context(cfg, profile_id.as_deref());

    println!("EduGuide chat ({} mode). Type /quit to exit.", session.mode());
    if let (Some(id), Some(record)) = (&profile_id, &record) {
        println!("Profile: {}", describe_profile(id, record));
    }

    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("{}> ", session.mode());
        std::io::stdout().flush()?;

        let line = match lines.next() {
            Some(line) => line?,
            None => break,
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        if let Some(command) = input.strip_prefix('/') {
            let mut parts = command.splitn(2, char::is_whitespace);
            let name = parts.next().unwrap_or("");
            let arg = parts.next().map(str::trim).unwrap_or("");
            match name {
                "quit" | "exit" => break,
                "clear" => {
                    session.clear();
                    println!("Chat cleared.");
                }
                "mode" => match arg.parse::<ModeKind>() {
                    Ok(mode) => {
                        session.set_mode(mode);
                        println!("Switched to {} mode.", mode);
                    }
                    Err(e) => println!("{}", e),
                },
                "profile" if !arg.is_empty() => {
                    profile_id = Some(arg.to_string());
                    (advisor, record) = advisor_context(cfg, profile_id.as_deref());
                    if let Some(record) = &record {
                        println!("Profile: {}", describe_profile(arg, record));
                    }
                }
                _ => println!("Commands: /mode tutor|advisor, /profile ID, /clear, /quit"),
            }
            continue;
        }

        let reply = session.submit(&responder, input, &advisor).await;
        println!("\n{}\n", reply.content);
    }

    Ok(())
}

fn list_profiles(cfg: &Config) {
    let dir = ProfileDirectory::new(&cfg.paths.profiles_dir);
    let names = dir.list();
    if names.is_empty() {
        println!("No profiles found in {}", dir.root().display());
        return;
    }

    println!("{:<28} {:<24} {:<6} STATUS", "PROFILE", "NAME", "GPA");
    for name in names {
        let record = dir.load(&name);
        let (gpa, status) = match &record {
            ProfileRecord::Loaded(p) => (format_gpa(p.gpa), record.standing_status().label()),
            ProfileRecord::Invalid { .. } => ("N/A".to_string(), "invalid"),
        };
        println!(
            "{:<28} {:<24} {:<6} {}",
            name,
            record.display_name("-"),
            gpa,
            status
        );
    }
}

fn show_status(cfg: &Config) -> anyhow::Result<()> {
    let store = IndexStore::new(&cfg.paths.index_dir);
    let index = match store.load()? {
        Some(index) => index,
        None => {
            println!("Knowledge base is empty. Run `eduguide ingest` first.");
            return Ok(());
        }
    };

    let manifest = index.manifest();
    println!("Index:      {}", store.root().display());
    println!("Generation: {}", manifest.generation);
    println!("Built:      {}", manifest.created_at.format("%Y-%m-%d %H:%M:%S UTC"));
    println!("Model:      {} ({} dims)", manifest.embedding_model, manifest.dims);
    println!("Chunks:     {}", manifest.chunk_count);
    println!("Sources:    {}", manifest.sources.len());
    for source in &manifest.sources {
        println!("  - {}", source);
    }
    Ok(())
}

async fn run_check(cfg: &Config) -> anyhow::Result<()> {
    let embedder = build_embedder(cfg);
    let generator = build_generator(cfg);
    let mut failed = false;

    match embed_query(embedder.as_ref(), "connection test").await {
        Ok(v) if embedder.dims() != 0 && v.len() != embedder.dims() => println!(
            "embedding   ok    {} ({} dims, configured {}; set embedding.dims to match)",
            embedder.model_name(),
            v.len(),
            embedder.dims()
        ),
        Ok(v) => println!("embedding   ok    {} ({} dims)", embedder.model_name(), v.len()),
        Err(e) => {
            failed = true;
            println!("embedding   FAIL  {:#}", e);
        }
    }

    match generator.generate("Reply with the single word: ready").await {
        Ok(text) => println!("generation  ok    {}: {}", generator.model_name(), text.trim()),
        Err(e) => {
            failed = true;
            println!("generation  FAIL  {:#}", e);
        }
    }

    if failed {
        anyhow::bail!("connectivity check failed");
    }
    Ok(())
}
