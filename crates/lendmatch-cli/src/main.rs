//! lendmatch CLI
//!
//! Evaluate one loan application against a lender catalog and print the
//! evaluation result as JSON.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use lendmatch_core::{Application, Lender, LenderCatalog};
use lendmatch_runtime::{
    ComparatorReasoningService, EvaluationCoordinator, FallbackStrategy, LlmReasoningService,
    ProviderRegistry, ReasoningService, RuntimeConfig,
};

#[derive(Parser, Debug)]
#[command(
    name = "lendmatch",
    about = "Match loan applications against lender eligibility criteria",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Evaluate an application against every lender in a catalog
    Evaluate(EvaluateArgs),
    /// List the LLM providers compiled into this build
    Providers,
}

#[derive(Args, Debug)]
struct EvaluateArgs {
    /// Application JSON file
    #[arg(long, short)]
    application: PathBuf,

    /// Lender catalog (YAML or JSON)
    #[arg(long, short)]
    lenders: PathBuf,

    /// Runtime configuration (YAML or JSON)
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Judge with the deterministic comparator, no LLM calls
    #[arg(long)]
    offline: bool,

    /// LLM provider type
    #[arg(long, default_value = "gemini")]
    provider: String,

    /// Override the match threshold
    #[arg(long)]
    threshold: Option<f64>,

    /// Override the fallback strategy
    #[arg(long, value_enum)]
    fallback: Option<FallbackArg>,

    /// Write the result here instead of stdout
    #[arg(long, short)]
    output: Option<PathBuf>,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum FallbackArg {
    Fail,
    Deterministic,
}

impl From<FallbackArg> for FallbackStrategy {
    fn from(arg: FallbackArg) -> Self {
        match arg {
            FallbackArg::Fail => FallbackStrategy::Fail,
            FallbackArg::Deterministic => FallbackStrategy::Deterministic,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Evaluate(args) => evaluate(args).await,
        Command::Providers => {
            let registry = ProviderRegistry::with_defaults();
            let types = registry.available_types();
            if types.is_empty() {
                println!(
                    "No LLM providers compiled in; use --offline or build with --features gemini"
                );
            }
            for provider_type in types {
                println!("{}", provider_type);
            }
            Ok(())
        }
    }
}

async fn evaluate(args: EvaluateArgs) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => RuntimeConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => RuntimeConfig::default(),
    };
    if let Some(threshold) = args.threshold {
        config.engine.match_threshold = threshold;
    }
    if let Some(fallback) = args.fallback {
        config.engine.fallback = fallback.into();
    }

    let application = load_application(&args.application)?;
    let lenders = load_lenders(&args.lenders)?;
    tracing::info!(
        application_id = %application.id,
        lenders = lenders.len(),
        offline = args.offline,
        "Loaded evaluation inputs"
    );

    let service: Arc<dyn ReasoningService> = if args.offline {
        Arc::new(ComparatorReasoningService::new())
    } else {
        let provider = ProviderRegistry::with_defaults()
            .create(&args.provider, &serde_json::json!({}))
            .with_context(|| format!("Failed to create provider '{}'", args.provider))?;
        Arc::new(LlmReasoningService::new(provider, config.llm.clone()))
    };

    let coordinator = EvaluationCoordinator::builder()
        .service(service)
        .cache(config.cache.clone())
        .build()?;

    let result = coordinator
        .evaluate(Arc::new(application), lenders, &config.engine)
        .await?;

    let json = serde_json::to_string_pretty(&result)?;
    match &args.output {
        Some(path) => fs::write(path, json)
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => println!("{}", json),
    }

    Ok(())
}

/// Load an application; the id comes from the document or the file stem.
fn load_application(path: &Path) -> Result<Application> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read application {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&contents)
        .with_context(|| format!("Application {} is not valid JSON", path.display()))?;

    let id = value
        .get("id")
        .or_else(|| value.get("_id"))
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .or_else(|| path.file_stem().and_then(|s| s.to_str()).map(str::to_string));
    let Some(id) = id else {
        bail!("Application {} has no id", path.display());
    };

    Application::from_json(id, &value)
        .with_context(|| format!("Invalid application {}", path.display()))
}

fn load_lenders(path: &Path) -> Result<Vec<Lender>> {
    let catalog = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => LenderCatalog::from_json_file(path),
        _ => LenderCatalog::from_yaml_file(path),
    }
    .with_context(|| format!("Failed to load lender catalog {}", path.display()))?;

    Ok(catalog.into_lenders())
}
