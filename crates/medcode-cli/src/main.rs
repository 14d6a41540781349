use std::{
    collections::HashMap,
    env,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use medcode_core::{
    build_client,
    report::{
        outcome_label, render_access, render_classification, render_code_details,
        render_specializations, OutputFormat,
    },
    Artifact, ClassificationResult, ClassificationService, Code, FileTaxonomyRepository,
    LlmClient, LlmSettings, NoopLlmClient, Outcome, TaxonomyStore,
};
use serde::Deserialize;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

const DEFAULT_TAXONOMY_PATH: &str = "./data/medical_hierarchy.json";

#[derive(Parser, Debug)]
#[command(
    name = "medcode-cli",
    author,
    version,
    about = "Medical specialization classification CLI"
)]
struct Cli {
    /// Taxonomy document (default: ./data/medical_hierarchy.json)
    #[arg(long, value_name = "PATH", global = true)]
    taxonomy: Option<PathBuf>,

    /// Configuration file (TOML, YAML or JSON) with an optional [llm] table
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Override the classification model provider
    #[arg(long, value_name = "NAME", global = true)]
    provider: Option<String>,

    /// Emit JSON instead of human-readable text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List every known specialization code
    List,
    /// Show details for one code
    Code { code: Code },
    /// Classify a free-text specialization, extending the taxonomy if needed
    Classify { text: String },
    /// Classify a medical file
    ClassifyFile {
        path: PathBuf,
        /// What the file contains
        #[arg(long)]
        description: String,
        /// Declared MIME type; inferred from the extension when omitted
        #[arg(long = "content-type", value_name = "MIME")]
        content_type: Option<String>,
    },
    /// Determine the access codes for a primary specialization code
    Access { code: Code },
}

#[derive(Debug, Default, Deserialize)]
struct AppConfig {
    taxonomy_path: Option<PathBuf>,
    #[serde(default)]
    llm: LlmSection,
}

#[derive(Debug, Default, Deserialize)]
struct LlmSection {
    provider: Option<String>,
    api_key: Option<String>,
    endpoint: Option<String>,
    model: Option<String>,
    /// humantime duration such as `"30s"`
    timeout: Option<String>,
    api_version: Option<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let app_config = match &cli.config {
        Some(path) => load_app_config(path)?,
        None => AppConfig::default(),
    };
    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Human
    };

    let taxonomy_path = cli
        .taxonomy
        .clone()
        .or_else(|| app_config.taxonomy_path.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_TAXONOMY_PATH));
    let store = Arc::new(
        TaxonomyStore::load(FileTaxonomyRepository::new(&taxonomy_path)).with_context(|| {
            format!("failed to load taxonomy from {}", taxonomy_path.display())
        })?,
    );

    match cli.command {
        Commands::List => {
            let service = ClassificationService::with_llm(store, Arc::new(NoopLlmClient));
            let list = service.list_specializations();
            if format == OutputFormat::Human {
                println!(
                    "{}",
                    format!("Taxonomy: {}", taxonomy_path.display()).bold()
                );
            }
            print!("{}", render_specializations(&list, format)?);
        }
        Commands::Code { code } => {
            let service = ClassificationService::with_llm(store, Arc::new(NoopLlmClient));
            let details = service
                .code_details(code)
                .ok_or_else(|| anyhow!("code {code} not found"))?;
            print!("{}", render_code_details(&details, format)?);
        }
        Commands::Classify { text } => {
            let service = oracle_service(store, &app_config.llm, cli.provider.as_deref())?;
            let result = service.classify(&text).await;
            print_classification(&result, format)?;
        }
        Commands::ClassifyFile {
            path,
            description,
            content_type,
        } => {
            if !path.is_file() {
                return Err(anyhow!("file {} does not exist", path.display()));
            }
            let service = oracle_service(store, &app_config.llm, cli.provider.as_deref())?;
            let artifact = Artifact::from_path(&path, content_type);
            let result = service.classify_file(&artifact, &description).await;
            print_classification(&result, format)?;
        }
        Commands::Access { code } => {
            let service = oracle_service(store, &app_config.llm, cli.provider.as_deref())?;
            let access = service.determine_access(code).await;
            print!("{}", render_access(&access, format)?);
        }
    }
    Ok(())
}

fn load_app_config(path: &Path) -> Result<AppConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::from(path))
        .build()
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    settings
        .try_deserialize()
        .with_context(|| format!("invalid config file {}", path.display()))
}

fn oracle_service(
    store: Arc<TaxonomyStore>,
    section: &LlmSection,
    provider_flag: Option<&str>,
) -> Result<ClassificationService> {
    let vars = llm_vars(env::vars().collect(), section, provider_flag)?;
    let settings = LlmSettings::from_map(vars).context("failed to load model settings")?;
    info!(provider = %settings.provider, model = ?settings.model, "classification model configured");
    let client: Arc<dyn LlmClient> = Arc::from(build_client(&settings)?);
    Ok(ClassificationService::with_llm(store, client))
}

/// Layer config-file values and the `--provider` flag over the environment.
fn llm_vars(
    mut vars: HashMap<String, String>,
    section: &LlmSection,
    provider_flag: Option<&str>,
) -> Result<HashMap<String, String>> {
    let mut set = |key: &str, value: Option<&String>| {
        if let Some(value) = value {
            vars.insert(key.to_string(), value.clone());
        }
    };
    set(LlmSettings::PROVIDER_ENV, section.provider.as_ref());
    set(LlmSettings::API_KEY_ENV, section.api_key.as_ref());
    set(LlmSettings::ENDPOINT_ENV, section.endpoint.as_ref());
    set(LlmSettings::MODEL_ENV, section.model.as_ref());
    set(LlmSettings::API_VERSION_ENV, section.api_version.as_ref());
    if let Some(timeout) = &section.timeout {
        let duration = humantime::parse_duration(timeout)
            .with_context(|| format!("invalid llm.timeout `{timeout}`"))?;
        debug!(?duration, "using configured model timeout");
        vars.insert(
            LlmSettings::TIMEOUT_ENV.to_string(),
            duration.as_secs().max(1).to_string(),
        );
    }
    if let Some(provider) = provider_flag {
        vars.insert(LlmSettings::PROVIDER_ENV.to_string(), provider.to_string());
    }
    Ok(vars)
}

fn print_classification(result: &ClassificationResult, format: OutputFormat) -> Result<()> {
    if format == OutputFormat::Human {
        let label = outcome_label(result.outcome);
        let banner = match result.outcome {
            Outcome::Matched => label.green(),
            Outcome::Extended => label.cyan(),
            Outcome::NameMatch => label.yellow(),
            Outcome::Fallback => label.red(),
        };
        println!("{} {}", "Classification:".bold(), banner);
    }
    print!("{}", render_classification(result, format)?);
    Ok(())
}

fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,tokio=warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init();
}
