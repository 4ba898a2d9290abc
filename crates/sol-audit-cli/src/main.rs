mod config;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use sol_audit_core::report::{render_history, render_single, render_snapshot, OutputFormat};
use sol_audit_core::{
    audit_single, build_gateway, AuditStore, FileAuditStore, GatewayAuditor, GithubClient,
    RepositoryAuditPipeline, Vendor, VendorSettings,
};
use tokio::io::AsyncReadExt;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::AppConfig;

#[derive(Parser, Debug)]
#[command(
    name = "sol-audit",
    author,
    version,
    about = "AI-assisted Solidity smart contract auditor"
)]
struct Cli {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value_t = Format::Human, global = true)]
    format: Format,

    /// Override the LLM vendor (gemini, openai, claude, grok)
    #[arg(long, global = true)]
    vendor: Option<Vendor>,

    /// Override the model identifier
    #[arg(long, global = true)]
    model: Option<String>,

    /// Request timeout, e.g. `30s` or `2m`
    #[arg(long, value_parser = humantime::parse_duration, global = true)]
    timeout: Option<Duration>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List supported vendors and models
    Models,
    /// Audit a single Solidity file (`-` reads stdin)
    Audit {
        #[arg(value_name = "FILE", default_value = "-")]
        input: String,
        /// Save live results to this user's history
        #[arg(long)]
        user: Option<String>,
    },
    /// Audit the Solidity files of a public GitHub repository
    Repo {
        /// https://github.com/<owner>/<repo>[/tree/<branch>]
        url: String,
        #[arg(long)]
        max_files: Option<usize>,
        #[arg(long)]
        line_cap: Option<usize>,
    },
    /// Show saved single-file audits for a user
    History {
        #[arg(long)]
        user: String,
    },
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum Format {
    Human,
    Json,
    Yaml,
}

impl From<Format> for OutputFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Human => OutputFormat::Human,
            Format::Json => OutputFormat::Json,
            Format::Yaml => OutputFormat::Yaml,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref())?;
    let format = OutputFormat::from(cli.format);

    match &cli.command {
        Commands::Models => list_models(format)?,
        Commands::Audit { input, user } => {
            let settings = vendor_settings(&cli, &config)?;
            audit_file(&config, settings, input, user.as_deref(), format).await?
        }
        Commands::Repo {
            url,
            max_files,
            line_cap,
        } => {
            let settings = vendor_settings(&cli, &config)?;
            let mut config = config;
            if let Some(max_files) = max_files {
                config.pipeline.max_files = *max_files;
            }
            if let Some(line_cap) = line_cap {
                config.pipeline.total_line_cap = *line_cap;
            }
            if let Some(timeout) = cli.timeout {
                config.github.timeout_secs = timeout.as_secs().max(1);
            }
            audit_repository(&config, settings, url, format).await?
        }
        Commands::History { user } => show_history(&config, user, format).await?,
    }
    Ok(())
}

fn vendor_settings(cli: &Cli, config: &AppConfig) -> Result<VendorSettings> {
    let mut settings = VendorSettings::for_vendor(cli.vendor, &config.vendors)?;
    if let Some(model) = &cli.model {
        settings.model = Some(model.clone());
    }
    if let Some(timeout) = cli.timeout {
        settings.timeout_secs = Some(timeout.as_secs().max(1));
    }
    Ok(settings)
}

fn list_models(format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(Vendor::catalog())?),
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(Vendor::catalog())?),
        OutputFormat::Human => {
            for vendor in Vendor::ALL {
                println!("{}", vendor.display_name().bold());
                for model in vendor.models() {
                    let marker = if model.id == vendor.default_model() {
                        " (default)"
                    } else {
                        ""
                    };
                    println!("  - {:<28} {}{}", model.id, model.label, marker);
                }
            }
        }
    }
    Ok(())
}

async fn read_source(input: &str) -> Result<String> {
    let source = if input == "-" {
        let mut buf = String::new();
        tokio::io::stdin()
            .read_to_string(&mut buf)
            .await
            .context("failed to read source from stdin")?;
        buf
    } else {
        tokio::fs::read_to_string(input)
            .await
            .with_context(|| format!("failed to read {input}"))?
    };
    if source.trim().is_empty() {
        bail!("no Solidity source provided");
    }
    Ok(source)
}

async fn audit_file(
    config: &AppConfig,
    settings: VendorSettings,
    input: &str,
    user: Option<&str>,
    format: OutputFormat,
) -> Result<()> {
    let source = read_source(input).await?;
    let auditor = if settings.has_credentials() {
        Some(GatewayAuditor::new(build_gateway(&settings)?))
    } else {
        None
    };

    let audit = audit_single(auditor.as_ref(), &source).await;
    print!("{}", render_single(&audit, format)?);

    if let Some(user) = user {
        if audit.is_live() {
            let store = FileAuditStore::new(config.store_dir());
            let record = store.save(user, &source, audit.result()).await?;
            info!(id = %record.id, user, "saved audit to history");
        } else {
            eprintln!(
                "{} sample results are not saved to history",
                "warning:".yellow().bold()
            );
        }
    }
    Ok(())
}

async fn audit_repository(
    config: &AppConfig,
    settings: VendorSettings,
    url: &str,
    format: OutputFormat,
) -> Result<()> {
    if !settings.has_credentials() {
        bail!(
            "{} API key required for repository audits; set SOL_AUDIT_API_KEY or vendors.{}.api_key",
            settings.vendor.display_name(),
            settings.vendor
        );
    }
    let auditor = GatewayAuditor::new(build_gateway(&settings)?);
    let github = Arc::new(GithubClient::new(&config.github)?);
    let pipeline = RepositoryAuditPipeline::with_config(Arc::clone(&github), github, config.pipeline);

    info!(
        vendor = %settings.vendor,
        model = %settings.model_or_default(),
        repository = url,
        "starting repository audit"
    );
    let snapshot = pipeline
        .run(url, &auditor, |progress| {
            let pending = progress
                .file_order
                .iter()
                .filter(|path| !progress.results.contains_key(*path))
                .count();
            info!(
                audited = progress.results.len(),
                fallbacks = progress.fallback_count(),
                pending,
                "audit progress"
            );
        })
        .await
        .with_context(|| format!("repository audit failed for {url}"))?;

    print!("{}", render_snapshot(&snapshot, format)?);
    Ok(())
}

async fn show_history(config: &AppConfig, user: &str, format: OutputFormat) -> Result<()> {
    let store = FileAuditStore::new(config.store_dir());
    let records = store.list_for_user(user).await?;
    print!("{}", render_history(&records, format)?);
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
