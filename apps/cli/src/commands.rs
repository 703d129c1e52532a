//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use homeviz_core::{
    CancelToken, DirectorySink, GeminiClient, Orchestrator, PipelineOutcome, ProgressReporter,
    PromptService, RetryPolicy, RunRequest,
};
use homeviz_shared::{
    AppConfig, ProductOptions, Scope, init_config, load_config, load_config_from,
    validate_api_key,
};
use homeviz_storage::Storage;
use homeviz_tenants::{TenantProvider, TenantRegistry};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// HomeViz: photorealistic home-improvement previews.
#[derive(Parser)]
#[command(
    name = "homeviz",
    version,
    about = "Generate photorealistic home-improvement previews and manage pipeline prompts.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file (defaults to ~/.homeviz/homeviz.toml).
    #[arg(long, env = "HOMEVIZ_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Override database path (overrides [storage].database).
    #[arg(long, global = true)]
    pub database: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run a tenant pipeline over a photo.
    Run(RunArgs),

    /// Inspect configured tenants.
    Tenants {
        #[command(subcommand)]
        action: TenantsAction,
    },

    /// Resolve and manage prompt overrides.
    Prompt {
        #[command(subcommand)]
        action: PromptAction,
    },

    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Args)]
pub(crate) struct RunArgs {
    /// Tenant id (defaults to [defaults].tenant).
    #[arg(short, long)]
    pub tenant: Option<String>,

    /// Input "before" image.
    #[arg(short, long)]
    pub image: PathBuf,

    /// Where to write the final image (format from extension).
    #[arg(short, long)]
    pub out: PathBuf,

    /// Where to write the cleaned reference image.
    #[arg(long)]
    pub clean_out: Option<PathBuf>,

    /// Enable a feature scope (repeatable), e.g. --scope doors.
    #[arg(long = "scope", value_name = "KEY")]
    pub scopes: Vec<String>,

    /// Product option (repeatable), e.g. --option color=bronze.
    #[arg(long = "option", value_name = "KEY=VALUE", value_parser = parse_key_val)]
    pub options: Vec<(String, String)>,

    /// Save the working image after every step into this directory.
    #[arg(long, value_name = "DIR")]
    pub debug_dir: Option<PathBuf>,
}

/// Tenant subcommands.
#[derive(Subcommand)]
pub(crate) enum TenantsAction {
    /// List tenant ids and names.
    List,
    /// Show a tenant's product schema and pipeline.
    Show {
        tenant: String,
        /// Print the full configuration as JSON.
        #[arg(long)]
        json: bool,
    },
}

/// Prompt subcommands.
#[derive(Subcommand)]
pub(crate) enum PromptAction {
    /// Print the effective prompt for a step.
    Resolve {
        #[arg(short, long)]
        tenant: String,
        #[arg(short, long)]
        step: String,
        /// Substitution variable (repeatable).
        #[arg(long = "option", value_name = "KEY=VALUE", value_parser = parse_key_val)]
        options: Vec<(String, String)>,
        /// Enabled scope for quality prompts (repeatable).
        #[arg(long = "scope", value_name = "KEY")]
        scopes: Vec<String>,
    },
    /// Store a new override version and make it active.
    Set {
        #[arg(short, long)]
        tenant: String,
        #[arg(short, long)]
        step: String,
        /// Prompt template text.
        #[arg(long, conflicts_with = "file", required_unless_present = "file")]
        text: Option<String>,
        /// Read the prompt template from a file.
        #[arg(long)]
        file: Option<PathBuf>,
        /// Author recorded with the version.
        #[arg(long, env = "USER")]
        author: Option<String>,
    },
    /// Reactivate the previous override version.
    Rollback {
        #[arg(short, long)]
        tenant: String,
        #[arg(short, long)]
        step: String,
    },
    /// List override versions, newest first.
    History {
        #[arg(short, long)]
        tenant: String,
        #[arg(short, long)]
        step: String,
    },
    /// List the active override of every step of a tenant.
    List {
        #[arg(short, long)]
        tenant: String,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

fn parse_key_val(s: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{s}'"))?;
    if key.trim().is_empty() {
        return Err(format!("empty key in '{s}'"));
    }
    Ok((key.trim().to_string(), value.to_string()))
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "homeviz=info",
        1 => "homeviz=debug",
        _ => "homeviz=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    if let Command::Config {
        action: ConfigAction::Init,
    } = cli.command
    {
        return cmd_config_init().await;
    }

    let mut config = match &cli.config {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    if let Some(db) = &cli.database {
        config.storage.database = Some(db.to_string_lossy().to_string());
    }

    match cli.command {
        Command::Run(args) => cmd_run(args, &config).await,
        Command::Tenants { action } => match action {
            TenantsAction::List => cmd_tenants_list(),
            TenantsAction::Show { tenant, json } => cmd_tenants_show(&tenant, json),
        },
        Command::Prompt { action } => match action {
            PromptAction::Resolve {
                tenant,
                step,
                options,
                scopes,
            } => cmd_prompt_resolve(&config, &tenant, &step, options, &scopes).await,
            PromptAction::Set {
                tenant,
                step,
                text,
                file,
                author,
            } => {
                cmd_prompt_set(&config, &tenant, &step, text, file.as_deref(), author.as_deref())
                    .await
            }
            PromptAction::Rollback { tenant, step } => {
                cmd_prompt_rollback(&config, &tenant, &step).await
            }
            PromptAction::History { tenant, step } => {
                cmd_prompt_history(&config, &tenant, &step).await
            }
            PromptAction::List { tenant } => cmd_prompt_list(&config, &tenant).await,
        },
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(&config),
        },
    }
}

/// How a command uses the override database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    ReadOnly,
    ReadWrite,
}

/// Prompt service over the built-in tenants and the configured database.
///
/// Read-only commands open an existing database without migrating it; a
/// database that does not exist yet is created read-write first.
async fn open_prompt_service(config: &AppConfig, access: Access) -> Result<Arc<PromptService>> {
    let tenants = Arc::new(TenantRegistry::with_builtins()?);
    let db_path = config.database_path()?;
    let storage = if access == Access::ReadOnly && db_path.exists() {
        Storage::open_readonly(&db_path).await?
    } else {
        Storage::open(&db_path).await?
    };
    Ok(Arc::new(PromptService::new(tenants, Arc::new(storage))))
}

fn scope_from_flags(scopes: &[String]) -> Scope {
    scopes.iter().map(|s| (s.clone(), true)).collect()
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

async fn cmd_run(args: RunArgs, config: &AppConfig) -> Result<()> {
    // Validate API key before doing anything
    let api_key = validate_api_key(config)?;

    let tenant_id = args
        .tenant
        .clone()
        .unwrap_or_else(|| config.defaults.tenant.clone());

    let image = image::open(&args.image)
        .map_err(|e| eyre!("cannot read image '{}': {e}", args.image.display()))?;

    let prompts = open_prompt_service(config, Access::ReadOnly).await?;
    let gemini = Arc::new(GeminiClient::new(&config.gemini, api_key)?);
    let mut orchestrator = Orchestrator::new(prompts, gemini.clone(), gemini)
        .with_retry(RetryPolicy::from(&config.retry))
        .with_quality(config.quality.clone());
    if let Some(dir) = &args.debug_dir {
        let sink = DirectorySink::new(dir)?;
        info!(dir = %sink.dir().display(), "capturing step images");
        orchestrator = orchestrator.with_image_sink(Arc::new(sink));
    }

    let request = RunRequest {
        tenant_id: tenant_id.clone(),
        image,
        scope: scope_from_flags(&args.scopes),
        options: args.options.iter().cloned().collect::<ProductOptions>(),
    };

    info!(
        tenant = %tenant_id,
        image = %args.image.display(),
        scopes = ?args.scopes,
        "starting visualization"
    );

    // Ctrl-C cancels the run between calls and during backoff
    let cancel = CancelToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    });

    let reporter = CliProgress::new();
    let outcome = match orchestrator.run(request, &reporter, &cancel).await {
        Ok(outcome) => outcome,
        Err(e) => {
            reporter.clear();
            return Err(e.into());
        }
    };

    save_image(&outcome.final_image, &args.out)?;
    if let (Some(path), Some(clean)) = (&args.clean_out, &outcome.clean_image) {
        save_image(clean, path)?;
    }

    // Print summary
    println!();
    println!("  Visualization complete!");
    println!("  Run:     {}", outcome.run_id);
    println!("  Tenant:  {tenant_id}");
    println!("  Steps:   {}", outcome.steps_executed.join(" → "));
    match (&outcome.score, &outcome.reason) {
        (Some(score), Some(reason)) => println!("  Quality: {score:.2} ({reason})"),
        _ => println!("  Quality: not checked"),
    }
    if outcome.quality_retried {
        println!("  Refined: yes");
    }
    if outcome.identical_to_input {
        println!("  WARNING: output is identical to the input image");
    }
    println!("  Output:  {}", args.out.display());
    if let Some(path) = &args.clean_out {
        println!("  Clean:   {}", path.display());
    }
    println!("  Time:    {:.1}s", outcome.elapsed.as_secs_f64());
    println!();

    Ok(())
}

fn save_image(image: &image::DynamicImage, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    // JPEG has no alpha channel
    let is_jpeg = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("jpg") || e.eq_ignore_ascii_case("jpeg"));
    let result = if is_jpeg {
        image::DynamicImage::ImageRgb8(image.to_rgb8()).save(path)
    } else {
        image.save(path)
    };
    result.map_err(|e| eyre!("cannot write image '{}': {e}", path.display()))
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }

    fn clear(&self) {
        self.spinner.finish_and_clear();
    }
}

impl ProgressReporter for CliProgress {
    fn report(&self, percent: u8, message: &str) {
        self.spinner.set_message(format!("[{percent:>3}%] {message}"));
    }

    fn done(&self, _outcome: &PipelineOutcome) {
        self.spinner.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// tenants
// ---------------------------------------------------------------------------

fn cmd_tenants_list() -> Result<()> {
    let registry = TenantRegistry::with_builtins()?;
    for id in registry.all_tenants() {
        let tenant = registry.get_config(&id)?;
        println!("{id:<10} {}", tenant.config.display_name);
    }
    Ok(())
}

fn cmd_tenants_show(tenant_id: &str, json: bool) -> Result<()> {
    let registry = TenantRegistry::with_builtins()?;
    let tenant = registry.get_config(tenant_id)?;
    let config = &tenant.config;

    if json {
        println!("{}", serde_json::to_string_pretty(config)?);
        return Ok(());
    }

    println!("{} ({})", config.display_name, config.tenant_id);
    println!();
    println!("Product options:");
    for category in &config.product_schema {
        let required = if category.required { " (required)" } else { "" };
        println!("  {} [{}]{required}", category.label, category.key);
        for (value, label) in config.options_for_category(&category.key) {
            println!("    {value:<22} {label}");
        }
    }
    println!();
    println!("Pipeline:");
    for (index, (name, step)) in config.ordered_steps()?.into_iter().enumerate() {
        let step_type = step
            .step_type
            .as_ref()
            .map(|t| t.to_string())
            .unwrap_or_else(|| "?".into());
        let scope = step
            .scope_key
            .as_deref()
            .map(|k| format!(" scope={k}"))
            .unwrap_or_default();
        let weight = step.progress_weight.map(|w| format!(" {w}%")).unwrap_or_default();
        println!("  {}. {name} [{step_type}]{scope}{weight}", index + 1);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// prompt
// ---------------------------------------------------------------------------

async fn cmd_prompt_resolve(
    config: &AppConfig,
    tenant: &str,
    step: &str,
    options: Vec<(String, String)>,
    scopes: &[String],
) -> Result<()> {
    let prompts = open_prompt_service(config, Access::ReadOnly).await?;

    let mut vars: homeviz_core::PromptVars = options
        .into_iter()
        .map(|(k, v)| (k, serde_json::Value::String(v)))
        .collect();
    vars.insert(
        "scope".to_string(),
        serde_json::to_value(scope_from_flags(scopes))?,
    );

    match prompts.active_override(tenant, step).await? {
        Some(active) => eprintln!("# active override: v{}", active.version),
        None => eprintln!("# no active override, using code default"),
    }
    println!("{}", prompts.resolve(step, tenant, &vars).await?);
    Ok(())
}

async fn cmd_prompt_set(
    config: &AppConfig,
    tenant: &str,
    step: &str,
    text: Option<String>,
    file: Option<&Path>,
    author: Option<&str>,
) -> Result<()> {
    let prompt_text = match (text, file) {
        (Some(text), _) => text,
        (None, Some(path)) => std::fs::read_to_string(path)
            .map_err(|e| eyre!("cannot read prompt file '{}': {e}", path.display()))?,
        (None, None) => return Err(eyre!("either --text or --file is required")),
    };

    let prompts = open_prompt_service(config, Access::ReadWrite).await?;
    let created = prompts
        .create_override(tenant, step, &prompt_text, author)
        .await?;
    println!(
        "Created {tenant}/{step} v{} (id {})",
        created.version, created.id
    );
    Ok(())
}

async fn cmd_prompt_rollback(config: &AppConfig, tenant: &str, step: &str) -> Result<()> {
    let prompts = open_prompt_service(config, Access::ReadWrite).await?;
    match prompts.rollback(tenant, step).await? {
        Some(active) => println!("Rolled back {tenant}/{step}; v{} is active", active.version),
        None => println!("No previous version of {tenant}/{step} to roll back to"),
    }
    Ok(())
}

async fn cmd_prompt_history(config: &AppConfig, tenant: &str, step: &str) -> Result<()> {
    let prompts = open_prompt_service(config, Access::ReadOnly).await?;
    let history = prompts.history(tenant, step).await?;
    if history.is_empty() {
        println!("No overrides stored for {tenant}/{step}");
        return Ok(());
    }

    for version in history {
        let marker = if version.is_active { "*" } else { " " };
        let first_line = version.prompt_text.lines().next().unwrap_or_default();
        let excerpt: String = first_line.chars().take(60).collect();
        println!(
            "{marker} v{:<4} {}  {:<12} {excerpt}",
            version.version,
            version.created_at.format("%Y-%m-%d %H:%M"),
            version.created_by.as_deref().unwrap_or("-"),
        );
    }
    Ok(())
}

async fn cmd_prompt_list(config: &AppConfig, tenant: &str) -> Result<()> {
    let prompts = open_prompt_service(config, Access::ReadOnly).await?;
    let active = prompts.active_overrides(tenant).await?;
    if active.is_empty() {
        println!("No active overrides for {tenant}; every step uses its code default");
        return Ok(());
    }

    for version in active {
        println!(
            "{:<16} v{:<4} {}  {}",
            version.step_name,
            version.version,
            version.created_at.format("%Y-%m-%d %H:%M"),
            version.created_by.as_deref().unwrap_or("-"),
        );
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config: &AppConfig) -> Result<()> {
    let toml_str = toml::to_string_pretty(config)?;
    println!("{toml_str}");
    Ok(())
}
