//! broke command-line tool.
//!
//! Reconciles users of the configured identity sources into mail, wiki and
//! source-control targets: plan what is missing, apply it, check
//! connections, and inspect or generate configuration files.

mod progress;
mod render;
mod style;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dialoguer::Confirm;
use tracing::info;
use tracing_subscriber::EnvFilter;

use broke_core::config::{BrokeConfig, CONFIG_FILE_SUFFIX};
use broke_core::{ClientSet, Plan, Planner, RunOptions, Runner};

use progress::BarProgress;

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// broke identity broker.
#[derive(Parser, Debug)]
#[command(
    name = "broke",
    version,
    about = "Reconcile identity-provider users into mail, wiki and source-control systems"
)]
struct Cli {
    /// Path to the `*.broke.toml` configuration file.
    #[arg(
        short,
        long,
        global = true,
        env = "BROKE_CONFIG_FILE",
        default_value = "config.broke.toml"
    )]
    config: PathBuf,

    /// Enable debug logging.
    #[arg(short, long, global = true, env = "BROKE_VERBOSE")]
    verbose: bool,

    /// Enable trace logging.
    #[arg(long, global = true, env = "BROKE_VERY_VERBOSE")]
    very_verbose: bool,

    /// Do not print the banner.
    #[arg(long, global = true)]
    no_logo: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Compute and print the actions a run would apply.
    Plan {
        /// Print the plan as JSON instead of tables.
        #[arg(long)]
        json: bool,
    },

    /// Compute the plan and apply it.
    Run {
        /// Apply without asking for confirmation.
        #[arg(short, long)]
        yes: bool,

        /// Log every action instead of applying it.
        #[arg(long)]
        dry_run: bool,
    },

    /// Check connectivity and credentials of every source and target.
    Test,

    /// Validate a configuration file.
    Validate,

    /// Print the configuration as tables.
    Config,

    /// Generate a sample configuration file.
    Init {
        /// Output path for the generated config file.
        #[arg(short, long, default_value = "config.broke.toml")]
        output: PathBuf,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli);

    let quiet = cli.no_logo || matches!(cli.command, Commands::Plan { json: true });
    if !quiet {
        println!("{}", style::logo());
        println!();
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(cli: &Cli) {
    let level = if cli.very_verbose {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,broke_core={0},broke={0}", level)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Init { output } => cmd_init(&output),
        Commands::Validate => cmd_validate(&cli.config),
        Commands::Config => cmd_config(&cli.config),
        Commands::Test => cmd_test(&cli.config).await,
        Commands::Plan { json } => cmd_plan(&cli.config, json).await,
        Commands::Run { yes, dry_run } => cmd_run(&cli.config, yes, dry_run).await,
    }
}

// ---------------------------------------------------------------------------
// Config helpers
// ---------------------------------------------------------------------------

fn load_config(path: &Path) -> Result<BrokeConfig> {
    BrokeConfig::load_and_resolve(path).context("failed to load configuration file")
}

/// Load the configuration, build every client and make sure all of them
/// are reachable.
async fn connect(path: &Path) -> Result<(BrokeConfig, ClientSet)> {
    let config = load_config(path)?;
    let clients = ClientSet::from_config(&config).context("failed to create clients")?;

    let statuses = clients.test_connections().await;
    let failed: Vec<_> = statuses.iter().filter(|s| !s.is_ok()).collect();
    if !failed.is_empty() {
        render::print_connections(&statuses);
        let names: Vec<&str> = failed.iter().map(|s| s.name.as_str()).collect();
        anyhow::bail!("connection check failed for: {}", names.join(", "));
    }
    info!(clients = statuses.len(), "all connections ok");
    Ok((config, clients))
}

fn options(dry_run: bool, show_progress: bool) -> RunOptions {
    let options = RunOptions::default().dry_run(dry_run);
    if show_progress {
        options.with_progress(Arc::new(BarProgress::default()))
    } else {
        options
    }
}

async fn compute_plan(config: &BrokeConfig, clients: &ClientSet, options: &RunOptions) -> Result<Plan> {
    Planner::new(config, clients, options)
        .plan()
        .await
        .context("failed to compute plan")
}

// ---------------------------------------------------------------------------
// Subcommand implementations
// ---------------------------------------------------------------------------

async fn cmd_plan(config_path: &Path, json: bool) -> Result<()> {
    let (config, clients) = connect(config_path).await?;
    let options = options(false, !json);
    let plan = compute_plan(&config, &clients, &options).await?;

    if json {
        let out = serde_json::to_string_pretty(&plan).context("failed to serialize plan")?;
        println!("{}", out);
    } else {
        render::print_plan(&plan);
    }
    Ok(())
}

async fn cmd_run(config_path: &Path, yes: bool, dry_run: bool) -> Result<()> {
    let (config, clients) = connect(config_path).await?;
    let options = options(dry_run, true);
    let plan = compute_plan(&config, &clients, &options).await?;

    render::print_plan(&plan);
    if plan.is_empty() {
        return Ok(());
    }
    println!();

    if !yes && !dry_run {
        let proceed = Confirm::new()
            .with_prompt(format!("Apply {} actions?", plan.action_count()))
            .default(false)
            .interact()
            .context("failed to read confirmation")?;
        if !proceed {
            println!("{}", style::warn("Aborted, nothing was changed"));
            return Ok(());
        }
    }

    let report = Runner::new(&clients, &options)
        .apply(&plan)
        .await
        .context("run aborted; re-run `broke plan` to see the remaining actions")?;
    render::print_report(&report);
    Ok(())
}

async fn cmd_test(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let clients = ClientSet::from_config(&config).context("failed to create clients")?;

    let statuses = clients.test_connections().await;
    render::print_connections(&statuses);

    let failed = statuses.iter().filter(|s| !s.is_ok()).count();
    if failed > 0 {
        anyhow::bail!("{} of {} connections failed", failed, statuses.len());
    }
    println!("{}", style::success("All connections are working"));
    Ok(())
}

fn cmd_config(config_path: &Path) -> Result<()> {
    let mut config =
        BrokeConfig::load_from_file(config_path).context("failed to load configuration file")?;
    config.resolve_env_vars();
    render::print_config(&config);
    Ok(())
}

fn cmd_validate(config_path: &Path) -> Result<()> {
    println!("Validating configuration: {}", config_path.display());
    println!();

    let mut config =
        BrokeConfig::load_from_file(config_path).context("failed to parse configuration")?;
    println!("  {}", style::success("TOML structure is valid"));

    config.resolve_env_vars();
    println!("  {}", style::success("Environment variable references processed"));

    match config.validate() {
        Ok(()) => println!("  {}", style::success("All required fields are valid")),
        Err(e) => {
            println!("  {}", style::error(&format!("Validation error: {}", e)));
            anyhow::bail!("configuration validation failed");
        }
    }

    match ClientSet::from_config(&config) {
        Ok(_) => println!("  {}", style::success("All credentials are set")),
        Err(e) => println!("  {}", style::warn(&e.to_string())),
    }

    println!();
    println!("Configuration summary:");
    println!("  User sources : {}", config.user_sources.len());
    for source in &config.user_sources {
        println!(
            "    {} {}",
            source.name,
            style::dim(&format!("keycloak {} realm {}", source.keycloak.url, source.keycloak.realm))
        );
    }
    println!("  User targets : {}", config.user_targets.len());
    for target in &config.user_targets {
        println!(
            "    {} {}",
            target.name,
            style::dim(&format!(
                "{} {} ({} mappings)",
                target.kind.kind_name(),
                target.kind.url(),
                target.kind.mapping_count()
            ))
        );
    }
    Ok(())
}

fn cmd_init(output: &Path) -> Result<()> {
    let sample = r#"# broke configuration
# Secrets are never stored here: every *_env field names an environment
# variable holding the value.

[http]
timeout_secs = 30

[[user_sources]]
name = "keycloak"
[user_sources.keycloak]
url = "https://sso.example.com"
realm = "staff"
admin_username_env = "BROKE_KEYCLOAK_USERNAME"
admin_password_env = "BROKE_KEYCLOAK_PASSWORD"
# insecure = true   # skip TLS verification
[user_sources.load]
type = "full"

[[user_targets]]
name = "mail"
[user_targets.mailcow]
url = "https://mail.example.com"
api_key_env = "BROKE_MAILCOW_API_KEY"
[[user_targets.mailcow.mappings]]
group = "staff"
domain = "example.com"
auth_source = "keycloak"

[[user_targets]]
name = "wiki"
[user_targets.outline]
url = "https://wiki.example.com"
api_key_env = "BROKE_OUTLINE_API_KEY"
[[user_targets.outline.mappings]]
group = "staff"
outline_group = "Staff"
outline_role = "editor"            # admin | editor | viewer

[[user_targets]]
name = "code"
[user_targets.gitlab]
url = "https://git.example.com"
api_key_env = "BROKE_GITLAB_TOKEN"
[[user_targets.gitlab.mappings]]
role = "developer"
access_level = "regular"           # regular | administrator
[[user_targets.gitlab.mappings.group_assignments]]
group = "platform"
permission = "developer"           # owner | maintainer | developer | reporter | guest
"#;

    if !output.to_string_lossy().ends_with(CONFIG_FILE_SUFFIX) {
        anyhow::bail!(
            "configuration files must end in {}: {}",
            CONFIG_FILE_SUFFIX,
            output.display()
        );
    }
    if output.exists() {
        anyhow::bail!(
            "file already exists: {}. Use a different path or remove the existing file.",
            output.display()
        );
    }

    std::fs::write(output, sample).context("failed to write config file")?;

    println!("{}", style::success(&format!("Sample configuration written to {}", output.display())));
    println!();
    println!("Next steps:");
    println!("  1. Edit the config file with your Keycloak realm and targets");
    println!("  2. Set the referenced environment variables (BROKE_KEYCLOAK_PASSWORD, ...)");
    println!("  3. Check connections with: broke test --config {}", output.display());
    println!("  4. Review the plan with:   broke plan --config {}", output.display());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_flags() {
        let cli = Cli::try_parse_from(["broke", "-v", "run", "--yes", "--dry-run", "-c", "prod.broke.toml"])
            .unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config, PathBuf::from("prod.broke.toml"));
        assert!(matches!(cli.command, Commands::Run { yes: true, dry_run: true }));
    }

    #[test]
    fn test_init_writes_a_valid_sample() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.broke.toml");
        cmd_init(&path).unwrap();

        let config = BrokeConfig::load_from_file(&path).unwrap();
        config.validate().unwrap();
        assert_eq!(config.user_targets.len(), 3);

        // Refuses to overwrite.
        assert!(cmd_init(&path).is_err());
    }

    #[test]
    fn test_init_requires_suffix() {
        let dir = tempfile::tempdir().unwrap();
        assert!(cmd_init(&dir.path().join("sample.toml")).is_err());
    }
}
