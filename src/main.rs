//! NewsLens - sentiment reports for news text
//!
//! A CLI that labels news text with a local Ollama model, stores the
//! resulting reports in a JSON snapshot and shares them between users.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Runtime error (invalid input, unknown user or report, permission
//!       denied, analyzer failure, store I/O)

use anyhow::{anyhow, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use newslens::analysis::generate_summary_text;
use newslens::analyzer::{OllamaAnalyzer, OllamaConfig};
use newslens::cli::{Actor, Args, Command, OutputArgs, OutputFormat, UserCommand};
use newslens::config::{Config, DEFAULT_CONFIG_FILE};
use newslens::models::{ReportId, User};
use newslens::report::{self, RenderOptions, ReportView};
use newslens::store::MemoryStore;
use newslens::{OrchestratorConfig, ReportService};
use std::collections::BTreeSet;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse_args();

    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    init_logging(&args);

    info!("NewsLens v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    if let Err(e) = run(args).await {
        error!("{:#}", e);
        eprintln!("\n❌ Error: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// Handle --init-config: generate a default .newslens.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(DEFAULT_CONFIG_FILE);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            DEFAULT_CONFIG_FILE
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", DEFAULT_CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", DEFAULT_CONFIG_FILE);
    Ok(())
}

/// Initialize logging; `RUST_LOG` takes precedence over the verbosity flags.
fn init_logging(args: &Args) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::default().add_directive(LevelFilter::from_level(args.log_level()).into())
    });

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from {}", DEFAULT_CONFIG_FILE);
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {:#}", e);
            Ok(Config::default())
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let mut config = load_config(&args)?;
    config.merge_with_args(&args);
    config.validate().map_err(|e| anyhow!(e))?;

    let store_path = PathBuf::from(&config.general.store);
    let store = Arc::new(
        MemoryStore::open(&store_path)
            .with_context(|| format!("Failed to open store {}", store_path.display()))?,
    );
    debug!("Using store {}", store_path.display());

    let analyzer = OllamaAnalyzer::new(OllamaConfig {
        ollama_url: config.model.ollama_url.clone(),
        model_name: config.model.name.clone(),
        temperature: config.model.temperature,
        timeout_seconds: config.model.timeout_seconds,
        max_keywords: config.model.max_keywords,
    })?;

    let service = ReportService::new(
        store.clone(),
        Arc::new(analyzer),
        OrchestratorConfig::from(&config),
    );

    let Some(command) = args.command else {
        return Err(anyhow!("A subcommand is required (see --help)"));
    };

    let changed = dispatch(&service, &config, command, args.quiet).await?;

    if changed {
        store
            .save()
            .with_context(|| format!("Failed to save store {}", store_path.display()))?;
        debug!("Saved store to {}", store_path.display());
    }

    Ok(())
}

/// Run one subcommand. Returns whether the store was modified.
async fn dispatch(
    service: &ReportService,
    config: &Config,
    command: Command,
    quiet: bool,
) -> Result<bool> {
    match command {
        Command::User { action } => handle_user(service, action),

        Command::Analyze {
            actor,
            input,
            name,
            output,
        } => {
            let owner = resolve(service, &actor)?;
            let text = read_input(input.as_deref())?;

            let spinner = analysis_spinner(quiet);
            let result = service.create_report(owner.id, &text, name).await;
            spinner.finish_and_clear();
            let created = result?;

            println!("✅ Created {} ({})", created.id, created.title());
            if created.degraded_items > 0 {
                println!(
                    "   ⚠️  {} item(s) could not be analyzed and were marked neutral",
                    created.degraded_items
                );
            }
            println!("\n{}", generate_summary_text(&created.aggregate));

            if output.output.is_some() || output.format == OutputFormat::Json {
                render(service, config, &owner, created.id, &output)?;
            }
            Ok(true)
        }

        Command::Show {
            actor,
            report,
            output,
        } => {
            let user = resolve(service, &actor)?;
            render(service, config, &user, ReportId(report), &output)?;
            Ok(false)
        }

        Command::List { actor } => {
            let user = resolve(service, &actor)?;
            list_reports(service, &user)?;
            Ok(false)
        }

        Command::Share {
            actor,
            report,
            recipients,
        } => {
            let user = resolve(service, &actor)?;
            let recipients = recipients
                .iter()
                .map(|handle| service.find_user(handle))
                .collect::<newslens::Result<Vec<_>>>()?;

            for recipient in recipients {
                service.grant_share(ReportId(report), user.id, recipient.id)?;
                println!("✅ Shared report#{} with {}", report, recipient.handle);
            }
            Ok(true)
        }

        Command::Unshare {
            actor,
            report,
            recipient,
        } => {
            let user = resolve(service, &actor)?;
            let recipient = service.find_user(&recipient)?;
            service.revoke_share(ReportId(report), user.id, recipient.id)?;
            println!("✅ Stopped sharing report#{} with {}", report, recipient.handle);
            Ok(true)
        }

        Command::SetShares {
            actor,
            report,
            recipients,
        } => {
            let user = resolve(service, &actor)?;
            let desired = recipients
                .iter()
                .map(|handle| service.find_user(handle).map(|u| u.id))
                .collect::<newslens::Result<BTreeSet<_>>>()?;

            let outcome = service.reconcile_shares(ReportId(report), user.id, &desired)?;
            println!(
                "✅ Sharing of report#{} updated: {} added, {} removed",
                report,
                outcome.added.len(),
                outcome.removed.len()
            );
            Ok(!outcome.is_noop())
        }

        Command::Delete { actor, report } => {
            let user = resolve(service, &actor)?;
            service.delete_report(ReportId(report), user.id)?;
            println!("🗑️  Deleted report#{}", report);
            Ok(true)
        }
    }
}

fn handle_user(service: &ReportService, action: UserCommand) -> Result<bool> {
    match action {
        UserCommand::Add { handle } => {
            let user = service.register_user(&handle)?;
            println!("✅ Registered {} ({})", user.handle, user.id);
            Ok(true)
        }
        UserCommand::List => {
            let users = service.list_users();
            if users.is_empty() {
                println!("No users registered.");
            }
            for user in users {
                println!(
                    "{:>10}  {}  (since {})",
                    user.id.to_string(),
                    user.handle,
                    user.created_at.format("%Y-%m-%d")
                );
            }
            Ok(false)
        }
        UserCommand::Remove { handle } => {
            let user = service.find_user(&handle)?;
            service.remove_user(user.id)?;
            println!("🗑️  Removed {} with their reports", user.handle);
            Ok(true)
        }
    }
}

fn resolve(service: &ReportService, actor: &Actor) -> Result<User> {
    Ok(service.find_user(&actor.user)?)
}

/// Read the text to analyze from a file, or stdin for `None` and `-`.
fn read_input(input: Option<&Path>) -> Result<String> {
    match input {
        Some(path) if path != Path::new("-") => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display())),
        _ => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("Failed to read stdin")?;
            Ok(text)
        }
    }
}

fn analysis_spinner(quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }

    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg} [{elapsed}]")
    {
        spinner.set_style(style);
    }
    spinner.set_message("Analyzing text...");
    spinner.enable_steady_tick(Duration::from_millis(120));
    spinner
}

fn render(
    service: &ReportService,
    config: &Config,
    viewer: &User,
    report: ReportId,
    output: &OutputArgs,
) -> Result<()> {
    let found = service.get_report(report, viewer.id)?;
    let items = service.get_report_items(report, viewer.id)?;

    let owner = service
        .user(found.owner)
        .map(|u| u.handle)
        .unwrap_or_else(|_| found.owner.to_string());

    let shared_with = if found.owner == viewer.id {
        service
            .sharing()
            .list_recipients(report)?
            .into_iter()
            .map(|u| u.handle)
            .collect()
    } else {
        Vec::new()
    };

    let view = ReportView {
        report: found,
        owner,
        shared_with,
        items,
    };

    let content = match output.format {
        OutputFormat::Json => report::generate_json_report(&view)?,
        OutputFormat::Markdown => {
            report::generate_markdown_report(&view, &RenderOptions::from(&config.report))
        }
    };

    match output.output {
        Some(ref path) => {
            report::write_report(&content, path)?;
            println!("📝 Report saved to: {}", path.display());
        }
        None => println!("{}", content),
    }

    Ok(())
}

fn list_reports(service: &ReportService, user: &User) -> Result<()> {
    let owned = service.list_owned_reports(user.id)?;
    let shared = service.list_shared_reports(user.id)?;

    println!("📁 Your reports ({}):", owned.len());
    for report in &owned {
        println!("   {}", report::report_list_line(report, None));
    }

    println!("\n🤝 Shared with you ({}):", shared.len());
    for report in &shared {
        let owner = service
            .user(report.owner)
            .map(|u| u.handle)
            .unwrap_or_else(|_| report.owner.to_string());
        println!("   {}", report::report_list_line(report, Some(&owner)));
    }

    Ok(())
}
