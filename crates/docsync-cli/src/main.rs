//! docsync command line
//!
//! Exit codes: `0` every plugin succeeded or had nothing new, `1` a plugin
//! failed, was blocked or was cancelled, `2` the run could not start.

mod config;
mod logging;

use anyhow::Context;
use clap::{Parser, Subcommand};
use config::{Settings, DEFAULT_SETTINGS_FILE};
use docsync_connectors::builtin_registry;
use docsync_core::{DependencyPolicy, ExecutionPlan, ExitStatus, RunContext, Scheduler};
use docsync_corpus::Reconciler;
use docsync_cursor::{CursorReader, SqliteCursorStore, VersionCursorStore};
use logging::LogFormat;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Parser)]
#[command(name = "docsync", version, about = "Synchronize documents into a retrieval corpus")]
struct Cli {
    /// Settings file
    #[arg(short, long, global = true, default_value = DEFAULT_SETTINGS_FILE)]
    config: PathBuf,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run every enabled plugin and reconcile its output
    Run {
        /// Override run.max_concurrency
        #[arg(long)]
        max_concurrency: Option<usize>,
        /// Skip plugins whose dependencies did not succeed
        #[arg(long)]
        require_success: bool,
        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the execution order without running anything
    Plan,
    /// Inspect the version ledger
    Cursor {
        #[command(subcommand)]
        action: CursorCommand,
    },
}

#[derive(Debug, Subcommand)]
enum CursorCommand {
    /// Last synchronized version of one document
    Show {
        /// Logical document name
        name: String,
    },
    /// Every tracked document
    List,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init(cli.log_format);

    let status = match execute(cli).await {
        Ok(status) => status,
        Err(e) => {
            tracing::error!(error = ?e, "docsync could not start");
            eprintln!("docsync: {e:#}");
            ExitStatus::ConfigurationError
        }
    };
    std::process::exit(status.code());
}

async fn execute(cli: Cli) -> anyhow::Result<ExitStatus> {
    let mut settings = Settings::load(&cli.config)?;

    match cli.command {
        Command::Run {
            max_concurrency,
            require_success,
            json,
        } => {
            if let Some(n) = max_concurrency {
                settings = settings.with_max_concurrency(n);
            }
            if require_success {
                settings = settings.with_dependency_policy(DependencyPolicy::RequireSuccess);
            }
            settings.validate()?;
            run(settings, json).await
        }
        Command::Plan => {
            settings.validate()?;
            let plan = load_plan(&settings)?;
            for (position, name) in plan.order().into_iter().enumerate() {
                let marker = match plan.plugin(name) {
                    Some(p) if !p.is_enabled() => " (disabled)",
                    _ => "",
                };
                println!("{:>3}. {name}{marker}", position + 1);
            }
            Ok(ExitStatus::Success)
        }
        Command::Cursor { action } => {
            let store = open_store(&settings).await?;
            match action {
                CursorCommand::Show { name } => match store.record(&name).await? {
                    Some(record) => println!(
                        "{}  {}  (updated {})",
                        record.name,
                        record.version,
                        record.updated_at.to_rfc3339()
                    ),
                    None => println!("{name}: never synchronized"),
                },
                CursorCommand::List => {
                    for record in store.records().await? {
                        println!("{:<32} {}", record.name, record.version);
                    }
                }
            }
            Ok(ExitStatus::Success)
        }
    }
}

fn load_plan(settings: &Settings) -> anyhow::Result<ExecutionPlan> {
    ExecutionPlan::load(settings.plugins.clone(), &builtin_registry()).context("invalid plugin configuration")
}

async fn open_store(settings: &Settings) -> anyhow::Result<SqliteCursorStore> {
    SqliteCursorStore::connect(&settings.cursor_store.url, &settings.cursor_store.table)
        .await
        .context("cannot open cursor store")
}

async fn run(settings: Settings, json: bool) -> anyhow::Result<ExitStatus> {
    let plan = load_plan(&settings)?;
    let store: Arc<dyn VersionCursorStore> = Arc::new(open_store(&settings).await?);
    let client = Arc::new(settings.corpus.client()?);

    let reconciler = Reconciler::new(client, Arc::clone(&store))
        .with_retry(settings.corpus.retry_policy())
        .with_duplicate_policy(settings.corpus.duplicate_policy);
    let scheduler = Scheduler::new(plan, Arc::new(reconciler)).with_policy(settings.run.dependency_policy);

    let cancel = CancellationToken::new();
    let ctx = RunContext::new(CursorReader::new(store))
        .with_cancellation(cancel.clone())
        .with_plugin_timeout(settings.run.plugin_timeout());

    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted; waiting for running plugins, starting no new ones");
            cancel.cancel();
        }
    });

    let report = scheduler.run(&ctx, settings.run.max_concurrency).await;
    interrupt.abort();

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{report}");
    }
    Ok(report.exit_status())
}
