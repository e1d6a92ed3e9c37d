// ABOUTME: Entry point for the conductor CLI.
// ABOUTME: Loads config, initializes logging and metrics, then dispatches the chosen subcommand.

use anyhow::{Context, Result};
use clap::Parser;
use conductor::cli::{Cli, Commands};
use conductor::{logging, AppContext};
use conductor_core::config::Config;
use conductor_core::metrics;
use conductor_core::tools::ToolCategory;
use serde_json::Value;

#[tokio::main]
async fn main() -> Result<()> {
    // Set up panic hook to log panics before they crash the process
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("\nPANIC! conductor crashed with the following error:\n");
        eprintln!("{}", panic_info);
        eprintln!("\nBacktrace:");
        eprintln!("{:?}", std::backtrace::Backtrace::force_capture());
    }));

    let cli = Cli::parse();

    dotenvy::dotenv().ok();
    let config = Config::load()?;
    let _log_guard = logging::init(&config)?;

    if let Some(listen) = &config.metrics.prometheus_listen {
        metrics::init_prometheus(listen)?;
    }

    tracing::debug!(
        data_dir = %config.data_dir().display(),
        locale = %config.tools.locale,
        "Configuration loaded"
    );

    let ctx = AppContext::new(config)?;
    let result = dispatch(&ctx, cli.command).await;
    if let Err(e) = &result {
        metrics::record_error("command_failed");
        tracing::error!(error = %e, "Command failed");
    }
    result
}

async fn dispatch(ctx: &AppContext, command: Commands) -> Result<()> {
    match command {
        Commands::Create {
            conversation_type,
            name,
            extra,
            id,
        } => {
            let extra = extra.as_deref().map(parse_json).transpose()?;
            let meta = ctx
                .create_conversation(&conversation_type, name, extra, id)
                .await?;
            println!("{}", meta.id);
        }

        Commands::List => {
            let conversations = ctx.list_conversations()?;
            if conversations.is_empty() {
                println!("No conversations");
            }
            for meta in conversations {
                let created = meta
                    .created_at
                    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_default();
                println!(
                    "{:<38} {:<6} {:<17} {}",
                    meta.id,
                    meta.conversation_type,
                    created,
                    meta.name.as_deref().unwrap_or("")
                );
            }
        }

        Commands::Run { id, prompts } => {
            let outcome = tokio::select! {
                result = ctx.run_conversation(&id, &prompts, |line| println!("{}", line)) => result,
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!(conversation_id = %id, "Interrupted, stopping worker tasks");
                    Ok(0)
                }
            };
            ctx.shutdown();
            let completed = outcome?;
            tracing::info!(conversation_id = %id, completed, "Run finished");
        }

        Commands::Tools { category } => {
            let category = category
                .as_deref()
                .map(str::parse::<ToolCategory>)
                .transpose()?;
            for row in ctx.tools(category) {
                println!(
                    "{:>5}  {:<32} {:<14} {:<20} {}",
                    row.priority,
                    row.id,
                    row.category.as_str(),
                    row.label,
                    row.description
                );
            }
        }

        Commands::Resolve { event_type, data } => {
            let data = data
                .as_deref()
                .map(parse_json)
                .transpose()?
                .unwrap_or(Value::Null);
            let descriptor = ctx.resolve(&event_type, &data);
            println!("{}", serde_json::to_string_pretty(&descriptor)?);
        }
    }
    Ok(())
}

fn parse_json(raw: &str) -> Result<Value> {
    serde_json::from_str(raw).with_context(|| format!("Invalid JSON: {}", raw))
}
