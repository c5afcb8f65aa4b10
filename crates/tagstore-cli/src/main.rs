use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use tagstore_core::healing::AuditReport;
use tagstore_core::{App, AppBuilder, CoreConfig, CrossTagMoveOptions, StoreError};

#[derive(Parser)]
#[command(author, version, about = "Move tasks and manage tags in a tagged tasks document", long_about = None)]
struct Cli {
    /// JSON config file; missing keys keep their defaults
    #[arg(long, global = true, env = "TAGSTORE_CONFIG")]
    config: Option<PathBuf>,

    /// Tasks document (overrides store.path from the config)
    #[arg(short, long, global = true, env = "TAGSTORE_FILE")]
    file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Move a task or subtask to a new id inside one tag
    Move {
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
        #[arg(long)]
        tag: Option<String>,
    },
    /// Move several ids at once (comma separated, same length)
    MoveBatch {
        #[arg(long, value_delimiter = ',', required = true)]
        from: Vec<String>,
        #[arg(long, value_delimiter = ',', required = true)]
        to: Vec<String>,
        #[arg(long)]
        tag: Option<String>,
    },
    /// Move whole tasks from one tag to another
    MoveTag(MoveTagArgs),
    /// Run the self-healing audit once, or periodically with --watch
    Audit {
        #[arg(long)]
        watch: bool,
    },
    /// Tag administration
    #[command(subcommand)]
    Tags(TagCommands),
    /// Lock and circuit breaker status of this process
    ///
    /// Locks and breakers live in memory. A one-shot invocation starts with
    /// none held and no breaker tripped, so the output is empty; it is only
    /// informative for state shared within one running process.
    Status,
}

#[derive(Args)]
struct MoveTagArgs {
    #[arg(long)]
    from_tag: String,
    #[arg(long)]
    to_tag: String,
    /// Task ids to move
    #[arg(required = true, value_delimiter = ',')]
    ids: Vec<String>,
    /// Carry every task the moving set depends on
    #[arg(long, conflicts_with = "ignore_dependencies")]
    with_dependencies: bool,
    /// Drop dependency references that would cross tags
    #[arg(long)]
    ignore_dependencies: bool,
    /// Skip target tag name validation
    #[arg(long)]
    force: bool,
}

#[derive(Subcommand)]
enum TagCommands {
    List,
    Create {
        name: String,
        #[arg(long)]
        description: Option<String>,
    },
    Copy {
        source: String,
        target: String,
        #[arg(long)]
        description: Option<String>,
    },
    Rename {
        old: String,
        new: String,
    },
    Delete {
        name: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            match err.downcast_ref::<StoreError>() {
                Some(store_err) => eprintln!("error[{}]: {err:#}", store_err.code()),
                None => eprintln!("error: {err:#}"),
            }
            ExitCode::FAILURE
        }
    }
}

async fn load_config(cli: &Cli) -> Result<CoreConfig> {
    let mut config = match &cli.config {
        Some(path) => CoreConfig::load(path)
            .await
            .with_context(|| format!("loading config {}", path.display()))?,
        None => CoreConfig::default(),
    };
    if let Some(file) = &cli.file {
        config.store.path = file.clone();
    }
    Ok(config)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli).await?;
    tracing::debug!(path = %config.store.path.display(), "using tasks document");
    let app = AppBuilder::new().config(config).json_file_store().build()?;
    let service = app.service();

    match cli.command {
        Commands::Move { from, to, tag } => {
            print_json(&service.move_within_tag(tag.as_deref(), &from, &to, false).await?)
        }
        Commands::MoveBatch { from, to, tag } => {
            print_json(&service.move_batch(tag.as_deref(), &from[..], &to[..], false).await?)
        }
        Commands::MoveTag(args) => {
            let options = CrossTagMoveOptions {
                with_dependencies: args.with_dependencies,
                ignore_dependencies: args.ignore_dependencies,
                force: args.force,
            };
            let outcome = service
                .move_between_tags(&args.ids[..], &args.from_tag, &args.to_tag, &options, false)
                .await?;
            print_json(&outcome)
        }
        Commands::Audit { watch } => audit(&app, watch).await,
        Commands::Tags(command) => match command {
            TagCommands::List => print_json(&service.list_tags().await?),
            TagCommands::Create { name, description } => {
                print_json(&service.create_tag(&name, description.as_deref()).await?)
            }
            TagCommands::Copy {
                source,
                target,
                description,
            } => print_json(&service.copy_tag(&source, &target, description.as_deref()).await?),
            TagCommands::Rename { old, new } => print_json(&service.rename_tag(&old, &new).await?),
            TagCommands::Delete { name } => print_json(&service.delete_tag(&name).await?),
        },
        Commands::Status => print_json(&app.status()),
    }
}

async fn audit(app: &App, watch: bool) -> Result<()> {
    if watch {
        let auditor_loop = app
            .spawn_auditor_loop()
            .context("self-healing is disabled in the config")?;
        tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
        auditor_loop.shutdown_and_join().await;
        return Ok(());
    }

    let auditor = app
        .auditor()
        .context("self-healing is disabled in the config")?;
    let report: AuditReport = auditor.audit().await;
    print_json(&report)?;
    if !report.errors.is_empty() {
        anyhow::bail!("audit finished with {} error(s)", report.errors.len());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn status_help_says_it_is_process_local() {
        let mut cli = Cli::command();
        let status = cli.find_subcommand_mut("status").unwrap();
        let help = status.render_long_help().to_string();
        assert!(help.contains("this process"));
        assert!(help.contains("one-shot invocation"));
    }

    #[test]
    fn move_batch_splits_comma_lists() {
        let cli = Cli::try_parse_from(["tagstore", "move-batch", "--from", "1,2", "--to", "3,4"]).unwrap();
        match cli.command {
            Commands::MoveBatch { from, to, tag } => {
                assert_eq!(from, vec!["1", "2"]);
                assert_eq!(to, vec!["3", "4"]);
                assert!(tag.is_none());
            }
            _ => panic!("expected move-batch"),
        }
    }
}
