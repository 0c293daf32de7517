//! snipvault CLI - save code and answers from AI chats, recall them while you code

mod cli;
mod commands;
mod error;


use clap::{CommandFactory, Parser};
use snipvault_core::capture::{KnowledgeEdit, SnippetEdit};

use crate::cli::{AddCommands, Cli, Commands, EditCommands, ProjectCommands, SyncCommands};
use crate::commands::add::{run_add_knowledge, run_add_snippet};
use crate::commands::common::resolve_db_path;
use crate::commands::config::run_config;
use crate::commands::context::run_context;
use crate::commands::delete::run_delete;
use crate::commands::edit::{run_edit_knowledge, run_edit_snippet};
use crate::commands::export::run_export;
use crate::commands::list::run_list;
use crate::commands::project::{run_project_add, run_project_list};
use crate::commands::search::run_search;
use crate::commands::sync::{run_activity, run_queue, run_sync, run_sync_status, run_sync_watch};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("snipvault=info".parse().expect("valid directive"))
                .add_directive("snipvault_core=warn".parse().expect("valid directive")),
        )
        .init();

    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db_path);

    match cli.command {
        Some(Commands::Project { command }) => match command {
            ProjectCommands::Add { name, description } => {
                run_project_add(&name, description, &db_path).await?;
            }
            ProjectCommands::List { json } => run_project_list(json, &db_path).await?,
        },
        Some(Commands::Add { command }) => match command {
            AddCommands::Snippet {
                code,
                language,
                description,
                target,
            } => run_add_snippet(&code, language, description, &target, &db_path).await?,
            AddCommands::Knowledge {
                question,
                answer,
                tags,
                target,
            } => {
                run_add_knowledge(&question, answer.as_deref(), tags, &target, &db_path).await?;
            }
        },
        Some(Commands::List {
            filter,
            limit,
            json,
        }) => run_list(&filter, limit, json, &db_path).await?,
        Some(Commands::Search {
            query,
            filter,
            limit,
            json,
        }) => run_search(&query, &filter, limit, json, &db_path).await?,
        Some(Commands::Edit { command }) => match command {
            EditCommands::Snippet {
                id,
                code,
                language,
                description,
            } => {
                let edit = SnippetEdit {
                    code,
                    language,
                    description,
                };
                run_edit_snippet(&id, edit, &db_path).await?;
            }
            EditCommands::Knowledge {
                id,
                question,
                answer,
                tags,
            } => {
                let edit = KnowledgeEdit {
                    question,
                    answer,
                    tags,
                };
                run_edit_knowledge(&id, edit, &db_path).await?;
            }
        },
        Some(Commands::Delete { kind, id }) => run_delete(kind.into(), &id, &db_path).await?,
        Some(Commands::Context {
            file,
            min_score,
            limit,
            json,
        }) => run_context(file.as_deref(), min_score, limit, json, &db_path).await?,
        Some(Commands::Sync {
            command,
            watch,
            interval,
            json,
        }) => match command {
            Some(SyncCommands::Status { json }) => run_sync_status(json, &db_path).await?,
            None if watch => run_sync_watch(interval, &db_path).await?,
            None => run_sync(json, &db_path).await?,
        },
        Some(Commands::Queue { json }) => run_queue(json, &db_path).await?,
        Some(Commands::Activity { limit, json }) => run_activity(limit, json, &db_path).await?,
        Some(Commands::Export { format, output }) => {
            run_export(format, output.as_deref(), &db_path).await?;
        }
        Some(Commands::Config { command }) => run_config(command, &db_path).await?,
        None => {
            Cli::command().print_help().map_err(CliError::Io)?;
            println!();
        }
    }

    Ok(())
}
