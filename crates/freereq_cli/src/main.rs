//! Command-line front end for requirement depots.
//!
//! # Responsibility
//! - Expose list/new/show/search/resource-audit over `freereq_core`.
//! - Keep a `ping` probe to validate core crate wiring.

use clap::{Parser, Subcommand};
use freereq_core::plugin::keyword_index::KeywordIndex;
use freereq_core::plugin::resource_manager::{ResourceManager, ResourceStatus};
use freereq_core::{CoreConfig, JsonFileAgent, NodeId, ReqAgent, ReqTree};
use log::info;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "freereq")]
#[command(about = "Tree-structured requirement documents stored as JSON")]
#[command(version)]
struct Args {
    /// Configuration file; defaults apply when it does not exist
    #[arg(short, long, default_value = "freereq.json")]
    config: PathBuf,

    /// Depot directory, overriding the configuration
    #[arg(short, long)]
    depot: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print core linkage and version
    Ping,
    /// List documents in the depot
    List,
    /// Create a document whose root is titled with its name
    New {
        name: String,
        /// Replace an existing document
        #[arg(long)]
        overwrite: bool,
    },
    /// Print a document outline
    Show {
        name: String,
        /// Also print node uuids
        #[arg(long)]
        uuids: bool,
    },
    /// Find nodes containing every term
    Search {
        name: String,
        #[arg(required = true)]
        terms: Vec<String>,
    },
    /// Audit attachment links of a document
    Resources {
        name: String,
        /// Delete attachments no node references
        #[arg(long)]
        clear: bool,
    },
}

fn main() -> ExitCode {
    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("error: {message}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<(), String> {
    let mut config = CoreConfig::load(&args.config).map_err(|err| err.to_string())?;
    if let Some(depot) = args.depot {
        config.depot_dir = depot;
    }
    if let Some(log_dir) = config.log_dir.take() {
        config.log_dir = Some(absolute(log_dir)?);
    }
    freereq_core::init_from_config(&config).map_err(|err| err.to_string())?;
    info!(
        "event=cli_start module=cli status=ok depot={}",
        config.depot_dir.display()
    );

    let mut agent = JsonFileAgent::from_config(&config);
    match args.command {
        Command::Ping => {
            println!("freereq_core ping={}", freereq_core::ping());
            println!("freereq_core version={}", freereq_core::core_version());
        }
        Command::List => {
            for name in agent.list_documents() {
                println!("{name}");
            }
        }
        Command::New { name, overwrite } => {
            agent
                .try_new_document(&name, overwrite)
                .map_err(|err| err.to_string())?;
            println!("created {}", agent.document_path(&name).display());
        }
        Command::Show { name, uuids } => {
            agent.try_open_document(&name).map_err(|err| err.to_string())?;
            let document = agent.document().ok_or("no active document")?;
            let tree = document.tree();
            print_outline(tree, tree.root(), 0, uuids);
        }
        Command::Search { name, terms } => {
            agent.try_open_document(&name).map_err(|err| err.to_string())?;
            let document = agent.document().ok_or("no active document")?;
            let mut index = KeywordIndex::new();
            for uuid in index.search_in(document, &terms.join(" ")) {
                let title = document
                    .get_node(&uuid)
                    .and_then(|id| document.tree().title(id))
                    .unwrap_or_default();
                println!("{uuid}  {title}");
            }
        }
        Command::Resources { name, clear } => {
            agent.try_open_document(&name).map_err(|err| err.to_string())?;
            let document = agent.document().ok_or("no active document")?;
            let manager = ResourceManager::from_config(&config);
            let audit = manager.audit(document).map_err(|err| err.to_string())?;
            for entry in &audit {
                let status = match entry.status {
                    ResourceStatus::Ok => "OK",
                    ResourceStatus::Invalid => "Invalid",
                    ResourceStatus::NoReference => "No Reference",
                };
                println!(
                    "{:<34} {:<14} {}",
                    entry.req_uuid.as_deref().unwrap_or("-"),
                    status,
                    entry.resource
                );
            }
            if clear {
                let removed = manager
                    .remove_unreferenced(document)
                    .map_err(|err| err.to_string())?;
                println!("removed {} unreferenced file(s)", removed.len());
            }
        }
    }
    Ok(())
}

fn absolute(path: PathBuf) -> Result<PathBuf, String> {
    if path.is_absolute() {
        return Ok(path);
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .map_err(|err| err.to_string())
}

fn print_outline(tree: &ReqTree, node: NodeId, depth: usize, uuids: bool) {
    let Some(data) = tree.node(node) else {
        return;
    };
    let id = if data.id().is_empty() {
        String::new()
    } else {
        format!("[{}] ", data.id())
    };
    if uuids {
        println!("{}{}{}  ({})", "  ".repeat(depth), id, data.title(), data.uuid());
    } else {
        println!("{}{}{}", "  ".repeat(depth), id, data.title());
    }
    for child in tree.children(node) {
        print_outline(tree, *child, depth + 1, uuids);
    }
}
