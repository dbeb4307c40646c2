use chrono::{Duration, Utc};
use clap::{Args, Parser, Subcommand};
use docvfs_core::prelude::*;
use docvfs_core::range::STATUS_RANGE_NOT_SATISFIABLE;
use serde_json::json;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "docvfs", version, about = "Inspect and manage docvfs storage roots")]
struct Cli {
    /// Storage configuration file (TOML); otherwise DOCVFS_ROOTS is used
    #[arg(long, env = "DOCVFS_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List a directory, or every root for "/"
    Ls {
        #[arg(default_value = "/")]
        cpath: String,
    },

    /// Show one entry's stat
    Stat { cpath: String },

    /// Copy entries between directories
    Copy(TransferArgs),

    /// Move entries between directories
    Move(TransferArgs),

    /// Rename one entry in place
    Rename {
        cpath: String,
        new_name: String,
        #[arg(long)]
        dry_run: bool,
    },

    /// Delete entries of a directory (the directory itself when no names given)
    Delete {
        dir: String,
        names: Vec<String>,
        #[arg(short, long)]
        recursive: bool,
        #[arg(long)]
        dry_run: bool,
    },

    /// Trash inspection, recovery and pruning
    #[command(subcommand)]
    Trash(TrashCommand),

    /// Write file content to stdout
    Cat {
        cpath: String,
        /// HTTP Range header value, e.g. "bytes=0-99"
        #[arg(long)]
        range: Option<String>,
        /// Frame the body with chunked transfer encoding
        #[arg(long)]
        chunked: bool,
    },
}

#[derive(Args, Debug)]
struct TransferArgs {
    source_dir: String,
    target_dir: String,
    /// Entries to transfer; all children of SOURCE_DIR when omitted
    names: Vec<String>,
    #[arg(long)]
    dry_run: bool,
}

#[derive(Subcommand, Debug)]
enum TrashCommand {
    /// List trash entries deleted under a directory
    List {
        cpath: String,
        /// Only entries last seen with exactly this name in CPATH
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        dirs_only: bool,
    },

    /// Recover entries by id to their original location
    Restore {
        cpath: String,
        #[arg(required = true)]
        ids: Vec<u64>,
        /// Recover into another root instead
        #[arg(long)]
        dest: Option<String>,
    },

    /// Permanently remove trash entries
    Empty {
        cpath: String,
        #[arg(long, conflicts_with_all = ["under", "older_than_days"])]
        id: Option<u64>,
        /// Root-relative directory prefix
        #[arg(long, conflicts_with = "older_than_days")]
        under: Option<String>,
        #[arg(long)]
        older_than_days: Option<i64>,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("DOCVFS_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn open_storage(config: Option<&Path>) -> Result<Storage> {
    let config = match config {
        Some(path) => StorageConfig::load(path)?,
        None => StorageConfig::from_env()?,
    };
    Storage::from_config(&config, Arc::new(RealFileSystem))
}

fn transfer(storage: &Storage, mode: TransferMode, args: TransferArgs) -> CommandResponse {
    let operation = match mode {
        TransferMode::Copy => OperationKind::Copy,
        TransferMode::Move => OperationKind::Move,
    };
    let entries: Vec<EntryMapping> = args.names.iter().map(EntryMapping::same).collect();
    if args.dry_run {
        guarded(operation, || {
            storage.dry_run_transfer(mode, &args.source_dir, &args.target_dir, entries)
        })
    } else {
        guarded(operation, || {
            storage.transfer(mode, &args.source_dir, &args.target_dir, entries)
        })
    }
}

fn trash(storage: &Storage, command: TrashCommand) -> CommandResponse {
    match command {
        TrashCommand::List {
            cpath,
            name,
            dirs_only,
        } => guarded(OperationKind::History, || {
            let mut entries = Vec::new();
            storage.history(&cpath, name.as_deref().unwrap_or(""), dirs_only, |entry| {
                entries.push(entry.clone());
                Visit::Recurse
            })?;
            Ok(entries)
        }),
        TrashCommand::Restore { cpath, ids, dest } => guarded(OperationKind::Recover, || {
            storage.recover(&cpath, &ids, dest.as_deref())
        }),
        TrashCommand::Empty {
            cpath,
            id,
            under,
            older_than_days,
        } => guarded(OperationKind::Cleanup, || {
            let predicate: Box<dyn FnMut(&DeletedFileStat) -> bool> =
                match (id, under, older_than_days) {
                    (Some(id), _, _) => Box::new(purge::by_id(id)),
                    (_, Some(prefix), _) => Box::new(purge::under(&prefix)),
                    (_, _, Some(days)) => {
                        Box::new(purge::older_than(Utc::now() - Duration::days(days)))
                    }
                    _ => Box::new(purge::all()),
                };
            storage.cleanup_trash(&cpath, predicate)
        }),
    }
}

fn cat(
    storage: &Storage,
    cpath: &str,
    range: Option<&str>,
    chunked: bool,
    out: &mut dyn Write,
) -> CommandResponse {
    guarded(OperationKind::Read, || {
        let content = storage.content(cpath)?;
        let total = content.len();
        let response = content.respond(range);
        if response.status == STATUS_RANGE_NOT_SATISFIABLE {
            return Err(CoreError::RangeNotSatisfiable { total });
        }
        if let Some(window) = response.window {
            let copied = if chunked {
                io::copy(&mut content.chunked(window), &mut *out)
            } else {
                io::copy(&mut content.bounded(window), &mut *out)
            };
            copied.map_err(|err| CoreError::io(cpath, err))?;
        }
        out.flush().map_err(|err| CoreError::io(cpath, err))?;
        let headers: serde_json::Map<String, serde_json::Value> = response
            .headers
            .iter()
            .map(|(name, value)| (name.to_string(), json!(value)))
            .collect();
        Ok(json!({ "status": response.status, "headers": headers }))
    })
}

fn run(storage: &Storage, command: Commands, out: &mut dyn Write) -> CommandResponse {
    match command {
        Commands::Ls { cpath } => guarded(OperationKind::List, || storage.list(&cpath)),
        Commands::Stat { cpath } => guarded(OperationKind::Stat, || storage.stat(&cpath)),
        Commands::Copy(args) => transfer(storage, TransferMode::Copy, args),
        Commands::Move(args) => transfer(storage, TransferMode::Move, args),
        Commands::Rename {
            cpath,
            new_name,
            dry_run: true,
        } => guarded(OperationKind::Rename, || storage.dry_run_rename(&cpath, &new_name)),
        Commands::Rename {
            cpath, new_name, ..
        } => guarded(OperationKind::Rename, || storage.rename(&cpath, &new_name)),
        Commands::Delete {
            dir,
            names,
            recursive,
            dry_run,
        } => {
            let names: Vec<&str> = names.iter().map(String::as_str).collect();
            if dry_run {
                guarded(OperationKind::Delete, || {
                    storage.dry_run_delete(&dir, &names, recursive)
                })
            } else {
                guarded(OperationKind::Delete, || storage.delete(&dir, &names, recursive))
            }
        }
        Commands::Trash(command) => trash(storage, command),
        Commands::Cat {
            cpath,
            range,
            chunked,
        } => cat(storage, &cpath, range.as_deref(), chunked, out),
    }
}

fn print_response(response: &CommandResponse, to: &mut dyn Write) {
    match serde_json::to_string_pretty(response) {
        Ok(text) => {
            let _ = writeln!(to, "{text}");
        }
        Err(err) => tracing::error!(error = %err, "could not render response"),
    }
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let storage = match open_storage(cli.config.as_deref()) {
        Ok(storage) => storage,
        Err(err) => {
            eprintln!("docvfs: {err}");
            return ExitCode::from(ExitStatusLike::Error.as_code());
        }
    };

    let is_cat = matches!(cli.command, Commands::Cat { .. });
    let mut stdout = io::stdout().lock();
    let response = run(&storage, cli.command, &mut stdout);
    if is_cat {
        print_response(&response, &mut io::stderr());
    } else {
        print_response(&response, &mut stdout);
    }
    ExitCode::from(response.exit_status().as_code())
}
