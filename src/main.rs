//! provstore - command-line entry point
//!
//! `merge` is meant to be registered as a Git merge driver for the metadata
//! directory:
//!
//! ```text
//! git config merge.provstore.driver "provstore merge %O %A %B"
//! echo ".renku/metadata/** merge=provstore" >> .gitattributes
//! ```

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use serde::Serialize;

use provstore::codec::ObjectWriter;
use provstore::db::{Database, DatabaseConfig, DatabaseError, ObjectHandle, DEFAULT_METADATA_PATH};
use provstore::git::{GitRepository, RefManager};
use provstore::merge::{GitMerger, MergeRequest, StdioPrompter};
use provstore::model::{initialize_database, Project, PROJECT_ENTRY};
use provstore::storage::Oid;

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

enum Command {
    Init { namespace: String, name: Option<String> },
    Show { target: String },
    Merge { base: PathBuf, local: PathBuf, remote: PathBuf },
}

struct Options {
    repository: PathBuf,
    verbose: bool,
    command: Command,
}

/// what `show` prints
#[derive(Serialize)]
struct ObjectSummary {
    oid: Option<String>,
    #[serde(rename = "type")]
    type_tag: Option<String>,
    frozen: bool,
    fields: serde_json::Value,
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let options = match parse_args(&args) {
        Ok(Some(options)) => options,
        Ok(None) => return ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("{}", message);
            eprintln!("Try 'provstore --help'.");
            return ExitCode::FAILURE;
        }
    };

    init_tracing(options.verbose);

    let result = match options.command {
        Command::Init { namespace, name } => init(&options.repository, &namespace, name),
        Command::Show { target } => show(&options.repository, &target),
        Command::Merge { base, local, remote } => merge(&options.repository, base, local, remote),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    // RUST_LOG wins; -v raises the fallback level
    let fallback = if verbose { "debug" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| fallback.into());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn parse_args(args: &[String]) -> Result<Option<Options>, String> {
    let mut repository = PathBuf::from(".");
    let mut verbose = false;
    let mut positional = Vec::new();

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "-C" => {
                i += 1;
                let path = args.get(i).ok_or("-C needs a path")?;
                repository = PathBuf::from(path);
            }
            "-v" | "--verbose" => verbose = true,
            "-h" | "--help" => {
                print_help();
                return Ok(None);
            }
            "--version" => {
                println!("provstore {}", env!("CARGO_PKG_VERSION"));
                return Ok(None);
            }
            arg if arg.starts_with('-') && !matches!(positional.first().map(String::as_str), Some("init")) => {
                return Err(format!("Unknown option: {}", arg));
            }
            arg => positional.push(arg.to_string()),
        }
        i += 1;
    }

    let command = match positional.split_first() {
        Some((cmd, rest)) if cmd == "init" => parse_init(rest)?,
        Some((cmd, [target])) if cmd == "show" => Command::Show { target: target.clone() },
        Some((cmd, [base, local, remote])) if cmd == "merge" => Command::Merge {
            base: PathBuf::from(base),
            local: PathBuf::from(local),
            remote: PathBuf::from(remote),
        },
        Some((cmd, _)) if cmd == "show" || cmd == "merge" => {
            return Err(format!("Wrong number of arguments for '{}'", cmd));
        }
        Some((cmd, _)) => return Err(format!("Unknown command: {}", cmd)),
        None => return Err("No command given".to_string()),
    };

    Ok(Some(Options {
        repository,
        verbose,
        command,
    }))
}

fn parse_init(args: &[String]) -> Result<Command, String> {
    let mut namespace = "local".to_string();
    let mut name = None;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--namespace" => {
                i += 1;
                namespace = args.get(i).ok_or("--namespace needs a value")?.clone();
            }
            "--name" => {
                i += 1;
                name = Some(args.get(i).ok_or("--name needs a value")?.clone());
            }
            arg => return Err(format!("Unknown argument for 'init': {}", arg)),
        }
        i += 1;
    }
    Ok(Command::Init { namespace, name })
}

fn print_help() {
    println!("provstore - Git-aware object store for provenance metadata");
    println!();
    println!("Usage: provstore [OPTIONS] <COMMAND>");
    println!();
    println!("Commands:");
    println!("  init [--namespace NS] [--name NAME]   Create the metadata database and commit it");
    println!("  show <OID|PATH>                       Print an object as JSON");
    println!("  merge <BASE> <LOCAL> <REMOTE>         Git merge driver for metadata files");
    println!();
    println!("Options:");
    println!("  -C PATH          Repository directory (default: .)");
    println!("  -v, --verbose    Debug logging (RUST_LOG overrides)");
    println!("  -h, --help       Show this help message");
    println!("  --version        Show version");
}

fn open_database(repository: &GitRepository) -> CliResult<Database> {
    let path = repository.workdir()?.join(DEFAULT_METADATA_PATH);
    Ok(Database::open(DatabaseConfig::new(path))?)
}

fn init(path: &Path, namespace: &str, name: Option<String>) -> CliResult<()> {
    let repository = GitRepository::open_or_init(path)?;
    let database = open_database(&repository)?;

    match database.root_entry(PROJECT_ENTRY) {
        Ok(_) => return Err("metadata database is already initialized".into()),
        Err(DatabaseError::NoSuchRootEntry(_)) => {}
        Err(e) => return Err(e.into()),
    }

    let name = match name {
        Some(name) => name,
        None => repository
            .workdir()?
            .canonicalize()?
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "project".to_string()),
    };
    let project = Project::new(namespace, &name);
    initialize_database(&database, &project)?;
    let written = database.commit()?;
    let commit = repository.commit_all("Initialize metadata database")?;

    println!("Initialized {} ({} objects, commit {})", project.id, written, commit.short());
    Ok(())
}

fn show(path: &Path, target: &str) -> CliResult<()> {
    let repository = GitRepository::open(path)?;
    let database = open_database(&repository)?;

    let file = Path::new(target);
    let object: ObjectHandle = if file.is_file() {
        database.get_from_path(file)?
    } else {
        database.get(&Oid::new(target)?)?
    };

    let fields = database.fields(&object)?;
    let summary = ObjectSummary {
        oid: object.oid().map(|oid| oid.to_string()),
        type_tag: object.type_tag().map(|tag| tag.name().to_string()),
        frozen: object.is_frozen(),
        fields: ObjectWriter::detached(&database).serialize_fields(&fields)?,
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn merge(path: &Path, base: PathBuf, local: PathBuf, remote: PathBuf) -> CliResult<()> {
    let repository = GitRepository::open(path)?;
    let database = open_database(&repository)?;

    let head = repository.head()?;
    let remotes = RefManager::merge_participants(std::env::vars(), head);
    tracing::debug!(remotes = remotes.len(), "merge participants");

    let request = MergeRequest::new(base, local, remote).remotes(remotes);
    let mut prompter = StdioPrompter;
    GitMerger::new(&repository, &database, &mut prompter).merge(&request)?;
    Ok(())
}
