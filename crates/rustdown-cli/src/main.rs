#![forbid(unsafe_code)]

use std::{
    collections::BTreeMap,
    fmt::Write as _,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use rustdown_core::{
    disk_io::write_atomic,
    gateway::{FileGateway, LocalFiles},
    session::{KeyValueStore, SessionService, SessionSnapshot, TomlFileStore},
    settings::Preferences,
    variables,
};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "rustdown-cli",
    about = "Headless helpers for rustdown documents",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Expand template variables and print the result to stdout.
    Expand {
        /// Path to a markdown file. Use `-` to read from stdin.
        path: PathBuf,
        /// A global variable, `NAME=VALUE`. May be repeated; later wins.
        #[arg(long = "var", value_name = "NAME=VALUE", value_parser = parse_var)]
        vars: Vec<(String, String)>,
        /// TOML file of `[[variables]]` entries, applied before `--var`.
        #[arg(long = "vars", value_name = "FILE")]
        vars_file: Option<PathBuf>,
    },
    /// Print the fingerprint used to detect external changes.
    Fingerprint { path: PathBuf },
    /// Print the stored editor session.
    Session {
        /// State directory; defaults to the platform config dir.
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    /// Manage the global variables stored with the editor preferences.
    Vars {
        /// State directory; defaults to the platform config dir.
        #[arg(long)]
        dir: Option<PathBuf>,
        #[command(subcommand)]
        action: VarsAction,
    },
}

#[derive(Subcommand)]
enum VarsAction {
    /// Print every variable as `NAME=VALUE`.
    List,
    /// Add or replace a variable.
    Set {
        #[arg(value_name = "NAME=VALUE", value_parser = parse_var)]
        var: (String, String),
    },
    /// Remove a variable.
    Unset { name: String },
    /// Merge a TOML file of `[[variables]]` entries.
    Import { file: PathBuf },
    /// Write the variables as TOML, to stdout when no file is given.
    Export { file: Option<PathBuf> },
}

fn parse_var(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got `{raw}`"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err("variable name is empty".to_owned());
    }
    Ok((name.to_owned(), value.to_owned()))
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Expand {
            path,
            vars,
            vars_file,
        } => {
            let source = read_source(&path)?;
            let mut globals = BTreeMap::new();
            if let Some(file) = vars_file {
                let raw = fs::read_to_string(&file).with_context(|| {
                    format!("failed to read variables from {}", file.display())
                })?;
                let imported = variables::import_toml(&mut globals, &raw)
                    .with_context(|| format!("invalid variables file {}", file.display()))?;
                debug!(file = %file.display(), imported, "loaded variables file");
            }
            globals.extend(vars);
            debug!(variables = globals.len(), bytes = source.len(), "expanding");
            print!("{}", variables::expand(&source, &globals));
        }
        Command::Fingerprint { path } => {
            debug!(path = %path.display(), "fingerprinting");
            let fingerprint = LocalFiles
                .hash_file(&path)
                .with_context(|| format!("failed to fingerprint {}", path.display()))?;
            println!("hash = {}", fingerprint.hash);
            println!("size = {}", fingerprint.file_size);
            println!("modified = {}", fingerprint.modified_time);
        }
        Command::Session { dir } => {
            let store = dir.map_or_else(TomlFileStore::in_config_dir, TomlFileStore::new);
            let location = store.dir().to_path_buf();
            debug!(dir = %location.display(), "reading session");
            let session = SessionService::new(Box::new(store));
            let Some(snapshot) = session.load_snapshot() else {
                bail!("no usable session in {}", location.display());
            };
            info!(documents = snapshot.documents.len(), "session loaded");
            print!("{}", describe(&snapshot));
        }
        Command::Vars { dir, action } => {
            let store = dir.map_or_else(TomlFileStore::in_config_dir, TomlFileStore::new);
            print!("{}", run_vars(&store, action)?);
        }
    }

    Ok(())
}

fn read_source(path: &Path) -> anyhow::Result<String> {
    if path.as_os_str() == "-" {
        use std::io::Read as _;

        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read markdown from stdin")?;
        Ok(buf)
    } else {
        LocalFiles
            .read_file(path)
            .with_context(|| format!("failed to read markdown from {}", path.display()))
    }
}

/// Applies `action` to the stored preferences; returns text for stdout.
fn run_vars(store: &dyn KeyValueStore, action: VarsAction) -> anyhow::Result<String> {
    let mut prefs = Preferences::load(store);
    match action {
        VarsAction::List => {
            let mut out = String::new();
            for (name, value) in &prefs.global_variables {
                let _ = writeln!(out, "{name}={value}");
            }
            return Ok(out);
        }
        VarsAction::Export { file } => {
            let text = variables::export_toml(&prefs.global_variables)
                .context("failed to serialize variables")?;
            let Some(file) = file else {
                return Ok(text);
            };
            write_atomic(&file, &text)
                .with_context(|| format!("failed to write {}", file.display()))?;
            info!(
                file = %file.display(),
                count = prefs.global_variables.len(),
                "exported variables"
            );
            return Ok(String::new());
        }
        VarsAction::Set { var: (name, value) } => {
            if !prefs.set_variable(&name, &value) {
                bail!("variable name is empty");
            }
        }
        VarsAction::Unset { name } => {
            if prefs.remove_variable(&name).is_none() {
                bail!("no variable named `{name}`");
            }
        }
        VarsAction::Import { file } => {
            let raw = fs::read_to_string(&file)
                .with_context(|| format!("failed to read variables from {}", file.display()))?;
            let imported = variables::import_toml(&mut prefs.global_variables, &raw)
                .with_context(|| format!("invalid variables file {}", file.display()))?;
            info!(file = %file.display(), imported, "imported variables");
        }
    }
    prefs.save(store).context("failed to save preferences")?;
    debug!(count = prefs.global_variables.len(), "variables saved");
    Ok(String::new())
}

/// One line per document: active marker, title, then path or `(scratch)`.
fn describe(snapshot: &SessionSnapshot) -> String {
    let mut out = String::new();
    for doc in &snapshot.documents {
        let marker = if snapshot.active_id == Some(doc.id) {
            '>'
        } else {
            ' '
        };
        let location = match (&doc.file_path, doc.is_new) {
            (Some(path), false) => path.display().to_string(),
            _ => "(scratch)".to_owned(),
        };
        let modified = if doc.is_modified { " *" } else { "" };
        let _ = writeln!(out, "{marker} {}{modified}\t{location}", doc.title);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustdown_core::{
        Document, Fingerprint,
        session::{MemoryStore, SESSION_KEY, set_serialized},
        store::DocumentStore,
    };

    fn vars(store: &MemoryStore, args: &[&str]) -> anyhow::Result<String> {
        let argv = ["rustdown-cli", "vars"].iter().chain(args);
        let Ok(Cli {
            command: Command::Vars { action, .. },
        }) = Cli::try_parse_from(argv)
        else {
            unreachable!("vars {args:?} should parse");
        };
        run_vars(store, action)
    }

    #[test]
    fn parse_var_cases() {
        assert_eq!(
            parse_var("name=a=b").ok(),
            Some(("name".to_owned(), "a=b".to_owned()))
        );
        assert_eq!(
            parse_var(" who =").ok(),
            Some(("who".to_owned(), String::new()))
        );
        assert!(parse_var("novalue").is_err());
        assert!(parse_var("=x").is_err());
    }

    #[test]
    fn cli_parses_repeated_vars() {
        let cli = Cli::try_parse_from([
            "rustdown-cli",
            "expand",
            "-",
            "--var",
            "a=1",
            "--var",
            "b=2",
        ]);
        let Ok(Cli {
            command: Command::Expand { vars, path, .. },
        }) = cli
        else {
            unreachable!("expand should parse");
        };
        assert_eq!(path, PathBuf::from("-"));
        assert_eq!(vars.len(), 2);
    }

    #[test]
    fn describe_marks_active_and_scratch() {
        let scratch = Document::untitled();
        let linked = Document::from_disk(
            PathBuf::from("/docs/a.md"),
            String::new(),
            Fingerprint {
                hash: "h".to_owned(),
                modified_time: 1,
                file_size: 0,
            },
        );
        let active = linked.id;
        let store = DocumentStore::new(vec![scratch, linked], Some(active));
        let text = describe(&SessionSnapshot::capture(&store));
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines, ["  Untitled\t(scratch)", "> a.md\t/docs/a.md"]);
    }

    #[test]
    fn session_reads_from_directory() {
        let Ok(dir) = tempfile::tempdir() else {
            return;
        };
        let store = TomlFileStore::new(dir.path().to_path_buf());
        let doc = Document::untitled();
        let snapshot = SessionSnapshot::capture(&DocumentStore::new(vec![doc], None));
        assert!(set_serialized(&store, SESSION_KEY, &snapshot).is_ok());

        let session =
            SessionService::new(Box::new(TomlFileStore::new(dir.path().to_path_buf())));
        let loaded = session.load_snapshot().map(|s| describe(&s));
        assert_eq!(loaded.as_deref(), Some("> Untitled\t(scratch)\n"));
    }

    #[test]
    fn vars_set_list_unset() {
        let store = MemoryStore::default();
        assert!(vars(&store, &["set", "who=world"]).is_ok());
        assert!(vars(&store, &["set", "a=1=2"]).is_ok());
        assert_eq!(vars(&store, &["list"]).ok().as_deref(), Some("a=1=2\nwho=world\n"));

        assert!(vars(&store, &["unset", "a"]).is_ok());
        assert!(vars(&store, &["unset", "a"]).is_err(), "already removed");
        assert_eq!(vars(&store, &["list"]).ok().as_deref(), Some("who=world\n"));
        assert_eq!(
            Preferences::load(&store).global_variables.get("who").map(String::as_str),
            Some("world")
        );
    }

    #[test]
    fn vars_import_merges_and_export_writes_file() {
        let Ok(dir) = tempfile::tempdir() else {
            return;
        };
        let input = dir.path().join("in.toml");
        fs::write(
            &input,
            "[[variables]]\nname = \"who\"\nvalue = \"imported\"\n\n[[variables]]\nname = \"b\"\nvalue = \"2\"\n",
        )
        .ok();
        let store = MemoryStore::default();
        assert!(vars(&store, &["set", "who=local"]).is_ok());
        let Some(input) = input.to_str() else {
            return;
        };
        assert!(vars(&store, &["import", input]).is_ok());
        assert_eq!(
            vars(&store, &["list"]).ok().as_deref(),
            Some("b=2\nwho=imported\n")
        );

        let output = dir.path().join("out").join("vars.toml");
        let Some(out) = output.to_str() else {
            return;
        };
        assert_eq!(vars(&store, &["export", out]).ok().as_deref(), Some(""));
        let written = fs::read_to_string(&output).unwrap_or_default();
        let mut round = BTreeMap::new();
        assert_eq!(variables::import_toml(&mut round, &written).ok(), Some(2));
        assert_eq!(round, Preferences::load(&store).global_variables);
    }

    #[test]
    fn vars_import_rejects_bad_toml() {
        let Ok(dir) = tempfile::tempdir() else {
            return;
        };
        let input = dir.path().join("bad.toml");
        fs::write(&input, "variables = 3\n").ok();
        let store = MemoryStore::default();
        let Some(input) = input.to_str() else {
            return;
        };
        assert!(vars(&store, &["import", input]).is_err());
        assert!(Preferences::load(&store).global_variables.is_empty());
    }
}
