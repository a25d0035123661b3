//! Parse and validate CommsDSL schema files, report diagnostics.
//!
//! Usage:
//!   commsdsl_check [OPTIONS] [FILE.xml ...]
//!   commsdsl_check --input-files-list files.txt
//!
//! Files are processed in the given order; the last schema is the protocol
//! schema. Exit status is 1 when parsing, validation or preparation fails.
//!
//! Options:
//!   --warn-as-err            Treat warnings as errors
//!   --multiple-schemas       Allow documents declaring different schema names
//!   --min-remote-version N   Oldest protocol version to support
//!   --dump                   Print the prepared semantic tree
//!   --human, -H              Group diagnostics by severity
//!   -v                       Debug logging (also honours RUST_LOG)

use anyhow::Context;
use clap::Parser;
use commsdsl::diag::{Diagnostic, Logger, LoggerConfig, Severity};
use commsdsl::{dump, GenConfig, Generator, Protocol};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "commsdsl_check")]
#[command(about = "Parse and validate CommsDSL schema files")]
struct Cli {
    /// Schema files, processed in order
    files: Vec<PathBuf>,

    /// File listing schema files, one per line (`#` starts a comment)
    #[arg(long)]
    input_files_list: Option<PathBuf>,

    /// Treat warnings as errors
    #[arg(long)]
    warn_as_err: bool,

    /// Allow more than one schema
    #[arg(long)]
    multiple_schemas: bool,

    /// Oldest protocol version remote ends may use
    #[arg(long, default_value = "0")]
    min_remote_version: u32,

    /// Print the prepared semantic tree
    #[arg(long)]
    dump: bool,

    /// Human readable diagnostics
    #[arg(long, short = 'H')]
    human: bool,

    /// Debug logging
    #[arg(short = 'v', long)]
    verbose: bool,
}

#[derive(Clone, Copy)]
enum OutputStyle {
    Compact,
    Human,
}

fn read_files_list(path: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading files list {}", path.display()))?;
    let base = path.parent().unwrap_or_else(|| Path::new(""));
    Ok(text
        .lines()
        .map(|l| l.split('#').next().unwrap_or("").trim())
        .filter(|l| !l.is_empty())
        .map(|l| {
            let p = PathBuf::from(l);
            if p.is_absolute() {
                p
            } else {
                base.join(p)
            }
        })
        .collect())
}

/// Split a leading `file:line: ` off a diagnostic message.
fn split_location(msg: &str) -> (Option<&str>, &str) {
    for (idx, _) in msg.match_indices(": ") {
        let head = &msg[..idx];
        let Some((file, line)) = head.rsplit_once(':') else {
            continue;
        };
        if !file.is_empty() && !line.is_empty() && line.bytes().all(|b| b.is_ascii_digit()) {
            return (Some(head), &msg[idx + 2..]);
        }
    }
    (None, msg)
}

fn print_diagnostics(diags: &[Diagnostic], style: OutputStyle) {
    match style {
        OutputStyle::Compact => {
            for d in diags {
                match split_location(&d.message) {
                    (Some(loc), text) => eprintln!("{}: {}: {}", loc, d.severity, text),
                    (None, text) => eprintln!("{}: {}", d.severity, text),
                }
            }
        }
        OutputStyle::Human => {
            for severity in [Severity::Error, Severity::Warning, Severity::Info, Severity::Debug] {
                let group: Vec<&Diagnostic> = diags.iter().filter(|d| d.severity == severity).collect();
                if group.is_empty() {
                    continue;
                }
                eprintln!("{} ({}):", severity, group.len());
                for d in group {
                    eprintln!("  {}", d.message);
                }
            }
        }
    }
}

fn run(cli: &Cli, config: GenConfig, logger: Logger) -> anyhow::Result<Option<String>> {
    let mut files = cli.files.clone();
    if let Some(list) = &cli.input_files_list {
        files.extend(read_files_list(list)?);
    }
    anyhow::ensure!(!files.is_empty(), "no schema files given");

    let mut protocol = Protocol::with_logger(config.protocol_config(), logger);
    for f in &files {
        tracing::info!("parsing {}", f.display());
        protocol.parse(f)?;
    }
    protocol.validate()?;
    let gen = Generator::prepare(&protocol, config)?;
    if cli.dump {
        return Ok(Some(dump::dump(&gen)?));
    }
    Ok(None)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let default_filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = GenConfig {
        min_remote_version: cli.min_remote_version,
        multiple_schemas_enabled: cli.multiple_schemas,
        warn_as_err: cli.warn_as_err,
        min_level: if cli.verbose { Severity::Debug } else { Severity::Info },
        ..GenConfig::default()
    };
    let (logger, diags) = Logger::capturing(LoggerConfig {
        min_level: config.min_level,
        warn_as_err: config.warn_as_err,
    });
    let style = if cli.human {
        OutputStyle::Human
    } else {
        OutputStyle::Compact
    };

    let result = run(&cli, config, logger);
    print_diagnostics(&diags.borrow(), style);
    match result {
        Ok(Some(text)) => {
            print!("{}", text);
            Ok(())
        }
        Ok(None) => Ok(()),
        Err(e) => {
            eprintln!("error: {:#}", e);
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_prefix() {
        assert_eq!(
            split_location("dir/a.xml:12: Unknown field."),
            (Some("dir/a.xml:12"), "Unknown field.")
        );
        assert_eq!(split_location("No schemas: none given"), (None, "No schemas: none given"));
    }

    #[test]
    fn files_list_relative_to_list() {
        let dir = tempfile::tempdir().unwrap();
        let list = dir.path().join("files.txt");
        std::fs::write(&list, "# schemas\na.xml\n\n/abs/b.xml # trailing\n").unwrap();
        let files = read_files_list(&list).unwrap();
        assert_eq!(files, [dir.path().join("a.xml"), PathBuf::from("/abs/b.xml")]);
    }
}
