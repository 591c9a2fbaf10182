use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use codec::{read_table, ReadOptions, WriteOptions};
use glob::Pattern;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;
use wdc_tools::{format_inspect_pretty, inspect, roundtrip, rows_json};

#[derive(Parser)]
#[command(
    name = "wdc-tools",
    version,
    about = "WDC table inspection and decoding tools"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Inspect table headers and sections.
    Inspect {
        /// Path to a table file or a directory of tables.
        table_path: PathBuf,
        /// Optional glob filter when inspecting a directory.
        #[arg(long)]
        glob: Option<String>,
        /// Sort inspected tables.
        #[arg(long, value_enum)]
        sort: Option<InspectSort>,
        /// Limit the number of inspected tables (after sorting).
        #[arg(long)]
        limit: Option<usize>,
        /// Output format.
        #[arg(long, value_enum, default_value_t = OutputFormat::Pretty)]
        format: OutputFormat,
    },
    /// Decode table rows into JSON.
    Decode {
        /// Path to the table file.
        table_file: PathBuf,
        /// Schema JSON describing the table's columns.
        #[arg(long)]
        schema: PathBuf,
    },
    /// Decode a table, encode it again and compare the bytes.
    Roundtrip {
        /// Path to the table file.
        table_file: PathBuf,
        /// Schema JSON describing the table's columns.
        #[arg(long)]
        schema: PathBuf,
        /// Write every row as a record instead of collapsing copies.
        #[arg(long)]
        no_copies: bool,
        /// Where to write the re-encoded table.
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum InspectSort {
    Size,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Json,
    Pretty,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let options = ReadOptions::default();
    match cli.command {
        Command::Inspect {
            table_path,
            glob,
            sort,
            limit,
            format,
        } => {
            if table_path.is_dir() {
                let entries = collect_table_entries(&table_path, glob.as_deref())?;
                let mut entries = maybe_sort_entries(entries, sort);
                let limit = limit.or(sort.map(|InspectSort::Size| 10));
                if let Some(limit) = limit {
                    entries.truncate(limit);
                }
                for entry in entries {
                    println!("== {} ({} bytes) ==", entry.path.display(), entry.size);
                    if let Err(err) = inspect_file(&entry.path, &options, format) {
                        warn!(path = %entry.path.display(), "{err:#}");
                    }
                }
            } else {
                inspect_file(&table_path, &options, format)?;
            }
        }
        Command::Decode { table_file, schema } => {
            let schema = load_schema(&schema).context("load schema")?;
            let bytes = read_file(&table_file)?;
            let set = read_table(bytes, &options).context("read table")?;
            let json = rows_json(&set, &schema).context("decode rows")?;
            let json = serde_json::to_string_pretty(&json).context("serialize json")?;
            println!("{json}");
        }
        Command::Roundtrip {
            table_file,
            schema,
            no_copies,
            output,
        } => {
            let schema = load_schema(&schema).context("load schema")?;
            let bytes = read_file(&table_file)?;
            let write = if no_copies {
                WriteOptions::without_copies()
            } else {
                WriteOptions::default()
            };
            let report = roundtrip(&bytes, &schema, &options, &write).context("round trip")?;
            if let Some(output) = output {
                fs::write(&output, &report.written)
                    .with_context(|| format!("write table {}", output.display()))?;
            }
            println!(
                "{} rows, {} -> {} bytes",
                report.rows, report.original_len, report.written_len
            );
            match report.first_difference {
                None => println!("identical"),
                Some(offset) => {
                    println!("differs at byte {offset}");
                    std::process::exit(1);
                }
            }
        }
    }
    Ok(())
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("read table {}", path.display()))
}

fn inspect_file(path: &Path, options: &ReadOptions, format: OutputFormat) -> Result<()> {
    let bytes = read_file(path)?;
    let set = read_table(bytes, options).context("read table")?;
    let report = inspect(&set);
    for section in set.encrypted_sections() {
        debug!(
            section = section.index,
            records = section.record_count,
            "encrypted section"
        );
    }
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&report).context("serialize json")?;
            println!("{json}");
        }
        OutputFormat::Pretty => print!("{}", format_inspect_pretty(&report)),
    }
    Ok(())
}

fn load_schema(path: &Path) -> Result<schema::TableSchema> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read schema {}", path.display()))?;
    let schema: schema::TableSchema =
        serde_json::from_str(&contents).context("parse schema json")?;
    schema
        .validate()
        .map_err(|err| anyhow::anyhow!("schema validation failed: {err}"))?;
    Ok(schema)
}

struct TableEntry {
    path: PathBuf,
    size: u64,
}

fn collect_table_entries(dir: &Path, glob: Option<&str>) -> Result<Vec<TableEntry>> {
    let mut entries = Vec::new();
    let pattern = match glob {
        Some(value) => Some(Pattern::new(value).context("invalid glob pattern")?),
        None => None,
    };

    for entry in fs::read_dir(dir).with_context(|| format!("read dir {}", dir.display()))? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if let Some(pattern) = &pattern {
            let matches_path = pattern.matches_path(&path);
            let matches_name = path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| pattern.matches(name));
            if !matches_path && !matches_name {
                continue;
            }
        }
        let size = entry.metadata()?.len();
        entries.push(TableEntry { path, size });
    }
    Ok(entries)
}

fn maybe_sort_entries(mut entries: Vec<TableEntry>, sort: Option<InspectSort>) -> Vec<TableEntry> {
    match sort {
        Some(InspectSort::Size) => {
            entries.sort_by(|a, b| b.size.cmp(&a.size).then_with(|| a.path.cmp(&b.path)));
        }
        None => entries.sort_by(|a, b| a.path.cmp(&b.path)),
    }
    entries
}
