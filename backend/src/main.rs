//! DataFlex CLI - clean and convert CSV / Excel files
//!
//! # Commands
//!
//! ```bash
//! dataflex serve                                  # Start HTTP server (port 3000)
//! dataflex convert a.csv b.xlsx --to xlsx         # Convert files side by side
//! dataflex convert a.csv --to csv --dedupe --fill-missing --columns name,age
//! dataflex inspect a.csv --rows 10                # Columns, preview and chart series
//! dataflex inspect b.csv -d ";"                   # Semicolon separated input
//! ```

use clap::{Args, Parser, Subcommand};
use dataflex::api::logs::LOG_BROADCASTER;
use dataflex::api::server::{DEFAULT_MAX_UPLOAD_MB, DEFAULT_PORT};
use dataflex::session::{DEFAULT_MAX_SESSIONS, DEFAULT_SESSION_TTL_MINUTES};
use dataflex::transform::MAX_SERIES;
use dataflex::{
    run_batch, start_server, summarize, CleaningOptions, OutputFormat, ParseOptions,
    PipelineOptions, ServerConfig, SessionLimits, UploadedFile,
};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "dataflex")]
#[command(about = "Upload, clean, chart and convert CSV / Excel files", long_about = None)]
struct Cli {
    /// Do not echo pipeline logs to the console
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start HTTP server
    Serve {
        /// Port to listen on
        #[arg(short, long, env = "DATAFLEX_PORT", default_value_t = DEFAULT_PORT)]
        port: u16,

        /// Largest accepted upload, in megabytes
        #[arg(long, env = "DATAFLEX_MAX_UPLOAD_MB", default_value_t = DEFAULT_MAX_UPLOAD_MB)]
        max_upload_mb: usize,

        /// Rows shown in previews
        #[arg(long, default_value = "5")]
        preview_rows: usize,

        /// Sessions held at once; the least recently used is closed first
        #[arg(long, env = "DATAFLEX_MAX_SESSIONS", default_value_t = DEFAULT_MAX_SESSIONS)]
        max_sessions: usize,

        /// Minutes an unused session is kept
        #[arg(long, env = "DATAFLEX_SESSION_TTL_MINUTES", default_value_t = DEFAULT_SESSION_TTL_MINUTES)]
        session_ttl_minutes: i64,
    },

    /// Convert files to CSV or Excel, optionally cleaning them first
    Convert {
        /// Input .csv / .xlsx files
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Output format: csv or xlsx
        #[arg(short, long)]
        to: OutputFormat,

        /// Remove duplicate rows
        #[arg(long)]
        dedupe: bool,

        /// Fill missing numeric cells with the column mean
        #[arg(long)]
        fill_missing: bool,

        /// Columns to keep, in order (comma separated)
        #[arg(short, long, value_delimiter = ',')]
        columns: Option<Vec<String>>,

        #[command(flatten)]
        csv: DelimiterArgs,

        /// Directory for converted files
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,
    },

    /// Show columns, a preview and the chart series of a file
    Inspect {
        /// Input .csv / .xlsx file
        input: PathBuf,

        /// Number of preview rows
        #[arg(short, long, default_value = "5")]
        rows: usize,

        /// Print the preview as JSON
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        csv: DelimiterArgs,
    },
}

/// How CSV inputs are split into fields
#[derive(Args, Debug, Default)]
struct DelimiterArgs {
    /// CSV delimiter, a single ASCII character or "tab" (default ',')
    #[arg(short, long, value_parser = parse_delimiter, conflicts_with = "detect_delimiter")]
    delimiter: Option<u8>,

    /// Detect the CSV delimiter from the header line
    #[arg(long)]
    detect_delimiter: bool,
}

impl DelimiterArgs {
    fn parse_options(&self) -> ParseOptions {
        if self.detect_delimiter {
            return ParseOptions { delimiter: None };
        }
        match self.delimiter {
            Some(d) => ParseOptions { delimiter: Some(d) },
            None => ParseOptions::default(),
        }
    }
}

/// CSV fields are split on a single byte, so only ASCII delimiters are usable.
fn parse_delimiter(value: &str) -> Result<u8, String> {
    if value.eq_ignore_ascii_case("tab") || value == "\\t" {
        return Ok(b'\t');
    }
    let mut chars = value.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii() && !matches!(c, '"' | '\n' | '\r') => Ok(c as u8),
        (Some(c), None) if !c.is_ascii() => {
            Err(format!("delimiter '{}' is not an ASCII character", c))
        }
        _ => Err(format!(
            "invalid delimiter '{}': expected one ASCII character or \"tab\"",
            value
        )),
    }
}

#[tokio::main]
async fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    if cli.quiet {
        LOG_BROADCASTER.set_echo(false);
    }

    let result = match cli.command {
        Commands::Serve {
            port,
            max_upload_mb,
            preview_rows,
            max_sessions,
            session_ttl_minutes,
        } => {
            let config = ServerConfig {
                port,
                max_upload_bytes: max_upload_mb * 1024 * 1024,
                preview_rows,
                sessions: SessionLimits {
                    max_sessions,
                    idle_ttl: chrono::Duration::minutes(session_ttl_minutes),
                },
                ..Default::default()
            };
            start_server(config).await
        }

        Commands::Convert {
            inputs,
            to,
            dedupe,
            fill_missing,
            columns,
            csv,
            output_dir,
        } => {
            let options = PipelineOptions {
                parse: csv.parse_options(),
                cleaning: CleaningOptions {
                    remove_duplicates: dedupe,
                    fill_missing,
                },
                columns,
                summarize: false,
                convert: Some(to),
            };
            cmd_convert(&inputs, &options, &output_dir)
        }

        Commands::Inspect {
            input,
            rows,
            json,
            csv,
        } => cmd_inspect(&input, rows, json, &csv.parse_options()),
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

fn read_input(path: &Path) -> Result<UploadedFile, Box<dyn std::error::Error>> {
    let bytes = fs::read(path)?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());
    Ok(UploadedFile::new(name, bytes))
}

fn cmd_convert(
    inputs: &[PathBuf],
    options: &PipelineOptions,
    output_dir: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(format) = options.convert {
        output_paths(inputs, format, output_dir)?;
    }

    let files = inputs
        .iter()
        .map(|p| read_input(p))
        .collect::<Result<Vec<_>, _>>()?;

    let report = run_batch(&files, options);

    for file in report.reports() {
        if let Some(ref conversion) = file.conversion {
            let path = conversion.save_to(output_dir)?;
            eprintln!("   💾 Saved to: {}", path.display());
        }
    }

    if report.succeeded() == 0 {
        return Err(format!("no file converted ({} failed)", report.failed()).into());
    }

    eprintln!("\n✨ Done!");
    Ok(())
}

/// Where each input's conversion will be written. Refuses to overwrite an
/// input or to write two outputs to the same path.
fn output_paths(
    inputs: &[PathBuf],
    format: OutputFormat,
    output_dir: &Path,
) -> Result<Vec<PathBuf>, String> {
    // A directory that does not exist yet holds no inputs.
    let resolved_dir = fs::canonicalize(output_dir).ok();
    let mut seen = HashSet::new();
    let mut paths = Vec::with_capacity(inputs.len());

    for input in inputs {
        let name = input
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| input.display().to_string());
        let output_name = format.file_name_for(&name);

        if !seen.insert(output_name.clone()) {
            return Err(format!(
                "several inputs would be written to {}; convert them separately or to another format",
                output_dir.join(&output_name).display()
            ));
        }

        if let Some(ref dir) = resolved_dir {
            let target = dir.join(&output_name);
            let source = fs::canonicalize(input).unwrap_or_else(|_| input.clone());
            if target == source {
                return Err(format!(
                    "converting {} would overwrite it; choose another --output-dir",
                    input.display()
                ));
            }
        }

        paths.push(output_dir.join(output_name));
    }

    Ok(paths)
}

fn cmd_inspect(
    input: &Path,
    rows: usize,
    json: bool,
    options: &ParseOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let file = read_input(input)?;
    let parsed = dataflex::transform::load(&file, options)?;
    let table = parsed.table;

    eprintln!("\n📋 Columns ({}):", table.column_count());
    for column in table.columns() {
        eprintln!(
            "   {:<24} {:?}, {} missing",
            column.name,
            column.kind,
            column.missing_count()
        );
    }

    let preview = table.head(rows);
    if json {
        println!("{}", serde_json::to_string_pretty(&preview)?);
    } else {
        println!("{}", preview.column_names().join("\t"));
        for row in preview.rows() {
            let cells: Vec<String> = row.iter().map(|c| c.to_string()).collect();
            println!("{}", cells.join("\t"));
        }
    }

    match summarize(&table) {
        Some(chart) => {
            let names: Vec<&str> = chart.series.iter().map(|s| s.name.as_str()).collect();
            eprintln!(
                "\n📊 Chart series (first {} numeric columns): {}",
                MAX_SERIES,
                names.join(", ")
            );
        }
        None => eprintln!("\n📊 No numeric data available for visualization"),
    }

    Ok(())
}
