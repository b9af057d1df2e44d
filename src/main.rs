// Only compile UI module when TUI feature is enabled
#[cfg(feature = "tui")]
mod ui;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use ledger_pivot::{
    load_dataset, render_text, sample_dataset, write_csv, write_json, DecodeOptions,
    FieldBinding, FieldKind, Session,
};
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "ledger-pivot", version, about = "Pivot a general ledger export into account × month totals")]
struct Cli {
    /// Debug logging (overrides RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the account × month summary of a ledger file.
    Summary {
        #[command(flatten)]
        source: SourceArgs,

        #[command(flatten)]
        output: OutputArgs,
    },
    /// List the columns of a ledger file and the detected fields.
    Fields {
        /// CSV, XLSX or XLS file
        file: PathBuf,

        /// Zero-based header row (default: 4 for spreadsheets, 0 for CSV)
        #[arg(long)]
        header_row: Option<usize>,
    },
    /// Summarize the built-in sample ledger.
    Demo {
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Browse the summary interactively.
    Tui {
        #[command(flatten)]
        source: SourceArgs,
    },
}

#[derive(Args, Debug)]
struct SourceArgs {
    /// CSV, XLSX or XLS file
    file: PathBuf,

    /// Zero-based header row (default: 4 for spreadsheets, 0 for CSV)
    #[arg(long)]
    header_row: Option<usize>,

    /// Column holding the transaction date
    #[arg(long)]
    date_field: Option<String>,

    /// Column holding the amount
    #[arg(long)]
    amount_field: Option<String>,

    /// Column holding the account
    #[arg(long)]
    account_field: Option<String>,

    /// Account to leave out of the table (repeatable)
    #[arg(long = "exclude", value_name = "ACCOUNT")]
    exclude: Vec<String>,
}

#[derive(Args, Debug)]
struct OutputArgs {
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Csv,
    Json,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let interactive = matches!(cli.command, Commands::Tui { .. });
    init_tracing(cli.verbose, interactive);

    match cli.command {
        Commands::Summary { source, output } => run_summary(&source, &output),
        Commands::Fields { file, header_row } => run_fields(&file, header_row),
        Commands::Demo { output } => run_demo(&output),
        Commands::Tui { source } => run_ui_mode(&source),
    }
}

/// Logs go to stderr; stdout carries the report. The TUI owns the
/// terminal, so it only logs when asked to.
fn init_tracing(verbose: bool, interactive: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else if interactive {
        EnvFilter::new("off")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

// ============================================================================
// COMMANDS
// ============================================================================

fn open_session(source: &SourceArgs) -> Result<Session> {
    let options = DecodeOptions {
        header_row: source.header_row,
    };

    eprintln!("📂 Loading {}...", source.file.display());
    let dataset = load_dataset(&source.file, &options)
        .with_context(|| format!("Failed to load {}", source.file.display()))?;
    eprintln!("✓ Loaded {} rows", dataset.len());

    let mut session = Session::with_dataset(dataset)
        .with_context(|| format!("No data rows in {}", source.file.display()))?;

    session.apply_overrides(&FieldBinding {
        date: source.date_field.clone(),
        amount: source.amount_field.clone(),
        account: source.account_field.clone(),
    });

    for account in &source.exclude {
        session
            .exclude(account)
            .with_context(|| format!("Cannot exclude {:?}", account))?;
        eprintln!("✓ Excluded {}", account);
    }

    Ok(session)
}

fn run_summary(source: &SourceArgs, output: &OutputArgs) -> Result<()> {
    let mut session = open_session(source)?;
    write_report(&mut session, output)
}

fn run_demo(output: &OutputArgs) -> Result<()> {
    eprintln!("🧪 Using the built-in sample ledger");
    let mut session = Session::with_dataset(sample_dataset())?;
    write_report(&mut session, output)
}

fn write_report(session: &mut Session, output: &OutputArgs) -> Result<()> {
    let summary = session.summary().context("Failed to build summary")?;

    let mut writer: Box<dyn Write> = match &output.output {
        Some(path) => Box::new(
            File::create(path).with_context(|| format!("Cannot create {}", path.display()))?,
        ),
        None => Box::new(io::stdout()),
    };

    match output.format {
        OutputFormat::Text => writer.write_all(render_text(&summary).as_bytes())?,
        OutputFormat::Csv => write_csv(&summary, &mut writer)?,
        OutputFormat::Json => {
            let id = session.dataset().map(|d| d.id);
            write_json(&summary.report(id), &mut writer)?
        }
    }
    writer.flush()?;

    if let Some(path) = &output.output {
        eprintln!(
            "✓ Wrote {} accounts × {} months to {}",
            summary.accounts().len(),
            summary.months().len(),
            path.display()
        );
    }

    Ok(())
}

fn run_fields(file: &Path, header_row: Option<usize>) -> Result<()> {
    let dataset = load_dataset(file, &DecodeOptions { header_row })
        .with_context(|| format!("Failed to load {}", file.display()))?;
    let rows = dataset.len();
    let mut session = Session::with_dataset(dataset)
        .with_context(|| format!("No data rows in {}", file.display()))?;

    println!("📋 Columns in {} ({} rows)", file.display(), rows);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for (i, name) in session.available_fields().iter().enumerate() {
        println!("  {:>2}. {}", i + 1, name);
    }

    println!("\n🔍 Detected fields");
    let binding = session.binding()?;
    for kind in FieldKind::ALL {
        match binding.get(kind) {
            Some(column) => println!("  ✓ {:<8} → {}", kind, column),
            None => println!("  ❌ {:<8} → not found (use --{}-field)", kind, kind),
        }
    }

    Ok(())
}

#[cfg(feature = "tui")]
fn run_ui_mode(source: &SourceArgs) -> Result<()> {
    let session = open_session(source)?;

    let mut app = ui::App::new(session).context("Failed to build summary")?;
    ui::run_ui(&mut app)?;

    println!("\n✅ UI closed successfully");
    Ok(())
}

#[cfg(not(feature = "tui"))]
fn run_ui_mode(_source: &SourceArgs) -> Result<()> {
    eprintln!("❌ TUI mode not available!");
    eprintln!("   Rebuild with: cargo build --features tui");
    eprintln!("   Or use the API server: cargo run --bin ledger-pivot-server --features server");
    std::process::exit(1);
}
