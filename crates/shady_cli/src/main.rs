use std::path::{Path, PathBuf};
use std::process;

use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use serde_json::{Map as JsonMap, Value as JsonValue};
use shady_core::backup::backup_path;
use shady_core::core_api::{
    BackupOutcome, CoreError, CoreErrorCode, MarketeerEntry, RunState, RunSummary, Stage,
    UnlockOutcome,
};
use shady_core::marketeer::{DEFAULT_STOCK_ID, DEFAULT_TOKEN, UnlockRules};
use shady_core::pipeline::{self, Observer, Silent, UnlockConfig};
use tracing::warn;
use tracing_subscriber::EnvFilter;

const EXIT_FAILURE: i32 = 1;
const EXIT_CANCELLED: i32 = 130;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Cli {
    #[arg(value_name = "SAVE.XML.GZ")]
    path: PathBuf,
    /// Report what would be unlocked without writing a backup or the save.
    #[arg(long = "dry-run")]
    dry_run: bool,
    /// Print the run summary as JSON instead of progress lines.
    #[arg(long)]
    json: bool,
    #[arg(long = "stock-id", value_name = "ID", default_value = DEFAULT_STOCK_ID)]
    stock_id: String,
    #[arg(long, value_name = "FLAG", default_value = DEFAULT_TOKEN)]
    token: String,
}

struct Console<'a> {
    path: &'a Path,
}

impl Observer for Console<'_> {
    fn on_stage(&mut self, stage: Stage) {
        match stage {
            Stage::Decompress => {
                println!("Loading save file {}", self.path.display());
                println!("Decompressing...");
            }
            Stage::Serialize => println!("Saving..."),
            Stage::Compress => println!("Compressing..."),
            Stage::Backup | Stage::Parse | Stage::Mutate => {}
        }
    }

    fn on_state(&mut self, state: RunState) {
        if state == RunState::Done {
            println!("Done.");
        }
    }

    fn on_backup(&mut self, outcome: BackupOutcome) {
        match outcome {
            BackupOutcome::Created => {
                println!("Created backup {}", backup_path(self.path).display())
            }
            BackupOutcome::AlreadyPresent => println!(
                "Backup {} already exists, leaving it alone",
                backup_path(self.path).display()
            ),
            BackupOutcome::Skipped => println!("Dry run: no backup, save will not be written"),
        }
    }

    fn on_marketeers_found(&mut self, count: usize) {
        println!("Found {count} black marketeers");
    }

    fn on_entry(&mut self, entry: &MarketeerEntry) {
        match entry.outcome {
            UnlockOutcome::Unlocked => println!(
                "  Unlocked {} ({}) of faction {}",
                entry.name, entry.code, entry.owner
            ),
            UnlockOutcome::AlreadyUnlocked => println!(
                "  {} ({}) of faction {} is already unlocked",
                entry.name, entry.code, entry.owner
            ),
            UnlockOutcome::MissingTraits => println!(
                "  Skipping {} ({}) of faction {}: no trait flags",
                entry.name, entry.code, entry.owner
            ),
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            e.exit()
        }
        Err(_) => {
            // Misuse has always exited with status 0.
            eprintln!("{}", Cli::command().render_usage());
            process::exit(0);
        }
    };

    let mut config = UnlockConfig::new(&cli.path);
    config.dry_run = cli.dry_run;
    config.rules = UnlockRules {
        stock_id: cli.stock_id,
        token: cli.token,
    };

    let cancel = config.cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || cancel.cancel()) {
        warn!("could not install Ctrl-C handler: {e}");
    }

    // Progress is suppressed in JSON mode so stdout stays parseable.
    let result = if cli.json {
        pipeline::run(&config, &mut Silent)
    } else {
        pipeline::run(&config, &mut Console { path: &cli.path })
    };

    match result {
        Ok(summary) if cli.json => match summary_json(&summary) {
            Ok(json) => print_json(&json),
            Err(e) => {
                eprintln!("Error rendering JSON output: {e}");
                process::exit(EXIT_FAILURE);
            }
        },
        Ok(summary) => print_totals(&summary),
        Err(err) => {
            if cli.json {
                print_json(&error_json(&err));
            } else {
                eprintln!("Error processing {}: {err}", cli.path.display());
            }
            process::exit(exit_code(&err));
        }
    }
}

fn exit_code(err: &CoreError) -> i32 {
    match err.code {
        CoreErrorCode::Cancelled => EXIT_CANCELLED,
        CoreErrorCode::Io | CoreErrorCode::Format => EXIT_FAILURE,
    }
}

fn print_totals(summary: &RunSummary) {
    let report = &summary.report;
    println!(
        "{} unlocked, {} already unlocked, {} skipped",
        report.unlocked(),
        report.count(UnlockOutcome::AlreadyUnlocked),
        report.count(UnlockOutcome::MissingTraits),
    );
}

// ---------------------------------------------------------------------------
// JSON output
// ---------------------------------------------------------------------------

fn print_json(json: &JsonValue) {
    let rendered = serde_json::to_string_pretty(json).unwrap_or_else(|e| {
        eprintln!("Error rendering JSON output: {e}");
        process::exit(EXIT_FAILURE);
    });
    println!("{rendered}");
}

fn summary_json(summary: &RunSummary) -> Result<JsonValue, serde_json::Error> {
    let mut out = JsonMap::new();
    out.insert("status".to_string(), JsonValue::String("ok".to_string()));
    out.insert(
        "unlocked".to_string(),
        JsonValue::from(summary.report.unlocked()),
    );
    if let JsonValue::Object(fields) = serde_json::to_value(summary)? {
        out.extend(fields);
    }
    Ok(JsonValue::Object(out))
}

fn error_json(err: &CoreError) -> JsonValue {
    let mut out = JsonMap::new();
    out.insert("status".to_string(), JsonValue::String("error".to_string()));
    out.insert(
        "stage".to_string(),
        JsonValue::String(err.stage.as_str().to_string()),
    );
    out.insert(
        "code".to_string(),
        JsonValue::String(format!("{:?}", err.code)),
    );
    out.insert("message".to_string(), JsonValue::String(err.message.clone()));
    JsonValue::Object(out)
}
