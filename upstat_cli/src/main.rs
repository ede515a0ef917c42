use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use thiserror::Error;

use upstat_core::details::{SnapshotFormatError, UpgradeSnapshot, UpgradeState};
use upstat_core::rate::{self, DownloadRate, RateParseError};

mod simulate;
mod terminal_observer;

const DEFAULT_STEP_MS: u64 = 150;

#[derive(Parser)]
#[command(name = "upstat", about = "Upgrade status tracker")]
struct Args {
    /// Output format for snapshots [env: UPSTAT_FORMAT, default: json]
    #[arg(short, long, global = true, value_enum)]
    format: Option<Format>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Drive a simulated upgrade and stream every snapshot
    Simulate {
        #[arg(short, long, default_value = "9.1.0")]
        target_version: String,

        /// Action id to correlate with; a random UUID when omitted
        #[arg(short, long)]
        action_id: Option<String>,

        /// Fail the upgrade on entering this state (e.g. `downloading`)
        #[arg(long)]
        fail_at: Option<UpgradeState>,

        /// Delay between steps in milliseconds [env: UPSTAT_STEP_MS]
        #[arg(long)]
        step_ms: Option<u64>,

        /// Do not draw the progress bar
        #[arg(long)]
        no_bar: bool,
    },

    /// Encode or decode a download rate
    Rate {
        #[command(subcommand)]
        op: RateOp,
    },

    /// Print a stored snapshot file (JSON or YAML) in the chosen format
    Convert { file: PathBuf },
}

#[derive(Subcommand)]
enum RateOp {
    /// Bytes per second to text, e.g. 1536 -> 1.5KiBps
    Encode { bytes_per_second: f64 },
    /// Text back to bytes per second
    Decode { text: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    Json,
    Yaml,
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error("failed to read {path:?}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error(transparent)]
    Snapshot(#[from] SnapshotFormatError),

    #[error(transparent)]
    Rate(#[from] RateParseError),

    #[error("cannot inject a failure at {0}: the simulation never enters it")]
    UnreachableFailPoint(UpgradeState),

    #[error("upgrade driver stopped unexpectedly: {0}")]
    Driver(#[from] tokio::task::JoinError),
}

pub fn render(snapshot: &UpgradeSnapshot, format: Format) -> Result<String, SnapshotFormatError> {
    match format {
        Format::Json => snapshot.to_json_pretty(),
        Format::Yaml => snapshot.to_yaml(),
    }
}

/// `--format`, then `UPSTAT_FORMAT`, then JSON.
fn resolve_format(flag: Option<Format>) -> Format {
    flag.or_else(|| {
        let value = std::env::var("UPSTAT_FORMAT").ok()?;
        let parsed = Format::from_str(&value, true);
        if parsed.is_err() {
            log::warn!("[config] ignoring UPSTAT_FORMAT={:?}", value);
        }
        parsed.ok()
    })
    .unwrap_or(Format::Json)
}

fn resolve_step(flag: Option<u64>) -> Duration {
    let ms = flag
        .or_else(|| std::env::var("UPSTAT_STEP_MS").ok()?.parse().ok())
        .unwrap_or(DEFAULT_STEP_MS);
    Duration::from_millis(ms)
}

fn load_snapshot(path: &Path) -> Result<UpgradeSnapshot, CliError> {
    let text = std::fs::read_to_string(path).map_err(|source| CliError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let is_yaml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"));

    let snapshot = if is_yaml {
        UpgradeSnapshot::from_yaml(&text)?
    } else {
        UpgradeSnapshot::from_json(&text)?
    };
    Ok(snapshot)
}

async fn run(args: Args) -> Result<(), CliError> {
    let format = resolve_format(args.format);

    match args.command {
        Command::Simulate {
            target_version,
            action_id,
            fail_at,
            step_ms,
            no_bar,
        } => {
            let action_id = action_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            log::info!("[simulate] upgrading to {} (action {})", target_version, action_id);

            let last = simulate::run(simulate::Plan {
                target_version,
                action_id,
                fail_at,
                step: resolve_step(step_ms),
                format,
                show_bar: !no_bar,
            })
            .await?;

            match last.state {
                UpgradeState::Failed => eprintln!("Upgrade failed: {}", last.metadata.error_msg),
                state => eprintln!("Upgrade finished in {}", state),
            }
        }
        Command::Rate { op } => match op {
            RateOp::Encode { bytes_per_second } => println!("{}", rate::encode(bytes_per_second)),
            RateOp::Decode { text } => {
                let rate: DownloadRate = text.parse()?;
                println!("{}", rate.bytes_per_second());
            }
        },
        Command::Convert { file } => {
            let snapshot = load_snapshot(&file)?;
            println!("{}", render(&snapshot, format)?.trim_end());
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("upstat: {}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_flag_wins() {
        assert_eq!(resolve_format(Some(Format::Yaml)), Format::Yaml);
    }

    #[test]
    fn step_flag_wins() {
        assert_eq!(resolve_step(Some(5)), Duration::from_millis(5));
    }

    #[test]
    fn fail_at_parses_short_state_names() {
        let args = Args::try_parse_from(["upstat", "simulate", "--fail-at", "extracting"]).unwrap();
        match args.command {
            Command::Simulate { fail_at, .. } => assert_eq!(fail_at, Some(UpgradeState::Extracting)),
            _ => panic!("expected simulate"),
        }
    }

    #[test]
    fn load_snapshot_picks_format_from_extension() {
        let dir = tempfile::tempdir().unwrap();

        let snapshot = UpgradeSnapshot::new("9.1.0", UpgradeState::Watching, "act-1");
        let yaml_path = dir.path().join("state.yml");
        let json_path = dir.path().join("state.json");
        std::fs::write(&yaml_path, snapshot.to_yaml().unwrap()).unwrap();
        std::fs::write(&json_path, snapshot.to_json().unwrap()).unwrap();

        assert_eq!(load_snapshot(&yaml_path).unwrap(), snapshot);
        assert_eq!(load_snapshot(&json_path).unwrap(), snapshot);
        assert!(matches!(
            load_snapshot(&dir.path().join("missing.json")),
            Err(CliError::Read { .. })
        ));
    }
}
