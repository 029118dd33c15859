//! enose - Electronic Nose Laboratory Tool
//!
//! Records MQ sensor samples from the nose over serial, trains the alcohol
//! classifier and analyses unknown samples.
//!
//! # Usage
//!
//! ```bash
//! # Record a sample (Ctrl+C to stop)
//! enose record etanol_01 --port /dev/ttyACM0
//!
//! # Dry run of the acquisition loop from a raw capture
//! enose record teste --replay captura.txt --interval-ms 100
//!
//! # Train from the labelled dataset, then analyse an unknown sample
//! enose train
//! enose analyze desconhecida.csv
//! ```
//!
//! # Environment Variables
//!
//! - `ENOSE_CONFIG`: Path to the TOML configuration (default: ./enose.toml)
//! - `RUST_LOG`: Logging level (default: info)

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

use enose_lab::acquisition::{
    scanner, AcquisitionController, JoinOutcome, ReplaySource, SessionRequest, StatusReceiver,
    StatusSink,
};
use enose_lab::classifier::{analyze_file, AnalysisReport, AnalysisRequest};
use enose_lab::config::{self, LabConfig};
use enose_lab::training::{train, TrainingOptions};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "enose")]
#[command(about = "Electronic nose lab tool: MQ sensor acquisition and alcohol classification")]
#[command(version)]
struct CliArgs {
    /// Configuration file (overrides ENOSE_CONFIG and ./enose.toml)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Record a sample file from the sensor stream until Ctrl+C
    Record {
        /// Output file (".csv" is appended when missing)
        output: PathBuf,

        /// Serial port (default: acquisition.default_port)
        #[arg(short, long)]
        port: Option<String>,

        /// Baud rate (default: acquisition.baud_rate)
        #[arg(short, long)]
        baud: Option<u32>,

        /// Replace the output file if it already exists
        #[arg(long)]
        overwrite: bool,

        /// Replay a raw text capture instead of opening a serial port
        #[arg(long, value_name = "FILE", conflicts_with = "port")]
        replay: Option<PathBuf>,

        /// Delay between replayed lines
        #[arg(long, default_value = "0", requires = "replay")]
        interval_ms: u64,
    },

    /// Classify an unknown sample file
    Analyze {
        /// Sample CSV (MQ3,MQ5,MQ6,MQ8 columns, or exactly four columns)
        sample: PathBuf,

        #[arg(long)]
        model: Option<PathBuf>,

        #[arg(long)]
        scaler: Option<PathBuf>,

        /// Training dataset for class profiles
        #[arg(long)]
        dataset: Option<PathBuf>,

        /// Skip the class profiles
        #[arg(long)]
        no_profiles: bool,

        /// Print the full report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Train the classifier and save the model / scaler pair
    Train {
        #[arg(long)]
        dataset: Option<PathBuf>,

        #[arg(long)]
        model: Option<PathBuf>,

        #[arg(long)]
        scaler: Option<PathBuf>,

        /// Shuffle seed of the train/test split
        #[arg(long)]
        seed: Option<u64>,

        /// Share of rows held out for evaluation
        #[arg(long)]
        test_fraction: Option<f64>,

        #[arg(long)]
        json: bool,
    },

    /// List serial ports
    Ports {
        /// Listen on each port for a valid sensor line
        #[arg(long)]
        probe: bool,

        #[arg(short, long)]
        baud: Option<u32>,

        /// Listening window per port when probing
        #[arg(long, default_value = "3000")]
        window_ms: u64,
    },

    /// Write the active configuration as TOML
    Config {
        #[arg(default_value = "enose.toml")]
        output: PathBuf,

        /// Replace an existing file
        #[arg(long)]
        force: bool,
    },
}

// ============================================================================
// Commands
// ============================================================================

fn print_events(events: &mut StatusReceiver) {
    for event in events.drain() {
        println!("{event}");
    }
}

async fn run_record(
    cfg: &LabConfig,
    output: PathBuf,
    port: Option<String>,
    baud: Option<u32>,
    overwrite: bool,
    replay: Option<PathBuf>,
    interval_ms: u64,
) -> Result<()> {
    let (status, mut events) = StatusSink::channel();
    let controller = AcquisitionController::new(cfg.acquisition.clone(), status);
    let request = SessionRequest::new(output).overwrite(overwrite);

    let handle = match replay {
        Some(path) => {
            let source = ReplaySource::from_file(&path)
                .with_context(|| format!("Failed to read capture {}", path.display()))?
                .with_interval(Duration::from_millis(interval_ms));
            controller.start(Box::new(source), request)?
        }
        None => {
            let port = port.unwrap_or_else(|| cfg.acquisition.default_port.clone());
            let baud = baud.unwrap_or(cfg.acquisition.baud_rate);
            controller.open_session(&port, baud, request)?
        }
    };
    info!(session = %handle.id(), output = %handle.output().display(), "Recording (Ctrl+C to stop)");

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let stopped = handle.stopped();
    tokio::pin!(stopped);

    loop {
        tokio::select! {
            Some(event) = events.recv() => println!("{event}"),
            res = &mut ctrl_c => {
                if let Err(e) = res {
                    warn!("Failed to listen for Ctrl+C: {}", e);
                }
                info!("Stop requested");
                handle.request_stop();
                break;
            }
            () = &mut stopped => break,
        }
    }

    let outcome = controller.join(cfg.acquisition.join_timeout()).await;
    print_events(&mut events);

    match outcome {
        JoinOutcome::Finished(Ok(report)) => {
            println!(
                "{} records written to {} ({} lines ignored)",
                report.records_written,
                report.output_path.display(),
                report.lines_discarded
            );
            Ok(())
        }
        JoinOutcome::Finished(Err(e)) => Err(e).context("Acquisition session failed"),
        JoinOutcome::TimedOut(id) => {
            warn!(session = %id, "Worker abandoned after join timeout");
            Ok(())
        }
        JoinOutcome::Aborted(id, reason) => bail!("Acquisition worker {id} aborted: {reason}"),
        JoinOutcome::NoSession => Ok(()),
    }
}

fn print_analysis(report: &AnalysisReport) {
    let verdict = &report.verdict;
    println!();
    println!("Substance:  {}", verdict.displayed_label);
    println!("Confidence: {:.2}%", verdict.confidence_percent);
    if !verdict.kind.is_known() {
        println!("Closest:    {}", verdict.predicted_label);
    }
    println!();
    println!("Confidence per class:");
    for (label, pct) in verdict.ranked() {
        println!("  {label:<20} {pct:>6.2}%");
    }

    if let Some(profiles) = &report.profiles {
        println!();
        println!("Scaled sensor profile ({}):", profiles.channels.join(", "));
        println!("  {:<20} {}", "sample", format_row(&profiles.sample));
        for (label, row) in &profiles.classes {
            println!("  {label:<20} {}", format_row(row));
        }
    }
}

fn format_row(row: &[f64]) -> String {
    row.iter()
        .map(|v| format!("{v:>6.3}"))
        .collect::<Vec<_>>()
        .join(" ")
}

// ============================================================================
// Entry point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = CliArgs::parse();

    let lab_config = match &args.config {
        Some(path) => LabConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => LabConfig::load(),
    };
    config::init(lab_config);
    let cfg = config::get();

    match args.command {
        Command::Record {
            output,
            port,
            baud,
            overwrite,
            replay,
            interval_ms,
        } => run_record(cfg, output, port, baud, overwrite, replay, interval_ms).await,

        Command::Analyze {
            sample,
            model,
            scaler,
            dataset,
            no_profiles,
            json,
        } => {
            let mut request = AnalysisRequest::from_config(sample, cfg);
            if let Some(model) = model {
                request.model_path = model;
            }
            if let Some(scaler) = scaler {
                request.scaler_path = scaler;
            }
            if let Some(dataset) = dataset {
                request.dataset_path = Some(dataset);
            }
            if no_profiles {
                request.dataset_path = None;
            }

            let (status, mut events) = StatusSink::channel();
            let result = analyze_file(&request, &status);
            if json {
                for event in events.drain() {
                    eprintln!("{event}");
                }
            } else {
                print_events(&mut events);
            }

            let report = result.context("Analysis failed")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_analysis(&report);
            }
            Ok(())
        }

        Command::Train {
            dataset,
            model,
            scaler,
            seed,
            test_fraction,
            json,
        } => {
            let mut options = TrainingOptions::from_config(cfg);
            if let Some(dataset) = dataset {
                options.dataset_path = dataset;
            }
            if let Some(model) = model {
                options.model_path = model;
            }
            if let Some(scaler) = scaler {
                options.scaler_path = scaler;
            }
            if let Some(seed) = seed {
                options.seed = seed;
            }
            if let Some(fraction) = test_fraction {
                if !(fraction > 0.0 && fraction < 1.0) {
                    bail!("--test-fraction must be between 0 and 1, got {fraction}");
                }
                options.test_fraction = fraction;
            }

            let report = train(&options).context("Training failed")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!(
                    "Trained on {} rows, evaluated on {} (label column '{}')",
                    report.train_rows, report.test_rows, report.label_column
                );
                println!();
                print!("{}", report.evaluation);
                println!();
                println!("Model saved to {}", report.model_path.display());
                println!("Scaler saved to {}", report.scaler_path.display());
            }
            Ok(())
        }

        Command::Ports {
            probe,
            baud,
            window_ms,
        } => {
            let ports = if probe {
                let baud = baud.unwrap_or(cfg.acquisition.baud_rate);
                scanner::scan_ports(baud, Duration::from_millis(window_ms)).await?
            } else {
                scanner::available_ports()?
            };
            if ports.is_empty() {
                println!("No serial ports found");
            }
            for port in ports {
                let marker = match port.validated {
                    Some(true) => "  [sensor data]",
                    Some(false) => "  [no sensor data]",
                    None => "",
                };
                println!(
                    "{:<20} {:<10} {}{}",
                    port.name,
                    port.kind,
                    port.description.as_deref().unwrap_or(""),
                    marker
                );
            }
            Ok(())
        }

        Command::Config { output, force } => {
            if output.exists() && !force {
                bail!("{} already exists (use --force to replace it)", output.display());
            }
            cfg.save_to_file(&output)?;
            println!("Configuration written to {}", output.display());
            Ok(())
        }
    }
}
