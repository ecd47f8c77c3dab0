use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};
use clap::ArgAction;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use spec_writer_core::{
    summarize, ColumnLayout, MemoryStore, ScanFixture, ScanMetadata, ScanOutcome, ScanReport,
    WriterConfig,
};
use spec_writer_service::{ServiceHandle, ServiceStatus, SpecWriterService};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "spec-writer",
    version,
    about = "Write live scan streams into legacy SPEC text files."
)]
struct Cli {
    /// Writer configuration JSON file.
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Publish scan fixtures into an in-memory registry and write them out.
    Replay(ReplayArgs),
    /// Show how the columns of a scan fixture are written.
    Classify(ClassifyArgs),
    /// List the scans contained in a SPEC file.
    Inspect(InspectArgs),
}

#[derive(Debug, Args)]
struct ReplayArgs {
    /// Scan fixture files, published in order.
    #[arg(long = "scan", value_name = "FILE", num_args = 1.., action = ArgAction::Append, required = true)]
    scans: Vec<PathBuf>,

    /// Write every scan into this directory instead of its declared one.
    #[arg(long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Minimum delay between two drains of a scan.
    #[arg(long)]
    max_write_interval_ms: Option<u64>,

    /// Delay between two published chunks of a fixture.
    #[arg(long, default_value_t = 0)]
    pace_ms: u64,

    /// Give up waiting for the writer after this long.
    #[arg(long, default_value_t = 60)]
    timeout_secs: u64,
}

#[derive(Debug, Args)]
struct ClassifyArgs {
    /// Scan fixture file.
    #[arg(long, value_name = "FILE")]
    scan: PathBuf,

    /// Print the layout as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
struct InspectArgs {
    /// SPEC file to read.
    #[arg(long, value_name = "PATH")]
    file: PathBuf,

    /// Print the summary as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Serialize)]
struct ClassifyOutput {
    scan_nb: u64,
    title: String,
    filename: PathBuf,
    layout: ColumnLayout,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    init_tracing(&config.log_level);

    match cli.command {
        Commands::Replay(args) => run_replay_command(args, config).map(|_| ()),
        Commands::Classify(args) => run_classify_command(args),
        Commands::Inspect(args) => run_inspect_command(args),
    }
}

fn load_config(path: Option<&Path>) -> Result<WriterConfig> {
    match path {
        Some(path) => WriterConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display())),
        None => Ok(WriterConfig::default()),
    }
}

fn run_replay_command(args: ReplayArgs, mut config: WriterConfig) -> Result<ServiceStatus> {
    if let Some(interval) = args.max_write_interval_ms {
        config.max_write_interval_ms = interval;
    }
    config.validate()?;

    let mut fixtures = Vec::with_capacity(args.scans.len());
    for path in &args.scans {
        let mut fixture = ScanFixture::load(path)
            .with_context(|| format!("failed to load scan fixture {}", path.display()))?;
        if let Some(dir) = &args.output_dir {
            fixture.retarget(dir);
        }
        fixtures.push(fixture);
    }
    let expected = fixtures.len() as u64;

    let store = MemoryStore::new(config.refresh_timeout());
    let service = Arc::new(SpecWriterService::new(Arc::new(store.clone()), config));
    let handle = ServiceHandle::start(service)?;

    let pace = Duration::from_millis(args.pace_ms);
    let producer = thread::spawn(move || -> Result<Vec<String>> {
        let mut keys = Vec::with_capacity(fixtures.len());
        for fixture in &fixtures {
            keys.push(fixture.publish(&store, pace)?);
        }
        Ok(keys)
    });
    let keys = producer
        .join()
        .map_err(|_| anyhow!("scan producer thread panicked"))??;
    info!("published {} scan(s)", keys.len());

    let deadline = Instant::now() + Duration::from_secs(args.timeout_secs);
    loop {
        let status = handle.status_snapshot()?;
        if processed(&status) >= expected {
            break;
        }
        if Instant::now() >= deadline {
            bail!(
                "writer processed {} of {} scan(s) within {}s",
                processed(&status),
                expected,
                args.timeout_secs
            );
        }
        thread::sleep(Duration::from_millis(20));
    }

    let status = handle.stop()?;
    for report in &status.recent_reports {
        println!("{}", describe_report(report));
    }
    println!(
        "{} scan(s): {} written, {} skipped, {} abandoned.",
        status.scans_seen, status.scans_written, status.scans_skipped, status.scans_abandoned
    );
    Ok(status)
}

fn processed(status: &ServiceStatus) -> u64 {
    status.scans_written + status.scans_skipped + status.scans_abandoned
}

fn describe_report(report: &ScanReport) -> String {
    let target = report
        .output_path
        .as_ref()
        .map(|path| path.display().to_string())
        .unwrap_or_else(|| "-".to_string());
    match &report.outcome {
        ScanOutcome::Written => format!(
            "- {}: wrote {} row(s) to {} in {} ms",
            report.key, report.rows_written, target, report.elapsed_ms
        ),
        ScanOutcome::Skipped => format!("- {}: skipped, {} is not a SPEC file", report.key, target),
        ScanOutcome::Abandoned { reason } => {
            format!("- {}: abandoned ({}) after {} row(s)", report.key, reason, report.rows_written)
        }
    }
}

fn run_classify_command(args: ClassifyArgs) -> Result<()> {
    let fixture = ScanFixture::load(&args.scan)
        .with_context(|| format!("failed to load scan fixture {}", args.scan.display()))?;
    let metadata = ScanMetadata::from_info(&fixture.info)?;
    let layout = ColumnLayout::classify(&metadata);

    if args.json {
        let output = ClassifyOutput {
            scan_nb: metadata.scan_nb,
            title: metadata.title,
            filename: metadata.filename,
            layout,
        };
        let payload =
            serde_json::to_string_pretty(&output).context("failed to serialize layout")?;
        println!("{payload}");
        return Ok(());
    }

    println!("Scan {} '{}' -> {}", metadata.scan_nb, metadata.title, metadata.filename.display());
    println!(
        "Scalar columns ({}): {}",
        layout.scalar_labels().len(),
        layout.scalar_labels().join(", ")
    );
    match layout.mca_size() {
        Some(size) => println!(
            "1D columns ({}, {} channels): {}",
            layout.oned_labels().len(),
            size,
            layout.oned_labels().join(", ")
        ),
        None => println!("1D columns (0)"),
    }
    println!("Excluded columns ({}):", layout.excluded().len());
    for column in layout.excluded() {
        println!("- {} [{:?}]", column.label, column.reason);
    }
    println!("Motors ({}):", layout.pre_snapshot().len());
    for (name, value) in layout.pre_snapshot() {
        let value = value.map_or_else(|| "None".to_string(), |sample| sample.to_string());
        println!("- {name} = {value}");
    }
    Ok(())
}

fn run_inspect_command(args: InspectArgs) -> Result<()> {
    let text = fs::read_to_string(&args.file)
        .with_context(|| format!("failed to read {}", args.file.display()))?;
    let scans = summarize(&text);

    if args.json {
        let payload = serde_json::to_string_pretty(&scans).context("failed to serialize scans")?;
        println!("{payload}");
        return Ok(());
    }

    if scans.is_empty() {
        println!("No scans in {}", args.file.display());
        return Ok(());
    }
    println!("{} scan(s) in {}:", scans.len(), args.file.display());
    for scan in &scans {
        println!(
            "- #S {} {} | {} row(s) | {} column(s) | {} spectrum column(s){}",
            scan.scan_nb,
            scan.title,
            scan.rows,
            scan.labels.len(),
            scan.spectra,
            if scan.closed { "" } else { " | not closed" }
        );
    }
    Ok(())
}

fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use spec_writer_core::summarize;

    use super::{load_config, run_replay_command, ReplayArgs};

    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../fixtures")
    }

    #[test]
    fn replay_writes_fixtures_into_output_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        let args = ReplayArgs {
            scans: vec![
                fixtures_dir().join("ascan.json"),
                fixtures_dir().join("ascan_mca.json"),
            ],
            output_dir: Some(dir.path().to_path_buf()),
            max_write_interval_ms: Some(0),
            pace_ms: 1,
            timeout_secs: 30,
        };
        let config_path = fixtures_dir().join("writer.json");
        let mut config = load_config(Some(config_path.as_path())).expect("config loads");
        assert_eq!(config.max_pending_points, 100_000);
        config.poll_interval_ms = 1;
        config.refresh_timeout_ms = 50;

        let status = run_replay_command(args, config).expect("replay succeeds");
        assert_eq!(status.scans_written, 2);

        let text = fs::read_to_string(dir.path().join("sample.dat")).expect("read output");
        assert_eq!(text.matches("#F ").count(), 1);
        let scans = summarize(&text);
        assert_eq!(scans.len(), 2);
        assert_eq!(scans[0].rows, 3);
        assert_eq!(scans[1].spectra, 1);
        assert!(scans.iter().all(|scan| scan.closed));
    }
}
