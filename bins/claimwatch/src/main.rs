//! claimwatch: preprocess billing extracts, scan for anomalous providers,
//! and print a dossier for a single provider.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use claimwatch_core::{MemoryStore, ProviderId};
use claimwatch_engine::{
    ProfileAssembler, ProviderDossier, ScanConfig, Scanner, load_peer_revenue, load_store, paid_counts_path, preprocess,
    write_scan_csv,
};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "claimwatch", version, about = "Provider billing anomaly scanner")]
struct Cli {
    /// TOML config file. Defaults to the platform config dir when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Log format (json or text).
    #[arg(long, global = true, default_value = "text")]
    log_format: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Collapse a raw extract into one row per provider, month, and procedure.
    Preprocess {
        #[arg(long)]
        input: PathBuf,
        #[arg(long, default_value = "data/processed/provider_month_summary.csv")]
        output: PathBuf,
    },
    /// Run every detector and rank suspicious providers.
    Scan(ScanArgs),
    /// Assemble the dossier for one provider.
    Profile(ProfileArgs),
}

#[derive(Args, Debug)]
struct DataArgs {
    /// Raw extract or preprocessed summary CSV.
    #[arg(long, default_value = "data/processed/provider_month_summary.csv")]
    data: PathBuf,

    /// Optional precomputed per-claim revenue table for the peer population.
    #[arg(long)]
    peers: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ScanArgs {
    #[command(flatten)]
    data: DataArgs,

    /// Minimum score for a provider to be ranked.
    #[arg(long)]
    threshold: Option<f64>,

    /// Number of ranked providers to print.
    #[arg(long)]
    top: Option<usize>,

    /// Where to write the full ranking as CSV.
    #[arg(long, default_value = "output/scan_results.csv")]
    output: PathBuf,
}

#[derive(Args, Debug)]
struct ProfileArgs {
    /// Ten-digit provider NPI.
    npi: String,

    #[command(flatten)]
    data: DataArgs,

    /// Where to write the dossier as JSON.
    #[arg(long)]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level, &cli.log_format);

    match cli.command {
        Command::Preprocess { input, output } => cmd_preprocess(&input, &output),
        Command::Scan(args) => cmd_scan(load_config(cli.config.as_deref())?, args),
        Command::Profile(args) => cmd_profile(load_config(cli.config.as_deref())?, args),
    }
}

fn load_config(path: Option<&Path>) -> Result<ScanConfig> {
    ScanConfig::load(path).context("failed to load configuration")
}

fn cmd_preprocess(input: &Path, output: &Path) -> Result<()> {
    let summary = preprocess(input, output)
        .with_context(|| format!("failed to preprocess {}", input.display()))?;
    println!(
        "Collapsed {} rows into {} across {} providers: {}",
        summary.input_rows,
        summary.output_rows,
        summary.providers,
        output.display()
    );
    println!(
        "Paid amount counts ({} entries): {}",
        summary.paid_amounts,
        paid_counts_path(output).display()
    );
    Ok(())
}

fn open_store(data: &DataArgs) -> Result<MemoryStore> {
    let store = load_store(&data.data).with_context(|| format!("failed to load {}", data.data.display()))?;
    match &data.peers {
        Some(p) => {
            let peers = load_peer_revenue(p).with_context(|| format!("failed to load peer table {}", p.display()))?;
            Ok(store.with_peer_revenue(peers))
        }
        None => Ok(store),
    }
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("failed to create {}", parent.display()))?;
    }
    Ok(())
}

fn cmd_scan(mut config: ScanConfig, args: ScanArgs) -> Result<()> {
    if let Some(t) = args.threshold {
        config.rank.threshold = t;
    }
    if let Some(n) = args.top {
        config.rank.top = n;
    }
    let scanner = Scanner::new(config).context("invalid scan settings")?;
    let store = open_store(&args.data)?;
    info!(providers = store.provider_count(), rows = store.record_count(), "data loaded");

    let report = scanner.run(&store).context("scan failed")?;

    ensure_parent(&args.output)?;
    let file = fs::File::create(&args.output)
        .with_context(|| format!("failed to create {}", args.output.display()))?;
    write_scan_csv(&report.ranked, file).context("failed to write scan results")?;

    println!(
        "{} providers scored, {} flags raised, {} ranked at or above {:.2}",
        report.scores.len(),
        report.flags.len(),
        report.ranked.len(),
        scanner.config().rank.threshold
    );
    for entry in report.top_ranked() {
        let detectors: Vec<&str> = entry.contributing_detectors.iter().map(|d| d.as_str()).collect();
        println!(
            "  {:3}. NPI {} | Score: {:.0}% | Flags: {} ({})",
            entry.rank,
            entry.provider_id,
            entry.score * 100.0,
            entry.flag_count,
            detectors.join(", ")
        );
    }
    println!("Results written to {}", args.output.display());
    Ok(())
}

fn cmd_profile(config: ScanConfig, args: ProfileArgs) -> Result<()> {
    let id = ProviderId::parse(&args.npi).with_context(|| format!("not a provider id: {}", args.npi))?;
    let store = open_store(&args.data)?;
    let dossier = ProfileAssembler::new(config)
        .assemble(&store, &id)
        .with_context(|| format!("failed to profile {id}"))?;

    write_dossier(io::stdout().lock(), &dossier).context("failed to print dossier")?;

    if let Some(path) = &args.output {
        ensure_parent(path)?;
        let file = fs::File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
        serde_json::to_writer_pretty(file, &dossier).context("failed to write dossier")?;
        println!("Dossier written to {}", path.display());
    }
    Ok(())
}

/// The dossier block, terminated so following output starts on its own line.
fn write_dossier<W: Write>(mut out: W, dossier: &ProviderDossier) -> io::Result<()> {
    writeln!(out, "{dossier}")
}

fn init_logging(level: &str, format: &str) {
    use tracing_subscriber::filter::EnvFilter;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // Logs go to stderr so stdout stays clean for the report.
    if format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_level(true).with_writer(std::io::stderr))
            .init();
    }
}
