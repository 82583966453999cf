use branchfuzz_core::campaign::{Campaign, CampaignReport, FuzzPolicy};
use branchfuzz_core::config::{BranchfuzzConfig, CorpusType, PolicyChoice};
use branchfuzz_core::corpus::{Corpus, CorpusEntryMetadata, InMemoryCorpus, OnDiskCorpus};
use branchfuzz_core::executor::InProcessExecutor;
use branchfuzz_targets::registry::{TargetKind, kit};

use clap::{Parser, ValueEnum};
use log::{info, warn};
use std::path::PathBuf;
use std::time::{Duration, Instant};

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    #[clap(short, long, value_parser)]
    config_file: Option<PathBuf>,
    /// toy-lang, maze, classifier or calculator.
    #[clap(short, long)]
    target: Option<TargetKind>,
    #[clap(short, long, value_enum)]
    policy: Option<PolicyArg>,
    #[clap(short, long)]
    iterations: Option<u64>,
    /// Seed for the campaign's random source.
    #[clap(short, long)]
    seed: Option<u64>,
    /// Keep the guided campaign's corpus on disk in this directory.
    #[clap(long)]
    corpus_dir: Option<PathBuf>,
    /// Write the campaign report(s) to this file as JSON.
    #[clap(long)]
    report: Option<PathBuf>,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum PolicyArg {
    PureRandom,
    CoverageGuided,
    Compare,
}

impl From<PolicyArg> for PolicyChoice {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::PureRandom => PolicyChoice::PureRandom,
            PolicyArg::CoverageGuided => PolicyChoice::CoverageGuided,
            PolicyArg::Compare => PolicyChoice::Compare,
        }
    }
}

/// Everything one campaign needs, resolved from config and flags.
#[derive(Debug)]
struct RunSettings {
    target: TargetKind,
    iterations: u64,
    rng_seed: u64,
    timeout: Option<Duration>,
    sentinel: String,
    corpus_dir: Option<PathBuf>,
    seed_paths: Vec<PathBuf>,
}

fn load_config(config_file: Option<PathBuf>) -> Result<BranchfuzzConfig, anyhow::Error> {
    match config_file {
        Some(config_path) => {
            info!("Loading configuration from specified path: {config_path:?}");
            BranchfuzzConfig::load_from_file(&config_path)
        }
        None => {
            let default_config_path = PathBuf::from("config.toml");
            if default_config_path.exists() {
                info!("No config file specified, loading default: {default_config_path:?}");
                BranchfuzzConfig::load_from_file(&default_config_path)
            } else {
                info!("No config file specified and no 'config.toml' found, using built-in defaults.");
                Ok(BranchfuzzConfig::default())
            }
        }
    }
}

fn build_corpus(
    run: &RunSettings,
    policy: FuzzPolicy,
    seeds: Vec<String>,
) -> Result<Box<dyn Corpus<String>>, anyhow::Error> {
    let guided = policy == FuzzPolicy::CoverageGuided;
    let mut corpus: Box<dyn Corpus<String>> = match &run.corpus_dir {
        Some(dir) if guided => {
            let mut on_disk = OnDiskCorpus::<String>::new(dir.clone())?;
            if !on_disk.is_empty() {
                // Built-in and configured seeds went in when the directory was first used.
                info!(
                    "Resuming from {} entries already in {dir:?}",
                    on_disk.len()
                );
                return Ok(Box::new(on_disk));
            }
            for (i, seed) in seeds.into_iter().enumerate() {
                let metadata = CorpusEntryMetadata::seed(&seed, format!("built-in seed #{i}"));
                on_disk.add(seed, metadata)?;
            }
            Box::new(on_disk)
        }
        _ => Box::new(InMemoryCorpus::from_seeds(seeds)),
    };
    if guided && !run.seed_paths.is_empty() {
        let loaded = corpus.load_initial_seeds(&run.seed_paths)?;
        info!("Loaded {loaded} seed file(s) from {:?}", run.seed_paths);
    }
    Ok(corpus)
}

fn run_one(run: &RunSettings, policy: FuzzPolicy) -> Result<CampaignReport, anyhow::Error> {
    let kit = kit(run.target, run.rng_seed)?;
    let executor = InProcessExecutor::new(kit.target)
        .with_timeout(run.timeout)
        .with_sentinel(run.sentinel.clone());
    let corpus = build_corpus(run, policy, kit.seeds)?;

    let start_time = Instant::now();
    let report = Campaign::new(executor, kit.mutator, corpus, run.rng_seed)
        .run(run.iterations, policy)?;
    info!(
        "{} {policy} campaign took {:.2?}",
        run.target,
        start_time.elapsed()
    );
    Ok(report)
}

fn print_report(target: TargetKind, report: &CampaignReport) {
    let branches: Vec<&str> = report.coverage.iter().map(|b| b.as_str()).collect();
    println!("\n=== {target}: {} ===", report.policy);
    println!(
        "Final covered branches ({}): {}",
        report.final_coverage(),
        branches.join(", ")
    );
    println!(
        "Coverage growth: {:?} ... (last 10 iterations)",
        report.history_tail(10)
    );
    let stats = &report.stats;
    println!(
        "Executions: {}, completed: {}, runtime errors: {}, timeouts: {}, crashes: {}, corpus additions: {}",
        stats.executions,
        stats.completed,
        stats.runtime_errors,
        stats.timeouts,
        stats.crashes,
        stats.corpus_additions
    );
    if report.cancelled {
        println!("Campaign was stopped early.");
    }
}

fn main() -> Result<(), anyhow::Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let config = load_config(cli.config_file)?;
    let fuzzer = config.fuzzer();
    let corpus_config = config.corpus();

    let target = match cli.target {
        Some(target) => target,
        None => config.target.name.parse::<TargetKind>()?,
    };
    let choice = cli.policy.map_or(fuzzer.policy, PolicyChoice::from);
    let corpus_dir = cli.corpus_dir.or_else(|| {
        (corpus_config.corpus_type == CorpusType::OnDisk).then(|| corpus_config.on_disk_path.clone())
    });

    let run = RunSettings {
        target,
        iterations: cli.iterations.unwrap_or(fuzzer.max_iterations),
        rng_seed: cli.seed.unwrap_or(fuzzer.rng_seed),
        timeout: config.target.timeout(),
        sentinel: config.target.sentinel_branch.clone(),
        corpus_dir,
        seed_paths: corpus_config.initial_seed_paths.unwrap_or_default(),
    };
    info!("Effective settings: {run:?}, policy {choice:?}");

    // One thread per policy; campaigns share nothing but the read-only settings.
    let settings = &run;
    let reports = std::thread::scope(|scope| {
        let handles: Vec<_> = choice
            .policies()
            .into_iter()
            .map(|policy| scope.spawn(move || run_one(settings, policy)))
            .collect();
        handles
            .into_iter()
            .map(|handle| {
                handle
                    .join()
                    .map_err(|_| anyhow::anyhow!("Campaign thread panicked"))?
            })
            .collect::<Result<Vec<_>, anyhow::Error>>()
    })?;

    for report in &reports {
        print_report(run.target, report);
    }
    if let [random, guided] = reports.as_slice() {
        let diff = guided.final_coverage() as i64 - random.final_coverage() as i64;
        println!(
            "\nCoverage-guided covered {} branch(es), pure random {} ({diff:+}).",
            guided.final_coverage(),
            random.final_coverage()
        );
        if diff < 0 {
            warn!("Pure random out-covered coverage-guided on {}", run.target);
        }
    }

    if let Some(path) = cli.report {
        let json = serde_json::to_string_pretty(&reports)?;
        std::fs::write(&path, json)
            .map_err(|e| anyhow::anyhow!("Failed to write report to {:?}: {}", path, e))?;
        info!("Wrote {} report(s) to {path:?}", reports.len());
    }

    Ok(())
}
