use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::time::Instant;

use public_good_index::io::{export_path, read_pgi, write_export, ScoreExport, Stage};
use public_good_index::jurisdiction::Tier;
use public_good_index::loaders::{DownloadStatus, Downloader};
use public_good_index::logging::{self, Verbosity};
use public_good_index::pipeline::{Pipeline, RunOptions};
use public_good_index::{config, output, scoring};

const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_CONFIG: i32 = 4;
const EXIT_DATA: i32 = 5;

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum TierArg {
    State,
    City,
    All,
}

impl TierArg {
    fn tiers(self) -> Vec<Tier> {
        match self {
            TierArg::State => vec![Tier::State],
            TierArg::City => vec![Tier::City],
            TierArg::All => Tier::ALL.to_vec(),
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum SingleTier {
    State,
    City,
}

impl From<SingleTier> for Tier {
    fn from(tier: SingleTier) -> Self {
        match tier {
            SingleTier::State => Tier::State,
            SingleTier::City => Tier::City,
        }
    }
}

/// Stage to resume a run at; earlier stages are read from the processed directory
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum ResumeStage {
    Col,
    Submetrics,
    Normalized,
    Pgi,
}

impl From<ResumeStage> for Stage {
    fn from(stage: ResumeStage) -> Self {
        match stage {
            ResumeStage::Col => Stage::Col,
            ResumeStage::Submetrics => Stage::SubMetrics,
            ResumeStage::Normalized => Stage::Normalized,
            ResumeStage::Pgi => Stage::Pgi,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum OutputFormat {
    Table,
    Tsv,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load inputs, score them and write the stage files
    Run {
        #[arg(long, value_enum, default_value = "all")]
        tier: TierArg,

        /// Do not fetch network feeds
        #[arg(long)]
        offline: bool,

        /// Ignore the feed cache
        #[arg(long)]
        no_cache: bool,

        /// Start from a stage-1 raw file instead of the loaders
        #[arg(long, value_name = "FILE", conflicts_with = "resume_from")]
        from_raw: Option<PathBuf>,

        /// Recompute from this stage on, reading earlier stage files
        #[arg(long, value_enum, value_name = "STAGE")]
        resume_from: Option<ResumeStage>,
    },
    /// Fetch the raw files listed under data.sources into raw_dir
    Download {
        /// Replace files already present
        #[arg(long)]
        force: bool,
    },
    /// Print the ranked index from the last run
    Show {
        #[arg(long, value_enum, default_value = "state")]
        tier: SingleTier,

        /// Only the first N jurisdictions
        #[arg(long, value_name = "N")]
        top: Option<usize>,

        /// Rank by the cost-of-living adjusted score
        #[arg(long)]
        col: bool,

        #[arg(long, value_enum, default_value = "table")]
        format: OutputFormat,
    },
    /// Write pgi_<tier>.json from the last run
    Export {
        #[arg(long, value_enum, default_value = "all")]
        tier: TierArg,
    },
    /// Write the default config file
    Init {
        /// Overwrite an existing config
        #[arg(long)]
        force: bool,
    },
}

#[derive(Parser, Debug)]
#[command(name = "public-good-index")]
#[command(about = "Public Good Index scoring for US states and cities", long_about = None)]
#[command(version)]
struct Cli {
    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Errors only
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Path to config file (defaults to ~/.config/public-good-index/config.yaml)
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

fn main() {
    let cli = Cli::parse();
    logging::init(Verbosity::from_flags(cli.verbose, cli.quiet));
    let config_path = cli.config.map(PathBuf::from);

    // init runs before loading so a broken config can be replaced
    if let Commands::Init { force } = cli.command {
        let path = match config_path.map_or_else(config::get_config_path, Ok) {
            Ok(p) => p,
            Err(e) => {
                eprintln!("Config error: {:#}", e);
                std::process::exit(EXIT_CONFIG);
            }
        };
        if let Err(e) = config::write_default_config(&path, force) {
            eprintln!("Config error: {:#}", e);
            std::process::exit(EXIT_CONFIG);
        }
        println!("Wrote default config to {}", path.display());
        std::process::exit(EXIT_SUCCESS);
    }

    let config = match config::load_config(config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {:#}", e);
            std::process::exit(EXIT_CONFIG);
        }
    };

    if let Err(errors) = config::validate(&config) {
        eprintln!("Config errors:");
        for error in errors {
            eprintln!("  - {}", error);
        }
        std::process::exit(EXIT_CONFIG);
    }

    let use_colors = output::should_use_colors();
    let processed_dir = config.data.processed_dir.clone();

    match cli.command {
        Commands::Run {
            tier,
            offline,
            no_cache,
            from_raw,
            resume_from,
        } => {
            let start_time = Instant::now();
            let options = RunOptions { offline, no_cache };
            let pipeline = match Pipeline::new(&config, &options) {
                Ok(p) => p,
                Err(e) => {
                    eprintln!("Setup failed: {:#}", e);
                    std::process::exit(EXIT_DATA);
                }
            };

            let outcomes = match (&from_raw, resume_from) {
                (Some(path), _) => pipeline.run_from_raw(path).map(|outcome| vec![outcome]),
                (None, Some(stage)) => tier
                    .tiers()
                    .into_iter()
                    .map(|t| pipeline.resume_tier(t, stage.into()))
                    .collect(),
                (None, None) => tier
                    .tiers()
                    .into_iter()
                    .map(|t| pipeline.run_tier(t))
                    .collect(),
            };
            let outcomes = match outcomes {
                Ok(o) => o,
                Err(e) => {
                    eprintln!("Run failed: {:#}", e);
                    std::process::exit(EXIT_DATA);
                }
            };

            if from_raw.is_some() && tier != TierArg::All {
                if let Some(outcome) = outcomes.first() {
                    if !tier.tiers().contains(&outcome.tier) {
                        eprintln!(
                            "Raw file holds the {} tier; --tier was ignored",
                            outcome.tier
                        );
                    }
                }
            }

            for outcome in &outcomes {
                println!("{}", output::format_run_summary(outcome, use_colors));
            }
            tracing::info!(elapsed = ?start_time.elapsed(), "run complete");
        }
        Commands::Show {
            tier,
            top,
            col,
            format,
        } => {
            let tier = Tier::from(tier);
            let path = Stage::Pgi.path(&processed_dir, tier);
            if !path.exists() {
                eprintln!(
                    "No results at {}. Run `public-good-index run --tier {}` first.",
                    path.display(),
                    tier
                );
                std::process::exit(EXIT_DATA);
            }
            let mut records = match read_pgi(&path) {
                Ok(r) => r,
                Err(e) => {
                    eprintln!("Failed to read results: {:#}", e);
                    std::process::exit(EXIT_DATA);
                }
            };

            if col {
                scoring::sort_records(&mut records, |r| r.public_good_score_col);
            }
            if let Some(n) = top {
                records.truncate(n);
            }

            match format {
                OutputFormat::Table => {
                    println!("{}", output::format_ranked_table(&records, use_colors))
                }
                OutputFormat::Tsv => {
                    let tsv = output::format_tsv(&records);
                    if !tsv.is_empty() {
                        println!("{}", tsv);
                    }
                }
            }
        }
        Commands::Export { tier } => {
            let mut written = 0;
            for t in tier.tiers() {
                let path = Stage::Pgi.path(&processed_dir, t);
                if !path.exists() {
                    if tier == TierArg::All {
                        tracing::warn!(tier = %t, "no results to export, skipping");
                        continue;
                    }
                    eprintln!(
                        "No results at {}. Run `public-good-index run --tier {}` first.",
                        path.display(),
                        t
                    );
                    std::process::exit(EXIT_DATA);
                }

                let records = match read_pgi(&path) {
                    Ok(r) => r,
                    Err(e) => {
                        eprintln!("Failed to read results: {:#}", e);
                        std::process::exit(EXIT_DATA);
                    }
                };

                let export = ScoreExport::new(t, config.data.reference_year, &records);
                let out = export_path(&processed_dir, t);
                if let Err(e) = write_export(&export, &out) {
                    eprintln!("Export failed: {:#}", e);
                    std::process::exit(EXIT_ERROR);
                }
                println!("Wrote {} scores to {}", export.scores.len(), out.display());
                written += 1;
            }

            if written == 0 {
                eprintln!("Nothing to export. Run `public-good-index run` first.");
                std::process::exit(EXIT_DATA);
            }
        }
        Commands::Download { force } => {
            if config.data.sources.is_empty() {
                eprintln!(
                    "No sources configured. Add raw file URLs under data.sources in the config."
                );
                std::process::exit(EXIT_CONFIG);
            }
            let downloader = match Downloader::new(&config.fetch) {
                Ok(d) => d,
                Err(e) => {
                    eprintln!("Setup failed: {:#}", e);
                    std::process::exit(EXIT_ERROR);
                }
            };
            let results =
                match downloader.download_all(&config.data.sources, &config.data.raw_dir, force) {
                    Ok(r) => r,
                    Err(e) => {
                        eprintln!("Download failed: {:#}", e);
                        std::process::exit(EXIT_DATA);
                    }
                };
            for result in results {
                match result.status {
                    DownloadStatus::Downloaded { bytes } => {
                        println!("Saved {} ({} bytes)", result.path.display(), bytes)
                    }
                    DownloadStatus::AlreadyPresent => {
                        println!("Kept {} (use --force to replace)", result.path.display())
                    }
                }
            }
        }
        Commands::Init { .. } => unreachable!("handled before config loading"),
    }

    std::process::exit(EXIT_SUCCESS);
}
