//! Runs the scoring stages in order for one tier:
//! loaders -> COL normalizer -> sub-metrics -> standardizer -> aggregator.
//!
//! Every stage consumes the previous stage's output by value and writes its
//! own stage file when an output directory is given. [`resume_tier`] instead
//! reads the earlier stages back from those files.

use anyhow::Result;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::io::stages::{self, Stage};
use crate::jurisdiction::{Jurisdiction, Tier};
use crate::loaders::{self, FeedCache, FeedClient, LoadContext, ReferenceTables};
use crate::scoring::{
    aggregate, col_rows, col_weights, compute_submetrics, normalize, Aggregation, ColWeights,
    MetricColumn, NormalizedRow, ScaleMapping, ScoringConfig, SubMetricRow, TaxBasis,
};

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Never touch the network
    pub offline: bool,
    /// Bypass the feed cache for reads and writes
    pub no_cache: bool,
}

/// Result of scoring one tier.
#[derive(Debug, Clone)]
pub struct TierOutcome {
    pub tier: Tier,
    pub basis: TaxBasis,
    pub loaded: usize,
    pub aggregation: Aggregation,
    /// Stage files written, in stage order
    pub stage_files: Vec<PathBuf>,
}

pub struct Pipeline<'a> {
    config: &'a Config,
    tables: ReferenceTables,
    feeds: Option<FeedClient>,
}

impl<'a> Pipeline<'a> {
    pub fn new(config: &'a Config, options: &RunOptions) -> Result<Self> {
        let tables = ReferenceTables::bundled(config.data.reference_year)?;

        let feeds = if options.offline || !config.fetch.enabled {
            debug!("network feeds disabled");
            None
        } else {
            let cache = (config.fetch.cache && !options.no_cache)
                .then(|| FeedCache::new(loaders::get_cache_path()));
            Some(FeedClient::new(
                &config.fetch,
                cache,
                config.data.reference_year,
            )?)
        };

        Ok(Self {
            config,
            tables,
            feeds,
        })
    }

    /// Load a tier from its sources and score it.
    pub fn run_tier(&self, tier: Tier) -> Result<TierOutcome> {
        let ctx = LoadContext {
            tables: &self.tables,
            raw_dir: &self.config.data.raw_dir,
            feeds: self.feeds.as_ref(),
            scoring: &self.config.scoring,
        };
        let jurisdictions = loaders::load_tier(tier, &ctx)?;
        score_tier(
            tier,
            jurisdictions,
            &self.config.scoring,
            Some(self.config.data.processed_dir.as_path()),
        )
    }

    /// Re-run a tier from `stage`, reading earlier stage files from the
    /// processed directory.
    pub fn resume_tier(&self, tier: Tier, stage: Stage) -> Result<TierOutcome> {
        resume_tier(
            tier,
            stage,
            &self.config.scoring,
            &self.config.data.processed_dir,
        )
    }

    /// Score a tier starting from a previously written stage-1 file.
    pub fn run_from_raw(&self, path: &Path) -> Result<TierOutcome> {
        let (tier, jurisdictions) = stages::read_raw(path)?;
        info!(%tier, count = jurisdictions.len(), path = %path.display(), "loaded raw stage file");
        score_tier(
            tier,
            jurisdictions,
            &self.config.scoring,
            Some(self.config.data.processed_dir.as_path()),
        )
    }
}

fn column(jurisdictions: &[Jurisdiction], f: impl Fn(&Jurisdiction) -> Option<f64>) -> MetricColumn {
    jurisdictions.iter().map(|j| (j.id.clone(), f(j))).collect()
}

/// Stage files written during one run.
struct StageFiles<'p> {
    tier: Tier,
    dir: Option<&'p Path>,
    written: Vec<PathBuf>,
}

impl<'p> StageFiles<'p> {
    fn new(tier: Tier, dir: Option<&'p Path>) -> Self {
        Self {
            tier,
            dir,
            written: Vec::new(),
        }
    }

    fn write(&mut self, stage: Stage, f: impl FnOnce(&Path) -> Result<()>) -> Result<()> {
        if let Some(dir) = self.dir {
            let path = stage.path(dir, self.tier);
            f(&path)?;
            self.written.push(path);
        }
        Ok(())
    }
}

/// Run every scoring stage over loaded jurisdictions.
///
/// With `output_dir`, each stage's table is written there as
/// `NN_<stage>_<tier>.csv`.
pub fn score_tier(
    tier: Tier,
    jurisdictions: Vec<Jurisdiction>,
    scoring: &ScoringConfig,
    output_dir: Option<&Path>,
) -> Result<TierOutcome> {
    let mut files = StageFiles::new(tier, output_dir);
    files.write(Stage::Raw, |path| stages::write_raw(&jurisdictions, tier, path))?;
    let weights = col_stage(&jurisdictions, &mut files)?;
    submetric_stage(jurisdictions, &weights, scoring, files)
}

/// Stage 2: cost of living.
fn col_stage(jurisdictions: &[Jurisdiction], files: &mut StageFiles<'_>) -> Result<ColWeights> {
    let rpp = column(jurisdictions, |j| j.rpp);
    let weights = col_weights(&rpp);
    let tax_per_capita = column(jurisdictions, |j| {
        j.per_capita(j.taxes.as_ref().map(|t| t.total()))
    });
    let spending_per_capita = column(jurisdictions, |j| {
        j.per_capita(j.spending.as_ref().map(|s| s.total()))
    });
    let col = col_rows(&rpp, &weights, &tax_per_capita, &spending_per_capita);
    debug!(
        tier = %files.tier,
        min_rpp = ?weights.min_rpp,
        without_weight = weights.weights.values().filter(|w| w.is_none()).count(),
        "cost-of-living weights"
    );
    files.write(Stage::Col, |path| stages::write_col(&col, path))?;
    Ok(weights)
}

/// Stage 3 onwards.
fn submetric_stage(
    jurisdictions: Vec<Jurisdiction>,
    weights: &ColWeights,
    scoring: &ScoringConfig,
    mut files: StageFiles<'_>,
) -> Result<TierOutcome> {
    let tier = files.tier;
    let scale = ScaleMapping::from_config(&scoring.scale);
    let basis = TaxBasis::infer(tier, &jurisdictions);
    info!(%tier, basis = basis.as_str(), "tax burden basis");
    let submetrics = compute_submetrics(
        tier,
        &jurisdictions,
        basis,
        weights,
        &scoring.effectiveness,
        scale,
    );
    files.write(Stage::SubMetrics, |path| {
        stages::write_submetrics(&submetrics, basis, path)
    })?;
    normalize_stage(jurisdictions, basis, &submetrics, scale, files)
}

/// Stage 4 onwards.
fn normalize_stage(
    jurisdictions: Vec<Jurisdiction>,
    basis: TaxBasis,
    submetrics: &BTreeMap<String, SubMetricRow>,
    scale: ScaleMapping,
    mut files: StageFiles<'_>,
) -> Result<TierOutcome> {
    let normalized = normalize(submetrics, scale);
    files.write(Stage::Normalized, |path| {
        stages::write_normalized(&normalized, path)
    })?;
    aggregate_stage(jurisdictions, basis, &normalized, files)
}

/// Stage 5.
fn aggregate_stage(
    jurisdictions: Vec<Jurisdiction>,
    basis: TaxBasis,
    normalized: &BTreeMap<String, NormalizedRow>,
    mut files: StageFiles<'_>,
) -> Result<TierOutcome> {
    let tier = files.tier;
    let aggregation = aggregate(&jurisdictions, normalized);
    files.write(Stage::Pgi, |path| stages::write_pgi(&aggregation.records, path))?;

    info!(
        %tier,
        scored = aggregation.records.len(),
        excluded = aggregation.excluded.len(),
        "index computed"
    );
    if aggregation.records.is_empty() {
        warn!(%tier, "no jurisdiction has all three sub-scores; check raw inputs");
    }

    Ok(TierOutcome {
        tier,
        basis,
        loaded: jurisdictions.len(),
        aggregation,
        stage_files: files.written,
    })
}

/// Re-run a tier from `stage` onwards, reading each earlier stage's output
/// from `dir` by file name.
///
/// The stage-1 file is always read: it names the jurisdictions and carries
/// their display names. Resuming at [`Stage::Raw`] or [`Stage::Col`]
/// recomputes everything after stage 1.
pub fn resume_tier(
    tier: Tier,
    stage: Stage,
    scoring: &ScoringConfig,
    dir: &Path,
) -> Result<TierOutcome> {
    let (raw_tier, jurisdictions) = stages::read_raw(&Stage::Raw.path(dir, tier))?;
    anyhow::ensure!(
        raw_tier == tier,
        "{} holds the {} tier",
        Stage::Raw.file_name(tier),
        raw_tier
    );
    info!(%tier, ?stage, count = jurisdictions.len(), "resuming from stage files");

    let mut files = StageFiles::new(tier, Some(dir));
    let scale = ScaleMapping::from_config(&scoring.scale);
    match stage {
        Stage::Raw | Stage::Col => {
            let weights = col_stage(&jurisdictions, &mut files)?;
            submetric_stage(jurisdictions, &weights, scoring, files)
        }
        Stage::SubMetrics => {
            let col = stages::read_col(&Stage::Col.path(dir, tier))?;
            let weights = ColWeights::from_rows(&col);
            submetric_stage(jurisdictions, &weights, scoring, files)
        }
        Stage::Normalized => {
            let (basis, submetrics) = stages::read_submetrics(&Stage::SubMetrics.path(dir, tier))?;
            normalize_stage(jurisdictions, basis, &submetrics, scale, files)
        }
        Stage::Pgi => {
            let (basis, _) = stages::read_submetrics(&Stage::SubMetrics.path(dir, tier))?;
            let normalized = stages::read_normalized(&Stage::Normalized.path(dir, tier))?;
            aggregate_stage(jurisdictions, basis, &normalized, files)
        }
    }
}
