use anyhow::{Context, Result};
use atomic_write_file::AtomicWriteFile;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::jurisdiction::Tier;
use crate::scoring::PgiRecord;

/// Jurisdiction -> score mapping for visualization front ends.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoreExport {
    pub tier: Tier,
    pub reference_year: u16,
    pub generated_at: DateTime<Utc>,
    pub scores: BTreeMap<String, f64>,
    /// Omitted when no jurisdiction has a COL-adjusted score
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub scores_col: BTreeMap<String, f64>,
}

impl ScoreExport {
    pub fn new(tier: Tier, reference_year: u16, records: &[PgiRecord]) -> Self {
        Self {
            tier,
            reference_year,
            generated_at: Utc::now(),
            scores: records
                .iter()
                .map(|r| (r.id.clone(), r.public_good_score))
                .collect(),
            scores_col: records
                .iter()
                .filter_map(|r| r.public_good_score_col.map(|s| (r.id.clone(), s)))
                .collect(),
        }
    }
}

/// `<dir>/pgi_<tier>.json`
pub fn export_path(dir: &Path, tier: Tier) -> PathBuf {
    dir.join(format!("pgi_{}.json", tier))
}

/// Write the export atomically, pretty-printed.
pub fn write_export(export: &ScoreExport, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create export directory at {}", parent.display()))?;
    }

    let mut file = AtomicWriteFile::open(path)
        .with_context(|| format!("Failed to open atomic write file at {}", path.display()))?;

    serde_json::to_writer_pretty(&mut file, export).context("Failed to serialize score export")?;

    file.commit()
        .with_context(|| format!("Failed to save score export to {}", path.display()))?;

    Ok(())
}
