//! Per-stage CSV files in `processed_dir`.
//!
//! Each stage writes `NN_<stage>_<tier>.csv`; the next consumer finds it by
//! that name alone. Missing values are written as empty cells and read back
//! as `None`.

use anyhow::{Context, Result};
use polars::frame::DataFrame;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::frame::{
    f64_col, numeric_column, optional_numeric_column, read_csv, str_col, string_column, write_csv,
};
use crate::jurisdiction::{
    Component, Jurisdiction, OutcomeMetric, SpendingBreakdown, SpendingCategory, TaxBreakdown,
    TaxComponent, Tier,
};
use crate::scoring::{ColRow, NormalizedRow, PgiRecord, SubMetricRow, TaxBasis};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Raw,
    Col,
    SubMetrics,
    Normalized,
    Pgi,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::Raw,
        Stage::Col,
        Stage::SubMetrics,
        Stage::Normalized,
        Stage::Pgi,
    ];

    pub fn file_name(&self, tier: Tier) -> String {
        let prefix = match self {
            Stage::Raw => "01_raw",
            Stage::Col => "02_col",
            Stage::SubMetrics => "03_submetrics",
            Stage::Normalized => "04_normalized",
            Stage::Pgi => "05_pgi",
        };
        format!("{}_{}.csv", prefix, tier)
    }

    pub fn path(&self, dir: &Path, tier: Tier) -> PathBuf {
        dir.join(self.file_name(tier))
    }
}

fn ids<'a>(keys: impl Iterator<Item = &'a String>) -> Vec<Option<String>> {
    keys.map(|id| Some(id.clone())).collect()
}

fn write(columns: Vec<polars::prelude::Column>, path: &Path) -> Result<()> {
    let mut df = DataFrame::new(columns).context("[io::stages] Failed to build stage frame")?;
    write_csv(&mut df, path)
}

// --- stage 1: raw records ---------------------------------------------------

/// Write loader output. A breakdown that exists has every component column
/// filled (absent components as 0); a missing breakdown leaves them all empty.
pub fn write_raw(jurisdictions: &[Jurisdiction], tier: Tier, path: &Path) -> Result<()> {
    let mut columns = vec![
        str_col("id", jurisdictions.iter().map(|j| Some(j.id.clone())).collect()),
        str_col("name", jurisdictions.iter().map(|j| Some(j.name.clone())).collect()),
        str_col("tier", jurisdictions.iter().map(|j| Some(j.tier.to_string())).collect()),
        str_col("parent", jurisdictions.iter().map(|j| j.parent.clone()).collect()),
        f64_col("population", jurisdictions.iter().map(|j| j.population).collect()),
        f64_col("rpp", jurisdictions.iter().map(|j| j.rpp).collect()),
        f64_col(
            "personal_income",
            jurisdictions.iter().map(|j| j.personal_income).collect(),
        ),
    ];
    for component in TaxComponent::ALL {
        let values = jurisdictions
            .iter()
            .map(|j| {
                j.taxes
                    .as_ref()
                    .map(|t| t.amounts.get(&component).copied().unwrap_or(0.0))
            })
            .collect();
        columns.push(f64_col(component.column(), values));
    }
    for category in SpendingCategory::ALL {
        let values = jurisdictions
            .iter()
            .map(|j| {
                j.spending
                    .as_ref()
                    .map(|s| s.amounts.get(&category).copied().unwrap_or(0.0))
            })
            .collect();
        columns.push(f64_col(category.column(), values));
    }
    for metric in OutcomeMetric::for_tier(tier) {
        columns.push(f64_col(
            metric.column(),
            jurisdictions.iter().map(|j| j.outcome(*metric)).collect(),
        ));
    }
    write(columns, path)
}

/// Read a stage-1 file back into raw records.
///
/// # Errors
///
/// Fails when a required column is missing, the file is empty, rows mix
/// tiers, or an id repeats.
pub fn read_raw(path: &Path) -> Result<(Tier, Vec<Jurisdiction>)> {
    let df = read_csv(path)?;
    read_raw_frame(&df).with_context(|| format!("[io::stages] Invalid raw stage file {}", path.display()))
}

fn read_raw_frame(df: &DataFrame) -> Result<(Tier, Vec<Jurisdiction>)> {
    let ids = string_column(df, "id")?;
    let names = string_column(df, "name")?;
    let tiers = string_column(df, "tier")?;
    let parents = string_column(df, "parent")?;
    let population = numeric_column(df, "population")?;
    let rpp = numeric_column(df, "rpp")?;
    let income = numeric_column(df, "personal_income")?;

    let tier = tiers
        .first()
        .and_then(|t| t.as_deref())
        .and_then(Tier::parse)
        .context("first row has no valid tier")?;

    let taxes = TaxComponent::ALL
        .iter()
        .map(|c| Ok((*c, numeric_column(df, c.column())?)))
        .collect::<Result<Vec<_>>>()?;
    let spending = SpendingCategory::ALL
        .iter()
        .map(|c| Ok((*c, numeric_column(df, c.column())?)))
        .collect::<Result<Vec<_>>>()?;
    let outcomes = OutcomeMetric::for_tier(tier)
        .iter()
        .map(|m| Ok((*m, numeric_column(df, m.column())?)))
        .collect::<Result<Vec<_>>>()?;

    let mut seen = std::collections::HashSet::new();
    let mut jurisdictions = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let id = ids[i].clone().with_context(|| format!("row {} has no id", i + 1))?;
        anyhow::ensure!(seen.insert(id.clone()), "duplicate id '{}'", id);
        let row_tier = tiers[i].as_deref().and_then(Tier::parse);
        anyhow::ensure!(row_tier == Some(tier), "row '{}' is not tier {}", id, tier);

        let name = names[i].clone().unwrap_or_else(|| id.clone());
        let mut j = Jurisdiction::new(id, name, tier);
        j.parent = parents[i].clone();
        j.population = population[i];
        j.rpp = rpp[i];
        j.personal_income = income[i];

        if taxes.iter().any(|(_, values)| values[i].is_some()) {
            let mut breakdown = TaxBreakdown::default();
            for (component, values) in &taxes {
                if let Some(amount) = values[i] {
                    breakdown.add(*component, amount);
                }
            }
            j.taxes = Some(breakdown);
        }
        if spending.iter().any(|(_, values)| values[i].is_some()) {
            let mut breakdown = SpendingBreakdown::default();
            for (category, values) in &spending {
                if let Some(amount) = values[i] {
                    breakdown.add(*category, amount);
                }
            }
            j.spending = Some(breakdown);
        }
        for (metric, values) in &outcomes {
            j.outcomes.insert(*metric, values[i]);
        }
        jurisdictions.push(j);
    }

    anyhow::ensure!(!jurisdictions.is_empty(), "no rows");
    Ok((tier, jurisdictions))
}

// --- stages 2-4: intermediate tables ----------------------------------------

pub fn write_col(rows: &BTreeMap<String, ColRow>, path: &Path) -> Result<()> {
    let col = |f: fn(&ColRow) -> Option<f64>| rows.values().map(f).collect::<Vec<_>>();
    write(
        vec![
            str_col("id", ids(rows.keys())),
            f64_col("rpp", col(|r| r.rpp)),
            f64_col("col_weight", col(|r| r.col_weight)),
            f64_col("tax_per_capita", col(|r| r.tax_per_capita)),
            f64_col("tax_per_capita_adjusted", col(|r| r.tax_per_capita_adjusted)),
            f64_col("spending_per_capita", col(|r| r.spending_per_capita)),
            f64_col(
                "spending_per_capita_adjusted",
                col(|r| r.spending_per_capita_adjusted),
            ),
        ],
        path,
    )
}

pub fn write_submetrics(
    rows: &BTreeMap<String, SubMetricRow>,
    basis: TaxBasis,
    path: &Path,
) -> Result<()> {
    let col = |f: fn(&SubMetricRow) -> Option<f64>| rows.values().map(f).collect::<Vec<_>>();
    let mut columns = vec![
        str_col("id", ids(rows.keys())),
        str_col(
            "tax_basis",
            rows.values().map(|_| Some(basis.as_str().to_string())).collect(),
        ),
        f64_col("tax_burden", col(|r| r.tax_burden)),
        f64_col("investment_ratio", col(|r| r.investment_ratio)),
        f64_col("col_investment_ratio", col(|r| r.col_investment_ratio)),
    ];
    for component in Component::ALL {
        // Components dropped for the whole tier have no column
        if rows.values().any(|r| r.components.contains_key(&component)) {
            columns.push(f64_col(
                &format!("effectiveness_{}", component.as_str()),
                rows.values()
                    .map(|r| r.components.get(&component).copied().flatten())
                    .collect(),
            ));
        }
    }
    columns.push(f64_col("effectiveness", col(|r| r.effectiveness)));
    write(columns, path)
}

pub fn write_normalized(rows: &BTreeMap<String, NormalizedRow>, path: &Path) -> Result<()> {
    let col = |f: fn(&NormalizedRow) -> Option<f64>| rows.values().map(f).collect::<Vec<_>>();
    write(
        vec![
            str_col("id", ids(rows.keys())),
            f64_col("tax_score", col(|r| r.tax_score)),
            f64_col("investment_score", col(|r| r.investment_score)),
            f64_col("col_investment_score", col(|r| r.col_investment_score)),
            f64_col("effectiveness_score", col(|r| r.effectiveness_score)),
        ],
        path,
    )
}

/// Ids of a stage table, each required and unique.
fn id_column(df: &DataFrame) -> Result<Vec<String>> {
    let mut seen = std::collections::HashSet::new();
    string_column(df, "id")?
        .into_iter()
        .enumerate()
        .map(|(i, id)| {
            let id = id.with_context(|| format!("row {} has no id", i + 1))?;
            anyhow::ensure!(seen.insert(id.clone()), "duplicate id '{}'", id);
            Ok(id)
        })
        .collect()
}

pub fn read_col(path: &Path) -> Result<BTreeMap<String, ColRow>> {
    let df = read_csv(path)?;
    read_col_frame(&df)
        .with_context(|| format!("[io::stages] Invalid COL stage file {}", path.display()))
}

fn read_col_frame(df: &DataFrame) -> Result<BTreeMap<String, ColRow>> {
    let ids = id_column(df)?;
    let rpp = numeric_column(df, "rpp")?;
    let weight = numeric_column(df, "col_weight")?;
    let tax = numeric_column(df, "tax_per_capita")?;
    let tax_adjusted = numeric_column(df, "tax_per_capita_adjusted")?;
    let spending = numeric_column(df, "spending_per_capita")?;
    let spending_adjusted = numeric_column(df, "spending_per_capita_adjusted")?;

    Ok(ids
        .into_iter()
        .enumerate()
        .map(|(i, id)| {
            let row = ColRow {
                rpp: rpp[i],
                col_weight: weight[i],
                tax_per_capita: tax[i],
                tax_per_capita_adjusted: tax_adjusted[i],
                spending_per_capita: spending[i],
                spending_per_capita_adjusted: spending_adjusted[i],
            };
            (id, row)
        })
        .collect())
}

/// Read a stage-3 file. Effectiveness component columns are optional; a
/// component with no column was dropped for the whole tier.
pub fn read_submetrics(path: &Path) -> Result<(TaxBasis, BTreeMap<String, SubMetricRow>)> {
    let df = read_csv(path)?;
    read_submetrics_frame(&df)
        .with_context(|| format!("[io::stages] Invalid sub-metric stage file {}", path.display()))
}

fn read_submetrics_frame(df: &DataFrame) -> Result<(TaxBasis, BTreeMap<String, SubMetricRow>)> {
    let ids = id_column(df)?;
    let basis = string_column(df, "tax_basis")?
        .first()
        .cloned()
        .flatten()
        .context("no tax_basis")?;
    let basis = TaxBasis::parse(&basis).with_context(|| format!("unknown tax_basis '{}'", basis))?;
    let tax_burden = numeric_column(df, "tax_burden")?;
    let ratio = numeric_column(df, "investment_ratio")?;
    let col_ratio = numeric_column(df, "col_investment_ratio")?;
    let effectiveness = numeric_column(df, "effectiveness")?;

    let mut components = Vec::new();
    for component in Component::ALL {
        let name = format!("effectiveness_{}", component.as_str());
        if let Some(values) = optional_numeric_column(df, &name)? {
            components.push((component, values));
        }
    }

    let rows = ids
        .into_iter()
        .enumerate()
        .map(|(i, id)| {
            let row = SubMetricRow {
                tax_burden: tax_burden[i],
                investment_ratio: ratio[i],
                col_investment_ratio: col_ratio[i],
                effectiveness: effectiveness[i],
                components: components
                    .iter()
                    .map(|(component, values)| (*component, values[i]))
                    .collect(),
            };
            (id, row)
        })
        .collect();
    Ok((basis, rows))
}

pub fn read_normalized(path: &Path) -> Result<BTreeMap<String, NormalizedRow>> {
    let df = read_csv(path)?;
    read_normalized_frame(&df)
        .with_context(|| format!("[io::stages] Invalid normalized stage file {}", path.display()))
}

fn read_normalized_frame(df: &DataFrame) -> Result<BTreeMap<String, NormalizedRow>> {
    let ids = id_column(df)?;
    let tax = numeric_column(df, "tax_score")?;
    let investment = numeric_column(df, "investment_score")?;
    let col_investment = numeric_column(df, "col_investment_score")?;
    let effectiveness = numeric_column(df, "effectiveness_score")?;

    Ok(ids
        .into_iter()
        .enumerate()
        .map(|(i, id)| {
            let row = NormalizedRow {
                tax_score: tax[i],
                investment_score: investment[i],
                col_investment_score: col_investment[i],
                effectiveness_score: effectiveness[i],
            };
            (id, row)
        })
        .collect())
}

// --- stage 5: final index ---------------------------------------------------

/// Write PGI records in the given (ranked) order.
pub fn write_pgi(records: &[PgiRecord], path: &Path) -> Result<()> {
    let col = |f: fn(&PgiRecord) -> Option<f64>| records.iter().map(f).collect::<Vec<_>>();
    write(
        vec![
            str_col("id", records.iter().map(|r| Some(r.id.clone())).collect()),
            str_col("name", records.iter().map(|r| Some(r.name.clone())).collect()),
            str_col("parent", records.iter().map(|r| r.parent.clone()).collect()),
            f64_col("tax_score", col(|r| Some(r.tax_score))),
            f64_col("investment_score", col(|r| Some(r.investment_score))),
            f64_col("effectiveness_score", col(|r| Some(r.effectiveness_score))),
            f64_col("public_good_score", col(|r| Some(r.public_good_score))),
            f64_col("col_investment_score", col(|r| r.col_investment_score)),
            f64_col("public_good_score_col", col(|r| r.public_good_score_col)),
        ],
        path,
    )
}

/// Read a stage-5 file, preserving row order.
pub fn read_pgi(path: &Path) -> Result<Vec<PgiRecord>> {
    let df = read_csv(path)?;
    read_pgi_frame(&df).with_context(|| format!("[io::stages] Invalid PGI file {}", path.display()))
}

fn read_pgi_frame(df: &DataFrame) -> Result<Vec<PgiRecord>> {
    let ids = string_column(df, "id")?;
    let names = string_column(df, "name")?;
    let parents = string_column(df, "parent")?;
    let tax = numeric_column(df, "tax_score")?;
    let investment = numeric_column(df, "investment_score")?;
    let effectiveness = numeric_column(df, "effectiveness_score")?;
    let score = numeric_column(df, "public_good_score")?;
    let col_investment = numeric_column(df, "col_investment_score")?;
    let score_col = numeric_column(df, "public_good_score_col")?;

    (0..df.height())
        .map(|i| {
            let id = ids[i].clone().with_context(|| format!("row {} has no id", i + 1))?;
            let required = |values: &[Option<f64>], column: &str| {
                values[i].with_context(|| format!("'{}' has no {}", id, column))
            };
            Ok(PgiRecord {
                name: names[i].clone().unwrap_or_else(|| id.clone()),
                parent: parents[i].clone(),
                tax_score: required(&tax[..], "tax_score")?,
                investment_score: required(&investment[..], "investment_score")?,
                effectiveness_score: required(&effectiveness[..], "effectiveness_score")?,
                public_good_score: required(&score[..], "public_good_score")?,
                col_investment_score: col_investment[i],
                public_good_score_col: score_col[i],
                id,
            })
        })
        .collect()
}
