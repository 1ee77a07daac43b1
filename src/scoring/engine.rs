use std::cmp::Ordering;
use std::collections::BTreeMap;
use tracing::debug;

use super::standardize::{standardize_scores, MetricColumn, ScaleMapping};
use super::submetrics::SubMetricRow;
use crate::jurisdiction::{Direction, Jurisdiction};

/// Sub-metrics mapped onto the 0-100 scale, 100 = more public good.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRow {
    pub tax_score: Option<f64>,
    pub investment_score: Option<f64>,
    pub col_investment_score: Option<f64>,
    pub effectiveness_score: Option<f64>,
}

/// Standardize each sub-metric across the jurisdictions of the current run.
///
/// Tax burden is lower-is-better; the other sub-metrics are higher-is-better.
/// The COL-adjusted investment ratio has its own distribution, so a
/// jurisdiction with unknown RPP drops out of it without affecting the raw one.
pub fn normalize(
    submetrics: &BTreeMap<String, SubMetricRow>,
    scale: ScaleMapping,
) -> BTreeMap<String, NormalizedRow> {
    let column = |f: fn(&SubMetricRow) -> Option<f64>| -> MetricColumn {
        submetrics.iter().map(|(id, row)| (id.clone(), f(row))).collect()
    };

    let tax = standardize_scores(&column(|r| r.tax_burden), Direction::LowerIsBetter, scale);
    let investment = standardize_scores(
        &column(|r| r.investment_ratio),
        Direction::HigherIsBetter,
        scale,
    );
    let col_investment = standardize_scores(
        &column(|r| r.col_investment_ratio),
        Direction::HigherIsBetter,
        scale,
    );
    let effectiveness = standardize_scores(
        &column(|r| r.effectiveness),
        Direction::HigherIsBetter,
        scale,
    );

    submetrics
        .keys()
        .map(|id| {
            let get = |scores: &MetricColumn| scores.get(id).copied().flatten();
            let row = NormalizedRow {
                tax_score: get(&tax),
                investment_score: get(&investment),
                col_investment_score: get(&col_investment),
                effectiveness_score: get(&effectiveness),
            };
            (id.clone(), row)
        })
        .collect()
}

/// Final Public Good Index record for one jurisdiction.
#[derive(Debug, Clone, PartialEq)]
pub struct PgiRecord {
    pub id: String,
    pub name: String,
    pub parent: Option<String>,
    pub tax_score: f64,
    pub investment_score: f64,
    pub effectiveness_score: f64,
    pub public_good_score: f64,
    pub col_investment_score: Option<f64>,
    pub public_good_score_col: Option<f64>,
}

/// A jurisdiction left out of the index and the sub-scores it lacked.
#[derive(Debug, Clone, PartialEq)]
pub struct Exclusion {
    pub id: String,
    pub missing: Vec<&'static str>,
}

#[derive(Debug, Clone, Default)]
pub struct Aggregation {
    /// Sorted by score descending, then id ascending
    pub records: Vec<PgiRecord>,
    pub excluded: Vec<Exclusion>,
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Average the three normalized sub-scores into the index.
///
/// A jurisdiction missing any of the three is excluded entirely; the mean is
/// never taken over a partial set. The COL variant substitutes the COL
/// investment score and is left empty when that score is unknown.
pub fn aggregate(
    jurisdictions: &[Jurisdiction],
    normalized: &BTreeMap<String, NormalizedRow>,
) -> Aggregation {
    let mut records = Vec::new();
    let mut excluded = Vec::new();

    for j in jurisdictions {
        let Some(row) = normalized.get(&j.id) else {
            excluded.push(Exclusion {
                id: j.id.clone(),
                missing: vec!["tax_score", "investment_score", "effectiveness_score"],
            });
            continue;
        };

        let (tax, investment, effectiveness) =
            match (row.tax_score, row.investment_score, row.effectiveness_score) {
                (Some(t), Some(i), Some(e)) => (t, i, e),
                _ => {
                    let missing: Vec<&'static str> = [
                        ("tax_score", row.tax_score),
                        ("investment_score", row.investment_score),
                        ("effectiveness_score", row.effectiveness_score),
                    ]
                    .into_iter()
                    .filter(|(_, v)| v.is_none())
                    .map(|(name, _)| name)
                    .collect();
                    debug!(jurisdiction = %j.id, ?missing, "excluded from index");
                    excluded.push(Exclusion {
                        id: j.id.clone(),
                        missing,
                    });
                    continue;
                }
            };

        records.push(PgiRecord {
            id: j.id.clone(),
            name: j.name.clone(),
            parent: j.parent.clone(),
            tax_score: tax,
            investment_score: investment,
            effectiveness_score: effectiveness,
            public_good_score: mean(&[tax, investment, effectiveness]),
            col_investment_score: row.col_investment_score,
            public_good_score_col: row
                .col_investment_score
                .map(|col| mean(&[tax, col, effectiveness])),
        });
    }

    sort_records(&mut records, |r| Some(r.public_good_score));

    Aggregation { records, excluded }
}

/// Sort by the chosen score descending (missing last), then by id.
pub fn sort_records<F>(records: &mut [PgiRecord], key: F)
where
    F: Fn(&PgiRecord) -> Option<f64>,
{
    records.sort_by(|a, b| {
        let score_cmp = match (key(a), key(b)) {
            (Some(x), Some(y)) => y.partial_cmp(&x).unwrap_or(Ordering::Equal),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        if score_cmp != Ordering::Equal {
            return score_cmp;
        }
        a.id.cmp(&b.id)
    });
}
