use std::collections::BTreeMap;
use tracing::{debug, info};

use super::col::ColWeights;
use super::config::{EffectivenessConfig, MissingComponentPolicy};
use super::standardize::{standardize_scores, MetricColumn, ScaleMapping};
use crate::jurisdiction::{Component, Jurisdiction, OutcomeMetric, SpendingBreakdown, Tier};

/// Denominator used for the tax burden of a tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaxBasis {
    /// Tax revenue / personal income (a rate)
    PersonalIncome,
    /// Tax revenue / population (dollars per resident)
    PerCapita,
}

impl TaxBasis {
    /// States are always measured against personal income. Cities use it only
    /// when every city has an income figure, so the whole tier shares one basis.
    pub fn infer(tier: Tier, jurisdictions: &[Jurisdiction]) -> Self {
        match tier {
            Tier::State => TaxBasis::PersonalIncome,
            Tier::City => {
                if !jurisdictions.is_empty()
                    && jurisdictions.iter().all(|j| j.personal_income.is_some())
                {
                    TaxBasis::PersonalIncome
                } else {
                    TaxBasis::PerCapita
                }
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaxBasis::PersonalIncome => "personal_income",
            TaxBasis::PerCapita => "per_capita",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "personal_income" => Some(TaxBasis::PersonalIncome),
            "per_capita" => Some(TaxBasis::PerCapita),
            _ => None,
        }
    }
}

/// Total tax collections over the tier's basis. Higher means more burden.
pub fn tax_burden(jurisdiction: &Jurisdiction, basis: TaxBasis) -> Option<f64> {
    let total = jurisdiction.taxes.as_ref()?.total();
    let denominator = match basis {
        TaxBasis::PersonalIncome => jurisdiction.personal_income?,
        TaxBasis::PerCapita => jurisdiction.population?,
    };
    if denominator > 0.0 && total.is_finite() && total >= 0.0 {
        Some(total / denominator)
    } else {
        None
    }
}

/// Investment spending / (investment + cost spending), always within [0, 1].
pub fn investment_ratio(spending: Option<&SpendingBreakdown>) -> Option<f64> {
    let spending = spending?;
    let investment = spending.investment();
    let cost = spending.cost();
    if investment < 0.0 || cost < 0.0 {
        return None;
    }
    let total = investment + cost;
    if total > 0.0 && total.is_finite() {
        Some(investment / total)
    } else {
        None
    }
}

/// Combine values under the missing-component policy.
///
/// `entries` pairs each value with its weight. Under `Exclude` any missing
/// entry makes the result missing.
fn combine(entries: &[(Option<f64>, f64)], policy: MissingComponentPolicy) -> Option<f64> {
    if policy == MissingComponentPolicy::Exclude && entries.iter().any(|(v, _)| v.is_none()) {
        return None;
    }
    let (sum, weight_sum) = entries
        .iter()
        .filter_map(|(v, w)| v.map(|v| (v * w, *w)))
        .fold((0.0, 0.0), |(s, ws), (v, w)| (s + v, ws + w));
    if weight_sum > 0.0 {
        Some(sum / weight_sum)
    } else {
        None
    }
}

/// Effectiveness of one jurisdiction: per-component scores and the composite.
#[derive(Debug, Clone, PartialEq)]
pub struct Effectiveness {
    pub components: BTreeMap<Component, Option<f64>>,
    pub composite: Option<f64>,
}

/// Second-order effectiveness aggregate for a whole tier.
///
/// Each raw metric is standardized to 0-100 within the tier, a component is
/// the mean of its metrics, and the composite is the weighted mean of the
/// components. Components with no data anywhere in the tier are dropped.
pub fn effectiveness(
    tier: Tier,
    jurisdictions: &[Jurisdiction],
    config: &EffectivenessConfig,
    scale: ScaleMapping,
) -> BTreeMap<String, Effectiveness> {
    let policy = config.missing;

    let metric_scores: BTreeMap<OutcomeMetric, MetricColumn> = OutcomeMetric::for_tier(tier)
        .iter()
        .filter_map(|metric| {
            let column: MetricColumn = jurisdictions
                .iter()
                .map(|j| (j.id.clone(), j.outcome(*metric)))
                .collect();
            if column.values().all(Option::is_none) {
                debug!(metric = metric.column(), %tier, "no data for metric, skipping");
                return None;
            }
            Some((*metric, standardize_scores(&column, metric.direction(), scale)))
        })
        .collect();

    let present: Vec<Component> = Component::ALL
        .into_iter()
        .filter(|c| metric_scores.keys().any(|m| m.component() == *c))
        .collect();
    for component in Component::ALL {
        if !present.contains(&component) {
            info!(component = component.as_str(), %tier, "component has no data in this tier, dropped from effectiveness");
        }
    }

    jurisdictions
        .iter()
        .map(|j| {
            let components: BTreeMap<Component, Option<f64>> = present
                .iter()
                .map(|component| {
                    let entries: Vec<(Option<f64>, f64)> = metric_scores
                        .iter()
                        .filter(|(metric, _)| metric.component() == *component)
                        .map(|(_, scores)| (scores.get(&j.id).copied().flatten(), 1.0))
                        .collect();
                    (*component, combine(&entries, policy))
                })
                .collect();

            let weighted: Vec<(Option<f64>, f64)> = components
                .iter()
                .map(|(component, score)| (*score, config.weights.get(*component)))
                .filter(|(_, weight)| *weight > 0.0)
                .collect();
            let composite = combine(&weighted, policy);
            if composite.is_none() {
                debug!(jurisdiction = %j.id, "effectiveness missing");
            }

            (j.id.clone(), Effectiveness { components, composite })
        })
        .collect()
}

/// Per-jurisdiction row of the sub-metric stage output.
#[derive(Debug, Clone, PartialEq)]
pub struct SubMetricRow {
    pub tax_burden: Option<f64>,
    pub investment_ratio: Option<f64>,
    pub col_investment_ratio: Option<f64>,
    pub effectiveness: Option<f64>,
    pub components: BTreeMap<Component, Option<f64>>,
}

/// Compute all three sub-metrics (plus the COL-adjusted investment ratio).
pub fn compute_submetrics(
    tier: Tier,
    jurisdictions: &[Jurisdiction],
    basis: TaxBasis,
    weights: &ColWeights,
    config: &EffectivenessConfig,
    scale: ScaleMapping,
) -> BTreeMap<String, SubMetricRow> {
    let mut effectiveness = effectiveness(tier, jurisdictions, config, scale);

    jurisdictions
        .iter()
        .map(|j| {
            let ratio = investment_ratio(j.spending.as_ref());
            let col_ratio = match (ratio, weights.get(&j.id)) {
                (Some(r), Some(w)) => Some(r * w),
                _ => None,
            };
            let eff = effectiveness.remove(&j.id);
            let row = SubMetricRow {
                tax_burden: tax_burden(j, basis),
                investment_ratio: ratio,
                col_investment_ratio: col_ratio,
                effectiveness: eff.as_ref().and_then(|e| e.composite),
                components: eff.map(|e| e.components).unwrap_or_default(),
            };
            (j.id.clone(), row)
        })
        .collect()
}
