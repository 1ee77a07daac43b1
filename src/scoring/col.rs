use std::collections::BTreeMap;

use super::standardize::MetricColumn;

/// Cost-of-living weights for one tier.
///
/// `weight[j] = min_rpp / rpp[j]`, so the cheapest jurisdiction gets exactly
/// 1.0 and every other known weight lies in (0, 1).
#[derive(Debug, Clone, PartialEq)]
pub struct ColWeights {
    pub min_rpp: Option<f64>,
    pub weights: MetricColumn,
}

impl ColWeights {
    pub fn get(&self, id: &str) -> Option<f64> {
        self.weights.get(id).copied().flatten()
    }

    /// Recover the weights from COL stage rows. The minimum RPP is the
    /// smallest RPP that received a weight.
    pub fn from_rows(rows: &BTreeMap<String, ColRow>) -> Self {
        let min_rpp = rows
            .values()
            .filter(|r| r.col_weight.is_some())
            .filter_map(|r| usable_rpp(r.rpp))
            .fold(None, |min: Option<f64>, v| Some(min.map_or(v, |m| m.min(v))));
        let weights = rows
            .iter()
            .map(|(id, row)| (id.clone(), row.col_weight))
            .collect();
        ColWeights { min_rpp, weights }
    }
}

fn usable_rpp(rpp: Option<f64>) -> Option<f64> {
    rpp.filter(|v| v.is_finite() && *v > 0.0)
}

/// Derive COL weights from the price parities of every jurisdiction in a tier.
///
/// Jurisdictions with an unknown or non-positive RPP get an undefined weight.
pub fn col_weights(rpp: &MetricColumn) -> ColWeights {
    let min_rpp = rpp
        .values()
        .filter_map(|v| usable_rpp(*v))
        .fold(None, |min: Option<f64>, v| Some(min.map_or(v, |m| m.min(v))));

    let weights = rpp
        .iter()
        .map(|(id, value)| {
            let weight = match (min_rpp, usable_rpp(*value)) {
                (Some(min), Some(v)) => Some(min / v),
                _ => None,
            };
            (id.clone(), weight)
        })
        .collect();

    ColWeights { min_rpp, weights }
}

/// `adjusted[j] = raw[j] * weight[j]`; undefined when either side is.
pub fn adjust(raw: &MetricColumn, weights: &ColWeights) -> MetricColumn {
    raw.iter()
        .map(|(id, value)| {
            let adjusted = match (value, weights.get(id)) {
                (Some(v), Some(w)) => Some(v * w),
                _ => None,
            };
            (id.clone(), adjusted)
        })
        .collect()
}

/// Per-jurisdiction row of the COL stage output.
#[derive(Debug, Clone, PartialEq)]
pub struct ColRow {
    pub rpp: Option<f64>,
    pub col_weight: Option<f64>,
    pub tax_per_capita: Option<f64>,
    pub tax_per_capita_adjusted: Option<f64>,
    pub spending_per_capita: Option<f64>,
    pub spending_per_capita_adjusted: Option<f64>,
}

/// Assemble COL rows from the weights and per-capita dollar columns.
pub fn col_rows(
    rpp: &MetricColumn,
    weights: &ColWeights,
    tax_per_capita: &MetricColumn,
    spending_per_capita: &MetricColumn,
) -> BTreeMap<String, ColRow> {
    let tax_adjusted = adjust(tax_per_capita, weights);
    let spending_adjusted = adjust(spending_per_capita, weights);

    rpp.iter()
        .map(|(id, value)| {
            let lookup = |column: &MetricColumn| column.get(id).copied().flatten();
            let row = ColRow {
                rpp: *value,
                col_weight: weights.get(id),
                tax_per_capita: lookup(tax_per_capita),
                tax_per_capita_adjusted: lookup(&tax_adjusted),
                spending_per_capita: lookup(spending_per_capita),
                spending_per_capita_adjusted: lookup(&spending_adjusted),
            };
            (id.clone(), row)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(values: &[(&str, Option<f64>)]) -> MetricColumn {
        values
            .iter()
            .map(|(id, v)| (id.to_string(), *v))
            .collect()
    }

    #[test]
    fn test_min_rpp_gets_weight_one() {
        let rpp = column(&[("AR", Some(86.5)), ("CA", Some(112.6)), ("TX", Some(95.3))]);
        let weights = col_weights(&rpp);

        assert_eq!(weights.min_rpp, Some(86.5));
        assert_eq!(weights.get("AR"), Some(1.0));
        for id in ["CA", "TX"] {
            let w = weights.get(id).unwrap();
            assert!(w > 0.0 && w < 1.0, "{} weight {} out of (0, 1)", id, w);
        }
    }

    #[test]
    fn test_unknown_rpp_gets_undefined_weight() {
        let rpp = column(&[("A", Some(90.0)), ("B", None), ("C", Some(0.0))]);
        let weights = col_weights(&rpp);
        assert_eq!(weights.get("A"), Some(1.0));
        assert_eq!(weights.get("B"), None);
        assert_eq!(weights.get("C"), None);
    }

    #[test]
    fn test_weights_recovered_from_rows() {
        let rpp = column(&[("AR", Some(86.5)), ("CA", Some(112.6)), ("XX", None)]);
        let weights = col_weights(&rpp);
        let empty = column(&[("AR", None), ("CA", None), ("XX", None)]);
        let rows = col_rows(&rpp, &weights, &empty, &empty);

        assert_eq!(ColWeights::from_rows(&rows), weights);
    }

    #[test]
    fn test_no_known_rpp() {
        let rpp = column(&[("A", None)]);
        let weights = col_weights(&rpp);
        assert_eq!(weights.min_rpp, None);
        assert_eq!(weights.get("A"), None);
    }

    #[test]
    fn test_adjust_leaves_min_unchanged() {
        let rpp = column(&[("cheap", Some(80.0)), ("dear", Some(120.0))]);
        let weights = col_weights(&rpp);
        let raw = column(&[("cheap", Some(0.6)), ("dear", Some(0.6))]);
        let adjusted = adjust(&raw, &weights);

        assert_eq!(adjusted["cheap"], Some(0.6));
        assert!((adjusted["dear"].unwrap() - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_adjust_missing_raw_or_weight() {
        let rpp = column(&[("A", Some(100.0)), ("B", None)]);
        let weights = col_weights(&rpp);
        let raw = column(&[("A", None), ("B", Some(5.0))]);
        let adjusted = adjust(&raw, &weights);
        assert_eq!(adjusted["A"], None);
        assert_eq!(adjusted["B"], None);
    }

    #[test]
    fn test_col_rows() {
        let rpp = column(&[("A", Some(90.0)), ("B", Some(120.0))]);
        let weights = col_weights(&rpp);
        let tax = column(&[("A", Some(1000.0)), ("B", Some(1200.0))]);
        let spending = column(&[("A", None), ("B", Some(4000.0))]);
        let rows = col_rows(&rpp, &weights, &tax, &spending);

        assert_eq!(rows["A"].col_weight, Some(1.0));
        assert_eq!(rows["A"].tax_per_capita_adjusted, Some(1000.0));
        assert_eq!(rows["A"].spending_per_capita_adjusted, None);
        assert!((rows["B"].tax_per_capita_adjusted.unwrap() - 900.0).abs() < 1e-9);
        assert!((rows["B"].spending_per_capita_adjusted.unwrap() - 3000.0).abs() < 1e-9);
    }
}
