use std::collections::BTreeMap;

use super::config::ScaleConfig;
use crate::jurisdiction::Direction;

/// Score given to every jurisdiction when a distribution has no spread.
pub const MIDPOINT: f64 = 50.0;

/// Per-jurisdiction values of one metric. `None` marks a missing input.
pub type MetricColumn = BTreeMap<String, Option<f64>>;

/// Mean and sample standard deviation of the non-missing values of a metric.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Distribution {
    pub count: usize,
    pub mean: f64,
    /// `None` when fewer than two values are present
    pub std_dev: Option<f64>,
}

impl Distribution {
    /// Build from the finite values in `values`; `None` if there are none.
    pub fn from_values<I>(values: I) -> Option<Self>
    where
        I: IntoIterator<Item = f64>,
    {
        let values: Vec<f64> = values.into_iter().filter(|v| v.is_finite()).collect();
        if values.is_empty() {
            return None;
        }

        let count = values.len();
        let mean = values.iter().sum::<f64>() / count as f64;
        let std_dev = if count > 1 {
            let sum_sq: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
            Some((sum_sq / (count - 1) as f64).sqrt())
        } else {
            None
        };

        Some(Self {
            count,
            mean,
            std_dev,
        })
    }

    pub fn from_column(column: &MetricColumn) -> Option<Self> {
        Self::from_values(column.values().flatten().copied())
    }

    /// Signed z-score, inverted for lower-is-better metrics.
    ///
    /// A degenerate distribution (zero or undefined spread) yields 0.
    pub fn z(&self, value: f64, direction: Direction) -> f64 {
        let z = match self.std_dev {
            Some(sd) if sd > 0.0 => (value - self.mean) / sd,
            _ => 0.0,
        };
        match direction {
            Direction::HigherIsBetter => z,
            Direction::LowerIsBetter => -z,
        }
    }
}

/// Clamped linear map from z onto `[0, 100]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleMapping {
    z_range: f64,
}

impl ScaleMapping {
    pub fn new(z_range: f64) -> Self {
        Self { z_range }
    }

    pub fn from_config(config: &ScaleConfig) -> Self {
        Self::new(config.z_range)
    }

    pub fn to_score(&self, z: f64) -> f64 {
        let score = (z + self.z_range) / (2.0 * self.z_range) * 100.0;
        score.clamp(0.0, 100.0)
    }
}

impl Default for ScaleMapping {
    fn default() -> Self {
        Self::new(3.0)
    }
}

/// One jurisdiction's standardized value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Standardized {
    pub z: f64,
    pub score: f64,
}

/// Standardize a metric across the jurisdictions present in `column`.
///
/// Missing values stay missing and do not join the distribution. Output keys
/// match the input keys exactly.
pub fn standardize(
    column: &MetricColumn,
    direction: Direction,
    scale: ScaleMapping,
) -> BTreeMap<String, Option<Standardized>> {
    let Some(dist) = Distribution::from_column(column) else {
        return column.keys().map(|id| (id.clone(), None)).collect();
    };

    column
        .iter()
        .map(|(id, value)| {
            let standardized = value.filter(|v| v.is_finite()).map(|v| {
                let z = dist.z(v, direction);
                Standardized {
                    z,
                    score: scale.to_score(z),
                }
            });
            (id.clone(), standardized)
        })
        .collect()
}

/// Like [`standardize`] but keeping only the 0-100 scores.
pub fn standardize_scores(
    column: &MetricColumn,
    direction: Direction,
    scale: ScaleMapping,
) -> MetricColumn {
    standardize(column, direction, scale)
        .into_iter()
        .map(|(id, s)| (id, s.map(|s| s.score)))
        .collect()
}
