pub mod col;
pub mod config;
pub mod engine;
pub mod standardize;
pub mod submetrics;
pub mod validation;

pub use col::{adjust, col_rows, col_weights, ColRow, ColWeights};
pub use config::*;
pub use engine::{aggregate, normalize, sort_records, Aggregation, Exclusion, NormalizedRow, PgiRecord};
pub use standardize::{standardize, standardize_scores, Distribution, MetricColumn, ScaleMapping, Standardized, MIDPOINT};
pub use submetrics::{compute_submetrics, effectiveness, investment_ratio, tax_burden, Effectiveness, SubMetricRow, TaxBasis};
pub use validation::validate_scoring;
