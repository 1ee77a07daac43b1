use std::collections::BTreeMap;

use super::config::ScoringConfig;
use crate::jurisdiction::Component;

/// Validate scoring configuration at startup.
/// Returns all validation errors at once (not just the first).
pub fn validate_scoring(config: &ScoringConfig) -> Result<(), Vec<String>> {
    let mut errors = Vec::new();

    let z_range = config.scale.z_range;
    if !z_range.is_finite() || z_range <= 0.0 {
        errors.push(format!(
            "scoring.scale.z_range: must be a positive number, got {}",
            z_range
        ));
    }

    let weights = &config.effectiveness.weights;
    let mut weight_sum = 0.0;
    for component in Component::ALL {
        let weight = weights.get(component);
        if !weight.is_finite() || weight < 0.0 {
            errors.push(format!(
                "scoring.effectiveness.weights.{}: must be non-negative, got {}",
                component.as_str(),
                weight
            ));
        } else {
            weight_sum += weight;
        }
    }
    if weight_sum <= 0.0 {
        errors.push("scoring.effectiveness.weights: at least one weight must be positive".to_string());
    }

    check_duplicate_names(
        config.spending.categories.keys(),
        "scoring.spending.categories",
        &mut errors,
    );
    check_duplicate_names(
        config.tax.categories.keys(),
        "scoring.tax.categories",
        &mut errors,
    );

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Category names are matched case-insensitively, so two keys differing only
/// in case or surrounding whitespace are ambiguous.
fn check_duplicate_names<'a>(
    names: impl Iterator<Item = &'a String>,
    path: &str,
    errors: &mut Vec<String>,
) {
    let mut seen: BTreeMap<String, &str> = BTreeMap::new();
    for name in names {
        let folded = name.trim().to_ascii_lowercase();
        if folded.is_empty() {
            errors.push(format!("{}: empty category name", path));
            continue;
        }
        if let Some(previous) = seen.insert(folded, name) {
            errors.push(format!(
                "{}: '{}' and '{}' name the same category",
                path, previous, name
            ));
        }
    }
}
