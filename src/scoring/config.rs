use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::jurisdiction::{Component, SpendingCategory, TaxComponent};

/// Main scoring configuration.
///
/// Every section is optional; missing sections fall back to their defaults.
///
/// Example YAML:
/// ```yaml
/// scoring:
///   scale:
///     z_range: 3.0
///   effectiveness:
///     weights: { education: 2, infrastructure: 1, public_safety: 1, child_health: 1 }
///     missing: renormalize
///   spending:
///     categories:
///       "Highways": infrastructure
///       "Employee retirement": pensions
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ScoringConfig {
    #[serde(default)]
    pub scale: ScaleConfig,

    #[serde(default)]
    pub effectiveness: EffectivenessConfig,

    #[serde(default)]
    pub spending: SpendingMap,

    #[serde(default)]
    pub tax: TaxMap,
}

/// Mapping from z-scores onto the 0-100 scale.
///
/// Clamped linear: `[-z_range, +z_range]` maps onto `[0, 100]`, anything
/// further out is pinned to the ends. The mean always lands on 50.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ScaleConfig {
    #[serde(default = "default_z_range")]
    pub z_range: f64,
}

fn default_z_range() -> f64 {
    3.0
}

impl Default for ScaleConfig {
    fn default() -> Self {
        Self {
            z_range: default_z_range(),
        }
    }
}

/// How a jurisdiction missing one of the tier's components is handled.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MissingComponentPolicy {
    /// No effectiveness score unless every component present in the tier is known
    #[default]
    Exclude,
    /// Weighted mean over whichever components the jurisdiction has
    Renormalize,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct EffectivenessConfig {
    #[serde(default)]
    pub weights: ComponentWeights,

    #[serde(default)]
    pub missing: MissingComponentPolicy,
}

/// Relative weight of each effectiveness component (all 1.0 = plain mean).
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ComponentWeights {
    #[serde(default = "default_weight")]
    pub education: f64,
    #[serde(default = "default_weight")]
    pub infrastructure: f64,
    #[serde(default = "default_weight")]
    pub public_safety: f64,
    #[serde(default = "default_weight")]
    pub child_health: f64,
}

fn default_weight() -> f64 {
    1.0
}

impl Default for ComponentWeights {
    fn default() -> Self {
        Self {
            education: 1.0,
            infrastructure: 1.0,
            public_safety: 1.0,
            child_health: 1.0,
        }
    }
}

impl ComponentWeights {
    pub fn get(&self, component: Component) -> f64 {
        match component {
            Component::Education => self.education,
            Component::Infrastructure => self.infrastructure,
            Component::PublicSafety => self.public_safety,
            Component::ChildHealth => self.child_health,
        }
    }
}

/// Census expenditure function name -> spending category.
///
/// Names are matched case-insensitively after trimming. Rows whose function
/// is not listed are ignored. Only leaf functions are listed: the "Education"
/// subtotal repeats its parts.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SpendingMap {
    pub categories: BTreeMap<String, SpendingCategory>,
}

impl Default for SpendingMap {
    fn default() -> Self {
        let categories = [
            ("Elementary and secondary education", SpendingCategory::K12Education),
            ("Higher education", SpendingCategory::HigherEducation),
            ("Children's health insurance program", SpendingCategory::Chip),
            ("Child care", SpendingCategory::ChildcareFamilyLeave),
            ("Family and medical leave", SpendingCategory::ChildcareFamilyLeave),
            ("Highways", SpendingCategory::Infrastructure),
            ("Police protection", SpendingCategory::PublicSafety),
            ("Correction", SpendingCategory::PublicSafety),
            ("Public welfare", SpendingCategory::MedicaidElderly),
            ("Nursing homes", SpendingCategory::ElderlyCare),
            ("Employee retirement", SpendingCategory::Pensions),
        ]
        .into_iter()
        .map(|(name, category)| (name.to_string(), category))
        .collect();
        Self { categories }
    }
}

impl SpendingMap {
    pub fn lookup(&self, name: &str) -> Option<SpendingCategory> {
        lookup_ignore_case(&self.categories, name)
    }
}

/// Census tax category name -> tax component.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TaxMap {
    pub categories: BTreeMap<String, TaxComponent>,
}

impl Default for TaxMap {
    fn default() -> Self {
        let categories = [
            ("Individual Income Taxes", TaxComponent::Income),
            ("Property Taxes", TaxComponent::Property),
            ("General Sales and Gross Receipts Taxes", TaxComponent::Sales),
            ("Total License Taxes", TaxComponent::Fees),
        ]
        .into_iter()
        .map(|(name, component)| (name.to_string(), component))
        .collect();
        Self { categories }
    }
}

impl TaxMap {
    pub fn lookup(&self, name: &str) -> Option<TaxComponent> {
        lookup_ignore_case(&self.categories, name)
    }
}

fn lookup_ignore_case<T: Copy>(map: &BTreeMap<String, T>, name: &str) -> Option<T> {
    let name = name.trim();
    map.iter()
        .find(|(key, _)| key.trim().eq_ignore_ascii_case(name))
        .map(|(_, value)| *value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_scoring_config() {
        let config = ScoringConfig::default();

        assert_eq!(config.scale.z_range, 3.0);
        assert_eq!(config.effectiveness.missing, MissingComponentPolicy::Exclude);
        assert_eq!(config.effectiveness.weights.get(Component::Education), 1.0);
        assert_eq!(
            config.spending.lookup("Highways"),
            Some(SpendingCategory::Infrastructure)
        );
        assert_eq!(
            config.tax.lookup("Property Taxes"),
            Some(TaxComponent::Property)
        );
        assert_eq!(config.spending.lookup("Education"), None);
    }

    #[test]
    fn test_scoring_config_serde_roundtrip() {
        let config = ScoringConfig::default();
        let yaml = serde_saphyr::to_string(&config).unwrap();
        let parsed: ScoringConfig = serde_saphyr::from_str(&yaml).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn test_partial_scoring_config_parse() {
        let yaml = r#"
scale:
  z_range: 2.5
effectiveness:
  weights:
    education: 2
  missing: renormalize
"#;
        let config: ScoringConfig = serde_saphyr::from_str(yaml).unwrap();
        assert_eq!(config.scale.z_range, 2.5);
        assert_eq!(config.effectiveness.weights.education, 2.0);
        assert_eq!(config.effectiveness.weights.child_health, 1.0);
        assert_eq!(
            config.effectiveness.missing,
            MissingComponentPolicy::Renormalize
        );
        assert_eq!(config.spending, SpendingMap::default());
    }

    #[test]
    fn test_empty_scoring_config_parse() {
        let config: ScoringConfig = serde_saphyr::from_str("{}").unwrap();
        assert_eq!(config, ScoringConfig::default());
    }

    #[test]
    fn test_unknown_field_rejected() {
        let yaml = r#"
scale:
  z_range: 3
  mode: cdf
"#;
        assert!(serde_saphyr::from_str::<ScoringConfig>(yaml).is_err());
    }

    #[test]
    fn test_custom_spending_map_replaces_default() {
        let yaml = r#"
spending:
  categories:
    "Transit": infrastructure
    "Old age assistance": elderly_care
"#;
        let config: ScoringConfig = serde_saphyr::from_str(yaml).unwrap();
        assert_eq!(config.spending.categories.len(), 2);
        assert_eq!(
            config.spending.lookup("old AGE assistance"),
            Some(SpendingCategory::ElderlyCare)
        );
        assert_eq!(config.spending.lookup("Highways"), None);
    }

    #[test]
    fn test_lookup_trims_and_ignores_case() {
        let map = TaxMap::default();
        assert_eq!(
            map.lookup("  individual income taxes "),
            Some(TaxComponent::Income)
        );
        assert_eq!(map.lookup("Severance Taxes"), None);
    }
}
