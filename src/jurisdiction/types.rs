use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Level of government a jurisdiction belongs to.
///
/// Every cross-jurisdiction distribution (COL minimum, z-scores) is computed
/// within a single tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    State,
    City,
}

impl Tier {
    pub const ALL: [Tier; 2] = [Tier::State, Tier::City];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::State => "state",
            Tier::City => "city",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "state" => Some(Tier::State),
            "city" => Some(Tier::City),
            _ => None,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tax components summed into the tax burden numerator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxComponent {
    Income,
    Property,
    Sales,
    Fees,
    Payroll,
    /// Total tax revenue reported without a per-tax split (city sources)
    General,
}

impl TaxComponent {
    pub const ALL: [TaxComponent; 6] = [
        TaxComponent::Income,
        TaxComponent::Property,
        TaxComponent::Sales,
        TaxComponent::Fees,
        TaxComponent::Payroll,
        TaxComponent::General,
    ];

    pub fn column(&self) -> &'static str {
        match self {
            TaxComponent::Income => "tax_income",
            TaxComponent::Property => "tax_property",
            TaxComponent::Sales => "tax_sales",
            TaxComponent::Fees => "tax_fees",
            TaxComponent::Payroll => "tax_payroll",
            TaxComponent::General => "tax_general",
        }
    }
}

/// Which side of the investment ratio a spending category falls on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpendingSide {
    Investment,
    Cost,
}

/// Fixed spending categories.
///
/// `GeneralInvestment` / `GeneralCost` hold aggregates from sources that only
/// publish the investment/cost split, not the functional breakdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpendingCategory {
    K12Education,
    HigherEducation,
    Chip,
    ChildcareFamilyLeave,
    Infrastructure,
    PublicSafety,
    GeneralInvestment,
    SocialSecurity,
    ElderlyCare,
    MedicaidElderly,
    Pensions,
    GeneralCost,
}

impl SpendingCategory {
    pub const ALL: [SpendingCategory; 12] = [
        SpendingCategory::K12Education,
        SpendingCategory::HigherEducation,
        SpendingCategory::Chip,
        SpendingCategory::ChildcareFamilyLeave,
        SpendingCategory::Infrastructure,
        SpendingCategory::PublicSafety,
        SpendingCategory::GeneralInvestment,
        SpendingCategory::SocialSecurity,
        SpendingCategory::ElderlyCare,
        SpendingCategory::MedicaidElderly,
        SpendingCategory::Pensions,
        SpendingCategory::GeneralCost,
    ];

    pub fn side(&self) -> SpendingSide {
        match self {
            SpendingCategory::K12Education
            | SpendingCategory::HigherEducation
            | SpendingCategory::Chip
            | SpendingCategory::ChildcareFamilyLeave
            | SpendingCategory::Infrastructure
            | SpendingCategory::PublicSafety
            | SpendingCategory::GeneralInvestment => SpendingSide::Investment,
            SpendingCategory::SocialSecurity
            | SpendingCategory::ElderlyCare
            | SpendingCategory::MedicaidElderly
            | SpendingCategory::Pensions
            | SpendingCategory::GeneralCost => SpendingSide::Cost,
        }
    }

    pub fn column(&self) -> &'static str {
        match self {
            SpendingCategory::K12Education => "spend_k12_education",
            SpendingCategory::HigherEducation => "spend_higher_education",
            SpendingCategory::Chip => "spend_chip",
            SpendingCategory::ChildcareFamilyLeave => "spend_childcare_family_leave",
            SpendingCategory::Infrastructure => "spend_infrastructure",
            SpendingCategory::PublicSafety => "spend_public_safety",
            SpendingCategory::GeneralInvestment => "spend_general_investment",
            SpendingCategory::SocialSecurity => "spend_social_security",
            SpendingCategory::ElderlyCare => "spend_elderly_care",
            SpendingCategory::MedicaidElderly => "spend_medicaid_elderly",
            SpendingCategory::Pensions => "spend_pensions",
            SpendingCategory::GeneralCost => "spend_general_cost",
        }
    }
}

/// Effectiveness components combined into the composite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Component {
    Education,
    Infrastructure,
    PublicSafety,
    ChildHealth,
}

impl Component {
    pub const ALL: [Component; 4] = [
        Component::Education,
        Component::Infrastructure,
        Component::PublicSafety,
        Component::ChildHealth,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Component::Education => "education",
            Component::Infrastructure => "infrastructure",
            Component::PublicSafety => "public_safety",
            Component::ChildHealth => "child_health",
        }
    }
}

/// Whether a larger raw value means more or less public good.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    HigherIsBetter,
    LowerIsBetter,
}

/// Raw outcome metrics, each belonging to exactly one effectiveness component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeMetric {
    NaepMath,
    NaepReading,
    BachelorsPct,
    HsGradPct,
    InfrastructureGpa,
    ViolentCrime,
    InfantMortality,
    HealthIndex,
}

impl OutcomeMetric {
    pub const ALL: [OutcomeMetric; 8] = [
        OutcomeMetric::NaepMath,
        OutcomeMetric::NaepReading,
        OutcomeMetric::BachelorsPct,
        OutcomeMetric::HsGradPct,
        OutcomeMetric::InfrastructureGpa,
        OutcomeMetric::ViolentCrime,
        OutcomeMetric::InfantMortality,
        OutcomeMetric::HealthIndex,
    ];

    /// Metrics sourced for a tier, in column order.
    pub fn for_tier(tier: Tier) -> &'static [OutcomeMetric] {
        match tier {
            Tier::State => &[
                OutcomeMetric::NaepMath,
                OutcomeMetric::NaepReading,
                OutcomeMetric::InfrastructureGpa,
                OutcomeMetric::ViolentCrime,
                OutcomeMetric::InfantMortality,
            ],
            Tier::City => &[
                OutcomeMetric::BachelorsPct,
                OutcomeMetric::HsGradPct,
                OutcomeMetric::ViolentCrime,
                OutcomeMetric::HealthIndex,
            ],
        }
    }

    pub fn component(&self) -> Component {
        match self {
            OutcomeMetric::NaepMath
            | OutcomeMetric::NaepReading
            | OutcomeMetric::BachelorsPct
            | OutcomeMetric::HsGradPct => Component::Education,
            OutcomeMetric::InfrastructureGpa => Component::Infrastructure,
            OutcomeMetric::ViolentCrime => Component::PublicSafety,
            OutcomeMetric::InfantMortality | OutcomeMetric::HealthIndex => Component::ChildHealth,
        }
    }

    pub fn direction(&self) -> Direction {
        match self {
            OutcomeMetric::ViolentCrime | OutcomeMetric::InfantMortality => Direction::LowerIsBetter,
            _ => Direction::HigherIsBetter,
        }
    }

    pub fn column(&self) -> &'static str {
        match self {
            OutcomeMetric::NaepMath => "naep_math",
            OutcomeMetric::NaepReading => "naep_reading",
            OutcomeMetric::BachelorsPct => "bachelors_pct",
            OutcomeMetric::HsGradPct => "hs_grad_pct",
            OutcomeMetric::InfrastructureGpa => "infrastructure_gpa",
            OutcomeMetric::ViolentCrime => "violent_crime",
            OutcomeMetric::InfantMortality => "infant_mortality",
            OutcomeMetric::HealthIndex => "health_index",
        }
    }
}

/// Tax collections by component, in dollars.
///
/// A component absent from the map counts as zero; the absence of the whole
/// breakdown (`Option::None` on the jurisdiction) is what marks tax data missing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaxBreakdown {
    pub amounts: BTreeMap<TaxComponent, f64>,
}

impl TaxBreakdown {
    pub fn add(&mut self, component: TaxComponent, amount: f64) {
        *self.amounts.entry(component).or_insert(0.0) += amount;
    }

    pub fn total(&self) -> f64 {
        self.amounts.values().sum()
    }
}

/// Spending by category, in dollars. Absent categories count as zero.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpendingBreakdown {
    pub amounts: BTreeMap<SpendingCategory, f64>,
}

impl SpendingBreakdown {
    pub fn add(&mut self, category: SpendingCategory, amount: f64) {
        *self.amounts.entry(category).or_insert(0.0) += amount;
    }

    fn side_total(&self, side: SpendingSide) -> f64 {
        self.amounts
            .iter()
            .filter(|(category, _)| category.side() == side)
            .map(|(_, amount)| amount)
            .sum()
    }

    pub fn investment(&self) -> f64 {
        self.side_total(SpendingSide::Investment)
    }

    pub fn cost(&self) -> f64 {
        self.side_total(SpendingSide::Cost)
    }

    pub fn total(&self) -> f64 {
        self.investment() + self.cost()
    }
}

/// Raw per-jurisdiction record produced by the loaders.
///
/// `None` always means "source unavailable", never zero.
#[derive(Debug, Clone, PartialEq)]
pub struct Jurisdiction {
    /// "CA" for states, "Los Angeles, CA" for cities
    pub id: String,
    pub name: String,
    pub tier: Tier,
    /// Parent state code (cities only), resolved at load time
    pub parent: Option<String>,
    pub population: Option<f64>,
    /// Regional price parity; cities carry their parent state's value
    pub rpp: Option<f64>,
    /// Personal income in dollars
    pub personal_income: Option<f64>,
    pub taxes: Option<TaxBreakdown>,
    pub spending: Option<SpendingBreakdown>,
    pub outcomes: BTreeMap<OutcomeMetric, Option<f64>>,
}

impl Jurisdiction {
    pub fn new(id: impl Into<String>, name: impl Into<String>, tier: Tier) -> Self {
        let outcomes = OutcomeMetric::for_tier(tier)
            .iter()
            .map(|metric| (*metric, None))
            .collect();
        Self {
            id: id.into(),
            name: name.into(),
            tier,
            parent: None,
            population: None,
            rpp: None,
            personal_income: None,
            taxes: None,
            spending: None,
            outcomes,
        }
    }

    pub fn outcome(&self, metric: OutcomeMetric) -> Option<f64> {
        self.outcomes.get(&metric).copied().flatten()
    }

    /// Value divided by population, when both are known and population is positive
    pub fn per_capita(&self, value: Option<f64>) -> Option<f64> {
        match (value, self.population) {
            (Some(v), Some(pop)) if pop > 0.0 => Some(v / pop),
            _ => None,
        }
    }
}
