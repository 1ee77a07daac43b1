pub mod cache;
pub mod census;
pub mod download;
pub mod feeds;
pub mod reference;

pub use cache::{get_cache_path, FeedCache};
pub use download::{DownloadStatus, Downloaded, Downloader};
pub use feeds::{Feed, FeedClient};
pub use reference::{CityReference, ReferenceTables, StateReference, SUPPORTED_YEARS};

use anyhow::Result;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use tracing::{debug, info};

use crate::jurisdiction::{
    Jurisdiction, OutcomeMetric, SpendingBreakdown, SpendingCategory, TaxBreakdown, TaxComponent,
    Tier,
};
use crate::scoring::ScoringConfig;
use census::RawStateFiles;

/// Inputs shared by the tier loaders.
pub struct LoadContext<'a> {
    pub tables: &'a ReferenceTables,
    pub raw_dir: &'a Path,
    /// `None` when running offline
    pub feeds: Option<&'a FeedClient>,
    pub scoring: &'a ScoringConfig,
}

impl LoadContext<'_> {
    fn feed(&self, feed: Feed) -> Option<BTreeMap<String, f64>> {
        self.feeds.and_then(|client| client.load(feed, self.tables))
    }
}

/// Load the raw records of one tier, in reference-table order.
///
/// Source order per field: local raw file, then network feed, then the
/// bundled reference value, then missing.
///
/// # Errors
///
/// Fails on unreadable raw files, a city whose parent state is unknown, or
/// duplicate jurisdiction ids. Feed failures never error.
pub fn load_tier(tier: Tier, ctx: &LoadContext<'_>) -> Result<Vec<Jurisdiction>> {
    let states = load_states(ctx)?;
    let loaded = match tier {
        Tier::State => states,
        Tier::City => load_cities(ctx.tables, &states)?,
    };
    info!(%tier, count = loaded.len(), "loaded jurisdictions");
    Ok(loaded)
}

/// Feed value for a state, else the reference value.
fn feed_or_reference(
    feed: Option<&BTreeMap<String, f64>>,
    code: &str,
    reference: Option<f64>,
) -> Option<f64> {
    feed.and_then(|values| values.get(code).copied()).or(reference)
}

fn load_states(ctx: &LoadContext<'_>) -> Result<Vec<Jurisdiction>> {
    let raw = RawStateFiles::load(
        ctx.raw_dir,
        ctx.tables,
        &ctx.scoring.tax,
        &ctx.scoring.spending,
    )?;

    let personal_income = match raw.personal_income {
        Some(income) => Some(income),
        None => ctx.feed(Feed::BeaPersonalIncome),
    };
    let oasdi = ctx.feed(Feed::SsaOasdi);
    let crime = ctx.feed(Feed::FbiViolentCrime);
    let naep_math = ctx.feed(Feed::NaepMath);
    let naep_reading = ctx.feed(Feed::NaepReading);

    if raw.taxes.is_none() {
        info!("no tax collections file, state tax burden unavailable");
    }
    if raw.spending.is_none() {
        info!("no state finances file, state investment ratio unavailable");
    }
    if personal_income.is_none() {
        info!("no personal income source, state tax burden unavailable");
    }

    let states = ctx
        .tables
        .states
        .values()
        .map(|state| {
            let code = state.code.as_str();
            let mut j = Jurisdiction::new(code, state.name.as_str(), Tier::State);
            j.population = state.population;
            j.rpp = state.rpp;
            j.personal_income = personal_income
                .as_ref()
                .and_then(|income| income.get(code).copied());
            j.taxes = raw.taxes.as_ref().and_then(|t| t.get(code).cloned());

            j.spending = raw.spending.as_ref().and_then(|s| s.get(code).cloned());
            // Social Security joins an existing functional breakdown only
            if let (Some(spending), Some(benefits)) = (
                j.spending.as_mut(),
                feed_or_reference(oasdi.as_ref(), code, state.oasdi_benefits),
            ) {
                spending.add(SpendingCategory::SocialSecurity, benefits);
            }

            let outcomes = [
                (
                    OutcomeMetric::NaepMath,
                    feed_or_reference(naep_math.as_ref(), code, state.naep_math),
                ),
                (
                    OutcomeMetric::NaepReading,
                    feed_or_reference(naep_reading.as_ref(), code, state.naep_reading),
                ),
                (
                    OutcomeMetric::InfrastructureGpa,
                    raw.infrastructure_gpa
                        .as_ref()
                        .and_then(|gpa| gpa.get(code).copied()),
                ),
                (
                    OutcomeMetric::ViolentCrime,
                    feed_or_reference(crime.as_ref(), code, state.violent_crime),
                ),
                (
                    OutcomeMetric::InfantMortality,
                    feed_or_reference(raw.infant_mortality.as_ref(), code, state.infant_mortality),
                ),
            ];
            for (metric, value) in outcomes {
                j.outcomes.insert(metric, value);
            }
            j
        })
        .collect();

    Ok(states)
}

/// Build city records from the reference table, inheriting RPP and per-capita
/// personal income from the parent state.
pub fn load_cities(tables: &ReferenceTables, states: &[Jurisdiction]) -> Result<Vec<Jurisdiction>> {
    let by_code: BTreeMap<&str, &Jurisdiction> =
        states.iter().map(|s| (s.id.as_str(), s)).collect();
    let mut seen = HashSet::new();
    let mut cities = Vec::with_capacity(tables.cities.len());

    for city in &tables.cities {
        let parent = tables
            .resolve_state(&city.state)
            .and_then(|code| by_code.get(code))
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "City '{}' names parent state '{}', which is not in the state table",
                    city.name,
                    city.state
                )
            })?;

        let id = format!("{}, {}", city.name, parent.id);
        anyhow::ensure!(seen.insert(id.clone()), "Duplicate city '{}'", id);

        let mut j = Jurisdiction::new(id, city.name.as_str(), Tier::City);
        j.parent = Some(parent.id.clone());
        j.population = city.population;
        j.rpp = parent.rpp;
        j.personal_income = parent
            .per_capita(parent.personal_income)
            .zip(city.population)
            .map(|(per_capita, population)| per_capita * population);

        j.taxes = city.tax_per_capita.zip(city.population).map(|(tax, pop)| {
            let mut taxes = TaxBreakdown::default();
            taxes.add(TaxComponent::General, tax * pop);
            taxes
        });

        j.spending = match (city.spending_per_capita, city.investment_share, city.population) {
            (Some(per_capita), Some(share), Some(pop)) => {
                let total = per_capita * pop;
                let mut spending = SpendingBreakdown::default();
                spending.add(SpendingCategory::GeneralInvestment, total * share);
                spending.add(SpendingCategory::GeneralCost, total * (1.0 - share));
                Some(spending)
            }
            _ => {
                debug!(city = %j.id, "incomplete spending figures");
                None
            }
        };

        for (metric, value) in [
            (OutcomeMetric::BachelorsPct, city.bachelors_pct),
            (OutcomeMetric::HsGradPct, city.hs_grad_pct),
            (OutcomeMetric::ViolentCrime, city.violent_crime),
            (OutcomeMetric::HealthIndex, city.health_index),
        ] {
            j.outcomes.insert(metric, value);
        }
        cities.push(j);
    }

    Ok(cities)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offline<'a>(tables: &'a ReferenceTables, raw_dir: &'a Path, scoring: &'a ScoringConfig) -> LoadContext<'a> {
        LoadContext {
            tables,
            raw_dir,
            feeds: None,
            scoring,
        }
    }

    #[test]
    fn test_offline_states_use_reference_values() {
        let tables = ReferenceTables::bundled(2023).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let scoring = ScoringConfig::default();
        let states = load_tier(Tier::State, &offline(&tables, dir.path(), &scoring)).unwrap();

        assert_eq!(states.len(), 51);
        let al = states.iter().find(|s| s.id == "AL").unwrap();
        assert_eq!(al.rpp, Some(87.8));
        assert_eq!(al.outcome(OutcomeMetric::NaepMath), Some(267.0));
        // No raw files: tax, spending and income are explicitly missing
        assert!(al.taxes.is_none());
        assert!(al.spending.is_none());
        assert!(al.personal_income.is_none());
        assert_eq!(al.outcome(OutcomeMetric::InfrastructureGpa), None);
    }

    #[test]
    fn test_states_with_raw_files() {
        let tables = ReferenceTables::bundled(2023).unwrap();
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(census::STATE_FINANCES_FILE),
            "state,category,amount\nAL,Highways,100\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join(census::PERSONAL_INCOME_FILE),
            "state,personal_income\nAlabama,250000000\n",
        )
        .unwrap();
        let scoring = ScoringConfig::default();
        let states = load_tier(Tier::State, &offline(&tables, dir.path(), &scoring)).unwrap();

        let al = states.iter().find(|s| s.id == "AL").unwrap();
        let spending = al.spending.as_ref().unwrap();
        assert_eq!(spending.amounts[&SpendingCategory::Infrastructure], 100_000.0);
        // Bundled OASDI benefits joined as Social Security
        assert_eq!(spending.amounts[&SpendingCategory::SocialSecurity], 14_063_000_000.0);
        // Social Security is a cost, not an investment
        assert_eq!(spending.investment(), 100_000.0);
        assert_eq!(spending.cost(), 14_063_000_000.0);
        assert_eq!(al.personal_income, Some(250_000_000_000.0));

        // States without an ASFIN row get no breakdown at all
        let ak = states.iter().find(|s| s.id == "AK").unwrap();
        assert!(ak.spending.is_none());
    }

    #[test]
    fn test_cities_inherit_parent_rpp() {
        let tables = ReferenceTables::bundled(2023).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let scoring = ScoringConfig::default();
        let cities = load_tier(Tier::City, &offline(&tables, dir.path(), &scoring)).unwrap();

        assert_eq!(cities.len(), 100);
        let la = cities.iter().find(|c| c.id == "Los Angeles, CA").unwrap();
        assert_eq!(la.parent.as_deref(), Some("CA"));
        assert_eq!(la.rpp, tables.state("CA").unwrap().rpp);
        let taxes = la.taxes.as_ref().unwrap();
        assert!((taxes.total() - 2214.0 * 3_820_914.0).abs() < 1e-3);
        let spending = la.spending.as_ref().unwrap();
        assert!((spending.investment() / spending.total() - 0.55).abs() < 1e-9);
        // Offline: no state income, so no city income either
        assert!(la.personal_income.is_none());
    }

    #[test]
    fn test_unknown_parent_state_fails() {
        let tables = ReferenceTables::from_csv(
            2023,
            b"state,state_name,population,rpp,oasdi_benefits_musd,naep_math,naep_reading,violent_crime,infant_mortality\nAL,Alabama,1,90,1,1,1,1,1\n",
            b"city,state,population,lat,lon,tax_per_capita,spending_per_capita,investment_share,violent_crime,bachelors_pct,hs_grad_pct,health_index\nPortland,OR,1,0,0,1,1,0.5,1,1,1,1\n",
        )
        .unwrap();
        let states: Vec<Jurisdiction> = vec![Jurisdiction::new("AL", "Alabama", Tier::State)];
        let err = load_cities(&tables, &states).unwrap_err();
        assert!(err.to_string().contains("Portland"));
    }

    #[test]
    fn test_duplicate_city_fails() {
        let tables = ReferenceTables::from_csv(
            2023,
            b"state,state_name,population,rpp,oasdi_benefits_musd,naep_math,naep_reading,violent_crime,infant_mortality\nAL,Alabama,1,90,1,1,1,1,1\n",
            b"city,state,population,lat,lon,tax_per_capita,spending_per_capita,investment_share,violent_crime,bachelors_pct,hs_grad_pct,health_index\nMobile,AL,1,0,0,1,1,0.5,1,1,1,1\nMobile,Alabama,1,0,0,1,1,0.5,1,1,1,1\n",
        )
        .unwrap();
        let states = vec![Jurisdiction::new("AL", "Alabama", Tier::State)];
        assert!(load_cities(&tables, &states).is_err());
    }

    #[test]
    fn test_city_income_from_parent_per_capita() {
        let tables = ReferenceTables::bundled(2023).unwrap();
        let mut ca = Jurisdiction::new("CA", "California", Tier::State);
        ca.population = Some(1_000.0);
        ca.personal_income = Some(50_000_000.0);
        let mut states = vec![ca];
        for code in tables.states.keys().filter(|c| *c != "CA") {
            states.push(Jurisdiction::new(code.as_str(), code.as_str(), Tier::State));
        }
        let cities = load_cities(&tables, &states).unwrap();
        let sf = cities.iter().find(|c| c.parent.as_deref() == Some("CA")).unwrap();
        assert_eq!(sf.personal_income, sf.population.map(|p| p * 50_000.0));
    }
}
