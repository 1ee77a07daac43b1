//! Versioned reference tables bundled with the binary.
//!
//! These are the last-resort source for every state and city figure and the
//! authority for which jurisdictions exist at all. They are passed explicitly
//! through the loaders rather than held in globals, so a run is reproducible
//! for a given `reference_year`.

use anyhow::{Context, Result};
use std::collections::BTreeMap;

use crate::io::frame::{numeric_column, read_csv_bytes, string_column};

/// Years for which reference tables are bundled.
pub const SUPPORTED_YEARS: &[u16] = &[2023];

const STATES_2023: &str = include_str!("../../data/reference/states_2023.csv");
const CITIES_2023: &str = include_str!("../../data/reference/cities_2023.csv");

#[derive(Debug, Clone, PartialEq)]
pub struct StateReference {
    /// Two-letter postal code
    pub code: String,
    pub name: String,
    pub population: Option<f64>,
    pub rpp: Option<f64>,
    /// SSA OASDI benefits paid to residents, in dollars
    pub oasdi_benefits: Option<f64>,
    pub naep_math: Option<f64>,
    pub naep_reading: Option<f64>,
    /// Violent crimes per 100k residents
    pub violent_crime: Option<f64>,
    /// Infant deaths per 1k live births
    pub infant_mortality: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CityReference {
    pub name: String,
    /// Parent state code as written in the table; resolved by the city loader
    pub state: String,
    pub population: Option<f64>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub tax_per_capita: Option<f64>,
    pub spending_per_capita: Option<f64>,
    /// Share of general spending going to investment categories, in [0, 1]
    pub investment_share: Option<f64>,
    pub violent_crime: Option<f64>,
    pub bachelors_pct: Option<f64>,
    pub hs_grad_pct: Option<f64>,
    pub health_index: Option<f64>,
}

impl CityReference {
    /// Jurisdiction id, e.g. "Portland, OR"
    pub fn id(&self) -> String {
        format!("{}, {}", self.name, self.state)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceTables {
    pub year: u16,
    /// Keyed by state code
    pub states: BTreeMap<String, StateReference>,
    pub cities: Vec<CityReference>,
}

impl ReferenceTables {
    /// Tables bundled for `year`.
    pub fn bundled(year: u16) -> Result<Self> {
        let (states, cities) = match year {
            2023 => (STATES_2023, CITIES_2023),
            _ => anyhow::bail!(
                "No bundled reference tables for {} (available: {:?})",
                year,
                SUPPORTED_YEARS
            ),
        };
        Self::from_csv(year, states.as_bytes(), cities.as_bytes())
            .with_context(|| format!("Failed to load bundled {} reference tables", year))
    }

    /// Parse tables from CSV bytes.
    pub fn from_csv(year: u16, states_csv: &[u8], cities_csv: &[u8]) -> Result<Self> {
        let states = parse_states(states_csv)?;
        let cities = parse_cities(cities_csv)?;
        Ok(Self {
            year,
            states,
            cities,
        })
    }

    pub fn state(&self, code: &str) -> Option<&StateReference> {
        self.states.get(code)
    }

    /// Resolve a state code or full state name to its code.
    ///
    /// Matching is case-insensitive. Aggregates like "United States" and
    /// footnote rows resolve to `None`.
    pub fn resolve_state(&self, key: &str) -> Option<&str> {
        let key = key.trim();
        if key.len() == 2 {
            let upper = key.to_ascii_uppercase();
            if let Some((code, _)) = self.states.get_key_value(upper.as_str()) {
                return Some(code.as_str());
            }
        }
        self.states
            .values()
            .find(|s| s.name.eq_ignore_ascii_case(key))
            .map(|s| s.code.as_str())
    }
}

fn parse_states(csv: &[u8]) -> Result<BTreeMap<String, StateReference>> {
    let df = read_csv_bytes(csv).context("[loaders::reference] Failed to parse state table")?;

    let codes = string_column(&df, "state")?;
    let names = string_column(&df, "state_name")?;
    let population = numeric_column(&df, "population")?;
    let rpp = numeric_column(&df, "rpp")?;
    let oasdi = numeric_column(&df, "oasdi_benefits_musd")?;
    let math = numeric_column(&df, "naep_math")?;
    let reading = numeric_column(&df, "naep_reading")?;
    let crime = numeric_column(&df, "violent_crime")?;
    let infant = numeric_column(&df, "infant_mortality")?;

    let mut states = BTreeMap::new();
    for i in 0..df.height() {
        let code = codes[i]
            .as_deref()
            .with_context(|| format!("[loaders::reference] State row {} has no code", i + 1))?
            .to_ascii_uppercase();
        anyhow::ensure!(
            code.len() == 2,
            "[loaders::reference] Invalid state code '{}' on row {}",
            code,
            i + 1
        );
        let state = StateReference {
            code: code.clone(),
            name: names[i].clone().unwrap_or_else(|| code.clone()),
            population: population[i],
            rpp: rpp[i],
            oasdi_benefits: oasdi[i].map(|m| m * 1_000_000.0),
            naep_math: math[i],
            naep_reading: reading[i],
            violent_crime: crime[i],
            infant_mortality: infant[i],
        };
        if states.insert(code.clone(), state).is_some() {
            anyhow::bail!("[loaders::reference] Duplicate state code '{}'", code);
        }
    }
    Ok(states)
}

fn parse_cities(csv: &[u8]) -> Result<Vec<CityReference>> {
    let df = read_csv_bytes(csv).context("[loaders::reference] Failed to parse city table")?;

    let names = string_column(&df, "city")?;
    let states = string_column(&df, "state")?;
    let population = numeric_column(&df, "population")?;
    let lat = numeric_column(&df, "lat")?;
    let lon = numeric_column(&df, "lon")?;
    let tax = numeric_column(&df, "tax_per_capita")?;
    let spending = numeric_column(&df, "spending_per_capita")?;
    let share = numeric_column(&df, "investment_share")?;
    let crime = numeric_column(&df, "violent_crime")?;
    let bachelors = numeric_column(&df, "bachelors_pct")?;
    let hs_grad = numeric_column(&df, "hs_grad_pct")?;
    let health = numeric_column(&df, "health_index")?;

    (0..df.height())
        .map(|i| {
            let name = names[i]
                .clone()
                .with_context(|| format!("[loaders::reference] City row {} has no name", i + 1))?;
            let state = states[i].clone().with_context(|| {
                format!("[loaders::reference] City '{}' has no parent state", name)
            })?;
            Ok(CityReference {
                name,
                state,
                population: population[i],
                lat: lat[i],
                lon: lon[i],
                tax_per_capita: tax[i],
                spending_per_capita: spending[i],
                investment_share: share[i].filter(|s| (0.0..=1.0).contains(s)),
                violent_crime: crime[i],
                bachelors_pct: bachelors[i],
                hs_grad_pct: hs_grad[i],
                health_index: health[i],
            })
        })
        .collect()
}
