//! Local raw files under `raw_dir`.
//!
//! Census tables are accepted in two layouts. Long form has
//! `state,category,amount` columns. Wide form is the CSV export of the Census
//! spreadsheet: title lines, then a header row naming "United States" and each
//! state, then one row per category. Amounts are thousands of USD either way.
//! State identifiers may be postal codes or full names; rows and columns that
//! do not resolve to a state in the reference table (national totals,
//! footnotes) are dropped.

use anyhow::{Context, Result};
use polars::frame::DataFrame;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::{debug, warn};

use super::reference::ReferenceTables;
use crate::io::frame::{
    find_column_containing, numeric_column, parse_number, read_csv, read_csv_after_header,
    read_csv_bytes, string_column,
};
use crate::jurisdiction::{SpendingBreakdown, TaxBreakdown, TaxComponent};
use crate::scoring::{SpendingMap, TaxMap};

pub const TAX_COLLECTIONS_FILE: &str = "state_tax_collections.csv";
pub const STATE_FINANCES_FILE: &str = "state_finances.csv";
pub const PERSONAL_INCOME_FILE: &str = "personal_income.csv";
pub const PAYROLL_TAX_FILE: &str = "payroll_tax.csv";
pub const INFRASTRUCTURE_GRADES_FILE: &str = "infrastructure_grades.csv";
pub const INFANT_MORTALITY_FILE: &str = "infant_mortality.csv";

pub const RAW_FILES: [&str; 6] = [
    TAX_COLLECTIONS_FILE,
    STATE_FINANCES_FILE,
    PERSONAL_INCOME_FILE,
    PAYROLL_TAX_FILE,
    INFRASTRUCTURE_GRADES_FILE,
    INFANT_MORTALITY_FILE,
];

/// Census and BEA tables report thousands of dollars.
const THOUSANDS: f64 = 1_000.0;

/// A rate table with fewer resolvable states is treated as unusable.
pub const MIN_STATES: usize = 40;

/// Header cell that identifies the column row of a wide Census export.
const WIDE_HEADER_MARKER: &str = "United States";

/// Rows of a wide table between a start label and the first end label.
#[derive(Debug, Clone, Copy)]
pub struct Section {
    pub start: &'static str,
    pub end: &'static [&'static str],
}

/// The "General expenditure, by function" block of the ASFIN state totals.
/// Insurance trust and utility rows that follow it are not functions.
pub const ASFIN_BY_FUNCTION: Section = Section {
    start: "by function",
    end: &["utility expenditure", "liquor stores"],
};

/// Subtotal rows that repeat the sum of the rows named after them. A subtotal
/// is ignored for a state that also reports any of its parts.
const SUBTOTALS: &[(&str, &[&str])] = &[(
    "Education",
    &[
        "Higher education",
        "Elementary and secondary education",
        "Elementary & secondary education",
        "Other education",
    ],
)];

/// One `(state, category, amount)` cell of a Census table, amount as published.
#[derive(Debug, Clone, PartialEq)]
pub struct CensusRow {
    pub state: String,
    pub category: String,
    pub amount: f64,
}

/// Read `raw_dir/name` if it exists.
pub fn read_optional(raw_dir: &Path, name: &str) -> Result<Option<DataFrame>> {
    let path = raw_dir.join(name);
    if !path.exists() {
        debug!(path = %path.display(), "raw file not present");
        return Ok(None);
    }
    read_csv(&path).map(Some)
}

/// Whether the first non-blank line is a long-form `state,category,amount` header.
fn is_long_form(text: &str) -> bool {
    let Some(header) = text.lines().find(|l| !l.trim().is_empty()) else {
        return false;
    };
    let fields: Vec<String> = header
        .split(',')
        .map(|f| f.trim().trim_matches('"').to_ascii_lowercase())
        .collect();
    ["state", "category", "amount"]
        .iter()
        .all(|name| fields.iter().any(|f| f == name))
}

/// Rows of a Census table in either layout. `section` only applies to the
/// wide layout; long-form files are taken as already extracted.
pub fn parse_census_text(
    text: &str,
    tables: &ReferenceTables,
    section: Option<Section>,
) -> Result<Vec<CensusRow>> {
    if is_long_form(text) {
        long_rows(&read_csv_bytes(text.as_bytes())?, tables)
    } else {
        debug!("wide Census layout, converting to long form");
        wide_rows(&read_csv_after_header(text, WIDE_HEADER_MARKER)?, tables, section)
    }
}

/// Read a Census table from `raw_dir/name` if it exists.
pub fn read_census_table(
    raw_dir: &Path,
    name: &str,
    tables: &ReferenceTables,
    section: Option<Section>,
) -> Result<Option<Vec<CensusRow>>> {
    let path = raw_dir.join(name);
    if !path.exists() {
        debug!(path = %path.display(), "raw file not present");
        return Ok(None);
    }
    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("[loaders::census] Failed to read {}", path.display()))?;
    parse_census_text(&text, tables, section).map(Some)
}

/// Rows of a long-form table.
fn long_rows(df: &DataFrame, tables: &ReferenceTables) -> Result<Vec<CensusRow>> {
    let states = string_column(df, "state")?;
    let categories = string_column(df, "category")?;
    let amounts = numeric_column(df, "amount")?;

    let mut rows = Vec::new();
    let mut unresolved = 0usize;
    for ((state, category), amount) in states.into_iter().zip(categories).zip(amounts) {
        let (Some(state), Some(category)) = (state, category) else {
            continue;
        };
        let Some(code) = tables.resolve_state(&state) else {
            unresolved += 1;
            continue;
        };
        // "X" / "-" cells: the category is not reported, which counts as zero
        if let Some(amount) = amount {
            rows.push(CensusRow {
                state: code.to_string(),
                category,
                amount,
            });
        }
    }
    if unresolved > 0 {
        debug!(unresolved, "dropped rows not matching a state");
    }
    Ok(rows)
}

/// Rows of a wide table: categories down the first column, one column per
/// state. With a `section`, only the rows strictly between its start label and
/// the first end label are kept.
fn wide_rows(
    df: &DataFrame,
    tables: &ReferenceTables,
    section: Option<Section>,
) -> Result<Vec<CensusRow>> {
    let names: Vec<String> = df
        .get_column_names()
        .into_iter()
        .map(|c| c.to_string())
        .collect();
    let (category_column, value_columns) = names
        .split_first()
        .context("[loaders::census] Wide table has no columns")?;
    let categories = string_column(df, category_column)?;

    let range = match section {
        None => 0..categories.len(),
        Some(section) => section_range(&categories, section)?,
    };

    let mut rows = Vec::new();
    for name in value_columns {
        let Some(code) = tables.resolve_state(name) else {
            continue;
        };
        let amounts = numeric_column(df, name)?;
        for i in range.clone() {
            if let (Some(category), Some(amount)) = (&categories[i], amounts[i]) {
                rows.push(CensusRow {
                    state: code.to_string(),
                    category: category.clone(),
                    amount,
                });
            }
        }
    }
    anyhow::ensure!(
        !rows.is_empty(),
        "[loaders::census] Wide table has no state columns"
    );
    Ok(rows)
}

fn section_range(categories: &[Option<String>], section: Section) -> Result<std::ops::Range<usize>> {
    let label = |i: usize| {
        categories[i]
            .as_deref()
            .unwrap_or_default()
            .to_ascii_lowercase()
    };
    let start = (0..categories.len())
        .find(|&i| label(i).contains(section.start))
        .map(|i| i + 1)
        .with_context(|| format!("[loaders::census] No '{}' section", section.start))?;
    let end = (start..categories.len())
        .find(|&i| {
            let text = label(i);
            section.end.iter().any(|e| text.contains(e))
        })
        .unwrap_or(categories.len());
    Ok(start..end)
}

/// Tax breakdowns from Census STC rows.
///
/// A state gets a breakdown only when at least one of its rows maps to a tax
/// component; mapped components it lacks are zero. Unmapped categories
/// ("Total Taxes", subtotals) are ignored.
pub fn tax_breakdowns(rows: &[CensusRow], map: &TaxMap) -> BTreeMap<String, TaxBreakdown> {
    let mut breakdowns: BTreeMap<String, TaxBreakdown> = BTreeMap::new();
    for row in rows {
        if let Some(component) = map.lookup(&row.category) {
            breakdowns
                .entry(row.state.clone())
                .or_default()
                .add(component, row.amount * THOUSANDS);
        }
    }
    breakdowns
}

/// Tax breakdowns from a long-form Census STC table.
pub fn parse_tax_collections(
    df: &DataFrame,
    tables: &ReferenceTables,
    map: &TaxMap,
) -> Result<BTreeMap<String, TaxBreakdown>> {
    Ok(tax_breakdowns(&long_rows(df, tables)?, map))
}

/// Whether `category` is a subtotal whose parts `state` also reports.
fn shadowed_subtotal(
    category: &str,
    reported: &BTreeSet<(String, String)>,
    state: &str,
) -> bool {
    SUBTOTALS.iter().any(|(subtotal, parts)| {
        subtotal.eq_ignore_ascii_case(category.trim())
            && parts.iter().any(|part| {
                reported.contains(&(state.to_string(), part.to_ascii_lowercase()))
            })
    })
}

/// Spending breakdowns from Census ASFIN rows.
///
/// Like [`tax_breakdowns`], a state with no mapped function has no breakdown.
pub fn spending_breakdowns(
    rows: &[CensusRow],
    map: &SpendingMap,
) -> BTreeMap<String, SpendingBreakdown> {
    let reported: BTreeSet<(String, String)> = rows
        .iter()
        .map(|r| (r.state.clone(), r.category.trim().to_ascii_lowercase()))
        .collect();

    let mut breakdowns: BTreeMap<String, SpendingBreakdown> = BTreeMap::new();
    let mut unmapped: BTreeSet<&str> = BTreeSet::new();
    for row in rows {
        if shadowed_subtotal(&row.category, &reported, &row.state) {
            continue;
        }
        match map.lookup(&row.category) {
            Some(category) => breakdowns
                .entry(row.state.clone())
                .or_default()
                .add(category, row.amount * THOUSANDS),
            None => {
                unmapped.insert(row.category.as_str());
            }
        }
    }
    if !unmapped.is_empty() {
        debug!(categories = ?unmapped, "unmapped spending functions ignored");
    }
    breakdowns
}

/// Spending breakdowns from a long-form Census ASFIN table.
pub fn parse_state_finances(
    df: &DataFrame,
    tables: &ReferenceTables,
    map: &SpendingMap,
) -> Result<BTreeMap<String, SpendingBreakdown>> {
    Ok(spending_breakdowns(&long_rows(df, tables)?, map))
}

/// `state,<value_column>` table in thousands of dollars, returned in dollars.
pub fn parse_state_amounts(
    df: &DataFrame,
    tables: &ReferenceTables,
    value_column: &str,
) -> Result<BTreeMap<String, f64>> {
    let states = string_column(df, "state")?;
    let values = numeric_column(df, value_column)?;

    Ok(states
        .into_iter()
        .zip(values)
        .filter_map(|(state, value)| {
            let code = tables.resolve_state(state.as_deref()?)?;
            Some((code.to_string(), value? * THOUSANDS))
        })
        .collect())
}

/// Payroll tax rows as a tax component, for merging into STC breakdowns.
pub fn parse_payroll(
    df: &DataFrame,
    tables: &ReferenceTables,
) -> Result<BTreeMap<String, (TaxComponent, f64)>> {
    Ok(parse_state_amounts(df, tables, "amount")?
        .into_iter()
        .map(|(state, amount)| (state, (TaxComponent::Payroll, amount)))
        .collect())
}

/// ASCE report-card letter grade on a 4.3 GPA scale.
pub fn grade_to_gpa(grade: &str) -> Option<f64> {
    let grade = grade.trim().to_ascii_uppercase();
    let mut chars = grade.chars();
    let base = match chars.next()? {
        'A' => 4.0,
        'B' => 3.0,
        'C' => 2.0,
        'D' => 1.0,
        'F' => return chars.next().is_none().then_some(0.0),
        _ => return None,
    };
    let modifier = match chars.as_str() {
        "" => 0.0,
        "+" => 0.3,
        "-" => -0.3,
        _ => return None,
    };
    Some(base + modifier)
}

/// `state,grade` table of infrastructure grades, as GPA.
pub fn parse_infrastructure_grades(
    df: &DataFrame,
    tables: &ReferenceTables,
) -> Result<BTreeMap<String, f64>> {
    let states = string_column(df, "state")?;
    let grades = string_column(df, "grade")?;

    let mut gpa = BTreeMap::new();
    for (state, grade) in states.into_iter().zip(grades) {
        let (Some(state), Some(grade)) = (state, grade) else {
            continue;
        };
        let Some(code) = tables.resolve_state(&state) else {
            continue;
        };
        match grade_to_gpa(&grade) {
            Some(value) => {
                gpa.insert(code.to_string(), value);
            }
            None => warn!(state = code, grade = %grade, "unrecognized infrastructure grade"),
        }
    }
    Ok(gpa)
}

/// Infant mortality per 1k births from a CDC WONDER export.
///
/// Export headers vary, so the state column is the first whose name mentions
/// "state" and the rate column the first mentioning "rate" or "mort". Returns
/// `None` when either column is absent or fewer than [`MIN_STATES`] resolve.
pub fn parse_infant_mortality(
    df: &DataFrame,
    tables: &ReferenceTables,
) -> Result<Option<BTreeMap<String, f64>>> {
    let (Some(state_col), Some(rate_col)) = (
        find_column_containing(df, &["state"]),
        find_column_containing(df, &["rate", "mort"]),
    ) else {
        warn!("infant mortality file has no state/rate columns, ignoring");
        return Ok(None);
    };

    let states = string_column(df, &state_col)?;
    let rates = string_column(df, &rate_col)?;
    let parsed: BTreeMap<String, f64> = states
        .into_iter()
        .zip(rates)
        .filter_map(|(state, rate)| {
            let code = tables.resolve_state(state.as_deref()?)?;
            Some((code.to_string(), parse_number(rate.as_deref()?)?))
        })
        .collect();

    if parsed.len() < MIN_STATES {
        warn!(states = parsed.len(), "infant mortality file covers too few states, ignoring");
        return Ok(None);
    }
    Ok(Some(parsed))
}

/// Everything the state loader reads from `raw_dir`. Absent files are `None`.
#[derive(Debug, Clone, Default)]
pub struct RawStateFiles {
    pub taxes: Option<BTreeMap<String, TaxBreakdown>>,
    pub spending: Option<BTreeMap<String, SpendingBreakdown>>,
    pub personal_income: Option<BTreeMap<String, f64>>,
    pub infrastructure_gpa: Option<BTreeMap<String, f64>>,
    pub infant_mortality: Option<BTreeMap<String, f64>>,
}

impl RawStateFiles {
    pub fn load(
        raw_dir: &Path,
        tables: &ReferenceTables,
        tax_map: &TaxMap,
        spending_map: &SpendingMap,
    ) -> Result<Self> {
        let context = |name: &str| format!("[loaders::census] Failed to parse {}", name);

        let mut taxes = read_census_table(raw_dir, TAX_COLLECTIONS_FILE, tables, None)
            .with_context(|| context(TAX_COLLECTIONS_FILE))?
            .map(|rows| tax_breakdowns(&rows, tax_map));

        if let Some(payroll) = read_optional(raw_dir, PAYROLL_TAX_FILE)? {
            let payroll = parse_payroll(&payroll, tables).with_context(|| context(PAYROLL_TAX_FILE))?;
            // Payroll only supplements states that have mapped STC rows
            if let Some(taxes) = taxes.as_mut() {
                for (state, (component, amount)) in payroll {
                    if let Some(breakdown) = taxes.get_mut(&state) {
                        breakdown.add(component, amount);
                    }
                }
            }
        }

        let spending =
            read_census_table(raw_dir, STATE_FINANCES_FILE, tables, Some(ASFIN_BY_FUNCTION))
                .with_context(|| context(STATE_FINANCES_FILE))?
                .map(|rows| spending_breakdowns(&rows, spending_map));

        let personal_income = read_optional(raw_dir, PERSONAL_INCOME_FILE)?
            .map(|df| parse_state_amounts(&df, tables, "personal_income"))
            .transpose()
            .with_context(|| context(PERSONAL_INCOME_FILE))?;

        let infrastructure_gpa = read_optional(raw_dir, INFRASTRUCTURE_GRADES_FILE)?
            .map(|df| parse_infrastructure_grades(&df, tables))
            .transpose()
            .with_context(|| context(INFRASTRUCTURE_GRADES_FILE))?;

        let infant_mortality = read_optional(raw_dir, INFANT_MORTALITY_FILE)?
            .map(|df| parse_infant_mortality(&df, tables))
            .transpose()
            .with_context(|| context(INFANT_MORTALITY_FILE))?
            .flatten();

        Ok(Self {
            taxes,
            spending,
            personal_income,
            infrastructure_gpa,
            infant_mortality,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::frame::read_csv_bytes;
    use crate::jurisdiction::SpendingCategory;

    fn tables() -> ReferenceTables {
        ReferenceTables::bundled(2023).unwrap()
    }

    fn frame(csv: &str) -> DataFrame {
        read_csv_bytes(csv.as_bytes()).unwrap()
    }

    #[test]
    fn test_grade_to_gpa() {
        assert_eq!(grade_to_gpa("A+"), Some(4.3));
        assert_eq!(grade_to_gpa("b"), Some(3.0));
        assert_eq!(grade_to_gpa(" C- "), Some(1.7));
        assert_eq!(grade_to_gpa("F"), Some(0.0));
        assert_eq!(grade_to_gpa("F+"), None);
        assert_eq!(grade_to_gpa("E"), None);
        assert_eq!(grade_to_gpa(""), None);
    }

    #[test]
    fn test_parse_tax_collections() {
        let df = frame(
            "state,category,amount\n\
             California,Individual Income Taxes,\"1,000\"\n\
             CA,Property Taxes,200\n\
             CA,Total Taxes,99999\n\
             United States,Individual Income Taxes,5\n\
             TX,Individual Income Taxes,X\n\
             NV,Total Taxes,800\n\
             NV,Severance Taxes,40\n",
        );
        let taxes = parse_tax_collections(&df, &tables(), &TaxMap::default()).unwrap();

        let ca = &taxes["CA"];
        assert_eq!(ca.amounts[&TaxComponent::Income], 1_000_000.0);
        assert_eq!(ca.amounts[&TaxComponent::Property], 200_000.0);
        assert_eq!(ca.total(), 1_200_000.0);
        // Only unreported cells: no breakdown at all
        assert!(!taxes.contains_key("TX"));
        // Only unmapped categories: missing, not a zero burden
        assert!(!taxes.contains_key("NV"));
        assert_eq!(taxes.len(), 1);
    }

    #[test]
    fn test_parse_state_finances() {
        let df = frame(
            "state,category,amount\n\
             NY,Elementary and secondary education,300\n\
             NY,Highways,100\n\
             NY,Employee retirement,100\n\
             NY,Parking facilities,50\n",
        );
        let spending = parse_state_finances(&df, &tables(), &SpendingMap::default()).unwrap();
        let ny = &spending["NY"];
        assert_eq!(ny.amounts[&SpendingCategory::K12Education], 300_000.0);
        assert_eq!(ny.investment(), 400_000.0);
        assert_eq!(ny.cost(), 100_000.0);
    }

    #[test]
    fn test_education_subtotal_not_double_counted() {
        let df = frame(
            "state,category,amount\n\
             NY,Education,500\n\
             NY,Higher education,200\n\
             NY,Elementary and secondary education,300\n\
             NY,Employee retirement,500\n",
        );
        let spending = parse_state_finances(&df, &tables(), &SpendingMap::default()).unwrap();
        let ny = &spending["NY"];
        assert_eq!(ny.investment(), 500_000.0);
        assert_eq!(ny.cost(), 500_000.0);

        // A map that lists the subtotal still counts it only once
        let mut map = SpendingMap::default();
        map.categories
            .insert("Education".to_string(), SpendingCategory::K12Education);
        let spending = parse_state_finances(&df, &tables(), &map).unwrap();
        assert_eq!(spending["NY"].investment(), 500_000.0);

        // Without its parts the subtotal is used
        let df = frame("state,category,amount\nNY,Education,500\nNY,Employee retirement,500\n");
        let spending = parse_state_finances(&df, &tables(), &map).unwrap();
        assert_eq!(spending["NY"].investment(), 500_000.0);
    }

    #[test]
    fn test_state_with_only_unmapped_functions_has_no_spending() {
        let df = frame("state,category,amount\nOH,Parking facilities,50\nOH,Liquor stores,10\n");
        let spending = parse_state_finances(&df, &tables(), &SpendingMap::default()).unwrap();
        assert!(spending.is_empty());
    }

    const WIDE_ASFIN: &str = "State Government Finances: 2023\n\
        (Thousands of dollars)\n\
        Item,United States,Alabama,Alaska,Footnote\n\
        Total expenditure,9999,900,800,\n\
        \"General expenditure, by function:\",,,,\n\
        Education,5000,500,400,\n\
        Higher education,2000,200,150,\n\
        Elementary and secondary education,3000,300,250,\n\
        Highways,1000,100,X,\n\
        Public welfare,4000,400,300,\n\
        Utility expenditure,700,70,60,\n\
        Employee retirement,600,60,50,\n";

    #[test]
    fn test_wide_asfin_by_function_section() {
        let rows = parse_census_text(WIDE_ASFIN, &tables(), Some(ASFIN_BY_FUNCTION)).unwrap();

        // Rows outside the section and the national column are gone
        assert!(rows.iter().all(|r| r.state == "AL" || r.state == "AK"));
        assert!(!rows.iter().any(|r| r.category == "Employee retirement"));
        assert!(!rows.iter().any(|r| r.category == "Total expenditure"));
        assert!(rows.contains(&CensusRow {
            state: "AL".to_string(),
            category: "Highways".to_string(),
            amount: 100.0,
        }));
        // Unreported cell dropped
        assert!(!rows
            .iter()
            .any(|r| r.state == "AK" && r.category == "Highways"));

        let spending = spending_breakdowns(&rows, &SpendingMap::default());
        let al = &spending["AL"];
        assert_eq!(al.investment(), 600_000.0);
        assert_eq!(al.cost(), 400_000.0);
        assert_eq!(al.amounts[&SpendingCategory::HigherEducation], 200_000.0);
    }

    #[test]
    fn test_wide_table_without_section_fails() {
        let text = "Item,United States,Alabama\nHighways,10,1\n";
        assert!(parse_census_text(text, &tables(), Some(ASFIN_BY_FUNCTION)).is_err());
        assert_eq!(parse_census_text(text, &tables(), None).unwrap().len(), 1);
    }

    #[test]
    fn test_wide_stc_matches_long_form() {
        let wide = "Annual Survey of State Tax Collections\n\
            Item,United States,California,Texas\n\
            Total Taxes,100,12,8\n\
            Property Taxes,10,2,1\n\
            Individual Income Taxes,50,9,X\n";
        let long = "state,category,amount\n\
            CA,Total Taxes,12\n\
            CA,Property Taxes,2\n\
            CA,Individual Income Taxes,9\n\
            TX,Total Taxes,8\n\
            TX,Property Taxes,1\n";

        let map = TaxMap::default();
        let from_wide = tax_breakdowns(&parse_census_text(wide, &tables(), None).unwrap(), &map);
        let from_long = tax_breakdowns(&parse_census_text(long, &tables(), None).unwrap(), &map);
        assert_eq!(from_wide, from_long);
        assert_eq!(from_wide["CA"].total(), 11_000.0);
        assert_eq!(from_wide["TX"].total(), 1_000.0);
    }

    #[test]
    fn test_parse_state_amounts() {
        let df = frame("state,personal_income\nWA,\"700,000\"\nPuerto Rico,1\nOR,\n");
        let income = parse_state_amounts(&df, &tables(), "personal_income").unwrap();
        assert_eq!(income.len(), 1);
        assert_eq!(income["WA"], 700_000_000.0);
    }

    #[test]
    fn test_infant_mortality_needs_coverage() {
        let df = frame("State,Infant Mortality Rate\nAlabama,7.1\nAlaska,5.0\n");
        assert!(parse_infant_mortality(&df, &tables()).unwrap().is_none());

        let tables = tables();
        let mut csv = "Residence State,Death Rate\n".to_string();
        for state in tables.states.values() {
            csv.push_str(&format!("{},5.5\n", state.name));
        }
        let parsed = parse_infant_mortality(&frame(&csv), &tables).unwrap().unwrap();
        assert_eq!(parsed.len(), tables.states.len());
        assert_eq!(parsed["MA"], 5.5);
    }

    #[test]
    fn test_raw_files_payroll_supplements_existing_rows() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(TAX_COLLECTIONS_FILE),
            "state,category,amount\nCO,General Sales and Gross Receipts Taxes,10\n",
        )
        .unwrap();
        std::fs::write(dir.path().join(PAYROLL_TAX_FILE), "state,amount\nCO,5\nUT,7\n").unwrap();
        std::fs::write(
            dir.path().join(INFRASTRUCTURE_GRADES_FILE),
            "state,grade\nCO,C+\nUT,Q\n",
        )
        .unwrap();

        let files = RawStateFiles::load(
            dir.path(),
            &tables(),
            &TaxMap::default(),
            &SpendingMap::default(),
        )
        .unwrap();

        let taxes = files.taxes.unwrap();
        assert_eq!(taxes["CO"].total(), 15_000.0);
        assert!(!taxes.contains_key("UT"));
        assert!(files.spending.is_none());
        assert!(files.personal_income.is_none());
        let gpa = files.infrastructure_gpa.unwrap();
        assert!((gpa["CO"] - 2.3).abs() < 1e-9);
        assert!(!gpa.contains_key("UT"));
    }
}
