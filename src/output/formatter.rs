use owo_colors::OwoColorize;
use std::io::IsTerminal;
use terminal_size::{terminal_size, Width};

use crate::pipeline::TierOutcome;
use crate::scoring::PgiRecord;

/// Check if stdout is a TTY (for auto-detecting color support)
pub fn should_use_colors() -> bool {
    std::io::stdout().is_terminal()
}

/// Format a 0-100 score with one decimal; "-" when unknown
pub fn format_score(score: Option<f64>) -> String {
    match score {
        Some(s) => format!("{:.1}", s),
        None => "-".to_string(),
    }
}

/// Get terminal width, defaulting to None for pipes (unlimited)
fn get_terminal_width() -> Option<usize> {
    terminal_size().map(|(Width(w), _)| w as usize)
}

/// Truncate a name to fit available width, accounting for Unicode
fn truncate_name(name: &str, max_width: usize) -> String {
    let chars: Vec<char> = name.chars().collect();
    if chars.len() <= max_width {
        name.to_string()
    } else if max_width > 3 {
        format!("{}...", chars[..max_width - 3].iter().collect::<String>())
    } else {
        chars[..max_width].iter().collect()
    }
}

/// Label shown for a record: state name, or "City, ST"
fn label(record: &PgiRecord) -> String {
    match &record.parent {
        Some(parent) => format!("{}, {}", record.name, parent),
        None => record.name.clone(),
    }
}

/// Format records as a ranked table with columns: Index, Score, COL score, Jurisdiction
/// No headers. Records are printed in the order given.
pub fn format_ranked_table(records: &[PgiRecord], use_colors: bool) -> String {
    if records.is_empty() {
        return "No scored jurisdictions.".to_string();
    }

    let term_width = get_terminal_width();

    let index_width = 4; // fits "100."
    let score_width = 5; // fits "100.0"
    let separator = "  ";
    let fixed_width = index_width + 1 + score_width * 2 + separator.len() * 2;

    records
        .iter()
        .enumerate()
        .map(|(idx, record)| {
            let index_str = format!("{:>3}.", idx + 1);
            let score = format!(
                "{:>width$}",
                format_score(Some(record.public_good_score)),
                width = score_width
            );
            let col_score = format!(
                "{:>width$}",
                format_score(record.public_good_score_col),
                width = score_width
            );

            let name = match term_width {
                Some(width) if width > fixed_width + 10 => {
                    truncate_name(&label(record), width - fixed_width)
                }
                Some(_) => truncate_name(&label(record), 20),
                None => label(record),
            };

            if use_colors {
                format!(
                    "{} {}{}{}{}{}",
                    index_str.dimmed(),
                    score.bold(),
                    separator,
                    col_score.dimmed(),
                    separator,
                    name
                )
            } else {
                format!(
                    "{} {}{}{}{}{}",
                    index_str, score, separator, col_score, separator, name
                )
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Format records as tab-separated values for scripting
/// Columns: id, score, col score, tax, investment, effectiveness (no headers, no colors)
pub fn format_tsv(records: &[PgiRecord]) -> String {
    records
        .iter()
        .map(|r| {
            format!(
                "{}\t{:.2}\t{}\t{:.2}\t{:.2}\t{:.2}",
                r.id,
                r.public_good_score,
                r.public_good_score_col
                    .map(|s| format!("{:.2}", s))
                    .unwrap_or_default(),
                r.tax_score,
                r.investment_score,
                r.effectiveness_score
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// One-paragraph summary of a tier run, printed to stdout by `run`
pub fn format_run_summary(outcome: &TierOutcome, use_colors: bool) -> String {
    let scored = outcome.aggregation.records.len();
    let excluded = outcome.aggregation.excluded.len();
    let heading = format!("{} tier", outcome.tier);

    let mut lines = vec![format!(
        "{}: {} loaded, {} scored, {} excluded (tax basis: {})",
        if use_colors {
            heading.bold().to_string()
        } else {
            heading
        },
        outcome.loaded,
        scored,
        excluded,
        outcome.basis.as_str()
    )];

    if let Some(top) = outcome.aggregation.records.first() {
        lines.push(format!(
            "  top: {} ({})",
            label(top),
            format_score(Some(top.public_good_score))
        ));
    }
    if let Some(path) = outcome.stage_files.last() {
        lines.push(format!("  wrote {}", path.display()));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jurisdiction::Tier;
    use crate::scoring::{Aggregation, Exclusion, TaxBasis};

    fn record(id: &str, name: &str, parent: Option<&str>, score: f64) -> PgiRecord {
        PgiRecord {
            id: id.to_string(),
            name: name.to_string(),
            parent: parent.map(str::to_string),
            tax_score: 40.0,
            investment_score: 60.0,
            effectiveness_score: 50.0,
            public_good_score: score,
            col_investment_score: None,
            public_good_score_col: None,
        }
    }

    #[test]
    fn test_format_score() {
        assert_eq!(format_score(Some(71.26)), "71.3");
        assert_eq!(format_score(Some(100.0)), "100.0");
        assert_eq!(format_score(None), "-");
    }

    #[test]
    fn test_ranked_table_empty() {
        assert_eq!(format_ranked_table(&[], false), "No scored jurisdictions.");
    }

    #[test]
    fn test_ranked_table_rows() {
        let records = vec![
            record("Boise, ID", "Boise", Some("ID"), 66.66),
            record("Tulsa, OK", "Tulsa", Some("OK"), 41.0),
        ];
        let table = format_ranked_table(&records, false);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("  1.  66.7"));
        assert!(lines[0].contains("Boise, ID"));
        assert!(lines[1].contains("    -"));
    }

    #[test]
    fn test_truncate_name() {
        assert_eq!(truncate_name("Oklahoma City, OK", 8), "Oklah...");
        assert_eq!(truncate_name("Reno, NV", 20), "Reno, NV");
    }

    #[test]
    fn test_format_tsv() {
        let mut r = record("VT", "Vermont", None, 70.0);
        r.public_good_score_col = Some(68.5);
        assert_eq!(format_tsv(&[r]), "VT\t70.00\t68.50\t40.00\t60.00\t50.00");
        let r = record("MS", "Mississippi", None, 30.0);
        assert_eq!(format_tsv(&[r]), "MS\t30.00\t\t40.00\t60.00\t50.00");
    }

    #[test]
    fn test_run_summary() {
        let outcome = TierOutcome {
            tier: Tier::City,
            basis: TaxBasis::PerCapita,
            loaded: 3,
            aggregation: Aggregation {
                records: vec![record("Boise, ID", "Boise", Some("ID"), 66.0)],
                excluded: vec![Exclusion {
                    id: "X, ID".to_string(),
                    missing: vec!["tax_score"],
                }],
            },
            stage_files: vec![],
        };
        let summary = format_run_summary(&outcome, false);
        assert!(summary.starts_with("city tier: 3 loaded, 1 scored, 1 excluded (tax basis: per_capita)"));
        assert!(summary.contains("top: Boise, ID (66.0)"));
    }
}
