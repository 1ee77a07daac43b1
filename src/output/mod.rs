pub mod formatter;

pub use formatter::{
    format_ranked_table, format_run_summary, format_score, format_tsv, should_use_colors,
};
