pub mod export;
pub mod frame;
pub mod stages;

pub use export::{export_path, write_export, ScoreExport};
pub use stages::{read_pgi, read_raw, Stage};
