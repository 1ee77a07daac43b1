//! Public Good Index: scores US states and cities by combining tax burden,
//! the investment share of public spending, and service-outcome
//! effectiveness into a single 0-100 index.

pub mod config;
pub mod io;
pub mod jurisdiction;
pub mod loaders;
pub mod logging;
pub mod output;
pub mod pipeline;
pub mod scoring;
