//! Preparation service: registers download requests for trajectory footprints.

mod geodata;
mod types;

pub use geodata::GeodataPreparationClient;
pub use types::{PreparationError, PreparationService, PreparedDownload};
