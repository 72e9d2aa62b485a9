//! Testing utilities and mock implementations of the scheduler's collaborators.
//!
//! Every external service trait has a mock here, so the scheduler can be
//! exercised end-to-end without a mailbox, the geodata service, or any of
//! the command-line tools.
//!
//! # Example
//!
//! ```rust,ignore
//! use kappasync_core::testing::{MockReadinessOracle, MockUploader};
//!
//! let oracle = MockReadinessOracle::new();
//! oracle.mark_ready("5276d431-a054-4a84-a38c-6dfbccefdef0").await;
//!
//! let uploader = MockUploader::new();
//! uploader.fail_on(Sensor::Three).await;
//! ```

mod mock_fetcher;
mod mock_preparation;
mod mock_readiness;
mod mock_stager;
mod mock_tagger;
mod mock_uploader;

pub use mock_fetcher::MockArchiveFetcher;
pub use mock_preparation::MockPreparationService;
pub use mock_readiness::MockReadinessOracle;
pub use mock_stager::MockPayloadStager;
pub use mock_tagger::MockImageTagger;
pub use mock_uploader::{MockUploader, RecordedUpload};
