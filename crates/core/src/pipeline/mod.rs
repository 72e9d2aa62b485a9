//! Download and publish pipeline collaborators.
//!
//! Once a trajectory's archive is ready the scheduler drives these steps:
//! - **Fetch**: download the archive (`ArchiveFetcher`, aria2c)
//! - **Stage**: extract, prune foreign trajectories, drop the top and bottom
//!   cameras, geotag the images (`PayloadStager`, `ImageTagger`)
//! - **Upload**: publish one sensor direction at a time (`Uploader`,
//!   mapillary_tools)
//!
//! Every step shells out to an external tool or touches the local payload
//! directory; the traits let the scheduler run against mocks in tests.

mod aria2;
mod error;
mod exiftool;
pub mod layout;
mod mapillary;
mod stager;
mod traits;

pub use aria2::Aria2Fetcher;
pub use error::{FetchError, StageError, TagError, UploadError};
pub use exiftool::ExiftoolTagger;
pub use mapillary::MapillaryUploader;
pub use stager::ArchivePayloadStager;
pub use traits::{ArchiveFetcher, ImageTagger, PayloadStager, StagedPayload, TagSummary, Uploader};
