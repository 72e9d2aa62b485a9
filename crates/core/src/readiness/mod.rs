//! Readiness oracle: which prepared download ids can be fetched.
//!
//! The download service mails a link once an archive is ready. The oracle
//! keeps an append-only set of the download ids seen in those mails.

mod mailbox;
mod types;

pub use mailbox::ImapReadinessOracle;
pub use types::{download_link_pattern, extract_download_ids, ReadinessError, ReadinessOracle};
