//! Trajectory catalog - trajectory footprints and image capture points.
//!
//! Both catalogs are GeoPackage files (SQLite with geometry blobs). The
//! trajectory layer seeds the state store and provides the polygon submitted
//! when a download is requested; the point layer provides the position and
//! capture time written into every image before upload.

mod geopackage;
mod types;

pub use geopackage::{decode_geometry_blob, load_point_index, load_trajectory_catalog};
pub use types::*;
