//! Catalog types.

use std::collections::{HashMap, HashSet};

use chrono::NaiveDateTime;
use serde::{Serialize, Serializer};
use thiserror::Error;

/// Errors reading a catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Geometry layer not found: {0}")]
    MissingLayer(String),

    #[error("Invalid geometry for {id}: {reason}")]
    InvalidGeometry { id: String, reason: String },

    #[error("Invalid value in column {column}: {reason}")]
    InvalidValue { column: String, reason: String },
}

impl From<rusqlite::Error> for CatalogError {
    fn from(e: rusqlite::Error) -> Self {
        CatalogError::Database(e.to_string())
    }
}

/// A planar polygon given by its exterior ring.
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    /// Ordered ring coordinates; the last point repeats the first.
    pub exterior: Vec<(f64, f64)>,
}

impl Polygon {
    pub fn new(exterior: Vec<(f64, f64)>) -> Self {
        Self { exterior }
    }
}

/// Serializes as `[[x, y], ...]`, the shape the download service expects.
impl Serialize for Polygon {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let coords: Vec<[f64; 2]> = self.exterior.iter().map(|(x, y)| [*x, *y]).collect();
        coords.serialize(serializer)
    }
}

/// Trajectory footprints keyed by trajectory id.
#[derive(Debug, Clone, Default)]
pub struct TrajectoryCatalog {
    ids: Vec<String>,
    footprints: HashMap<String, Polygon>,
}

impl TrajectoryCatalog {
    /// Build a catalog from `(trajectory_id, footprint)` pairs, keeping the
    /// first footprint for duplicated ids.
    pub fn from_footprints(entries: impl IntoIterator<Item = (String, Polygon)>) -> Self {
        Self::from_entries(entries.into_iter().map(|(id, polygon)| (id, Some(polygon))))
    }

    /// Like `from_footprints`, but ids without a footprint are kept so they
    /// still get a state record.
    pub fn from_entries(entries: impl IntoIterator<Item = (String, Option<Polygon>)>) -> Self {
        let mut catalog = Self::default();
        let mut seen = HashSet::new();
        for (id, polygon) in entries {
            if !seen.insert(id.clone()) {
                continue;
            }
            if let Some(polygon) = polygon {
                catalog.footprints.insert(id.clone(), polygon);
            }
            catalog.ids.push(id);
        }
        catalog
    }

    /// All trajectory ids in catalog order.
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn footprint(&self, trajectory_id: &str) -> Option<&Polygon> {
        self.footprints.get(trajectory_id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Position and capture time of one image.
#[derive(Debug, Clone, PartialEq)]
pub struct ImagePoint {
    pub lat: f64,
    pub lon: f64,
    /// Capture time as recorded in the catalog (no zone conversion).
    pub captured_at: NaiveDateTime,
}

/// Image points keyed by image file name.
#[derive(Debug, Clone, Default)]
pub struct PointIndex {
    points: HashMap<String, ImagePoint>,
}

impl PointIndex {
    pub fn from_points(entries: impl IntoIterator<Item = (String, ImagePoint)>) -> Self {
        Self {
            points: entries.into_iter().collect(),
        }
    }

    pub fn get(&self, image_name: &str) -> Option<&ImagePoint> {
        self.points.get(image_name)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Trajectory id as used in archive directory names.
///
/// Catalog ids of split trajectories carry a suffix (`17720_2`); the archive
/// stores all parts under the base id (`Trajektorie_17720`).
pub fn base_trajectory_id(trajectory_id: &str) -> &str {
    trajectory_id
        .split_once('_')
        .map(|(base, _)| base)
        .unwrap_or(trajectory_id)
}
