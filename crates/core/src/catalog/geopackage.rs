//! GeoPackage readers for the trajectory and image point layers.

use std::path::Path;

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use tracing::{info, warn};

use super::{CatalogError, ImagePoint, PointIndex, Polygon, TrajectoryCatalog};
use crate::config::CatalogConfig;

fn open_read_only(path: &Path) -> Result<Connection, CatalogError> {
    Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(|e| CatalogError::Database(format!("{}: {}", path.display(), e)))
}

fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Resolve `(table, geometry column)` from `gpkg_geometry_columns`.
fn geometry_layer(
    conn: &Connection,
    layer: Option<&str>,
) -> Result<(String, String), CatalogError> {
    let found = match layer {
        Some(name) => conn
            .query_row(
                "SELECT table_name, column_name FROM gpkg_geometry_columns WHERE table_name = ?",
                params![name],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?,
        None => conn
            .query_row(
                "SELECT table_name, column_name FROM gpkg_geometry_columns ORDER BY table_name LIMIT 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?,
    };
    found.ok_or_else(|| CatalogError::MissingLayer(layer.unwrap_or("<any>").to_string()))
}

fn value_to_string(value: Value, column: &str) -> Result<String, CatalogError> {
    match value {
        Value::Text(s) => Ok(s),
        Value::Integer(i) => Ok(i.to_string()),
        other => Err(CatalogError::InvalidValue {
            column: column.to_string(),
            reason: format!("expected text or integer, got {:?}", other.data_type()),
        }),
    }
}

/// Load trajectory footprints from the configured GeoPackage layer.
pub fn load_trajectory_catalog(config: &CatalogConfig) -> Result<TrajectoryCatalog, CatalogError> {
    let conn = open_read_only(&config.trajectories_path)?;
    let (table, geometry_column) = geometry_layer(&conn, config.trajectories_layer.as_deref())?;

    let sql = format!(
        "SELECT {}, {} FROM {}",
        quote_ident(&config.trajectory_id_column),
        quote_ident(&geometry_column),
        quote_ident(&table)
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;

    let mut entries = Vec::new();
    while let Some(row) = rows.next()? {
        let id = value_to_string(row.get(0)?, &config.trajectory_id_column)?;
        let blob: Option<Vec<u8>> = row.get(1)?;
        let polygon = match blob {
            Some(blob) => Some(decode_geometry_blob(&blob).map_err(|reason| {
                CatalogError::InvalidGeometry {
                    id: id.clone(),
                    reason,
                }
            })?),
            None => {
                warn!("Trajectory {} has no geometry, it cannot be prepared", id);
                None
            }
        };
        entries.push((id, polygon));
    }

    let catalog = TrajectoryCatalog::from_entries(entries);
    info!(
        "Loaded {} trajectories from {} (layer {})",
        catalog.len(),
        config.trajectories_path.display(),
        table
    );
    Ok(catalog)
}

/// Load image capture points keyed by image file name.
pub fn load_point_index(config: &CatalogConfig) -> Result<PointIndex, CatalogError> {
    let conn = open_read_only(&config.points_path)?;

    let sql = format!(
        "SELECT image_name, lat, lon, epoch FROM {}",
        quote_ident(&config.points_layer)
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;

    let mut entries = Vec::new();
    while let Some(row) = rows.next()? {
        let image_name: String = row.get(0)?;
        let lat: f64 = row.get(1)?;
        let lon: f64 = row.get(2)?;
        let captured_at = parse_capture_time(row.get(3)?)?;
        entries.push((image_name, ImagePoint { lat, lon, captured_at }));
    }

    let index = PointIndex::from_points(entries);
    info!(
        "Loaded {} image points from {}",
        index.len(),
        config.points_path.display()
    );
    Ok(index)
}

/// GeoPackage DATETIME values are ISO-8601 text; unix seconds are accepted too.
fn parse_capture_time(value: Value) -> Result<NaiveDateTime, CatalogError> {
    let invalid = |reason: String| CatalogError::InvalidValue {
        column: "epoch".to_string(),
        reason,
    };
    match value {
        Value::Text(text) => {
            if let Ok(dt) = DateTime::parse_from_rfc3339(&text) {
                return Ok(dt.naive_local());
            }
            ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(&text, fmt).ok())
                .ok_or_else(|| invalid(format!("unparseable timestamp {:?}", text)))
        }
        Value::Integer(secs) => DateTime::<Utc>::from_timestamp(secs, 0)
            .map(|dt| dt.naive_utc())
            .ok_or_else(|| invalid(format!("timestamp out of range: {}", secs))),
        Value::Real(secs) => DateTime::<Utc>::from_timestamp(secs.trunc() as i64, 0)
            .map(|dt| dt.naive_utc())
            .ok_or_else(|| invalid(format!("timestamp out of range: {}", secs))),
        other => Err(invalid(format!("unexpected {:?}", other.data_type()))),
    }
}

struct WkbReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> WkbReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], String> {
        let end = self.pos + len;
        if end > self.bytes.len() {
            return Err(format!("truncated geometry at byte {}", self.pos));
        }
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, String> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self, little_endian: bool) -> Result<u32, String> {
        let raw: [u8; 4] = self.take(4)?.try_into().map_err(|_| "bad u32".to_string())?;
        Ok(if little_endian {
            u32::from_le_bytes(raw)
        } else {
            u32::from_be_bytes(raw)
        })
    }

    fn f64(&mut self, little_endian: bool) -> Result<f64, String> {
        let raw: [u8; 8] = self.take(8)?.try_into().map_err(|_| "bad f64".to_string())?;
        Ok(if little_endian {
            f64::from_le_bytes(raw)
        } else {
            f64::from_be_bytes(raw)
        })
    }

    /// Reads a WKB polygon (or the first polygon of a multipolygon) and
    /// returns its exterior ring.
    fn polygon_exterior(&mut self) -> Result<Vec<(f64, f64)>, String> {
        let little_endian = self.u8()? == 1;
        let raw_type = self.u32(little_endian)?;

        // ISO (1000/2000/3000 offsets) and EWKB (high bit flags) dimensions
        let has_z = raw_type & 0x8000_0000 != 0;
        let has_m = raw_type & 0x4000_0000 != 0;
        let iso = raw_type & 0x0FFF_FFFF;
        let (base_type, iso_z, iso_m) = (iso % 1000, matches!(iso / 1000, 1 | 3), matches!(iso / 1000, 2 | 3));
        let dims = 2 + usize::from(has_z || iso_z) + usize::from(has_m || iso_m);

        match base_type {
            3 => {
                let rings = self.u32(little_endian)?;
                if rings == 0 {
                    return Err("polygon without rings".to_string());
                }
                let points = self.u32(little_endian)?;
                // The count comes from the blob; never reserve more than it can hold.
                let remaining = self.bytes.len().saturating_sub(self.pos);
                let mut exterior = Vec::with_capacity((points as usize).min(remaining / (8 * dims)));
                for _ in 0..points {
                    let x = self.f64(little_endian)?;
                    let y = self.f64(little_endian)?;
                    for _ in 2..dims {
                        self.f64(little_endian)?;
                    }
                    exterior.push((x, y));
                }
                Ok(exterior)
            }
            6 => {
                let polygons = self.u32(little_endian)?;
                if polygons == 0 {
                    return Err("empty multipolygon".to_string());
                }
                self.polygon_exterior()
            }
            other => Err(format!("unsupported geometry type {}", other)),
        }
    }
}

/// Decode a GeoPackage geometry blob (GP header + WKB) into a polygon.
pub fn decode_geometry_blob(blob: &[u8]) -> Result<Polygon, String> {
    let mut reader = WkbReader::new(blob);
    if reader.take(2)? != b"GP" {
        return Err("missing GP magic".to_string());
    }
    let _version = reader.u8()?;
    let flags = reader.u8()?;
    if flags & 0b0001_0000 != 0 {
        return Err("empty geometry".to_string());
    }
    let header_little_endian = flags & 0b0000_0001 != 0;
    let _srs_id = reader.u32(header_little_endian)?;

    let envelope_len = match (flags >> 1) & 0b111 {
        0 => 0,
        1 => 32,
        2 | 3 => 48,
        4 => 64,
        other => return Err(format!("invalid envelope indicator {}", other)),
    };
    reader.take(envelope_len)?;

    let exterior = reader.polygon_exterior()?;
    Ok(Polygon::new(exterior))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Little-endian GP blob with an XY envelope around a 2D polygon.
    pub(crate) fn polygon_blob(ring: &[(f64, f64)]) -> Vec<u8> {
        let mut blob = Vec::new();
        blob.extend_from_slice(b"GP");
        blob.push(0); // version
        blob.push(0b0000_0011); // little endian, XY envelope
        blob.extend_from_slice(&31256u32.to_le_bytes());
        for v in [0.0f64, 1.0, 0.0, 1.0] {
            blob.extend_from_slice(&v.to_le_bytes());
        }
        blob.push(1);
        blob.extend_from_slice(&3u32.to_le_bytes());
        blob.extend_from_slice(&1u32.to_le_bytes());
        blob.extend_from_slice(&(ring.len() as u32).to_le_bytes());
        for (x, y) in ring {
            blob.extend_from_slice(&x.to_le_bytes());
            blob.extend_from_slice(&y.to_le_bytes());
        }
        blob
    }

    const RING: [(f64, f64); 4] = [(0.0, 0.0), (10.5, 0.0), (10.5, 7.25), (0.0, 0.0)];

    #[test]
    fn test_decode_polygon_with_envelope() {
        let polygon = decode_geometry_blob(&polygon_blob(&RING)).unwrap();
        assert_eq!(polygon.exterior, RING.to_vec());
    }

    #[test]
    fn test_decode_big_endian_multipolygon_z() {
        let mut blob = Vec::new();
        blob.extend_from_slice(b"GP");
        blob.push(0);
        blob.push(0b0000_0000); // big endian header, no envelope
        blob.extend_from_slice(&4326u32.to_be_bytes());
        blob.push(0); // big endian wkb
        blob.extend_from_slice(&1006u32.to_be_bytes()); // MultiPolygon Z
        blob.extend_from_slice(&1u32.to_be_bytes());
        blob.push(0);
        blob.extend_from_slice(&1003u32.to_be_bytes()); // Polygon Z
        blob.extend_from_slice(&1u32.to_be_bytes());
        blob.extend_from_slice(&2u32.to_be_bytes());
        for (x, y, z) in [(1.0f64, 2.0f64, 99.0f64), (3.0, 4.0, 98.0)] {
            blob.extend_from_slice(&x.to_be_bytes());
            blob.extend_from_slice(&y.to_be_bytes());
            blob.extend_from_slice(&z.to_be_bytes());
        }

        let polygon = decode_geometry_blob(&blob).unwrap();
        assert_eq!(polygon.exterior, vec![(1.0, 2.0), (3.0, 4.0)]);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_geometry_blob(b"XX").is_err());
        let mut truncated = polygon_blob(&RING);
        truncated.truncate(truncated.len() - 4);
        assert!(decode_geometry_blob(&truncated).is_err());
    }

    #[test]
    fn test_decode_rejects_oversized_point_count() {
        let mut blob = Vec::new();
        blob.extend_from_slice(b"GP");
        blob.push(0);
        blob.push(0b0000_0001); // little endian, no envelope
        blob.extend_from_slice(&31256u32.to_le_bytes());
        blob.push(1);
        blob.extend_from_slice(&3u32.to_le_bytes());
        blob.extend_from_slice(&1u32.to_le_bytes());
        blob.extend_from_slice(&u32::MAX.to_le_bytes());
        blob.extend_from_slice(&1.0f64.to_le_bytes());

        let err = decode_geometry_blob(&blob).unwrap_err();
        assert!(err.contains("truncated geometry"), "unexpected error: {}", err);
    }

    fn write_trajectory_gpkg(path: &Path) {
        let conn = Connection::open(path).unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE gpkg_geometry_columns (table_name TEXT, column_name TEXT);
            INSERT INTO gpkg_geometry_columns VALUES ('trajectories', 'geom');
            CREATE TABLE trajectories (fid INTEGER PRIMARY KEY, trajectoryid TEXT, geom BLOB);
            "#,
        )
        .unwrap();
        for id in ["16101", "17720_1", "17720_2"] {
            conn.execute(
                "INSERT INTO trajectories (trajectoryid, geom) VALUES (?, ?)",
                params![id, polygon_blob(&RING)],
            )
            .unwrap();
        }
    }

    #[test]
    fn test_load_trajectory_catalog_keeps_null_geometry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trajectories.gpkg");
        write_trajectory_gpkg(&path);
        let conn = Connection::open(&path).unwrap();
        conn.execute(
            "INSERT INTO trajectories (trajectoryid, geom) VALUES ('18000', NULL)",
            [],
        )
        .unwrap();
        drop(conn);

        let config = CatalogConfig {
            trajectories_path: path,
            ..CatalogConfig::default()
        };
        let catalog = load_trajectory_catalog(&config).unwrap();
        assert_eq!(catalog.len(), 4);
        assert_eq!(catalog.ids()[3], "18000");
        assert!(catalog.footprint("18000").is_none());
    }

    #[test]
    fn test_load_trajectory_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trajectories.gpkg");
        write_trajectory_gpkg(&path);

        let config = CatalogConfig {
            trajectories_path: path,
            ..CatalogConfig::default()
        };
        let catalog = load_trajectory_catalog(&config).unwrap();
        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.ids()[1], "17720_1");
        assert_eq!(catalog.footprint("17720_2").unwrap().exterior, RING.to_vec());
    }

    #[test]
    fn test_load_trajectory_catalog_unknown_layer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trajectories.gpkg");
        write_trajectory_gpkg(&path);

        let config = CatalogConfig {
            trajectories_path: path,
            trajectories_layer: Some("missing".to_string()),
            ..CatalogConfig::default()
        };
        let result = load_trajectory_catalog(&config);
        assert!(matches!(result, Err(CatalogError::MissingLayer(_))));
    }

    #[test]
    fn test_load_point_index() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("points.gpkg");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE kappazunder_image_punkte (image_name TEXT, lat REAL, lon REAL, epoch TEXT);
            INSERT INTO kappazunder_image_punkte VALUES ('img_0001.jpg', 48.2082, 16.3738, '2020-05-12T10:11:12.500Z');
            INSERT INTO kappazunder_image_punkte VALUES ('img_0002.jpg', 48.2083, 16.3739, '2020-05-12 10:11:13');
            "#,
        )
        .unwrap();
        drop(conn);

        let config = CatalogConfig {
            points_path: path,
            ..CatalogConfig::default()
        };
        let index = load_point_index(&config).unwrap();
        assert_eq!(index.len(), 2);

        let first = index.get("img_0001.jpg").unwrap();
        assert_eq!(first.lat, 48.2082);
        assert_eq!(
            first.captured_at.format("%Y:%m:%d %H:%M:%S").to_string(),
            "2020:05:12 10:11:12"
        );
        assert_eq!(
            index.get("img_0002.jpg").unwrap().captured_at.format("%H:%M:%S").to_string(),
            "10:11:13"
        );
        assert!(index.get("missing.jpg").is_none());
    }
}
