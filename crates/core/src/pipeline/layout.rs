//! Filesystem layout of an extracted archive.
//!
//! An archive unpacks to `<root>/<lot>/Bild-Rohdaten/Trajektorie_<id>/Sensor_<n>/`,
//! possibly with several lots and with neighbouring trajectories that happen
//! to intersect the requested footprint. All functions here are blocking.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::trajectory::Sensor;

/// Directory holding the per-trajectory image folders inside a lot.
pub const RAW_IMAGES_DIR: &str = "Bild-Rohdaten";

/// Prefix of per-trajectory directories.
pub const TRAJECTORY_DIR_PREFIX: &str = "Trajektorie_";

/// Prefix of per-camera directories.
pub const SENSOR_DIR_PREFIX: &str = "Sensor_";

/// Camera directories ending in these digits look straight up or down.
pub const DROPPED_ORIENTATION_SUFFIXES: [char; 2] = ['0', '5'];

/// Unpack a tar archive into `dest`.
pub fn extract_archive(archive: &Path, dest: &Path) -> io::Result<()> {
    fs::create_dir_all(dest)?;
    let file = fs::File::open(archive)?;
    let mut archive = tar::Archive::new(file);
    archive.unpack(dest)
}

fn subdirs(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}

fn dir_name(path: &Path) -> &str {
    path.file_name().and_then(|n| n.to_str()).unwrap_or_default()
}

/// All `Bild-Rohdaten` directories under the extraction root.
fn raw_image_dirs(root: &Path) -> io::Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for lot in subdirs(root)? {
        let raw = lot.join(RAW_IMAGES_DIR);
        if raw.is_dir() {
            found.push(raw);
        }
    }
    Ok(found)
}

/// Directories for `base_id` across every lot, i.e. `<root>/*/Bild-Rohdaten/Trajektorie_<base_id>`.
pub fn trajectory_dirs(root: &Path, base_id: &str) -> io::Result<Vec<PathBuf>> {
    let wanted = format!("{}{}", TRAJECTORY_DIR_PREFIX, base_id);
    let mut found = Vec::new();
    for raw in raw_image_dirs(root)? {
        let candidate = raw.join(&wanted);
        if candidate.is_dir() {
            found.push(candidate);
        }
    }
    Ok(found)
}

/// Remove every trajectory directory under `root` that is not in `keep`.
/// Returns the number of directories removed.
pub fn prune_other_trajectories(root: &Path, keep: &[PathBuf]) -> io::Result<usize> {
    let mut removed = 0;
    for raw in raw_image_dirs(root)? {
        for dir in subdirs(&raw)? {
            if dir_name(&dir).starts_with(TRAJECTORY_DIR_PREFIX) && !keep.contains(&dir) {
                fs::remove_dir_all(&dir)?;
                removed += 1;
            }
        }
    }
    Ok(removed)
}

/// Remove the upward and downward facing camera directories.
/// Returns the number of directories removed.
pub fn drop_vertical_orientations(trajectory_dirs: &[PathBuf]) -> io::Result<usize> {
    let mut removed = 0;
    for trajectory in trajectory_dirs {
        for dir in subdirs(trajectory)? {
            let dropped = dir_name(&dir)
                .chars()
                .last()
                .is_some_and(|c| DROPPED_ORIENTATION_SUFFIXES.contains(&c));
            if dropped {
                fs::remove_dir_all(&dir)?;
                removed += 1;
            }
        }
    }
    Ok(removed)
}

/// Camera directories belonging to `sensor`: `Sensor_*<n>` in each trajectory directory.
pub fn sensor_dirs(trajectory_dirs: &[PathBuf], sensor: Sensor) -> io::Result<Vec<PathBuf>> {
    let digit = char::from_digit(sensor.number() as u32, 10).unwrap_or('?');
    let mut found = Vec::new();
    for trajectory in trajectory_dirs {
        for dir in subdirs(trajectory)? {
            let name = dir_name(&dir);
            if name.starts_with(SENSOR_DIR_PREFIX) && name.ends_with(digit) {
                found.push(dir);
            }
        }
    }
    Ok(found)
}

/// Regular files directly inside `dir`, sorted by name.
pub fn image_files(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Build an extracted-archive tree: one lot with the given trajectories,
    /// each holding `Sensor_10`..`Sensor_15` with one image apiece.
    pub(crate) fn build_tree(root: &Path, lot: &str, trajectories: &[&str]) -> Vec<PathBuf> {
        let mut dirs = Vec::new();
        for id in trajectories {
            let traj = root
                .join(lot)
                .join(RAW_IMAGES_DIR)
                .join(format!("{}{}", TRAJECTORY_DIR_PREFIX, id));
            for n in 10..=15 {
                let sensor = traj.join(format!("{}{}", SENSOR_DIR_PREFIX, n));
                fs::create_dir_all(&sensor).unwrap();
                fs::write(sensor.join(format!("img_{}_{}.jpg", id, n)), b"jpeg").unwrap();
            }
            dirs.push(traj);
        }
        dirs
    }

    #[test]
    fn test_trajectory_dirs_across_lots() {
        let tmp = TempDir::new().unwrap();
        build_tree(tmp.path(), "Lot_A", &["100", "200"]);
        build_tree(tmp.path(), "Lot_B", &["100"]);

        let found = trajectory_dirs(tmp.path(), "100").unwrap();
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|d| d.ends_with("Trajektorie_100")));

        assert!(trajectory_dirs(tmp.path(), "300").unwrap().is_empty());
    }

    #[test]
    fn test_prune_other_trajectories() {
        let tmp = TempDir::new().unwrap();
        build_tree(tmp.path(), "Lot_A", &["100", "200", "300"]);
        let keep = trajectory_dirs(tmp.path(), "100").unwrap();

        let removed = prune_other_trajectories(tmp.path(), &keep).unwrap();
        assert_eq!(removed, 2);

        let raw = tmp.path().join("Lot_A").join(RAW_IMAGES_DIR);
        assert!(raw.join("Trajektorie_100").is_dir());
        assert!(!raw.join("Trajektorie_200").exists());
        assert!(!raw.join("Trajektorie_300").exists());
    }

    #[test]
    fn test_drop_vertical_orientations() {
        let tmp = TempDir::new().unwrap();
        let dirs = build_tree(tmp.path(), "Lot_A", &["100"]);

        let removed = drop_vertical_orientations(&dirs).unwrap();
        assert_eq!(removed, 2);

        let remaining: Vec<String> = subdirs(&dirs[0])
            .unwrap()
            .iter()
            .map(|d| dir_name(d).to_string())
            .collect();
        assert_eq!(
            remaining,
            vec!["Sensor_11", "Sensor_12", "Sensor_13", "Sensor_14"]
        );
    }

    #[test]
    fn test_sensor_dirs_matches_suffix() {
        let tmp = TempDir::new().unwrap();
        build_tree(tmp.path(), "Lot_A", &["100"]);
        build_tree(tmp.path(), "Lot_B", &["100"]);
        let dirs = trajectory_dirs(tmp.path(), "100").unwrap();

        let found = sensor_dirs(&dirs, Sensor::Three).unwrap();
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|d| d.ends_with("Sensor_13")));
    }

    #[test]
    fn test_extract_archive() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        build_tree(&src, "Lot_A", &["100"]);

        let archive_path = tmp.path().join("dl.tar");
        {
            let file = fs::File::create(&archive_path).unwrap();
            let mut builder = tar::Builder::new(file);
            builder.append_dir_all("Lot_A", src.join("Lot_A")).unwrap();
            builder.finish().unwrap();
        }

        let dest = tmp.path().join("dl");
        extract_archive(&archive_path, &dest).unwrap();
        assert_eq!(trajectory_dirs(&dest, "100").unwrap().len(), 1);
    }

    #[test]
    fn test_extract_archive_rejects_garbage() {
        let tmp = TempDir::new().unwrap();
        let archive_path = tmp.path().join("dl.tar");
        fs::write(&archive_path, vec![0x42u8; 1500]).unwrap();

        let dest = tmp.path().join("dl");
        assert!(extract_archive(&archive_path, &dest).is_err());
    }

    #[test]
    fn test_image_files_sorted() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("b.jpg"), b"").unwrap();
        fs::write(tmp.path().join("a.jpg"), b"").unwrap();
        fs::create_dir(tmp.path().join("nested")).unwrap();

        let files = image_files(tmp.path()).unwrap();
        let names: Vec<&str> = files.iter().map(|p| dir_name(p)).collect();
        assert_eq!(names, vec!["a.jpg", "b.jpg"]);
    }
}
