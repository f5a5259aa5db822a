use std::collections::{BTreeMap, BTreeSet};
use std::io::{Cursor, Read};
use std::path::Path;

use zip::ZipArchive;

use crate::services::mosaic::GeoReference;

/// Optional sidecar that pins the archive's tiles to a location.
const GEOREF_FILE: &str = "georef.json";

/// Default cap on the decompressed size of a single entry.
pub const DEFAULT_MAX_ENTRY_BYTES: u64 = 64 * 1024 * 1024;

/// What a quick look at an uploaded archive found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveSummary {
    pub raster_count: usize,
    pub folders: BTreeSet<String>,
}

/// Cheap validation used at submission: readable ZIP with at least one raster.
///
/// Only the central directory is read, no entry is decompressed.
pub fn inspect(bytes: &[u8]) -> Result<ArchiveSummary, ArchiveError> {
    let archive = ZipArchive::new(Cursor::new(bytes))?;
    let mut raster_count = 0;
    let mut folders = BTreeSet::new();

    for name in archive.file_names() {
        if let Some((folder, _)) = raster_location(name) {
            raster_count += 1;
            folders.insert(folder);
        }
    }

    if raster_count == 0 {
        return Err(ArchiveError::NoRasters);
    }

    Ok(ArchiveSummary { raster_count, folders })
}

/// Uploaded archive indexed by modality folder and tile id.
pub struct TileArchive {
    archive: ZipArchive<Cursor<Vec<u8>>>,
    /// folder -> tile id -> entry name
    index: BTreeMap<String, BTreeMap<String, String>>,
    georef_entry: Option<String>,
    max_entry_bytes: u64,
}

impl TileArchive {
    /// Index the archive. Entries larger than `max_entry_bytes` once
    /// decompressed are refused when read.
    pub fn open(bytes: Vec<u8>, max_entry_bytes: u64) -> Result<Self, ArchiveError> {
        let archive = ZipArchive::new(Cursor::new(bytes))?;
        let mut index: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
        let mut georef_entry = None;

        for name in archive.file_names() {
            if is_ignored(name) {
                continue;
            }
            if let Some((folder, tile_id)) = raster_location(name) {
                let tiles = index.entry(folder.clone()).or_default();
                if let Some(first) = tiles.insert(tile_id.clone(), name.to_string()) {
                    return Err(ArchiveError::DuplicateTile {
                        folder,
                        tile_id,
                        first,
                        second: name.to_string(),
                    });
                }
            } else if file_name(name) == Some(GEOREF_FILE) {
                georef_entry = Some(name.to_string());
            }
        }

        Ok(Self {
            archive,
            index,
            georef_entry,
            max_entry_bytes,
        })
    }

    /// Modality folders that contain at least one raster.
    pub fn folders(&self) -> Vec<String> {
        self.index.keys().cloned().collect()
    }

    /// Sorted tile ids found in `folder`.
    pub fn tile_ids(&self, folder: &str) -> Vec<String> {
        self.index
            .get(folder)
            .map(|tiles| tiles.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn contains(&self, folder: &str, tile_id: &str) -> bool {
        self.index
            .get(folder)
            .is_some_and(|tiles| tiles.contains_key(tile_id))
    }

    pub fn read(&mut self, folder: &str, tile_id: &str) -> Result<Vec<u8>, ArchiveError> {
        let name = self
            .index
            .get(folder)
            .and_then(|tiles| tiles.get(tile_id))
            .cloned()
            .ok_or_else(|| ArchiveError::MissingTile {
                folder: folder.to_string(),
                tile_id: tile_id.to_string(),
            })?;
        self.read_entry(&name)
    }

    /// Georeference shipped inside the archive, if any.
    pub fn georeference(&mut self) -> Result<Option<GeoReference>, ArchiveError> {
        let Some(name) = self.georef_entry.clone() else {
            return Ok(None);
        };
        let raw = self.read_entry(&name)?;
        let georef = serde_json::from_slice(&raw).map_err(ArchiveError::Georef)?;
        Ok(Some(georef))
    }

    fn read_entry(&mut self, name: &str) -> Result<Vec<u8>, ArchiveError> {
        let limit = self.max_entry_bytes;
        let entry = self.archive.by_name(name)?;
        // The size declared in the header is not trusted.
        let mut buf = Vec::new();
        entry.take(limit.saturating_add(1)).read_to_end(&mut buf)?;
        if buf.len() as u64 > limit {
            return Err(ArchiveError::EntryTooLarge {
                name: name.to_string(),
                limit,
            });
        }
        Ok(buf)
    }
}

/// `(folder, tile id)` for raster entries, where folder is the parent directory name.
fn raster_location(name: &str) -> Option<(String, String)> {
    if name.ends_with('/') || is_ignored(name) {
        return None;
    }
    let path = Path::new(name);
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    if ext != "tif" && ext != "tiff" {
        return None;
    }
    let stem = path.file_stem()?.to_str()?.to_string();
    let folder = path
        .parent()
        .and_then(|p| p.file_name())
        .and_then(|f| f.to_str())
        .unwrap_or("")
        .to_string();
    Some((folder, stem))
}

fn file_name(name: &str) -> Option<&str> {
    Path::new(name).file_name().and_then(|f| f.to_str())
}

fn is_ignored(name: &str) -> bool {
    name.starts_with("__MACOSX/")
        || file_name(name).is_some_and(|f| f.starts_with("._"))
}

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("Upload is not a readable ZIP archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Archive contains no .tif raster files")]
    NoRasters,

    #[error("Tile '{tile_id}' is missing from folder '{folder}'")]
    MissingTile { folder: String, tile_id: String },

    #[error("Tile '{tile_id}' appears twice in folder '{folder}' ({first} and {second})")]
    DuplicateTile {
        folder: String,
        tile_id: String,
        first: String,
        second: String,
    },

    #[error("Archive entry '{name}' exceeds the {limit} byte limit when decompressed")]
    EntryTooLarge { name: String, limit: u64 },

    #[error("Archive entry could not be read: {0}")]
    Io(#[from] std::io::Error),

    #[error("georef.json is invalid: {0}")]
    Georef(serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data) in entries {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_inspect_counts_rasters_per_folder() {
        let bytes = build_zip(&[
            ("upload/satellite-256/qc_0_0.tif", b"a"),
            ("upload/satellite-256/qc_1_0.TIF", b"b"),
            ("upload/bc-256/qc_0_0.tiff", b"c"),
            ("upload/readme.txt", b"d"),
        ]);
        let summary = inspect(&bytes).unwrap();
        assert_eq!(summary.raster_count, 3);
        assert!(summary.folders.contains("satellite-256"));
        assert!(summary.folders.contains("bc-256"));
    }

    #[test]
    fn test_inspect_rejects_non_zip() {
        assert!(matches!(inspect(b"definitely not a zip"), Err(ArchiveError::Zip(_))));
    }

    #[test]
    fn test_inspect_rejects_archive_without_rasters() {
        let bytes = build_zip(&[("notes/readme.txt", b"hello")]);
        assert!(matches!(inspect(&bytes), Err(ArchiveError::NoRasters)));
    }

    #[test]
    fn test_open_indexes_tiles_and_skips_resource_forks() {
        let bytes = build_zip(&[
            ("satellite-256/qc_0_0.tif", b"tile-a"),
            ("__MACOSX/satellite-256/._qc_0_0.tif", b"junk"),
            ("satellite-256/._qc_9_9.tif", b"junk"),
        ]);
        let mut archive = TileArchive::open(bytes, DEFAULT_MAX_ENTRY_BYTES).unwrap();
        assert_eq!(archive.folders(), vec!["satellite-256".to_string()]);
        assert_eq!(archive.tile_ids("satellite-256"), vec!["qc_0_0".to_string()]);
        assert_eq!(archive.read("satellite-256", "qc_0_0").unwrap(), b"tile-a");
        assert!(matches!(
            archive.read("bc-256", "qc_0_0"),
            Err(ArchiveError::MissingTile { .. })
        ));
    }

    #[test]
    fn test_georef_sidecar() {
        let bytes = build_zip(&[
            ("satellite-256/qc_0_0.tif", b"tile"),
            (
                "georef.json",
                br#"{"origin_lon": 10.0, "origin_lat": 50.0, "tile_ground_size_m": 100.0}"#,
            ),
        ]);
        let mut archive = TileArchive::open(bytes, DEFAULT_MAX_ENTRY_BYTES).unwrap();
        let georef = archive.georeference().unwrap().unwrap();
        assert_eq!(georef.origin_lon, 10.0);
        assert_eq!(georef.tile_ground_size_m, 100.0);
    }

    #[test]
    fn test_entry_over_decompressed_limit_is_refused() {
        // Highly compressible, so the stored entry is far smaller than its content.
        let big = vec![0u8; 4096];
        let bytes = build_zip(&[("satellite-256/qc_0_0.tif", big.as_slice())]);
        let mut archive = TileArchive::open(bytes, 1024).unwrap();
        match archive.read("satellite-256", "qc_0_0") {
            Err(ArchiveError::EntryTooLarge { name, limit }) => {
                assert_eq!(name, "satellite-256/qc_0_0.tif");
                assert_eq!(limit, 1024);
            }
            other => panic!("expected EntryTooLarge, got {other:?}"),
        }
    }

    #[test]
    fn test_entry_at_limit_is_read() {
        let exact = vec![7u8; 1024];
        let bytes = build_zip(&[("satellite-256/qc_0_0.tif", exact.as_slice())]);
        let mut archive = TileArchive::open(bytes, 1024).unwrap();
        assert_eq!(archive.read("satellite-256", "qc_0_0").unwrap().len(), 1024);
    }

    #[test]
    fn test_duplicate_tiles_are_rejected() {
        for (a, b) in [
            ("north/satellite-256/qc_0_0.tif", "south/satellite-256/qc_0_0.tif"),
            ("satellite-256/qc_0_0.tif", "satellite-256/qc_0_0.tiff"),
        ] {
            let bytes = build_zip(&[(a, b"one"), (b, b"two")]);
            match TileArchive::open(bytes, DEFAULT_MAX_ENTRY_BYTES) {
                Err(ArchiveError::DuplicateTile { folder, tile_id, .. }) => {
                    assert_eq!(folder, "satellite-256");
                    assert_eq!(tile_id, "qc_0_0");
                }
                Err(other) => panic!("expected DuplicateTile for {a} / {b}, got {other:?}"),
                Ok(_) => panic!("expected DuplicateTile for {a} / {b}"),
            }
        }
    }
}
