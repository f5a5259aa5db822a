//! Stitching per-tile prediction masks into one georeferenced overlay.
//!
//! Tiles are placed on a grid, rendered into a single RGBA image and
//! pinned to the map by projecting the grid corners from Web Mercator
//! (EPSG:3857) metres to WGS84 (EPSG:4326) degrees.

use image::{Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::f64::consts::PI;
use std::path::{Path, PathBuf};

use crate::models::job::{Bounds, Dimensions, GridSize, LeafletConfig, ZoomLevels};
use crate::services::inference::Mask;

/// WGS84 semi-major axis used by Web Mercator.
const EARTH_RADIUS_M: f64 = 6_378_137.0;

/// Colour of predicted settlement pixels in the overlay.
const POSITIVE_RGBA: Rgba<u8> = Rgba([220, 38, 38, 200]);

/// Default canvas budget, 1 GiB of RGBA.
pub const DEFAULT_MAX_MOSAIC_PIXELS: u64 = 256 * 1024 * 1024;

const MIN_ZOOM: u8 = 8;
const MAX_ZOOM: u8 = 18;
const OVERLAY_OPACITY: f64 = 0.7;

/// Where tile (0, 0) sits and how much ground a tile covers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoReference {
    pub origin_lon: f64,
    pub origin_lat: f64,
    pub tile_ground_size_m: f64,
}

/// A tile's position on the mosaic grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct GridCell {
    pub col: u32,
    pub row: u32,
}

/// Parse `<prefix>_<col>_<row>` tile ids.
pub fn parse_cell(tile_id: &str) -> Option<GridCell> {
    let mut parts = tile_id.rsplitn(3, '_');
    let row = parts.next()?.parse().ok()?;
    let col = parts.next()?.parse().ok()?;
    parts.next()?;
    Some(GridCell { col, row })
}

/// Assign every tile id a grid cell.
///
/// Ids that all follow the `<prefix>_<col>_<row>` convention keep their
/// coordinates; otherwise tiles are laid out in order on a square-ish grid.
/// Two ids landing on the same cell is an error.
pub fn layout(tile_ids: &[String]) -> Result<Vec<GridCell>, MosaicError> {
    let parsed: Option<Vec<GridCell>> = tile_ids.iter().map(|id| parse_cell(id)).collect();
    if let Some(cells) = parsed {
        let mut owners: BTreeMap<GridCell, &str> = BTreeMap::new();
        for (id, cell) in tile_ids.iter().zip(&cells) {
            if let Some(first) = owners.insert(*cell, id.as_str()) {
                return Err(MosaicError::OverlappingTiles {
                    first: first.to_string(),
                    second: id.clone(),
                    col: cell.col,
                    row: cell.row,
                });
            }
        }
        return Ok(cells);
    }

    tracing::warn!(
        tiles = tile_ids.len(),
        "Tile ids lack grid coordinates, falling back to sequential layout"
    );
    let cols = (tile_ids.len() as f64).sqrt().ceil().max(1.0) as u32;
    Ok((0..tile_ids.len() as u32)
        .map(|i| GridCell { col: i % cols, row: i / cols })
        .collect())
}

/// Stitched prediction raster.
pub struct Mosaic {
    pub image: RgbaImage,
    /// Top-left occupied cell, in absolute grid coordinates.
    pub origin: GridCell,
    pub grid: GridSize,
    pub positive_pixels: u64,
}

impl Mosaic {
    pub fn dimensions(&self) -> Dimensions {
        Dimensions {
            width: self.image.width(),
            height: self.image.height(),
        }
    }

    pub fn positive_fraction(&self) -> f64 {
        let total = u64::from(self.image.width()) * u64::from(self.image.height());
        if total == 0 {
            return 0.0;
        }
        self.positive_pixels as f64 / total as f64
    }

    /// Write the overlay as PNG, creating the parent directory as needed.
    pub fn save(&self, path: &Path) -> Result<(), MosaicError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.image.save(path)?;
        Ok(())
    }
}

/// Combine masks onto one canvas. Cells without a tile stay transparent.
///
/// The canvas spans the bounding box of all cells, so sparse grids are
/// refused once it would exceed `max_pixels`.
pub fn stitch(tiles: &[(GridCell, Mask)], max_pixels: u64) -> Result<Mosaic, MosaicError> {
    let (first_cell, first_mask) = tiles.first().ok_or(MosaicError::Empty)?;
    let (tile_w, tile_h) = (first_mask.width, first_mask.height);

    let mut min = *first_cell;
    let mut max = *first_cell;
    for (cell, mask) in tiles {
        if mask.width != tile_w || mask.height != tile_h {
            return Err(MosaicError::SizeMismatch {
                expected: (tile_w, tile_h),
                found: (mask.width, mask.height),
            });
        }
        min.col = min.col.min(cell.col);
        min.row = min.row.min(cell.row);
        max.col = max.col.max(cell.col);
        max.row = max.row.max(cell.row);
    }

    let cols = u64::from(max.col - min.col) + 1;
    let rows = u64::from(max.row - min.row) + 1;
    let width = cols.checked_mul(u64::from(tile_w));
    let height = rows.checked_mul(u64::from(tile_h));
    let (width, height) = match (width, height) {
        (Some(w), Some(h))
            if cols <= u64::from(u32::MAX)
                && rows <= u64::from(u32::MAX)
                && w <= u64::from(u32::MAX)
                && h <= u64::from(u32::MAX)
                && w.checked_mul(h).is_some_and(|area| area <= max_pixels) =>
        {
            (w as u32, h as u32)
        }
        _ => {
            return Err(MosaicError::TooLarge {
                cols,
                rows,
                tile: (tile_w, tile_h),
                limit: max_pixels,
            })
        }
    };

    let grid = GridSize {
        cols: cols as u32,
        rows: rows as u32,
    };
    let mut image = RgbaImage::new(width, height);
    let mut positive_pixels = 0u64;

    for (cell, mask) in tiles {
        let x0 = (cell.col - min.col) * tile_w;
        let y0 = (cell.row - min.row) * tile_h;
        for y in 0..tile_h {
            for x in 0..tile_w {
                if mask.get(x, y) {
                    image.put_pixel(x0 + x, y0 + y, POSITIVE_RGBA);
                    positive_pixels += 1;
                }
            }
        }
    }

    Ok(Mosaic { image, origin: min, grid, positive_pixels })
}

impl GeoReference {
    /// WGS84 bounds covered by `grid` cells starting at `origin`.
    pub fn bounds(&self, origin: GridCell, grid: GridSize) -> Bounds {
        let (ox, oy) = lonlat_to_mercator(self.origin_lon, self.origin_lat);
        let size = self.tile_ground_size_m;

        let left = ox + f64::from(origin.col) * size;
        let right = left + f64::from(grid.cols) * size;
        let top = oy - f64::from(origin.row) * size;
        let bottom = top - f64::from(grid.rows) * size;

        let (west, north) = mercator_to_lonlat(left, top);
        let (east, south) = mercator_to_lonlat(right, bottom);
        Bounds { south, west, north, east }
    }
}

pub fn lonlat_to_mercator(lon: f64, lat: f64) -> (f64, f64) {
    let x = EARTH_RADIUS_M * lon.to_radians();
    let y = EARTH_RADIUS_M * (PI / 4.0 + lat.to_radians() / 2.0).tan().ln();
    (x, y)
}

pub fn mercator_to_lonlat(x: f64, y: f64) -> (f64, f64) {
    let lon = (x / EARTH_RADIUS_M).to_degrees();
    let lat = (2.0 * (y / EARTH_RADIUS_M).exp().atan() - PI / 2.0).to_degrees();
    (lon, lat)
}

/// Leaflet overlay settings for a mosaic served at `url`.
pub fn leaflet_config(url: String, bounds: Bounds) -> LeafletConfig {
    LeafletConfig {
        tiff_url: url,
        bounds,
        center: bounds.center(),
        zoom_levels: ZoomLevels {
            min: MIN_ZOOM,
            max: MAX_ZOOM,
            initial: initial_zoom(&bounds),
        },
        crs: "EPSG:4326".to_string(),
        opacity: OVERLAY_OPACITY,
    }
}

/// Zoom at which the overlay's longitude span roughly fills the view.
fn initial_zoom(bounds: &Bounds) -> u8 {
    let span = (bounds.east - bounds.west).abs();
    if span <= 0.0 || !span.is_finite() {
        return MAX_ZOOM;
    }
    let zoom = (360.0 / span).log2().floor();
    zoom.clamp(f64::from(MIN_ZOOM), f64::from(MAX_ZOOM)) as u8
}

/// Output locations for one mosaic.
#[derive(Debug, Clone)]
pub struct ArtifactPaths {
    pub image: PathBuf,
    pub leaflet_config: PathBuf,
    pub url: String,
}

impl ArtifactPaths {
    pub fn new(output_dir: &Path, public_path: &str, name: &str) -> Self {
        Self {
            image: output_dir.join(format!("{name}.png")),
            leaflet_config: output_dir.join(format!("{name}_leaflet_config.json")),
            url: format!("{}/{name}.png", public_path.trim_end_matches('/')),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MosaicError {
    #[error("No tiles to stitch")]
    Empty,

    #[error("Tiles have different sizes: expected {expected:?}, found {found:?}")]
    SizeMismatch { expected: (u32, u32), found: (u32, u32) },

    #[error(
        "Tile grid of {cols}x{rows} cells at {}x{} pixels exceeds the mosaic limit of {limit} pixels",
        .tile.0,
        .tile.1
    )]
    TooLarge {
        cols: u64,
        rows: u64,
        tile: (u32, u32),
        limit: u64,
    },

    #[error("Tiles '{first}' and '{second}' both map to grid cell ({col}, {row})")]
    OverlappingTiles {
        first: String,
        second: String,
        col: u32,
        row: u32,
    },

    #[error("Failed to write prediction raster: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode prediction raster: {0}")]
    Encode(#[from] image::ImageError),
}
