//! Tile rasters and archives built in memory for the API tests.
#![allow(dead_code)]

use image::{DynamicImage, ImageBuffer, ImageFormat, Luma, Rgb, RgbImage};
use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;

pub const TILE_EDGE: u32 = 8;

/// TIFF-encoded RGB tile filled with one grey level.
pub fn satellite_tile(level: u8) -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(
        TILE_EDGE,
        TILE_EDGE,
        Rgb([level, level, level]),
    ));
    encode_tiff(&img)
}

/// TIFF-encoded single-band tile, as found in the building count and height folders.
pub fn band_tile(value: u16) -> Vec<u8> {
    let img: ImageBuffer<Luma<u16>, Vec<u16>> =
        ImageBuffer::from_pixel(TILE_EDGE, TILE_EDGE, Luma([value]));
    encode_tiff(&DynamicImage::ImageLuma16(img))
}

fn encode_tiff(img: &DynamicImage) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Tiff).unwrap();
    buf.into_inner()
}

pub fn zip_archive(entries: &[(String, Vec<u8>)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data) in entries {
        writer
            .start_file(name.as_str(), SimpleFileOptions::default())
            .unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

fn tile_name(folder: &str, index: usize) -> String {
    format!("{folder}/qc_{index}_0.tif")
}

/// `count` satellite tiles laid out in one row.
pub fn satellite_archive(count: usize) -> Vec<u8> {
    let entries: Vec<(String, Vec<u8>)> = (0..count)
        .map(|i| (tile_name("satellite-256", i), satellite_tile(180)))
        .collect();
    zip_archive(&entries)
}

/// Like [`satellite_archive`], with the tile at `corrupt_index` replaced by junk bytes.
pub fn satellite_archive_with_corrupt_tile(count: usize, corrupt_index: usize) -> Vec<u8> {
    let entries: Vec<(String, Vec<u8>)> = (0..count)
        .map(|i| {
            let data = if i == corrupt_index {
                b"definitely not a tiff".to_vec()
            } else {
                satellite_tile(180)
            };
            (tile_name("satellite-256", i), data)
        })
        .collect();
    zip_archive(&entries)
}

/// All three modality folders with matching tile ids.
pub fn full_modality_archive(count: usize) -> Vec<u8> {
    let mut entries = Vec::new();
    for i in 0..count {
        entries.push((tile_name("satellite-256", i), satellite_tile(120)));
        entries.push((tile_name("bc-256", i), band_tile(3)));
        entries.push((tile_name("bh-256", i), band_tile(12)));
    }
    zip_archive(&entries)
}

/// Two tiles at opposite corners of a grid far too large to render.
pub fn sparse_satellite_archive() -> Vec<u8> {
    zip_archive(&[
        ("satellite-256/qc_0_0.tif".to_string(), satellite_tile(180)),
        (
            "satellite-256/qc_1000000_1000000.tif".to_string(),
            satellite_tile(180),
        ),
    ])
}

/// The same tile id under two different parent directories.
pub fn duplicate_tile_archive() -> Vec<u8> {
    zip_archive(&[
        ("north/satellite-256/qc_0_0.tif".to_string(), satellite_tile(180)),
        ("south/satellite-256/qc_0_0.tif".to_string(), satellite_tile(90)),
    ])
}
