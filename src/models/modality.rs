use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// One kind of input raster shipped in an archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Band {
    /// RGB satellite imagery, 3 channels, 0-255.
    Satellite,
    /// Building count, 1 channel.
    BuildingCount,
    /// Building height, 1 channel.
    BuildingHeight,
}

impl Band {
    /// Folder the band's tiles live in inside an uploaded archive.
    pub fn folder(self) -> &'static str {
        match self {
            Band::Satellite => "satellite-256",
            Band::BuildingCount => "bc-256",
            Band::BuildingHeight => "bh-256",
        }
    }

    pub fn channels(self) -> usize {
        match self {
            Band::Satellite => 3,
            Band::BuildingCount | Band::BuildingHeight => 1,
        }
    }

    /// Per-channel normalisation mean, matching the training setup.
    pub fn mean(self) -> &'static [f32] {
        match self {
            Band::Satellite => &[0.339_693_13, 0.352_394_9, 0.281_354_68],
            Band::BuildingCount => &[0.000_943_623_1],
            Band::BuildingHeight => &[3.086_625_3],
        }
    }

    /// Per-channel normalisation standard deviation.
    pub fn std(self) -> &'static [f32] {
        match self {
            Band::Satellite => &[0.235_945_16, 0.203_536_6, 0.203_147_76],
            Band::BuildingCount => &[0.001_719_754_4],
            Band::BuildingHeight => &[5.610_204_7],
        }
    }
}

/// Subset of input rasters a model expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
pub enum Modality {
    #[serde(rename = "satellite")]
    #[strum(serialize = "satellite")]
    Satellite,
    #[serde(rename = "bc")]
    #[strum(serialize = "bc")]
    BuildingCount,
    #[serde(rename = "bh")]
    #[strum(serialize = "bh")]
    BuildingHeight,
    #[serde(rename = "bc+sat")]
    #[strum(serialize = "bc+sat")]
    BuildingCountSatellite,
    #[serde(rename = "all")]
    #[strum(serialize = "all")]
    All,
}

impl Modality {
    /// Bands stacked into the model input, in channel order.
    pub fn bands(self) -> &'static [Band] {
        match self {
            Modality::Satellite => &[Band::Satellite],
            Modality::BuildingCount => &[Band::BuildingCount],
            Modality::BuildingHeight => &[Band::BuildingHeight],
            Modality::BuildingCountSatellite => &[Band::Satellite, Band::BuildingCount],
            Modality::All => &[Band::Satellite, Band::BuildingCount, Band::BuildingHeight],
        }
    }

    pub fn required_folders(self) -> Vec<&'static str> {
        self.bands().iter().map(|b| b.folder()).collect()
    }

    pub fn input_channels(self) -> usize {
        self.bands().iter().map(|b| b.channels()).sum()
    }
}
