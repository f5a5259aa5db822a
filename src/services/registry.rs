use strsim::jaro_winkler;

use crate::models::modality::Modality;

/// Minimum similarity for an unknown key to get a "did you mean" hint.
const SUGGESTION_THRESHOLD: f64 = 0.8;

/// A selectable model: architecture, checkpoint file and expected inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelSpec {
    pub model_type: &'static str,
    pub model_name: &'static str,
    pub checkpoint: &'static str,
    pub modality: Modality,
}

/// Models the frontend can choose from.
pub const MODELS: &[ModelSpec] = &[
    ModelSpec {
        model_type: "convnext_all",
        model_name: "ConvNeXtUNet",
        checkpoint: "convnext-all-7ir38hd4.pth",
        modality: Modality::All,
    },
    ModelSpec {
        model_type: "convnext_bc",
        model_name: "ConvNeXtUNet",
        checkpoint: "convnext-bc-g00wx4xl.pth",
        modality: Modality::BuildingCount,
    },
    ModelSpec {
        model_type: "convnext_satellite",
        model_name: "ConvNeXtUNet",
        checkpoint: "convnext-sat-xqkdckas.pth",
        modality: Modality::Satellite,
    },
    ModelSpec {
        model_type: "convnext_unet_all",
        model_name: "ConvNeXtUNet_PlainDecoder",
        checkpoint: "convnext-unet-all.pth",
        modality: Modality::All,
    },
    ModelSpec {
        model_type: "convnext_bh",
        model_name: "ConvNeXtUNet",
        checkpoint: "convnext-bh.pth",
        modality: Modality::BuildingHeight,
    },
    ModelSpec {
        model_type: "settlenet",
        model_name: "SettleNet",
        checkpoint: "settlenet-rxrj9b9b.pth",
        modality: Modality::All,
    },
];

pub fn lookup(model_type: &str) -> Result<&'static ModelSpec, RegistryError> {
    MODELS
        .iter()
        .find(|m| m.model_type == model_type)
        .ok_or_else(|| RegistryError::Unknown {
            given: model_type.to_string(),
            suggestion: closest(model_type),
            available: MODELS.iter().map(|m| m.model_type).collect::<Vec<_>>().join(", "),
        })
}

fn closest(model_type: &str) -> Option<&'static str> {
    let needle = model_type.to_lowercase();
    MODELS
        .iter()
        .map(|m| (m.model_type, jaro_winkler(&needle, m.model_type)))
        .filter(|(_, score)| *score >= SUGGESTION_THRESHOLD)
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(key, _)| key)
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Unknown model type '{given}'{}. Available types: {available}", .suggestion.map(|s| format!(" (did you mean '{s}'?)")).unwrap_or_default())]
    Unknown {
        given: String,
        suggestion: Option<&'static str>,
        available: String,
    },
}
