use std::fmt;

use serde::Serialize;

/// Model number reported by the LCR03F pressure transducer.
pub const MODEL_PRESSURE_LCR03F: &str = "TDWLB-LCR03F";

/// Device model, resolved from the model-number characteristic.
///
/// Unrecognized model numbers are kept as [`DeviceType::Unknown`] with the raw string so that
/// the device can still be polled and diagnosed.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "kind", content = "raw", rename_all = "snake_case")]
pub enum DeviceType {
    PressureLcr03f,
    Unknown(String),
    /// No model has been read yet.
    #[default]
    Unresolved,
}

impl DeviceType {
    /// Resolve a raw model-number string. Matching is case-sensitive after trimming.
    pub fn from_raw_value(raw: &str) -> Self {
        let raw = raw.trim();
        match raw {
            MODEL_PRESSURE_LCR03F => Self::PressureLcr03f,
            _ => Self::Unknown(raw.to_string()),
        }
    }

    /// The model-number string this type was derived from.
    pub fn raw_value(&self) -> &str {
        match self {
            Self::PressureLcr03f => MODEL_PRESSURE_LCR03F,
            Self::Unknown(raw) => raw,
            Self::Unresolved => "",
        }
    }

    pub fn product_name(&self) -> &'static str {
        match self {
            Self::PressureLcr03f => "Pressure LCR03F",
            Self::Unknown(_) | Self::Unresolved => "Unknown",
        }
    }

    pub fn is_resolved(&self) -> bool {
        !matches!(self, Self::Unresolved)
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown(raw) if !raw.is_empty() => write!(f, "Unknown ({})", raw),
            other => write!(f, "{}", other.product_name()),
        }
    }
}
