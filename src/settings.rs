//! Conversion settings
//!
//! Settings can be built in code, or loaded from YAML or JSON documents
//! where every field is optional:
//!
//! ```yaml
//! auto_beaming: false
//! default_time: [3, 4]
//! divisions: 48
//! ```

use serde::{Deserialize, Serialize};

use crate::error::ConversionError;

/// Options controlling the lowering and the reference MusicXML writer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionSettings {
    /// Initial automatic beaming state (changed by `\autoBeamOff` and friends)
    pub auto_beaming: bool,

    /// Expand volta repeats literally instead of writing repeat barlines
    pub unfold_repeats: bool,

    /// Time signature assumed before the first `\time`
    pub default_time: (u32, u32),

    /// Clef seeded into parts that never set one
    pub default_clef: String,

    /// Fixed divisions per quarter note; derived from the music when unset
    pub divisions: Option<u32>,

    /// MusicXML version attribute written by the reference writer
    pub musicxml_version: String,

    /// Encoding software recorded in the output header
    pub software: Option<String>,
}

impl Default for ConversionSettings {
    fn default() -> Self {
        Self {
            auto_beaming: true,
            unfold_repeats: false,
            default_time: (4, 4),
            default_clef: "treble".to_string(),
            divisions: None,
            musicxml_version: "3.1".to_string(),
            software: Some(concat!("ly-musicxml ", env!("CARGO_PKG_VERSION")).to_string()),
        }
    }
}

impl ConversionSettings {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConversionError> {
        serde_yaml::from_str(yaml).map_err(|e| ConversionError::InvalidSettings(e.to_string()))
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConversionError> {
        serde_json::from_str(json).map_err(|e| ConversionError::InvalidSettings(e.to_string()))
    }

    /// Nominal bar length of the default time signature.
    pub fn default_measure(&self) -> crate::models::Rational {
        let (num, den) = self.default_time;
        crate::models::ratio(num as i64, den.max(1) as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yaml_partial_override() {
        let settings = ConversionSettings::from_yaml_str("auto_beaming: false\ndefault_time: [3, 4]\n")
            .unwrap();
        assert!(!settings.auto_beaming);
        assert_eq!(settings.default_time, (3, 4));
        assert_eq!(settings.default_clef, "treble");
        assert_eq!(settings.divisions, None);
    }

    #[test]
    fn test_json_settings() {
        let settings = ConversionSettings::from_json_str(r#"{"divisions": 24}"#).unwrap();
        assert_eq!(settings.divisions, Some(24));
        assert!(settings.auto_beaming);
    }

    #[test]
    fn test_invalid_settings() {
        let err = ConversionSettings::from_yaml_str("auto_beaming: [").unwrap_err();
        assert!(matches!(err, ConversionError::InvalidSettings(_)));
    }
}
