//! Narration settings, loadable from a JSON file.
//!
//! Every field is optional in the file; missing fields take the Brazilian
//! Portuguese defaults the story app ships with.
//!
//! ```json
//! {
//!   "language": "pt-BR",
//!   "locale_prefix": "pt",
//!   "default_speed": 0.9,
//!   "female_pitch": 1.1,
//!   "male_pitch": 0.9,
//!   "keywords": { "female": ["maria", "ana"], "male": ["daniel"] }
//! }
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::voice::{VoiceGender, VoiceKeywords};

/// Default speaking rate (slightly slower than the platform normal).
pub const DEFAULT_SPEED: f32 = 0.9;

/// Deserialised narration config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NarrationConfig {
    /// Language tag set on every utterance.
    pub language: String,

    /// Prefix a voice's language tag must start with to count as local.
    pub locale_prefix: String,

    /// Speed a new session starts with.
    pub default_speed: f32,

    /// Pitch for [`VoiceGender::Female`].
    pub female_pitch: f32,

    /// Pitch for [`VoiceGender::Male`].
    pub male_pitch: f32,

    /// Name fragments used to guess a voice's gender.
    pub keywords: VoiceKeywords,
}

impl Default for NarrationConfig {
    fn default() -> Self {
        Self {
            language: "pt-BR".to_string(),
            locale_prefix: "pt".to_string(),
            default_speed: DEFAULT_SPEED,
            female_pitch: 1.1,
            male_pitch: 0.9,
            keywords: VoiceKeywords::default(),
        }
    }
}

impl NarrationConfig {
    /// Parse a config from a JSON string.
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse narration config")
    }

    /// Read and parse a config file.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Cannot read config: {}", path.display()))?;
        serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse config: {}", path.display()))
    }

    pub fn pitch_for(&self, gender: VoiceGender) -> f32 {
        match gender {
            VoiceGender::Female => self.female_pitch,
            VoiceGender::Male => self.male_pitch,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let c = NarrationConfig::default();
        assert_eq!(c.language, "pt-BR");
        assert_eq!(c.locale_prefix, "pt");
        assert_eq!(c.default_speed, 0.9);
        assert!(c.pitch_for(VoiceGender::Female) > c.pitch_for(VoiceGender::Male));
        assert!(c.keywords.female.iter().any(|k| k == "maria"));
    }

    #[test]
    fn test_empty_object_is_default() {
        let c = NarrationConfig::from_json_str("{}").unwrap();
        assert_eq!(c, NarrationConfig::default());
    }

    #[test]
    fn test_partial_override() {
        let c = NarrationConfig::from_json_str(
            r#"{ "language": "pt-PT", "keywords": { "male": ["rui"] } }"#,
        )
        .unwrap();
        assert_eq!(c.language, "pt-PT");
        assert_eq!(c.locale_prefix, "pt");
        assert_eq!(c.keywords.male, vec!["rui".to_string()]);
        // The female table was not mentioned and keeps its defaults.
        assert_eq!(c.keywords.female, VoiceKeywords::default().female);
    }

    #[test]
    fn test_bad_json_is_an_error() {
        let err = NarrationConfig::from_json_str("{ not json").unwrap_err();
        assert!(format!("{err:#}").contains("narration config"));
    }

    #[test]
    fn test_from_file() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, r#"{{ "default_speed": 1.2, "male_pitch": 0.7 }}"#).unwrap();
        let c = NarrationConfig::from_json_file(f.path()).unwrap();
        assert_eq!(c.default_speed, 1.2);
        assert_eq!(c.male_pitch, 0.7);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = NarrationConfig::from_json_file(&dir.path().join("nope.json")).unwrap_err();
        assert!(format!("{err:#}").contains("Cannot read config"));
    }
}
