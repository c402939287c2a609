//! Voice metadata and gender-aware voice selection.
//!
//! Platforms rarely say which of their voices are female or male, so selection
//! is a heuristic: restrict to the target locale, look for gender keywords in
//! the voice name (given names, the words for "female"/"male"), then fall back
//! on list position.  It always degrades to *some* voice rather than failing.

use std::fmt;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// A voice offered by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voice {
    /// Identifier passed back to the backend in [`Utterance::voice`](crate::Utterance::voice).
    pub id: String,
    /// Human-readable name, e.g. `"Microsoft Maria - Portuguese (Brazil)"`.
    pub name: String,
    /// Language tag, e.g. `"pt-BR"`.
    pub lang: String,
}

impl Voice {
    pub fn new(id: impl Into<String>, name: impl Into<String>, lang: impl Into<String>) -> Self {
        Self { id: id.into(), name: name.into(), lang: lang.into() }
    }
}

/// Preferred narrator voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoiceGender {
    #[default]
    Female,
    Male,
}

impl VoiceGender {
    pub fn other(self) -> Self {
        match self {
            Self::Female => Self::Male,
            Self::Male => Self::Female,
        }
    }
}

impl fmt::Display for VoiceGender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Female => "female",
            Self::Male => "male",
        })
    }
}

impl std::str::FromStr for VoiceGender {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "female" | "f" => Ok(Self::Female),
            "male" | "m" => Ok(Self::Male),
            other => Err(format!("unknown voice gender '{other}' (expected female or male)")),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Keyword table
// ─────────────────────────────────────────────────────────────────────────────

static DEFAULT_FEMALE: Lazy<Vec<String>> = Lazy::new(|| {
    ["maria", "ana", "luciana", "francisca", "female", "feminino", "mulher"]
        .iter()
        .map(|s| s.to_string())
        .collect()
});

static DEFAULT_MALE: Lazy<Vec<String>> = Lazy::new(|| {
    ["daniel", "ricardo", "antonio", "antônio", "male", "masculino", "homem"]
        .iter()
        .map(|s| s.to_string())
        .collect()
});

/// Lower-case name fragments associated with each gender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceKeywords {
    pub female: Vec<String>,
    pub male: Vec<String>,
}

impl Default for VoiceKeywords {
    fn default() -> Self {
        Self { female: DEFAULT_FEMALE.clone(), male: DEFAULT_MALE.clone() }
    }
}

impl VoiceKeywords {
    pub fn for_gender(&self, gender: VoiceGender) -> &[String] {
        match gender {
            VoiceGender::Female => &self.female,
            VoiceGender::Male => &self.male,
        }
    }

    /// `true` if `name` carries a keyword for `gender`.  A name hitting both
    /// tables belongs to the gender whose matching keyword is longer, so
    /// "Female" stays female although it contains "male"; a tie counts for
    /// both.
    fn name_matches(&self, name: &str, gender: VoiceGender) -> bool {
        let name = name.to_lowercase();
        let longest_hit = |keywords: &[String]| {
            keywords
                .iter()
                .map(|k| k.to_lowercase())
                .filter(|k| !k.is_empty() && name.contains(k.as_str()))
                .map(|k| k.chars().count())
                .max()
                .unwrap_or(0)
        };
        let own = longest_hit(self.for_gender(gender));
        own > 0 && own >= longest_hit(self.for_gender(gender.other()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Selection
// ─────────────────────────────────────────────────────────────────────────────

/// Pick the voice for the next utterance.
///
/// 1. Keep voices whose language tag starts with `locale_prefix`.
/// 2. If none do, return the first voice overall.
/// 3. Otherwise prefer a locale voice whose name carries a `gender` keyword
///    (case-insensitive substring).  Names hitting both keyword tables go to
///    the gender with the longer matching keyword.
/// 4. Positional fallback: first locale voice for female, second for male
///    (first if there is only one).
///
/// Returns `None` only when `voices` is empty.
pub fn select_voice<'a>(
    voices: &'a [Voice],
    locale_prefix: &str,
    gender: VoiceGender,
    keywords: &VoiceKeywords,
) -> Option<&'a Voice> {
    let prefix = locale_prefix.to_lowercase();
    let local: Vec<&Voice> = voices
        .iter()
        .filter(|v| v.lang.to_lowercase().starts_with(&prefix))
        .collect();

    if local.is_empty() {
        return voices.first();
    }

    if let Some(found) = local.iter().find(|v| keywords.name_matches(&v.name, gender)) {
        return Some(found);
    }

    match gender {
        VoiceGender::Female => local.first().copied(),
        VoiceGender::Male => local.get(1).or_else(|| local.first()).copied(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn v(name: &str, lang: &str) -> Voice {
        Voice::new(name, name, lang)
    }

    fn pick<'a>(voices: &'a [Voice], gender: VoiceGender) -> Option<&'a str> {
        select_voice(voices, "pt", gender, &VoiceKeywords::default()).map(|v| v.name.as_str())
    }

    #[test]
    fn test_empty_list_selects_nothing() {
        assert_eq!(pick(&[], VoiceGender::Female), None);
        assert_eq!(pick(&[], VoiceGender::Male), None);
    }

    #[test]
    fn test_no_locale_voice_falls_back_to_first() {
        let voices = [v("Samantha", "en-US"), v("Daniel", "en-GB")];
        // Gender is ignored: "Daniel" would match, but it is not a pt voice.
        assert_eq!(pick(&voices, VoiceGender::Male), Some("Samantha"));
    }

    #[test]
    fn test_keyword_match_within_locale() {
        let voices = [
            v("Google português do Brasil", "pt-BR"),
            v("Microsoft Daniel", "pt-BR"),
            v("Microsoft Maria", "pt-BR"),
        ];
        assert_eq!(pick(&voices, VoiceGender::Female), Some("Microsoft Maria"));
        assert_eq!(pick(&voices, VoiceGender::Male), Some("Microsoft Daniel"));
    }

    #[test]
    fn test_keyword_match_is_case_insensitive() {
        let voices = [v("Luca", "pt-PT"), v("LUCIANA", "pt-PT")];
        assert_eq!(pick(&voices, VoiceGender::Female), Some("LUCIANA"));
    }

    #[test]
    fn test_female_word_is_not_a_male_match() {
        let voices = [v("Voz Female", "pt-BR"), v("Voz 2", "pt-BR")];
        assert_eq!(pick(&voices, VoiceGender::Male), Some("Voz 2"));
        assert_eq!(pick(&voices, VoiceGender::Female), Some("Voz Female"));
    }

    #[test]
    fn test_name_in_both_tables_goes_to_longer_keyword() {
        let voices = [v("Voz 1", "pt-BR"), v("Maria Daniel", "pt-BR")];
        assert_eq!(pick(&voices, VoiceGender::Male), Some("Maria Daniel"));
        assert_eq!(pick(&voices, VoiceGender::Female), Some("Voz 1"));
    }

    #[test]
    fn test_positional_fallback() {
        let voices = [v("Voz A", "pt-BR"), v("Voz B", "pt-BR"), v("Voz C", "pt-BR")];
        assert_eq!(pick(&voices, VoiceGender::Female), Some("Voz A"));
        assert_eq!(pick(&voices, VoiceGender::Male), Some("Voz B"));
    }

    #[test]
    fn test_single_locale_voice_serves_both() {
        let voices = [v("English", "en-US"), v("Voz", "pt-BR")];
        assert_eq!(pick(&voices, VoiceGender::Female), Some("Voz"));
        assert_eq!(pick(&voices, VoiceGender::Male), Some("Voz"));
    }

    #[test]
    fn test_custom_keywords() {
        let keywords = VoiceKeywords { female: vec!["joana".into()], male: vec!["rui".into()] };
        let voices = [v("Voz Joana", "pt-PT"), v("Voz Rui", "pt-PT")];
        let male = select_voice(&voices, "pt", VoiceGender::Male, &keywords).unwrap();
        assert_eq!(male.name, "Voz Rui");
    }

    #[test]
    fn test_gender_parse_and_display() {
        assert_eq!("Male".parse::<VoiceGender>().unwrap(), VoiceGender::Male);
        assert_eq!("f".parse::<VoiceGender>().unwrap(), VoiceGender::Female);
        assert!("robot".parse::<VoiceGender>().is_err());
        assert_eq!(VoiceGender::Female.to_string(), "female");
        assert_eq!(VoiceGender::Female.other(), VoiceGender::Male);
    }
}
