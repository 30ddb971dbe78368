use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtectionError {
    #[error("unknown protection mode {0:?}")]
    UnknownMode(String),
    #[error("unknown effect parameter {0:?}")]
    UnknownParameter(String),
    #[error("invalid value {value:?} for {name}: {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },
    #[error("screen effect failed: {0}")]
    Effect(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtectionMode {
    Blur,
    Pixelate,
    Overlay,
    Brightness,
    Stealth,
}

impl ProtectionMode {
    pub const ALL: &[ProtectionMode] = &[
        ProtectionMode::Blur,
        ProtectionMode::Pixelate,
        ProtectionMode::Overlay,
        ProtectionMode::Brightness,
        ProtectionMode::Stealth,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ProtectionMode::Blur => "blur",
            ProtectionMode::Pixelate => "pixelate",
            ProtectionMode::Overlay => "overlay",
            ProtectionMode::Brightness => "brightness",
            ProtectionMode::Stealth => "stealth",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            ProtectionMode::Blur => "Applies Gaussian blur to make content unreadable",
            ProtectionMode::Pixelate => "Reduces image quality through pixelation",
            ProtectionMode::Overlay => "Covers screen with semi-transparent overlay",
            ProtectionMode::Brightness => "Reduces screen brightness significantly",
            ProtectionMode::Stealth => "Applies subtle protection invisible to user",
        }
    }
}

impl FromStr for ProtectionMode {
    type Err = ProtectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProtectionMode::ALL
            .iter()
            .copied()
            .find(|m| m.name() == s)
            .ok_or_else(|| ProtectionError::UnknownMode(s.to_string()))
    }
}

impl std::fmt::Display for ProtectionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::blur("blur", ProtectionMode::Blur)]
    #[case::pixelate("pixelate", ProtectionMode::Pixelate)]
    #[case::overlay("overlay", ProtectionMode::Overlay)]
    #[case::brightness("brightness", ProtectionMode::Brightness)]
    #[case::stealth("stealth", ProtectionMode::Stealth)]
    fn test_parse_known_modes(#[case] name: &str, #[case] expected: ProtectionMode) {
        assert_eq!(name.parse::<ProtectionMode>(), Ok(expected));
        assert_eq!(expected.to_string(), name);
    }

    #[rstest]
    #[case::unknown("sparkle")]
    #[case::wrong_case("Blur")]
    #[case::empty("")]
    fn test_parse_rejects(#[case] name: &str) {
        assert_eq!(
            name.parse::<ProtectionMode>(),
            Err(ProtectionError::UnknownMode(name.to_string()))
        );
    }

    #[test]
    fn test_every_mode_has_description() {
        for mode in ProtectionMode::ALL {
            assert!(!mode.description().is_empty());
        }
    }

    #[test]
    fn test_serde_uses_lowercase_names() {
        assert_eq!(
            serde_json::to_string(&ProtectionMode::Pixelate).unwrap(),
            "\"pixelate\""
        );
    }
}
