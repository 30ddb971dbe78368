use serde::{Deserialize, Serialize};

use crate::protection::domain::protection_mode::ProtectionError;

/// Strength knobs for the screen effects.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EffectParameters {
    pub blur_intensity: u32,
    pub pixel_block_size: u32,
    pub brightness_reduction: f64,
    pub overlay_opacity: f64,
}

impl Default for EffectParameters {
    fn default() -> Self {
        Self {
            blur_intensity: 15,
            pixel_block_size: 20,
            brightness_reduction: 0.7,
            overlay_opacity: 0.8,
        }
    }
}

/// A single typed parameter update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EffectParameter {
    BlurIntensity(u32),
    PixelBlockSize(u32),
    BrightnessReduction(f64),
    OverlayOpacity(f64),
}

impl EffectParameter {
    pub const NAMES: &[&str] = &[
        "blur_intensity",
        "pixel_block_size",
        "brightness_reduction",
        "overlay_opacity",
    ];

    /// Build an update from a parameter name and its textual value.
    pub fn parse(name: &str, value: &str) -> Result<Self, ProtectionError> {
        let invalid = |reason: &str| ProtectionError::InvalidParameter {
            name: name.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        };
        let param = match name {
            "blur_intensity" => {
                EffectParameter::BlurIntensity(value.trim().parse().map_err(|_| invalid("not an integer"))?)
            }
            "pixel_block_size" => {
                EffectParameter::PixelBlockSize(value.trim().parse().map_err(|_| invalid("not an integer"))?)
            }
            "brightness_reduction" => {
                EffectParameter::BrightnessReduction(value.trim().parse().map_err(|_| invalid("not a number"))?)
            }
            "overlay_opacity" => {
                EffectParameter::OverlayOpacity(value.trim().parse().map_err(|_| invalid("not a number"))?)
            }
            _ => return Err(ProtectionError::UnknownParameter(name.to_string())),
        };
        param.validate()?;
        Ok(param)
    }

    pub fn name(&self) -> &'static str {
        match self {
            EffectParameter::BlurIntensity(_) => "blur_intensity",
            EffectParameter::PixelBlockSize(_) => "pixel_block_size",
            EffectParameter::BrightnessReduction(_) => "brightness_reduction",
            EffectParameter::OverlayOpacity(_) => "overlay_opacity",
        }
    }

    pub fn validate(&self) -> Result<(), ProtectionError> {
        let reason = match *self {
            EffectParameter::PixelBlockSize(0) => Some("must be at least 1"),
            EffectParameter::BrightnessReduction(v) | EffectParameter::OverlayOpacity(v)
                if !(0.0..=1.0).contains(&v) =>
            {
                Some("must be between 0 and 1")
            }
            _ => None,
        };
        match reason {
            Some(reason) => Err(ProtectionError::InvalidParameter {
                name: self.name().to_string(),
                value: self.value_string(),
                reason: reason.to_string(),
            }),
            None => Ok(()),
        }
    }

    fn value_string(&self) -> String {
        match *self {
            EffectParameter::BlurIntensity(v) | EffectParameter::PixelBlockSize(v) => v.to_string(),
            EffectParameter::BrightnessReduction(v) | EffectParameter::OverlayOpacity(v) => v.to_string(),
        }
    }
}

impl EffectParameters {
    pub fn set(&mut self, param: EffectParameter) -> Result<(), ProtectionError> {
        param.validate()?;
        match param {
            EffectParameter::BlurIntensity(v) => self.blur_intensity = v,
            EffectParameter::PixelBlockSize(v) => self.pixel_block_size = v,
            EffectParameter::BrightnessReduction(v) => self.brightness_reduction = v,
            EffectParameter::OverlayOpacity(v) => self.overlay_opacity = v,
        }
        Ok(())
    }
}
