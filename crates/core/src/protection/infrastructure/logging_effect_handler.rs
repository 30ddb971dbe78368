use crate::protection::domain::effect_handler::EffectHandler;
use crate::protection::domain::effect_parameters::EffectParameters;
use crate::protection::domain::protection_mode::{ProtectionError, ProtectionMode};

/// Records each effect change in the log without touching the display.
pub struct LoggingEffectHandler {
    platform: &'static str,
}

impl LoggingEffectHandler {
    pub fn new() -> Self {
        Self {
            platform: std::env::consts::OS,
        }
    }

    pub fn platform(&self) -> &'static str {
        self.platform
    }
}

impl Default for LoggingEffectHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl EffectHandler for LoggingEffectHandler {
    fn apply(&mut self, mode: ProtectionMode, params: &EffectParameters) -> Result<(), ProtectionError> {
        match mode {
            ProtectionMode::Blur => log::info!(
                "[{}] Applying blur protection (intensity {})",
                self.platform,
                params.blur_intensity
            ),
            ProtectionMode::Pixelate => log::info!(
                "[{}] Applying pixelate protection (block size {})",
                self.platform,
                params.pixel_block_size
            ),
            ProtectionMode::Overlay => log::info!(
                "[{}] Applying overlay protection (opacity {})",
                self.platform,
                params.overlay_opacity
            ),
            ProtectionMode::Brightness => log::info!(
                "[{}] Applying brightness protection (reduction {})",
                self.platform,
                params.brightness_reduction
            ),
            ProtectionMode::Stealth => {
                log::info!("[{}] Applying stealth protection", self.platform)
            }
        }
        Ok(())
    }

    fn remove(&mut self, mode: ProtectionMode) -> Result<(), ProtectionError> {
        log::info!("[{}] Removing {mode} protection", self.platform);
        Ok(())
    }
}
