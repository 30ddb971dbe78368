use serde::Serialize;

use crate::protection::domain::effect_handler::EffectHandler;
use crate::protection::domain::effect_parameters::{EffectParameter, EffectParameters};
use crate::protection::domain::protection_mode::{ProtectionError, ProtectionMode};

#[derive(Debug, Clone, Serialize)]
pub struct ProtectorStatus {
    pub is_protected: bool,
    pub current_mode: ProtectionMode,
    pub platform: String,
    pub blur_intensity: u32,
    pub pixel_block_size: u32,
    pub brightness_reduction: f64,
    pub overlay_opacity: f64,
}

/// Dispatches the active protection mode onto an [`EffectHandler`] and
/// remembers whether the screen is currently protected.
pub struct ScreenProtector {
    handler: Box<dyn EffectHandler>,
    mode: ProtectionMode,
    params: EffectParameters,
    protected: bool,
}

impl ScreenProtector {
    pub fn new(handler: Box<dyn EffectHandler>, mode: ProtectionMode, params: EffectParameters) -> Self {
        Self {
            handler,
            mode,
            params,
            protected: false,
        }
    }

    pub fn apply_protection(&mut self) -> bool {
        match self.handler.apply(self.mode, &self.params) {
            Ok(()) => {
                self.protected = true;
                log::debug!("Applied {} protection", self.mode);
                true
            }
            Err(e) => {
                log::error!("Error applying {} protection: {e}", self.mode);
                false
            }
        }
    }

    pub fn remove_protection(&mut self) -> bool {
        match self.handler.remove(self.mode) {
            Ok(()) => {
                self.protected = false;
                log::debug!("Removed {} protection", self.mode);
                true
            }
            Err(e) => {
                log::error!("Error removing {} protection: {e}", self.mode);
                false
            }
        }
    }

    /// Switch modes; an active effect is torn down under the old mode and
    /// re-applied under the new one.
    pub fn set_protection_mode(&mut self, mode: ProtectionMode) -> bool {
        let was_protected = self.protected;
        if was_protected && !self.remove_protection() {
            return false;
        }
        self.mode = mode;
        log::info!("Protection mode changed to {mode}");
        if was_protected {
            return self.apply_protection();
        }
        true
    }

    /// Update one parameter, refreshing the effect when it is active.
    pub fn set_parameter(&mut self, param: EffectParameter) -> Result<(), ProtectionError> {
        self.params.set(param)?;
        log::debug!("Effect parameter {} updated", param.name());
        if self.protected {
            self.handler.apply(self.mode, &self.params)?;
        }
        Ok(())
    }

    /// Briefly apply `mode`, then put mode and protection state back.
    pub fn test_protection(&mut self, mode: ProtectionMode) -> bool {
        let original_mode = self.mode;
        let was_protected = self.protected;

        if was_protected && !self.remove_protection() {
            return false;
        }
        self.mode = mode;
        let success = self.apply_protection();
        if success {
            self.remove_protection();
        }

        self.mode = original_mode;
        if was_protected {
            self.apply_protection();
        }
        log::info!(
            "Protection test for {mode}: {}",
            if success { "passed" } else { "failed" }
        );
        success
    }

    pub fn is_protected(&self) -> bool {
        self.protected
    }

    pub fn mode(&self) -> ProtectionMode {
        self.mode
    }

    pub fn parameters(&self) -> &EffectParameters {
        &self.params
    }

    pub fn available_modes() -> &'static [ProtectionMode] {
        ProtectionMode::ALL
    }

    pub fn mode_description(name: &str) -> &'static str {
        name.parse::<ProtectionMode>()
            .map(ProtectionMode::description)
            .unwrap_or("Unknown protection mode")
    }

    pub fn status(&self) -> ProtectorStatus {
        ProtectorStatus {
            is_protected: self.protected,
            current_mode: self.mode,
            platform: std::env::consts::OS.to_string(),
            blur_intensity: self.params.blur_intensity,
            pixel_block_size: self.params.pixel_block_size,
            brightness_reduction: self.params.brightness_reduction,
            overlay_opacity: self.params.overlay_opacity,
        }
    }
}
