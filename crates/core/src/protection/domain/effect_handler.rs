use crate::protection::domain::effect_parameters::EffectParameters;
use crate::protection::domain::protection_mode::{ProtectionError, ProtectionMode};

/// Platform capability that actually alters what the screen shows.
pub trait EffectHandler: Send {
    fn apply(&mut self, mode: ProtectionMode, params: &EffectParameters) -> Result<(), ProtectionError>;
    fn remove(&mut self, mode: ProtectionMode) -> Result<(), ProtectionError>;
}
