pub mod effect_handler;
pub mod effect_parameters;
pub mod protection_mode;
