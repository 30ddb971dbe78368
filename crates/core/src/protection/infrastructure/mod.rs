pub mod logging_effect_handler;
