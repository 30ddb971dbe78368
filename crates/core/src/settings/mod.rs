pub mod config;
pub mod log_file;
pub mod settings_store;
