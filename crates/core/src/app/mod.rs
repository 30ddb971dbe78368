pub mod components;
pub mod privacy_screen_app;
