pub mod app;
pub mod capture;
pub mod detection;
pub mod gaze;
pub mod protection;
pub mod settings;
pub mod shared;
