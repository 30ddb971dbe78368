pub mod controller;
pub mod domain;
pub mod infrastructure;
pub mod screen_protector;
