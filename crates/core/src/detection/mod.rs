pub mod domain;
pub mod face_locator;
pub mod infrastructure;
