pub mod dead_letters;
pub mod health;
pub mod image_upload;
