pub mod file_store;
pub mod filename;
pub mod metadata;
