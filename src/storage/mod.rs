//! Local persistence for canonical documents.

pub mod json_dir;

pub use json_dir::JsonDirWriter;
