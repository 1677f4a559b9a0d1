pub mod files;
pub mod naming;

pub use naming::{artifact_filename, detect_mime, extension_for_mime, local_id};
