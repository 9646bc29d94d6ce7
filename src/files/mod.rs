//! Virtual project file tree
//!
//! The in-memory project the assistant edits instead of a real filesystem,
//! plus the two read-only views the UI needs: a zip export and a composed
//! preview document.

pub mod export;
pub mod model;
pub mod ops;
pub mod preview;

pub use export::{export_archive, write_archive};
pub use model::{language_for_path, FileModel, FileSnapshot, VirtualFile};
pub use ops::{apply_operations, AppliedChange, ApplyReport, EditAction, EditOperation};
pub use preview::compose_preview;
