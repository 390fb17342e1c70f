//! Montage Timeline - Timeline data model
//!
//! Implements the timeline structure for the engine:
//! - Projects containing ordered video and audio tracks
//! - Tracks containing non-overlapping clips with animated properties
//! - Edit operations with undo/redo
//! - Copy-on-write snapshots and versioned project files

pub mod clip;
pub mod document;
pub mod edit;
pub mod project;
pub mod serialization;
pub mod track;

pub use clip::{Clip, ClipSpec, PropertyName};
pub use document::TimelineDocument;
pub use edit::{EditCommand, UndoStack};
pub use project::{Project, PropertySample};
pub use serialization::{MediaEntry, ProjectFile, CURRENT_VERSION};
pub use track::{Track, TrackKind};
