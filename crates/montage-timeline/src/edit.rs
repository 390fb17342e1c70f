//! Edit operations with undo/redo support.
//!
//! Uses the Command pattern: every mutation is an `EditCommand`; applying it
//! runs the validating project operation and yields the command that undoes it.

use montage_core::{AssetLookup, Keyframe, MontageError, Result};
use uuid::Uuid;

use crate::clip::{Clip, ClipSpec, PropertyName};
use crate::project::Project;
use crate::track::{Track, TrackKind};

// ── Edit commands ───────────────────────────────────────────────

/// A reversible edit operation on the timeline.
#[derive(Debug, Clone, PartialEq)]
pub enum EditCommand {
    /// Append a track. `track_id` pins the id so redo recreates the same track.
    AddTrack {
        kind: TrackKind,
        name: String,
        track_id: Uuid,
    },
    /// Remove a track with everything on it.
    RemoveTrack { track_id: Uuid },
    /// Put a previously removed track back at its old index.
    RestoreTrack { index: usize, track: Track },
    /// Place a clip (its id and track are fixed by the clip itself).
    AddClip { clip: Clip },
    RemoveClip { clip_id: Uuid },
    /// Move a clip to `start` on `track_id`.
    MoveClip {
        clip_id: Uuid,
        track_id: Uuid,
        start: f64,
    },
    /// Change source in point and duration.
    TrimClip {
        clip_id: Uuid,
        source_in: f64,
        duration: f64,
    },
    SetKeyframe {
        clip_id: Uuid,
        property: PropertyName,
        keyframe: Keyframe,
    },
    RemoveKeyframe {
        clip_id: Uuid,
        property: PropertyName,
        time: f64,
    },
    MoveKeyframe {
        clip_id: Uuid,
        property: PropertyName,
        from: f64,
        to: f64,
    },
    /// Commands applied atomically: all succeed or the project is untouched.
    Batch(Vec<EditCommand>),
}

impl EditCommand {
    /// Command that places a new clip described by `spec`.
    pub fn add_clip(track_id: Uuid, spec: ClipSpec) -> Self {
        Self::AddClip {
            clip: Clip::from_spec(track_id, spec),
        }
    }

    /// Command that appends a new track with a fresh id.
    pub fn add_track(kind: TrackKind, name: impl Into<String>) -> Self {
        Self::AddTrack {
            kind,
            name: name.into(),
            track_id: Uuid::new_v4(),
        }
    }

    /// Apply this command to a project and return its inverse.
    ///
    /// On error the project is unchanged.
    pub fn apply(&self, project: &mut Project, assets: &dyn AssetLookup) -> Result<EditCommand> {
        match self {
            Self::AddTrack {
                kind,
                name,
                track_id,
            } => {
                let index = project.tracks().len();
                project.insert_track(index, Track::with_id(*track_id, *kind, name.clone()))?;
                Ok(Self::RemoveTrack {
                    track_id: *track_id,
                })
            }
            Self::RemoveTrack { track_id } => {
                let (index, track) = project.remove_track(*track_id)?;
                Ok(Self::RestoreTrack { index, track })
            }
            Self::RestoreTrack { index, track } => {
                project.insert_track(*index, track.clone())?;
                Ok(Self::RemoveTrack { track_id: track.id })
            }
            Self::AddClip { clip } => {
                project.insert_clip(clip.clone(), assets)?;
                Ok(Self::RemoveClip { clip_id: clip.id })
            }
            Self::RemoveClip { clip_id } => {
                let clip = project.remove_clip(*clip_id)?;
                Ok(Self::AddClip { clip })
            }
            Self::MoveClip {
                clip_id,
                track_id,
                start,
            } => {
                let previous = existing_clip(project, *clip_id)?;
                let inverse = Self::MoveClip {
                    clip_id: *clip_id,
                    track_id: previous.track_id,
                    start: previous.start_time,
                };
                project.move_clip_to(*clip_id, *track_id, *start, assets)?;
                Ok(inverse)
            }
            Self::TrimClip {
                clip_id,
                source_in,
                duration,
            } => {
                let previous = existing_clip(project, *clip_id)?;
                let inverse = Self::TrimClip {
                    clip_id: *clip_id,
                    source_in: previous.source_in_offset,
                    duration: previous.duration,
                };
                project.trim_clip(*clip_id, *source_in, *duration, assets)?;
                Ok(inverse)
            }
            Self::SetKeyframe {
                clip_id,
                property,
                keyframe,
            } => {
                let replaced = project.set_keyframe(*clip_id, property.clone(), *keyframe)?;
                Ok(match replaced {
                    Some(old) => Self::SetKeyframe {
                        clip_id: *clip_id,
                        property: property.clone(),
                        keyframe: old,
                    },
                    None => Self::RemoveKeyframe {
                        clip_id: *clip_id,
                        property: property.clone(),
                        time: keyframe.time,
                    },
                })
            }
            Self::RemoveKeyframe {
                clip_id,
                property,
                time,
            } => {
                let removed = project.remove_keyframe(*clip_id, property, *time)?;
                Ok(Self::SetKeyframe {
                    clip_id: *clip_id,
                    property: property.clone(),
                    keyframe: removed,
                })
            }
            Self::MoveKeyframe {
                clip_id,
                property,
                from,
                to,
            } => {
                let replaced = project.move_keyframe(*clip_id, property, *from, *to)?;
                let back = Self::MoveKeyframe {
                    clip_id: *clip_id,
                    property: property.clone(),
                    from: *to,
                    to: *from,
                };
                Ok(match replaced {
                    Some(old) => Self::Batch(vec![
                        back,
                        Self::SetKeyframe {
                            clip_id: *clip_id,
                            property: property.clone(),
                            keyframe: old,
                        },
                    ]),
                    None => back,
                })
            }
            Self::Batch(commands) => {
                let backup = project.clone();
                let mut inverses = Vec::with_capacity(commands.len());
                for cmd in commands {
                    match cmd.apply(project, assets) {
                        Ok(inverse) => inverses.push(inverse),
                        Err(e) => {
                            *project = backup;
                            return Err(e);
                        }
                    }
                }
                inverses.reverse();
                Ok(Self::Batch(inverses))
            }
        }
    }

    /// Short label for history UIs and logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::AddTrack { .. } | Self::RestoreTrack { .. } => "Add Track",
            Self::RemoveTrack { .. } => "Remove Track",
            Self::AddClip { .. } => "Add Clip",
            Self::RemoveClip { .. } => "Remove Clip",
            Self::MoveClip { .. } => "Move Clip",
            Self::TrimClip { .. } => "Trim Clip",
            Self::SetKeyframe { .. } => "Set Keyframe",
            Self::RemoveKeyframe { .. } => "Remove Keyframe",
            Self::MoveKeyframe { .. } => "Move Keyframe",
            Self::Batch(_) => "Batch Edit",
        }
    }
}

fn existing_clip(project: &Project, clip_id: Uuid) -> Result<Clip> {
    project
        .clip(clip_id)
        .cloned()
        .ok_or_else(|| MontageError::NotFound(format!("clip {clip_id}")))
}

// ── Undo stack ──────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct HistoryEntry {
    command: EditCommand,
    inverse: EditCommand,
}

/// Undo/redo history stack.
#[derive(Debug)]
pub struct UndoStack {
    /// Commands that have been executed (most recent last).
    undo: Vec<HistoryEntry>,
    /// Commands that have been undone (most recent last).
    redo: Vec<HistoryEntry>,
    /// Maximum history depth.
    max_depth: usize,
}

impl UndoStack {
    /// Create a new undo stack with the given maximum depth.
    pub fn new(max_depth: usize) -> Self {
        Self {
            undo: Vec::new(),
            redo: Vec::new(),
            max_depth,
        }
    }

    /// Record an executed command together with its inverse.
    /// Clears the redo stack (new action invalidates redo history).
    pub fn push(&mut self, command: EditCommand, inverse: EditCommand) {
        self.redo.clear();
        self.undo.push(HistoryEntry { command, inverse });
        if self.undo.len() > self.max_depth {
            self.undo.remove(0);
        }
    }

    /// Pop the most recent command for undo. Returns the inverse command.
    pub fn undo(&mut self) -> Option<EditCommand> {
        let entry = self.undo.pop()?;
        let inverse = entry.inverse.clone();
        self.redo.push(entry);
        Some(inverse)
    }

    /// Pop the most recent undone command for redo. Returns the original command.
    pub fn redo(&mut self) -> Option<EditCommand> {
        let entry = self.redo.pop()?;
        let command = entry.command.clone();
        self.undo.push(entry);
        Some(command)
    }

    /// Put back the entry moved by the last `undo` (its inverse failed to apply).
    pub(crate) fn revert_undo(&mut self) {
        if let Some(entry) = self.redo.pop() {
            self.undo.push(entry);
        }
    }

    /// Put back the entry moved by the last `redo`.
    pub(crate) fn revert_redo(&mut self) {
        if let Some(entry) = self.undo.pop() {
            self.redo.push(entry);
        }
    }

    /// Refresh the inverse of the newest undo entry after a redo re-applied it.
    pub(crate) fn refresh_inverse(&mut self, inverse: EditCommand) {
        if let Some(entry) = self.undo.last_mut() {
            entry.inverse = inverse;
        }
    }

    /// Label of the command `undo` would revert.
    pub fn undo_label(&self) -> Option<&'static str> {
        self.undo.last().map(|e| e.command.label())
    }

    /// Check if undo is available.
    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    /// Check if redo is available.
    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    /// Clear all history.
    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }

    /// Number of undo steps available.
    pub fn undo_count(&self) -> usize {
        self.undo.len()
    }

    /// Number of redo steps available.
    pub fn redo_count(&self) -> usize {
        self.redo.len()
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }
}

impl Default for UndoStack {
    fn default() -> Self {
        Self::new(200)
    }
}

// ── Tests ───────────────────────────────────────────────────────
