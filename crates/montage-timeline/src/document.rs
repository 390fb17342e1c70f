//! Single-writer project document with copy-on-write snapshots.

use std::sync::Arc;

use montage_core::{AssetLookup, Result};
use tracing::debug;

use crate::edit::{EditCommand, UndoStack};
use crate::project::Project;

/// Owns the live project and its edit history.
///
/// Readers call [`TimelineDocument::snapshot`] and keep an immutable
/// `Arc<Project>`; later edits clone the project on write instead of
/// disturbing outstanding snapshots.
#[derive(Debug)]
pub struct TimelineDocument {
    project: Arc<Project>,
    history: UndoStack,
}

impl TimelineDocument {
    pub fn new(project: Project) -> Self {
        Self::with_history_depth(project, UndoStack::default().max_depth())
    }

    pub fn with_history_depth(project: Project, depth: usize) -> Self {
        Self {
            project: Arc::new(project),
            history: UndoStack::new(depth),
        }
    }

    /// Immutable view of the current state.
    pub fn snapshot(&self) -> Arc<Project> {
        Arc::clone(&self.project)
    }

    pub fn project(&self) -> &Project {
        &self.project
    }

    pub fn history(&self) -> &UndoStack {
        &self.history
    }

    /// Apply an edit and record it for undo.
    pub fn apply(&mut self, command: EditCommand, assets: &dyn AssetLookup) -> Result<()> {
        let inverse = command.apply(Arc::make_mut(&mut self.project), assets)?;
        debug!(edit = command.label(), "applied edit");
        self.history.push(command, inverse);
        Ok(())
    }

    /// Revert the most recent edit. Returns `false` when there is nothing to undo.
    pub fn undo(&mut self, assets: &dyn AssetLookup) -> Result<bool> {
        let Some(inverse) = self.history.undo() else {
            return Ok(false);
        };
        if let Err(e) = inverse.apply(Arc::make_mut(&mut self.project), assets) {
            self.history.revert_undo();
            return Err(e);
        }
        debug!(edit = inverse.label(), "undid edit");
        Ok(true)
    }

    /// Re-apply the most recently undone edit.
    pub fn redo(&mut self, assets: &dyn AssetLookup) -> Result<bool> {
        let Some(command) = self.history.redo() else {
            return Ok(false);
        };
        match command.apply(Arc::make_mut(&mut self.project), assets) {
            Ok(inverse) => {
                self.history.refresh_inverse(inverse);
                debug!(edit = command.label(), "redid edit");
                Ok(true)
            }
            Err(e) => {
                self.history.revert_redo();
                Err(e)
            }
        }
    }

    /// Replace the project wholesale (e.g. after loading) and drop history.
    pub fn replace(&mut self, project: Project) {
        self.project = Arc::new(project);
        self.history.clear();
    }
}
