//! Linear undo/redo stack with macros and a clean mark.

use super::commands::Command;
use crate::item::{Item, ItemId};
use crate::scene::Scene;

/// Default maximum undo depth.
pub const DEFAULT_UNDO_LIMIT: usize = 100;

/// State changes reported to whoever draws menus and title bars.
///
/// The boolean events fire only when the value actually changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackEvent {
    CanUndoChanged(bool),
    CanRedoChanged(bool),
    CleanChanged(bool),
    IndexChanged(usize),
}

/// One undo step: a single command or a closed macro.
#[derive(Debug)]
struct Entry {
    label: String,
    commands: Vec<Command>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Status {
    can_undo: bool,
    can_redo: bool,
    clean: bool,
    index: usize,
}

/// Undo history for one document.
#[derive(Debug)]
pub struct CommandStack {
    entries: Vec<Entry>,
    /// Entries before this index are undoable, the rest redoable.
    cursor: usize,
    /// Zero means unlimited.
    limit: usize,
    /// Cursor position of the last save. `None` once that state can no
    /// longer be reached.
    clean_index: Option<usize>,
    open_macro: Option<Entry>,
    /// Bumped by every change to the history. Unlike the cursor it never
    /// repeats, so it tells whether anything happened since a snapshot.
    generation: u64,
    last: Status,
    events: Vec<StackEvent>,
}

impl Default for CommandStack {
    fn default() -> Self {
        Self::new(DEFAULT_UNDO_LIMIT)
    }
}

impl CommandStack {
    pub fn new(limit: usize) -> Self {
        Self {
            entries: Vec::new(),
            cursor: 0,
            limit,
            clean_index: Some(0),
            open_macro: None,
            generation: 0,
            last: Status {
                can_undo: false,
                can_redo: false,
                clean: true,
                index: 0,
            },
            events: Vec::new(),
        }
    }

    /// Apply `command` and record it.
    pub fn push(&mut self, scene: &mut Scene, mut command: Command) {
        command.forward(scene);
        self.generation += 1;
        log::debug!("Push: {}", command.label());
        match &mut self.open_macro {
            Some(open) => open.commands.push(command),
            None => {
                let entry = Entry {
                    label: command.label().to_string(),
                    commands: vec![command],
                };
                self.commit(entry);
            }
        }
        self.notify();
    }

    fn commit(&mut self, entry: Entry) {
        self.entries.truncate(self.cursor);
        if self.clean_index.is_some_and(|clean| clean > self.cursor) {
            self.clean_index = None;
        }
        self.entries.push(entry);
        self.cursor += 1;

        if self.limit > 0 && self.entries.len() > self.limit {
            // Evicted commands are forgotten, never undone.
            let evicted = self.entries.remove(0);
            log::debug!("Undo limit reached, dropping: {}", evicted.label);
            self.cursor -= 1;
            self.clean_index = self.clean_index.and_then(|clean| clean.checked_sub(1));
        }
    }

    /// Undo one step. Returns `false` if there was nothing to undo.
    pub fn undo(&mut self, scene: &mut Scene) -> bool {
        if self.open_macro.is_some() {
            log::warn!("Undo requested while a macro is open; ignoring");
            return false;
        }
        if self.cursor == 0 {
            return false;
        }
        self.cursor -= 1;
        self.generation += 1;
        let entry = &mut self.entries[self.cursor];
        log::debug!("Undo: {}", entry.label);
        for command in entry.commands.iter_mut().rev() {
            command.inverse(scene);
        }
        self.notify();
        true
    }

    /// Redo one step. Returns `false` if there was nothing to redo.
    pub fn redo(&mut self, scene: &mut Scene) -> bool {
        if self.open_macro.is_some() {
            log::warn!("Redo requested while a macro is open; ignoring");
            return false;
        }
        let Some(entry) = self.entries.get_mut(self.cursor) else {
            return false;
        };
        log::debug!("Redo: {}", entry.label);
        for command in entry.commands.iter_mut() {
            command.forward(scene);
        }
        self.cursor += 1;
        self.generation += 1;
        self.notify();
        true
    }

    /// Start grouping pushes into one undo step.
    ///
    /// # Panics
    /// If a macro is already open.
    pub fn begin_macro(&mut self, label: impl Into<String>) {
        let label = label.into();
        if let Some(open) = &self.open_macro {
            panic!("cannot begin macro {label:?}: macro {:?} is still open", open.label);
        }
        log::debug!("Begin macro: {}", label);
        self.open_macro = Some(Entry {
            label,
            commands: Vec::new(),
        });
        self.notify();
    }

    /// Close the open macro. An empty macro leaves no history entry.
    ///
    /// # Panics
    /// If no macro is open.
    pub fn end_macro(&mut self) {
        let Some(entry) = self.open_macro.take() else {
            panic!("end_macro called without an open macro");
        };
        log::debug!("End macro: {} ({} commands)", entry.label, entry.commands.len());
        if !entry.commands.is_empty() {
            self.commit(entry);
        }
        self.notify();
    }

    pub fn is_macro_open(&self) -> bool {
        self.open_macro.is_some()
    }

    /// Remember the current position as the saved state.
    pub fn mark_clean(&mut self) {
        self.clean_index = Some(self.cursor);
        self.notify();
    }

    pub fn is_clean(&self) -> bool {
        let macro_dirty = self
            .open_macro
            .as_ref()
            .is_some_and(|open| !open.commands.is_empty());
        !macro_dirty && self.clean_index == Some(self.cursor)
    }

    pub fn can_undo(&self) -> bool {
        self.open_macro.is_none() && self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.open_macro.is_none() && self.cursor < self.entries.len()
    }

    pub fn undo_text(&self) -> Option<&str> {
        self.can_undo()
            .then(|| self.entries[self.cursor - 1].label.as_str())
    }

    pub fn redo_text(&self) -> Option<&str> {
        self.can_redo()
            .then(|| self.entries[self.cursor].label.as_str())
    }

    /// Number of undo steps held.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn index(&self) -> usize {
        self.cursor
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Counter that moves on every push, undo, redo and clear.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Forget all history. The empty state counts as clean.
    ///
    /// # Panics
    /// If a macro is open.
    pub fn clear(&mut self) {
        assert!(self.open_macro.is_none(), "cannot clear history while a macro is open");
        self.entries.clear();
        self.cursor = 0;
        self.clean_index = Some(0);
        self.generation += 1;
        self.notify();
    }

    /// An item detached from the scene by a recorded command, e.g. one
    /// that was deleted or whose insert was undone.
    pub(crate) fn parked_item_mut(&mut self, id: ItemId) -> Option<&mut Item> {
        self.entries
            .iter_mut()
            .chain(self.open_macro.as_mut())
            .flat_map(|entry| entry.commands.iter_mut())
            .find_map(|command| command.parked_item_mut(id))
    }

    /// Drain pending notifications.
    pub fn take_events(&mut self) -> Vec<StackEvent> {
        std::mem::take(&mut self.events)
    }

    fn notify(&mut self) {
        let status = Status {
            can_undo: self.can_undo(),
            can_redo: self.can_redo(),
            clean: self.is_clean(),
            index: self.cursor,
        };
        if status.can_undo != self.last.can_undo {
            self.events.push(StackEvent::CanUndoChanged(status.can_undo));
        }
        if status.can_redo != self.last.can_redo {
            self.events.push(StackEvent::CanRedoChanged(status.can_redo));
        }
        if status.clean != self.last.clean {
            self.events.push(StackEvent::CleanChanged(status.clean));
        }
        if status.index != self.last.index {
            self.events.push(StackEvent::IndexChanged(status.index));
        }
        self.last = status;
    }
}
