//! Undo history: reversible commands and the stack that records them.

mod commands;
mod stack;

pub use commands::{Command, ResetKind};
pub use stack::{CommandStack, DEFAULT_UNDO_LIMIT, StackEvent};
