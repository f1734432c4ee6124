//! Pinboard Core Library
//!
//! Scene model, undo history and background loading for the Pinboard
//! reference image board.

pub mod arrange;
pub mod board;
pub mod codec;
pub mod config;
pub mod crop;
pub mod error;
pub mod history;
pub mod item;
pub mod pipeline;
pub mod scene;
pub mod selection;
pub mod storage;

pub use arrange::NormalizeMode;
pub use board::{Board, JobReport};
pub use codec::{
    DefaultCodec, DefaultReader, HttpReader, ImageCodec, Loader, LocalReader, Source, SourceError, SourceReader,
};
pub use config::{BoardConfig, NormalizePolicy};
pub use crop::{CropHandle, CropSession, CursorShape, PointerOutcome};
pub use error::{BoardError, BoardResult};
pub use history::{Command, CommandStack, ResetKind, StackEvent};
pub use item::{Flip, Item, ItemId, Placement};
pub use pipeline::{Job, JobEvent, JobKind, JobOutput, JobSink};
pub use scene::{EditState, Scene};
pub use selection::{Marquee, SceneEntry};
pub use storage::{DOCUMENT_EXTENSION, StorageError, StorageResult};
