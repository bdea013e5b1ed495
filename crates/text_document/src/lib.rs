//! Line-indexed text document with marked ranges, multi-range selections,
//! undo history and batched change notifications.

mod change;
mod config;
mod document;
mod document_builder;
mod error;
mod events;
mod history;
mod io;
mod line;
mod marker;
mod operation;
mod position;
mod selection;
mod spans;

pub use crate::change::{AppliedChange, Change};
pub use crate::config::{
    DocumentOptions, HISTORY_EVENT_DELAY_ENV, LINE_HEIGHT_ENV, MAX_HISTORY_EVENT_DELAY_MS, SELECTIONS_MAY_TOUCH_ENV,
    UNDO_DEPTH_ENV, parse_env_flag,
};
pub use crate::document::{Document, SelectionOptions, ViewId, ViewMut};
pub use crate::document_builder::DocumentBuilder;
pub use crate::error::EditError;
pub use crate::events::{ChangeEvent, ListenerId, ListenerResult, MarkerClearedEvent, SelectionEvent};
pub use crate::history::HistorySize;
pub use crate::io::{load_from_path, load_from_path_with_options};
pub use crate::line::{LineView, RenderToken, split_lines};
pub use crate::marker::{MarkedSpan, MarkerConfig, MarkerHandle, MarkerId, MarkerKind};
pub use crate::operation::{OpId, OperationGuard};
pub use crate::position::{Position, Range};
pub use crate::selection::{Direction, Selection, extend_range};
pub use line_tree::LineId;
