use crate::document::ViewId;
use line_tree::LineTreeError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EditError {
    #[error("position {line}:{column} is outside the document")]
    OutOfRange { line: usize, column: usize },

    #[error("view {0} does not exist")]
    UnknownView(ViewId),

    #[error("collapsed marker would partially overlap an existing collapsed marker")]
    ConflictingCollapse,

    #[error("document is locked until an atomic marker is cleared")]
    CantEdit,

    #[error("a selection needs at least one range")]
    EmptySelection,

    #[error(transparent)]
    LineTree(#[from] LineTreeError),
}
