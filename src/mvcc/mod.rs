//! MVCC row format and snapshot-isolation visibility.

pub mod read_view;
pub mod row;

pub use read_view::ReadView;
pub use row::{Row, RowFormat, RollPtr, UndoSource, VersionChain};
