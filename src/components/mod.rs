pub(crate) mod reorderable;
pub mod ui;
