pub mod clean;
pub mod completions;
pub mod list;
pub mod publish;
