//! CLI command implementations.

pub mod history;
pub mod process;
pub mod validate;
