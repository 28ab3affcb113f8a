//! Recast: codemod orchestration.
//!
//! Selects files, runs transforms across a worker pool, a single whole-tree
//! pass or an ordered recipe, and reduces the results to file-level
//! create/update/delete/move commands that are applied or previewed.

pub mod cli;
pub mod core;
pub mod engines;
pub mod error;
pub mod fs;
pub mod logging;
pub mod state;
