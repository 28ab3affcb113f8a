//! Core orchestration: descriptors, pattern resolution, enumeration,
//! the worker pool, dispatch and recipes.

pub mod commands;
pub mod config;
pub mod enumerate;
pub mod executor;
pub mod parser;
pub mod patterns;
pub mod pool;
pub mod recipe;
pub mod types;
