//! Run state: content hashing, snapshot net diff and the run journal.

pub mod eventlog;
pub mod hasher;
pub mod snapshot;
