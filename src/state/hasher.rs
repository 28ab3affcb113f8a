//! BLAKE3 content hashing for snapshot comparison.

use crate::fs::memory::Snapshot;

/// Hash a string. Returns `"blake3:{hex}"`.
pub fn hash_string(s: &str) -> String {
    format!("blake3:{}", blake3::hash(s.as_bytes()).to_hex())
}

/// Hash a whole snapshot (sorted paths, path and content hash per entry).
pub fn hash_snapshot(snapshot: &Snapshot) -> String {
    let mut hasher = blake3::Hasher::new();
    for (path, content) in snapshot {
        hasher.update(path.to_string_lossy().as_bytes());
        hasher.update(b"\0");
        hasher.update(hash_string(content).as_bytes());
        hasher.update(b"\n");
    }
    format!("blake3:{}", hasher.finalize().to_hex())
}
