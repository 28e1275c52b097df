// src/utils.rs

use std::time::{SystemTime, UNIX_EPOCH};

// Current wall-clock time in milliseconds since the Unix epoch. All
// transaction, block and contract timestamps use this resolution.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
