use parking_lot::Mutex;

use super::{EditLog, EditLogEntry};
use crate::error::{Error, Result};

/// Edit log kept in memory. Entries round-trip through bincode so replay
/// sees exactly what a file log would return.
#[derive(Debug, Default)]
pub struct MemoryEditLog {
    frames: Mutex<Vec<Vec<u8>>>,
    fail_appends: Mutex<bool>,
}

impl MemoryEditLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of appended entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.lock().len()
    }

    /// True when nothing has been appended.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.lock().is_empty()
    }

    /// Makes subsequent appends fail, simulating a full disk.
    pub fn set_fail_appends(&self, fail: bool) {
        *self.fail_appends.lock() = fail;
    }

    /// Decoded copy of every entry.
    #[must_use]
    pub fn entries(&self) -> Vec<EditLogEntry> {
        self.frames
            .lock()
            .iter()
            .filter_map(|frame| bincode::deserialize(frame).ok())
            .collect()
    }
}

impl EditLog for MemoryEditLog {
    fn append(&self, entry: &EditLogEntry) -> Result<()> {
        if *self.fail_appends.lock() {
            return Err(Error::EditLog("append rejected".to_string()));
        }
        let frame = bincode::serialize(entry)?;
        self.frames.lock().push(frame);
        Ok(())
    }

    fn replay(&self) -> Result<Vec<EditLogEntry>> {
        self.frames
            .lock()
            .iter()
            .map(|frame| bincode::deserialize(frame).map_err(Error::from))
            .collect()
    }
}
