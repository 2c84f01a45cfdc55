//! File-backed edit log.
//!
//! ## Frame format
//!
//! ```text
//! [len: u32 LE][crc32(payload): u32 LE][payload: bincode(EditLogEntry)]
//! ```
//!
//! A frame cut short by a crash, or whose checksum does not match, ends
//! replay. Everything before it is returned. Opening the log cuts the file
//! back to the last intact frame so new appends follow it.

use crc32fast::Hasher;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::{EditLog, EditLogEntry};
use crate::error::{Error, Result};

/// File name of the log inside the metadata directory.
pub const EDIT_LOG_FILE: &str = "edits.log";

/// Upper bound on one frame; larger length prefixes are treated as corruption.
const MAX_FRAME_BYTES: usize = 256 * 1024 * 1024;

/// Append-only edit log stored in `<meta_dir>/edits.log`.
#[derive(Debug)]
pub struct FileEditLog {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
    sync: bool,
}

impl FileEditLog {
    /// Opens or creates the log in `meta_dir`.
    ///
    /// With `sync` set every append is followed by `fsync`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the directory or file cannot be opened.
    pub fn open<P: AsRef<Path>>(meta_dir: P, sync: bool) -> Result<Self> {
        std::fs::create_dir_all(meta_dir.as_ref())?;
        let path = meta_dir.as_ref().join(EDIT_LOG_FILE);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        let (_, intact) = scan(&path)?;
        let on_disk = file.metadata()?.len();
        if on_disk > intact {
            warn!(path = %path.display(), on_disk, intact, "Truncating edit log to last intact frame");
            let tail = OpenOptions::new().write(true).open(&path)?;
            tail.set_len(intact)?;
            tail.sync_all()?;
        }

        Ok(Self {
            path,
            writer: Mutex::new(BufWriter::new(file)),
            sync,
        })
    }

    /// Path of the log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl EditLog for FileEditLog {
    fn append(&self, entry: &EditLogEntry) -> Result<()> {
        let payload = bincode::serialize(entry)?;
        let len = u32::try_from(payload.len())
            .map_err(|_| Error::EditLog(format!("entry too large: {} bytes", payload.len())))?;
        let mut hasher = Hasher::new();
        hasher.update(&payload);
        let checksum = hasher.finalize();

        let mut writer = self.writer.lock();
        let write = |w: &mut BufWriter<File>| -> io::Result<()> {
            w.write_all(&len.to_le_bytes())?;
            w.write_all(&checksum.to_le_bytes())?;
            w.write_all(&payload)?;
            w.flush()?;
            if self.sync {
                w.get_ref().sync_data()?;
            }
            Ok(())
        };
        write(&mut writer).map_err(|e| Error::EditLog(e.to_string()))?;

        debug!(kind = entry.kind(), bytes = payload.len(), "Edit log append");
        Ok(())
    }

    fn replay(&self) -> Result<Vec<EditLogEntry>> {
        let _writer = self.writer.lock();
        scan(&self.path).map(|(entries, _)| entries)
    }
}

/// Reads every intact frame of the log at `path`.
///
/// Returns the entries and the byte length they occupy.
fn scan(path: &Path) -> Result<(Vec<EditLogEntry>, u64)> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok((Vec::new(), 0)),
        Err(err) => return Err(err.into()),
    };
    let mut reader = BufReader::new(file);
    let mut entries = Vec::new();
    let mut intact = 0u64;

    loop {
        let mut header = [0u8; 8];
        match reader.read_exact(&mut header) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(err) => return Err(err.into()),
        }
        let len = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize;
        let expected = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
        if len > MAX_FRAME_BYTES {
            warn!(path = %path.display(), len, "Edit log frame too large, stopping replay");
            break;
        }

        let mut payload = vec![0u8; len];
        match reader.read_exact(&mut payload) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => {
                warn!(path = %path.display(), "Torn edit log tail, stopping replay");
                break;
            }
            Err(err) => return Err(err.into()),
        }

        let mut hasher = Hasher::new();
        hasher.update(&payload);
        if hasher.finalize() != expected {
            warn!(
                path = %path.display(),
                entries = entries.len(),
                "Edit log checksum mismatch, stopping replay"
            );
            break;
        }
        entries.push(bincode::deserialize(&payload)?);
        intact += 8 + len as u64;
    }

    Ok((entries, intact))
}
