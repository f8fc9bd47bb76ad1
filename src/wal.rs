use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::model::Event;

/// Encode a single event to [len][bincode][crc32] format.
fn encode_event(writer: &mut impl Write, event: &Event) -> io::Result<()> {
    let payload =
        bincode::serialize(event).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let len = payload.len() as u32;
    let crc = crc32fast::hash(&payload);
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.write_all(&crc.to_le_bytes())?;
    Ok(())
}

/// Append-only Write-Ahead Log holding every reservation change and its audit
/// entry. Nothing is ever deleted from it.
///
/// Format per entry: `[u32: len][bincode: Event][u32: crc32]`
/// - `len` is the byte length of the bincode payload (not including the CRC).
/// - Truncated last entry (crash) is safely discarded via length-prefix + CRC check.
///
/// Entries are buffered in memory and reach the file only through
/// [`Wal::flush_sync`], which either makes the whole buffer durable or leaves
/// the file at its previous length.
pub struct Wal {
    file: File,
    path: PathBuf,
    pending: Vec<u8>,
    pending_entries: u64,
    /// File length covered by the last successful flush.
    committed: u64,
    appends: u64,
    /// Set when a failed flush could not be rolled back.
    broken: bool,
}

impl Wal {
    /// Open (or create) the WAL file at `path`. A torn trailing entry left
    /// by a crash is cut off so new entries land directly after the last
    /// valid one.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let (_, valid_len) = read_valid(path)?;
        let on_disk = file.metadata()?.len();
        if on_disk > valid_len {
            warn!(
                "discarding {} trailing bytes of {}",
                on_disk - valid_len,
                path.display()
            );
            file.set_len(valid_len)?;
            file.sync_all()?;
        }
        Ok(Self {
            file,
            path: path.to_path_buf(),
            pending: Vec::new(),
            pending_entries: 0,
            committed: valid_len,
            appends: 0,
            broken: false,
        })
    }

    /// Append a single event and fsync. Production code batches through
    /// `append_buffered` + `flush_sync` instead.
    #[cfg(test)]
    pub fn append(&mut self, event: &Event) -> io::Result<()> {
        self.append_buffered(event)?;
        self.flush_sync()
    }

    /// Buffer a single event without touching the file.
    /// Call `flush_sync()` after the batch to durably commit all buffered events.
    pub fn append_buffered(&mut self, event: &Event) -> io::Result<()> {
        if self.broken {
            return Err(io::Error::other(format!(
                "WAL {} is unusable after a failed rollback",
                self.path.display()
            )));
        }
        let mark = self.pending.len();
        if let Err(e) = encode_event(&mut self.pending, event) {
            self.pending.truncate(mark);
            return Err(e);
        }
        self.pending_entries += 1;
        Ok(())
    }

    /// Drop everything buffered since the last flush.
    pub fn discard_buffered(&mut self) {
        self.pending.clear();
        self.pending_entries = 0;
    }

    /// Write the buffered entries and fsync. On error the buffer is dropped
    /// and the file is cut back to its last committed length, so none of the
    /// buffered entries will be seen by a later replay.
    pub fn flush_sync(&mut self) -> io::Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let written = self
            .file
            .write_all(&self.pending)
            .and_then(|()| self.file.sync_all());
        match written {
            Ok(()) => {
                self.committed += self.pending.len() as u64;
                self.appends += self.pending_entries;
                self.discard_buffered();
                Ok(())
            }
            Err(e) => {
                self.discard_buffered();
                if let Err(rollback) = self.rollback() {
                    self.broken = true;
                    return Err(io::Error::new(
                        e.kind(),
                        format!("{e}; truncating back to {} bytes failed: {rollback}", self.committed),
                    ));
                }
                Err(e)
            }
        }
    }

    fn rollback(&mut self) -> io::Result<()> {
        if self.file.metadata()?.len() != self.committed {
            self.file.set_len(self.committed)?;
            self.file.sync_all()?;
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Entries durably appended through this handle since it was opened.
    pub fn appends(&self) -> u64 {
        self.appends
    }

    /// Replay the WAL from disk, returning all valid events.
    /// Truncated/corrupt trailing entries are silently discarded.
    pub fn replay(path: &Path) -> io::Result<Vec<Event>> {
        read_valid(path).map(|(events, _)| events)
    }

    /// Handle whose writes always fail, for exercising the failure path.
    #[cfg(test)]
    pub(crate) fn open_read_only(path: &Path) -> io::Result<Self> {
        let (_, valid_len) = read_valid(path)?;
        Ok(Self {
            file: File::open(path)?,
            path: path.to_path_buf(),
            pending: Vec::new(),
            pending_entries: 0,
            committed: valid_len,
            appends: 0,
            broken: false,
        })
    }
}

/// Decode the valid prefix of the log: its events and its length in bytes.
fn read_valid(path: &Path) -> io::Result<(Vec<Event>, u64)> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok((Vec::new(), 0)),
        Err(e) => return Err(e),
    };
    let mut reader = BufReader::new(file);
    let mut events = Vec::new();
    let mut valid_len = 0u64;

    loop {
        let mut len_buf = [0u8; 4];
        match reader.read_exact(&mut len_buf) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e),
        }
        let len = u32::from_le_bytes(len_buf) as usize;

        let mut payload = vec![0u8; len];
        match reader.read_exact(&mut payload) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break, // truncated
            Err(e) => return Err(e),
        }

        let mut crc_buf = [0u8; 4];
        match reader.read_exact(&mut crc_buf) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break, // truncated
            Err(e) => return Err(e),
        }
        if u32::from_le_bytes(crc_buf) != crc32fast::hash(&payload) {
            break;
        }

        match bincode::deserialize::<Event>(&payload) {
            Ok(event) => events.push(event),
            Err(_) => break, // corrupt payload
        }
        valid_len += 8 + len as u64;
    }

    Ok((events, valid_len))
}
