//! Block-level file access.

use std::fs;
use std::io;
use std::io::prelude::*;
use std::path::{Path, PathBuf};

use log;
use tempfile;

use crate::record::{Record, RECORD_SIZE};
use crate::sort::SortError;

/// Binary file accessed in fixed-size blocks.
///
/// A store owns the only open handle to its file. Scratch stores are backed by a temporary file
/// that is deleted when the store is dropped, unless it was moved over another file by
/// [`BlockStore::replace_with`].
pub struct BlockStore {
    file: fs::File,
    path: PathBuf,
    temp: Option<tempfile::TempPath>,
}

impl BlockStore {
    /// Opens an existing file for reading and writing.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = fs::OpenOptions::new().read(true).write(true).open(path)?;

        return Ok(BlockStore {
            file,
            path: path.to_path_buf(),
            temp: None,
        });
    }

    /// Creates an empty scratch file in `dir`.
    pub fn scratch(dir: &Path, prefix: &str) -> io::Result<Self> {
        let (file, temp) = tempfile::Builder::new()
            .prefix(prefix)
            .suffix(".bin")
            .tempfile_in(dir)?
            .into_parts();

        log::debug!("created scratch file {}", temp.display());

        return Ok(BlockStore {
            file,
            path: temp.to_path_buf(),
            temp: Some(temp),
        });
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the file length in bytes.
    pub fn len(&self) -> io::Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    pub fn rewind(&mut self) -> io::Result<()> {
        self.file.rewind()
    }

    /// Reads the next block from the current position.
    /// Returns the number of bytes read which is less than the buffer size only at the end of the file.
    pub fn read_block(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.file.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }

        return Ok(filled);
    }

    /// Reads a block starting at byte `offset`.
    pub fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        self.file.seek(io::SeekFrom::Start(offset))?;
        self.read_block(buf)
    }

    /// Writes a block at the current position.
    pub fn write_block(&mut self, buf: &[u8]) -> io::Result<()> {
        self.file.write_all(buf)
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }

    /// Replaces the contents of this store's file with the `scratch` file.
    ///
    /// Both handles are closed, the scratch file is renamed over this file and the file is reopened.
    /// If renaming fails (for example the scratch file lives on another file system) the contents are
    /// copied instead and the scratch file is removed.
    /// The replacement is not crash safe.
    pub fn replace_with(self, scratch: BlockStore) -> io::Result<BlockStore> {
        let BlockStore { file, path, temp } = self;
        drop(file);

        let BlockStore {
            file: scratch_file,
            path: scratch_path,
            temp: scratch_temp,
        } = scratch;
        drop(scratch_file);

        match scratch_temp {
            Some(scratch_temp) => {
                if let Err(err) = scratch_temp.persist(&path) {
                    log::warn!(
                        "renaming {} failed ({}), copying contents instead",
                        err.path.display(),
                        err.error
                    );
                    fs::copy(&err.path, &path)?;
                }
            }
            None => fs::rename(&scratch_path, &path)?,
        }

        log::debug!("{} replaced by {}", path.display(), scratch_path.display());

        let mut store = BlockStore::open(&path)?;
        store.temp = temp;

        return Ok(store);
    }
}

/// Record stream read block by block from the current position of a store.
pub struct RecordReader<'a> {
    store: &'a mut BlockStore,
    block: Vec<u8>,
    filled: usize,
    pos: usize,
    offset: u64,
    exhausted: bool,
}

impl<'a> RecordReader<'a> {
    /// Creates a reader using a single block buffer of `block_size` bytes.
    /// `block_size` must be a multiple of [`RECORD_SIZE`].
    pub fn new(store: &'a mut BlockStore, block_size: usize) -> Self {
        RecordReader {
            store,
            block: vec![0; block_size],
            filled: 0,
            pos: 0,
            offset: 0,
            exhausted: false,
        }
    }

    fn fill_block(&mut self) -> Result<bool, SortError> {
        self.offset += self.filled as u64;
        self.pos = 0;
        self.filled = 0;

        let read = self.store.read_block(&mut self.block).map_err(|err| {
            self.exhausted = true;
            SortError::IO(err)
        })?;

        if read < self.block.len() {
            self.exhausted = true;
        }
        if read % RECORD_SIZE != 0 {
            return Err(SortError::MalformedInput(format!(
                "truncated record at byte {} of {}",
                self.offset + (read - read % RECORD_SIZE) as u64,
                self.store.path().display()
            )));
        }

        self.filled = read;

        return Ok(read > 0);
    }
}

impl Iterator for RecordReader<'_> {
    type Item = Result<Record, SortError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos == self.filled {
            if self.exhausted {
                return None;
            }
            match self.fill_block() {
                Ok(true) => {}
                Ok(false) => return None,
                Err(err) => return Some(Err(err)),
            }
        }

        let record = Record::decode(&self.block[self.pos..self.pos + RECORD_SIZE]);
        self.pos += RECORD_SIZE;

        return Some(Ok(record));
    }
}

/// First record of every block of a store, read one record at a time.
pub struct BlockHeads<'a> {
    store: &'a mut BlockStore,
    block_size: u64,
    offset: u64,
    len: u64,
    head: [u8; RECORD_SIZE],
}

impl<'a> BlockHeads<'a> {
    /// `block_size` must be a multiple of [`RECORD_SIZE`].
    pub fn new(store: &'a mut BlockStore, block_size: usize) -> io::Result<Self> {
        let len = store.len()?;

        return Ok(BlockHeads {
            store,
            block_size: block_size as u64,
            offset: 0,
            len,
            head: [0; RECORD_SIZE],
        });
    }
}

impl Iterator for BlockHeads<'_> {
    type Item = Result<Record, SortError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset + RECORD_SIZE as u64 > self.len {
            return None;
        }

        let offset = self.offset;
        self.offset += self.block_size;

        let read = match self.store.read_at(offset, &mut self.head) {
            Ok(read) => read,
            Err(err) => {
                self.offset = self.len;
                return Some(Err(SortError::IO(err)));
            }
        };
        if read < RECORD_SIZE {
            self.offset = self.len;
            return Some(Err(SortError::MalformedInput(format!(
                "{} shrank while reading block at byte {}",
                self.store.path().display(),
                offset
            ))));
        }

        return Some(Ok(Record::decode(&self.head)));
    }
}

/// Output buffer that writes records to a store one full block at a time.
pub struct BlockWriter<'a> {
    store: &'a mut BlockStore,
    block: Vec<u8>,
    filled: usize,
    position: u64,
}

impl<'a> BlockWriter<'a> {
    /// Creates a writer using a single block buffer of `block_size` bytes.
    /// `block_size` must be a multiple of [`RECORD_SIZE`].
    pub fn new(store: &'a mut BlockStore, block_size: usize) -> Self {
        BlockWriter {
            store,
            block: vec![0; block_size],
            filled: 0,
            position: 0,
        }
    }

    /// Byte offset of the next record, counted from where the writer started.
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn push(&mut self, record: &Record) -> io::Result<()> {
        record.encode(&mut self.block[self.filled..self.filled + RECORD_SIZE]);
        self.filled += RECORD_SIZE;
        self.position += RECORD_SIZE as u64;

        if self.filled == self.block.len() {
            self.store.write_block(&self.block)?;
            self.filled = 0;
        }

        return Ok(());
    }

    /// Writes the partially filled block, if any, and flushes the store.
    pub fn finish(mut self) -> io::Result<u64> {
        if self.filled > 0 {
            self.store.write_block(&self.block[..self.filled])?;
            self.filled = 0;
        }
        self.store.flush()?;

        return Ok(self.position);
    }
}
