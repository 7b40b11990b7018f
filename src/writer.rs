//! Sequential archive writer.

use std::collections::HashMap;
use std::io::{self, Read, Write};

use crate::block::BlockWriter;
use crate::compression::{Compression, Encoder};
use crate::entry::ArchiveEntry;
use crate::error::{Result, TarError};
use crate::header::HeaderBlock;
use crate::longname::auxiliary_entries;
use crate::options::Options;
use crate::sys::OwnerCache;

/// Writes entries to a tar stream.
///
/// The end-of-archive marker is written by [`finish`](Self::finish),
/// [`into_inner`](Self::into_inner) or, best-effort, on drop. Once an entry
/// has been written with the wrong amount of data the writer is poisoned: it
/// refuses further work and never writes the end marker.
pub struct TarWriter<W: Write> {
    blocks: Option<BlockWriter<W>>,
    options: Options,
    finished: bool,
    poisoned: bool,
    /// (device, inode) of archived files with several links, and their names.
    pub(crate) inodes: HashMap<(u64, u64), String>,
    pub(crate) owners: OwnerCache,
}

impl<W: Write> TarWriter<W> {
    pub fn new(inner: W) -> Self {
        Self::with_options(inner, Options::default())
    }

    pub fn with_options(inner: W, options: Options) -> Self {
        Self {
            blocks: Some(BlockWriter::new(inner)),
            options,
            finished: false,
            poisoned: false,
            inodes: HashMap::new(),
            owners: OwnerCache::new(),
        }
    }

    /// Write a compressed archive; call [`close`](TarWriter::close) when done.
    pub fn with_compression(inner: W, compression: Compression, options: Options) -> TarWriter<Encoder<W>> {
        let level = options.compression_level;
        TarWriter::with_options(Encoder::new(inner, compression, level), options)
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Bytes written so far, before compression.
    pub fn position(&self) -> u64 {
        self.blocks.as_ref().map_or(0, BlockWriter::position)
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    fn check_open(&self) -> Result<()> {
        if self.poisoned {
            Err(TarError::ArchivePoisoned)
        } else if self.finished || self.blocks.is_none() {
            Err(TarError::ArchiveClosed)
        } else {
            Ok(())
        }
    }

    /// Write one entry, with its content read from `data`.
    ///
    /// `data` must yield exactly `entry.size` bytes for entries with a data
    /// region and nothing for the others; anything else is
    /// [`TarError::SizeMismatch`] and poisons the writer.
    pub fn write_entry(&mut self, entry: &ArchiveEntry, mut data: impl Read) -> Result<()> {
        self.check_open()?;

        // Encoding failures leave the stream untouched.
        let aux = auxiliary_entries(entry, self.options.format)?;
        let header = HeaderBlock::encode(entry, self.options.format)?;

        let result = self.emit(entry, &aux, &header, &mut data);
        if result.is_err() {
            self.poisoned = true;
        }
        result
    }

    /// Write one entry whose content is already in memory.
    pub fn append_data(&mut self, entry: &ArchiveEntry, data: &[u8]) -> Result<()> {
        self.write_entry(entry, data)
    }

    fn emit(
        &mut self,
        entry: &ArchiveEntry,
        aux: &[(HeaderBlock, Vec<u8>)],
        header: &HeaderBlock,
        data: &mut dyn Read,
    ) -> Result<()> {
        let blocks = self.blocks.as_mut().ok_or(TarError::ArchiveClosed)?;
        for (block, payload) in aux {
            blocks.write_block(block.as_bytes())?;
            blocks.write_data(payload)?;
            blocks.pad_to_block()?;
        }
        blocks.write_block(header.as_bytes())?;

        let expected = entry.stored_size();
        let mut copied = 0u64;
        let mut buf = [0u8; 8192];
        loop {
            // One byte past the declared size is enough to detect an overlong source.
            let want = (expected - copied).saturating_add(1).min(buf.len() as u64) as usize;
            let n = match data.read(&mut buf[..want]) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            if copied + n as u64 > expected {
                return Err(TarError::SizeMismatch {
                    name: entry.name.clone(),
                    expected,
                    actual: copied + n as u64,
                });
            }
            blocks.write_data(&buf[..n])?;
            copied += n as u64;
        }
        if copied != expected {
            return Err(TarError::SizeMismatch {
                name: entry.name.clone(),
                expected,
                actual: copied,
            });
        }
        blocks.pad_to_block()?;
        log::debug!("wrote {} ({} bytes)", entry.name, expected);
        Ok(())
    }

    /// Write the two-block end marker and flush.
    pub fn finish(&mut self) -> Result<()> {
        self.check_open()?;
        let result = self.write_end_marker();
        match result {
            Ok(()) => self.finished = true,
            Err(_) => self.poisoned = true,
        }
        result
    }

    fn write_end_marker(&mut self) -> Result<()> {
        let blocks = self.blocks.as_mut().ok_or(TarError::ArchiveClosed)?;
        blocks.write_zero_block()?;
        blocks.write_zero_block()?;
        blocks.flush()
    }

    /// Finish the archive if needed and return the underlying stream.
    ///
    /// A poisoned writer hands back the stream as is, without an end marker.
    pub fn into_inner(mut self) -> Result<W> {
        if !self.finished && !self.poisoned {
            self.finish()?;
        }
        self.blocks
            .take()
            .map(BlockWriter::into_inner)
            .ok_or(TarError::ArchiveClosed)
    }
}

impl<W: Write> TarWriter<Encoder<W>> {
    /// Finish the archive and the compressor, returning the raw stream.
    pub fn close(self) -> Result<W> {
        let encoder = self.into_inner()?;
        Ok(encoder.finish()?)
    }
}

impl<W: Write> Drop for TarWriter<W> {
    fn drop(&mut self) {
        if self.blocks.is_some() && !self.finished && !self.poisoned {
            if let Err(e) = self.finish() {
                log::warn!("failed to finish archive on drop: {}", e);
            }
        }
    }
}
