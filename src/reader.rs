//! Sequential archive reader.
//!
//! The reader walks the archive header by header. Auxiliary entries (GNU
//! long names, PAX headers) are folded into the entry that follows them, so
//! callers only ever see real filesystem objects. The data of the current
//! entry is exposed as a bounded region; moving to the next entry discards
//! whatever was left unread.

use std::io::{self, BufRead, Read};

use crate::block::{padded_size, BlockReader};
use crate::compression::{Compression, Decoder};
use crate::entry::{ArchiveEntry, EntryType};
use crate::error::{Result, TarError};
use crate::header::HeaderBlock;
use crate::longname::LongNameResolver;
use crate::options::Options;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Start,
    Entry,
    End,
    Poisoned,
}

/// Reads entries and their data from a tar stream.
///
/// ```
/// use tar_stream::{ArchiveEntry, TarReader, TarWriter};
///
/// let mut writer = TarWriter::new(Vec::new());
/// writer.append_data(&ArchiveEntry::file("a.txt", 5), b"hello").unwrap();
/// let bytes = writer.into_inner().unwrap();
///
/// let mut reader = TarReader::new(&bytes[..]);
/// let entry = reader.next_entry().unwrap().unwrap();
/// assert_eq!(entry.name, "a.txt");
/// assert_eq!(reader.read_data(100).unwrap(), b"hello");
/// assert!(reader.next_entry().unwrap().is_none());
/// ```
#[derive(Debug)]
pub struct TarReader<R> {
    blocks: BlockReader<R>,
    options: Options,
    resolver: LongNameResolver,
    state: State,
    current: Option<ArchiveEntry>,
    remaining: u64,
    padding: u64,
}

impl<R: Read> TarReader<R> {
    pub fn new(inner: R) -> Self {
        Self::with_options(inner, Options::default())
    }

    pub fn with_options(inner: R, options: Options) -> Self {
        Self {
            blocks: BlockReader::new(inner),
            resolver: LongNameResolver::new(&options),
            options,
            state: State::Start,
            current: None,
            remaining: 0,
            padding: 0,
        }
    }

    /// Read a compressed archive.
    pub fn with_compression(inner: R, compression: Compression, options: Options) -> TarReader<Decoder<R>> {
        TarReader::with_options(Decoder::new(inner, compression), options)
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// The entry returned by the last [`next_entry`](Self::next_entry).
    pub fn current(&self) -> Option<&ArchiveEntry> {
        self.current.as_ref()
    }

    /// Offset in the (decompressed) archive stream.
    pub fn position(&self) -> u64 {
        self.blocks.position()
    }

    pub fn into_inner(self) -> R {
        self.blocks.into_inner()
    }

    /// Advance to the next real entry; `None` at the end of the archive.
    pub fn next_entry(&mut self) -> Result<Option<ArchiveEntry>> {
        match self.state {
            State::End => return Ok(None),
            State::Poisoned => return Err(TarError::ArchivePoisoned),
            State::Start | State::Entry => {}
        }
        let result = self.advance();
        self.state = match &result {
            Ok(Some(_)) => State::Entry,
            Ok(None) => State::End,
            Err(_) => State::Poisoned,
        };
        result
    }

    fn advance(&mut self) -> Result<Option<ArchiveEntry>> {
        self.skip_data()?;
        self.current = None;

        loop {
            let Some(block) = self.blocks.read_block()? else {
                log::warn!("archive ended at byte {} without an end marker", self.blocks.position());
                self.resolver.finish()?;
                return Ok(None);
            };
            let mut block = HeaderBlock::from_bytes(block);

            if block.is_zero() {
                if self.options.ignore_eot {
                    continue;
                }
                match self.blocks.read_block()? {
                    Some(next) if next.iter().any(|&b| b != 0) => {
                        log::warn!("skipping lone zero block before byte {}", self.blocks.position().saturating_sub(512));
                        block = HeaderBlock::from_bytes(next);
                    }
                    _ => {
                        self.resolver.finish()?;
                        return Ok(None);
                    }
                }
            }

            if let Some(entry) = self.process(&block)? {
                return Ok(Some(entry));
            }
        }
    }

    /// Handle one non-zero header; returns the entry if it is a real one.
    fn process(&mut self, block: &HeaderBlock) -> Result<Option<ArchiveEntry>> {
        let Some(mut entry) = block.decode(&self.options)? else {
            return Ok(None);
        };

        match entry.entry_type {
            EntryType::GnuLongName | EntryType::GnuLongLink => {
                let payload = self.read_payload(entry.size)?;
                self.resolver.accept(entry.entry_type, &payload)?;
                Ok(None)
            }
            EntryType::PaxHeader => {
                let payload = self.read_payload(entry.size)?;
                self.resolver.accept_pax(&payload)?;
                Ok(None)
            }
            EntryType::PaxGlobal => {
                log::debug!("skipping pax global header ({} bytes)", entry.size);
                self.blocks.skip(entry.size)?;
                self.blocks.skip_padding(entry.size)?;
                Ok(None)
            }
            _ => {
                self.resolver.apply(&mut entry);
                let len = entry.data_len();
                let padded = padded_size(len).ok_or(TarError::InvalidNumeric { field: "size" })?;
                self.remaining = len;
                self.padding = padded - len;
                log::debug!("entry {} ({} bytes) at byte {}", entry.name, len, self.blocks.position());
                self.current = Some(entry.clone());
                Ok(Some(entry))
            }
        }
    }

    fn read_payload(&mut self, size: u64) -> Result<Vec<u8>> {
        self.resolver.check_size(size)?;
        let len = usize::try_from(size).map_err(|_| TarError::LongNameTooLarge {
            size,
            limit: self.options.max_long_name,
        })?;
        let mut payload = vec![0u8; len];
        self.blocks.read_data_exact(&mut payload)?;
        self.blocks.skip_padding(size)?;
        Ok(payload)
    }

    /// Read into `buf` without crossing the end of the current entry's data.
    pub(crate) fn read_bounded(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.state == State::Poisoned {
            return Err(TarError::ArchivePoisoned);
        }
        let want = buf.len().min(usize::try_from(self.remaining).unwrap_or(usize::MAX));
        if want == 0 {
            return Ok(0);
        }
        let n = match self.blocks.read_data(&mut buf[..want]) {
            Ok(0) => Err(TarError::TruncatedArchive { offset: self.blocks.position() }),
            other => other,
        };
        match n {
            Ok(n) => {
                self.remaining -= n as u64;
                Ok(n)
            }
            Err(e) => {
                self.state = State::Poisoned;
                Err(e)
            }
        }
    }

    /// Up to `n` bytes of the current entry's data; empty once it is exhausted.
    pub fn read_data(&mut self, n: usize) -> Result<Vec<u8>> {
        let want = n.min(usize::try_from(self.remaining).unwrap_or(usize::MAX));
        let mut buf = vec![0u8; want];
        let mut filled = 0;
        while filled < want {
            let read = self.read_bounded(&mut buf[filled..])?;
            if read == 0 {
                break;
            }
            filled += read;
        }
        buf.truncate(filled);
        Ok(buf)
    }

    /// A bounded reader over the current entry's data.
    pub fn data(&mut self) -> EntryData<'_, R> {
        EntryData { reader: self }
    }

    /// Discard the rest of the current entry's data and its padding.
    pub fn skip_data(&mut self) -> Result<()> {
        if self.state == State::Poisoned {
            return Err(TarError::ArchivePoisoned);
        }
        let len = self.remaining + self.padding;
        self.remaining = 0;
        self.padding = 0;
        if let Err(e) = self.blocks.skip(len) {
            self.state = State::Poisoned;
            return Err(e);
        }
        Ok(())
    }

    /// The rest of the current regular file's content, or `None` for any
    /// other entry type.
    pub fn read_to_vec(&mut self) -> Result<Option<Vec<u8>>> {
        match &self.current {
            Some(entry) if entry.is_file() => {}
            _ => return Ok(None),
        }
        let cap = usize::try_from(self.remaining.min(1 << 20)).unwrap_or(0);
        let mut out = Vec::with_capacity(cap);
        let mut buf = [0u8; 8192];
        loop {
            let n = self.read_bounded(&mut buf)?;
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        Ok(Some(out))
    }

    /// Iterate over the remaining entries, skipping their data.
    pub fn entries(&mut self) -> Entries<'_, R> {
        Entries { reader: self, done: false }
    }
}

impl<R: BufRead> TarReader<Decoder<R>> {
    /// Detect gzip or bzip2 from the stream's magic bytes.
    pub fn sniff(inner: R, options: Options) -> Result<Self> {
        Ok(TarReader::with_options(Decoder::sniff(inner)?, options))
    }
}

/// Data of the current entry; reads end at the entry boundary.
pub struct EntryData<'a, R> {
    reader: &'a mut TarReader<R>,
}

impl<R: Read> Read for EntryData<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.reader.read_bounded(buf)?)
    }
}

/// Iterator returned by [`TarReader::entries`].
pub struct Entries<'a, R> {
    reader: &'a mut TarReader<R>,
    done: bool,
}

impl<R: Read> Iterator for Entries<'_, R> {
    type Item = Result<ArchiveEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.reader.next_entry() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
