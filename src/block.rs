//! Fixed 512-byte record I/O over an arbitrary byte stream.

use std::io::{self, Read, Write};

use crate::error::{Result, TarError};

/// Size of one tar record.
pub const BLOCK_SIZE: usize = 512;

const ZERO_BLOCK: [u8; BLOCK_SIZE] = [0u8; BLOCK_SIZE];

/// Round `size` up to the next multiple of [`BLOCK_SIZE`].
pub fn padded_size(size: u64) -> Option<u64> {
    size.checked_next_multiple_of(BLOCK_SIZE as u64)
}

/// Reads whole blocks and bounded data regions, tracking the stream position.
#[derive(Debug)]
pub struct BlockReader<R> {
    inner: R,
    pos: u64,
}

impl<R: Read> BlockReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, pos: 0 }
    }

    /// Read the next block.
    ///
    /// Returns `Ok(None)` when the stream ends exactly on a block boundary and
    /// [`TarError::TruncatedArchive`] when it ends inside a block.
    pub fn read_block(&mut self) -> Result<Option<[u8; BLOCK_SIZE]>> {
        let mut block = [0u8; BLOCK_SIZE];
        let mut filled = 0;
        while filled < BLOCK_SIZE {
            match self.inner.read(&mut block[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        self.pos += filled as u64;
        match filled {
            0 => Ok(None),
            BLOCK_SIZE => Ok(Some(block)),
            _ => Err(TarError::TruncatedArchive { offset: self.pos }),
        }
    }

    /// Read raw data bytes; a zero-length result means end of stream.
    pub fn read_data(&mut self, buf: &mut [u8]) -> Result<usize> {
        loop {
            match self.inner.read(buf) {
                Ok(n) => {
                    self.pos += n as u64;
                    return Ok(n);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Fill `buf` completely or fail with [`TarError::TruncatedArchive`].
    pub fn read_data_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.read_data(&mut buf[filled..])?;
            if n == 0 {
                return Err(TarError::TruncatedArchive { offset: self.pos });
            }
            filled += n;
        }
        Ok(())
    }

    /// Discard `len` bytes.
    pub fn skip(&mut self, len: u64) -> Result<()> {
        let mut remaining = len;
        let mut buf = [0u8; 8192];
        while remaining > 0 {
            let want = remaining.min(buf.len() as u64) as usize;
            let n = self.read_data(&mut buf[..want])?;
            if n == 0 {
                return Err(TarError::TruncatedArchive { offset: self.pos });
            }
            remaining -= n as u64;
        }
        Ok(())
    }

    /// Advance past the zero padding that follows a data region of `size` bytes.
    pub fn skip_padding(&mut self, size: u64) -> Result<()> {
        let padded = padded_size(size).ok_or(TarError::InvalidNumeric { field: "size" })?;
        self.skip(padded - size)
    }

    pub fn position(&self) -> u64 {
        self.pos
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

/// Writes whole blocks and zero-padded data regions.
#[derive(Debug)]
pub struct BlockWriter<W> {
    inner: W,
    pos: u64,
}

impl<W: Write> BlockWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, pos: 0 }
    }

    pub fn write_block(&mut self, block: &[u8; BLOCK_SIZE]) -> Result<()> {
        self.write_data(block)
    }

    pub fn write_zero_block(&mut self) -> Result<()> {
        self.write_data(&ZERO_BLOCK)
    }

    /// Write raw bytes; the caller restores alignment with [`pad_to_block`](Self::pad_to_block).
    pub fn write_data(&mut self, data: &[u8]) -> Result<()> {
        self.inner.write_all(data)?;
        self.pos += data.len() as u64;
        Ok(())
    }

    /// Zero-fill up to the next block boundary.
    pub fn pad_to_block(&mut self) -> Result<()> {
        let rem = (self.pos % BLOCK_SIZE as u64) as usize;
        if rem != 0 {
            self.write_data(&ZERO_BLOCK[..BLOCK_SIZE - rem])?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }

    pub fn position(&self) -> u64 {
        self.pos
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn padded_sizes() {
        assert_eq!(padded_size(0), Some(0));
        assert_eq!(padded_size(1), Some(512));
        assert_eq!(padded_size(512), Some(512));
        assert_eq!(padded_size(513), Some(1024));
        assert_eq!(padded_size(u64::MAX), None);
    }

    #[test]
    fn short_final_block_is_truncation() {
        let mut reader = BlockReader::new(Cursor::new(vec![1u8; 300]));
        match reader.read_block() {
            Err(TarError::TruncatedArchive { offset }) => assert_eq!(offset, 300),
            other => panic!("expected truncation, got {:?}", other.map(|b| b.is_some())),
        }
    }

    #[test]
    fn clean_end_on_boundary() {
        let mut reader = BlockReader::new(Cursor::new(vec![7u8; 1024]));
        assert!(reader.read_block().unwrap().is_some());
        assert!(reader.read_block().unwrap().is_some());
        assert!(reader.read_block().unwrap().is_none());
        assert_eq!(reader.position(), 1024);
    }

    #[test]
    fn skip_past_end_fails() {
        let mut reader = BlockReader::new(Cursor::new(vec![0u8; 100]));
        assert!(matches!(reader.skip(512), Err(TarError::TruncatedArchive { .. })));
    }

    #[test]
    fn writer_pads_to_boundary() {
        let mut writer = BlockWriter::new(Vec::new());
        writer.write_data(b"hello").unwrap();
        writer.pad_to_block().unwrap();
        assert_eq!(writer.position(), 512);
        writer.pad_to_block().unwrap();
        assert_eq!(writer.position(), 512);

        let bytes = writer.into_inner();
        assert_eq!(&bytes[..5], b"hello");
        assert!(bytes[5..].iter().all(|&b| b == 0));
    }
}
