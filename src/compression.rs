//! Stream compression filters layered under the block layer.
//!
//! The archive engine only ever sees a plain byte stream; these enums pick
//! the codec once per archive and then forward reads and writes.

use std::fmt;
use std::io::{self, BufRead, Read, Write};
use std::path::Path;

use bzip2::read::MultiBzDecoder;
use bzip2::write::BzEncoder;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;

const GZIP_MAGIC: &[u8] = &[0x1f, 0x8b];
const BZIP2_MAGIC: &[u8] = b"BZh";

/// Compression applied to the whole archive stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    /// Plain tar.
    #[default]
    None,
    /// gzip (deflate).
    Gzip,
    /// bzip2 (block compression).
    Bzip2,
}

impl Compression {
    /// Pick a compression from the archive file name.
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let name = path
            .as_ref()
            .file_name()
            .map(|n| n.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Compression::Gzip
        } else if [".tar.bz2", ".tbz2", ".tbz", ".tb2"]
            .iter()
            .any(|suffix| name.ends_with(suffix))
        {
            Compression::Bzip2
        } else {
            Compression::None
        }
    }

    /// Pick a compression from the first bytes of a stream.
    pub fn detect(prefix: &[u8]) -> Self {
        if prefix.starts_with(GZIP_MAGIC) {
            Compression::Gzip
        } else if prefix.starts_with(BZIP2_MAGIC) {
            Compression::Bzip2
        } else {
            Compression::None
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Compression::None => "none",
            Compression::Gzip => "gzip",
            Compression::Bzip2 => "bzip2",
        };
        f.write_str(s)
    }
}

/// Decompressing reader.
pub enum Decoder<R: Read> {
    Plain(R),
    Gzip(MultiGzDecoder<R>),
    Bzip2(MultiBzDecoder<R>),
}

impl<R: Read> Decoder<R> {
    pub fn new(inner: R, compression: Compression) -> Self {
        match compression {
            Compression::None => Decoder::Plain(inner),
            Compression::Gzip => Decoder::Gzip(MultiGzDecoder::new(inner)),
            Compression::Bzip2 => Decoder::Bzip2(MultiBzDecoder::new(inner)),
        }
    }

    pub fn compression(&self) -> Compression {
        match self {
            Decoder::Plain(_) => Compression::None,
            Decoder::Gzip(_) => Compression::Gzip,
            Decoder::Bzip2(_) => Compression::Bzip2,
        }
    }
}

impl<R: BufRead> Decoder<R> {
    /// Peek at the stream's magic bytes and wrap it in the matching decoder.
    pub fn sniff(mut inner: R) -> io::Result<Self> {
        let compression = Compression::detect(inner.fill_buf()?);
        log::debug!("detected {} archive stream", compression);
        Ok(Decoder::new(inner, compression))
    }
}

impl<R: Read> Read for Decoder<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Decoder::Plain(r) => r.read(buf),
            Decoder::Gzip(r) => r.read(buf),
            Decoder::Bzip2(r) => r.read(buf),
        }
    }
}

/// Compressing writer.
pub enum Encoder<W: Write> {
    Plain(W),
    Gzip(GzEncoder<W>),
    Bzip2(BzEncoder<W>),
}

impl<W: Write> Encoder<W> {
    pub fn new(inner: W, compression: Compression, level: u32) -> Self {
        let level = level.clamp(1, 9);
        match compression {
            Compression::None => Encoder::Plain(inner),
            Compression::Gzip => Encoder::Gzip(GzEncoder::new(inner, flate2::Compression::new(level))),
            Compression::Bzip2 => Encoder::Bzip2(BzEncoder::new(inner, bzip2::Compression::new(level))),
        }
    }

    /// Write the codec trailer and return the underlying stream.
    pub fn finish(self) -> io::Result<W> {
        match self {
            Encoder::Plain(mut w) => {
                w.flush()?;
                Ok(w)
            }
            Encoder::Gzip(w) => w.finish(),
            Encoder::Bzip2(w) => w.finish(),
        }
    }
}

impl<W: Write> Write for Encoder<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Encoder::Plain(w) => w.write(buf),
            Encoder::Gzip(w) => w.write(buf),
            Encoder::Bzip2(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Encoder::Plain(w) => w.flush(),
            Encoder::Gzip(w) => w.flush(),
            Encoder::Bzip2(w) => w.flush(),
        }
    }
}
