//! Error types for reading, writing and extracting tar archives.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors produced by the archive codec and the filesystem bridge.
#[derive(Debug, Error)]
pub enum TarError {
    /// The stream ended in the middle of a block or data region.
    #[error("truncated archive: stream ended at byte {offset}")]
    TruncatedArchive {
        /// Position in the archive stream where the data ran out.
        offset: u64,
    },

    /// A header block's stored checksum does not match its contents.
    #[error("checksum mismatch: stored {stored:o}, computed {computed:o}")]
    ChecksumMismatch {
        /// Value read from the checksum field.
        stored: u32,
        /// Unsigned sum computed over the block.
        computed: u32,
    },

    /// A numeric header field holds something other than octal or base-256.
    #[error("invalid numeric value in header field `{field}`")]
    InvalidNumeric {
        /// Name of the offending field.
        field: &'static str,
    },

    /// The magic field is not a recognized ustar or GNU magic.
    #[error("header magic is not ustar")]
    BadMagic,

    /// The version field does not match the magic.
    #[error("header version does not match its magic")]
    BadVersion,

    /// A GNU long-name entry was orphaned or repeated.
    #[error("malformed long name entry: {0}")]
    MalformedLongName(&'static str),

    /// A long-name or extended header payload exceeds the configured limit.
    #[error("long name payload exceeds limit: {size} bytes > {limit} bytes")]
    LongNameTooLarge {
        /// Declared payload size.
        size: u64,
        /// Configured limit.
        limit: u64,
    },

    /// The data supplied for an entry disagrees with its declared size.
    #[error("size mismatch for `{name}`: header declares {expected} bytes, got {actual}")]
    SizeMismatch {
        /// Entry name.
        name: String,
        /// Size declared in the entry.
        expected: u64,
        /// Bytes actually supplied (or at least this many, when too many).
        actual: u64,
    },

    /// A numeric value is too wide for its header field even in base-256.
    #[error("value {value} does not fit header field `{field}`")]
    FieldOverflow {
        /// Name of the field.
        field: &'static str,
        /// Value that was being encoded.
        value: u64,
    },

    /// A name cannot be represented in the selected header format.
    #[error("name too long for ustar header: {0}")]
    NameTooLong(String),

    /// A hard link's target was never materialized during extraction.
    #[error("hard link `{name}` points at `{target}`, which was never extracted")]
    UnresolvedHardlink {
        /// Name of the link entry.
        name: String,
        /// Target name recorded in the archive.
        target: String,
    },

    /// The filesystem refused to create an object.
    #[error("permission denied creating {}", path.display())]
    PermissionDenied {
        /// Path that could not be created.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// The target path already exists and overwriting is disabled.
    #[error("refusing to overwrite existing {}", .0.display())]
    AlreadyExists(PathBuf),

    /// Two entries share a name and the duplicate policy forbids it.
    #[error("duplicate entry in archive: {0}")]
    DuplicateEntry(String),

    /// An entry name would escape the extraction root.
    #[error("unsafe entry path: {0}")]
    UnsafePath(String),

    /// A write was attempted after `finish()`.
    #[error("archive is already finished")]
    ArchiveClosed,

    /// A previous fatal error left the stream unusable.
    #[error("archive stream is unusable after an earlier error")]
    ArchivePoisoned,

    /// An invalid glob pattern was given for selective extraction.
    #[error("invalid pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    /// I/O error from the archive stream or the filesystem.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl TarError {
    /// Wraps a filesystem creation error, singling out permission failures.
    pub(crate) fn creating(path: impl Into<PathBuf>, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::PermissionDenied {
            TarError::PermissionDenied {
                path: path.into(),
                source,
            }
        } else {
            TarError::Io(source)
        }
    }
}

impl From<TarError> for io::Error {
    fn from(err: TarError) -> Self {
        match err {
            TarError::Io(e) => e,
            TarError::TruncatedArchive { .. } => io::Error::new(io::ErrorKind::UnexpectedEof, err),
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}

/// Result type for archive operations.
pub type Result<T> = std::result::Result<T, TarError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_errors_are_singled_out() {
        let denied = io::Error::from(io::ErrorKind::PermissionDenied);
        let err = TarError::creating("/nope", denied);
        assert!(matches!(err, TarError::PermissionDenied { .. }));

        let other = io::Error::from(io::ErrorKind::NotFound);
        assert!(matches!(TarError::creating("/nope", other), TarError::Io(_)));
    }

    #[test]
    fn truncation_maps_to_unexpected_eof() {
        let err: io::Error = TarError::TruncatedArchive { offset: 300 }.into();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);

        let err: io::Error = TarError::ArchiveClosed.into();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
