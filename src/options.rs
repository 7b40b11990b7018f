//! Archive options shared by the reader, the writer and the extractor.

/// Header flavour used when writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    /// GNU headers; names over 100 bytes use `././@LongLink` entries.
    #[default]
    Gnu,
    /// POSIX ustar headers; long names are split into prefix and name.
    Ustar,
}

/// How protocol violations around long-name entries are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LongNameMode {
    /// Repeated or orphaned long-name entries are errors.
    #[default]
    Strict,
    /// The last override wins; orphans are logged and dropped.
    Lenient,
}

/// What extraction does when a name occurs more than once in one archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicatePolicy {
    /// The later entry replaces the earlier one.
    #[default]
    Overwrite,
    /// The first entry is kept and later ones are skipped.
    KeepFirst,
    /// Extraction fails with [`TarError::DuplicateEntry`](crate::TarError::DuplicateEntry).
    Error,
}

/// Options for reading, writing and extracting archives.
///
/// ```
/// use tar_stream::{Options, LongNameMode};
///
/// let options = Options::default()
///     .long_names(LongNameMode::Lenient)
///     .no_overwrite(true);
/// assert!(options.no_overwrite);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    /// Header flavour for written entries.
    pub format: Format,
    /// Long-name protocol strictness on read.
    pub long_names: LongNameMode,
    /// Largest accepted long-name or PAX payload in bytes.
    pub max_long_name: u64,
    /// Keep reading past zero blocks; only end of stream terminates.
    pub ignore_eot: bool,
    /// Reject headers without ustar or GNU magic.
    pub check_magic: bool,
    /// Reject headers whose version does not match their magic.
    pub check_version: bool,
    /// Skip header checksum verification.
    pub ignore_crc: bool,
    /// Log a long listing line for every entry at info level.
    pub verbose: bool,
    /// Refuse to replace files that already exist on disk.
    pub no_overwrite: bool,
    /// Archive the targets of symlinks instead of the links.
    pub follow_symlinks: bool,
    /// Restore ownership on extraction (best-effort).
    pub preserve_owner: bool,
    /// Handling of repeated names during extraction.
    pub duplicates: DuplicatePolicy,
    /// Compression level for gzip and bzip2 output (1-9).
    pub compression_level: u32,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            format: Format::Gnu,
            long_names: LongNameMode::Strict,
            max_long_name: 1024 * 1024,
            ignore_eot: false,
            check_magic: false,
            check_version: false,
            ignore_crc: false,
            verbose: false,
            no_overwrite: false,
            follow_symlinks: false,
            preserve_owner: true,
            duplicates: DuplicatePolicy::Overwrite,
            compression_level: 6,
        }
    }
}

impl Options {
    /// Create options with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }

    #[must_use]
    pub fn long_names(mut self, mode: LongNameMode) -> Self {
        self.long_names = mode;
        self
    }

    #[must_use]
    pub fn max_long_name(mut self, limit: u64) -> Self {
        self.max_long_name = limit;
        self
    }

    #[must_use]
    pub fn ignore_eot(mut self, yes: bool) -> Self {
        self.ignore_eot = yes;
        self
    }

    #[must_use]
    pub fn check_magic(mut self, yes: bool) -> Self {
        self.check_magic = yes;
        self
    }

    #[must_use]
    pub fn check_version(mut self, yes: bool) -> Self {
        self.check_version = yes;
        self
    }

    #[must_use]
    pub fn ignore_crc(mut self, yes: bool) -> Self {
        self.ignore_crc = yes;
        self
    }

    #[must_use]
    pub fn verbose(mut self, yes: bool) -> Self {
        self.verbose = yes;
        self
    }

    #[must_use]
    pub fn no_overwrite(mut self, yes: bool) -> Self {
        self.no_overwrite = yes;
        self
    }

    #[must_use]
    pub fn follow_symlinks(mut self, yes: bool) -> Self {
        self.follow_symlinks = yes;
        self
    }

    #[must_use]
    pub fn preserve_owner(mut self, yes: bool) -> Self {
        self.preserve_owner = yes;
        self
    }

    #[must_use]
    pub fn duplicates(mut self, policy: DuplicatePolicy) -> Self {
        self.duplicates = policy;
        self
    }

    /// Set the compression level, clamped to 1..=9.
    #[must_use]
    pub fn compression_level(mut self, level: u32) -> Self {
        self.compression_level = level.clamp(1, 9);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let options = Options::default();
        assert_eq!(options.format, Format::Gnu);
        assert_eq!(options.long_names, LongNameMode::Strict);
        assert_eq!(options.duplicates, DuplicatePolicy::Overwrite);
        assert!(options.preserve_owner);
        assert!(!options.ignore_crc);
        assert_eq!(options.compression_level, 6);
    }

    #[test]
    fn builder_setters() {
        let options = Options::new()
            .format(Format::Ustar)
            .ignore_eot(true)
            .compression_level(42);
        assert_eq!(options.format, Format::Ustar);
        assert!(options.ignore_eot);
        assert_eq!(options.compression_level, 9);
    }
}
