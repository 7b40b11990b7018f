//! Streaming tar archive reader and writer
//!
//! Reads and writes GNU and ustar archives, optionally gzip or bzip2
//! compressed, and moves entries between archives and the local filesystem.
//!
//! # Usage
//!
//! ## Packing files into a TAR archive
//!
//! ```no_run
//! use tar_stream::pack;
//!
//! pack("archive.tar", &["file1.txt", "some_dir"]).unwrap();
//! // Creates archive.tar containing file1.txt and the some_dir tree
//! pack("archive.tar.gz", &["file1.txt"]).unwrap();
//! // Creates archive.tar.gz that is gzip-compressed
//! ```
//!
//! ## Unpacking files from a TAR archive
//!
//! ```no_run
//! use tar_stream::unpack;
//!
//! unpack("archive.tar.bz2", "output_directory").unwrap();
//! // Compression is detected from the archive content
//! ```
//!
//! ## Listing files in a TAR archive
//!
//! ```no_run
//! use tar_stream::list;
//!
//! for entry in list("archive.tar").unwrap() {
//!     println!("{}", entry.long_listing());
//! }
//! ```
//!
//! ## Streaming API
//!
//! ```
//! use tar_stream::{ArchiveEntry, Options, TarReader, TarWriter};
//!
//! let mut writer = TarWriter::with_options(Vec::new(), Options::default());
//! writer.append_data(&ArchiveEntry::directory("docs"), b"").unwrap();
//! writer.append_data(&ArchiveEntry::file("docs/hello.txt", 12), b"Hello, World").unwrap();
//! let tar_data = writer.into_inner().unwrap();
//!
//! let mut reader = TarReader::new(&tar_data[..]);
//! while let Some(entry) = reader.next_entry().unwrap() {
//!     if let Some(data) = reader.read_to_vec().unwrap() {
//!         println!("{}: {} bytes", entry.name, data.len());
//!     }
//! }
//! ```

pub mod block;
pub mod compression;
pub mod entry;
pub mod error;
pub mod fs;
pub mod header;
pub mod longname;
pub mod options;
pub mod reader;
pub mod sys;
pub mod writer;

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

pub use compression::{Compression, Decoder, Encoder};
pub use entry::{ArchiveEntry, EntryType};
pub use error::{Result, TarError};
pub use fs::{create_archive_from_tree, extract_archive_to_tree, Extractor};
pub use header::HeaderBlock;
pub use options::{DuplicatePolicy, Format, LongNameMode, Options};
pub use reader::{EntryData, Entries, TarReader};
pub use writer::TarWriter;

/// Open an archive file for reading; gzip and bzip2 are detected from the content.
pub fn open_read(path: impl AsRef<Path>, options: Options) -> Result<TarReader<Decoder<BufReader<File>>>> {
    let file = File::open(path)?;
    TarReader::sniff(BufReader::new(file), options)
}

/// Create an archive file for writing; finish it with [`TarWriter::close`].
pub fn open_write(
    path: impl AsRef<Path>,
    compression: Compression,
    options: Options,
) -> Result<TarWriter<Encoder<BufWriter<File>>>> {
    let file = File::create(path)?;
    Ok(TarWriter::with_compression(BufWriter::new(file), compression, options))
}

// ----------------------------------------------------------------
// simple methods for reading and writing tar archives
// ----------------------------------------------------------------
/// Packs files and directory trees into an archive, compressed according to
/// the archive's suffix (`.tar.gz`, `.tgz`, `.tar.bz2`, ...).
///
/// Each input is stored under its file name. Missing inputs are skipped with
/// a warning.
pub fn pack(tarfile: impl AsRef<Path>, files: &[impl AsRef<Path>]) -> Result<()> {
    let tarfile = tarfile.as_ref();
    let mut writer = open_write(tarfile, Compression::from_path(tarfile), Options::default())?;

    for file in files {
        let path = file.as_ref();
        let meta = match std::fs::symlink_metadata(path) {
            Ok(meta) => meta,
            Err(e) => {
                log::warn!("skipping {}: {}", path.display(), e);
                continue;
            }
        };
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        if meta.is_dir() {
            writer.append_tree(path, &name)?;
        } else {
            writer.append_path(path, &name)?;
        }
    }

    writer.close()?.flush()?;
    log::info!("created tar archive {}", tarfile.display());
    Ok(())
}

/// Unpacks an archive (plain, gzip or bzip2) into `output_dir`.
pub fn unpack(tarfile: impl AsRef<Path>, output_dir: impl AsRef<Path>) -> Result<()> {
    unpack_with(tarfile, output_dir, Options::default())
}

/// [`unpack`] with explicit options.
pub fn unpack_with(tarfile: impl AsRef<Path>, output_dir: impl AsRef<Path>, options: Options) -> Result<()> {
    let mut reader = open_read(tarfile, options.clone())?;
    Extractor::new(options).extract_all(&mut reader, output_dir.as_ref())?;
    log::info!("extraction complete to {}", output_dir.as_ref().display());
    Ok(())
}

/// Lists the entries of an archive (plain, gzip or bzip2).
pub fn list(tarfile: impl AsRef<Path>) -> Result<Vec<ArchiveEntry>> {
    let mut reader = open_read(tarfile, Options::default())?;
    reader.entries().collect()
}

/// An entry together with its content, for whole-archive in-memory use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TarEntry {
    pub entry: ArchiveEntry,
    /// Content of regular files; empty for everything else.
    pub data: Vec<u8>,
}

/// Parses a plain (uncompressed) archive held in memory.
pub fn read_tar(tar_data: &[u8]) -> Result<Vec<TarEntry>> {
    let mut reader = TarReader::new(tar_data);
    let mut entries = Vec::new();
    while let Some(entry) = reader.next_entry()? {
        let data = reader.read_to_vec()?.unwrap_or_default();
        entries.push(TarEntry { entry, data });
    }
    Ok(entries)
}

/// Serializes entries into a plain archive.
pub fn write_tar(entries: &[TarEntry]) -> Result<Vec<u8>> {
    let mut writer = TarWriter::new(Vec::new());
    for item in entries {
        writer.append_data(&item.entry, &item.data)?;
    }
    writer.into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_pack() {
        let dir = tempfile::tempdir().unwrap();
        let test_file1 = dir.path().join("test_file1.txt");
        let test_file2 = dir.path().join("test_file2.txt");
        let test_tar = dir.path().join("test_pack.tar");

        fs::write(&test_file1, "Hello, World!").unwrap();
        fs::write(&test_file2, "Test content 2").unwrap();

        pack(&test_tar, &[&test_file1, &test_file2]).unwrap();
        assert!(test_tar.exists());

        let tar_data = fs::read(&test_tar).unwrap();
        let entries = read_tar(&tar_data).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].entry.name, "test_file1.txt");
        assert_eq!(entries[0].data, b"Hello, World!");
        assert_eq!(entries[1].entry.name, "test_file2.txt");
    }

    #[test]
    fn test_pack_skips_missing() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("present.txt");
        let test_tar = dir.path().join("skip.tar");
        fs::write(&present, "here").unwrap();

        pack(&test_tar, &[present, dir.path().join("absent.txt")]).unwrap();
        let names: Vec<_> = list(&test_tar).unwrap().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["present.txt"]);
    }

    #[test]
    fn test_unpack() {
        let dir = tempfile::tempdir().unwrap();
        let test_file = dir.path().join("test_unpack_file.txt");
        let test_tar = dir.path().join("test_unpack.tar");
        let output_dir = dir.path().join("test_unpack_output");

        fs::write(&test_file, "Unpack test content").unwrap();
        pack(&test_tar, &[&test_file]).unwrap();
        unpack(&test_tar, &output_dir).unwrap();

        let content = fs::read_to_string(output_dir.join("test_unpack_file.txt")).unwrap();
        assert_eq!(content, "Unpack test content");
    }

    #[test]
    fn test_list() {
        let dir = tempfile::tempdir().unwrap();
        let test_file1 = dir.path().join("test_list_file1.txt");
        let test_file2 = dir.path().join("test_list_file2.txt");
        let test_tar = dir.path().join("test_list.tar");

        fs::write(&test_file1, "Content 1").unwrap();
        fs::write(&test_file2, "Content 2 longer").unwrap();
        pack(&test_tar, &[&test_file1, &test_file2]).unwrap();

        let entries = list(&test_tar).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "test_list_file1.txt");
        assert_eq!(entries[0].size, 9);
        assert_eq!(entries[1].name, "test_list_file2.txt");
        assert_eq!(entries[1].size, 16);
    }

    #[test]
    fn test_compressed_suffixes() {
        for suffix in ["tar.gz", "tgz", "tar.bz2"] {
            let dir = tempfile::tempdir().unwrap();
            let test_file = dir.path().join("compressed.txt");
            let archive = dir.path().join(format!("test.{}", suffix));
            let output_dir = dir.path().join("out");
            fs::write(&test_file, "compressed content ".repeat(100)).unwrap();

            pack(&archive, &[&test_file]).unwrap();
            let magic = fs::read(&archive).unwrap();
            assert_ne!(Compression::detect(&magic), Compression::None);

            assert_eq!(list(&archive).unwrap()[0].size, 1900);
            unpack(&archive, &output_dir).unwrap();
            let content = fs::read_to_string(output_dir.join("compressed.txt")).unwrap();
            assert_eq!(content, "compressed content ".repeat(100));
        }
    }

    #[test]
    fn test_pack_directory() {
        let dir = tempfile::tempdir().unwrap();
        let tree = dir.path().join("tree");
        fs::create_dir_all(tree.join("sub")).unwrap();
        fs::write(tree.join("sub/b.txt"), "b").unwrap();
        fs::write(tree.join("a.txt"), "a").unwrap();
        let test_tar = dir.path().join("tree.tar");

        pack(&test_tar, &[&tree]).unwrap();
        let names: Vec<_> = list(&test_tar).unwrap().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["tree/", "tree/a.txt", "tree/sub/", "tree/sub/b.txt"]);
    }

    #[test]
    fn test_read_write_tar() {
        let entries = vec![
            TarEntry {
                entry: ArchiveEntry::directory("dir"),
                data: Vec::new(),
            },
            TarEntry {
                entry: ArchiveEntry::file("dir/hello.txt", 12).with_mtime(1_700_000_000),
                data: b"Hello, World".to_vec(),
            },
            TarEntry {
                entry: ArchiveEntry::symlink("dir/link", "hello.txt"),
                data: Vec::new(),
            },
        ];
        let tar_data = write_tar(&entries).unwrap();
        assert_eq!(tar_data.len() % 512, 0);
        assert_eq!(read_tar(&tar_data).unwrap(), entries);
    }
}
