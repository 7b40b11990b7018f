//! Moving entries between archives and the local filesystem.
//!
//! The write direction adds [`TarWriter::append_path`] and
//! [`TarWriter::append_tree`]. The read direction is [`Extractor`], which
//! materializes entries under a root directory and owns the bookkeeping that
//! spans entries: the table of extracted names used to resolve hard links,
//! links whose target has not been seen yet, and directories whose metadata
//! is applied once everything below them exists.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::mem;
use std::path::{Path, PathBuf};

use filetime::FileTime;
use glob::{MatchOptions, Pattern};
use walkdir::WalkDir;

use crate::entry::{ArchiveEntry, EntryType};
use crate::error::{Result, TarError};
use crate::options::{DuplicatePolicy, Options};
use crate::reader::TarReader;
use crate::sys::{self, OwnerCache};
use crate::writer::TarWriter;

/// Object kinds that need platform support to archive.
enum Special {
    Fifo,
    Char(u32, u32),
    Block(u32, u32),
    Socket,
    Unknown,
}

#[cfg(unix)]
fn special_kind(meta: &fs::Metadata) -> Special {
    use std::os::unix::fs::{FileTypeExt, MetadataExt};

    let ft = meta.file_type();
    if ft.is_fifo() {
        Special::Fifo
    } else if ft.is_char_device() {
        Special::Char(sys::major(meta.rdev()), sys::minor(meta.rdev()))
    } else if ft.is_block_device() {
        Special::Block(sys::major(meta.rdev()), sys::minor(meta.rdev()))
    } else if ft.is_socket() {
        Special::Socket
    } else {
        Special::Unknown
    }
}

#[cfg(not(unix))]
fn special_kind(_meta: &fs::Metadata) -> Special {
    Special::Unknown
}

/// Permission bits, uid and gid.
#[cfg(unix)]
fn stat_fields(meta: &fs::Metadata) -> (u32, u64, u64) {
    use std::os::unix::fs::MetadataExt;
    (meta.mode() & 0o7777, u64::from(meta.uid()), u64::from(meta.gid()))
}

#[cfg(not(unix))]
fn stat_fields(meta: &fs::Metadata) -> (u32, u64, u64) {
    let mode = match (meta.is_dir(), meta.permissions().readonly()) {
        (true, _) => 0o755,
        (false, true) => 0o444,
        (false, false) => 0o644,
    };
    (mode, 0, 0)
}

/// (device, inode) of a regular file with more than one link.
#[cfg(unix)]
fn link_key(meta: &fs::Metadata) -> Option<(u64, u64)> {
    use std::os::unix::fs::MetadataExt;
    (meta.is_file() && meta.nlink() > 1).then(|| (meta.dev(), meta.ino()))
}

#[cfg(not(unix))]
fn link_key(_meta: &fs::Metadata) -> Option<(u64, u64)> {
    None
}

#[cfg(unix)]
fn make_symlink(target: &str, path: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, path)
}

#[cfg(not(unix))]
fn make_symlink(_target: &str, _path: &Path) -> io::Result<()> {
    Err(io::Error::new(io::ErrorKind::Unsupported, "symlinks are not supported on this platform"))
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode & 0o7777))
}

#[cfg(not(unix))]
fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_readonly(mode & 0o200 == 0);
    fs::set_permissions(path, perms)
}

/// `/`-joined form of a relative path.
fn archive_name(rel: &Path) -> String {
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

impl<W: Write> TarWriter<W> {
    /// Archive one filesystem object under `save_name`.
    ///
    /// Symlinks are stored as links unless [`Options::follow_symlinks`] is
    /// set. A regular file whose inode was already archived by this writer
    /// becomes a hard link to the first name. Sockets are skipped.
    pub fn append_path(&mut self, real: impl AsRef<Path>, save_name: &str) -> Result<()> {
        let real = real.as_ref();
        let meta = if self.options().follow_symlinks {
            fs::metadata(real)?
        } else {
            fs::symlink_metadata(real)?
        };
        let ft = meta.file_type();

        let mut entry = if ft.is_dir() {
            ArchiveEntry::directory(save_name)
        } else if ft.is_symlink() {
            let target = fs::read_link(real)?;
            ArchiveEntry::symlink(save_name, target.to_string_lossy())
        } else if ft.is_file() {
            ArchiveEntry::file(save_name, meta.len())
        } else {
            match special_kind(&meta) {
                Special::Fifo => ArchiveEntry::fifo(save_name),
                Special::Char(major, minor) => ArchiveEntry::device(save_name, EntryType::Char, major, minor),
                Special::Block(major, minor) => ArchiveEntry::device(save_name, EntryType::Block, major, minor),
                Special::Socket => {
                    log::warn!("{}: socket ignored", real.display());
                    return Ok(());
                }
                Special::Unknown => {
                    log::warn!("{}: unsupported file type ignored", real.display());
                    return Ok(());
                }
            }
        };

        let (mode, uid, gid) = stat_fields(&meta);
        let mtime = FileTime::from_last_modification_time(&meta).unix_seconds().max(0) as u64;
        let uname = self.owners.user_name(uid);
        let gname = self.owners.group_name(gid);
        entry = entry.with_mode(mode).with_owner(uid, gid).with_owner_names(uname, gname).with_mtime(mtime);

        let key = link_key(&meta);
        if let Some(first) = key.and_then(|k| self.inodes.get(&k)) {
            let mut link = ArchiveEntry::hard_link(entry.name.clone(), first.clone());
            link.mode = entry.mode;
            link.uid = entry.uid;
            link.gid = entry.gid;
            link.uname = entry.uname.take();
            link.gname = entry.gname.take();
            link.mtime = entry.mtime;
            entry = link;
        }

        self.log_entry(&entry);
        if entry.is_file() {
            let file = File::open(real)?;
            self.write_entry(&entry, file)?;
        } else {
            self.write_entry(&entry, io::empty())?;
        }

        if let Some(key) = key {
            self.inodes.entry(key).or_insert_with(|| entry.name.clone());
        }
        Ok(())
    }

    /// Archive a directory tree, depth first, siblings in name order.
    ///
    /// Entries are named `save_dir/<relative path>`. With an empty `save_dir`
    /// the root itself is not archived and names are relative to it.
    pub fn append_tree(&mut self, real_dir: impl AsRef<Path>, save_dir: &str) -> Result<()> {
        let root = real_dir.as_ref();
        let save_dir = save_dir.trim_end_matches('/');
        let walker = WalkDir::new(root)
            .follow_links(self.options().follow_symlinks)
            .sort_by_file_name();

        for item in walker {
            let item = item.map_err(io::Error::from)?;
            let Ok(rel) = item.path().strip_prefix(root) else {
                continue;
            };
            let name = match (rel.as_os_str().is_empty(), save_dir.is_empty()) {
                (true, true) => continue,
                (true, false) => save_dir.to_string(),
                (false, true) => archive_name(rel),
                (false, false) => format!("{}/{}", save_dir, archive_name(rel)),
            };
            self.append_path(item.path(), &name)?;
        }
        Ok(())
    }

    fn log_entry(&self, entry: &ArchiveEntry) {
        if self.options().verbose {
            log::info!("{}", entry.long_listing());
        } else {
            log::debug!("a {}", entry.name);
        }
    }
}

/// Normalize an archive name to a relative `/`-separated path.
///
/// Leading `/` and `.` components are dropped; `..` anywhere is rejected.
/// Returns `None` for names that refer to the root itself.
pub fn sanitize_name(name: &str) -> Result<Option<String>> {
    let mut parts = Vec::new();
    for part in name.split('/') {
        match part {
            "" | "." => {}
            ".." => return Err(TarError::UnsafePath(name.to_string())),
            part => parts.push(part),
        }
    }
    if parts.is_empty() { Ok(None) } else { Ok(Some(parts.join("/"))) }
}

/// A hard link whose target had not been extracted when it was seen.
#[derive(Debug)]
struct PendingLink {
    name: Option<String>,
    display: String,
    target: String,
    path: PathBuf,
}

/// Materializes archive entries on disk.
#[derive(Debug)]
pub struct Extractor {
    options: Options,
    owners: OwnerCache,
    is_root: bool,
    /// Sanitized archive name to the path it was extracted to.
    extracted: HashMap<String, PathBuf>,
    pending_links: Vec<PendingLink>,
    directories: Vec<(PathBuf, ArchiveEntry)>,
}

impl Extractor {
    pub fn new(options: Options) -> Self {
        Self {
            options,
            owners: OwnerCache::new(),
            is_root: sys::euid() == 0,
            extracted: HashMap::new(),
            pending_links: Vec::new(),
            directories: Vec::new(),
        }
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Extract every entry under `root`.
    pub fn extract_all<R: Read>(&mut self, reader: &mut TarReader<R>, root: impl AsRef<Path>) -> Result<()> {
        let root = root.as_ref();
        fs::create_dir_all(root).map_err(|e| TarError::creating(root, e))?;
        while let Some(entry) = reader.next_entry()? {
            self.extract_under(reader, &entry, root)?;
        }
        self.finish()
    }

    /// Extract the entries whose names match a shell pattern; returns how
    /// many matched.
    ///
    /// `*` and `?` do not match `/`, and a leading `.` must be matched
    /// literally.
    pub fn extract_glob<R: Read>(
        &mut self,
        reader: &mut TarReader<R>,
        pattern: &str,
        root: impl AsRef<Path>,
    ) -> Result<usize> {
        let pattern = Pattern::new(pattern)?;
        let match_options = MatchOptions {
            case_sensitive: true,
            require_literal_separator: true,
            require_literal_leading_dot: true,
        };
        let root = root.as_ref();
        fs::create_dir_all(root).map_err(|e| TarError::creating(root, e))?;

        let mut matched = 0;
        while let Some(entry) = reader.next_entry()? {
            let name = entry.name.trim_end_matches('/');
            if pattern.matches_with(name, match_options) {
                self.extract_under(reader, &entry, root)?;
                matched += 1;
            }
        }
        self.finish()?;
        Ok(matched)
    }

    /// Materialize the reader's current entry at an explicit path.
    ///
    /// Hard links and directory metadata are completed by [`finish`](Self::finish).
    pub fn extract_entry<R: Read>(&mut self, reader: &mut TarReader<R>, path: impl AsRef<Path>) -> Result<()> {
        let entry = reader
            .current()
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "reader has no current entry"))?;
        let key = sanitize_name(&entry.name)?;
        self.materialize(reader, &entry, key, path.as_ref().to_path_buf())
    }

    fn extract_under<R: Read>(&mut self, reader: &mut TarReader<R>, entry: &ArchiveEntry, root: &Path) -> Result<()> {
        let Some(rel) = sanitize_name(&entry.name)? else {
            log::debug!("skipping entry for the extraction root");
            return Ok(());
        };
        let path = root.join(&rel);
        check_parents(root, &rel)?;
        self.materialize(reader, entry, Some(rel), path)
    }

    fn materialize<R: Read>(
        &mut self,
        reader: &mut TarReader<R>,
        entry: &ArchiveEntry,
        key: Option<String>,
        path: PathBuf,
    ) -> Result<()> {
        if self.options.verbose {
            log::info!("{}", entry.long_listing());
        } else {
            log::debug!("x {}", entry.name);
        }

        if !entry.is_dir() {
            if key.as_ref().is_some_and(|k| self.extracted.contains_key(k)) {
                match self.options.duplicates {
                    DuplicatePolicy::Overwrite => log::debug!("{}: replacing earlier entry", entry.name),
                    DuplicatePolicy::KeepFirst => {
                        log::info!("{}: keeping earlier entry", entry.name);
                        return Ok(());
                    }
                    DuplicatePolicy::Error => return Err(TarError::DuplicateEntry(entry.name.clone())),
                }
            } else if self.options.no_overwrite && fs::symlink_metadata(&path).is_ok() {
                return Err(TarError::AlreadyExists(path));
            }
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| TarError::creating(parent, e))?;
        }

        match entry.entry_type {
            EntryType::Directory => {
                if fs::symlink_metadata(&path).is_ok_and(|m| !m.is_dir()) {
                    fs::remove_file(&path).map_err(|e| TarError::creating(&path, e))?;
                }
                fs::create_dir_all(&path).map_err(|e| TarError::creating(&path, e))?;
                self.directories.push((path.clone(), entry.clone()));
                self.record(key, path);
                return Ok(());
            }
            EntryType::Link => {
                let target = entry.link_target.as_deref().unwrap_or_default();
                let target_key = sanitize_name(target)?.unwrap_or_default();
                match self.extracted.get(&target_key).cloned() {
                    Some(real) => self.hard_link(&real, &path)?,
                    None => {
                        log::debug!("{}: deferring link to {}", entry.name, target);
                        self.pending_links.push(PendingLink {
                            name: key,
                            display: entry.name.clone(),
                            target: target_key,
                            path,
                        });
                        return Ok(());
                    }
                }
                self.record(key, path);
                return Ok(());
            }
            EntryType::Symlink => {
                remove_existing(&path)?;
                let target = entry.link_target.as_deref().unwrap_or_default();
                make_symlink(target, &path).map_err(|e| TarError::creating(&path, e))?;
            }
            EntryType::Char | EntryType::Block => {
                remove_existing(&path)?;
                let block = entry.entry_type == EntryType::Block;
                sys::mknod(&path, block, entry.mode, entry.dev_major, entry.dev_minor)
                    .map_err(|e| TarError::creating(&path, e))?;
            }
            EntryType::Fifo => {
                remove_existing(&path)?;
                sys::mkfifo(&path, entry.mode).map_err(|e| TarError::creating(&path, e))?;
            }
            other => {
                if !other.is_file() {
                    log::warn!("{}: unknown type {:?}, extracting as a regular file", entry.name, other);
                }
                remove_existing(&path)?;
                self.write_file(reader, entry, &path)?;
            }
        }

        self.apply_metadata(&path, entry)?;
        self.record(key, path);
        Ok(())
    }

    /// Names that sanitize to nothing are never link targets.
    fn record(&mut self, key: Option<String>, path: PathBuf) {
        if let Some(key) = key {
            self.extracted.insert(key, path);
        }
    }

    fn write_file<R: Read>(&self, reader: &mut TarReader<R>, entry: &ArchiveEntry, path: &Path) -> Result<()> {
        // create_new so an existing symlink at the path is never written through.
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| TarError::creating(path, e))?;
        let mut buf = vec![0u8; 64 * 1024];
        let mut written = 0u64;
        loop {
            let n = reader.read_bounded(&mut buf)?;
            if n == 0 {
                break;
            }
            file.write_all(&buf[..n])?;
            written += n as u64;
        }
        if written != entry.size {
            return Err(TarError::SizeMismatch {
                name: entry.name.clone(),
                expected: entry.size,
                actual: written,
            });
        }
        Ok(())
    }

    fn hard_link(&self, target: &Path, path: &Path) -> Result<()> {
        remove_existing(path)?;
        fs::hard_link(target, path).map_err(|e| TarError::creating(path, e))
    }

    /// Ownership, then permission bits, then modification time.
    fn apply_metadata(&mut self, path: &Path, entry: &ArchiveEntry) -> Result<()> {
        if self.options.preserve_owner {
            let uid = entry
                .uname
                .as_deref()
                .and_then(|name| self.owners.user_id(name))
                .unwrap_or(entry.uid);
            let gid = entry
                .gname
                .as_deref()
                .and_then(|name| self.owners.group_id(name))
                .unwrap_or(entry.gid);
            if let Err(e) = sys::lchown(path, uid, gid) {
                if self.is_root {
                    log::warn!("{}: cannot change owner to {}:{}: {}", path.display(), uid, gid, e);
                } else {
                    log::debug!("{}: cannot change owner to {}:{}: {}", path.display(), uid, gid, e);
                }
            }
        }

        if !entry.is_symlink() {
            set_mode(path, entry.mode).map_err(|e| TarError::creating(path, e))?;
        }

        let mtime = FileTime::from_unix_time(i64::try_from(entry.mtime).unwrap_or(i64::MAX), 0);
        let result = if entry.is_symlink() {
            filetime::set_symlink_file_times(path, mtime, mtime)
        } else {
            filetime::set_file_times(path, mtime, mtime)
        };
        if let Err(e) = result {
            log::warn!("{}: cannot set modification time: {}", path.display(), e);
        }
        Ok(())
    }

    /// Resolve deferred hard links and apply directory metadata, deepest
    /// directory first. Clears all per-extraction state.
    ///
    /// Directory metadata is applied even when some links stay unresolved.
    pub fn finish(&mut self) -> Result<()> {
        let links = self.resolve_links();

        let mut directories = mem::take(&mut self.directories);
        directories.sort_by_key(|(path, _)| std::cmp::Reverse(path.components().count()));
        for (path, entry) in &directories {
            self.apply_metadata(path, entry)?;
        }

        self.extracted.clear();
        links
    }

    fn resolve_links(&mut self) -> Result<()> {
        let mut pending = mem::take(&mut self.pending_links);
        while !pending.is_empty() {
            let before = pending.len();
            let mut unresolved = Vec::new();
            for link in pending {
                match self.extracted.get(&link.target).cloned() {
                    Some(real) => {
                        self.hard_link(&real, &link.path)?;
                        self.record(link.name, link.path);
                    }
                    None => unresolved.push(link),
                }
            }
            if unresolved.len() == before {
                let first = &unresolved[0];
                return Err(TarError::UnresolvedHardlink {
                    name: first.display.clone(),
                    target: first.target.clone(),
                });
            }
            pending = unresolved;
        }
        Ok(())
    }
}

/// Fail if any directory between `root` and the entry at `rel` is a symlink,
/// which would let the entry land outside `root`.
fn check_parents(root: &Path, rel: &str) -> Result<()> {
    let mut dir = root.to_path_buf();
    let mut parts = rel.split('/').peekable();
    while let Some(part) = parts.next() {
        if parts.peek().is_none() {
            break;
        }
        dir.push(part);
        match fs::symlink_metadata(&dir) {
            Ok(meta) if meta.file_type().is_symlink() => {
                return Err(TarError::UnsafePath(rel.to_string()));
            }
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

/// Remove a non-directory at `path` so it can be recreated.
fn remove_existing(path: &Path) -> Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if !meta.is_dir() => fs::remove_file(path).map_err(|e| TarError::creating(path, e)),
        Ok(_) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Write an archive of everything below `root` (the root itself excluded).
pub fn create_archive_from_tree(root: impl AsRef<Path>, archive: impl Write, options: Options) -> Result<()> {
    let mut writer = TarWriter::with_options(archive, options);
    writer.append_tree(root, "")?;
    writer.finish()
}

/// Extract a whole archive stream under `root`.
pub fn extract_archive_to_tree(archive: impl Read, root: impl AsRef<Path>, options: Options) -> Result<()> {
    let mut reader = TarReader::with_options(archive, options.clone());
    Extractor::new(options).extract_all(&mut reader, root)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(entries: &[(ArchiveEntry, &[u8])]) -> Vec<u8> {
        let mut writer = TarWriter::new(Vec::new());
        for (entry, data) in entries {
            writer.append_data(entry, data).unwrap();
        }
        writer.into_inner().unwrap()
    }

    #[test]
    fn sanitized_names() {
        assert_eq!(sanitize_name("a/b.txt").unwrap().as_deref(), Some("a/b.txt"));
        assert_eq!(sanitize_name("/etc/passwd").unwrap().as_deref(), Some("etc/passwd"));
        assert_eq!(sanitize_name("./x/./y/").unwrap().as_deref(), Some("x/y"));
        assert_eq!(sanitize_name("./").unwrap(), None);
        assert!(matches!(sanitize_name("../evil"), Err(TarError::UnsafePath(_))));
        assert!(matches!(sanitize_name("a/../../evil"), Err(TarError::UnsafePath(_))));
    }

    #[test]
    fn dot_dot_entry_is_rejected() {
        let bytes = build(&[(ArchiveEntry::file("../escape", 1), b"x")]);
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("out");
        let err = extract_archive_to_tree(&bytes[..], &root, Options::default()).unwrap_err();
        assert!(matches!(err, TarError::UnsafePath(_)));
        assert!(!dir.path().join("escape").exists());
    }

    #[test]
    fn deferred_hard_link() {
        let bytes = build(&[
            (ArchiveEntry::hard_link("link", "data/file"), b""),
            (ArchiveEntry::file("data/file", 4), b"same"),
        ]);
        let dir = tempfile::tempdir().unwrap();
        extract_archive_to_tree(&bytes[..], dir.path(), Options::default()).unwrap();
        assert_eq!(fs::read(dir.path().join("link")).unwrap(), b"same");
    }

    #[test]
    fn unresolved_hard_link() {
        let bytes = build(&[(ArchiveEntry::hard_link("link", "missing"), b"")]);
        let dir = tempfile::tempdir().unwrap();
        let err = extract_archive_to_tree(&bytes[..], dir.path(), Options::default()).unwrap_err();
        assert!(matches!(err, TarError::UnresolvedHardlink { ref target, .. } if target == "missing"));
    }

    #[test]
    fn duplicate_policies() {
        let bytes = build(&[
            (ArchiveEntry::file("f", 5), b"first"),
            (ArchiveEntry::file("f", 6), b"second"),
        ]);

        let dir = tempfile::tempdir().unwrap();
        extract_archive_to_tree(&bytes[..], dir.path(), Options::default()).unwrap();
        assert_eq!(fs::read(dir.path().join("f")).unwrap(), b"second");

        let dir = tempfile::tempdir().unwrap();
        let options = Options::default().duplicates(DuplicatePolicy::KeepFirst);
        extract_archive_to_tree(&bytes[..], dir.path(), options).unwrap();
        assert_eq!(fs::read(dir.path().join("f")).unwrap(), b"first");

        let dir = tempfile::tempdir().unwrap();
        let options = Options::default().duplicates(DuplicatePolicy::Error);
        let err = extract_archive_to_tree(&bytes[..], dir.path(), options).unwrap_err();
        assert!(matches!(err, TarError::DuplicateEntry(ref name) if name == "f"));
    }

    #[test]
    fn no_overwrite_refuses_existing() {
        let bytes = build(&[(ArchiveEntry::file("f", 3), b"new")]);
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("f"), b"old").unwrap();

        let options = Options::default().no_overwrite(true);
        let err = extract_archive_to_tree(&bytes[..], dir.path(), options).unwrap_err();
        assert!(matches!(err, TarError::AlreadyExists(_)));
        assert_eq!(fs::read(dir.path().join("f")).unwrap(), b"old");

        extract_archive_to_tree(&bytes[..], dir.path(), Options::default()).unwrap();
        assert_eq!(fs::read(dir.path().join("f")).unwrap(), b"new");
    }

    #[cfg(unix)]
    #[test]
    fn existing_symlink_is_replaced_not_followed() {
        let dir = tempfile::tempdir().unwrap();
        let outside = dir.path().join("outside");
        fs::write(&outside, b"keep").unwrap();
        let root = dir.path().join("root");
        fs::create_dir(&root).unwrap();
        std::os::unix::fs::symlink(&outside, root.join("f")).unwrap();

        let bytes = build(&[(ArchiveEntry::file("f", 3), b"new")]);
        extract_archive_to_tree(&bytes[..], &root, Options::default()).unwrap();
        assert_eq!(fs::read(&outside).unwrap(), b"keep");
        assert!(fs::symlink_metadata(root.join("f")).unwrap().is_file());
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_parent_is_not_followed() {
        let dir = tempfile::tempdir().unwrap();
        let outside = dir.path().join("outside");
        fs::create_dir(&outside).unwrap();
        let root = dir.path().join("root");

        let bytes = build(&[
            (ArchiveEntry::symlink("d", outside.to_string_lossy()), b""),
            (ArchiveEntry::file("d/pwned", 4), b"evil"),
        ]);
        let err = extract_archive_to_tree(&bytes[..], &root, Options::default()).unwrap_err();
        assert!(matches!(err, TarError::UnsafePath(ref name) if name == "d/pwned"));
        assert!(!outside.join("pwned").exists());
        assert!(fs::symlink_metadata(root.join("d")).unwrap().file_type().is_symlink());
    }

    #[cfg(unix)]
    #[test]
    fn directory_metadata_survives_unresolved_link() {
        let bytes = build(&[
            (ArchiveEntry::directory("d").with_mtime(1_000_000), b""),
            (ArchiveEntry::file("d/f", 1).with_mtime(2_000_000), b"x"),
            (ArchiveEntry::hard_link("l", "missing"), b""),
        ]);
        let dir = tempfile::tempdir().unwrap();
        let err = extract_archive_to_tree(&bytes[..], dir.path(), Options::default()).unwrap_err();
        assert!(matches!(err, TarError::UnresolvedHardlink { ref name, .. } if name == "l"));

        let meta = fs::metadata(dir.path().join("d")).unwrap();
        assert_eq!(FileTime::from_last_modification_time(&meta).unix_seconds(), 1_000_000);
    }

    #[cfg(unix)]
    #[test]
    fn read_only_directory_gets_mode_last() {
        use std::os::unix::fs::PermissionsExt;

        let bytes = build(&[
            (ArchiveEntry::directory("ro").with_mode(0o555).with_mtime(1_000_000), b""),
            (ArchiveEntry::file("ro/inner", 2).with_mtime(2_000_000), b"hi"),
        ]);
        let dir = tempfile::tempdir().unwrap();
        extract_archive_to_tree(&bytes[..], dir.path(), Options::default()).unwrap();

        let meta = fs::metadata(dir.path().join("ro")).unwrap();
        assert_eq!(meta.permissions().mode() & 0o7777, 0o555);
        assert_eq!(FileTime::from_last_modification_time(&meta).unix_seconds(), 1_000_000);
        assert_eq!(fs::read(dir.path().join("ro/inner")).unwrap(), b"hi");

        fs::set_permissions(dir.path().join("ro"), fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[test]
    fn glob_selects_entries() {
        let bytes = build(&[
            (ArchiveEntry::file("src/main.rs", 1), b"m"),
            (ArchiveEntry::file("src/sub/lib.rs", 1), b"l"),
            (ArchiveEntry::file("src/.hidden.rs", 1), b"h"),
            (ArchiveEntry::file("README", 1), b"r"),
        ]);
        let dir = tempfile::tempdir().unwrap();
        let mut reader = TarReader::new(&bytes[..]);
        let matched = Extractor::new(Options::default())
            .extract_glob(&mut reader, "src/*.rs", dir.path())
            .unwrap();
        assert_eq!(matched, 1);
        assert!(dir.path().join("src/main.rs").exists());
        assert!(!dir.path().join("src/sub/lib.rs").exists());
        assert!(!dir.path().join("src/.hidden.rs").exists());
        assert!(!dir.path().join("README").exists());
    }

    #[test]
    fn extract_entry_at_explicit_path() {
        let bytes = build(&[(ArchiveEntry::file("a.txt", 5), b"hello")]);
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("renamed.txt");

        let mut reader = TarReader::new(&bytes[..]);
        reader.next_entry().unwrap().unwrap();
        let mut extractor = Extractor::new(Options::default());
        extractor.extract_entry(&mut reader, &target).unwrap();
        extractor.finish().unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"hello");
    }

    #[test]
    fn root_entry_is_not_a_link_target() {
        let bytes = build(&[
            (ArchiveEntry::directory("./"), b""),
            (ArchiveEntry::hard_link("l", "./"), b""),
        ]);
        let dir = tempfile::tempdir().unwrap();
        let mut reader = TarReader::new(&bytes[..]);
        let mut extractor = Extractor::new(Options::default());

        reader.next_entry().unwrap().unwrap();
        extractor.extract_entry(&mut reader, dir.path().join("top")).unwrap();
        reader.next_entry().unwrap().unwrap();
        extractor.extract_entry(&mut reader, dir.path().join("l")).unwrap();

        let err = extractor.finish().unwrap_err();
        assert!(matches!(err, TarError::UnresolvedHardlink { ref target, .. } if target.is_empty()));
        assert!(!dir.path().join("l").exists());
    }

    #[cfg(unix)]
    #[test]
    fn append_path_detects_hard_links() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a"), b"shared").unwrap();
        fs::hard_link(dir.path().join("a"), dir.path().join("b")).unwrap();

        let mut writer = TarWriter::new(Vec::new());
        writer.append_tree(dir.path(), "").unwrap();
        let bytes = writer.into_inner().unwrap();

        let mut reader = TarReader::new(&bytes[..]);
        let a = reader.next_entry().unwrap().unwrap();
        assert!(a.is_file());
        let b = reader.next_entry().unwrap().unwrap();
        assert!(b.is_hard_link());
        assert_eq!(b.link_target.as_deref(), Some("a"));
    }
}
