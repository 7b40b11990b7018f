//! The logical archive entry, independent of its on-disk encoding.

use std::fmt;

use chrono::DateTime;

use crate::block::padded_size;

/// Kind of filesystem object an entry describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryType {
    /// Regular file (type '0' or NUL).
    Regular,
    /// Hard link to an earlier entry (type '1').
    Link,
    /// Symbolic link (type '2').
    Symlink,
    /// Character device (type '3').
    Char,
    /// Block device (type '4').
    Block,
    /// Directory (type '5').
    Directory,
    /// FIFO (type '6').
    Fifo,
    /// Contiguous file (type '7'), treated like a regular file.
    Contiguous,
    /// GNU long name for the next entry (type 'L').
    GnuLongName,
    /// GNU long link target for the next entry (type 'K').
    GnuLongLink,
    /// PAX extended header for the next entry (type 'x').
    PaxHeader,
    /// PAX global extended header (type 'g').
    PaxGlobal,
    /// Anything else.
    Other(u8),
}

impl EntryType {
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            b'0' | b'\0' => EntryType::Regular,
            b'1' => EntryType::Link,
            b'2' => EntryType::Symlink,
            b'3' => EntryType::Char,
            b'4' => EntryType::Block,
            b'5' => EntryType::Directory,
            b'6' => EntryType::Fifo,
            b'7' => EntryType::Contiguous,
            b'L' => EntryType::GnuLongName,
            b'K' => EntryType::GnuLongLink,
            b'x' => EntryType::PaxHeader,
            b'g' => EntryType::PaxGlobal,
            other => EntryType::Other(other),
        }
    }

    pub fn to_byte(self) -> u8 {
        match self {
            EntryType::Regular => b'0',
            EntryType::Link => b'1',
            EntryType::Symlink => b'2',
            EntryType::Char => b'3',
            EntryType::Block => b'4',
            EntryType::Directory => b'5',
            EntryType::Fifo => b'6',
            EntryType::Contiguous => b'7',
            EntryType::GnuLongName => b'L',
            EntryType::GnuLongLink => b'K',
            EntryType::PaxHeader => b'x',
            EntryType::PaxGlobal => b'g',
            EntryType::Other(b) => b,
        }
    }

    pub fn is_file(self) -> bool {
        matches!(self, EntryType::Regular | EntryType::Contiguous)
    }

    /// Whether this is format plumbing rather than a filesystem object.
    pub fn is_auxiliary(self) -> bool {
        matches!(
            self,
            EntryType::GnuLongName | EntryType::GnuLongLink | EntryType::PaxHeader | EntryType::PaxGlobal
        )
    }

    /// Whether the header's size field is followed by that many data bytes.
    ///
    /// Links, devices and FIFOs never carry data whatever their size field says.
    pub fn has_data_region(self) -> bool {
        !matches!(
            self,
            EntryType::Link | EntryType::Symlink | EntryType::Char | EntryType::Block | EntryType::Fifo
        )
    }

    fn mode_char(self) -> char {
        match self {
            EntryType::Directory => 'd',
            EntryType::Symlink => 'l',
            EntryType::Char => 'c',
            EntryType::Block => 'b',
            EntryType::Fifo => 'p',
            _ => '-',
        }
    }
}

/// One logical filesystem object in an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub name: String,
    pub entry_type: EntryType,
    /// Length of the data region; zero for everything but regular files.
    pub size: u64,
    /// Permission bits, including setuid/setgid/sticky.
    pub mode: u32,
    pub uid: u64,
    pub gid: u64,
    pub uname: Option<String>,
    pub gname: Option<String>,
    /// Modification time in seconds since the Unix epoch.
    pub mtime: u64,
    /// Target of a symlink or hard link.
    pub link_target: Option<String>,
    pub dev_major: u32,
    pub dev_minor: u32,
}

impl ArchiveEntry {
    fn with_type(name: impl Into<String>, entry_type: EntryType, mode: u32) -> Self {
        Self {
            name: name.into(),
            entry_type,
            size: 0,
            mode,
            uid: 0,
            gid: 0,
            uname: None,
            gname: None,
            mtime: 0,
            link_target: None,
            dev_major: 0,
            dev_minor: 0,
        }
    }

    /// A regular file with `size` bytes of content and mode 0644.
    pub fn file(name: impl Into<String>, size: u64) -> Self {
        let mut entry = Self::with_type(name, EntryType::Regular, 0o644);
        entry.size = size;
        entry
    }

    /// A directory with mode 0755. A trailing `/` is added if missing.
    pub fn directory(name: impl Into<String>) -> Self {
        let mut name = name.into();
        if !name.ends_with('/') {
            name.push('/');
        }
        Self::with_type(name, EntryType::Directory, 0o755)
    }

    pub fn symlink(name: impl Into<String>, target: impl Into<String>) -> Self {
        let mut entry = Self::with_type(name, EntryType::Symlink, 0o777);
        entry.link_target = Some(target.into());
        entry
    }

    pub fn hard_link(name: impl Into<String>, target: impl Into<String>) -> Self {
        let mut entry = Self::with_type(name, EntryType::Link, 0o644);
        entry.link_target = Some(target.into());
        entry
    }

    pub fn fifo(name: impl Into<String>) -> Self {
        Self::with_type(name, EntryType::Fifo, 0o644)
    }

    /// A character or block device node.
    pub fn device(name: impl Into<String>, entry_type: EntryType, major: u32, minor: u32) -> Self {
        debug_assert!(matches!(entry_type, EntryType::Char | EntryType::Block));
        let mut entry = Self::with_type(name, entry_type, 0o600);
        entry.dev_major = major;
        entry.dev_minor = minor;
        entry
    }

    pub fn with_mode(mut self, mode: u32) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_mtime(mut self, mtime: u64) -> Self {
        self.mtime = mtime;
        self
    }

    pub fn with_owner(mut self, uid: u64, gid: u64) -> Self {
        self.uid = uid;
        self.gid = gid;
        self
    }

    pub fn with_owner_names(mut self, uname: Option<String>, gname: Option<String>) -> Self {
        self.uname = uname;
        self.gname = gname;
        self
    }

    pub fn is_file(&self) -> bool {
        self.entry_type.is_file()
    }

    pub fn is_dir(&self) -> bool {
        self.entry_type == EntryType::Directory
    }

    pub fn is_symlink(&self) -> bool {
        self.entry_type == EntryType::Symlink
    }

    pub fn is_hard_link(&self) -> bool {
        self.entry_type == EntryType::Link
    }

    /// Bytes of data that follow this entry's header, before padding.
    pub fn data_len(&self) -> u64 {
        if self.entry_type.has_data_region() { self.size } else { 0 }
    }

    /// Size written to the header; directories are always stored with zero.
    pub fn stored_size(&self) -> u64 {
        if self.is_dir() { 0 } else { self.data_len() }
    }

    /// Bytes of data region including padding to the block boundary.
    pub fn padded_size(&self) -> u64 {
        padded_size(self.data_len()).unwrap_or(u64::MAX)
    }

    /// Permission string in `ls -l` form, e.g. `-rwsr-xr-x`.
    pub fn mode_string(&self) -> String {
        let mode = self.mode;
        let mut s = String::with_capacity(10);
        s.push(self.entry_type.mode_char());
        let triads = [(0o400, 0o200, 0o100, 0o4000, 's'), (0o40, 0o20, 0o10, 0o2000, 's'), (0o4, 0o2, 0o1, 0o1000, 't')];
        for (r, w, x, special, special_char) in triads {
            s.push(if mode & r != 0 { 'r' } else { '-' });
            s.push(if mode & w != 0 { 'w' } else { '-' });
            s.push(match (mode & x != 0, mode & special != 0) {
                (true, true) => special_char,
                (false, true) => special_char.to_ascii_uppercase(),
                (true, false) => 'x',
                (false, false) => '-',
            });
        }
        s
    }

    /// One `ls -l` style line describing the entry.
    pub fn long_listing(&self) -> String {
        let user = self.uname.clone().unwrap_or_else(|| self.uid.to_string());
        let group = self.gname.clone().unwrap_or_else(|| self.gid.to_string());
        let size = match self.entry_type {
            EntryType::Char | EntryType::Block => format!("{},{}", self.dev_major, self.dev_minor),
            _ => self.size.to_string(),
        };
        let when = i64::try_from(self.mtime)
            .ok()
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "????-??-?? ??:??".to_string());

        let mut line = format!("{} {}/{} {:>9} {} {}", self.mode_string(), user, group, size, when, self.name);
        if let Some(target) = &self.link_target {
            match self.entry_type {
                EntryType::Symlink => line.push_str(&format!(" -> {}", target)),
                EntryType::Link => line.push_str(&format!(" link to {}", target)),
                _ => {}
            }
        }
        line
    }
}

impl fmt::Display for ArchiveEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.long_listing())
    }
}
