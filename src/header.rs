//! Encoding and decoding of the 512-byte tar header block.
//!
//! # Field layout
//!
//! | Offset | Size | Field    |
//! |--------|------|----------|
//! | 0      | 100  | name     |
//! | 100    | 8    | mode     |
//! | 108    | 8    | uid      |
//! | 116    | 8    | gid      |
//! | 124    | 12   | size     |
//! | 136    | 12   | mtime    |
//! | 148    | 8    | checksum |
//! | 156    | 1    | typeflag |
//! | 157    | 100  | linkname |
//! | 257    | 6    | magic    |
//! | 263    | 2    | version  |
//! | 265    | 32   | uname    |
//! | 297    | 32   | gname    |
//! | 329    | 8    | devmajor |
//! | 337    | 8    | devminor |
//! | 345    | 155  | prefix   |
//!
//! Numeric fields hold zero-padded octal ASCII. Values too large for that
//! are stored big-endian in binary with the high bit of the first byte set.
//!
//! ```
//! use tar_stream::{ArchiveEntry, Format, HeaderBlock, Options};
//!
//! let entry = ArchiveEntry::file("hello.txt", 12);
//! let block = HeaderBlock::encode(&entry, Format::Gnu).unwrap();
//! assert!(block.verify_checksum().is_ok());
//!
//! let decoded = block.decode(&Options::default()).unwrap().unwrap();
//! assert_eq!(decoded.name, "hello.txt");
//! assert_eq!(decoded.size, 12);
//! ```

use std::fmt;
use std::ops::Range;

use crate::block::BLOCK_SIZE;
use crate::entry::{ArchiveEntry, EntryType};
use crate::error::{Result, TarError};
use crate::options::{Format, Options};

/// Width of the classic name and linkname fields.
pub const NAME_LEN: usize = 100;
/// Width of the ustar prefix field.
pub const PREFIX_LEN: usize = 155;

pub const USTAR_MAGIC: &[u8; 6] = b"ustar\0";
pub const USTAR_VERSION: &[u8; 2] = b"00";
pub const GNU_MAGIC: &[u8; 6] = b"ustar ";
pub const GNU_VERSION: &[u8; 2] = b" \0";

const NAME: Range<usize> = 0..100;
const MODE: Range<usize> = 100..108;
const UID: Range<usize> = 108..116;
const GID: Range<usize> = 116..124;
const SIZE: Range<usize> = 124..136;
const MTIME: Range<usize> = 136..148;
const CHECKSUM: Range<usize> = 148..156;
const TYPEFLAG: usize = 156;
const LINKNAME: Range<usize> = 157..257;
const MAGIC: Range<usize> = 257..263;
const VERSION: Range<usize> = 263..265;
const UNAME: Range<usize> = 265..297;
const GNAME: Range<usize> = 297..329;
const DEVMAJOR: Range<usize> = 329..337;
const DEVMINOR: Range<usize> = 337..345;
const PREFIX: Range<usize> = 345..500;

/// How a numeric value is laid out in its fixed-width field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericEncoding {
    /// Zero-padded octal digits followed by a NUL.
    Octal,
    /// GNU base-256: big-endian binary, high bit of the first byte set.
    Binary,
}

impl NumericEncoding {
    /// Choose the encoding for `value` in a field of `width` bytes.
    ///
    /// Returns `None` when the value does not fit either way.
    pub fn for_value(value: u64, width: usize) -> Option<Self> {
        let octal_bits = (width - 1) * 3;
        if octal_bits >= 64 || value >> octal_bits == 0 {
            return Some(NumericEncoding::Octal);
        }
        let binary_bits = width * 8 - 1;
        if binary_bits >= 64 || value >> binary_bits == 0 {
            Some(NumericEncoding::Binary)
        } else {
            None
        }
    }
}

/// The raw 512-byte header of one entry.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct HeaderBlock {
    bytes: [u8; BLOCK_SIZE],
}

impl HeaderBlock {
    pub fn from_bytes(bytes: [u8; BLOCK_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; BLOCK_SIZE] {
        &self.bytes
    }

    /// An all-zero block marks the end of the archive.
    pub fn is_zero(&self) -> bool {
        self.bytes.iter().all(|&b| b == 0)
    }

    pub fn entry_type(&self) -> EntryType {
        EntryType::from_byte(self.bytes[TYPEFLAG])
    }

    pub fn is_ustar(&self) -> bool {
        self.bytes[MAGIC] == *USTAR_MAGIC
    }

    pub fn is_gnu(&self) -> bool {
        self.bytes[MAGIC] == *GNU_MAGIC
    }

    /// Sum of all bytes with the checksum field counted as spaces.
    pub fn compute_checksum(&self) -> u32 {
        calc_checksum(&self.bytes)
    }

    /// The same sum over signed bytes, as some historic writers computed it.
    pub fn compute_signed_checksum(&self) -> i64 {
        self.bytes
            .iter()
            .enumerate()
            .map(|(i, &b)| if CHECKSUM.contains(&i) { i64::from(b' ') } else { i64::from(b as i8) })
            .sum()
    }

    pub fn stored_checksum(&self) -> Result<u32> {
        let value = read_octal(&self.bytes[CHECKSUM], "checksum")?;
        u32::try_from(value).map_err(|_| TarError::InvalidNumeric { field: "checksum" })
    }

    pub fn verify_checksum(&self) -> Result<()> {
        let stored = self.stored_checksum()?;
        let computed = self.compute_checksum();
        if stored == computed || i64::from(stored) == self.compute_signed_checksum() {
            Ok(())
        } else {
            Err(TarError::ChecksumMismatch { stored, computed })
        }
    }

    /// Decode the block into an entry.
    ///
    /// Returns `Ok(None)` for an all-zero block. The checksum is checked before
    /// any field is interpreted.
    pub fn decode(&self, options: &Options) -> Result<Option<ArchiveEntry>> {
        if self.is_zero() {
            return Ok(None);
        }
        if !options.ignore_crc {
            self.verify_checksum()?;
        }

        let ustar = self.is_ustar();
        let gnu = self.is_gnu();
        if options.check_magic && !ustar && !gnu {
            return Err(TarError::BadMagic);
        }
        if options.check_version {
            let version = &self.bytes[VERSION];
            let matches = (ustar && version == USTAR_VERSION) || (gnu && version == GNU_VERSION);
            if !matches {
                return Err(TarError::BadVersion);
            }
        }

        let mut name = read_str(&self.bytes, NAME);
        if ustar {
            let prefix = read_str(&self.bytes, PREFIX);
            if !prefix.is_empty() {
                name = format!("{}/{}", prefix, name);
            }
        }
        let link = read_str(&self.bytes, LINKNAME);
        let extended = ustar || gnu;

        Ok(Some(ArchiveEntry {
            name,
            entry_type: self.entry_type(),
            size: read_numeric(&self.bytes[SIZE], "size")?,
            mode: u32::try_from(read_numeric(&self.bytes[MODE], "mode")?)
                .map_err(|_| TarError::InvalidNumeric { field: "mode" })?,
            uid: read_numeric(&self.bytes[UID], "uid")?,
            gid: read_numeric(&self.bytes[GID], "gid")?,
            uname: if extended { non_empty(read_str(&self.bytes, UNAME)) } else { None },
            gname: if extended { non_empty(read_str(&self.bytes, GNAME)) } else { None },
            mtime: read_mtime(&self.bytes[MTIME])?,
            link_target: non_empty(link),
            dev_major: if extended { read_device(&self.bytes[DEVMAJOR], "devmajor")? } else { 0 },
            dev_minor: if extended { read_device(&self.bytes[DEVMINOR], "devminor")? } else { 0 },
        }))
    }

    /// Encode an entry; the checksum is filled in last.
    ///
    /// In GNU format names and link targets longer than [`NAME_LEN`] are
    /// truncated here and carried in full by a preceding long-name entry.
    /// In ustar format long names are split into prefix and name.
    pub fn encode(entry: &ArchiveEntry, format: Format) -> Result<Self> {
        let mut data = [0u8; BLOCK_SIZE];

        match format {
            Format::Gnu => {
                write_str(&mut data, NAME, &entry.name);
                data[MAGIC].copy_from_slice(GNU_MAGIC);
                data[VERSION].copy_from_slice(GNU_VERSION);
            }
            Format::Ustar => {
                let (prefix, name) = split_ustar_path(&entry.name)?;
                write_str(&mut data, NAME, name);
                write_str(&mut data, PREFIX, prefix);
                data[MAGIC].copy_from_slice(USTAR_MAGIC);
                data[VERSION].copy_from_slice(USTAR_VERSION);
            }
        }

        write_numeric(&mut data[MODE], u64::from(entry.mode), "mode")?;
        write_numeric(&mut data[UID], entry.uid, "uid")?;
        write_numeric(&mut data[GID], entry.gid, "gid")?;
        write_numeric(&mut data[SIZE], entry.stored_size(), "size")?;
        write_numeric(&mut data[MTIME], entry.mtime, "mtime")?;
        data[TYPEFLAG] = entry.entry_type.to_byte();

        if let Some(target) = &entry.link_target {
            if format == Format::Ustar && target.len() > NAME_LEN {
                return Err(TarError::NameTooLong(target.clone()));
            }
            write_str(&mut data, LINKNAME, target);
        }
        if let Some(uname) = &entry.uname {
            write_str(&mut data, UNAME, uname);
        }
        if let Some(gname) = &entry.gname {
            write_str(&mut data, GNAME, gname);
        }
        if matches!(entry.entry_type, EntryType::Char | EntryType::Block) {
            write_numeric(&mut data[DEVMAJOR], u64::from(entry.dev_major), "devmajor")?;
            write_numeric(&mut data[DEVMINOR], u64::from(entry.dev_minor), "devminor")?;
        }

        let checksum = calc_checksum(&data);
        let checksum_str = format!("{:06o}\0 ", checksum);
        data[CHECKSUM].copy_from_slice(checksum_str.as_bytes());
        Ok(Self { bytes: data })
    }
}

impl From<[u8; BLOCK_SIZE]> for HeaderBlock {
    fn from(bytes: [u8; BLOCK_SIZE]) -> Self {
        Self::from_bytes(bytes)
    }
}

impl fmt::Debug for HeaderBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeaderBlock")
            .field("name", &read_str(&self.bytes, NAME))
            .field("entry_type", &self.entry_type())
            .field("size", &read_numeric(&self.bytes[SIZE], "size").ok())
            .field("is_gnu", &self.is_gnu())
            .field("is_ustar", &self.is_ustar())
            .finish()
    }
}

/// Split a path for the ustar prefix/name fields at a `/`.
///
/// The name part is kept as long as possible; fails when no split fits.
pub fn split_ustar_path(path: &str) -> Result<(&str, &str)> {
    if path.len() <= NAME_LEN {
        return Ok(("", path));
    }
    let bytes = path.as_bytes();
    // A trailing slash on a directory belongs to the name part.
    let search_end = if path.ends_with('/') { path.len() - 1 } else { path.len() };
    for (i, _) in bytes[..search_end].iter().enumerate().filter(|&(_, &b)| b == b'/') {
        let (prefix, name) = (&path[..i], &path[i + 1..]);
        if prefix.len() <= PREFIX_LEN && name.len() <= NAME_LEN && !name.is_empty() {
            return Ok((prefix, name));
        }
    }
    Err(TarError::NameTooLong(path.to_string()))
}

/// Calc checksum of the header bytes
pub fn calc_checksum(data: &[u8; BLOCK_SIZE]) -> u32 {
    data.iter()
        .enumerate()
        .map(|(i, &b)| if CHECKSUM.contains(&i) { u32::from(b' ') } else { u32::from(b) })
        .sum()
}

fn read_str(data: &[u8], range: Range<usize>) -> String {
    let field = &data[range];
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}

fn write_str(data: &mut [u8], range: Range<usize>, value: &str) {
    let field = &mut data[range];
    let bytes = value.as_bytes();
    let len = bytes.len().min(field.len());
    field[..len].copy_from_slice(&bytes[..len]);
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() { None } else { Some(s) }
}

/// Parse an octal field: optional leading spaces, digits, then NUL or space.
fn read_octal(field: &[u8], name: &'static str) -> Result<u64> {
    let start = field.iter().position(|&b| b != b' ').unwrap_or(field.len());
    let end = field[start..]
        .iter()
        .position(|&b| b == b' ' || b == 0)
        .map_or(field.len(), |i| start + i);

    let mut value: u64 = 0;
    for &b in &field[start..end] {
        if !(b'0'..=b'7').contains(&b) {
            return Err(TarError::InvalidNumeric { field: name });
        }
        value = value
            .checked_mul(8)
            .and_then(|v| v.checked_add(u64::from(b - b'0')))
            .ok_or(TarError::InvalidNumeric { field: name })?;
    }
    Ok(value)
}

/// Parse a numeric field in either octal or base-256 form.
pub(crate) fn read_numeric(field: &[u8], name: &'static str) -> Result<u64> {
    match field.first() {
        Some(&first) if first & 0x80 != 0 => {
            // 0xff introduces a negative two's complement value.
            if first == 0xff {
                return Err(TarError::InvalidNumeric { field: name });
            }
            let mut value = u64::from(first & 0x7f);
            for &b in &field[1..] {
                if value >> 56 != 0 {
                    return Err(TarError::InvalidNumeric { field: name });
                }
                value = (value << 8) | u64::from(b);
            }
            Ok(value)
        }
        Some(_) => read_octal(field, name),
        None => Ok(0),
    }
}

/// Modification times before the epoch (base-256 with a leading 0xff) are
/// clamped to 0.
fn read_mtime(field: &[u8]) -> Result<u64> {
    if field.first() != Some(&0xff) {
        return read_numeric(field, "mtime");
    }
    let mut value: i64 = -1;
    for &b in &field[1..] {
        if value < i64::MIN >> 8 {
            return Err(TarError::InvalidNumeric { field: "mtime" });
        }
        value = (value << 8) | i64::from(b);
    }
    log::warn!("modification time {} is before the epoch, using 0", value);
    Ok(0)
}

fn read_device(field: &[u8], name: &'static str) -> Result<u32> {
    u32::try_from(read_numeric(field, name)?).map_err(|_| TarError::InvalidNumeric { field: name })
}

fn write_numeric(field: &mut [u8], value: u64, name: &'static str) -> Result<()> {
    let width = field.len();
    match NumericEncoding::for_value(value, width) {
        Some(NumericEncoding::Octal) => {
            let digits = format!("{:0width$o}", value, width = width - 1);
            field[..width - 1].copy_from_slice(digits.as_bytes());
            field[width - 1] = 0;
        }
        Some(NumericEncoding::Binary) => {
            field.fill(0);
            for (i, byte) in field.iter_mut().rev().take(8).enumerate() {
                *byte = (value >> (8 * i)) as u8;
            }
            field[0] |= 0x80;
        }
        None => return Err(TarError::FieldOverflow { field: name, value }),
    }
    Ok(())
}
