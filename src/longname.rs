//! Names and link targets that do not fit the classic 100-byte fields.
//!
//! On write, GNU format emits a `././@LongLink` entry of type `L` (name) or
//! `K` (link target) whose data is the full NUL-terminated string, right
//! before the real entry. On read, those payloads, and PAX `x` records, are
//! held here until the next real entry arrives and then applied to it.

use crate::entry::{ArchiveEntry, EntryType};
use crate::error::{Result, TarError};
use crate::header::{HeaderBlock, NAME_LEN};
use crate::options::{Format, LongNameMode, Options};

/// Name stored in the header of a GNU long-name entry.
pub const LONG_LINK_NAME: &str = "././@LongLink";

/// Fields a PAX extended header can override.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PaxOverrides {
    pub path: Option<String>,
    pub linkpath: Option<String>,
    pub size: Option<u64>,
    pub uid: Option<u64>,
    pub gid: Option<u64>,
    pub mtime: Option<u64>,
    pub uname: Option<String>,
    pub gname: Option<String>,
}

impl PaxOverrides {
    /// Parse `"<len> <key>=<value>\n"` records.
    pub fn parse(data: &[u8]) -> Result<Self> {
        const BAD: TarError = TarError::MalformedLongName("malformed pax record");

        let mut out = PaxOverrides::default();
        let mut rest = data;
        while !rest.is_empty() {
            // Trailing NUL padding some writers leave behind.
            if rest.iter().all(|&b| b == 0) {
                break;
            }
            let space = rest.iter().position(|&b| b == b' ').ok_or(BAD)?;
            let len: usize = std::str::from_utf8(&rest[..space])
                .ok()
                .and_then(|s| s.parse().ok())
                .ok_or(BAD)?;
            if len <= space + 1 || len > rest.len() || rest[len - 1] != b'\n' {
                return Err(BAD);
            }
            let record = &rest[space + 1..len - 1];
            let eq = record.iter().position(|&b| b == b'=').ok_or(BAD)?;
            let key = String::from_utf8_lossy(&record[..eq]);
            let value = String::from_utf8_lossy(&record[eq + 1..]).into_owned();
            let number = || value.split('.').next().and_then(|s| s.parse::<u64>().ok());
            match key.as_ref() {
                "path" => out.path = Some(value.clone()),
                "linkpath" => out.linkpath = Some(value.clone()),
                "size" => out.size = number(),
                "uid" => out.uid = number(),
                "gid" => out.gid = number(),
                "mtime" => out.mtime = number(),
                "uname" => out.uname = Some(value.clone()),
                "gname" => out.gname = Some(value.clone()),
                other => log::debug!("ignoring pax key {}", other),
            }
            rest = &rest[len..];
        }
        Ok(out)
    }

    fn apply(self, entry: &mut ArchiveEntry) {
        if let Some(path) = self.path {
            entry.name = path;
        }
        if let Some(linkpath) = self.linkpath {
            entry.link_target = Some(linkpath);
        }
        if let Some(size) = self.size {
            entry.size = size;
        }
        if let Some(uid) = self.uid {
            entry.uid = uid;
        }
        if let Some(gid) = self.gid {
            entry.gid = gid;
        }
        if let Some(mtime) = self.mtime {
            entry.mtime = mtime;
        }
        if self.uname.is_some() {
            entry.uname = self.uname;
        }
        if self.gname.is_some() {
            entry.gname = self.gname;
        }
    }
}

/// Pending overrides collected from auxiliary entries on the read path.
#[derive(Debug)]
pub struct LongNameResolver {
    mode: LongNameMode,
    limit: u64,
    name: Option<String>,
    link: Option<String>,
    pax: Option<PaxOverrides>,
}

impl LongNameResolver {
    pub fn new(options: &Options) -> Self {
        Self {
            mode: options.long_names,
            limit: options.max_long_name,
            name: None,
            link: None,
            pax: None,
        }
    }

    /// Reject payloads above the configured limit before reading them.
    pub fn check_size(&self, size: u64) -> Result<()> {
        if size > self.limit {
            return Err(TarError::LongNameTooLarge { size, limit: self.limit });
        }
        Ok(())
    }

    pub fn is_pending(&self) -> bool {
        self.name.is_some() || self.link.is_some() || self.pax.is_some()
    }

    /// Record the payload of a GNU `L` or `K` entry.
    pub fn accept(&mut self, kind: EntryType, payload: &[u8]) -> Result<()> {
        let end = payload.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
        let value = String::from_utf8_lossy(&payload[..end]).into_owned();
        let duplicate = match kind {
            EntryType::GnuLongName => self.name.replace(value).is_some(),
            EntryType::GnuLongLink => self.link.replace(value).is_some(),
            other => {
                debug_assert!(false, "not a long-name entry: {:?}", other);
                false
            }
        };
        if duplicate {
            self.violation("two consecutive long name entries")?;
        }
        Ok(())
    }

    /// Record a PAX extended header.
    pub fn accept_pax(&mut self, payload: &[u8]) -> Result<()> {
        let overrides = PaxOverrides::parse(payload)?;
        if self.pax.replace(overrides).is_some() {
            self.violation("two consecutive pax headers")?;
        }
        Ok(())
    }

    /// Apply and clear pending overrides. PAX wins over GNU, GNU over the header.
    pub fn apply(&mut self, entry: &mut ArchiveEntry) {
        if let Some(name) = self.name.take() {
            entry.name = name;
        }
        if let Some(link) = self.link.take() {
            entry.link_target = Some(link);
        }
        if let Some(pax) = self.pax.take() {
            pax.apply(entry);
        }
    }

    /// Called at end of archive; pending overrides there are orphans.
    pub fn finish(&mut self) -> Result<()> {
        if self.is_pending() {
            self.name = None;
            self.link = None;
            self.pax = None;
            self.violation("long name entry not followed by a real entry")?;
        }
        Ok(())
    }

    fn violation(&self, what: &'static str) -> Result<()> {
        match self.mode {
            LongNameMode::Strict => Err(TarError::MalformedLongName(what)),
            LongNameMode::Lenient => {
                log::warn!("{}; continuing", what);
                Ok(())
            }
        }
    }
}

/// Auxiliary entries (header plus payload) that must precede `entry`.
///
/// Only GNU format uses them; ustar headers carry long names in the prefix.
pub fn auxiliary_entries(entry: &ArchiveEntry, format: Format) -> Result<Vec<(HeaderBlock, Vec<u8>)>> {
    let mut out = Vec::new();
    if format != Format::Gnu {
        return Ok(out);
    }
    if let Some(target) = entry.link_target.as_deref().filter(|t| t.len() > NAME_LEN) {
        out.push(auxiliary(EntryType::GnuLongLink, target)?);
    }
    if entry.name.len() > NAME_LEN {
        out.push(auxiliary(EntryType::GnuLongName, &entry.name)?);
    }
    Ok(out)
}

fn auxiliary(kind: EntryType, value: &str) -> Result<(HeaderBlock, Vec<u8>)> {
    let mut payload = Vec::with_capacity(value.len() + 1);
    payload.extend_from_slice(value.as_bytes());
    payload.push(0);

    let mut header = ArchiveEntry::file(LONG_LINK_NAME, payload.len() as u64);
    header.entry_type = kind;
    let block = HeaderBlock::encode(&header, Format::Gnu)?;
    Ok((block, payload))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver(mode: LongNameMode) -> LongNameResolver {
        LongNameResolver::new(&Options::default().long_names(mode))
    }

    #[test]
    fn name_at_field_width_needs_no_auxiliary() {
        let entry = ArchiveEntry::file("a".repeat(NAME_LEN), 0);
        assert!(auxiliary_entries(&entry, Format::Gnu).unwrap().is_empty());

        let entry = ArchiveEntry::file("a".repeat(NAME_LEN + 1), 0);
        let aux = auxiliary_entries(&entry, Format::Gnu).unwrap();
        assert_eq!(aux.len(), 1);
        let (block, payload) = &aux[0];
        assert_eq!(block.entry_type(), EntryType::GnuLongName);
        assert_eq!(payload.len(), NAME_LEN + 2);
        assert_eq!(payload.last(), Some(&0));

        let decoded = block.decode(&Options::default()).unwrap().unwrap();
        assert_eq!(decoded.name, LONG_LINK_NAME);
        assert_eq!(decoded.size, payload.len() as u64);
    }

    #[test]
    fn long_link_and_name_both_emitted() {
        let entry = ArchiveEntry::symlink("n".repeat(150), "t".repeat(150));
        let aux = auxiliary_entries(&entry, Format::Gnu).unwrap();
        let kinds: Vec<_> = aux.iter().map(|(b, _)| b.entry_type()).collect();
        assert_eq!(kinds, vec![EntryType::GnuLongLink, EntryType::GnuLongName]);
        assert!(auxiliary_entries(&entry, Format::Ustar).unwrap().is_empty());
    }

    #[test]
    fn resolver_applies_and_clears() {
        let mut r = resolver(LongNameMode::Strict);
        r.accept(EntryType::GnuLongName, b"very/long/name\0\0").unwrap();
        r.accept(EntryType::GnuLongLink, b"very/long/target\0").unwrap();
        assert!(r.is_pending());

        let mut entry = ArchiveEntry::hard_link("very/lo", "very/lo");
        r.apply(&mut entry);
        assert_eq!(entry.name, "very/long/name");
        assert_eq!(entry.link_target.as_deref(), Some("very/long/target"));
        assert!(!r.is_pending());
        r.finish().unwrap();
    }

    #[test]
    fn strict_rejects_consecutive_long_names() {
        let mut r = resolver(LongNameMode::Strict);
        r.accept(EntryType::GnuLongName, b"first\0").unwrap();
        assert!(matches!(
            r.accept(EntryType::GnuLongName, b"second\0"),
            Err(TarError::MalformedLongName(_))
        ));
    }

    #[test]
    fn lenient_keeps_last_override() {
        let mut r = resolver(LongNameMode::Lenient);
        r.accept(EntryType::GnuLongName, b"first\0").unwrap();
        r.accept(EntryType::GnuLongName, b"second\0").unwrap();
        let mut entry = ArchiveEntry::file("x", 0);
        r.apply(&mut entry);
        assert_eq!(entry.name, "second");
    }

    #[test]
    fn orphan_at_end() {
        let mut strict = resolver(LongNameMode::Strict);
        strict.accept(EntryType::GnuLongName, b"orphan\0").unwrap();
        assert!(matches!(strict.finish(), Err(TarError::MalformedLongName(_))));

        let mut lenient = resolver(LongNameMode::Lenient);
        lenient.accept(EntryType::GnuLongName, b"orphan\0").unwrap();
        lenient.finish().unwrap();
        assert!(!lenient.is_pending());
    }

    #[test]
    fn size_limit() {
        let r = LongNameResolver::new(&Options::default().max_long_name(16));
        assert!(r.check_size(16).is_ok());
        assert!(matches!(r.check_size(17), Err(TarError::LongNameTooLarge { size: 17, limit: 16 })));
    }

    #[test]
    fn pax_records() {
        let data = b"28 path=some/very/long/path\n22 mtime=1700000000.5\n12 uid=1000\n15 size=999999\n";
        let pax = PaxOverrides::parse(data).unwrap();
        assert_eq!(pax.path.as_deref(), Some("some/very/long/path"));
        assert_eq!(pax.mtime, Some(1_700_000_000));
        assert_eq!(pax.uid, Some(1000));
        assert_eq!(pax.size, Some(999_999));

        let mut r = resolver(LongNameMode::Strict);
        r.accept_pax(data).unwrap();
        r.accept(EntryType::GnuLongName, b"gnu/name\0").unwrap();
        let mut entry = ArchiveEntry::file("short", 1);
        r.apply(&mut entry);
        assert_eq!(entry.name, "some/very/long/path");
        assert_eq!(entry.size, 999_999);

        assert!(PaxOverrides::parse(b"99 path=x\n").is_err());
        assert!(PaxOverrides::parse(b"garbage").is_err());
    }
}
