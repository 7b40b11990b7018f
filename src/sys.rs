//! Thin wrappers over the libc calls the filesystem bridge needs.
//!
//! Everything here is Unix-only; other targets get stubs that report
//! [`io::ErrorKind::Unsupported`] or no names.

use std::collections::HashMap;
use std::io;
use std::path::Path;

/// Caches user and group lookups for the lifetime of one archive operation.
#[derive(Debug, Default)]
pub struct OwnerCache {
    users: HashMap<u64, Option<String>>,
    groups: HashMap<u64, Option<String>>,
    uids: HashMap<String, Option<u64>>,
    gids: HashMap<String, Option<u64>>,
}

impl OwnerCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user_name(&mut self, uid: u64) -> Option<String> {
        self.users.entry(uid).or_insert_with(|| user_name(uid)).clone()
    }

    pub fn group_name(&mut self, gid: u64) -> Option<String> {
        self.groups.entry(gid).or_insert_with(|| group_name(gid)).clone()
    }

    pub fn user_id(&mut self, name: &str) -> Option<u64> {
        if let Some(uid) = self.uids.get(name) {
            return *uid;
        }
        let uid = user_id(name);
        self.uids.insert(name.to_string(), uid);
        uid
    }

    pub fn group_id(&mut self, name: &str) -> Option<u64> {
        if let Some(gid) = self.gids.get(name) {
            return *gid;
        }
        let gid = group_id(name);
        self.gids.insert(name.to_string(), gid);
        gid
    }
}

#[cfg(unix)]
mod imp {
    use std::ffi::{CStr, CString};
    use std::io;
    use std::mem::MaybeUninit;
    use std::os::unix::ffi::OsStrExt;
    use std::path::Path;

    fn cstring(path: &Path) -> io::Result<CString> {
        CString::new(path.as_os_str().as_bytes())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "path contains a NUL byte"))
    }

    fn cvt(ret: libc::c_int) -> io::Result<()> {
        if ret == -1 { Err(io::Error::last_os_error()) } else { Ok(()) }
    }

    /// Run a reentrant passwd/group lookup, growing the buffer on `ERANGE`.
    fn lookup<T>(mut call: impl FnMut(*mut T, &mut [libc::c_char], *mut *mut T) -> libc::c_int) -> Option<(T, Vec<libc::c_char>)> {
        let mut buf: Vec<libc::c_char> = vec![0; 1024];
        loop {
            let mut record = MaybeUninit::<T>::uninit();
            let mut result: *mut T = std::ptr::null_mut();
            let ret = call(record.as_mut_ptr(), buf.as_mut_slice(), &mut result as *mut *mut T);
            if ret == libc::ERANGE && buf.len() < 1 << 20 {
                let grown = buf.len() * 2;
                buf.resize(grown, 0);
                continue;
            }
            if ret != 0 || result.is_null() {
                return None;
            }
            // SAFETY: a zero return with a non-null result means the record was filled in.
            return Some((unsafe { record.assume_init() }, buf));
        }
    }

    fn owned(ptr: *const libc::c_char) -> Option<String> {
        if ptr.is_null() {
            return None;
        }
        // SAFETY: the libc record points into the buffer that is still alive.
        Some(unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned())
    }

    pub fn user_name(uid: u64) -> Option<String> {
        let uid = libc::uid_t::try_from(uid).ok()?;
        let (pw, _buf) = lookup::<libc::passwd>(|rec, buf, res| unsafe {
            libc::getpwuid_r(uid, rec, buf.as_mut_ptr(), buf.len(), res)
        })?;
        owned(pw.pw_name)
    }

    pub fn group_name(gid: u64) -> Option<String> {
        let gid = libc::gid_t::try_from(gid).ok()?;
        let (gr, _buf) = lookup::<libc::group>(|rec, buf, res| unsafe {
            libc::getgrgid_r(gid, rec, buf.as_mut_ptr(), buf.len(), res)
        })?;
        owned(gr.gr_name)
    }

    pub fn user_id(name: &str) -> Option<u64> {
        let name = CString::new(name).ok()?;
        let (pw, _buf) = lookup::<libc::passwd>(|rec, buf, res| unsafe {
            libc::getpwnam_r(name.as_ptr(), rec, buf.as_mut_ptr(), buf.len(), res)
        })?;
        Some(u64::from(pw.pw_uid))
    }

    pub fn group_id(name: &str) -> Option<u64> {
        let name = CString::new(name).ok()?;
        let (gr, _buf) = lookup::<libc::group>(|rec, buf, res| unsafe {
            libc::getgrnam_r(name.as_ptr(), rec, buf.as_mut_ptr(), buf.len(), res)
        })?;
        Some(u64::from(gr.gr_gid))
    }

    pub fn lchown(path: &Path, uid: u64, gid: u64) -> io::Result<()> {
        let invalid = || io::Error::new(io::ErrorKind::InvalidInput, "owner id out of range");
        let uid = libc::uid_t::try_from(uid).map_err(|_| invalid())?;
        let gid = libc::gid_t::try_from(gid).map_err(|_| invalid())?;
        let path = cstring(path)?;
        cvt(unsafe { libc::lchown(path.as_ptr(), uid, gid) })
    }

    pub fn mknod(path: &Path, kind: libc::mode_t, perm: u32, major: u32, minor: u32) -> io::Result<()> {
        let path = cstring(path)?;
        let mode = kind | (perm & 0o7777) as libc::mode_t;
        cvt(unsafe { libc::mknod(path.as_ptr(), mode, makedev(major, minor)) })
    }

    pub fn mkfifo(path: &Path, perm: u32) -> io::Result<()> {
        let path = cstring(path)?;
        cvt(unsafe { libc::mkfifo(path.as_ptr(), (perm & 0o7777) as libc::mode_t) })
    }

    #[allow(unused_unsafe)]
    pub fn major(dev: u64) -> u32 {
        unsafe { libc::major(dev as libc::dev_t) as u32 }
    }

    #[allow(unused_unsafe)]
    pub fn minor(dev: u64) -> u32 {
        unsafe { libc::minor(dev as libc::dev_t) as u32 }
    }

    #[allow(unused_unsafe)]
    pub fn makedev(major: u32, minor: u32) -> libc::dev_t {
        unsafe { libc::makedev(major as _, minor as _) }
    }

    pub fn euid() -> u32 {
        unsafe { libc::geteuid() }
    }

    pub const S_IFCHR: libc::mode_t = libc::S_IFCHR;
    pub const S_IFBLK: libc::mode_t = libc::S_IFBLK;
}

#[cfg(not(unix))]
mod imp {
    use std::io;
    use std::path::Path;

    fn unsupported() -> io::Error {
        io::Error::new(io::ErrorKind::Unsupported, "not supported on this platform")
    }

    pub fn user_name(_uid: u64) -> Option<String> {
        None
    }

    pub fn group_name(_gid: u64) -> Option<String> {
        None
    }

    pub fn user_id(_name: &str) -> Option<u64> {
        None
    }

    pub fn group_id(_name: &str) -> Option<u64> {
        None
    }

    pub fn lchown(_path: &Path, _uid: u64, _gid: u64) -> io::Result<()> {
        Err(unsupported())
    }

    pub fn mknod(_path: &Path, _kind: u32, _perm: u32, _major: u32, _minor: u32) -> io::Result<()> {
        Err(unsupported())
    }

    pub fn mkfifo(_path: &Path, _perm: u32) -> io::Result<()> {
        Err(unsupported())
    }

    pub fn major(_dev: u64) -> u32 {
        0
    }

    pub fn minor(_dev: u64) -> u32 {
        0
    }

    pub fn makedev(_major: u32, _minor: u32) -> u64 {
        0
    }

    pub fn euid() -> u32 {
        u32::MAX
    }

    pub const S_IFCHR: u32 = 0o020000;
    pub const S_IFBLK: u32 = 0o060000;
}

pub use imp::{euid, group_id, group_name, major, makedev, minor, user_id, user_name};

/// Change ownership without following a final symlink.
pub fn lchown(path: &Path, uid: u64, gid: u64) -> io::Result<()> {
    imp::lchown(path, uid, gid)
}

/// Create a character (`block == false`) or block device node.
pub fn mknod(path: &Path, block: bool, perm: u32, major: u32, minor: u32) -> io::Result<()> {
    let kind = if block { imp::S_IFBLK } else { imp::S_IFCHR };
    imp::mknod(path, kind, perm, major, minor)
}

pub fn mkfifo(path: &Path, perm: u32) -> io::Result<()> {
    imp::mkfifo(path, perm)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn device_numbers_round_trip() {
        let dev = makedev(8, 17) as u64;
        assert_eq!(major(dev), 8);
        assert_eq!(minor(dev), 17);
    }

    #[test]
    fn root_lookups() {
        let mut cache = OwnerCache::new();
        assert_eq!(cache.user_name(0).as_deref(), Some("root"));
        assert_eq!(cache.user_id("root"), Some(0));
        assert_eq!(cache.group_id("root"), Some(0));
        assert_eq!(cache.user_id("no-such-user-hopefully"), None);
        // Second lookup is served from the cache.
        assert_eq!(cache.user_id("no-such-user-hopefully"), None);
    }

    #[test]
    fn fifo_creation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipe");
        mkfifo(&path, 0o644).unwrap();
        use std::os::unix::fs::FileTypeExt;
        assert!(std::fs::symlink_metadata(&path).unwrap().file_type().is_fifo());
        assert!(mkfifo(&path, 0o644).is_err());
    }
}
