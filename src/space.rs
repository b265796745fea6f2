//! Free space queries
//!
//! The write phase asks how much space is left before every file so it can
//! stop cleanly instead of producing a cascade of failed writes.

use std::ffi::CString;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

/// Source of free space figures for the target volume
pub trait SpaceProbe: Send {
    /// Bytes available to an unprivileged writer on the volume holding `path`
    fn available(&self, path: &Path) -> io::Result<u64>;
}

/// Queries the operating system with `statvfs`
#[derive(Debug, Clone, Copy, Default)]
pub struct StatvfsProbe;

impl SpaceProbe for StatvfsProbe {
    fn available(&self, path: &Path) -> io::Result<u64> {
        available_space(path)
    }
}

impl<F> SpaceProbe for F
where
    F: Fn(&Path) -> io::Result<u64> + Send,
{
    fn available(&self, path: &Path) -> io::Result<u64> {
        self(path)
    }
}

/// Bytes available to unprivileged users on the filesystem containing `path`
pub fn available_space(path: &Path) -> io::Result<u64> {
    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

    let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
    let ret = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
    if ret != 0 {
        return Err(io::Error::last_os_error());
    }

    Ok((stat.f_bavail as u64).saturating_mul(stat.f_frsize as u64))
}
