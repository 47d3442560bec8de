//! Named POSIX shared-memory objects.
//!
//! Both shared aggregates live in `shm_open` objects mapped with
//! `MAP_SHARED`. Creation is exclusive: a leftover object from a crashed
//! run is reported, never silently reused — the lifecycle manager decides
//! whether to unlink stale names first.

use std::ffi::CString;
use std::io;
use std::os::raw::c_void;
use std::ptr::NonNull;

use thiserror::Error;

/// Failure to create, attach, or remove a shared resource.
#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("shared object {name} already exists (stale run?)")]
    AlreadyExists { name: String },
    #[error("shared object {name} not found")]
    NotFound { name: String },
    #[error("shared object {name} has an inconsistent size or header")]
    Corrupted { name: String },
    #[error("shared object name {0:?} is not a valid path")]
    InvalidName(String),
    #[error("{op} failed: {source}")]
    Os {
        op: &'static str,
        #[source]
        source: io::Error,
    },
}

impl ResourceError {
    fn os(op: &'static str) -> Self {
        ResourceError::Os {
            op,
            source: io::Error::last_os_error(),
        }
    }
}

/// One mapped shared-memory region. Unmapped on drop; the backing object
/// persists until [`unlink`] is called.
#[derive(Debug)]
pub struct ShmRegion {
    ptr: NonNull<c_void>,
    len: usize,
}

unsafe impl Send for ShmRegion {}
unsafe impl Sync for ShmRegion {}

impl ShmRegion {
    /// Base pointer of the mapping.
    #[must_use]
    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr().cast()
    }

    /// Mapped length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Drop for ShmRegion {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.ptr.as_ptr(), self.len);
        }
    }
}

fn c_name(name: &str) -> Result<CString, ResourceError> {
    CString::new(name).map_err(|_| ResourceError::InvalidName(name.to_string()))
}

/// Create a zeroed named object of exactly `len` bytes and map it
/// read-write.
///
/// Fails with [`ResourceError::AlreadyExists`] if the name is taken.
pub fn create(name: &str, len: usize) -> Result<ShmRegion, ResourceError> {
    let cname = c_name(name)?;
    let fd = unsafe {
        libc::shm_open(
            cname.as_ptr(),
            libc::O_CREAT | libc::O_EXCL | libc::O_RDWR,
            0o666,
        )
    };
    if fd < 0 {
        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EEXIST) {
            return Err(ResourceError::AlreadyExists {
                name: name.to_string(),
            });
        }
        return Err(ResourceError::Os {
            op: "shm_open",
            source: err,
        });
    }

    if unsafe { libc::ftruncate(fd, len as libc::off_t) } < 0 {
        let err = ResourceError::os("ftruncate");
        unsafe { libc::close(fd) };
        let _ = unlink(name);
        return Err(err);
    }

    let region = map(fd, len, true);
    unsafe { libc::close(fd) };
    region.map_err(|err| {
        let _ = unlink(name);
        err
    })
}

/// Attach an existing named object, mapping its full current size.
pub fn open(name: &str, write: bool) -> Result<ShmRegion, ResourceError> {
    let cname = c_name(name)?;
    let flags = if write { libc::O_RDWR } else { libc::O_RDONLY };
    let fd = unsafe { libc::shm_open(cname.as_ptr(), flags, 0) };
    if fd < 0 {
        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::ENOENT) {
            return Err(ResourceError::NotFound {
                name: name.to_string(),
            });
        }
        return Err(ResourceError::Os {
            op: "shm_open",
            source: err,
        });
    }

    let mut stat = std::mem::MaybeUninit::<libc::stat>::uninit();
    if unsafe { libc::fstat(fd, stat.as_mut_ptr()) } < 0 {
        let err = ResourceError::os("fstat");
        unsafe { libc::close(fd) };
        return Err(err);
    }
    let len = unsafe { stat.assume_init() }.st_size as usize;
    if len == 0 {
        unsafe { libc::close(fd) };
        return Err(ResourceError::Corrupted {
            name: name.to_string(),
        });
    }

    let region = map(fd, len, write);
    unsafe { libc::close(fd) };
    region
}

/// Remove the name. Idempotent: a missing object is not an error.
pub fn unlink(name: &str) -> Result<(), ResourceError> {
    let cname = c_name(name)?;
    if unsafe { libc::shm_unlink(cname.as_ptr()) } < 0 {
        let err = io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::ENOENT) {
            return Err(ResourceError::Os {
                op: "shm_unlink",
                source: err,
            });
        }
    }
    Ok(())
}

fn map(fd: libc::c_int, len: usize, write: bool) -> Result<ShmRegion, ResourceError> {
    let prot = if write {
        libc::PROT_READ | libc::PROT_WRITE
    } else {
        libc::PROT_READ
    };
    let ptr = unsafe { libc::mmap(std::ptr::null_mut(), len, prot, libc::MAP_SHARED, fd, 0) };
    if ptr == libc::MAP_FAILED {
        return Err(ResourceError::os("mmap"));
    }
    Ok(ShmRegion {
        ptr: NonNull::new(ptr).expect("mmap success is never null"),
        len,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unique_name(tag: &str) -> String {
        format!("/champs_test_{}_{}", tag, std::process::id())
    }

    #[test]
    fn test_create_open_unlink_round_trip() {
        let name = unique_name("rt");
        let _ = unlink(&name);

        let region = create(&name, 64).unwrap();
        unsafe { region.as_ptr().cast::<u32>().write_volatile(0xfeed) };

        let other = open(&name, false).unwrap();
        assert_eq!(other.len(), 64);
        assert_eq!(unsafe { other.as_ptr().cast::<u32>().read_volatile() }, 0xfeed);

        unlink(&name).unwrap();
        // Unlink is idempotent.
        unlink(&name).unwrap();
    }

    #[test]
    fn test_create_refuses_existing_object() {
        let name = unique_name("dup");
        let _ = unlink(&name);

        let _region = create(&name, 32).unwrap();
        match create(&name, 32) {
            Err(ResourceError::AlreadyExists { .. }) => {}
            other => panic!("expected AlreadyExists, got {other:?}"),
        }
        unlink(&name).unwrap();
    }

    #[test]
    fn test_open_missing_object() {
        let name = unique_name("missing");
        let _ = unlink(&name);
        match open(&name, false) {
            Err(ResourceError::NotFound { .. }) => {}
            other => panic!("expected NotFound, got {other:?}"),
        }
    }
}
