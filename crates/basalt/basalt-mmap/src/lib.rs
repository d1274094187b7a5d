//! Read/write shared mappings for the basalt channel.
//!
//! A [`SharedMapping`] is the byte region both peers see. It can come from a
//! regular file (two processes on one host), from a memory device at a fixed
//! physical address (a guest talking to its emulator), or from an anonymous
//! mapping (two threads in one process). Dropping the mapping unmaps it.

use memmap2::{MmapMut, MmapOptions};
use std::{
    fs::{File, OpenOptions},
    io,
    path::Path,
};

pub struct SharedMapping {
    file: Option<File>,
    mmap: MmapMut,
}

fn reject_empty(size_bytes: u64) -> io::Result<()> {
    if size_bytes == 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "shared mapping must not be empty",
        ));
    }
    Ok(())
}

impl SharedMapping {
    /// Create a new file of `size_bytes` zero bytes and map it read-write
    pub fn create_rw<P: AsRef<Path>>(path: P, size_bytes: u64) -> io::Result<Self> {
        reject_empty(size_bytes)?;
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        file.set_len(size_bytes)?;

        let mmap = unsafe { MmapMut::map_mut(&file)? };
        Ok(Self {
            file: Some(file),
            mmap,
        })
    }

    /// Open an existing file and map it to read and write
    pub fn open_rw<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        reject_empty(file.metadata()?.len())?;

        let mmap = unsafe { MmapMut::map_mut(&file)? };

        Ok(Self {
            file: Some(file),
            mmap,
        })
    }

    /// Map `size_bytes` of a memory device starting at `phys_addr`.
    ///
    /// The device is opened with `O_SYNC` so that accesses through the mapping
    /// are not cached on the way to the other side. On Linux this is how a
    /// guest reaches a region its emulator exposes at a fixed physical
    /// address through `/dev/mem`.
    #[cfg(unix)]
    pub fn map_physical<P: AsRef<Path>>(
        device: P,
        phys_addr: u64,
        size_bytes: u64,
    ) -> io::Result<Self> {
        use std::os::unix::fs::OpenOptionsExt;

        reject_empty(size_bytes)?;
        let len = usize::try_from(size_bytes)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "mapping too large"))?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_SYNC)
            .open(device)?;

        let mmap = unsafe {
            MmapOptions::new()
                .offset(phys_addr)
                .len(len)
                .map_mut(&file)?
        };

        Ok(Self {
            file: Some(file),
            mmap,
        })
    }

    /// Zero-filled mapping that is not backed by any file.
    pub fn anonymous(size_bytes: usize) -> io::Result<Self> {
        reject_empty(size_bytes as u64)?;
        let mmap = MmapOptions::new().len(size_bytes).map_anon()?;
        Ok(Self { file: None, mmap })
    }

    /// Flush outstanding writes to the backing file or device.
    pub fn flush(&self) -> io::Result<()> {
        match self.file {
            Some(_) => self.mmap.flush(),
            None => Ok(()),
        }
    }

    /// Return raw pointer to start of the mapped region
    #[inline]
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.mmap.as_mut_ptr()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }

    /// Whether the mapping is backed by a file or device.
    pub fn is_file_backed(&self) -> bool {
        self.file.is_some()
    }
}

impl std::fmt::Debug for SharedMapping {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedMapping")
            .field("len", &self.len())
            .field("file_backed", &self.is_file_backed())
            .finish()
    }
}
