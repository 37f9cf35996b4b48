//! Byte-addressable, read-only views over dictionary files.
//!
//! The static engine only ever asks for `read(offset, len)` and `size()`,
//! so the same search code runs over a plain file and over the
//! random-access gzip variant ("dictzip"). Plain files are memory-mapped;
//! dictzip files inflate one chunk at a time and keep the most recent
//! chunk cached.

mod dictzip;

pub use dictzip::{write_dictzip, DictzipFile, DEFAULT_CHUNK_LEN};

use std::fs::File;
use std::path::Path;

use memmap2::Mmap;

use crate::dict::DictError;

/// A read-only random-access byte source.
pub trait BlockRead {
    /// Total uncompressed size in bytes.
    fn size(&self) -> u64;

    /// Copy bytes starting at `offset` into `buf`, returning how many were
    /// copied. A short count means the source ended; failures of the
    /// underlying I/O or decompression are errors.
    fn read(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize, DictError>;

    /// How many chunk inflations this source has performed. Always zero
    /// for uncompressed sources; useful as a cache-effectiveness probe.
    fn inflations(&self) -> u64 {
        0
    }
}

/// A memory-mapped plain file.
pub struct PlainFile {
    mmap: Mmap,
}

impl PlainFile {
    pub fn open(path: &Path) -> Result<Self, DictError> {
        let file = File::open(path)?;
        // SAFETY: the file is opened read-only and the mapping is immutable.
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(Self { mmap })
    }
}

impl BlockRead for PlainFile {
    fn size(&self) -> u64 {
        self.mmap.len() as u64
    }

    fn read(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize, DictError> {
        let len = self.mmap.len() as u64;
        if offset >= len {
            return Ok(0);
        }
        let available = (len - offset) as usize;
        let n = buf.len().min(available);
        let start = offset as usize;
        buf[..n].copy_from_slice(&self.mmap[start..start + n]);
        Ok(n)
    }
}

/// Open `path` as a block source, choosing the dictzip reader for a `.dz`
/// suffix.
pub fn open_block_file(path: &Path) -> Result<Box<dyn BlockRead>, DictError> {
    let is_dictzip = path
        .to_str()
        .is_some_and(|p| p.ends_with(".dz"));
    if is_dictzip {
        Ok(Box::new(DictzipFile::open(path)?))
    } else {
        Ok(Box::new(PlainFile::open(path)?))
    }
}
