use crate::block::BlockRead;
use crate::builder::{build_static, CompressionMethod};
use crate::dict::{DictError, StaticDict};
use std::collections::BTreeMap;

mod hybrid;
mod static_file;

/// In-memory block source for fixtures assembled on the fly.
pub(crate) struct MemBlock(pub Vec<u8>);

impl BlockRead for MemBlock {
    fn size(&self) -> u64 {
        self.0.len() as u64
    }

    fn read(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize, DictError> {
        if offset >= self.0.len() as u64 {
            return Ok(0);
        }
        let start = offset as usize;
        let n = buf.len().min(self.0.len() - start);
        buf[..n].copy_from_slice(&self.0[start..start + n]);
        Ok(n)
    }
}

pub(crate) fn props(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Build a static dictionary image in memory.
pub(crate) fn build_bytes(
    entries: &[(&str, &str)],
    properties: &[(&str, &str)],
    compression: CompressionMethod,
) -> Vec<u8> {
    let entries = entries
        .iter()
        .map(|(w, s)| (w.to_string(), s.to_string()))
        .collect();
    let mut out = Vec::new();
    build_static(entries, props(properties), compression, &mut out).unwrap();
    out
}

pub(crate) fn open_bytes(bytes: Vec<u8>, check_integrity: bool) -> Result<StaticDict, DictError> {
    StaticDict::from_block(Box::new(MemBlock(bytes)), "mem.dic".to_owned(), check_integrity)
}
