//! Random-access gzip ("dictzip") container.
//!
//! A dictzip file is an ordinary GZIP member whose FEXTRA field carries an
//! `RA` subfield: the uncompressed chunk length, the chunk count, and one
//! compressed size per chunk. Each chunk is an independently flushed raw
//! DEFLATE block, so any chunk can be inflated without touching the ones
//! before it; the trailer's ISIZE gives the uncompressed size.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};
use memmap2::Mmap;

use super::BlockRead;
use crate::dict::DictError;

/// Default uncompressed chunk length for written containers.
pub const DEFAULT_CHUNK_LEN: u16 = 8192;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const CM_DEFLATE: u8 = 8;
const FHCRC: u8 = 0x02;
const FEXTRA: u8 = 0x04;
const FNAME: u8 = 0x08;
const FCOMMENT: u8 = 0x10;

fn bad(msg: impl Into<String>) -> DictError {
    DictError::Format(msg.into())
}

/// Read side: one inflated chunk is cached at a time.
pub struct DictzipFile {
    mmap: Mmap,
    chunk_len: u64,
    /// Absolute start offset of each compressed chunk, plus one end sentinel.
    chunk_offsets: Vec<u64>,
    size: u64,
    inflater: Decompress,
    cached: Option<(usize, Vec<u8>)>,
    inflations: u64,
}

impl DictzipFile {
    pub fn open(path: &Path) -> Result<Self, DictError> {
        let file = File::open(path)?;
        // SAFETY: the file is opened read-only and the mapping is immutable.
        let mmap = unsafe { Mmap::map(&file)? };

        let header = &mmap[..];
        if header.len() < 22 {
            return Err(bad("dictzip header too short"));
        }
        if header[0..2] != GZIP_MAGIC || header[2] != CM_DEFLATE {
            return Err(bad("not a gzip file"));
        }
        let flags = header[3];
        if flags & FEXTRA == 0 {
            return Err(bad("gzip file has no extra field"));
        }

        let xlen = usize::from(u16::from_le_bytes([header[10], header[11]]));
        let extra_end = 12 + xlen;
        if header.len() < extra_end {
            return Err(bad("gzip extra field truncated"));
        }

        let (chunk_len, sizes) = parse_ra_subfield(&header[12..extra_end])?;
        if chunk_len == 0 {
            return Err(bad("dictzip chunk length is zero"));
        }

        // Skip the optional name / comment / header CRC to find the first
        // compressed byte.
        let mut pos = extra_end;
        for flag in [FNAME, FCOMMENT] {
            if flags & flag != 0 {
                while pos < header.len() && header[pos] != 0 {
                    pos += 1;
                }
                pos += 1;
            }
        }
        if flags & FHCRC != 0 {
            pos += 2;
        }
        if pos >= header.len() {
            return Err(bad("gzip header runs past end of file"));
        }

        let mut chunk_offsets = Vec::with_capacity(sizes.len() + 1);
        let mut offset = pos as u64;
        chunk_offsets.push(offset);
        for &s in &sizes {
            offset += u64::from(s);
            chunk_offsets.push(offset);
        }
        if offset > mmap.len() as u64 {
            return Err(bad("chunk table runs past end of file"));
        }

        if mmap.len() < 4 {
            return Err(bad("missing gzip trailer"));
        }
        let t = &mmap[mmap.len() - 4..];
        let size = u64::from(u32::from_le_bytes([t[0], t[1], t[2], t[3]]));

        Ok(Self {
            mmap,
            chunk_len: u64::from(chunk_len),
            chunk_offsets,
            size,
            inflater: Decompress::new(false),
            cached: None,
            inflations: 0,
        })
    }

    fn chunk_count(&self) -> usize {
        self.chunk_offsets.len() - 1
    }

    fn inflate_chunk(&mut self, index: usize) -> Result<(), DictError> {
        if matches!(self.cached, Some((cached, _)) if cached == index) {
            return Ok(());
        }

        let start = self.chunk_offsets[index] as usize;
        let end = self.chunk_offsets[index + 1] as usize;
        let input = &self.mmap[start..end];

        // Chunks are flush-terminated, so a fresh inflater per chunk sees a
        // self-contained byte-aligned stream.
        self.inflater.reset(false);
        let mut out = Vec::with_capacity(self.chunk_len as usize);
        loop {
            let consumed = self.inflater.total_in() as usize;
            let status = self
                .inflater
                .decompress_vec(&input[consumed..], &mut out, FlushDecompress::Sync)
                .map_err(|e| DictError::Inflate(e.to_string()))?;
            match status {
                Status::StreamEnd => break,
                _ if self.inflater.total_in() as usize == input.len() => break,
                _ if out.len() == out.capacity() => break,
                _ => {}
            }
        }

        self.inflations += 1;
        self.cached = Some((index, out));
        Ok(())
    }
}

impl BlockRead for DictzipFile {
    fn size(&self) -> u64 {
        self.size
    }

    fn read(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize, DictError> {
        let mut chunk = (offset / self.chunk_len) as usize;
        let mut within = (offset % self.chunk_len) as usize;

        let mut delivered = 0;
        while delivered < buf.len() && chunk < self.chunk_count() {
            self.inflate_chunk(chunk)?;
            let data = &self.cached.as_ref().unwrap().1;
            if within >= data.len() {
                break;
            }
            let n = (buf.len() - delivered).min(data.len() - within);
            buf[delivered..delivered + n].copy_from_slice(&data[within..within + n]);
            delivered += n;
            within = 0;
            chunk += 1;
        }
        Ok(delivered)
    }

    fn inflations(&self) -> u64 {
        self.inflations
    }
}

fn parse_ra_subfield(mut extra: &[u8]) -> Result<(u16, Vec<u16>), DictError> {
    while extra.len() >= 4 {
        let len = usize::from(u16::from_le_bytes([extra[2], extra[3]]));
        let body_end = 4 + len;
        if extra.len() < body_end {
            return Err(bad("gzip subfield truncated"));
        }
        if &extra[0..2] == b"RA" {
            let body = &extra[4..body_end];
            if body.len() < 6 {
                return Err(bad("RA subfield too short"));
            }
            if body[0..2] != [1, 0] {
                return Err(bad(format!(
                    "unsupported RA subfield version {}.{}",
                    u16::from(body[0]),
                    u16::from(body[1])
                )));
            }
            let chunk_len = u16::from_le_bytes([body[2], body[3]]);
            let count = usize::from(u16::from_le_bytes([body[4], body[5]]));
            if body.len() < 6 + 2 * count {
                return Err(bad("RA chunk table truncated"));
            }
            let sizes = body[6..6 + 2 * count]
                .chunks_exact(2)
                .map(|c| u16::from_le_bytes([c[0], c[1]]))
                .collect();
            return Ok((chunk_len, sizes));
        }
        extra = &extra[body_end..];
    }
    Err(bad("no RA subfield in gzip extra field"))
}

/// Write `data` as a dictzip container with the given uncompressed chunk
/// length.
///
/// These containers were traditionally produced by the external
/// `dictzip` utility; the builder needs one for `.dz` outputs, so the
/// writer lives next to the reader.
pub fn write_dictzip(data: &[u8], chunk_len: u16, out: &mut dyn Write) -> Result<(), DictError> {
    if chunk_len == 0 {
        return Err(bad("dictzip chunk length must be positive"));
    }
    let chunks: Vec<&[u8]> = data.chunks(usize::from(chunk_len)).collect();
    // the chunk table must fit the 16-bit XLEN field of the gzip header
    if chunks.len() > (usize::from(u16::MAX) - 10) / 2 {
        return Err(bad("too many dictzip chunks; raise the chunk length"));
    }
    if data.len() > u32::MAX as usize {
        return Err(bad("dictzip input exceeds 4 GiB"));
    }

    let mut compressor = Compress::new(Compression::default(), false);
    let mut compressed: Vec<Vec<u8>> = Vec::with_capacity(chunks.len());
    for (i, chunk) in chunks.iter().enumerate() {
        let last = i == chunks.len() - 1;
        let bytes = deflate_chunk(&mut compressor, chunk, last)?;
        if bytes.len() > usize::from(u16::MAX) {
            return Err(bad("incompressible chunk overflows the RA size field"));
        }
        compressed.push(bytes);
    }

    let count = compressed.len() as u16;
    let sub_len = 6 + 2 * count;
    let xlen = 4 + sub_len;

    out.write_all(&GZIP_MAGIC)?;
    out.write_all(&[CM_DEFLATE, FEXTRA])?;
    out.write_all(&[0; 4])?; // MTIME
    out.write_all(&[0, 0xFF])?; // XFL, OS = unknown
    out.write_all(&xlen.to_le_bytes())?;
    out.write_all(b"RA")?;
    out.write_all(&sub_len.to_le_bytes())?;
    out.write_all(&[1, 0])?; // subfield version
    out.write_all(&chunk_len.to_le_bytes())?;
    out.write_all(&count.to_le_bytes())?;
    for bytes in &compressed {
        out.write_all(&(bytes.len() as u16).to_le_bytes())?;
    }
    for bytes in &compressed {
        out.write_all(bytes)?;
    }

    let mut crc = flate2::Crc::new();
    crc.update(data);
    out.write_all(&crc.sum().to_le_bytes())?;
    out.write_all(&(data.len() as u32).to_le_bytes())?;
    Ok(())
}

fn deflate_chunk(
    compressor: &mut Compress,
    chunk: &[u8],
    last: bool,
) -> Result<Vec<u8>, DictError> {
    compressor.reset();
    let flush = if last {
        FlushCompress::Finish
    } else {
        // a full flush aligns the chunk on a byte boundary and clears the
        // window, keeping chunks independently inflatable
        FlushCompress::Full
    };

    let mut out = Vec::with_capacity(chunk.len() / 2 + 64);
    loop {
        let consumed = compressor.total_in() as usize;
        let status = compressor
            .compress_vec(&chunk[consumed..], &mut out, flush)
            .map_err(|e| DictError::Inflate(e.to_string()))?;
        match status {
            Status::StreamEnd => break,
            _ => {
                let consumed = compressor.total_in() as usize;
                if consumed == chunk.len() && !last && out.len() < out.capacity() {
                    break;
                }
                if out.len() == out.capacity() {
                    out.reserve(4096);
                }
            }
        }
    }
    Ok(out)
}
