//! SHCM: the static prefix-code byte compressor.
//!
//! One codebook is built per dictionary from the byte frequencies of every
//! keyword and description, packed into the `shcm-tree` header property,
//! and reused for each field. Codes are canonical Huffman codes limited to
//! 31 bits, assigned so that shorter codes take numerically higher values;
//! that arrangement lets the decoder resolve a code length with a single
//! table walk (`while frame_prefix < base[len] { len += 1 }`) after a
//! 256-entry cache has dispatched every code of eight bits or fewer.
//!
//! The encoded form of a string is a stream of little-endian 32-bit words
//! preceded by one byte giving the unused (padding) bit count of the final
//! word. The final word is stored as only as many bytes as its content
//! needs. The first word carries at most 31 payload bits; all later words
//! carry 32.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// Codes never exceed 31 bits so a 32-bit frame always holds a whole code.
pub const MAX_CODE_LENGTH: u32 = 31;
/// Packed trees never exceed this many 32-bit words.
pub const MAX_TREE_WORDS: usize = 256;

const CACHE_BITS: u32 = 8;
/// Cache entry for codes longer than [`CACHE_BITS`]; real lengths are ≤ 31.
const CACHE_MISS: u8 = 0xFF;

#[derive(Debug, thiserror::Error)]
pub enum ShcmError {
    #[error("packed tree exceeds {MAX_TREE_WORDS} words")]
    TreeTooLarge,
    #[error("invalid packed tree: {0}")]
    InvalidTree(String),
    #[error("truncated bit stream")]
    Truncated,
    #[error("corrupt bit stream")]
    Corrupt,
    #[error("code length exceeds 32 bits")]
    CodeOverflow,
    #[error("byte {0:#04x} has no code in the model")]
    UnknownSymbol(u8),
}

/// Frequency accumulator for the offline build pass.
///
/// Feed it every keyword and description of the dictionary, then
/// [`finish`](Self::finish) into a codec.
pub struct ShcmBuilder {
    freq: [u64; 256],
}

impl Default for ShcmBuilder {
    fn default() -> Self {
        Self { freq: [0; 256] }
    }
}

impl ShcmBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accumulate(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.freq[usize::from(b)] += 1;
        }
    }

    pub fn finish(&self) -> Result<Shcm, ShcmError> {
        let lengths = limited_code_lengths(&self.freq);
        Shcm::from_lengths(lengths)
    }
}

/// An immutable codec: encode and decode tables derived from one set of
/// canonical code lengths. Safe to share by reference; never mutated after
/// construction.
pub struct Shcm {
    /// Code length per byte value; 0 marks a byte absent from the model.
    len: [u8; 256],
    /// Canonical code per byte value, right-aligned.
    code: [u32; 256],
    /// Symbols sorted by (length asc, value asc).
    symbols: Vec<u8>,
    /// Numerically smallest code of each length.
    base: [u32; 33],
    /// Index into `symbols` of the first symbol of each length.
    offs: [u32; 33],
    /// Top-8-bit dispatch: the code length, or `CACHE_MISS`.
    cache: [u8; 256],
}

impl Shcm {
    /// Reconstruct a codec from a packed tree (the unescaped `shcm-tree`
    /// property value).
    pub fn from_packed_tree(tree: &[u8]) -> Result<Self, ShcmError> {
        if tree.len() > MAX_TREE_WORDS * 4 {
            return Err(ShcmError::TreeTooLarge);
        }
        if tree.len() < 4 {
            return Err(ShcmError::InvalidTree("missing symbol count".into()));
        }
        let n = u32::from_le_bytes([tree[0], tree[1], tree[2], tree[3]]) as usize;
        if n > 256 {
            return Err(ShcmError::InvalidTree(format!("{n} symbols")));
        }
        if tree.len() < 4 + 2 * n {
            return Err(ShcmError::InvalidTree("truncated symbol table".into()));
        }

        let mut lengths = [0u8; 256];
        for pair in tree[4..4 + 2 * n].chunks_exact(2) {
            let (symbol, len) = (pair[0], pair[1]);
            if len == 0 || u32::from(len) > MAX_CODE_LENGTH {
                return Err(ShcmError::InvalidTree(format!(
                    "symbol {symbol:#04x} has code length {len}"
                )));
            }
            if lengths[usize::from(symbol)] != 0 {
                return Err(ShcmError::InvalidTree(format!(
                    "symbol {symbol:#04x} listed twice"
                )));
            }
            lengths[usize::from(symbol)] = len;
        }
        Self::from_lengths(lengths)
    }

    /// Serialize the codebook: word 0 is the symbol count, then one
    /// (symbol, length) byte pair per symbol in canonical order, zero-padded
    /// to a word boundary.
    pub fn packed_tree(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(4 + 2 * self.symbols.len() + 3);
        bytes.extend_from_slice(&(self.symbols.len() as u32).to_le_bytes());
        for &symbol in &self.symbols {
            bytes.push(symbol);
            bytes.push(self.len[usize::from(symbol)]);
        }
        while bytes.len() % 4 != 0 {
            bytes.push(0);
        }
        bytes
    }

    fn from_lengths(lengths: [u8; 256]) -> Result<Self, ShcmError> {
        let mut symbols: Vec<u8> = (0u16..256)
            .map(|v| v as u8)
            .filter(|&v| lengths[usize::from(v)] != 0)
            .collect();
        symbols.sort_by_key(|&v| (lengths[usize::from(v)], v));

        let mut count = [0u32; 33];
        for &symbol in &symbols {
            count[usize::from(lengths[usize::from(symbol)])] += 1;
        }
        let max_len = symbols
            .last()
            .map(|&v| u32::from(lengths[usize::from(v)]))
            .unwrap_or(0);

        // Kraft bound: oversubscribed lengths would assign overlapping codes.
        let kraft: u64 = symbols
            .iter()
            .map(|&v| 1u64 << (MAX_CODE_LENGTH - u32::from(lengths[usize::from(v)])))
            .sum();
        if kraft > 1u64 << MAX_CODE_LENGTH {
            return Err(ShcmError::InvalidTree(
                "code lengths oversubscribe the code space".into(),
            ));
        }

        // Shorter codes take numerically higher values: every length-L
        // prefix of a longer code stays below base[L], which is what the
        // decoder's linear scan relies on.
        let mut base = [0u32; 33];
        for l in (1..max_len).rev() {
            let l = l as usize;
            base[l] = (base[l + 1] + count[l + 1] + 1) >> 1;
        }

        let mut offs = [0u32; 33];
        let mut code = [0u32; 256];
        let mut next = [0u32; 33];
        {
            let mut running = 0u32;
            for l in 1..=max_len as usize {
                offs[l] = running;
                next[l] = base[l];
                running += count[l];
            }
        }
        for &symbol in &symbols {
            let l = usize::from(lengths[usize::from(symbol)]);
            code[usize::from(symbol)] = next[l];
            next[l] += 1;
        }

        let mut cache = [CACHE_MISS; 256];
        for (frame, entry) in cache.iter_mut().enumerate() {
            let frame = frame as u32;
            for l in 1..=CACHE_BITS.min(max_len) {
                if frame >> (CACHE_BITS - l) >= base[l as usize] {
                    *entry = l as u8;
                    break;
                }
            }
        }

        let codec = Self {
            len: lengths,
            code,
            symbols,
            base,
            offs,
            cache,
        };
        if codec.packed_tree().len() > MAX_TREE_WORDS * 4 {
            return Err(ShcmError::TreeTooLarge);
        }
        Ok(codec)
    }

    /// Encode a whole string against the model.
    pub fn encode(&self, input: &[u8]) -> Result<Vec<u8>, ShcmError> {
        let mut out = Vec::with_capacity(1 + input.len() / 2);
        out.push(0); // tail padding, patched below

        let mut bits: u32 = 31;
        let mut bitbuf: u32 = 0;
        for &b in input {
            let l = u32::from(self.len[usize::from(b)]);
            if l == 0 {
                return Err(ShcmError::UnknownSymbol(b));
            }
            let c = self.code[usize::from(b)];
            if l <= bits {
                bitbuf = (bitbuf << l) | c;
                bits -= l;
            } else {
                bitbuf <<= bits;
                bitbuf |= c >> (l - bits);
                out.extend_from_slice(&bitbuf.to_le_bytes());
                bitbuf = c;
                bits += 32 - l;
            }
        }

        out[0] = bits as u8;
        if bits < 32 {
            out.push((bitbuf & 0xFF) as u8);
        }
        if bits < 24 {
            out.push(((bitbuf >> 8) & 0xFF) as u8);
        }
        if bits < 16 {
            out.push(((bitbuf >> 16) & 0xFF) as u8);
        }
        if bits < 8 {
            out.push(((bitbuf >> 24) & 0xFF) as u8);
        }
        Ok(out)
    }

    /// Decode a whole string encoded with [`encode`](Self::encode).
    pub fn decode(&self, input: &[u8]) -> Result<Vec<u8>, ShcmError> {
        let Some((&pad, body)) = input.split_first() else {
            return Err(ShcmError::Truncated);
        };
        let pad = u32::from(pad);
        if pad > 31 || body.is_empty() {
            return Err(ShcmError::Truncated);
        }

        // Reassemble the word stream: full words, then the right-aligned
        // tail word, then a zero guard word the final frame can borrow from.
        let full_words = (body.len() - 1) / 4;
        let mut words = Vec::with_capacity(full_words + 2);
        for chunk in body[..full_words * 4].chunks_exact(4) {
            words.push(u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
        }
        let tail = &body[full_words * 4..];
        if (tail.len() as u32) < (32 - pad).div_ceil(8) {
            return Err(ShcmError::Truncated);
        }
        let mut tail_word = 0u32;
        for (i, &b) in tail.iter().enumerate() {
            tail_word |= u32::from(b) << (8 * i);
        }
        words.push(tail_word << pad);
        words.push(0);

        let last = words.len() - 1;
        let mut out = Vec::new();
        let mut bits: u32 = 31;
        let mut bufpos = 1usize;
        let mut bitbuf = words[0];

        while bufpos <= last {
            if bufpos == last && bits == pad {
                break;
            }
            let frame = if bits > 0 {
                (bitbuf << (32 - bits)) | (words[bufpos] >> bits)
            } else {
                words[bufpos]
            };

            let mut codelen = u32::from(self.cache[(frame >> (32 - CACHE_BITS)) as usize]);
            if codelen == u32::from(CACHE_MISS) {
                codelen = CACHE_BITS + 1;
                while codelen <= 32 && frame >> (32 - codelen) < self.base[codelen as usize] {
                    codelen += 1;
                }
                if codelen > 32 {
                    return Err(ShcmError::CodeOverflow);
                }
            }

            let index = (frame >> (32 - codelen)) - self.base[codelen as usize]
                + self.offs[codelen as usize];
            let &symbol = self
                .symbols
                .get(index as usize)
                .ok_or(ShcmError::Corrupt)?;
            out.push(symbol);

            if codelen <= bits {
                bits -= codelen;
            } else {
                bits += 32 - codelen;
                bitbuf = words[bufpos];
                bufpos += 1;
            }
        }

        Ok(out)
    }
}

/// Huffman code lengths limited to [`MAX_CODE_LENGTH`] bits.
///
/// Plain Huffman lengths are computed first; in the (pathological) case
/// where the deepest code exceeds the limit, the frequency table is halved
/// towards one and the lengths recomputed, which flattens the tree while
/// keeping the frequency ranking.
fn limited_code_lengths(freq: &[u64; 256]) -> [u8; 256] {
    let mut freq = *freq;
    loop {
        let lengths = huffman_lengths(&freq);
        let deepest = lengths.iter().copied().max().unwrap_or(0);
        if u32::from(deepest) <= MAX_CODE_LENGTH {
            return lengths;
        }
        for f in freq.iter_mut() {
            if *f > 0 {
                *f = *f / 2 + 1;
            }
        }
    }
}

fn huffman_lengths(freq: &[u64; 256]) -> [u8; 256] {
    let mut lengths = [0u8; 256];
    let present: Vec<usize> = (0..256).filter(|&i| freq[i] > 0).collect();
    match present.len() {
        0 => return lengths,
        1 => {
            lengths[present[0]] = 1;
            return lengths;
        }
        _ => {}
    }

    // Arena of tree nodes: leaves first, then merges. Depths are assigned
    // by walking parent links once the root is built.
    let mut parent: Vec<usize> = vec![usize::MAX; present.len()];
    let mut heap: BinaryHeap<Reverse<(u64, usize)>> = present
        .iter()
        .enumerate()
        .map(|(node, &sym)| Reverse((freq[sym], node)))
        .collect();

    while heap.len() > 1 {
        let Reverse((wa, a)) = heap.pop().unwrap();
        let Reverse((wb, b)) = heap.pop().unwrap();
        let merged = parent.len();
        parent.push(usize::MAX);
        parent[a] = merged;
        parent[b] = merged;
        heap.push(Reverse((wa + wb, merged)));
    }

    for (node, &sym) in present.iter().enumerate() {
        let mut depth = 0u32;
        let mut at = node;
        while parent[at] != usize::MAX {
            at = parent[at];
            depth += 1;
        }
        lengths[sym] = depth.min(255) as u8;
    }
    lengths
}
