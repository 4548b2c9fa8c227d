//! GIF-flavoured variable-width LZW compressor
//!
//! Codes start at `init_code_size + 1` bits and widen as the string table
//! fills, up to 12 bits. When the table is full a clear code is emitted and
//! the table starts over. String lookup goes through an open-addressed hash
//! table with a fixed secondary probe.

use crate::assert_invariant;
use crate::sink::ByteSink;

pub const MAX_BITS: u32 = 12;
pub const MAX_CODES: u32 = 1 << MAX_BITS;

/// Hash table capacity (prime, ~80% occupancy at 4096 entries)
const HSIZE: usize = 5003;
const HSHIFT: u32 = 4;
/// Largest GIF data sub-block
const BLOCK_SIZE: usize = 255;

#[inline]
fn max_code(bits: u32) -> u32 {
    (1 << bits) - 1
}

pub struct LzwCompressor {
    init_code_size: u8,
    htab: Box<[i32]>,
    codetab: Box<[u16]>,

    init_bits: u32,
    n_bits: u32,
    max_code: u32,
    free_ent: u32,
    clear_code: u32,
    eof_code: u32,
    clear_flag: bool,
    /// Largest code emitted by the current `compress` call
    peak_code: u32,

    cur_accum: u32,
    cur_bits: u32,

    block: [u8; BLOCK_SIZE],
    block_len: usize,
}

impl LzwCompressor {
    /// `color_depth` is the palette bit depth; GIF never starts below 2 bits.
    pub fn new(color_depth: u8) -> Self {
        let init_code_size = color_depth.clamp(2, 8);
        Self {
            init_code_size,
            htab: vec![-1; HSIZE].into_boxed_slice(),
            codetab: vec![0; HSIZE].into_boxed_slice(),
            init_bits: 0,
            n_bits: 0,
            max_code: 0,
            free_ent: 0,
            clear_code: 0,
            eof_code: 0,
            clear_flag: false,
            peak_code: 0,
            cur_accum: 0,
            cur_bits: 0,
            block: [0; BLOCK_SIZE],
            block_len: 0,
        }
    }

    pub fn init_code_size(&self) -> u8 {
        self.init_code_size
    }

    /// Write the minimum code size byte, the compressed sub-blocks and the
    /// zero-length terminator for one image's palette indices.
    pub fn compress(&mut self, indices: &[u8], out: &ByteSink) {
        out.write_byte(self.init_code_size);

        self.init_bits = self.init_code_size as u32 + 1;
        self.n_bits = self.init_bits;
        self.max_code = max_code(self.n_bits);
        self.clear_code = 1 << (self.init_bits - 1);
        self.eof_code = self.clear_code + 1;
        self.free_ent = self.clear_code + 2;
        self.clear_flag = false;
        self.peak_code = 0;
        self.cur_accum = 0;
        self.cur_bits = 0;
        self.block_len = 0;
        self.clear_hash();

        self.output(self.clear_code, out);

        let mut pixels = indices.iter().map(|&p| p as u32);
        if let Some(first) = pixels.next() {
            debug_assert!(first < self.clear_code, "palette index outside code space");
            let mut ent = first;

            'next_pixel: for c in pixels {
                debug_assert!(c < self.clear_code, "palette index outside code space");
                let fcode = ((c << MAX_BITS) + ent) as i32;
                let mut i = ((c << HSHIFT) ^ ent) as usize;

                if self.htab[i] == fcode {
                    ent = self.codetab[i] as u32;
                    continue;
                }
                if self.htab[i] >= 0 {
                    let disp = if i == 0 { 1 } else { HSIZE - i };
                    loop {
                        i = if i >= disp { i - disp } else { i + HSIZE - disp };
                        if self.htab[i] == fcode {
                            ent = self.codetab[i] as u32;
                            continue 'next_pixel;
                        }
                        if self.htab[i] < 0 {
                            break;
                        }
                    }
                }

                self.output(ent, out);
                ent = c;

                if self.free_ent < MAX_CODES {
                    self.codetab[i] = self.free_ent as u16;
                    self.free_ent += 1;
                    self.htab[i] = fcode;
                } else {
                    self.clear_block(out);
                }
            }

            self.output(ent, out);
        }

        self.output(self.eof_code, out);
        out.write_byte(0);

        assert_invariant!(
            self.peak_code < MAX_CODES,
            "LZW code must be below 4096",
            "lzw::compress"
        );
    }

    fn clear_hash(&mut self) {
        self.htab.fill(-1);
    }

    fn clear_block(&mut self, out: &ByteSink) {
        assert_invariant!(
            self.n_bits == MAX_BITS,
            "LZW table resets only at the 12-bit ceiling",
            "lzw::clear_block"
        );
        self.clear_hash();
        self.free_ent = self.clear_code + 2;
        self.clear_flag = true;
        self.output(self.clear_code, out);
    }

    fn output(&mut self, code: u32, out: &ByteSink) {
        self.peak_code = self.peak_code.max(code);

        self.cur_accum &= max_code(self.cur_bits);
        self.cur_accum |= code << self.cur_bits;
        self.cur_bits += self.n_bits;

        while self.cur_bits >= 8 {
            self.push_byte((self.cur_accum & 0xff) as u8, out);
            self.cur_accum >>= 8;
            self.cur_bits -= 8;
        }

        if self.free_ent > self.max_code || self.clear_flag {
            if self.clear_flag {
                self.n_bits = self.init_bits;
                self.max_code = max_code(self.n_bits);
                self.clear_flag = false;
            } else {
                self.n_bits += 1;
                self.max_code = if self.n_bits == MAX_BITS {
                    MAX_CODES
                } else {
                    max_code(self.n_bits)
                };
                assert_invariant!(
                    self.n_bits <= MAX_BITS,
                    "LZW code width never exceeds 12 bits",
                    "lzw::output"
                );
            }
        }

        if code == self.eof_code {
            while self.cur_bits > 0 {
                self.push_byte((self.cur_accum & 0xff) as u8, out);
                self.cur_accum >>= 8;
                self.cur_bits = self.cur_bits.saturating_sub(8);
            }
            self.flush_block(out);
        }
    }

    fn push_byte(&mut self, byte: u8, out: &ByteSink) {
        self.block[self.block_len] = byte;
        self.block_len += 1;
        if self.block_len >= BLOCK_SIZE {
            self.flush_block(out);
        }
    }

    fn flush_block(&mut self, out: &ByteSink) {
        if self.block_len > 0 {
            out.write_byte(self.block_len as u8);
            out.write_bytes(&self.block[..self.block_len]);
            self.block_len = 0;
        }
    }
}

/// Reference decoder used to check the compressor's output
#[cfg(test)]
pub(crate) mod testing {
    /// Decoded indices plus every `(code, width)` read from the stream
    pub(crate) fn decode(stream: &[u8]) -> (Vec<u8>, Vec<(u32, u32)>) {
        let min_code = stream[0] as u32;
        let mut data = Vec::new();
        let mut pos = 1;
        loop {
            let len = stream[pos] as usize;
            pos += 1;
            if len == 0 {
                break;
            }
            data.extend_from_slice(&stream[pos..pos + len]);
            pos += len;
        }

        let clear = 1u32 << min_code;
        let eoi = clear + 1;
        let fresh = |dict: &mut Vec<Vec<u8>>| {
            dict.clear();
            for i in 0..clear {
                dict.push(vec![i as u8]);
            }
            dict.push(Vec::new());
            dict.push(Vec::new());
        };

        let mut dict = Vec::new();
        fresh(&mut dict);
        let mut width = min_code + 1;
        let mut prev: Option<Vec<u8>> = None;
        let mut out = Vec::new();
        let mut codes = Vec::new();
        let (mut acc, mut nbits, mut byte) = (0u32, 0u32, 0usize);

        loop {
            while nbits < width {
                if byte >= data.len() {
                    return (out, codes);
                }
                acc |= (data[byte] as u32) << nbits;
                byte += 1;
                nbits += 8;
            }
            let code = acc & ((1 << width) - 1);
            acc >>= width;
            nbits -= width;
            codes.push((code, width));

            if code == clear {
                fresh(&mut dict);
                width = min_code + 1;
                prev = None;
                continue;
            }
            if code == eoi {
                return (out, codes);
            }

            let entry = if (code as usize) < dict.len() {
                dict[code as usize].clone()
            } else {
                let mut p = prev.clone().expect("KwKwK code without predecessor");
                p.push(p[0]);
                p
            };
            out.extend_from_slice(&entry);
            if let Some(mut p) = prev.take() {
                if dict.len() < 4096 {
                    p.push(entry[0]);
                    dict.push(p);
                }
            }
            prev = Some(entry);
            if dict.len() == (1 << width) && width < 12 {
                width += 1;
            }
        }
    }
}
