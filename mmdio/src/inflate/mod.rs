//! MSZIP framing over an RFC 1951 DEFLATE decoder, as used by compressed DirectX .x files.

mod bitstream;
mod huffman;

use crate::error::{MmdError, Result};

use self::{
    bitstream::BitReader,
    huffman::{HuffmanTree, FIXED_DISTANCE_TREE, FIXED_LITERAL_TREE},
};

pub(crate) type InflateResult<T> = std::result::Result<T, &'static str>;

/// Bytes copied verbatim ahead of the compressed payload.
pub const MSZIP_HEADER_SIZE: usize = 16;
const MSZIP_SIZE_FIELD: usize = 4;
const MSZIP_SIGNATURE: &[u8; 2] = b"CK";
const RESERVE_RATIO: usize = 8;

const END_OF_BLOCK: u16 = 256;
const LENGTH_BASE: [u16; 29] = [
    3, 4, 5, 6, 7, 8, 9, 10, 11, 13, 15, 17, 19, 23, 27, 31, 35, 43, 51, 59, 67, 83, 99, 115, 131,
    163, 195, 227, 258,
];
const LENGTH_EXTRA: [u8; 29] = [
    0, 0, 0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3, 4, 4, 4, 4, 5, 5, 5, 5, 0,
];
const DISTANCE_BASE: [u16; 30] = [
    1, 2, 3, 4, 5, 7, 9, 13, 17, 25, 33, 49, 65, 97, 129, 193, 257, 385, 513, 769, 1025, 1537,
    2049, 3073, 4097, 6145, 8193, 12289, 16385, 24577,
];
const DISTANCE_EXTRA: [u8; 30] = [
    0, 0, 0, 0, 1, 1, 2, 2, 3, 3, 4, 4, 5, 5, 6, 6, 7, 7, 8, 8, 9, 9, 10, 10, 11, 11, 12, 12, 13,
    13,
];
const CODE_LENGTH_ORDER: [usize; 19] = [
    16, 17, 18, 0, 8, 7, 9, 6, 10, 5, 11, 4, 12, 3, 13, 2, 14, 1, 15,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockType {
    Stored,
    Fixed,
    Dynamic,
}

/// Output side of the decoder. History is shared by every stream written into it.
struct Inflater {
    output: Vec<u8>,
    /// Start of the history window; bytes before it are not addressable by back-references.
    window_start: usize,
    limit: usize,
}

impl Inflater {
    fn new(output: Vec<u8>, limit: usize) -> Self {
        Self {
            window_start: output.len(),
            output,
            limit,
        }
    }

    fn ensure_room(&self, length: usize) -> InflateResult<()> {
        if self.output.len() + length > self.limit {
            Err("output exceeds the declared size")
        } else {
            Ok(())
        }
    }

    fn emit(&mut self, byte: u8) -> InflateResult<()> {
        self.ensure_room(1)?;
        self.output.push(byte);
        Ok(())
    }

    fn copy_match(&mut self, length: usize, distance: usize) -> InflateResult<()> {
        if distance == 0 || distance > self.output.len() - self.window_start {
            return Err("back-reference distance is too far back");
        }
        self.ensure_room(length)?;
        let start = self.output.len() - distance;
        if distance >= length {
            self.output.extend_from_within(start..start + length);
        } else {
            for i in 0..length {
                let byte = self.output[start + i];
                self.output.push(byte);
            }
        }
        Ok(())
    }

    /// Decodes one DEFLATE stream up to and including its final block.
    fn inflate_stream(&mut self, reader: &mut BitReader) -> InflateResult<()> {
        loop {
            let is_final = reader.read_bit()? == 1;
            let block_type = match reader.read_bits(2)? {
                0 => BlockType::Stored,
                1 => BlockType::Fixed,
                2 => BlockType::Dynamic,
                _ => return Err("reserved block type"),
            };
            match block_type {
                BlockType::Stored => self.inflate_stored(reader)?,
                BlockType::Fixed => {
                    self.inflate_codes(reader, &FIXED_LITERAL_TREE, &FIXED_DISTANCE_TREE)?
                }
                BlockType::Dynamic => {
                    let (literal, distance) = read_dynamic_trees(reader)?;
                    self.inflate_codes(reader, &literal, &distance)?;
                }
            }
            if is_final {
                return Ok(());
            }
        }
    }

    fn inflate_stored(&mut self, reader: &mut BitReader) -> InflateResult<()> {
        reader.align_to_byte();
        let length = reader.read_bits(16)?;
        let complement = reader.read_bits(16)?;
        if length != !complement & 0xffff {
            return Err("stored block length check mismatch");
        }
        self.ensure_room(length as usize)?;
        for _ in 0..length {
            let byte = reader.read_bits(8)? as u8;
            self.output.push(byte);
        }
        Ok(())
    }

    fn inflate_codes(
        &mut self,
        reader: &mut BitReader,
        literal: &HuffmanTree,
        distance: &HuffmanTree,
    ) -> InflateResult<()> {
        loop {
            let symbol = literal.decode(reader)?;
            match symbol {
                0..=255 => self.emit(symbol as u8)?,
                END_OF_BLOCK => return Ok(()),
                257..=285 => {
                    let i = (symbol - 257) as usize;
                    let length = LENGTH_BASE[i] as usize + read_extra(reader, LENGTH_EXTRA[i])?;
                    let d = distance.decode(reader)? as usize;
                    if d >= DISTANCE_BASE.len() {
                        return Err("invalid distance symbol");
                    }
                    let distance =
                        DISTANCE_BASE[d] as usize + read_extra(reader, DISTANCE_EXTRA[d])?;
                    self.copy_match(length, distance)?;
                }
                _ => return Err("invalid literal/length symbol"),
            }
        }
    }
}

fn read_extra(reader: &mut BitReader, bits: u8) -> InflateResult<usize> {
    if bits == 0 {
        Ok(0)
    } else {
        Ok(reader.read_bits(bits as u32)? as usize)
    }
}

fn read_dynamic_trees(reader: &mut BitReader) -> InflateResult<(HuffmanTree, HuffmanTree)> {
    let hlit = reader.read_bits(5)? as usize + 257;
    let hdist = reader.read_bits(5)? as usize + 1;
    let hclen = reader.read_bits(4)? as usize + 4;
    if hlit > 286 {
        return Err("too many literal/length codes");
    }
    let mut code_lengths = [0u8; 19];
    for &symbol in CODE_LENGTH_ORDER.iter().take(hclen) {
        code_lengths[symbol] = reader.read_bits(3)? as u8;
    }
    let code_length_tree = HuffmanTree::from_lengths(&code_lengths)?;
    // literal/length and distance lengths form one sequence; repeats may cross the boundary
    let total = hlit + hdist;
    let mut lengths = Vec::with_capacity(total);
    while lengths.len() < total {
        let symbol = code_length_tree.decode(reader)?;
        let (value, repeat) = match symbol {
            0..=15 => (symbol as u8, 1),
            16 => {
                let previous = *lengths.last().ok_or("repeat code without a previous length")?;
                (previous, 3 + reader.read_bits(2)? as usize)
            }
            17 => (0, 3 + reader.read_bits(3)? as usize),
            18 => (0, 11 + reader.read_bits(7)? as usize),
            _ => return Err("invalid code length symbol"),
        };
        if lengths.len() + repeat > total {
            return Err("code length repeat overflows the table");
        }
        lengths.extend(std::iter::repeat(value).take(repeat));
    }
    if lengths[END_OF_BLOCK as usize] == 0 {
        return Err("missing end-of-block code");
    }
    let literal = HuffmanTree::from_lengths(&lengths[..hlit])?;
    let distance = HuffmanTree::from_lengths(&lengths[hlit..])?;
    Ok((literal, distance))
}

/// Decodes a raw DEFLATE stream.
pub fn inflate(data: &[u8]) -> Result<Vec<u8>> {
    let mut inflater = Inflater::new(Vec::with_capacity(data.len() * 4), usize::MAX);
    let mut reader = BitReader::new(data);
    inflater
        .inflate_stream(&mut reader)
        .map_err(|reason| MmdError::decompression(0, reason))?;
    Ok(inflater.output)
}

/// Expands an MSZIP container: the 16-byte header is kept, the declared size bounds the output.
pub fn decompress_mszip(data: &[u8]) -> Result<Vec<u8>> {
    let payload_offset = MSZIP_HEADER_SIZE + MSZIP_SIZE_FIELD;
    if data.len() < payload_offset {
        return Err(MmdError::decompression(0, "input is shorter than the MSZIP header"));
    }
    let mut size = [0u8; MSZIP_SIZE_FIELD];
    size.copy_from_slice(&data[MSZIP_HEADER_SIZE..payload_offset]);
    let final_size = u32::from_le_bytes(size) as usize;
    if final_size < MSZIP_HEADER_SIZE {
        return Err(MmdError::decompression(
            0,
            format!("declared size {} is smaller than the header", final_size),
        ));
    }
    // The declared size is untrusted; reserve for a plausible ratio and let the rest grow.
    let reserve = final_size.min(MSZIP_HEADER_SIZE + data.len().saturating_mul(RESERVE_RATIO));
    let mut output = Vec::with_capacity(reserve);
    output.extend_from_slice(&data[..MSZIP_HEADER_SIZE]);
    let mut inflater = Inflater::new(output, final_size);
    let mut offset = payload_offset;
    let mut block = 0;
    while offset < data.len() && inflater.output.len() < final_size {
        block += 1;
        if offset + 4 > data.len() {
            return Err(MmdError::decompression(block, "truncated block header"));
        }
        let raw_size = u16::from_le_bytes([data[offset], data[offset + 1]]) as usize;
        let compressed_size = u16::from_le_bytes([data[offset + 2], data[offset + 3]]) as usize;
        offset += 4;
        let end = offset + compressed_size;
        if end > data.len() {
            return Err(MmdError::decompression(
                block,
                format!(
                    "block needs {} bytes but {} remain",
                    compressed_size,
                    data.len() - offset
                ),
            ));
        }
        let payload = &data[offset..end];
        if payload.len() < MSZIP_SIGNATURE.len() || &payload[..2] != MSZIP_SIGNATURE {
            return Err(MmdError::decompression(block, "missing MSZIP signature"));
        }
        let before = inflater.output.len();
        let mut reader = BitReader::new(&payload[2..]);
        inflater
            .inflate_stream(&mut reader)
            .map_err(|reason| MmdError::decompression(block, reason))?;
        let produced = inflater.output.len() - before;
        if produced != raw_size {
            log::warn!(
                "MSZIP block {} expanded to {} bytes, header says {}",
                block,
                produced,
                raw_size
            );
        }
        log::trace!(
            "MSZIP block {}: {} -> {} bytes ({} bits)",
            block,
            compressed_size,
            produced,
            reader.bits_read()
        );
        offset = end;
    }
    log::debug!(
        "MSZIP: {} blocks, {} of {} bytes",
        block,
        inflater.output.len(),
        final_size
    );
    Ok(inflater.output)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Least-significant-bit-first writer for hand-built streams.
    #[derive(Default)]
    struct BitWriter {
        bytes: Vec<u8>,
        bit: u32,
    }

    impl BitWriter {
        fn write_bits(&mut self, value: u32, n: u32) {
            for i in 0..n {
                if self.bit == 0 {
                    self.bytes.push(0);
                }
                let last = self.bytes.len() - 1;
                self.bytes[last] |= (((value >> i) & 1) as u8) << self.bit;
                self.bit = (self.bit + 1) % 8;
            }
        }

        /// Huffman codes go out most-significant bit first.
        fn write_code(&mut self, code: u32, length: u32) {
            for i in (0..length).rev() {
                self.write_bits((code >> i) & 1, 1);
            }
        }
    }

    #[test]
    fn test_stored_block() {
        let data = [0x01, 0x05, 0x00, 0xfa, 0xff, b'H', b'E', b'L', b'L', b'O'];
        assert_eq!(b"HELLO".to_vec(), inflate(&data).unwrap());
        let broken = [0x01, 0x05, 0x00, 0xfb, 0xff, b'H', b'E', b'L', b'L', b'O'];
        assert!(matches!(
            inflate(&broken),
            Err(MmdError::DecompressionFailed { block: 0, .. })
        ));
    }

    #[test]
    fn test_fixed_block_with_overlapping_match() {
        // "aaaaa": literal 'a' then length 4 at distance 1
        let mut w = BitWriter::default();
        w.write_bits(1, 1);
        w.write_bits(1, 2);
        w.write_code(0x30 + b'a' as u32, 8);
        w.write_code(258 - 256, 7);
        w.write_code(0, 5);
        w.write_code(0, 7);
        assert_eq!(b"aaaaa".to_vec(), inflate(&w.bytes).unwrap());
    }

    #[test]
    fn test_dynamic_block() {
        let mut w = BitWriter::default();
        w.write_bits(1, 1);
        w.write_bits(2, 2);
        // 261 literal/length codes, 2 distance codes, 18 code length codes
        w.write_bits(4, 5);
        w.write_bits(1, 5);
        w.write_bits(14, 4);
        // code length alphabet: symbols 1, 2, 17 and 18 use 2 bits each
        for symbol in CODE_LENGTH_ORDER.iter().take(18) {
            let length = match symbol {
                1 | 2 | 17 | 18 => 2,
                _ => 0,
            };
            w.write_bits(length, 3);
        }
        let (one, two, zeros3, zeros11) = (0b00, 0b01, 0b10, 0b11);
        // 0..=64 unused
        w.write_code(zeros11, 2);
        w.write_bits(65 - 11, 7);
        // 'A', 'B'
        w.write_code(two, 2);
        w.write_code(two, 2);
        // 67..=255 unused
        w.write_code(zeros11, 2);
        w.write_bits(138 - 11, 7);
        w.write_code(zeros11, 2);
        w.write_bits(51 - 11, 7);
        // end of block
        w.write_code(two, 2);
        // 257..=259 unused
        w.write_code(zeros3, 2);
        w.write_bits(0, 3);
        // length 6
        w.write_code(two, 2);
        // both distance codes use one bit
        w.write_code(one, 2);
        w.write_code(one, 2);
        // literal tree: 'A' 00, 'B' 01, end 10, length 6 11
        w.write_code(0b00, 2);
        w.write_code(0b01, 2);
        w.write_code(0b11, 2);
        // distance symbol 1 is distance 2
        w.write_code(1, 1);
        w.write_code(0b10, 2);
        assert_eq!(b"ABABABAB".to_vec(), inflate(&w.bytes).unwrap());
    }

    #[test]
    fn test_invalid_streams() {
        // reserved block type 3
        assert!(inflate(&[0x07]).is_err());
        // distance before the start of the output
        let mut w = BitWriter::default();
        w.write_bits(1, 1);
        w.write_bits(1, 2);
        w.write_code(258 - 256, 7);
        w.write_code(0, 5);
        assert!(inflate(&w.bytes).is_err());
        // truncated
        assert!(inflate(&[]).is_err());
    }

    #[test]
    fn test_mszip_framing() {
        let stored = [0x01, 0x05, 0x00, 0xfa, 0xff, b'H', b'E', b'L', b'L', b'O'];
        let mut data = b"xof 0303tzip0032".to_vec();
        data.extend_from_slice(&(16u32 + 5).to_le_bytes());
        data.extend_from_slice(&5u16.to_le_bytes());
        data.extend_from_slice(&(stored.len() as u16 + 2).to_le_bytes());
        data.extend_from_slice(b"CK");
        data.extend_from_slice(&stored);
        let output = decompress_mszip(&data).unwrap();
        assert_eq!(b"xof 0303tzip0032HELLO".to_vec(), output);

        let mut small = data.clone();
        small[16] = 18;
        assert!(matches!(
            decompress_mszip(&small),
            Err(MmdError::DecompressionFailed { block: 1, .. })
        ));
        let mut unsigned = data.clone();
        unsigned[24] = b'X';
        assert!(decompress_mszip(&unsigned).is_err());
        assert!(decompress_mszip(&data[..10]).is_err());
    }

    fn mszip_block(data: &mut Vec<u8>, raw_size: u16, stream: &[u8]) {
        data.extend_from_slice(&raw_size.to_le_bytes());
        data.extend_from_slice(&(stream.len() as u16 + 2).to_le_bytes());
        data.extend_from_slice(b"CK");
        data.extend_from_slice(stream);
    }

    #[test]
    fn test_back_reference_into_previous_block() {
        let stored = [0x01, 0x05, 0x00, 0xfa, 0xff, b'H', b'E', b'L', b'L', b'O'];
        // length 5 at distance 5, reaching back into the first block
        let mut w = BitWriter::default();
        w.write_bits(1, 1);
        w.write_bits(1, 2);
        w.write_code(259 - 256, 7);
        w.write_code(4, 5);
        w.write_bits(0, 1);
        w.write_code(0, 7);
        let mut data = b"xof 0303tzip0032".to_vec();
        data.extend_from_slice(&(16u32 + 10).to_le_bytes());
        mszip_block(&mut data, 5, &stored);
        mszip_block(&mut data, 5, &w.bytes);
        let output = decompress_mszip(&data).unwrap();
        assert_eq!(b"xof 0303tzip0032HELLOHELLO".to_vec(), output);
        // the same stream alone has no history to copy from
        assert!(inflate(&w.bytes).is_err());
    }

    #[test]
    fn test_declared_size_does_not_drive_allocation() {
        let stored = [0x01, 0x05, 0x00, 0xfa, 0xff, b'H', b'E', b'L', b'L', b'O'];
        let mut data = b"xof 0303tzip0032".to_vec();
        data.extend_from_slice(&u32::MAX.to_le_bytes());
        mszip_block(&mut data, 5, &stored);
        let output = decompress_mszip(&data).unwrap();
        assert_eq!(b"xof 0303tzip0032HELLO".to_vec(), output);
        assert!(output.capacity() < 1 << 16);
    }
}
