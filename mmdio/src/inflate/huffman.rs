use std::collections::HashMap;

use once_cell::sync::Lazy;

use super::{bitstream::BitReader, InflateResult};

pub(crate) const MAX_CODE_LENGTH: usize = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct HuffmanCode {
    length: u8,
    code: u16,
    symbol: u16,
}

fn lookup_key(length: u32, code: u32) -> u32 {
    (length << 16) | code
}

/// Canonical Huffman code table, sorted by `(length, code)`.
#[derive(Debug, Clone)]
pub(crate) struct HuffmanTree {
    codes: Vec<HuffmanCode>,
    lookup: Option<HashMap<u32, u16>>,
    min_length: u32,
    max_length: u32,
}

pub(crate) static FIXED_LITERAL_TREE: Lazy<HuffmanTree> = Lazy::new(|| {
    let mut lengths = [0u8; 288];
    for (symbol, length) in lengths.iter_mut().enumerate() {
        *length = match symbol {
            0..=143 => 8,
            144..=255 => 9,
            256..=279 => 7,
            _ => 8,
        };
    }
    HuffmanTree::canonical(&lengths).with_lookup()
});

pub(crate) static FIXED_DISTANCE_TREE: Lazy<HuffmanTree> =
    Lazy::new(|| HuffmanTree::canonical(&[5u8; 30]).with_lookup());

impl HuffmanTree {
    /// Assigns canonical codes: count per length, seed the first code of each length, then
    /// hand out codes in symbol order.
    fn canonical(lengths: &[u8]) -> Self {
        let mut counts = [0u16; MAX_CODE_LENGTH + 1];
        for &length in lengths {
            counts[length as usize] += 1;
        }
        counts[0] = 0;
        let mut next_code = [0u16; MAX_CODE_LENGTH + 1];
        let mut code = 0u16;
        for length in 1..=MAX_CODE_LENGTH {
            code = (code + counts[length - 1]) << 1;
            next_code[length] = code;
        }
        let mut codes = Vec::with_capacity(lengths.len());
        for (symbol, &length) in lengths.iter().enumerate() {
            if length > 0 {
                codes.push(HuffmanCode {
                    length,
                    code: next_code[length as usize],
                    symbol: symbol as u16,
                });
                next_code[length as usize] += 1;
            }
        }
        codes.sort_unstable();
        let min_length = codes.first().map(|c| c.length as u32).unwrap_or(0);
        let max_length = codes.last().map(|c| c.length as u32).unwrap_or(0);
        Self {
            codes,
            lookup: None,
            min_length,
            max_length,
        }
    }

    /// Builds a tree from per-symbol code lengths, rejecting over-subscribed sets.
    pub fn from_lengths(lengths: &[u8]) -> InflateResult<Self> {
        let mut left = 1i32;
        for length in 1..=MAX_CODE_LENGTH {
            left <<= 1;
            left -= lengths.iter().filter(|&&l| l as usize == length).count() as i32;
            if left < 0 {
                return Err("over-subscribed huffman code lengths");
            }
        }
        if lengths.iter().any(|&l| l as usize > MAX_CODE_LENGTH) {
            return Err("huffman code length out of range");
        }
        Ok(Self::canonical(lengths))
    }

    fn with_lookup(mut self) -> Self {
        self.lookup = Some(
            self.codes
                .iter()
                .map(|c| (lookup_key(c.length as u32, c.code as u32), c.symbol))
                .collect(),
        );
        self
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    fn find(&self, length: u32, code: u32) -> Option<u16> {
        match &self.lookup {
            Some(lookup) => lookup.get(&lookup_key(length, code)).copied(),
            None => self
                .codes
                .binary_search_by(|c| (c.length as u32, c.code as u32).cmp(&(length, code)))
                .ok()
                .map(|i| self.codes[i].symbol),
        }
    }

    /// Reads one symbol. Codes are packed most-significant-bit first.
    pub fn decode(&self, reader: &mut BitReader) -> InflateResult<u16> {
        if self.codes.is_empty() {
            return Err("empty huffman tree");
        }
        let mut code = 0u32;
        for length in 1..=self.max_length {
            code = (code << 1) | reader.read_bit()?;
            if length >= self.min_length {
                if let Some(symbol) = self.find(length, code) {
                    return Ok(symbol);
                }
            }
        }
        Err("invalid huffman code")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_codes() {
        // RFC 1951 3.2.2 example: ABCDEFGH with lengths (3, 3, 3, 3, 3, 2, 4, 4)
        let tree = HuffmanTree::from_lengths(&[3, 3, 3, 3, 3, 2, 4, 4]).unwrap();
        let expected = [
            (5, 2, 0b00),
            (0, 3, 0b010),
            (1, 3, 0b011),
            (2, 3, 0b100),
            (3, 3, 0b101),
            (4, 3, 0b110),
            (6, 4, 0b1110),
            (7, 4, 0b1111),
        ];
        for (code, (symbol, length, bits)) in tree.codes.iter().zip(expected) {
            assert_eq!(symbol, code.symbol);
            assert_eq!(length, code.length);
            assert_eq!(bits, code.code);
        }
    }

    #[test]
    fn test_fixed_tree_lookup_matches_binary_search() {
        let fixed = &*FIXED_LITERAL_TREE;
        let searched = HuffmanTree::canonical(&{
            let mut lengths = [8u8; 288];
            lengths[144..256].fill(9);
            lengths[256..280].fill(7);
            lengths
        });
        assert_eq!(288, fixed.codes.len());
        for c in &fixed.codes {
            assert_eq!(
                searched.find(c.length as u32, c.code as u32),
                fixed.find(c.length as u32, c.code as u32)
            );
        }
        // end of block is the all-zero 7-bit code
        assert_eq!(Some(256), fixed.find(7, 0));
        assert_eq!(Some(0), fixed.find(8, 0b0011_0000));
    }

    #[test]
    fn test_over_subscribed_lengths() {
        assert!(HuffmanTree::from_lengths(&[1, 1, 1]).is_err());
        assert!(HuffmanTree::from_lengths(&[0, 1]).is_ok());
    }
}
