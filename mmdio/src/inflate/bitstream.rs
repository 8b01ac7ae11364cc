use super::InflateResult;

/// `(1 << n) - 1` for `n` in `0..=32`.
const MASKS: [u32; 33] = {
    let mut masks = [0u32; 33];
    let mut n = 1;
    while n < 32 {
        masks[n] = (1u32 << n) - 1;
        n += 1;
    }
    masks[32] = u32::MAX;
    masks
};

/// Least-significant-bit-first reader with a 32-bit refill window.
pub(crate) struct BitReader<'a> {
    data: &'a [u8],
    offset: usize,
    window: u32,
    available: u32,
    consumed: u64,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            offset: 0,
            window: 0,
            available: 0,
            consumed: 0,
        }
    }

    /// Bits handed out so far.
    pub fn bits_read(&self) -> u64 {
        self.consumed
    }

    pub fn is_exhausted(&self) -> bool {
        self.available == 0 && self.offset >= self.data.len()
    }

    fn refill(&mut self) {
        let remaining = self.data.len() - self.offset;
        if self.available == 0 && remaining >= 4 {
            let mut raw = [0u8; 4];
            raw.copy_from_slice(&self.data[self.offset..self.offset + 4]);
            self.window = u32::from_le_bytes(raw);
            self.offset += 4;
            self.available = 32;
        } else if self.available <= 16 && remaining >= 2 {
            let value =
                u16::from_le_bytes([self.data[self.offset], self.data[self.offset + 1]]) as u32;
            self.window |= value << self.available;
            self.offset += 2;
            self.available += 16;
        } else if self.available <= 24 && remaining >= 1 {
            self.window |= (self.data[self.offset] as u32) << self.available;
            self.offset += 1;
            self.available += 8;
        }
    }

    /// Reads `n` bits, `n` in `1..=16`, the first bit read landing in bit 0.
    pub fn read_bits(&mut self, n: u32) -> InflateResult<u32> {
        debug_assert!((1..=16).contains(&n));
        while self.available < n {
            let before = self.available;
            self.refill();
            if self.available == before {
                return Err("unexpected end of compressed data");
            }
        }
        let value = self.window & MASKS[n as usize];
        self.window >>= n;
        self.available -= n;
        self.consumed += n as u64;
        Ok(value)
    }

    pub fn read_bit(&mut self) -> InflateResult<u32> {
        self.read_bits(1)
    }

    /// Drops the bits up to the next byte boundary.
    pub fn align_to_byte(&mut self) {
        let skip = self.available % 8;
        self.window >>= skip;
        self.available -= skip;
        self.consumed += skip as u64;
    }
}

#[test]
fn test_masks() {
    assert_eq!(0, MASKS[0]);
    assert_eq!(0b111, MASKS[3]);
    assert_eq!(0xffff, MASKS[16]);
    assert_eq!(u32::MAX, MASKS[32]);
}

#[test]
fn test_lsb_first_across_refills() {
    let data = [0b1010_1101u8, 0xff, 0x01, 0x80, 0x12, 0x34];
    let mut reader = BitReader::new(&data);
    assert_eq!(1, reader.read_bit().unwrap());
    assert_eq!(0b110, reader.read_bits(3).unwrap());
    assert_eq!(0b1010, reader.read_bits(4).unwrap());
    assert_eq!(0x01ff, reader.read_bits(16).unwrap());
    assert_eq!(0x80, reader.read_bits(8).unwrap());
    reader.align_to_byte();
    assert_eq!(0, reader.read_bit().unwrap());
    reader.align_to_byte();
    assert_eq!(0x34, reader.read_bits(8).unwrap());
    assert_eq!(48, reader.bits_read());
    assert!(reader.is_exhausted());
    assert!(reader.read_bit().is_err());
}
