use std::mem::size_of;

use cgmath::{Quaternion, Vector2, Vector3, Vector4};

use crate::error::{MmdError, Result};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum LanguageType {
    Japanese,
    English,
}

#[macro_export]
macro_rules! read_primitive {
    ($typ: ty, $read_typ:ident) => {
        pub fn $read_typ(&mut self) -> Result<$typ> {
            let typ_len = size_of::<$typ>();
            let bytes = self.read_buffer(typ_len)?;
            let mut raw = [0u8; size_of::<$typ>()];
            raw.copy_from_slice(bytes);
            Ok(<$typ>::from_le_bytes(raw))
        }
    };
}

/// Little-endian reader over a borrowed byte slice.
pub struct Buffer<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Buffer<'a> {
    pub fn create(data: &'a [u8]) -> Buffer<'a> {
        Buffer { data, offset: 0 }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn remaining(&self) -> usize {
        self.len().saturating_sub(self.offset)
    }

    pub fn can_read_len(&self, len: usize) -> bool {
        self.len() >= self.offset && self.len() - self.offset >= len
    }

    pub fn is_end(&self) -> bool {
        self.len() <= self.offset
    }

    pub fn skip(&mut self, skip: usize) -> Result<()> {
        if self.can_read_len(skip) {
            self.offset += skip;
            Ok(())
        } else {
            Err(MmdError::UnexpectedEof)
        }
    }

    pub fn seek(&mut self, position: usize) -> Result<()> {
        if position <= self.len() {
            self.offset = position;
            Ok(())
        } else {
            Err(MmdError::UnexpectedEof)
        }
    }

    pub fn read_byte(&mut self) -> Result<u8> {
        if self.can_read_len(1) {
            let result = self.data[self.offset];
            self.offset += 1;
            Ok(result)
        } else {
            Err(MmdError::UnexpectedEof)
        }
    }

    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(self.read_byte()? as i8)
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_byte()? != 0)
    }

    /// Reads an `i32` element count. Negative counts are rejected.
    pub fn read_len(&mut self) -> Result<usize> {
        let len = self.read_i32_little_endian()?;
        if len < 0 {
            return Err(MmdError::UnknownEnum {
                field: "count",
                value: len as i64,
            });
        }
        Ok(len as usize)
    }

    read_primitive!(u16, read_u16_little_endian);
    read_primitive!(i16, read_i16_little_endian);
    read_primitive!(u32, read_u32_little_endian);
    read_primitive!(i32, read_i32_little_endian);
    read_primitive!(f32, read_f32_little_endian);

    pub fn read_f32_2_little_endian(&mut self) -> Result<Vector2<f32>> {
        Ok(Vector2::new(
            self.read_f32_little_endian()?,
            self.read_f32_little_endian()?,
        ))
    }

    pub fn read_f32_3_little_endian(&mut self) -> Result<Vector3<f32>> {
        Ok(Vector3::new(
            self.read_f32_little_endian()?,
            self.read_f32_little_endian()?,
            self.read_f32_little_endian()?,
        ))
    }

    pub fn read_f32_4_little_endian(&mut self) -> Result<Vector4<f32>> {
        Ok(Vector4::new(
            self.read_f32_little_endian()?,
            self.read_f32_little_endian()?,
            self.read_f32_little_endian()?,
            self.read_f32_little_endian()?,
        ))
    }

    /// Reads a quaternion stored as `x, y, z, w`.
    pub fn read_quaternion_little_endian(&mut self) -> Result<Quaternion<f32>> {
        let v = self.read_f32_4_little_endian()?;
        Ok(Quaternion::new(v.w, v.x, v.y, v.z))
    }

    pub fn read_f32_array(&mut self, count: usize) -> Result<Vec<f32>> {
        let mut values = Vec::with_capacity(count.min(self.remaining() / 4));
        for _ in 0..count {
            values.push(self.read_f32_little_endian()?);
        }
        Ok(values)
    }

    /// Unsigned index of 1, 2 or 4 bytes (PMX vertex indices).
    pub fn read_integer(&mut self, size: usize) -> Result<i32> {
        Ok(match size {
            1 => self.read_byte()? as i32,
            2 => self.read_u16_little_endian()? as i32,
            4 => self.read_i32_little_endian()?,
            _ => Err(MmdError::UnknownEnum {
                field: "index size",
                value: size as i64,
            })?,
        })
    }

    /// Signed index of 1, 2 or 4 bytes where `-1` means "none".
    pub fn read_integer_nullable(&mut self, size: usize) -> Result<i32> {
        Ok(match size {
            1 => self.read_i8()? as i32,
            2 => self.read_i16_little_endian()? as i32,
            4 => self.read_i32_little_endian()?,
            _ => Err(MmdError::UnknownEnum {
                field: "index size",
                value: size as i64,
            })?,
        })
    }

    pub fn read_integer_array(&mut self, size: usize, count: usize) -> Result<Vec<i32>> {
        if !self.can_read_len(size.saturating_mul(count)) {
            return Err(MmdError::UnexpectedEof);
        }
        let mut values = Vec::with_capacity(count);
        for _ in 0..count {
            values.push(self.read_integer(size)?);
        }
        Ok(values)
    }

    pub fn read_buffer(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.can_read_len(len) {
            let result = &self.data[self.offset..self.offset + len];
            self.offset += len;
            Ok(result)
        } else {
            Err(MmdError::UnexpectedEof)
        }
    }

    pub fn read_fixed_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut raw = [0u8; N];
        raw.copy_from_slice(self.read_buffer(N)?);
        Ok(raw)
    }
}

#[macro_export]
macro_rules! write_primitive {
    ($typ: ty, $write_typ:ident) => {
        pub fn $write_typ(&mut self, value: $typ) -> Result<()> {
            self.write_byte_array(&value.to_le_bytes())
        }
    };
}

/// Growable little-endian writer.
pub struct MutableBuffer {
    data: Vec<u8>,
    sanitize_non_finite: bool,
}

impl MutableBuffer {
    pub fn create() -> Result<MutableBuffer> {
        Self::create_with_reserved_size(2 << 12)
    }

    pub fn create_with_reserved_size(capacity: usize) -> Result<MutableBuffer> {
        let mut buffer = MutableBuffer {
            data: Vec::new(),
            sanitize_non_finite: true,
        };
        buffer.ensure_size(capacity)?;
        Ok(buffer)
    }

    /// When set, NaN and infinite floats are written as `0.0`.
    pub fn set_sanitize_non_finite(&mut self, value: bool) {
        self.sanitize_non_finite = value;
    }

    fn ensure_size(&mut self, required: usize) -> Result<()> {
        self.data
            .try_reserve(required)
            .map_err(|_| std::io::Error::from(std::io::ErrorKind::OutOfMemory).into())
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn write_byte_array(&mut self, data: &[u8]) -> Result<()> {
        self.ensure_size(data.len())?;
        self.data.extend_from_slice(data);
        Ok(())
    }

    pub fn write_byte(&mut self, value: u8) -> Result<()> {
        self.write_byte_array(&[value])
    }

    pub fn write_i8(&mut self, value: i8) -> Result<()> {
        self.write_byte(value as u8)
    }

    pub fn write_bool(&mut self, value: bool) -> Result<()> {
        self.write_byte(value as u8)
    }

    write_primitive!(u16, write_u16_little_endian);
    write_primitive!(i16, write_i16_little_endian);
    write_primitive!(u32, write_u32_little_endian);
    write_primitive!(i32, write_i32_little_endian);

    pub fn write_f32_little_endian(&mut self, value: f32) -> Result<()> {
        let value = if self.sanitize_non_finite && !value.is_finite() {
            0.0f32
        } else {
            value
        };
        self.write_byte_array(&value.to_le_bytes())
    }

    pub fn write_len(&mut self, len: usize) -> Result<()> {
        self.write_i32_little_endian(len.min(i32::MAX as usize) as i32)
    }

    pub fn write_f32_2_little_endian(&mut self, value: Vector2<f32>) -> Result<()> {
        self.write_f32_little_endian(value.x)?;
        self.write_f32_little_endian(value.y)
    }

    pub fn write_f32_3_little_endian(&mut self, value: Vector3<f32>) -> Result<()> {
        self.write_f32_little_endian(value.x)?;
        self.write_f32_little_endian(value.y)?;
        self.write_f32_little_endian(value.z)
    }

    pub fn write_f32_4_little_endian(&mut self, value: Vector4<f32>) -> Result<()> {
        self.write_f32_little_endian(value.x)?;
        self.write_f32_little_endian(value.y)?;
        self.write_f32_little_endian(value.z)?;
        self.write_f32_little_endian(value.w)
    }

    pub fn write_quaternion_little_endian(&mut self, value: Quaternion<f32>) -> Result<()> {
        self.write_f32_3_little_endian(value.v)?;
        self.write_f32_little_endian(value.s)
    }

    /// Writes `value` with `size` bytes; the caller chooses signedness through the value range.
    pub fn write_integer(&mut self, value: i32, size: usize) -> Result<()> {
        match size {
            1 => self.write_byte(value as u8),
            2 => self.write_u16_little_endian(value as u16),
            4 => self.write_i32_little_endian(value),
            _ => Err(MmdError::UnknownEnum {
                field: "index size",
                value: size as i64,
            }),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

#[test]
fn test_from_le_to_u16() {
    let data: [u8; 2] = [20, 16];
    assert_eq!(2, size_of::<u16>());
    assert_eq!(
        ((data[1] as u16) << 8) | data[0] as u16,
        u16::from_le_bytes(data)
    );
}

#[test]
fn test_buffer_read_primitive() {
    let data = [1u8, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13];
    let mut buffer = Buffer::create(&data);
    assert_eq!(1, buffer.read_byte().unwrap());
    assert_eq!((3 << 8) | 2, buffer.read_u16_little_endian().unwrap());
    assert_eq!(
        i32::from_le_bytes([4, 5, 6, 7]),
        buffer.read_i32_little_endian().unwrap()
    );
    assert_eq!(6, buffer.remaining());
    assert!(matches!(
        buffer.read_f32_3_little_endian(),
        Err(MmdError::UnexpectedEof)
    ));
}

#[test]
fn test_nullable_index_widths() {
    let data = [0xffu8, 0xff, 0xff, 0x05, 0x80];
    let mut buffer = Buffer::create(&data);
    assert_eq!(-1, buffer.read_integer_nullable(1).unwrap());
    assert_eq!(-1, buffer.read_integer_nullable(2).unwrap());
    assert_eq!(5, buffer.read_integer(1).unwrap());
    assert_eq!(0x80, buffer.read_integer(1).unwrap());
    assert!(buffer.is_end());
}

#[test]
fn test_mutable_buffer_sanitizes_floats() {
    let mut buffer = MutableBuffer::create().unwrap();
    buffer.write_f32_little_endian(f32::NAN).unwrap();
    buffer.write_integer(-1, 2).unwrap();
    assert_eq!(&[0, 0, 0, 0, 0xff, 0xff], buffer.as_bytes());
    buffer.set_sanitize_non_finite(false);
    buffer.write_f32_little_endian(f32::INFINITY).unwrap();
    assert_eq!(f32::INFINITY.to_le_bytes(), buffer.as_bytes()[6..10]);
}
