use encoding_rs::{Encoding, SHIFT_JIS, UTF_16LE, UTF_8};

use crate::error::{MmdError, Result};

pub fn fourcc(a: u8, b: u8, c: u8, d: u8) -> u32 {
    u32::from_le_bytes([a, b, c, d])
}

/// Text encoding carried in the PMX header byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecType {
    Sjis,
    Utf8,
    Utf16,
}

impl CodecType {
    pub fn from_pmx(value: u8) -> Result<Self> {
        match value {
            0 => Ok(CodecType::Utf16),
            1 => Ok(CodecType::Utf8),
            _ => Err(MmdError::UnknownEncoding { saw: value }),
        }
    }

    pub fn to_pmx(self) -> u8 {
        match self {
            CodecType::Utf8 => 1,
            CodecType::Utf16 | CodecType::Sjis => 0,
        }
    }

    pub fn get_encoding_object(self) -> &'static Encoding {
        match self {
            CodecType::Sjis => SHIFT_JIS,
            CodecType::Utf8 => UTF_8,
            CodecType::Utf16 => UTF_16LE,
        }
    }
}

fn decode_strict(src: &[u8], encoding: &'static Encoding) -> Option<String> {
    encoding
        .decode_without_bom_handling_and_without_replacement(src)
        .map(|cow| cow.into_owned())
}

fn decode_utf16_with_bom(src: &[u8]) -> Option<String> {
    let (cow, had_errors) = UTF_16LE.decode_with_bom_removal(src);
    if had_errors {
        None
    } else {
        Some(cow.into_owned())
    }
}

/// Decodes `src` with `primary`, falling back to Shift-JIS, UTF-8 and UTF-16LE (BOM aware).
/// When every candidate fails, undecodable units become `?`.
pub fn decode_text(src: &[u8], primary: CodecType) -> String {
    let primary_encoding = primary.get_encoding_object();
    if let Some(text) = decode_strict(src, primary_encoding) {
        return text;
    }
    let fallback = [SHIFT_JIS, UTF_8]
        .into_iter()
        .filter(|encoding| *encoding != primary_encoding)
        .find_map(|encoding| decode_strict(src, encoding))
        .or_else(|| decode_utf16_with_bom(src));
    match fallback {
        Some(text) => {
            log::trace!("text decoded with a fallback encoding");
            text
        }
        None => {
            let (cow, _, _) = primary_encoding.decode(src);
            cow.replace('\u{FFFD}', "?")
        }
    }
}

/// Trims trailing `0x00` / `0xFD` filler of a fixed-width name and cuts at the first NUL.
pub fn trim_fixed_name(slice: &[u8]) -> &[u8] {
    let mut end = slice.len();
    while end > 0 && (slice[end - 1] == 0x00 || slice[end - 1] == 0xFD) {
        end -= 1;
    }
    let src = &slice[..end];
    match src.iter().position(|c| *c == 0u8) {
        Some(pos) => &src[..pos],
        None => src,
    }
}

pub fn u8_slice_get_string(slice: &[u8], codec: CodecType) -> String {
    decode_text(trim_fixed_name(slice), codec)
}

/// Encodes `text` to Shift-JIS and pads or truncates it to exactly `width` bytes.
pub fn encode_fixed_sjis(text: &str, width: usize) -> Result<Vec<u8>> {
    let (bytes, _, had_errors) = SHIFT_JIS.encode(text);
    if had_errors {
        return Err(MmdError::EncodeFailed {
            text: text.to_owned(),
        });
    }
    let mut encoded = bytes.into_owned();
    encoded.resize(width, 0u8);
    Ok(encoded)
}

/// Encodes `text` as UTF-16LE without a BOM.
pub fn encode_utf16le(text: &str) -> Vec<u8> {
    text.encode_utf16().flat_map(|unit| unit.to_le_bytes()).collect()
}

pub fn encode_text(text: &str, codec: CodecType) -> Result<Vec<u8>> {
    match codec {
        CodecType::Utf16 => Ok(encode_utf16le(text)),
        CodecType::Utf8 => Ok(text.as_bytes().to_vec()),
        CodecType::Sjis => {
            let (bytes, _, had_errors) = SHIFT_JIS.encode(text);
            if had_errors {
                Err(MmdError::EncodeFailed {
                    text: text.to_owned(),
                })
            } else {
                Ok(bytes.into_owned())
            }
        }
    }
}

#[test]
fn test_fourcc() {
    assert_eq!(1u32, fourcc(1u8, 0u8, 0u8, 0u8));
}

#[test]
fn test_trim_fixed_name() {
    assert_eq!(b"abc", trim_fixed_name(b"abc\0\xfd\xfd\0"));
    assert_eq!(b"ab", trim_fixed_name(b"ab\0garbage"));
    assert_eq!(b"", trim_fixed_name(b"\0\0\0"));
}

#[test]
fn test_decode_text_fallback_to_sjis() {
    let (sjis, _, _) = SHIFT_JIS.encode("センター");
    assert_eq!("センター", decode_text(&sjis, CodecType::Utf8));
    let utf16 = encode_utf16le("左腕");
    assert_eq!("左腕", decode_text(&utf16, CodecType::Utf16));
}

#[test]
fn test_encode_fixed_sjis_pads_and_truncates() {
    let encoded = encode_fixed_sjis("abc", 5).unwrap();
    assert_eq!(b"abc\0\0", encoded.as_slice());
    let encoded = encode_fixed_sjis("センター", 4).unwrap();
    assert_eq!(4, encoded.len());
    assert!(matches!(
        encode_fixed_sjis("🎵", 4),
        Err(MmdError::EncodeFailed { .. })
    ));
}
