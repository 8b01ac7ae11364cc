use cgmath::{Quaternion, Vector3};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::{
    error::{MmdError, Result},
    motion::{BoneFrame, Motion},
    utils::{decode_text, CodecType},
};

static SIGNATURE: Lazy<Regex> = Lazy::new(|| pattern(r"Vocaloid Pose Data file"));
static MODEL_NAME: Lazy<Regex> = Lazy::new(|| pattern(r"^(.*)\.osm;.*// 親ファイル名"));
static BONE_START: Lazy<Regex> = Lazy::new(|| pattern(r"\{(.*)$"));
static BONE_POSITION: Lazy<Regex> = Lazy::new(|| {
    pattern(r"([+-]?\d+(?:\.\d+)?),([+-]?\d+(?:\.\d+)?),([+-]?\d+(?:\.\d+)?);.*trans")
});
static BONE_ROTATION: Lazy<Regex> = Lazy::new(|| {
    pattern(
        r"([+-]?\d+(?:\.\d+)?),([+-]?\d+(?:\.\d+)?),([+-]?\d+(?:\.\d+)?),([+-]?\d+(?:\.\d+)?);.*Quaternion",
    )
});

fn pattern(source: &str) -> Regex {
    Regex::new(source).expect("compiling regex")
}

fn decode_lines(bytes: &[u8]) -> Vec<String> {
    decode_text(bytes, CodecType::Sjis)
        .lines()
        .map(|line| line.replace('\t', "    "))
        .collect()
}

fn parse_f32(captures: &regex::Captures, i: usize) -> f32 {
    captures
        .get(i)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or_default()
}

fn parse_header(lines: &[String]) -> Result<String> {
    match lines.first() {
        Some(line) if SIGNATURE.is_match(line) => {}
        other => {
            return Err(MmdError::InvalidSignature {
                saw: other.cloned().unwrap_or_default(),
            })
        }
    }
    Ok(lines
        .iter()
        .take_while(|line| !BONE_START.is_match(line))
        .find_map(|line| MODEL_NAME.captures(line.trim()))
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str().to_owned())
        .unwrap_or_default())
}

/// Reads the model name from the header lines of a Shift-JIS pose file.
pub fn load_name(bytes: &[u8]) -> Result<String> {
    parse_header(&decode_lines(bytes))
}

/// Parses a pose into a motion holding one registered frame 0 per bone.
pub fn load_from_bytes(bytes: &[u8]) -> Result<Motion> {
    let lines = decode_lines(bytes);
    let mut motion = Motion::new(&parse_header(&lines)?);
    let mut current: Option<(String, BoneFrame)> = None;
    for line in &lines {
        if let Some(captures) = BONE_START.captures(line) {
            let name = captures.get(1).map(|m| m.as_str().trim()).unwrap_or("");
            current = Some((name.to_owned(), BoneFrame::new(0)));
        } else if let Some(captures) = BONE_POSITION.captures(line) {
            if let Some((_, frame)) = current.as_mut() {
                frame.position = Vector3::new(
                    parse_f32(&captures, 1),
                    parse_f32(&captures, 2),
                    parse_f32(&captures, 3),
                );
            }
        } else if let Some(captures) = BONE_ROTATION.captures(line) {
            if let Some((name, mut frame)) = current.take() {
                frame.rotation = Quaternion::new(
                    parse_f32(&captures, 4),
                    parse_f32(&captures, 1),
                    parse_f32(&captures, 2),
                    parse_f32(&captures, 3),
                );
                log::trace!("pose bone {}", name);
                motion.append_bone_frame(&name, frame);
            }
        }
    }
    log::debug!(
        "VPD {}: {} bones",
        motion.name,
        motion.bones.registered_len()
    );
    Ok(motion)
}

#[cfg(test)]
mod tests {
    use super::*;

    const POSE: &str = "Vocaloid Pose Data file\r\n\
\r\n\
miku.osm;\t\t// 親ファイル名\r\n\
2;\t\t\t\t// 総ポーズボーン数\r\n\
\r\n\
Bone0{センター\r\n\
  0.500000,-1.000000,2.000000;\t\t\t\t// trans x,y,z\r\n\
  0.000000,0.000000,0.000000,1.000000;\t\t// Quaternion x,y,z,w\r\n\
}\r\n\
\r\n\
Bone1{左腕\r\n\
  0.000000,0.000000,0.000000;\t\t\t\t// trans x,y,z\r\n\
  0.1,0.2,0.3,0.9;\t\t// Quaternion x,y,z,w\r\n\
}\r\n";

    fn sjis(text: &str) -> Vec<u8> {
        encoding_rs::SHIFT_JIS.encode(text).0.into_owned()
    }

    #[test]
    fn test_load_pose() {
        let motion = load_from_bytes(&sjis(POSE)).unwrap();
        assert_eq!("miku", motion.name);
        assert_eq!(vec!["センター", "左腕"], motion.bone_names());
        let center = motion.bone_frames("センター").next().unwrap();
        assert_eq!(0, center.frame_index);
        assert_eq!(Vector3::new(0.5f32, -1f32, 2f32), center.position);
        assert_eq!(Quaternion::new(1f32, 0f32, 0f32, 0f32), center.rotation);
        let arm = motion.bone_frames("左腕").next().unwrap();
        assert_eq!(Quaternion::new(0.9f32, 0.1f32, 0.2f32, 0.3f32), arm.rotation);
    }

    #[test]
    fn test_load_name_and_signature() {
        assert_eq!("miku", load_name(&sjis(POSE)).unwrap());
        assert!(matches!(
            load_name(b"Vocaloid Motion Data 0002"),
            Err(MmdError::InvalidSignature { .. })
        ));
        assert!(load_name(b"").is_err());
    }
}
