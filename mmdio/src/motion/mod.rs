mod keyframe;
mod track;

use crate::{
    common::{Buffer, MutableBuffer},
    config::SaveOptions,
    error::{MmdError, Result},
    utils::{encode_fixed_sjis, u8_slice_get_string, CodecType},
};

pub use self::{
    keyframe::{
        BoneCurves, BoneFrame, CameraCurves, CameraFrame, IkEnabled, IkFrame, LightFrame,
        MorphFrame, ShadowFrame, ShadowMode,
    },
    track::{Keyframe, MotionTrack, MotionTrackBundle},
};

const VMD_SIGNATURE_SIZE: usize = 30;
const VMD_SIGNATURE_TYPE2: &[u8] = b"Vocaloid Motion Data 0002\0";
const VMD_SIGNATURE_TYPE1: &[u8] = b"Vocaloid Motion Data file\0";
const VMD_TARGET_MODEL_NAME_LENGTH_V2: usize = 20;
const VMD_TARGET_MODEL_NAME_LENGTH_V1: usize = 10;

/// Channel names of the unnamed sections.
const CAMERA_TRACK: &str = "camera";
const LIGHT_TRACK: &str = "light";
const SHADOW_TRACK: &str = "shadow";
const IK_TRACK: &str = "ik";

#[derive(Debug, Clone)]
pub struct Motion {
    pub path: String,
    pub hash: String,
    /// Target model name.
    pub name: String,
    pub bones: MotionTrackBundle<BoneFrame>,
    pub morphs: MotionTrackBundle<MorphFrame>,
    pub cameras: MotionTrack<CameraFrame>,
    pub lights: MotionTrack<LightFrame>,
    pub shadows: MotionTrack<ShadowFrame>,
    pub iks: MotionTrack<IkFrame>,
}

impl Default for Motion {
    fn default() -> Self {
        Self {
            path: String::new(),
            hash: String::new(),
            name: String::new(),
            bones: MotionTrackBundle::new(),
            morphs: MotionTrackBundle::new(),
            cameras: MotionTrack::new(CAMERA_TRACK),
            lights: MotionTrack::new(LIGHT_TRACK),
            shadows: MotionTrack::new(SHADOW_TRACK),
            iks: MotionTrack::new(IK_TRACK),
        }
    }
}

fn read_count(buffer: &mut Buffer) -> Result<usize> {
    Ok(buffer.read_u32_little_endian()? as usize)
}

/// Reads one of the trailing sections. A section cut short keeps what was read.
fn parse_optional_block<K: Keyframe>(
    buffer: &mut Buffer,
    track: &mut MotionTrack<K>,
    parse: fn(&mut Buffer, usize) -> Result<K>,
) -> bool {
    if buffer.is_end() {
        return false;
    }
    let count = match read_count(buffer) {
        Ok(count) => count,
        Err(err) => {
            log::warn!("{} section header is truncated: {}", track.name, err);
            return false;
        }
    };
    for i in 0..count {
        match parse(buffer, i) {
            Ok(keyframe) => track.append(keyframe),
            Err(err) => {
                log::warn!(
                    "{} section stops at frame {} of {}: {}",
                    track.name,
                    i,
                    count,
                    err
                );
                return false;
            }
        }
    }
    log::debug!("{} {} frames", count, track.name);
    true
}

fn save_track<K: Keyframe>(
    buffer: &mut MutableBuffer,
    track: &MotionTrack<K>,
    save: fn(&K, &mut MutableBuffer) -> Result<()>,
) -> Result<()> {
    buffer.write_u32_little_endian(track.registered_len() as u32)?;
    for keyframe in track.iter() {
        save(keyframe, buffer)?;
    }
    Ok(())
}

impl Motion {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            ..Default::default()
        }
    }

    fn parse_header(buffer: &mut Buffer) -> Result<String> {
        let signature = buffer.read_buffer(VMD_SIGNATURE_SIZE)?;
        let name_length = if signature.starts_with(VMD_SIGNATURE_TYPE2) {
            VMD_TARGET_MODEL_NAME_LENGTH_V2
        } else if signature.starts_with(VMD_SIGNATURE_TYPE1) {
            VMD_TARGET_MODEL_NAME_LENGTH_V1
        } else {
            return Err(MmdError::InvalidSignature {
                saw: String::from_utf8_lossy(&signature[..VMD_SIGNATURE_TYPE2.len()])
                    .trim_end_matches('\0')
                    .to_owned(),
            });
        };
        Ok(u8_slice_get_string(
            buffer.read_buffer(name_length)?,
            CodecType::Sjis,
        ))
    }

    /// Reads the signature and the target model name only.
    pub fn load_name(buffer: &mut Buffer) -> Result<String> {
        Self::parse_header(buffer)
    }

    pub fn load_from_buffer(buffer: &mut Buffer) -> Result<Motion> {
        let mut motion = Motion::new(&Self::parse_header(buffer)?);
        let bone_count = read_count(buffer)?;
        for i in 0..bone_count {
            let (name, keyframe) = BoneFrame::parse_vmd(buffer, i)?;
            motion.bones.add_keyframe(&name, keyframe);
        }
        let morph_count = read_count(buffer)?;
        for i in 0..morph_count {
            let (name, keyframe) = MorphFrame::parse_vmd(buffer, i)?;
            motion.morphs.add_keyframe(&name, keyframe);
        }
        log::debug!(
            "VMD {}: {} bone frames on {} tracks, {} morph frames on {} tracks",
            motion.name,
            bone_count,
            motion.bones.len(),
            morph_count,
            motion.morphs.len()
        );
        let _ = parse_optional_block(buffer, &mut motion.cameras, CameraFrame::parse_vmd)
            && parse_optional_block(buffer, &mut motion.lights, LightFrame::parse_vmd)
            && parse_optional_block(buffer, &mut motion.shadows, ShadowFrame::parse_vmd)
            && parse_optional_block(buffer, &mut motion.iks, IkFrame::parse_vmd);
        if !buffer.is_end() {
            log::debug!("{} trailing bytes after the last section", buffer.remaining());
        }
        Ok(motion)
    }

    pub fn save_to_buffer(&self, buffer: &mut MutableBuffer, options: &SaveOptions) -> Result<()> {
        buffer.set_sanitize_non_finite(options.sanitize_non_finite);
        let mut signature = [0u8; VMD_SIGNATURE_SIZE];
        signature[..VMD_SIGNATURE_TYPE2.len()].copy_from_slice(VMD_SIGNATURE_TYPE2);
        buffer.write_byte_array(&signature)?;
        buffer.write_byte_array(&encode_fixed_sjis(
            &self.name,
            VMD_TARGET_MODEL_NAME_LENGTH_V2,
        )?)?;
        buffer.write_u32_little_endian(self.bones.registered_len() as u32)?;
        for track in self.bones.tracks() {
            for frame_index in track.max_first_order() {
                if let Some(keyframe) = track.get(frame_index) {
                    keyframe.save_to_buffer(&track.name, buffer)?;
                }
            }
        }
        buffer.write_u32_little_endian(self.morphs.registered_len() as u32)?;
        for track in self.morphs.tracks() {
            for keyframe in track.iter() {
                keyframe.save_to_buffer(&track.name, buffer)?;
            }
        }
        save_track(buffer, &self.cameras, CameraFrame::save_to_buffer)?;
        save_track(buffer, &self.lights, LightFrame::save_to_buffer)?;
        save_track(buffer, &self.shadows, ShadowFrame::save_to_buffer)?;
        save_track(buffer, &self.iks, IkFrame::save_to_buffer)?;
        log::debug!("saved motion {} ({} bytes)", self.name, buffer.len());
        Ok(())
    }

    /// Last registered frame over every channel.
    pub fn max_frame(&self) -> u32 {
        [
            self.bones.max_frame_index(),
            self.morphs.max_frame_index(),
            self.cameras.max_frame_index(),
            self.lights.max_frame_index(),
            self.shadows.max_frame_index(),
            self.iks.max_frame_index(),
        ]
        .into_iter()
        .flatten()
        .max()
        .unwrap_or(0)
    }

    pub fn min_frame(&self) -> u32 {
        [
            self.bones.min_frame_index(),
            self.morphs.min_frame_index(),
            self.cameras.min_frame_index(),
            self.lights.min_frame_index(),
            self.shadows.min_frame_index(),
            self.iks.min_frame_index(),
        ]
        .into_iter()
        .flatten()
        .min()
        .unwrap_or(0)
    }

    pub fn bone_names(&self) -> Vec<&str> {
        self.bones.names()
    }

    pub fn morph_names(&self) -> Vec<&str> {
        self.morphs.names()
    }

    pub fn append_bone_frame(&mut self, name: &str, keyframe: BoneFrame) {
        self.bones.add_keyframe(name, keyframe);
    }

    pub fn append_interpolated_bone_frame(&mut self, name: &str, keyframe: BoneFrame) {
        self.bones.add_interpolated_keyframe(name, keyframe);
    }

    pub fn append_morph_frame(&mut self, name: &str, keyframe: MorphFrame) {
        self.morphs.add_keyframe(name, keyframe);
    }

    /// Registered frames of one bone channel in frame order.
    pub fn bone_frames<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a BoneFrame> + 'a {
        self.bones
            .get_by_name(name)
            .into_iter()
            .flat_map(|track| track.iter())
    }

    pub fn morph_frames<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a MorphFrame> + 'a {
        self.morphs
            .get_by_name(name)
            .into_iter()
            .flat_map(|track| track.iter())
    }

    /// Registered frame count over every channel.
    pub fn frame_count(&self) -> usize {
        self.bones.registered_len()
            + self.morphs.registered_len()
            + self.cameras.registered_len()
            + self.lights.registered_len()
            + self.shadows.registered_len()
            + self.iks.registered_len()
    }
}
