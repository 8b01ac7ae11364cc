use cgmath::{Quaternion, Vector3, Zero};

use crate::{
    common::{Buffer, MutableBuffer},
    error::{Result, ResultExt},
    utils::{encode_fixed_sjis, u8_slice_get_string, CodecType},
};

use super::track::Keyframe;

pub(crate) const BONE_NAME_LENGTH: usize = 15;
pub(crate) const IK_NAME_LENGTH: usize = 20;

/// Handle pattern MMD writes for linear interpolation.
const IDENTITY_CURVE: [u8; 4] = [20, 20, 107, 107];

fn read_name(buffer: &mut Buffer, length: usize) -> Result<String> {
    Ok(u8_slice_get_string(
        buffer.read_buffer(length)?,
        CodecType::Sjis,
    ))
}

fn write_name(buffer: &mut MutableBuffer, name: &str, length: usize) -> Result<()> {
    buffer.write_byte_array(&encode_fixed_sjis(name, length)?)
}

/// Raw 64-byte Hermite block of a bone frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoneCurves([u8; 64]);

impl Default for BoneCurves {
    fn default() -> Self {
        let mut raw = [0u8; 64];
        for chunk in raw.chunks_exact_mut(4) {
            chunk.copy_from_slice(&IDENTITY_CURVE);
        }
        Self(raw)
    }
}

impl BoneCurves {
    pub const TRANSLATION_X: usize = 0;
    pub const TRANSLATION_Y: usize = 1;
    pub const TRANSLATION_Z: usize = 2;
    pub const ROTATION: usize = 3;

    pub fn new(raw: [u8; 64]) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> &[u8; 64] {
        &self.0
    }

    /// `(x1, y1, x2, y2)` handles of `axis`, one of the four channel constants.
    pub fn axis(&self, axis: usize) -> [u8; 4] {
        let a = axis.min(3);
        [self.0[a], self.0[4 + a], self.0[8 + a], self.0[12 + a]]
    }

    pub fn translation_x(&self) -> [u8; 4] {
        self.axis(Self::TRANSLATION_X)
    }

    pub fn translation_y(&self) -> [u8; 4] {
        self.axis(Self::TRANSLATION_Y)
    }

    pub fn translation_z(&self) -> [u8; 4] {
        self.axis(Self::TRANSLATION_Z)
    }

    pub fn rotation(&self) -> [u8; 4] {
        self.axis(Self::ROTATION)
    }
}

/// Raw 24-byte Hermite block of a camera frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CameraCurves([u8; 24]);

impl Default for CameraCurves {
    fn default() -> Self {
        let mut raw = [0u8; 24];
        for (i, value) in raw.iter_mut().enumerate() {
            *value = IDENTITY_CURVE[i / 6];
        }
        Self(raw)
    }
}

impl CameraCurves {
    pub const LOOK_AT_X: usize = 0;
    pub const LOOK_AT_Y: usize = 1;
    pub const LOOK_AT_Z: usize = 2;
    pub const ANGLE: usize = 3;
    pub const DISTANCE: usize = 4;
    pub const FOV: usize = 5;

    pub fn new(raw: [u8; 24]) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> &[u8; 24] {
        &self.0
    }

    pub fn channel(&self, channel: usize) -> [u8; 4] {
        let c = channel.min(5);
        [self.0[c], self.0[6 + c], self.0[12 + c], self.0[18 + c]]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoneFrame {
    pub frame_index: u32,
    pub position: Vector3<f32>,
    pub rotation: Quaternion<f32>,
    pub curves: BoneCurves,
}

impl Default for BoneFrame {
    fn default() -> Self {
        Self {
            frame_index: 0,
            position: Vector3::zero(),
            rotation: Quaternion::new(1f32, 0f32, 0f32, 0f32),
            curves: BoneCurves::default(),
        }
    }
}

impl Keyframe for BoneFrame {
    fn frame_index(&self) -> u32 {
        self.frame_index
    }
}

impl BoneFrame {
    const ENTITY: &'static str = "bone frame";

    pub fn new(frame_index: u32) -> Self {
        Self {
            frame_index,
            ..Default::default()
        }
    }

    pub(crate) fn parse_vmd(buffer: &mut Buffer, i: usize) -> Result<(String, BoneFrame)> {
        let name = read_name(buffer, BONE_NAME_LENGTH).context(Self::ENTITY, i, "name")?;
        Ok((
            name,
            BoneFrame {
                frame_index: buffer
                    .read_u32_little_endian()
                    .context(Self::ENTITY, i, "frame index")?,
                position: buffer
                    .read_f32_3_little_endian()
                    .context(Self::ENTITY, i, "position")?,
                rotation: buffer
                    .read_quaternion_little_endian()
                    .context(Self::ENTITY, i, "rotation")?,
                curves: BoneCurves(
                    buffer
                        .read_fixed_array::<64>()
                        .context(Self::ENTITY, i, "curves")?,
                ),
            },
        ))
    }

    pub(crate) fn save_to_buffer(&self, name: &str, buffer: &mut MutableBuffer) -> Result<()> {
        write_name(buffer, name, BONE_NAME_LENGTH)?;
        buffer.write_u32_little_endian(self.frame_index)?;
        buffer.write_f32_3_little_endian(self.position)?;
        buffer.write_quaternion_little_endian(self.rotation)?;
        buffer.write_byte_array(self.curves.raw())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MorphFrame {
    pub frame_index: u32,
    pub ratio: f32,
}

impl Keyframe for MorphFrame {
    fn frame_index(&self) -> u32 {
        self.frame_index
    }
}

impl MorphFrame {
    const ENTITY: &'static str = "morph frame";

    pub fn new(frame_index: u32, ratio: f32) -> Self {
        Self { frame_index, ratio }
    }

    pub(crate) fn parse_vmd(buffer: &mut Buffer, i: usize) -> Result<(String, MorphFrame)> {
        let name = read_name(buffer, BONE_NAME_LENGTH).context(Self::ENTITY, i, "name")?;
        Ok((
            name,
            MorphFrame {
                frame_index: buffer
                    .read_u32_little_endian()
                    .context(Self::ENTITY, i, "frame index")?,
                ratio: buffer
                    .read_f32_little_endian()
                    .context(Self::ENTITY, i, "ratio")?,
            },
        ))
    }

    pub(crate) fn save_to_buffer(&self, name: &str, buffer: &mut MutableBuffer) -> Result<()> {
        write_name(buffer, name, BONE_NAME_LENGTH)?;
        buffer.write_u32_little_endian(self.frame_index)?;
        buffer.write_f32_little_endian(self.ratio)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CameraFrame {
    pub frame_index: u32,
    /// Negative values put the camera in front of its target.
    pub distance: f32,
    pub position: Vector3<f32>,
    /// Euler angles in radians.
    pub rotation: Vector3<f32>,
    pub curves: CameraCurves,
    pub view_angle: u32,
    pub is_perspective_off: bool,
}

impl Default for CameraFrame {
    fn default() -> Self {
        Self {
            frame_index: 0,
            distance: -45f32,
            position: Vector3::new(0f32, 10f32, 0f32),
            rotation: Vector3::zero(),
            curves: CameraCurves::default(),
            view_angle: 30,
            is_perspective_off: false,
        }
    }
}

impl Keyframe for CameraFrame {
    fn frame_index(&self) -> u32 {
        self.frame_index
    }
}

impl CameraFrame {
    const ENTITY: &'static str = "camera frame";

    pub(crate) fn parse_vmd(buffer: &mut Buffer, i: usize) -> Result<CameraFrame> {
        Ok(CameraFrame {
            frame_index: buffer
                .read_u32_little_endian()
                .context(Self::ENTITY, i, "frame index")?,
            distance: buffer
                .read_f32_little_endian()
                .context(Self::ENTITY, i, "distance")?,
            position: buffer
                .read_f32_3_little_endian()
                .context(Self::ENTITY, i, "position")?,
            rotation: buffer
                .read_f32_3_little_endian()
                .context(Self::ENTITY, i, "rotation")?,
            curves: CameraCurves(
                buffer
                    .read_fixed_array::<24>()
                    .context(Self::ENTITY, i, "curves")?,
            ),
            view_angle: buffer
                .read_u32_little_endian()
                .context(Self::ENTITY, i, "view angle")?,
            is_perspective_off: buffer
                .read_bool()
                .context(Self::ENTITY, i, "perspective")?,
        })
    }

    pub(crate) fn save_to_buffer(&self, buffer: &mut MutableBuffer) -> Result<()> {
        buffer.write_u32_little_endian(self.frame_index)?;
        buffer.write_f32_little_endian(self.distance)?;
        buffer.write_f32_3_little_endian(self.position)?;
        buffer.write_f32_3_little_endian(self.rotation)?;
        buffer.write_byte_array(self.curves.raw())?;
        buffer.write_u32_little_endian(self.view_angle)?;
        buffer.write_bool(self.is_perspective_off)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightFrame {
    pub frame_index: u32,
    pub color: Vector3<f32>,
    pub position: Vector3<f32>,
}

impl Default for LightFrame {
    fn default() -> Self {
        Self {
            frame_index: 0,
            color: Vector3::new(0.6f32, 0.6f32, 0.6f32),
            position: Vector3::new(-0.5f32, -1f32, 0.5f32),
        }
    }
}

impl Keyframe for LightFrame {
    fn frame_index(&self) -> u32 {
        self.frame_index
    }
}

impl LightFrame {
    const ENTITY: &'static str = "light frame";

    pub(crate) fn parse_vmd(buffer: &mut Buffer, i: usize) -> Result<LightFrame> {
        Ok(LightFrame {
            frame_index: buffer
                .read_u32_little_endian()
                .context(Self::ENTITY, i, "frame index")?,
            color: buffer
                .read_f32_3_little_endian()
                .context(Self::ENTITY, i, "color")?,
            position: buffer
                .read_f32_3_little_endian()
                .context(Self::ENTITY, i, "position")?,
        })
    }

    pub(crate) fn save_to_buffer(&self, buffer: &mut MutableBuffer) -> Result<()> {
        buffer.write_u32_little_endian(self.frame_index)?;
        buffer.write_f32_3_little_endian(self.color)?;
        buffer.write_f32_3_little_endian(self.position)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShadowMode {
    Off,
    Mode1,
    Mode2,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowFrame {
    pub frame_index: u32,
    /// Kept verbatim; values beyond 2 exist in the wild.
    pub mode: u8,
    pub distance: f32,
}

impl Default for ShadowFrame {
    fn default() -> Self {
        Self {
            frame_index: 0,
            mode: 1,
            distance: 0.1f32,
        }
    }
}

impl Keyframe for ShadowFrame {
    fn frame_index(&self) -> u32 {
        self.frame_index
    }
}

impl ShadowFrame {
    const ENTITY: &'static str = "shadow frame";

    pub fn shadow_mode(&self) -> Option<ShadowMode> {
        match self.mode {
            0 => Some(ShadowMode::Off),
            1 => Some(ShadowMode::Mode1),
            2 => Some(ShadowMode::Mode2),
            _ => None,
        }
    }

    pub(crate) fn parse_vmd(buffer: &mut Buffer, i: usize) -> Result<ShadowFrame> {
        Ok(ShadowFrame {
            frame_index: buffer
                .read_u32_little_endian()
                .context(Self::ENTITY, i, "frame index")?,
            mode: buffer.read_byte().context(Self::ENTITY, i, "mode")?,
            distance: buffer
                .read_f32_little_endian()
                .context(Self::ENTITY, i, "distance")?,
        })
    }

    pub(crate) fn save_to_buffer(&self, buffer: &mut MutableBuffer) -> Result<()> {
        buffer.write_u32_little_endian(self.frame_index)?;
        buffer.write_byte(self.mode)?;
        buffer.write_f32_little_endian(self.distance)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IkEnabled {
    pub bone_name: String,
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IkFrame {
    pub frame_index: u32,
    pub visible: bool,
    pub iks: Vec<IkEnabled>,
}

impl Default for IkFrame {
    fn default() -> Self {
        Self {
            frame_index: 0,
            visible: true,
            iks: vec![],
        }
    }
}

impl Keyframe for IkFrame {
    fn frame_index(&self) -> u32 {
        self.frame_index
    }
}

impl IkFrame {
    const ENTITY: &'static str = "ik frame";

    pub fn is_enabled(&self, bone_name: &str) -> Option<bool> {
        self.iks
            .iter()
            .find(|ik| ik.bone_name == bone_name)
            .map(|ik| ik.enabled)
    }

    pub(crate) fn parse_vmd(buffer: &mut Buffer, i: usize) -> Result<IkFrame> {
        let frame_index = buffer
            .read_u32_little_endian()
            .context(Self::ENTITY, i, "frame index")?;
        let visible = buffer.read_bool().context(Self::ENTITY, i, "visible")?;
        let count = buffer
            .read_u32_little_endian()
            .context(Self::ENTITY, i, "ik count")? as usize;
        let mut iks = Vec::with_capacity(count.min(buffer.remaining()));
        for _ in 0..count {
            iks.push(IkEnabled {
                bone_name: read_name(buffer, IK_NAME_LENGTH).context(Self::ENTITY, i, "ik name")?,
                enabled: buffer.read_bool().context(Self::ENTITY, i, "ik enabled")?,
            });
        }
        Ok(IkFrame {
            frame_index,
            visible,
            iks,
        })
    }

    pub(crate) fn save_to_buffer(&self, buffer: &mut MutableBuffer) -> Result<()> {
        buffer.write_u32_little_endian(self.frame_index)?;
        buffer.write_bool(self.visible)?;
        buffer.write_u32_little_endian(self.iks.len() as u32)?;
        for ik in &self.iks {
            write_name(buffer, &ik.bone_name, IK_NAME_LENGTH)?;
            buffer.write_bool(ik.enabled)?;
        }
        Ok(())
    }
}

#[test]
fn test_default_bone_curve_is_identity_pattern() {
    let frame = BoneFrame::new(3);
    let mut buffer = MutableBuffer::create().unwrap();
    frame.save_to_buffer("センター", &mut buffer).unwrap();
    let bytes = buffer.into_bytes();
    assert_eq!(15 + 4 + 12 + 16 + 64, bytes.len());
    let curve = &bytes[bytes.len() - 64..];
    for chunk in curve.chunks(4) {
        assert_eq!(&[20, 20, 107, 107], chunk);
    }
}

#[test]
fn test_bone_curve_views() {
    let mut raw = [0u8; 64];
    for (i, value) in raw.iter_mut().enumerate() {
        *value = i as u8;
    }
    let curves = BoneCurves::new(raw);
    assert_eq!([0, 4, 8, 12], curves.translation_x());
    assert_eq!([3, 7, 11, 15], curves.rotation());
    assert_eq!(&raw, curves.raw());
    let mut raw = [0u8; 24];
    for (i, value) in raw.iter_mut().enumerate() {
        *value = i as u8;
    }
    let curves = CameraCurves::new(raw);
    assert_eq!([5, 11, 17, 23], curves.channel(CameraCurves::FOV));
}

#[test]
fn test_bone_frame_round_trip_keeps_raw_curves() {
    let mut raw = [0u8; 64];
    raw[17] = 99;
    let frame = BoneFrame {
        frame_index: 42,
        position: Vector3::new(1f32, 2f32, 3f32),
        rotation: Quaternion::new(0.5f32, 0.5f32, 0.5f32, 0.5f32),
        curves: BoneCurves::new(raw),
    };
    let mut buffer = MutableBuffer::create().unwrap();
    frame.save_to_buffer("左腕", &mut buffer).unwrap();
    let bytes = buffer.into_bytes();
    let (name, parsed) = BoneFrame::parse_vmd(&mut Buffer::create(&bytes), 0).unwrap();
    assert_eq!("左腕", name);
    assert_eq!(frame, parsed);
}

#[test]
fn test_ik_frame_round_trip() {
    let frame = IkFrame {
        frame_index: 7,
        visible: false,
        iks: vec![
            IkEnabled {
                bone_name: "左足ＩＫ".to_owned(),
                enabled: false,
            },
            IkEnabled {
                bone_name: "右足ＩＫ".to_owned(),
                enabled: true,
            },
        ],
    };
    let mut buffer = MutableBuffer::create().unwrap();
    frame.save_to_buffer(&mut buffer).unwrap();
    let bytes = buffer.into_bytes();
    assert_eq!(4 + 1 + 4 + 2 * 21, bytes.len());
    let parsed = IkFrame::parse_vmd(&mut Buffer::create(&bytes), 0).unwrap();
    assert_eq!(frame, parsed);
    assert_eq!(Some(false), parsed.is_enabled("左足ＩＫ"));
}
