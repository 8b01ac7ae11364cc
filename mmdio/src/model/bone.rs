use cgmath::{InnerSpace, Matrix4, SquareMatrix, Vector3, Zero};

use crate::{
    collection::{IndexModel, NameModel},
    common::{Buffer, MutableBuffer},
    error::{Result, ResultExt},
};

use super::Info;

bitflags::bitflags! {
    #[repr(transparent)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BoneFlags: u16 {
        const TAIL_IS_BONE = 0x0001;
        const CAN_ROTATE = 0x0002;
        const CAN_TRANSLATE = 0x0004;
        const IS_VISIBLE = 0x0008;
        const CAN_MANIPULATE = 0x0010;
        const IS_IK = 0x0020;
        const IS_EXTERNAL_LOCAL = 0x0080;
        const IS_EXTERNAL_ROTATION = 0x0100;
        const IS_EXTERNAL_TRANSLATION = 0x0200;
        const HAS_FIXED_AXIS = 0x0400;
        const HAS_LOCAL_AXIS = 0x0800;
        const IS_AFTER_PHYSICS_DEFORM = 0x1000;
        const IS_EXTERNAL_PARENT_DEFORM = 0x2000;
    }
}

pub(crate) fn normalize_or_zero(v: Vector3<f32>) -> Vector3<f32> {
    if v.magnitude2() > 0f32 {
        v.normalize()
    } else {
        Vector3::zero()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IkLink {
    pub bone_index: i32,
    pub angle_limit: bool,
    /// Radians.
    pub min_angle_limit: Vector3<f32>,
    /// Radians.
    pub max_angle_limit: Vector3<f32>,
}

impl Default for IkLink {
    fn default() -> Self {
        Self {
            bone_index: -1,
            angle_limit: false,
            min_angle_limit: Vector3::zero(),
            max_angle_limit: Vector3::zero(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ik {
    pub bone_index: i32,
    pub loop_count: i32,
    /// Radians. One scalar on disk, applied to every axis.
    pub unit_rotation: f32,
    pub links: Vec<IkLink>,
}

impl Default for Ik {
    fn default() -> Self {
        Self {
            bone_index: -1,
            loop_count: 0,
            unit_rotation: 0f32,
            links: vec![],
        }
    }
}

impl Ik {
    pub fn unit_rotation_axes(&self) -> Vector3<f32> {
        Vector3::new(self.unit_rotation, self.unit_rotation, self.unit_rotation)
    }

    fn parse_pmx(info: &Info, buffer: &mut Buffer) -> Result<Ik> {
        let size = info.bone_index_size as usize;
        let bone_index = buffer.read_integer_nullable(size)?;
        let loop_count = buffer.read_i32_little_endian()?;
        let unit_rotation = buffer.read_f32_little_endian()?;
        let num_links = buffer.read_len()?;
        let mut links = Vec::with_capacity(num_links.min(buffer.remaining()));
        for _ in 0..num_links {
            let bone_index = buffer.read_integer_nullable(size)?;
            let angle_limit = buffer.read_bool()?;
            let (min_angle_limit, max_angle_limit) = if angle_limit {
                (
                    buffer.read_f32_3_little_endian()?,
                    buffer.read_f32_3_little_endian()?,
                )
            } else {
                (Vector3::zero(), Vector3::zero())
            };
            links.push(IkLink {
                bone_index,
                angle_limit,
                min_angle_limit,
                max_angle_limit,
            });
        }
        Ok(Ik {
            bone_index,
            loop_count,
            unit_rotation,
            links,
        })
    }

    fn save_to_buffer(&self, info: &Info, buffer: &mut MutableBuffer) -> Result<()> {
        let size = info.bone_index_size as usize;
        buffer.write_integer(self.bone_index, size)?;
        buffer.write_i32_little_endian(self.loop_count)?;
        buffer.write_f32_little_endian(self.unit_rotation)?;
        buffer.write_len(self.links.len())?;
        for link in &self.links {
            buffer.write_integer(link.bone_index, size)?;
            buffer.write_bool(link.angle_limit)?;
            if link.angle_limit {
                buffer.write_f32_3_little_endian(link.min_angle_limit)?;
                buffer.write_f32_3_little_endian(link.max_angle_limit)?;
            }
        }
        Ok(())
    }
}

/// Values derived by setup. Never serialized.
#[derive(Debug, Clone, PartialEq)]
pub struct BoneExtend {
    pub ik_link_bone_indexes: Vec<i32>,
    pub ik_target_bone_indexes: Vec<i32>,
    pub effective_bone_indexes: Vec<i32>,
    pub child_bone_indexes: Vec<i32>,
    /// Ancestors, root first.
    pub parent_bone_indexes: Vec<i32>,
    pub parent_bone_names: Vec<String>,
    pub relative_bone_indexes: Vec<i32>,
    /// Relative bones plus self, in deformation order.
    pub deform_bone_indexes: Vec<i32>,
    pub parent_relative_position: Vector3<f32>,
    pub child_relative_position: Vector3<f32>,
    pub local_axis: Vector3<f32>,
    pub normalized_fixed_axis: Vector3<f32>,
    pub normalized_local_axis_x: Vector3<f32>,
    pub normalized_local_axis_y: Vector3<f32>,
    pub normalized_local_axis_z: Vector3<f32>,
    pub offset_matrix: Matrix4<f32>,
    pub revert_offset_matrix: Matrix4<f32>,
    pub angle_limit: bool,
    pub min_angle_limit: Vector3<f32>,
    pub max_angle_limit: Vector3<f32>,
    /// `-1` for bones on the left side of the body.
    pub axis_sign: i32,
    pub rigid_body_index: Option<i32>,
}

impl Default for BoneExtend {
    fn default() -> Self {
        Self {
            ik_link_bone_indexes: vec![],
            ik_target_bone_indexes: vec![],
            effective_bone_indexes: vec![],
            child_bone_indexes: vec![],
            parent_bone_indexes: vec![],
            parent_bone_names: vec![],
            relative_bone_indexes: vec![],
            deform_bone_indexes: vec![],
            parent_relative_position: Vector3::zero(),
            child_relative_position: Vector3::zero(),
            local_axis: Vector3::unit_x(),
            normalized_fixed_axis: Vector3::zero(),
            normalized_local_axis_x: Vector3::zero(),
            normalized_local_axis_y: Vector3::zero(),
            normalized_local_axis_z: Vector3::zero(),
            offset_matrix: Matrix4::identity(),
            revert_offset_matrix: Matrix4::identity(),
            angle_limit: false,
            min_angle_limit: Vector3::zero(),
            max_angle_limit: Vector3::zero(),
            axis_sign: 1,
            rigid_body_index: None,
        }
    }
}

impl BoneExtend {
    pub(crate) fn clear_links(&mut self) {
        self.ik_link_bone_indexes.clear();
        self.ik_target_bone_indexes.clear();
        self.effective_bone_indexes.clear();
        self.child_bone_indexes.clear();
        self.parent_bone_indexes.clear();
        self.parent_bone_names.clear();
        self.relative_bone_indexes.clear();
        self.deform_bone_indexes.clear();
        self.axis_sign = 1;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Bone {
    pub(crate) index: i32,
    pub name: String,
    pub english_name: String,
    pub position: Vector3<f32>,
    pub parent_index: i32,
    pub layer: i32,
    pub flags: BoneFlags,
    /// Offset from `position`, used unless `TAIL_IS_BONE` is set.
    pub tail_position: Vector3<f32>,
    pub tail_index: i32,
    pub effect_index: i32,
    pub effect_factor: f32,
    pub fixed_axis: Vector3<f32>,
    pub local_axis_x: Vector3<f32>,
    pub local_axis_z: Vector3<f32>,
    pub effector_key: i32,
    pub ik: Option<Ik>,
    pub display_slot: i32,
    /// Helper bones added for computation. Dropped on save without system entities.
    pub is_system: bool,
    pub extend: BoneExtend,
}

impl Default for Bone {
    fn default() -> Self {
        Self {
            index: -1,
            name: String::new(),
            english_name: String::new(),
            position: Vector3::zero(),
            parent_index: -1,
            layer: 0,
            flags: BoneFlags::empty(),
            tail_position: Vector3::zero(),
            tail_index: -1,
            effect_index: -1,
            effect_factor: 0f32,
            fixed_axis: Vector3::zero(),
            local_axis_x: Vector3::zero(),
            local_axis_z: Vector3::zero(),
            effector_key: -1,
            ik: None,
            display_slot: -1,
            is_system: false,
            extend: BoneExtend::default(),
        }
    }
}

impl IndexModel for Bone {
    fn index(&self) -> i32 {
        self.index
    }

    fn set_index(&mut self, index: i32) {
        self.index = index;
    }
}

impl NameModel for Bone {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: String) {
        self.name = name;
    }
}

impl Bone {
    const ENTITY: &'static str = "bone";

    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            ..Default::default()
        }
    }

    pub fn is_tail_bone(&self) -> bool {
        self.flags.contains(BoneFlags::TAIL_IS_BONE)
    }

    pub fn can_rotate(&self) -> bool {
        self.flags.contains(BoneFlags::CAN_ROTATE)
    }

    pub fn can_translate(&self) -> bool {
        self.flags.contains(BoneFlags::CAN_TRANSLATE)
    }

    pub fn is_visible(&self) -> bool {
        self.flags.contains(BoneFlags::IS_VISIBLE)
    }

    pub fn can_manipulate(&self) -> bool {
        self.flags.contains(BoneFlags::CAN_MANIPULATE)
    }

    pub fn is_ik(&self) -> bool {
        self.flags.contains(BoneFlags::IS_IK)
    }

    pub fn is_effector_rotation(&self) -> bool {
        self.flags.contains(BoneFlags::IS_EXTERNAL_ROTATION)
    }

    pub fn is_effector_translation(&self) -> bool {
        self.flags.contains(BoneFlags::IS_EXTERNAL_TRANSLATION)
    }

    pub fn has_effector(&self) -> bool {
        self.is_effector_rotation() || self.is_effector_translation()
    }

    pub fn has_fixed_axis(&self) -> bool {
        self.flags.contains(BoneFlags::HAS_FIXED_AXIS)
    }

    pub fn has_local_axis(&self) -> bool {
        self.flags.contains(BoneFlags::HAS_LOCAL_AXIS)
    }

    pub fn is_after_physics_deform(&self) -> bool {
        self.flags.contains(BoneFlags::IS_AFTER_PHYSICS_DEFORM)
    }

    pub fn is_external_parent_deform(&self) -> bool {
        self.flags.contains(BoneFlags::IS_EXTERNAL_PARENT_DEFORM)
    }

    fn normalize_local_axis(&mut self, local_x: Vector3<f32>) {
        let x = normalize_or_zero(local_x);
        let y = x.cross(Vector3::new(0f32, 0f32, -1f32));
        let z = x.cross(y);
        self.extend.normalized_local_axis_x = x;
        self.extend.normalized_local_axis_y = y;
        self.extend.normalized_local_axis_z = z;
    }

    /// Axes and offset matrices from the already computed relative positions.
    pub(crate) fn setup_local_frame(&mut self) {
        self.extend.local_axis = normalize_or_zero(self.extend.child_relative_position);
        if self.has_fixed_axis() {
            self.extend.normalized_fixed_axis = normalize_or_zero(self.fixed_axis);
            self.normalize_local_axis(self.fixed_axis);
        } else {
            self.normalize_local_axis(self.extend.local_axis);
        }
        self.extend.offset_matrix = Matrix4::from_translation(-self.position);
        self.extend.revert_offset_matrix =
            Matrix4::from_translation(self.extend.parent_relative_position);
    }

    pub(crate) fn parse_pmx(info: &Info, buffer: &mut Buffer, i: usize) -> Result<Bone> {
        let size = info.bone_index_size as usize;
        let mut bone = Bone {
            index: i as i32,
            name: info.read_text(buffer).context(Self::ENTITY, i, "name")?,
            english_name: info
                .read_text(buffer)
                .context(Self::ENTITY, i, "english name")?,
            position: buffer
                .read_f32_3_little_endian()
                .context(Self::ENTITY, i, "position")?,
            parent_index: buffer
                .read_integer_nullable(size)
                .context(Self::ENTITY, i, "parent index")?,
            layer: buffer
                .read_i32_little_endian()
                .context(Self::ENTITY, i, "layer")?,
            flags: BoneFlags::from_bits_retain(
                buffer
                    .read_u16_little_endian()
                    .context(Self::ENTITY, i, "flags")?,
            ),
            ..Default::default()
        };
        if bone.is_tail_bone() {
            bone.tail_index = buffer
                .read_integer_nullable(size)
                .context(Self::ENTITY, i, "tail index")?;
        } else {
            bone.tail_position = buffer
                .read_f32_3_little_endian()
                .context(Self::ENTITY, i, "tail position")?;
        }
        if bone.has_effector() {
            bone.effect_index = buffer
                .read_integer_nullable(size)
                .context(Self::ENTITY, i, "effect index")?;
            bone.effect_factor = buffer
                .read_f32_little_endian()
                .context(Self::ENTITY, i, "effect factor")?;
        }
        if bone.has_fixed_axis() {
            bone.fixed_axis = buffer
                .read_f32_3_little_endian()
                .context(Self::ENTITY, i, "fixed axis")?;
        }
        if bone.has_local_axis() {
            bone.local_axis_x = buffer
                .read_f32_3_little_endian()
                .context(Self::ENTITY, i, "local axis x")?;
            bone.local_axis_z = buffer
                .read_f32_3_little_endian()
                .context(Self::ENTITY, i, "local axis z")?;
        }
        if bone.is_external_parent_deform() {
            bone.effector_key = buffer
                .read_i32_little_endian()
                .context(Self::ENTITY, i, "external parent key")?;
        }
        if bone.is_ik() {
            bone.ik = Some(Ik::parse_pmx(info, buffer).context(Self::ENTITY, i, "ik")?);
        }
        Ok(bone)
    }

    pub(crate) fn save_to_buffer(&self, info: &Info, buffer: &mut MutableBuffer) -> Result<()> {
        let size = info.bone_index_size as usize;
        info.write_text(buffer, &self.name)?;
        info.write_text(buffer, &self.english_name)?;
        buffer.write_f32_3_little_endian(self.position)?;
        buffer.write_integer(self.parent_index, size)?;
        buffer.write_i32_little_endian(self.layer)?;
        buffer.write_u16_little_endian(self.flags.bits())?;
        if self.is_tail_bone() {
            buffer.write_integer(self.tail_index, size)?;
        } else {
            buffer.write_f32_3_little_endian(self.tail_position)?;
        }
        if self.has_effector() {
            buffer.write_integer(self.effect_index, size)?;
            buffer.write_f32_little_endian(self.effect_factor)?;
        }
        if self.has_fixed_axis() {
            buffer.write_f32_3_little_endian(self.fixed_axis)?;
        }
        if self.has_local_axis() {
            buffer.write_f32_3_little_endian(self.local_axis_x)?;
            buffer.write_f32_3_little_endian(self.local_axis_z)?;
        }
        if self.is_external_parent_deform() {
            buffer.write_i32_little_endian(self.effector_key)?;
        }
        if self.is_ik() {
            self.ik
                .clone()
                .unwrap_or_default()
                .save_to_buffer(info, buffer)?;
        }
        Ok(())
    }
}

#[test]
fn test_ik_bone_round_trip() {
    let info = Info::default();
    let bone = Bone {
        name: "左足ＩＫ".to_owned(),
        flags: BoneFlags::CAN_ROTATE | BoneFlags::IS_IK | BoneFlags::TAIL_IS_BONE,
        tail_index: 3,
        ik: Some(Ik {
            bone_index: 2,
            loop_count: 40,
            unit_rotation: 2f32,
            links: vec![
                IkLink {
                    bone_index: 1,
                    angle_limit: true,
                    min_angle_limit: Vector3::new(-3.14f32, 0f32, 0f32),
                    max_angle_limit: Vector3::new(-0.01f32, 0f32, 0f32),
                },
                IkLink {
                    bone_index: 0,
                    ..Default::default()
                },
            ],
        }),
        ..Default::default()
    };
    let mut buffer = MutableBuffer::create().unwrap();
    bone.save_to_buffer(&info, &mut buffer).unwrap();
    let bytes = buffer.into_bytes();
    let mut reader = Buffer::create(&bytes);
    let parsed = Bone::parse_pmx(&info, &mut reader, 5).unwrap();
    assert!(reader.is_end());
    assert_eq!(5, parsed.index());
    assert_eq!(bone.ik, parsed.ik);
    assert_eq!(3, parsed.tail_index);
    assert_eq!(
        Vector3::new(2f32, 2f32, 2f32),
        parsed.ik.unwrap().unit_rotation_axes()
    );
}

#[test]
fn test_conditional_fields_follow_flags() {
    let info = Info::default();
    let bone = Bone {
        name: "腕捩".to_owned(),
        flags: BoneFlags::HAS_FIXED_AXIS | BoneFlags::IS_EXTERNAL_ROTATION,
        fixed_axis: Vector3::new(1f32, 0f32, 0f32),
        effect_index: 4,
        effect_factor: 0.5f32,
        tail_position: Vector3::new(0f32, 1f32, 0f32),
        ..Default::default()
    };
    let mut buffer = MutableBuffer::create().unwrap();
    bone.save_to_buffer(&info, &mut buffer).unwrap();
    let bytes = buffer.into_bytes();
    let parsed = Bone::parse_pmx(&info, &mut Buffer::create(&bytes), 0).unwrap();
    assert_eq!(4, parsed.effect_index);
    assert_eq!(0.5f32, parsed.effect_factor);
    assert_eq!(bone.fixed_axis, parsed.fixed_axis);
    assert_eq!(bone.tail_position, parsed.tail_position);
    assert!(parsed.ik.is_none());
}
