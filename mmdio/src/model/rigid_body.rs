use cgmath::{Vector3, Zero};

use crate::{
    collection::{IndexModel, NameModel},
    common::{Buffer, MutableBuffer},
    error::{MmdError, Result, ResultExt},
};

use super::Info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShapeType {
    #[default]
    Sphere,
    Box,
    Capsule,
}

impl TryFrom<u8> for ShapeType {
    type Error = MmdError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Sphere),
            1 => Ok(Self::Box),
            2 => Ok(Self::Capsule),
            _ => Err(MmdError::UnknownEnum {
                field: "rigid body shape",
                value: value as i64,
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PhysicsType {
    /// Follows its bone.
    #[default]
    Static,
    Dynamic,
    /// Simulated, with the bone position re-aligned afterwards.
    DynamicBone,
}

impl TryFrom<u8> for PhysicsType {
    type Error = MmdError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Static),
            1 => Ok(Self::Dynamic),
            2 => Ok(Self::DynamicBone),
            _ => Err(MmdError::UnknownEnum {
                field: "physics mode",
                value: value as i64,
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RigidBody {
    pub(crate) index: i32,
    pub name: String,
    pub english_name: String,
    /// `-1` for a body attached to no bone.
    pub bone_index: i32,
    pub collision_group: u8,
    pub non_collision_mask: u16,
    pub shape: ShapeType,
    pub size: Vector3<f32>,
    pub position: Vector3<f32>,
    /// Radians.
    pub rotation: Vector3<f32>,
    pub mass: f32,
    pub linear_damping: f32,
    pub angular_damping: f32,
    pub restitution: f32,
    pub friction: f32,
    pub physics_type: PhysicsType,
    /// Bone of the body on the other end of a joint, set by setup.
    pub jointed_bone_index: i32,
}

impl Default for RigidBody {
    fn default() -> Self {
        Self {
            index: -1,
            name: String::new(),
            english_name: String::new(),
            bone_index: -1,
            collision_group: 0,
            non_collision_mask: 0,
            shape: ShapeType::Sphere,
            size: Vector3::zero(),
            position: Vector3::zero(),
            rotation: Vector3::zero(),
            mass: 0f32,
            linear_damping: 0f32,
            angular_damping: 0f32,
            restitution: 0f32,
            friction: 0f32,
            physics_type: PhysicsType::Static,
            jointed_bone_index: -1,
        }
    }
}

impl IndexModel for RigidBody {
    fn index(&self) -> i32 {
        self.index
    }

    fn set_index(&mut self, index: i32) {
        self.index = index;
    }
}

impl NameModel for RigidBody {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: String) {
        self.name = name;
    }
}

impl RigidBody {
    const ENTITY: &'static str = "rigid body";

    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            ..Default::default()
        }
    }

    pub fn collides_with_group(&self, group: u8) -> bool {
        group < 16 && self.non_collision_mask & (1 << group) != 0
    }

    pub(crate) fn parse_pmx(info: &Info, buffer: &mut Buffer, i: usize) -> Result<RigidBody> {
        Ok(RigidBody {
            index: i as i32,
            name: info.read_text(buffer).context(Self::ENTITY, i, "name")?,
            english_name: info
                .read_text(buffer)
                .context(Self::ENTITY, i, "english name")?,
            bone_index: buffer
                .read_integer_nullable(info.bone_index_size as usize)
                .context(Self::ENTITY, i, "bone index")?,
            collision_group: buffer
                .read_byte()
                .context(Self::ENTITY, i, "collision group")?,
            non_collision_mask: buffer
                .read_u16_little_endian()
                .context(Self::ENTITY, i, "non collision mask")?,
            shape: buffer
                .read_byte()
                .and_then(ShapeType::try_from)
                .context(Self::ENTITY, i, "shape")?,
            size: buffer
                .read_f32_3_little_endian()
                .context(Self::ENTITY, i, "size")?,
            position: buffer
                .read_f32_3_little_endian()
                .context(Self::ENTITY, i, "position")?,
            rotation: buffer
                .read_f32_3_little_endian()
                .context(Self::ENTITY, i, "rotation")?,
            mass: buffer
                .read_f32_little_endian()
                .context(Self::ENTITY, i, "mass")?,
            linear_damping: buffer
                .read_f32_little_endian()
                .context(Self::ENTITY, i, "linear damping")?,
            angular_damping: buffer
                .read_f32_little_endian()
                .context(Self::ENTITY, i, "angular damping")?,
            restitution: buffer
                .read_f32_little_endian()
                .context(Self::ENTITY, i, "restitution")?,
            friction: buffer
                .read_f32_little_endian()
                .context(Self::ENTITY, i, "friction")?,
            physics_type: buffer
                .read_byte()
                .and_then(PhysicsType::try_from)
                .context(Self::ENTITY, i, "physics mode")?,
            jointed_bone_index: -1,
        })
    }

    pub(crate) fn save_to_buffer(&self, info: &Info, buffer: &mut MutableBuffer) -> Result<()> {
        info.write_text(buffer, &self.name)?;
        info.write_text(buffer, &self.english_name)?;
        buffer.write_integer(self.bone_index, info.bone_index_size as usize)?;
        buffer.write_byte(self.collision_group)?;
        buffer.write_u16_little_endian(self.non_collision_mask)?;
        buffer.write_byte(self.shape as u8)?;
        buffer.write_f32_3_little_endian(self.size)?;
        buffer.write_f32_3_little_endian(self.position)?;
        buffer.write_f32_3_little_endian(self.rotation)?;
        buffer.write_f32_little_endian(self.mass)?;
        buffer.write_f32_little_endian(self.linear_damping)?;
        buffer.write_f32_little_endian(self.angular_damping)?;
        buffer.write_f32_little_endian(self.restitution)?;
        buffer.write_f32_little_endian(self.friction)?;
        buffer.write_byte(self.physics_type as u8)
    }
}

#[test]
fn test_rigid_body_round_trip() {
    let info = Info::default();
    let body = RigidBody {
        bone_index: 3,
        collision_group: 2,
        non_collision_mask: 0xfffe,
        shape: ShapeType::Capsule,
        size: Vector3::new(1f32, 2f32, 0f32),
        mass: 1f32,
        physics_type: PhysicsType::DynamicBone,
        ..RigidBody::new("髪")
    };
    let mut buffer = MutableBuffer::create().unwrap();
    body.save_to_buffer(&info, &mut buffer).unwrap();
    let bytes = buffer.into_bytes();
    let parsed = RigidBody::parse_pmx(&info, &mut Buffer::create(&bytes), 0).unwrap();
    assert_eq!(ShapeType::Capsule, parsed.shape);
    assert_eq!(PhysicsType::DynamicBone, parsed.physics_type);
    assert_eq!(0xfffe, parsed.non_collision_mask);
    assert!(parsed.collides_with_group(1));
    assert!(!parsed.collides_with_group(0));
}
