use cgmath::{Vector3, Zero};

use crate::{
    collection::{IndexModel, NameModel},
    common::{Buffer, MutableBuffer},
    error::{MmdError, Result, ResultExt},
};

use super::Info;

/// Only the 6-DOF spring constraint (type `0`) exists in PMX 2.0 files.
pub const JOINT_TYPE_SPRING_6DOF: u8 = 0;

#[derive(Debug, Clone, PartialEq)]
pub struct Joint {
    pub(crate) index: i32,
    pub name: String,
    pub english_name: String,
    pub joint_type: u8,
    pub rigid_body_index_a: i32,
    pub rigid_body_index_b: i32,
    pub position: Vector3<f32>,
    /// Radians.
    pub rotation: Vector3<f32>,
    pub translation_limit_min: Vector3<f32>,
    pub translation_limit_max: Vector3<f32>,
    pub rotation_limit_min: Vector3<f32>,
    pub rotation_limit_max: Vector3<f32>,
    pub spring_constant_translation: Vector3<f32>,
    pub spring_constant_rotation: Vector3<f32>,
}

impl Default for Joint {
    fn default() -> Self {
        Self {
            index: -1,
            name: String::new(),
            english_name: String::new(),
            joint_type: JOINT_TYPE_SPRING_6DOF,
            rigid_body_index_a: -1,
            rigid_body_index_b: -1,
            position: Vector3::zero(),
            rotation: Vector3::zero(),
            translation_limit_min: Vector3::zero(),
            translation_limit_max: Vector3::zero(),
            rotation_limit_min: Vector3::zero(),
            rotation_limit_max: Vector3::zero(),
            spring_constant_translation: Vector3::zero(),
            spring_constant_rotation: Vector3::zero(),
        }
    }
}

impl IndexModel for Joint {
    fn index(&self) -> i32 {
        self.index
    }

    fn set_index(&mut self, index: i32) {
        self.index = index;
    }
}

impl NameModel for Joint {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: String) {
        self.name = name;
    }
}

impl Joint {
    const ENTITY: &'static str = "joint";

    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            ..Default::default()
        }
    }

    pub(crate) fn parse_pmx(info: &Info, buffer: &mut Buffer, i: usize) -> Result<Joint> {
        let size = info.rigid_body_index_size as usize;
        let name = info.read_text(buffer).context(Self::ENTITY, i, "name")?;
        let english_name = info
            .read_text(buffer)
            .context(Self::ENTITY, i, "english name")?;
        let joint_type = buffer.read_byte().context(Self::ENTITY, i, "type")?;
        if joint_type != JOINT_TYPE_SPRING_6DOF {
            return Err(MmdError::UnknownEnum {
                field: "joint type",
                value: joint_type as i64,
            }
            .corrupted(Self::ENTITY, i, "type"));
        }
        let mut vectors = [Vector3::zero(); 8];
        let rigid_body_index_a = buffer
            .read_integer_nullable(size)
            .context(Self::ENTITY, i, "rigid body a")?;
        let rigid_body_index_b = buffer
            .read_integer_nullable(size)
            .context(Self::ENTITY, i, "rigid body b")?;
        for v in vectors.iter_mut() {
            *v = buffer
                .read_f32_3_little_endian()
                .context(Self::ENTITY, i, "parameters")?;
        }
        let [position, rotation, translation_limit_min, translation_limit_max, rotation_limit_min, rotation_limit_max, spring_constant_translation, spring_constant_rotation] =
            vectors;
        Ok(Joint {
            index: i as i32,
            name,
            english_name,
            joint_type,
            rigid_body_index_a,
            rigid_body_index_b,
            position,
            rotation,
            translation_limit_min,
            translation_limit_max,
            rotation_limit_min,
            rotation_limit_max,
            spring_constant_translation,
            spring_constant_rotation,
        })
    }

    pub(crate) fn save_to_buffer(&self, info: &Info, buffer: &mut MutableBuffer) -> Result<()> {
        let size = info.rigid_body_index_size as usize;
        info.write_text(buffer, &self.name)?;
        info.write_text(buffer, &self.english_name)?;
        buffer.write_byte(self.joint_type)?;
        buffer.write_integer(self.rigid_body_index_a, size)?;
        buffer.write_integer(self.rigid_body_index_b, size)?;
        for v in [
            self.position,
            self.rotation,
            self.translation_limit_min,
            self.translation_limit_max,
            self.rotation_limit_min,
            self.rotation_limit_max,
            self.spring_constant_translation,
            self.spring_constant_rotation,
        ] {
            buffer.write_f32_3_little_endian(v)?;
        }
        Ok(())
    }
}
