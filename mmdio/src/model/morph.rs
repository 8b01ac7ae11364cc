use cgmath::{Quaternion, Vector3, Vector4};

use crate::{
    collection::{IndexModel, NameModel},
    common::{Buffer, MutableBuffer},
    error::{MmdError, Result, ResultExt},
};

use super::Info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MorphPanel {
    #[default]
    System,
    Eyebrow,
    Eye,
    Mouth,
    Other,
}

impl TryFrom<u8> for MorphPanel {
    type Error = MmdError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::System),
            1 => Ok(Self::Eyebrow),
            2 => Ok(Self::Eye),
            3 => Ok(Self::Mouth),
            4 => Ok(Self::Other),
            _ => Err(MmdError::UnknownEnum {
                field: "morph panel",
                value: value as i64,
            }),
        }
    }
}

impl From<MorphPanel> for u8 {
    fn from(value: MorphPanel) -> Self {
        value as u8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MorphType {
    Group,
    #[default]
    Vertex,
    Bone,
    Uv,
    ExtendedUv1,
    ExtendedUv2,
    ExtendedUv3,
    ExtendedUv4,
    Material,
}

impl TryFrom<u8> for MorphType {
    type Error = MmdError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Group),
            1 => Ok(Self::Vertex),
            2 => Ok(Self::Bone),
            3 => Ok(Self::Uv),
            4 => Ok(Self::ExtendedUv1),
            5 => Ok(Self::ExtendedUv2),
            6 => Ok(Self::ExtendedUv3),
            7 => Ok(Self::ExtendedUv4),
            8 => Ok(Self::Material),
            _ => Err(MmdError::UnknownEnum {
                field: "morph type",
                value: value as i64,
            }),
        }
    }
}

impl From<MorphType> for u8 {
    fn from(value: MorphType) -> Self {
        value as u8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MaterialCalcMode {
    #[default]
    Multiply,
    Add,
}

/// Payload of a single morph offset. The variant always matches the owning morph's type.
#[derive(Debug, Clone, PartialEq)]
pub enum MorphOffset {
    Group {
        morph_index: i32,
        factor: f32,
    },
    Vertex {
        vertex_index: i32,
        position: Vector3<f32>,
    },
    Bone {
        bone_index: i32,
        position: Vector3<f32>,
        rotation: Quaternion<f32>,
    },
    /// Shared by the UV and the four extended UV morph types.
    Uv {
        vertex_index: i32,
        uv: Vector4<f32>,
    },
    Material {
        /// `-1` applies to every material.
        material_index: i32,
        calc_mode: MaterialCalcMode,
        diffuse: Vector4<f32>,
        specular: Vector4<f32>,
        ambient: Vector3<f32>,
        edge: Vector4<f32>,
        edge_size: f32,
        texture_factor: Vector4<f32>,
        sphere_texture_factor: Vector4<f32>,
        toon_texture_factor: Vector4<f32>,
    },
}

impl MorphOffset {
    fn parse_pmx(info: &Info, buffer: &mut Buffer, morph_type: MorphType) -> Result<MorphOffset> {
        Ok(match morph_type {
            MorphType::Group => MorphOffset::Group {
                morph_index: buffer.read_integer_nullable(info.morph_index_size as usize)?,
                factor: buffer.read_f32_little_endian()?,
            },
            MorphType::Vertex => MorphOffset::Vertex {
                vertex_index: buffer.read_integer(info.vertex_index_size as usize)?,
                position: buffer.read_f32_3_little_endian()?,
            },
            MorphType::Bone => MorphOffset::Bone {
                bone_index: buffer.read_integer_nullable(info.bone_index_size as usize)?,
                position: buffer.read_f32_3_little_endian()?,
                rotation: buffer.read_quaternion_little_endian()?,
            },
            MorphType::Uv
            | MorphType::ExtendedUv1
            | MorphType::ExtendedUv2
            | MorphType::ExtendedUv3
            | MorphType::ExtendedUv4 => MorphOffset::Uv {
                vertex_index: buffer.read_integer(info.vertex_index_size as usize)?,
                uv: buffer.read_f32_4_little_endian()?,
            },
            MorphType::Material => MorphOffset::Material {
                material_index: buffer
                    .read_integer_nullable(info.material_index_size as usize)?,
                calc_mode: match buffer.read_byte()? {
                    0 => MaterialCalcMode::Multiply,
                    1 => MaterialCalcMode::Add,
                    value => {
                        return Err(MmdError::UnknownEnum {
                            field: "material calc mode",
                            value: value as i64,
                        })
                    }
                },
                diffuse: buffer.read_f32_4_little_endian()?,
                specular: buffer.read_f32_4_little_endian()?,
                ambient: buffer.read_f32_3_little_endian()?,
                edge: buffer.read_f32_4_little_endian()?,
                edge_size: buffer.read_f32_little_endian()?,
                texture_factor: buffer.read_f32_4_little_endian()?,
                sphere_texture_factor: buffer.read_f32_4_little_endian()?,
                toon_texture_factor: buffer.read_f32_4_little_endian()?,
            },
        })
    }

    fn save_to_buffer(&self, info: &Info, buffer: &mut MutableBuffer) -> Result<()> {
        match self {
            MorphOffset::Group {
                morph_index,
                factor,
            } => {
                buffer.write_integer(*morph_index, info.morph_index_size as usize)?;
                buffer.write_f32_little_endian(*factor)
            }
            MorphOffset::Vertex {
                vertex_index,
                position,
            } => {
                buffer.write_integer(*vertex_index, info.vertex_index_size as usize)?;
                buffer.write_f32_3_little_endian(*position)
            }
            MorphOffset::Bone {
                bone_index,
                position,
                rotation,
            } => {
                buffer.write_integer(*bone_index, info.bone_index_size as usize)?;
                buffer.write_f32_3_little_endian(*position)?;
                buffer.write_quaternion_little_endian(*rotation)
            }
            MorphOffset::Uv { vertex_index, uv } => {
                buffer.write_integer(*vertex_index, info.vertex_index_size as usize)?;
                buffer.write_f32_4_little_endian(*uv)
            }
            MorphOffset::Material {
                material_index,
                calc_mode,
                diffuse,
                specular,
                ambient,
                edge,
                edge_size,
                texture_factor,
                sphere_texture_factor,
                toon_texture_factor,
            } => {
                buffer.write_integer(*material_index, info.material_index_size as usize)?;
                buffer.write_byte(match calc_mode {
                    MaterialCalcMode::Multiply => 0,
                    MaterialCalcMode::Add => 1,
                })?;
                buffer.write_f32_4_little_endian(*diffuse)?;
                buffer.write_f32_4_little_endian(*specular)?;
                buffer.write_f32_3_little_endian(*ambient)?;
                buffer.write_f32_4_little_endian(*edge)?;
                buffer.write_f32_little_endian(*edge_size)?;
                buffer.write_f32_4_little_endian(*texture_factor)?;
                buffer.write_f32_4_little_endian(*sphere_texture_factor)?;
                buffer.write_f32_4_little_endian(*toon_texture_factor)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Morph {
    pub(crate) index: i32,
    pub name: String,
    pub english_name: String,
    pub panel: MorphPanel,
    pub morph_type: MorphType,
    pub offsets: Vec<MorphOffset>,
    pub display_slot: i32,
    pub is_system: bool,
}

impl Default for Morph {
    fn default() -> Self {
        Self {
            index: -1,
            name: String::new(),
            english_name: String::new(),
            panel: MorphPanel::default(),
            morph_type: MorphType::default(),
            offsets: vec![],
            display_slot: -1,
            is_system: false,
        }
    }
}

impl IndexModel for Morph {
    fn index(&self) -> i32 {
        self.index
    }

    fn set_index(&mut self, index: i32) {
        self.index = index;
    }
}

impl NameModel for Morph {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: String) {
        self.name = name;
    }
}

impl Morph {
    const ENTITY: &'static str = "morph";

    pub fn new(name: &str, morph_type: MorphType) -> Self {
        Self {
            name: name.to_owned(),
            morph_type,
            ..Default::default()
        }
    }

    pub(crate) fn parse_pmx(info: &Info, buffer: &mut Buffer, i: usize) -> Result<Morph> {
        let name = info.read_text(buffer).context(Self::ENTITY, i, "name")?;
        let english_name = info
            .read_text(buffer)
            .context(Self::ENTITY, i, "english name")?;
        let panel = buffer
            .read_byte()
            .and_then(MorphPanel::try_from)
            .context(Self::ENTITY, i, "panel")?;
        let morph_type = buffer
            .read_byte()
            .and_then(MorphType::try_from)
            .context(Self::ENTITY, i, "type")?;
        let num_offsets = buffer.read_len().context(Self::ENTITY, i, "offset count")?;
        let mut offsets = Vec::with_capacity(num_offsets.min(buffer.remaining()));
        for _ in 0..num_offsets {
            offsets.push(
                MorphOffset::parse_pmx(info, buffer, morph_type)
                    .context(Self::ENTITY, i, "offset")?,
            );
        }
        log::trace!("morph {} {:?} with {} offsets", i, morph_type, offsets.len());
        Ok(Morph {
            index: i as i32,
            name,
            english_name,
            panel,
            morph_type,
            offsets,
            display_slot: -1,
            is_system: false,
        })
    }

    pub(crate) fn save_to_buffer(&self, info: &Info, buffer: &mut MutableBuffer) -> Result<()> {
        info.write_text(buffer, &self.name)?;
        info.write_text(buffer, &self.english_name)?;
        buffer.write_byte(self.panel.into())?;
        buffer.write_byte(self.morph_type.into())?;
        buffer.write_len(self.offsets.len())?;
        for offset in &self.offsets {
            offset.save_to_buffer(info, buffer)?;
        }
        Ok(())
    }
}

#[test]
fn test_bone_and_group_offsets() {
    let info = Info::default();
    let mut buffer = MutableBuffer::create().unwrap();
    let bone_morph = Morph {
        name: "あ".to_owned(),
        panel: MorphPanel::Mouth,
        morph_type: MorphType::Bone,
        offsets: vec![MorphOffset::Bone {
            bone_index: 2,
            position: Vector3::new(0f32, 1f32, 0f32),
            rotation: Quaternion::new(1f32, 0f32, 0f32, 0f32),
        }],
        ..Morph::new("", MorphType::Bone)
    };
    let group_morph = Morph {
        offsets: vec![MorphOffset::Group {
            morph_index: 0,
            factor: 0.5f32,
        }],
        ..Morph::new("まとめ", MorphType::Group)
    };
    bone_morph.save_to_buffer(&info, &mut buffer).unwrap();
    group_morph.save_to_buffer(&info, &mut buffer).unwrap();
    let bytes = buffer.into_bytes();
    let mut reader = Buffer::create(&bytes);
    let parsed = Morph::parse_pmx(&info, &mut reader, 0).unwrap();
    assert_eq!(bone_morph.offsets, parsed.offsets);
    assert_eq!(MorphPanel::Mouth, parsed.panel);
    let parsed = Morph::parse_pmx(&info, &mut reader, 1).unwrap();
    assert_eq!(MorphType::Group, parsed.morph_type);
    assert_eq!(group_morph.offsets, parsed.offsets);
    assert!(reader.is_end());
}

#[test]
fn test_unknown_morph_type() {
    let info = Info::default();
    let bytes = [0u8, 0, 0, 0, 0, 0, 0, 0, 1, 42];
    let err = Morph::parse_pmx(&info, &mut Buffer::create(&bytes), 7).unwrap_err();
    assert!(matches!(
        err.root(),
        MmdError::UnknownEnum {
            field: "morph type",
            value: 42
        }
    ));
}

#[test]
fn test_default_morph_is_detached() {
    let morph = Morph::default();
    assert_eq!(-1, morph.index());
    assert_eq!(-1, morph.display_slot);
    assert_eq!(-1, Morph::new("まばたき", MorphType::Vertex).index());
}
