use cgmath::{Vector3, Vector4, Zero};

use crate::{
    collection::{IndexModel, NameModel},
    common::{Buffer, MutableBuffer},
    error::{MmdError, Result, ResultExt},
};

use super::Info;

bitflags::bitflags! {
    #[repr(transparent)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DrawFlags: u8 {
        const DOUBLE_SIDED_DRAWING = 1 << 0;
        const GROUND_SHADOW = 1 << 1;
        const DRAWING_ON_SELF_SHADOW_MAPS = 1 << 2;
        const DRAWING_SELF_SHADOWS = 1 << 3;
        const DRAWING_EDGE = 1 << 4;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SphereMode {
    #[default]
    None,
    Multiply,
    Add,
    SubTexture,
}

impl TryFrom<u8> for SphereMode {
    type Error = MmdError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 | 0xff => Ok(Self::None),
            1 => Ok(Self::Multiply),
            2 => Ok(Self::Add),
            3 => Ok(Self::SubTexture),
            _ => Err(MmdError::UnknownEnum {
                field: "sphere mode",
                value: value as i64,
            }),
        }
    }
}

impl From<SphereMode> for u8 {
    fn from(value: SphereMode) -> Self {
        match value {
            SphereMode::None => 0,
            SphereMode::Multiply => 1,
            SphereMode::Add => 2,
            SphereMode::SubTexture => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ToonSharing {
    #[default]
    Individual,
    /// The toon index addresses one of the ten built-in `toon01.bmp`..`toon10.bmp`.
    Shared,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub(crate) index: i32,
    pub name: String,
    pub english_name: String,
    pub diffuse: Vector4<f32>,
    /// RGB plus specular power in `w`.
    pub specular: Vector4<f32>,
    pub ambient: Vector3<f32>,
    pub draw_flags: DrawFlags,
    pub edge: Vector4<f32>,
    pub edge_size: f32,
    pub texture_index: i32,
    pub sphere_texture_index: i32,
    pub sphere_mode: SphereMode,
    pub toon_sharing: ToonSharing,
    pub toon_texture_index: i32,
    pub memo: String,
    /// Number of face vertices drawn by this material, always a multiple of three.
    pub vertex_count: i32,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            index: -1,
            name: String::new(),
            english_name: String::new(),
            diffuse: Vector4::zero(),
            specular: Vector4::zero(),
            ambient: Vector3::zero(),
            draw_flags: DrawFlags::empty(),
            edge: Vector4::zero(),
            edge_size: 0f32,
            texture_index: -1,
            sphere_texture_index: -1,
            sphere_mode: SphereMode::None,
            toon_sharing: ToonSharing::Individual,
            toon_texture_index: -1,
            memo: String::new(),
            vertex_count: 0,
        }
    }
}

impl IndexModel for Material {
    fn index(&self) -> i32 {
        self.index
    }

    fn set_index(&mut self, index: i32) {
        self.index = index;
    }
}

impl NameModel for Material {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: String) {
        self.name = name;
    }
}

impl Material {
    const ENTITY: &'static str = "material";

    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            ..Default::default()
        }
    }

    pub fn specular_power(&self) -> f32 {
        self.specular.w
    }

    pub fn face_count(&self) -> usize {
        (self.vertex_count.max(0) / 3) as usize
    }

    pub(crate) fn parse_pmx(info: &Info, buffer: &mut Buffer, i: usize) -> Result<Material> {
        let texture_size = info.texture_index_size as usize;
        let name = info.read_text(buffer).context(Self::ENTITY, i, "name")?;
        let english_name = info
            .read_text(buffer)
            .context(Self::ENTITY, i, "english name")?;
        let diffuse = buffer
            .read_f32_4_little_endian()
            .context(Self::ENTITY, i, "diffuse")?;
        let specular = buffer
            .read_f32_4_little_endian()
            .context(Self::ENTITY, i, "specular")?;
        let ambient = buffer
            .read_f32_3_little_endian()
            .context(Self::ENTITY, i, "ambient")?;
        let draw_flags = DrawFlags::from_bits_retain(
            buffer.read_byte().context(Self::ENTITY, i, "draw flags")?,
        );
        let edge = buffer
            .read_f32_4_little_endian()
            .context(Self::ENTITY, i, "edge color")?;
        let edge_size = buffer
            .read_f32_little_endian()
            .context(Self::ENTITY, i, "edge size")?;
        let texture_index = buffer
            .read_integer_nullable(texture_size)
            .context(Self::ENTITY, i, "texture index")?;
        let sphere_texture_index = buffer
            .read_integer_nullable(texture_size)
            .context(Self::ENTITY, i, "sphere texture index")?;
        let sphere_mode = buffer
            .read_byte()
            .and_then(SphereMode::try_from)
            .context(Self::ENTITY, i, "sphere mode")?;
        let (toon_sharing, toon_texture_index) =
            match buffer.read_byte().context(Self::ENTITY, i, "toon sharing")? {
                0 => (
                    ToonSharing::Individual,
                    buffer
                        .read_integer_nullable(texture_size)
                        .context(Self::ENTITY, i, "toon texture index")?,
                ),
                1 => (
                    ToonSharing::Shared,
                    buffer
                        .read_byte()
                        .context(Self::ENTITY, i, "toon texture index")?
                        as i32,
                ),
                value => {
                    return Err(MmdError::UnknownEnum {
                        field: "toon sharing",
                        value: value as i64,
                    }
                    .corrupted(Self::ENTITY, i, "toon sharing"))
                }
            };
        let memo = info.read_text(buffer).context(Self::ENTITY, i, "memo")?;
        let vertex_count = buffer
            .read_i32_little_endian()
            .context(Self::ENTITY, i, "vertex count")?;
        Ok(Material {
            index: i as i32,
            name,
            english_name,
            diffuse,
            specular,
            ambient,
            draw_flags,
            edge,
            edge_size,
            texture_index,
            sphere_texture_index,
            sphere_mode,
            toon_sharing,
            toon_texture_index,
            memo,
            vertex_count,
        })
    }

    pub(crate) fn save_to_buffer(&self, info: &Info, buffer: &mut MutableBuffer) -> Result<()> {
        let texture_size = info.texture_index_size as usize;
        info.write_text(buffer, &self.name)?;
        info.write_text(buffer, &self.english_name)?;
        buffer.write_f32_4_little_endian(self.diffuse)?;
        buffer.write_f32_4_little_endian(self.specular)?;
        buffer.write_f32_3_little_endian(self.ambient)?;
        buffer.write_byte(self.draw_flags.bits())?;
        buffer.write_f32_4_little_endian(self.edge)?;
        buffer.write_f32_little_endian(self.edge_size)?;
        buffer.write_integer(self.texture_index, texture_size)?;
        buffer.write_integer(self.sphere_texture_index, texture_size)?;
        buffer.write_byte(self.sphere_mode.into())?;
        match self.toon_sharing {
            ToonSharing::Individual => {
                buffer.write_byte(0)?;
                buffer.write_integer(self.toon_texture_index, texture_size)?;
            }
            ToonSharing::Shared => {
                buffer.write_byte(1)?;
                buffer.write_byte(self.toon_texture_index.clamp(0, 9) as u8)?;
            }
        }
        info.write_text(buffer, &self.memo)?;
        buffer.write_i32_little_endian(self.vertex_count)
    }
}

#[test]
fn test_shared_toon_round_trip() {
    let info = Info::default();
    let material = Material {
        name: "肌".to_owned(),
        draw_flags: DrawFlags::DOUBLE_SIDED_DRAWING | DrawFlags::DRAWING_EDGE,
        sphere_mode: SphereMode::Add,
        toon_sharing: ToonSharing::Shared,
        toon_texture_index: 3,
        vertex_count: 6,
        ..Default::default()
    };
    let mut buffer = MutableBuffer::create().unwrap();
    material.save_to_buffer(&info, &mut buffer).unwrap();
    let bytes = buffer.into_bytes();
    let mut reader = Buffer::create(&bytes);
    let parsed = Material::parse_pmx(&info, &mut reader, 0).unwrap();
    assert_eq!("肌", parsed.name);
    assert_eq!(ToonSharing::Shared, parsed.toon_sharing);
    assert_eq!(3, parsed.toon_texture_index);
    assert_eq!(SphereMode::Add, parsed.sphere_mode);
    assert_eq!(2, parsed.face_count());
    assert!(parsed.draw_flags.contains(DrawFlags::DRAWING_EDGE));
}
