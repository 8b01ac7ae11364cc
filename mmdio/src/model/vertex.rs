use cgmath::{Vector2, Vector3, Vector4, Zero};

use crate::{
    collection::IndexModel,
    common::{Buffer, MutableBuffer},
    error::{MmdError, Result, ResultExt},
};

use super::Info;

/// Skinning payload of a vertex.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Deform {
    Bdef1 {
        index: i32,
    },
    /// The second weight is implied as `1 - weight`.
    Bdef2 {
        indexes: [i32; 2],
        weight: f32,
    },
    /// Weights are kept as stored, normalized or not.
    Bdef4 {
        indexes: [i32; 4],
        weights: [f32; 4],
    },
    Sdef {
        indexes: [i32; 2],
        weight: f32,
        c: Vector3<f32>,
        r0: Vector3<f32>,
        r1: Vector3<f32>,
    },
}

impl Default for Deform {
    fn default() -> Self {
        Self::Bdef1 { index: 0 }
    }
}

impl Deform {
    pub fn kind(&self) -> u8 {
        match self {
            Deform::Bdef1 { .. } => 0,
            Deform::Bdef2 { .. } => 1,
            Deform::Bdef4 { .. } => 2,
            Deform::Sdef { .. } => 3,
        }
    }

    pub fn indexes(&self) -> &[i32] {
        match self {
            Deform::Bdef1 { index } => std::slice::from_ref(index),
            Deform::Bdef2 { indexes, .. } | Deform::Sdef { indexes, .. } => indexes,
            Deform::Bdef4 { indexes, .. } => indexes,
        }
    }

    /// Four bone indexes and four weights, unused slots zeroed.
    pub fn normalized(&self) -> ([i32; 4], [f32; 4]) {
        match *self {
            Deform::Bdef1 { index } => ([index, 0, 0, 0], [1.0, 0.0, 0.0, 0.0]),
            Deform::Bdef2 { indexes, weight } | Deform::Sdef { indexes, weight, .. } => (
                [indexes[0], indexes[1], 0, 0],
                [weight, 1.0 - weight, 0.0, 0.0],
            ),
            Deform::Bdef4 { indexes, weights } => (indexes, weights),
        }
    }

    fn parse_pmx(info: &Info, buffer: &mut Buffer, kind: u8) -> Result<Deform> {
        let size = info.bone_index_size as usize;
        Ok(match kind {
            0 => Deform::Bdef1 {
                index: buffer.read_integer_nullable(size)?,
            },
            1 => Deform::Bdef2 {
                indexes: [
                    buffer.read_integer_nullable(size)?,
                    buffer.read_integer_nullable(size)?,
                ],
                weight: buffer.read_f32_little_endian()?,
            },
            2 => {
                let mut indexes = [0i32; 4];
                for index in indexes.iter_mut() {
                    *index = buffer.read_integer_nullable(size)?;
                }
                let weights = buffer.read_f32_4_little_endian()?;
                Deform::Bdef4 {
                    indexes,
                    weights: weights.into(),
                }
            }
            3 => Deform::Sdef {
                indexes: [
                    buffer.read_integer_nullable(size)?,
                    buffer.read_integer_nullable(size)?,
                ],
                weight: buffer.read_f32_little_endian()?,
                c: buffer.read_f32_3_little_endian()?,
                r0: buffer.read_f32_3_little_endian()?,
                r1: buffer.read_f32_3_little_endian()?,
            },
            _ => {
                return Err(MmdError::UnknownEnum {
                    field: "deform type",
                    value: kind as i64,
                })
            }
        })
    }

    fn save_to_buffer(&self, info: &Info, buffer: &mut MutableBuffer) -> Result<()> {
        let size = info.bone_index_size as usize;
        buffer.write_byte(self.kind())?;
        for index in self.indexes() {
            buffer.write_integer(*index, size)?;
        }
        match self {
            Deform::Bdef1 { .. } => {}
            Deform::Bdef2 { weight, .. } => buffer.write_f32_little_endian(*weight)?,
            Deform::Bdef4 { weights, .. } => {
                buffer.write_f32_4_little_endian(Vector4::from(*weights))?
            }
            Deform::Sdef {
                weight, c, r0, r1, ..
            } => {
                buffer.write_f32_little_endian(*weight)?;
                buffer.write_f32_3_little_endian(*c)?;
                buffer.write_f32_3_little_endian(*r0)?;
                buffer.write_f32_3_little_endian(*r1)?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Vertex {
    pub(crate) index: i32,
    pub position: Vector3<f32>,
    pub normal: Vector3<f32>,
    pub uv: Vector2<f32>,
    pub extended_uvs: Vec<Vector4<f32>>,
    pub deform: Deform,
    pub edge_factor: f32,
    /// Materials drawing this vertex, filled by setup.
    pub material_indexes: Vec<i32>,
}

impl Default for Vertex {
    fn default() -> Self {
        Self {
            index: -1,
            position: Vector3::zero(),
            normal: Vector3::zero(),
            uv: Vector2::zero(),
            extended_uvs: vec![],
            deform: Deform::default(),
            edge_factor: 1.0f32,
            material_indexes: vec![],
        }
    }
}

impl IndexModel for Vertex {
    fn index(&self) -> i32 {
        self.index
    }

    fn set_index(&mut self, index: i32) {
        self.index = index;
    }
}

impl Vertex {
    const ENTITY: &'static str = "vertex";

    pub(crate) fn parse_pmx(info: &Info, buffer: &mut Buffer, i: usize) -> Result<Vertex> {
        let position = buffer
            .read_f32_3_little_endian()
            .context(Self::ENTITY, i, "position")?;
        let normal = buffer
            .read_f32_3_little_endian()
            .context(Self::ENTITY, i, "normal")?;
        let uv = buffer
            .read_f32_2_little_endian()
            .context(Self::ENTITY, i, "uv")?;
        let mut extended_uvs = Vec::with_capacity(info.additional_uv_size as usize);
        for _ in 0..info.additional_uv_size {
            extended_uvs.push(
                buffer
                    .read_f32_4_little_endian()
                    .context(Self::ENTITY, i, "extended uv")?,
            );
        }
        let kind = buffer.read_byte().context(Self::ENTITY, i, "deform type")?;
        let deform = Deform::parse_pmx(info, buffer, kind).context(Self::ENTITY, i, "deform")?;
        let edge_factor = buffer
            .read_f32_little_endian()
            .context(Self::ENTITY, i, "edge factor")?;
        Ok(Vertex {
            index: i as i32,
            position,
            normal,
            uv,
            extended_uvs,
            deform,
            edge_factor,
            material_indexes: vec![],
        })
    }

    pub(crate) fn save_to_buffer(&self, info: &Info, buffer: &mut MutableBuffer) -> Result<()> {
        buffer.write_f32_3_little_endian(self.position)?;
        buffer.write_f32_3_little_endian(self.normal)?;
        buffer.write_f32_2_little_endian(self.uv)?;
        for i in 0..info.additional_uv_size as usize {
            buffer.write_f32_4_little_endian(
                self.extended_uvs.get(i).copied().unwrap_or_else(Vector4::zero),
            )?;
        }
        self.deform.save_to_buffer(info, buffer)?;
        buffer.write_f32_little_endian(self.edge_factor)
    }
}

#[test]
fn test_bdef2_normalized_view() {
    let deform = Deform::Bdef2 {
        indexes: [7, 3],
        weight: 0.25,
    };
    assert_eq!(
        ([7, 3, 0, 0], [0.25f32, 0.75, 0.0, 0.0]),
        deform.normalized()
    );
    assert_eq!(1, deform.kind());
}

#[test]
fn test_bdef2_round_trip() {
    let info = Info::default();
    let vertex = Vertex {
        deform: Deform::Bdef2 {
            indexes: [7, 3],
            weight: 0.25,
        },
        ..Default::default()
    };
    let mut buffer = MutableBuffer::create().unwrap();
    vertex.save_to_buffer(&info, &mut buffer).unwrap();
    let bytes = buffer.into_bytes();
    let mut reader = Buffer::create(&bytes);
    let parsed = Vertex::parse_pmx(&info, &mut reader, 0).unwrap();
    assert_eq!(vertex.deform, parsed.deform);
    assert!(reader.is_end());
}

#[test]
fn test_unknown_deform_reports_context() {
    let info = Info::default();
    let mut bytes = vec![0u8; 32];
    bytes.push(9);
    let mut reader = Buffer::create(&bytes);
    let err = Vertex::parse_pmx(&info, &mut reader, 4).unwrap_err();
    assert!(matches!(
        err,
        MmdError::Corrupted {
            entity: "vertex",
            index: 4,
            field: "deform",
            ..
        }
    ));
}
