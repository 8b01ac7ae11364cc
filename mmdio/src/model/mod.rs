pub mod bone;
pub mod display_slot;
pub mod face;
pub mod joint;
pub mod material;
pub mod morph;
pub mod rigid_body;
pub mod skeleton;
pub mod standard;
pub mod texture;
pub mod vertex;

use crate::{
    collection::{IndexModel, IndexedCollection, NameModel, NamedCollection},
    common::{Buffer, LanguageType, MutableBuffer},
    config::{LoadOptions, SaveOptions},
    error::{MmdError, Result},
    utils::{decode_text, encode_text, fourcc, CodecType},
};

pub use self::{
    bone::{Bone, BoneFlags, Ik, IkLink},
    display_slot::{DisplayReference, DisplaySlot, MORPH_SLOT_NAME, ROOT_SLOT_NAME},
    face::Face,
    joint::Joint,
    material::{DrawFlags, Material, SphereMode, ToonSharing},
    morph::{MaterialCalcMode, Morph, MorphOffset, MorphPanel, MorphType},
    rigid_body::{PhysicsType, RigidBody, ShapeType},
    skeleton::Bones,
    texture::{Texture, TextureType},
    vertex::{Deform, Vertex},
};

const PMX_INFO_LENGTH: u8 = 8;

/// The eight header bytes following the PMX version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Info {
    pub codec_type: CodecType,
    pub additional_uv_size: u8,
    pub vertex_index_size: u8,
    pub texture_index_size: u8,
    pub material_index_size: u8,
    pub bone_index_size: u8,
    pub morph_index_size: u8,
    pub rigid_body_index_size: u8,
}

impl Default for Info {
    fn default() -> Self {
        Self {
            codec_type: CodecType::Utf16,
            additional_uv_size: 0,
            vertex_index_size: 4,
            texture_index_size: 4,
            material_index_size: 4,
            bone_index_size: 4,
            morph_index_size: 4,
            rigid_body_index_size: 4,
        }
    }
}

fn vertex_index_size(count: usize) -> u8 {
    if count < 256 {
        1
    } else if count < 65536 {
        2
    } else {
        4
    }
}

fn signed_index_size(count: usize) -> u8 {
    if count < 128 {
        1
    } else if count < 32768 {
        2
    } else {
        4
    }
}

fn check_index_size(field: &'static str, size: u8) -> Result<u8> {
    match size {
        1 | 2 | 4 => Ok(size),
        _ => Err(MmdError::UnknownEnum {
            field,
            value: size as i64,
        }),
    }
}

impl Info {
    fn parse_pmx(buffer: &mut Buffer) -> Result<Info> {
        let length = buffer.read_byte()?;
        if length != PMX_INFO_LENGTH {
            return Err(MmdError::UnknownEnum {
                field: "header length",
                value: length as i64,
            });
        }
        let codec_type = CodecType::from_pmx(buffer.read_byte()?)?;
        let additional_uv_size = buffer.read_byte()?;
        if additional_uv_size > 4 {
            return Err(MmdError::UnknownEnum {
                field: "extended uv count",
                value: additional_uv_size as i64,
            });
        }
        Ok(Info {
            codec_type,
            additional_uv_size,
            vertex_index_size: check_index_size("vertex index size", buffer.read_byte()?)?,
            texture_index_size: check_index_size("texture index size", buffer.read_byte()?)?,
            material_index_size: check_index_size("material index size", buffer.read_byte()?)?,
            bone_index_size: check_index_size("bone index size", buffer.read_byte()?)?,
            morph_index_size: check_index_size("morph index size", buffer.read_byte()?)?,
            rigid_body_index_size: check_index_size(
                "rigid body index size",
                buffer.read_byte()?,
            )?,
        })
    }

    fn save_to_buffer(&self, buffer: &mut MutableBuffer) -> Result<()> {
        buffer.write_byte(PMX_INFO_LENGTH)?;
        buffer.write_byte_array(&[
            self.codec_type.to_pmx(),
            self.additional_uv_size,
            self.vertex_index_size,
            self.texture_index_size,
            self.material_index_size,
            self.bone_index_size,
            self.morph_index_size,
            self.rigid_body_index_size,
        ])
    }

    pub(crate) fn read_text(&self, buffer: &mut Buffer) -> Result<String> {
        let length = buffer.read_len()?;
        let src = buffer.read_buffer(length)?;
        Ok(decode_text(src, self.codec_type))
    }

    pub(crate) fn write_text(&self, buffer: &mut MutableBuffer, text: &str) -> Result<()> {
        let bytes = encode_text(text, self.codec_type)?;
        buffer.write_len(bytes.len())?;
        buffer.write_byte_array(&bytes)
    }
}

fn parse_block<T>(
    info: &Info,
    buffer: &mut Buffer,
    entity: &'static str,
    parse: fn(&Info, &mut Buffer, usize) -> Result<T>,
) -> Result<Vec<T>> {
    let count = buffer.read_len()?;
    log::trace!("parsing {} {} entities", count, entity);
    let mut values = Vec::with_capacity(count.min(buffer.remaining()));
    for i in 0..count {
        values.push(parse(info, buffer, i)?);
    }
    Ok(values)
}

fn indexed<T: IndexModel>(values: Vec<T>) -> IndexedCollection<T> {
    let mut collection = IndexedCollection::with_capacity(values.len());
    for value in values {
        collection.append(value);
    }
    collection
}

fn named<T: NameModel>(values: Vec<T>) -> NamedCollection<T> {
    let mut collection = NamedCollection::with_capacity(values.len());
    for value in values {
        collection.append(value);
    }
    collection
}

fn save_block<'a, T: 'a>(
    info: &Info,
    buffer: &mut MutableBuffer,
    values: impl ExactSizeIterator<Item = &'a T>,
    save: fn(&T, &Info, &mut MutableBuffer) -> Result<()>,
) -> Result<()> {
    buffer.write_len(values.len())?;
    for value in values {
        save(value, info, buffer)?;
    }
    Ok(())
}

/// A PMX 2.0/2.1 model.
#[derive(Debug, Clone)]
pub struct Model {
    pub path: String,
    pub hash: String,
    pub version: f32,
    /// Header as read; saving recomputes the index widths.
    pub info: Info,
    pub name: String,
    pub english_name: String,
    pub comment: String,
    pub english_comment: String,
    pub vertices: IndexedCollection<Vertex>,
    pub faces: IndexedCollection<Face>,
    pub textures: NamedCollection<Texture>,
    pub materials: NamedCollection<Material>,
    pub bones: Bones,
    pub morphs: NamedCollection<Morph>,
    pub display_slots: NamedCollection<DisplaySlot>,
    pub rigid_bodies: NamedCollection<RigidBody>,
    pub joints: NamedCollection<Joint>,
}

impl Default for Model {
    fn default() -> Self {
        Self {
            path: String::new(),
            hash: String::new(),
            version: 2.0f32,
            info: Info::default(),
            name: String::new(),
            english_name: String::new(),
            comment: String::new(),
            english_comment: String::new(),
            vertices: IndexedCollection::new(),
            faces: IndexedCollection::new(),
            textures: NamedCollection::new(),
            materials: NamedCollection::new(),
            bones: Bones::new(),
            morphs: NamedCollection::new(),
            display_slots: NamedCollection::new(),
            rigid_bodies: NamedCollection::new(),
            joints: NamedCollection::new(),
        }
    }
}

struct Header {
    version: f32,
    info: Info,
    name: String,
    english_name: String,
    comment: String,
    english_comment: String,
}

impl Model {
    /// An empty model that already carries the `Root` and `表情` display slots.
    pub fn new() -> Self {
        let mut model = Self::default();
        model.ensure_default_display_slots();
        model
    }

    fn parse_header(buffer: &mut Buffer) -> Result<Header> {
        let signature = buffer.read_fixed_array::<4>()?;
        let value = u32::from_le_bytes(signature);
        if value != fourcc(b'P', b'M', b'X', b' ') && value != fourcc(b'P', b'M', b'X', 0xA0u8) {
            return Err(MmdError::InvalidSignature {
                saw: String::from_utf8_lossy(&signature).into_owned(),
            });
        }
        let version = buffer.read_f32_little_endian()?;
        let tenths = (version * 10f32).round() as i32;
        if !(tenths == 20 || tenths == 21) || (version * 10f32 - tenths as f32).abs() > 1e-3 {
            return Err(MmdError::UnsupportedVersion {
                saw: version.to_string(),
            });
        }
        let info = Info::parse_pmx(buffer)?;
        Ok(Header {
            version,
            info,
            name: info.read_text(buffer)?,
            english_name: info.read_text(buffer)?,
            comment: info.read_text(buffer)?,
            english_comment: info.read_text(buffer)?,
        })
    }

    /// Reads the header and the model name without touching the body.
    pub fn load_name(buffer: &mut Buffer) -> Result<String> {
        Ok(Self::parse_header(buffer)?.name)
    }

    pub fn load_from_buffer(buffer: &mut Buffer, options: &LoadOptions) -> Result<Model> {
        let header = Self::parse_header(buffer)?;
        let info = header.info;
        log::debug!(
            "PMX {:.1} {:?}: uv+{} widths {}/{}/{}/{}/{}/{}",
            header.version,
            info.codec_type,
            info.additional_uv_size,
            info.vertex_index_size,
            info.texture_index_size,
            info.material_index_size,
            info.bone_index_size,
            info.morph_index_size,
            info.rigid_body_index_size
        );
        let vertices = parse_block(&info, buffer, "vertex", Vertex::parse_pmx)?;
        let index_count = buffer.read_len()?;
        if index_count % 3 != 0 {
            return Err(MmdError::UnknownEnum {
                field: "face index count",
                value: index_count as i64,
            });
        }
        let mut faces = Vec::with_capacity((index_count / 3).min(buffer.remaining()));
        for i in 0..index_count / 3 {
            faces.push(Face::parse_pmx(&info, buffer, i)?);
        }
        let textures = parse_block(&info, buffer, "texture", Texture::parse_pmx)?;
        let materials = parse_block(&info, buffer, "material", Material::parse_pmx)?;
        let bones = parse_block(&info, buffer, "bone", Bone::parse_pmx)?;
        let morphs = parse_block(&info, buffer, "morph", Morph::parse_pmx)?;
        let display_slots = parse_block(&info, buffer, "display slot", DisplaySlot::parse_pmx)?;
        let rigid_bodies = parse_block(&info, buffer, "rigid body", RigidBody::parse_pmx)?;
        let joints = parse_block(&info, buffer, "joint", Joint::parse_pmx)?;
        if !buffer.is_end() {
            log::debug!("{} trailing bytes after the joint section", buffer.remaining());
        }
        let mut model = Model {
            version: header.version,
            info,
            name: header.name,
            english_name: header.english_name,
            comment: header.comment,
            english_comment: header.english_comment,
            vertices: indexed(vertices),
            faces: indexed(faces),
            textures: named(textures),
            materials: named(materials),
            bones: Bones::from(named(bones)),
            morphs: named(morphs),
            display_slots: named(display_slots),
            rigid_bodies: named(rigid_bodies),
            joints: named(joints),
            ..Default::default()
        };
        if options.create_default_display_slots {
            model.ensure_default_display_slots();
        }
        model.setup();
        log::debug!(
            "loaded model {}: {} vertices, {} faces, {} bones, {} morphs",
            model.name,
            model.vertices.len(),
            model.faces.len(),
            model.bones.len(),
            model.morphs.len()
        );
        Ok(model)
    }

    /// Header for the current contents. Text is always written as UTF-16LE.
    fn info_for_save(&self, bone_count: usize, morph_count: usize) -> Info {
        let additional_uv_size = self
            .vertices
            .iter()
            .map(|vertex| vertex.extended_uvs.len())
            .max()
            .unwrap_or(0)
            .max(self.info.additional_uv_size as usize)
            .min(4) as u8;
        Info {
            codec_type: CodecType::Utf16,
            additional_uv_size,
            vertex_index_size: vertex_index_size(self.vertices.len()),
            texture_index_size: signed_index_size(self.textures.len()),
            material_index_size: signed_index_size(self.materials.len()),
            bone_index_size: signed_index_size(bone_count),
            morph_index_size: signed_index_size(morph_count),
            rigid_body_index_size: signed_index_size(self.rigid_bodies.len()),
        }
    }

    pub fn save_to_buffer(&self, buffer: &mut MutableBuffer, options: &SaveOptions) -> Result<()> {
        buffer.set_sanitize_non_finite(options.sanitize_non_finite);
        let bones: Vec<&Bone> = self
            .bones
            .iter()
            .filter(|bone| options.include_system || !bone.is_system)
            .collect();
        let morphs: Vec<&Morph> = self
            .morphs
            .iter()
            .filter(|morph| options.include_system || !morph.is_system)
            .collect();
        let info = self.info_for_save(bones.len(), morphs.len());
        let version = if self.version > 2.05f32 { 2.1f32 } else { 2.0f32 };
        buffer.write_byte_array(b"PMX ")?;
        buffer.write_f32_little_endian(version)?;
        info.save_to_buffer(buffer)?;
        info.write_text(buffer, &self.name)?;
        info.write_text(buffer, &self.english_name)?;
        info.write_text(buffer, &self.comment)?;
        info.write_text(buffer, &self.english_comment)?;
        save_block(&info, buffer, self.vertices.iter(), Vertex::save_to_buffer)?;
        buffer.write_len(self.faces.len() * 3)?;
        for face in self.faces.iter() {
            face.save_to_buffer(&info, buffer)?;
        }
        save_block(&info, buffer, self.textures.iter(), Texture::save_to_buffer)?;
        save_block(&info, buffer, self.materials.iter(), Material::save_to_buffer)?;
        save_block(&info, buffer, bones.into_iter(), Bone::save_to_buffer)?;
        save_block(&info, buffer, morphs.into_iter(), Morph::save_to_buffer)?;
        save_block(&info, buffer, self.display_slots.iter(), DisplaySlot::save_to_buffer)?;
        save_block(&info, buffer, self.rigid_bodies.iter(), RigidBody::save_to_buffer)?;
        save_block(&info, buffer, self.joints.iter(), Joint::save_to_buffer)?;
        log::debug!("saved model {} ({} bytes)", self.name, buffer.len());
        Ok(())
    }

    /// Deep copy through an in-memory save and load.
    pub fn try_clone_deep(&self) -> Result<Model> {
        let copy = || -> Result<Model> {
            let mut buffer = MutableBuffer::create()?;
            self.save_to_buffer(&mut buffer, &SaveOptions::default())?;
            let bytes = buffer.into_bytes();
            let options = LoadOptions {
                create_default_display_slots: false,
                ..Default::default()
            };
            let mut model = Model::load_from_buffer(&mut Buffer::create(&bytes), &options)?;
            model.path = self.path.clone();
            model.hash = self.hash.clone();
            Ok(model)
        };
        copy().map_err(|cause| MmdError::ModelCopyFailed {
            cause: Box::new(cause),
        })
    }

    pub fn get_name(&self, language_type: LanguageType) -> &str {
        match language_type {
            LanguageType::Japanese => &self.name,
            LanguageType::English => &self.english_name,
        }
    }

    pub fn get_comment(&self, language_type: LanguageType) -> &str {
        match language_type {
            LanguageType::Japanese => &self.comment,
            LanguageType::English => &self.english_comment,
        }
    }

    /// Faces claimed by materials, which must equal `faces.len()` for a consistent model.
    pub fn material_face_count(&self) -> usize {
        self.materials.iter().map(|material| material.face_count()).sum()
    }

    /// Inserts `Root` at slot 0 and `表情` at slot 1 when missing, remapping slot references.
    pub fn ensure_default_display_slots(&mut self) {
        for (position, slot) in [(0, DisplaySlot::root()), (1, DisplaySlot::morphs())] {
            if self.display_slots.contains_name(&slot.name) {
                continue;
            }
            let position = position.min(self.display_slots.len() as i32);
            let result = match self.display_slots.insert(slot, position) {
                Ok(result) => result,
                Err(_) => continue,
            };
            if result.changed {
                for bone in self.bones.iter_mut() {
                    bone.display_slot = result.map_old(bone.display_slot);
                }
                for morph in self.morphs.iter_mut() {
                    morph.display_slot = result.map_old(morph.display_slot);
                }
            }
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.vertices.is_dirty()
            || self.faces.is_dirty()
            || self.textures.is_dirty()
            || self.materials.is_dirty()
            || self.bones.is_dirty()
            || self.rigid_bodies.is_dirty()
            || self.joints.is_dirty()
    }

    pub fn setup_if_dirty(&mut self) {
        if self.is_dirty() {
            self.setup();
        }
    }

    fn setup_materials(&mut self) {
        for vertex in self.vertices.iter_mut() {
            vertex.material_indexes.clear();
        }
        let mut face_offset = 0usize;
        let claims: Vec<(i32, usize)> = self
            .materials
            .iter()
            .map(|material| (material.index(), material.face_count()))
            .collect();
        for (material_index, face_count) in claims {
            let end = (face_offset + face_count).min(self.faces.len());
            let vertex_indexes: Vec<i32> = self.faces.as_slice()[face_offset.min(end)..end]
                .iter()
                .flat_map(|face| face.vertex_indexes)
                .collect();
            for vertex_index in vertex_indexes {
                if let Ok(vertex) = self.vertices.get_mut(vertex_index) {
                    if !vertex.material_indexes.contains(&material_index) {
                        vertex.material_indexes.push(material_index);
                    }
                }
            }
            face_offset = end;
        }
        for texture in self.textures.iter_mut() {
            texture.texture_type = TextureType::None;
        }
        let usages: Vec<(i32, TextureType)> = self
            .materials
            .iter()
            .flat_map(|material| {
                let mut usages = vec![(material.texture_index, TextureType::Texture)];
                if material.sphere_texture_index >= 0 {
                    usages.push((material.sphere_texture_index, TextureType::Sphere));
                }
                if material.toon_sharing == ToonSharing::Individual {
                    usages.push((material.toon_texture_index, TextureType::Toon));
                }
                usages
            })
            .collect();
        for (texture_index, texture_type) in usages {
            if let Ok(texture) = self.textures.get_mut(texture_index) {
                texture.texture_type = texture_type;
            }
        }
    }

    fn setup_physics(&mut self) {
        for bone in self.bones.iter_mut() {
            bone.extend.rigid_body_index = None;
        }
        let links: Vec<(i32, i32)> = self
            .rigid_bodies
            .iter()
            .filter(|body| body.bone_index >= 0)
            .map(|body| (body.index(), body.bone_index))
            .collect();
        for (body_index, bone_index) in links {
            if let Ok(bone) = self.bones.get_mut(bone_index) {
                bone.extend.rigid_body_index = Some(body_index);
            }
        }
        for body in self.rigid_bodies.iter_mut() {
            body.jointed_bone_index = -1;
        }
        let pairs: Vec<(i32, i32, i32, i32)> = self
            .joints
            .iter()
            .filter_map(|joint| {
                let a = self.rigid_bodies.get(joint.rigid_body_index_a).ok()?;
                let b = self.rigid_bodies.get(joint.rigid_body_index_b).ok()?;
                (a.bone_index >= 0 && b.bone_index >= 0).then(|| {
                    (a.index(), a.bone_index, b.index(), b.bone_index)
                })
            })
            .collect();
        for (body_a, bone_a, body_b, bone_b) in pairs {
            if let Ok(body) = self.rigid_bodies.get_mut(body_a) {
                body.jointed_bone_index = bone_b;
            }
            if let Ok(body) = self.rigid_bodies.get_mut(body_b) {
                body.jointed_bone_index = bone_a;
            }
        }
    }

    /// Recomputes every derived link. Safe to run again after any mutation.
    pub fn setup(&mut self) {
        self.setup_materials();
        self.bones.setup();
        self.setup_physics();
        if self.material_face_count() != self.faces.len() {
            log::warn!(
                "materials claim {} faces but the model has {}",
                self.material_face_count(),
                self.faces.len()
            );
        }
        self.vertices.set_dirty(false);
        self.faces.set_dirty(false);
        self.textures.set_dirty(false);
        self.materials.set_dirty(false);
        self.bones.set_dirty(false);
        self.morphs.set_dirty(false);
        self.display_slots.set_dirty(false);
        self.rigid_bodies.set_dirty(false);
        self.joints.set_dirty(false);
    }
}

#[cfg(test)]
mod tests {
    use cgmath::Vector3;

    use super::*;

    fn triangle_model() -> Model {
        let mut model = Model::new();
        model.name = "テスト".to_owned();
        model.english_name = "test".to_owned();
        for i in 0..4 {
            model.vertices.append(Vertex {
                position: Vector3::new(i as f32, 0f32, 0f32),
                deform: Deform::Bdef1 { index: 0 },
                ..Default::default()
            });
        }
        model.faces.append(Face::new(0, 1, 2));
        model.faces.append(Face::new(2, 1, 3));
        model.textures.append(Texture::new("tex.png"));
        model.textures.append(Texture::new("toon.bmp"));
        model.materials.append(Material {
            vertex_count: 3,
            texture_index: 0,
            toon_texture_index: 1,
            ..Material::new("a")
        });
        model.materials.append(Material {
            vertex_count: 3,
            texture_index: 0,
            toon_sharing: ToonSharing::Shared,
            toon_texture_index: 2,
            ..Material::new("b")
        });
        model.bones.append(Bone {
            flags: BoneFlags::CAN_ROTATE | BoneFlags::CAN_TRANSLATE | BoneFlags::IS_VISIBLE,
            ..Bone::new("センター")
        });
        model.bones.append(Bone {
            parent_index: 0,
            flags: BoneFlags::CAN_ROTATE,
            ..Bone::new("helper")
        });
        model.rigid_bodies.append(RigidBody {
            bone_index: 0,
            ..RigidBody::new("a")
        });
        model.rigid_bodies.append(RigidBody {
            bone_index: 1,
            ..RigidBody::new("b")
        });
        model.joints.append(Joint {
            rigid_body_index_a: 0,
            rigid_body_index_b: 1,
            ..Joint::new("j")
        });
        model.setup();
        model
    }

    fn save(model: &Model, options: &SaveOptions) -> Vec<u8> {
        let mut buffer = MutableBuffer::create().unwrap();
        model.save_to_buffer(&mut buffer, options).unwrap();
        buffer.into_bytes()
    }

    fn load(bytes: &[u8]) -> Result<Model> {
        Model::load_from_buffer(&mut Buffer::create(bytes), &LoadOptions::default())
    }

    #[test]
    fn test_header_scenario() {
        let mut bytes = vec![
            0x50, 0x4D, 0x58, 0x20, 0x00, 0x00, 0x00, 0x40, 0x08, 0x00, 0x00, 0x02, 0x02, 0x04,
            0x02, 0x02, 0x02,
        ];
        bytes.extend_from_slice(&[0u8; 4 * 4]);
        bytes.extend_from_slice(&[0u8; 4 * 9]);
        let model = load(&bytes).unwrap();
        assert_eq!(2.0f32, model.version);
        assert_eq!(
            Info {
                codec_type: CodecType::Utf16,
                additional_uv_size: 0,
                vertex_index_size: 2,
                texture_index_size: 2,
                material_index_size: 4,
                bone_index_size: 2,
                morph_index_size: 2,
                rigid_body_index_size: 2,
            },
            model.info
        );
        assert_eq!(
            vec![ROOT_SLOT_NAME, MORPH_SLOT_NAME],
            model.display_slots.names().collect::<Vec<_>>()
        );
        assert_eq!("", Model::load_name(&mut Buffer::create(&bytes)).unwrap());
    }

    #[test]
    fn test_header_failures() {
        assert!(matches!(
            load(b"PMD \0\0\0\x40"),
            Err(MmdError::InvalidSignature { .. })
        ));
        assert!(matches!(
            load(&[0x50, 0x4D, 0x58, 0x20, 0x00, 0x00, 0x40, 0x40]),
            Err(MmdError::UnsupportedVersion { .. })
        ));
        assert!(matches!(
            load(&[0x50, 0x4D, 0x58, 0x20, 0x00, 0x00, 0x00, 0x40, 0x08, 0x05]),
            Err(MmdError::UnknownEncoding { saw: 5 })
        ));
        assert!(matches!(
            load(&[0x50, 0x4D, 0x58, 0x20, 0x00, 0x00]),
            Err(MmdError::UnexpectedEof)
        ));
    }

    #[test]
    fn test_setup_links() {
        let model = triangle_model();
        assert_eq!(model.faces.len(), model.material_face_count());
        assert_eq!(vec![0], model.vertices.get(0).unwrap().material_indexes);
        assert_eq!(vec![0, 1], model.vertices.get(2).unwrap().material_indexes);
        assert_eq!(vec![1], model.vertices.get(3).unwrap().material_indexes);
        assert_eq!(TextureType::Texture, model.textures.get(0).unwrap().texture_type);
        assert_eq!(TextureType::Toon, model.textures.get(1).unwrap().texture_type);
        assert_eq!(Some(0), model.bones.get(0).unwrap().extend.rigid_body_index);
        assert_eq!(1, model.rigid_bodies.get(0).unwrap().jointed_bone_index);
        assert_eq!(0, model.rigid_bodies.get(1).unwrap().jointed_bone_index);
        assert!(!model.is_dirty());
    }

    #[test]
    fn test_round_trip_and_widths() {
        let model = triangle_model();
        let bytes = save(&model, &SaveOptions::default());
        assert_eq!(&[0, 0, 1, 1, 1, 1, 1, 1], &bytes[9..17]);
        let loaded = load(&bytes).unwrap();
        assert_eq!("テスト", loaded.get_name(LanguageType::Japanese));
        assert_eq!("test", loaded.get_name(LanguageType::English));
        assert_eq!(2, loaded.bones.len());
        assert_eq!(
            model.faces.iter().collect::<Vec<_>>(),
            loaded.faces.iter().collect::<Vec<_>>()
        );
        assert_eq!(
            model.materials.iter().collect::<Vec<_>>(),
            loaded.materials.iter().collect::<Vec<_>>()
        );
        assert_eq!(
            model.bones.iter().collect::<Vec<_>>(),
            loaded.bones.iter().collect::<Vec<_>>()
        );
        assert_eq!(bytes, save(&loaded, &SaveOptions::default()));
    }

    #[test]
    fn test_save_without_system_entities() {
        let mut model = triangle_model();
        model.bones.get_mut(1).unwrap().is_system = true;
        let options = SaveOptions {
            include_system: false,
            ..Default::default()
        };
        let loaded = load(&save(&model, &options)).unwrap();
        assert_eq!(1, loaded.bones.len());
        assert!(loaded.bones.find_by_name("helper").is_none());
    }

    #[test]
    fn test_wide_vertex_indexes() {
        let mut model = Model::new();
        for _ in 0..300 {
            model.vertices.append(Vertex::default());
        }
        model.faces.append(Face::new(0, 150, 299));
        model.materials.append(Material {
            vertex_count: 3,
            ..Material::new("m")
        });
        let bytes = save(&model, &SaveOptions::default());
        assert_eq!(2, bytes[11]);
        let loaded = load(&bytes).unwrap();
        assert_eq!([0, 150, 299], loaded.faces.get(0).unwrap().vertex_indexes);
    }

    #[test]
    fn test_try_clone_deep() {
        let mut model = triangle_model();
        model.path = "/tmp/a.pmx".to_owned();
        let copy = model.try_clone_deep().unwrap();
        assert_eq!(model.path, copy.path);
        assert_eq!(model.display_slots.len(), copy.display_slots.len());
        model.bones.rename(0, "renamed").unwrap();
        assert!(copy.bones.find_by_name("センター").is_some());
    }

    #[test]
    fn test_default_slots_remap_references() {
        let mut model = Model::default();
        model.display_slots.append(DisplaySlot::new("髪", "hair", false));
        model.bones.append(Bone {
            display_slot: 0,
            ..Bone::new("a")
        });
        model.ensure_default_display_slots();
        assert_eq!(
            vec![ROOT_SLOT_NAME, MORPH_SLOT_NAME, "髪"],
            model.display_slots.names().collect::<Vec<_>>()
        );
        assert_eq!(2, model.bones.get(0).unwrap().display_slot);
    }
}
