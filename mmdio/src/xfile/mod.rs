//! DirectX .x meshes, converted into PMX entities.

mod lexer;
mod normals;
mod parser;

use crate::{
    config::LoadOptions,
    error::{MmdError, Result},
    inflate::{self, MSZIP_HEADER_SIZE},
    model::{Bone, BoneFlags, DisplayReference, Model, ROOT_SLOT_NAME},
    utils::{decode_text, CodecType},
};

use self::parser::Parser;

pub const CENTER_BONE_NAME: &str = "センター";

/// Storage form named by bytes 8..12 of the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum XFormat {
    Text,
    Binary,
    CompressedText,
    CompressedBinary,
}

impl XFormat {
    pub fn is_compressed(self) -> bool {
        matches!(self, XFormat::CompressedText | XFormat::CompressedBinary)
    }

    fn indicator(self) -> &'static [u8; 4] {
        match self {
            XFormat::Text => b"txt ",
            XFormat::Binary => b"bin ",
            XFormat::CompressedText => b"tzip",
            XFormat::CompressedBinary => b"bzip",
        }
    }
}

pub fn sniff(bytes: &[u8]) -> Result<XFormat> {
    if bytes.len() < MSZIP_HEADER_SIZE {
        return Err(MmdError::UnexpectedEof);
    }
    if &bytes[..4] != b"xof " {
        return Err(MmdError::InvalidSignature {
            saw: String::from_utf8_lossy(&bytes[..4]).into_owned(),
        });
    }
    match &bytes[8..12] {
        b"txt " => Ok(XFormat::Text),
        b"bin " => Ok(XFormat::Binary),
        b"tzip" => Ok(XFormat::CompressedText),
        b"bzip" => Ok(XFormat::CompressedBinary),
        other => Err(MmdError::InvalidSignature {
            saw: String::from_utf8_lossy(other).into_owned(),
        }),
    }
}

/// Expands an MSZIP file. The header of the result names the uncompressed form, so a compressed
/// text file comes back as a loadable text file.
pub fn decompress(bytes: &[u8]) -> Result<Vec<u8>> {
    let format = sniff(bytes)?;
    if !format.is_compressed() {
        return Ok(bytes.to_vec());
    }
    let mut output = inflate::decompress_mszip(bytes)?;
    let plain = match format {
        XFormat::CompressedText => XFormat::Text,
        _ => XFormat::Binary,
    };
    output[8..12].copy_from_slice(plain.indicator());
    Ok(output)
}

pub fn load_from_bytes(bytes: &[u8], options: &LoadOptions) -> Result<Model> {
    let format = sniff(bytes)?;
    let expanded;
    let bytes = if format.is_compressed() {
        expanded = decompress(bytes)?;
        log::debug!(
            ".x expanded from {} to {} bytes",
            bytes.len(),
            expanded.len()
        );
        expanded.as_slice()
    } else {
        bytes
    };
    if matches!(format, XFormat::Binary | XFormat::CompressedBinary) {
        return Err(MmdError::UnknownEnum {
            field: "x format",
            value: i64::from(u32::from_le_bytes(*format.indicator())),
        });
    }
    let text = decode_text(bytes, CodecType::Sjis);
    let tokens = lexer::tokenize(&text);
    log::debug!(".x text: {} tokens", tokens.len());
    let mut model = Model::default();
    Parser::new(&tokens, &mut model, options.x_worker_threads).parse()?;
    add_center_bone(&mut model);
    if options.create_default_display_slots {
        model.ensure_default_display_slots();
        if let Some(index) = model.bones.index_of(CENTER_BONE_NAME) {
            if let Some(slot) = model
                .display_slots
                .iter_mut()
                .find(|slot| slot.name == ROOT_SLOT_NAME)
            {
                if slot.references.is_empty() {
                    slot.references.push(DisplayReference::Bone(index));
                }
            }
        }
    }
    model.setup();
    Ok(model)
}

fn add_center_bone(model: &mut Model) {
    if model.bones.contains_name(CENTER_BONE_NAME) {
        return;
    }
    let mut bone = Bone::new(CENTER_BONE_NAME);
    bone.english_name = "center".to_owned();
    bone.flags = BoneFlags::CAN_ROTATE
        | BoneFlags::CAN_TRANSLATE
        | BoneFlags::IS_VISIBLE
        | BoneFlags::CAN_MANIPULATE;
    model.bones.append(bone);
}

#[cfg(test)]
mod tests {
    use cgmath::Vector3;

    use crate::model::{SphereMode, TextureType};

    use super::*;

    const TRIANGLE_PAIR: &str = r#"xof 0303txt 0032
template Header {
 <3D82AB43-62DA-11cf-AB39-0020AF71E433>
 WORD major;
 WORD minor;
 DWORD flags;
}

Header {
 1;
 0;
 1;
}

Frame Root {
 FrameTransformMatrix { 1.0,0.0,0.0,0.0,0.0,1.0,0.0,0.0,0.0,0.0,1.0,0.0,0.0,0.0,0.0,1.0;; }
}

Mesh quad {
 4;
 0.0;0.0;0.0;,
 0.0;0.0;1.0;,
 1.0;0.0;0.0;,
 1.0;0.0;1.0;;
 2;
 3;0,1,2;,
 3;2,1,3;;

 MeshMaterialList {
  2;
  2;
  0,
  1;;
  Material {
   1.000000;0.500000;0.250000;1.000000;;
   5.000000;
   0.100000;0.200000;0.300000;;
   0.400000;0.500000;0.600000;;
   TextureFilename {
    "body.png*env.sph";
   }
  }
  Material {
   0.000000;0.000000;0.000000;1.000000;;
   0.000000;
   0.000000;0.000000;0.000000;;
   0.000000;0.000000;0.000000;;
  }
 }

 MeshTextureCoords {
  4;
  0.0;0.0;,
  0.0;1.0;,
  1.0;0.0;,
  1.0;1.0;;
 }
}
"#;

    #[test]
    fn test_sniff() {
        assert_eq!(XFormat::Text, sniff(b"xof 0303txt 0032").unwrap());
        assert_eq!(XFormat::CompressedText, sniff(b"xof 0303tzip0032").unwrap());
        assert_eq!(XFormat::CompressedBinary, sniff(b"xof 0303bzip0032").unwrap());
        assert!(matches!(
            sniff(b"xof 0303abcd0032"),
            Err(MmdError::InvalidSignature { .. })
        ));
        assert!(matches!(sniff(b"xof"), Err(MmdError::UnexpectedEof)));
    }

    #[test]
    fn test_binary_is_rejected() {
        let err = load_from_bytes(b"xof 0303bin 0032\0\0\0\0", &LoadOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            MmdError::UnknownEnum {
                field: "x format",
                ..
            }
        ));
    }

    #[test]
    fn test_load_text_mesh() {
        let model = load_from_bytes(TRIANGLE_PAIR.as_bytes(), &LoadOptions::default()).unwrap();
        assert_eq!("X File Version 1.0, flags: 1", model.comment);
        assert_eq!(4, model.vertices.len());
        assert_eq!(
            Vector3::new(0.0, 0.0, 10.0),
            model.vertices.get(1).unwrap().position
        );
        assert_eq!(2, model.faces.len());
        assert_eq!(model.faces.len(), model.material_face_count());

        let first = model.materials.get(0).unwrap();
        assert_eq!("材質01", first.name);
        assert_eq!(3, first.vertex_count);
        assert_eq!(5.0, first.specular.w);
        assert_eq!(1.0, first.edge.w);
        assert_eq!(10.0, first.edge_size);
        assert_eq!(SphereMode::Multiply, first.sphere_mode);
        let texture = model.textures.get(first.texture_index).unwrap();
        assert_eq!("body.png", texture.name);
        let sphere = model.textures.get(first.sphere_texture_index).unwrap();
        assert_eq!("env.sph", sphere.name);
        assert_eq!(TextureType::Sphere, sphere.texture_type);

        let second = model.materials.get(1).unwrap();
        assert_eq!("材質02", second.name);
        assert_eq!(3, second.vertex_count);

        let center = model.bones.get_by_name(CENTER_BONE_NAME).unwrap();
        assert!(center.can_rotate() && center.can_translate());
        assert!(center.is_visible() && center.can_manipulate());
        assert_eq!(
            Some(0),
            model.display_slots.index_of(ROOT_SLOT_NAME)
        );
        assert_eq!(
            vec![DisplayReference::Bone(0)],
            model.display_slots.get(0).unwrap().references
        );

        for vertex in model.vertices.iter() {
            assert!((vertex.normal.y.abs() - 1.0).abs() < 1e-6);
        }
        assert_eq!(1.0, model.vertices.get(3).unwrap().uv.y);
    }

    #[test]
    fn test_mesh_normals_and_quads() {
        let text = "xof 0303txt 0032\nMesh {\n 4;\n 0;0;0;, 0;0;1;, 1;0;1;, 1;0;0;;\n 1;\n 4;0,1,2,3;;\n MeshNormals {\n  1;\n  0.0;0.0;-1.0;;\n  1;\n  4;0,0,0,0;;\n }\n}\n";
        let model = load_from_bytes(text.as_bytes(), &LoadOptions::default()).unwrap();
        assert_eq!(2, model.faces.len());
        assert_eq!([0, 1, 2], model.faces.get(0).unwrap().vertex_indexes);
        assert_eq!([0, 2, 3], model.faces.get(1).unwrap().vertex_indexes);
        assert_eq!(1, model.materials.len());
        assert_eq!(6, model.materials.get(0).unwrap().vertex_count);
        for vertex in model.vertices.iter() {
            assert_eq!(Vector3::new(0.0, 0.0, -1.0), vertex.normal);
        }
    }

    #[test]
    fn test_existing_center_bone_is_kept() {
        let mut model = Model::default();
        let mut bone = Bone::new(CENTER_BONE_NAME);
        bone.layer = 3;
        model.bones.append(bone);
        add_center_bone(&mut model);
        assert_eq!(1, model.bones.len());
        assert_eq!(3, model.bones.get(0).unwrap().layer);
    }

    #[test]
    fn test_grammar_error() {
        let text = "xof 0303txt 0032\nHeader { 1; 0; }\n";
        let err = load_from_bytes(text.as_bytes(), &LoadOptions::default()).unwrap_err();
        assert!(matches!(err, MmdError::UnexpectedToken { expected: "number", .. }));
    }

    #[test]
    fn test_oversized_counts_are_rejected() {
        let face_index_count = "xof 0303txt 0032\nMesh {\n 3;\n 0;0;0;,\n 0;1;0;,\n 1;0;0;;\n 1;\n 1e19;0,1,2;;\n}\n";
        let err = load_from_bytes(face_index_count.as_bytes(), &LoadOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            MmdError::UnknownEnum {
                field: "face vertex count",
                ..
            }
        ));
        let vertex_count = "xof 0303txt 0032\nMesh {\n 1000000000000;\n 0;0;0;;\n}\n";
        let err = load_from_bytes(vertex_count.as_bytes(), &LoadOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            MmdError::UnknownEnum {
                field: "mesh vertex count",
                ..
            }
        ));
        let material_count = "xof 0303txt 0032\nMesh {\n 3;\n 0;0;0;,\n 0;1;0;,\n 1;0;0;;\n 1;\n 3;0,1,2;;\n MeshMaterialList {\n  2147483647;\n  1;\n  0;;\n }\n}\n";
        let err = load_from_bytes(material_count.as_bytes(), &LoadOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            MmdError::UnknownEnum {
                field: "material count",
                ..
            }
        ));
    }
}
