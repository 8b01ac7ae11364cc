use std::io::Write;

use cgmath::{Quaternion, Vector2, Vector3, Vector4};
use flate2::{write::DeflateEncoder, Compression};
use rand::{rngs::StdRng, Rng, RngCore, SeedableRng};
use mmdio::{
    collection::IndexModel,
    inflate,
    json::ModelJson,
    model::{
        Bone, BoneFlags, Deform, Face, Ik, IkLink, Material, Model, Morph, MorphType, Texture,
        Vertex,
    },
    motion::{BoneCurves, BoneFrame, CameraFrame, Motion, MorphFrame},
    repository::hash_bytes,
    xfile, Asset, LoadOptions, MmdError, Repository, SaveOptions,
};

const X_MESH: &str = r#"xof 0303txt 0032
Header { 1; 0; 1; }

Mesh {
 3;
 0.0;0.0;0.0;,
 0.0;1.0;0.0;,
 1.0;0.0;0.0;;
 1;
 3;0,1,2;;
 MeshMaterialList {
  1;
  1;
  0;;
  Material {
   0.8;0.8;0.8;1.0;;
   8.0;
   0.0;0.0;0.0;;
   0.0;0.0;0.0;;
   TextureFilename { "skin.bmp"; }
  }
 }
}
"#;

fn sample_model() -> Model {
    let mut model = Model::new();
    model.name = "サンプル".to_owned();
    model.english_name = "sample".to_owned();
    model.comment = "comment".to_owned();
    for i in 0..4 {
        let mut vertex = Vertex::default();
        vertex.position = Vector3::new(i as f32, (i * 2) as f32, 0.0);
        vertex.normal = Vector3::unit_z();
        vertex.uv = Vector2::new(0.25 * i as f32, 0.5);
        vertex.deform = if i % 2 == 0 {
            Deform::Bdef1 { index: 0 }
        } else {
            Deform::Bdef2 {
                indexes: [0, 1],
                weight: 0.25,
            }
        };
        model.vertices.append(vertex);
    }
    model.faces.append(Face::new(0, 1, 2));
    model.faces.append(Face::new(2, 1, 3));
    model.textures.append(Texture::new("body.png"));
    let mut material = Material::new("body");
    material.vertex_count = 6;
    material.texture_index = 0;
    material.diffuse = Vector4::new(1.0, 0.5, 0.5, 1.0);
    model.materials.append(material);

    let mut center = Bone::new("センター");
    center.flags = BoneFlags::CAN_ROTATE
        | BoneFlags::CAN_TRANSLATE
        | BoneFlags::IS_VISIBLE
        | BoneFlags::CAN_MANIPULATE;
    center.position = Vector3::new(0.0, 8.0, 0.0);
    model.bones.append(center);
    let mut leg = Bone::new("左足");
    leg.parent_index = 0;
    leg.flags = BoneFlags::CAN_ROTATE | BoneFlags::IS_VISIBLE;
    leg.position = Vector3::new(1.0, 10.0, 0.0);
    model.bones.append(leg);
    let mut ik = Bone::new("左足ＩＫ");
    ik.parent_index = 0;
    ik.flags = BoneFlags::CAN_ROTATE | BoneFlags::CAN_TRANSLATE | BoneFlags::IS_IK;
    ik.ik = Some(Ik {
        bone_index: 1,
        loop_count: 40,
        unit_rotation: 2.0,
        links: vec![IkLink {
            bone_index: 1,
            angle_limit: true,
            min_angle_limit: Vector3::new(-3.0, 0.0, 0.0),
            max_angle_limit: Vector3::new(-0.01, 0.0, 0.0),
        }],
    });
    model.bones.append(ik);
    let mut helper = Bone::new("補助");
    helper.parent_index = 0;
    helper.is_system = true;
    model.bones.append(helper);
    model.morphs.append(Morph::new("あ", MorphType::Vertex));
    model.setup();
    model
}

fn sample_motion() -> Motion {
    let mut motion = Motion::new("初音ミク");
    for frame_index in [0u32, 10, 30] {
        let mut frame = BoneFrame::new(frame_index);
        frame.position = Vector3::new(frame_index as f32, 0.0, 0.0);
        frame.rotation = Quaternion::new(1.0, 0.0, 0.0, 0.0);
        if frame_index == 10 {
            let mut raw = [0u8; 64];
            for (i, byte) in raw.iter_mut().enumerate() {
                *byte = i as u8;
            }
            frame.curves = BoneCurves::new(raw);
        }
        motion.append_bone_frame("センター", frame);
    }
    motion.append_interpolated_bone_frame("センター", BoneFrame::new(20));
    motion.append_morph_frame("あ", MorphFrame::new(5, 0.75));
    let mut camera = CameraFrame::default();
    camera.frame_index = 12;
    camera.view_angle = 45;
    motion.cameras.append(camera);
    motion
}

/// Frames `data` the way a compressed .x file does, one independent raw DEFLATE stream per
/// 32 KiB block.
fn mszip(indicator: &[u8; 4], data: &[u8], level: Compression) -> Vec<u8> {
    let mut bytes = b"xof 0303".to_vec();
    bytes.extend_from_slice(indicator);
    bytes.extend_from_slice(b"0032");
    bytes.extend_from_slice(&((16 + data.len()) as u32).to_le_bytes());
    for chunk in data.chunks(32 * 1024) {
        let mut encoder = DeflateEncoder::new(vec![], level);
        encoder.write_all(chunk).unwrap();
        let compressed = encoder.finish().unwrap();
        bytes.extend_from_slice(&(chunk.len() as u16).to_le_bytes());
        bytes.extend_from_slice(&((compressed.len() + 2) as u16).to_le_bytes());
        bytes.extend_from_slice(b"CK");
        bytes.extend_from_slice(&compressed);
    }
    bytes
}

fn random_bytes(rng: &mut StdRng, len: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; len];
    rng.fill_bytes(&mut bytes);
    bytes
}

/// Bytes drawn from a small alphabet in short runs, so that encoders emit matches.
fn random_text(rng: &mut StdRng, len: usize) -> Vec<u8> {
    const WORDS: [&[u8]; 6] = [b"Mesh ", b"{ ", b"} ", b"0.500000;", b",\n", b"Material "];
    let mut out = Vec::with_capacity(len);
    while out.len() < len {
        out.extend_from_slice(WORDS[rng.gen_range(0..WORDS.len())]);
    }
    out.truncate(len);
    out
}

#[test]
fn pmx_round_trip_through_repository() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sample.pmx");
    let repository = Repository::default();
    let model = sample_model();
    repository.save(&path, &Asset::Model(model.clone())).unwrap();

    assert!(repository.can_load(&path));
    assert_eq!("サンプル", repository.load_name(&path).unwrap());
    let loaded = repository.load_model(&path).unwrap();
    assert_eq!(model.name, loaded.name);
    assert_eq!(model.comment, loaded.comment);
    assert_eq!(model.vertices.as_slice(), loaded.vertices.as_slice());
    assert_eq!(model.faces.as_slice(), loaded.faces.as_slice());
    assert_eq!(model.materials.as_slice(), loaded.materials.as_slice());
    assert_eq!(4, loaded.bones.len());
    assert_eq!(ModelJson::from_model(&model), ModelJson::from_model(&loaded));
    assert_eq!(loaded.faces.len(), loaded.material_face_count());

    let bytes = std::fs::read(&path).unwrap();
    let resolved = std::fs::canonicalize(&path).unwrap();
    assert_eq!(hash_bytes(&bytes, &resolved.to_string_lossy()), loaded.hash);
    assert_eq!(loaded.hash, repository.hash(&path).unwrap());
    assert_eq!(40, loaded.hash.len());
    assert_eq!(resolved.to_string_lossy(), loaded.path);
}

#[test]
fn setup_invariants_hold_after_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sample.pmx");
    let repository = Repository::default();
    repository.save(&path, &Asset::Model(sample_model())).unwrap();
    let model = repository.load_model(&path).unwrap();
    for bone in model.bones.iter() {
        for link in &bone.extend.ik_link_bone_indexes {
            assert!(model.bones.get(*link).unwrap().is_ik());
        }
    }
    let order = model.bones.layer_sorted_indexes();
    let keys: Vec<(bool, i32, i32)> = order
        .iter()
        .map(|index| {
            let bone = model.bones.get(*index).unwrap();
            (bone.is_after_physics_deform(), bone.layer, bone.index())
        })
        .collect();
    let mut sorted = keys.clone();
    sorted.sort();
    assert_eq!(sorted, keys);
}

#[test]
fn system_bones_are_dropped_on_request() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("no_system.pmx");
    let repository = Repository::new(
        LoadOptions::default(),
        SaveOptions {
            include_system: false,
            ..Default::default()
        },
    );
    repository.save(&path, &Asset::Model(sample_model())).unwrap();
    let loaded = repository.load_model(&path).unwrap();
    assert_eq!(3, loaded.bones.len());
    assert!(loaded.bones.find_by_name("補助").is_none());
}

#[test]
fn vmd_round_trip_through_repository() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dance.vmd");
    let repository = Repository::default();
    let motion = sample_motion();
    repository.save(&path, &Asset::Motion(motion.clone())).unwrap();

    assert_eq!("初音ミク", repository.load_name(&path).unwrap());
    let loaded = repository.load_motion(&path).unwrap();
    assert_eq!(5, loaded.frame_count());
    assert_eq!(30, loaded.max_frame());
    assert_eq!(0, loaded.min_frame());
    let frames: Vec<&BoneFrame> = loaded.bone_frames("センター").collect();
    let expected: Vec<&BoneFrame> = motion.bone_frames("センター").collect();
    assert_eq!(expected, frames);
    assert_eq!(
        motion.bone_frames("センター").nth(1).unwrap().curves.raw(),
        frames[1].curves.raw()
    );
    assert_eq!(
        Some(0.75),
        loaded.morph_frames("あ").next().map(|frame| frame.ratio)
    );
    assert_eq!(45, loaded.cameras.get(12).unwrap().view_angle);

    let resaved = repository
        .save_to_bytes(&path, &Asset::Motion(loaded))
        .unwrap();
    assert_eq!(std::fs::read(&path).unwrap(), resaved);
}

#[test]
fn pmx_converts_to_json_and_back() {
    let dir = tempfile::tempdir().unwrap();
    let pmx = dir.path().join("model.pmx");
    let json = dir.path().join("model.json");
    let repository = Repository::default();
    let model = sample_model();
    repository.save(&pmx, &Asset::Model(model.clone())).unwrap();
    let loaded = repository.load(&pmx).unwrap();
    repository.save(&json, &loaded).unwrap();

    assert_eq!("サンプル", repository.load_name(&json).unwrap());
    let mirrored = repository.load_model(&json).unwrap();
    assert_eq!(ModelJson::from_model(&model), ModelJson::from_model(&mirrored));
    assert!(mirrored.vertices.is_empty());
    assert!(mirrored.morphs.is_empty());
    let text = std::fs::read_to_string(&json).unwrap();
    assert_eq!(1, text.matches("\"ik\":").count());
}

#[test]
fn vpd_pose_converts_to_vmd() {
    let dir = tempfile::tempdir().unwrap();
    let vpd = dir.path().join("pose.vpd");
    let vmd = dir.path().join("pose.vmd");
    let pose = "Vocaloid Pose Data file\r\n\r\nmiku.osm;\t\t// 親ファイル名\r\n1;\r\n\r\nBone0{右腕\r\n  1.000000,2.000000,3.000000;\t// trans x,y,z\r\n  0.000000,0.000000,0.000000,1.000000;\t// Quaternion x,y,z,w\r\n}\r\n";
    std::fs::write(&vpd, encoding_rs::SHIFT_JIS.encode(pose).0).unwrap();
    let repository = Repository::default();
    assert_eq!("miku", repository.load_name(&vpd).unwrap());
    let asset = repository.load(&vpd).unwrap();
    repository.save(&vmd, &asset).unwrap();
    let motion = repository.load_motion(&vmd).unwrap();
    assert_eq!("miku", motion.name);
    let frame = motion.bone_frames("右腕").next().unwrap();
    assert_eq!(Vector3::new(1.0, 2.0, 3.0), frame.position);
    assert!(matches!(
        repository.save(dir.path().join("pose.vpd"), &asset),
        Err(MmdError::UnsupportedExtension { .. })
    ));
}

#[test]
fn csv_is_copied_verbatim() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("table.csv");
    let output = dir.path().join("copy.csv");
    std::fs::write(&input, "Bone,センター,1\nMorph,あ\n").unwrap();
    let repository = Repository::default();
    let asset = repository.load(&input).unwrap();
    assert_eq!("table", asset.name());
    repository.save(&output, &asset).unwrap();
    assert_eq!(
        std::fs::read(&input).unwrap(),
        std::fs::read(&output).unwrap()
    );
    assert!(matches!(
        repository.save(dir.path().join("table.pmx"), &asset),
        Err(MmdError::UnsupportedModel { expected: "model" })
    ));
}

#[test]
fn unsupported_paths_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notes.txt");
    std::fs::write(&path, "hello").unwrap();
    let repository = Repository::default();
    assert!(!repository.can_load(&path));
    assert!(!repository.can_load(dir.path().join("missing.pmx")));
    assert!(matches!(
        repository.load(&path),
        Err(MmdError::UnsupportedExtension { .. })
    ));
    assert!(matches!(
        repository.load(dir.path().join("missing.pmx")),
        Err(MmdError::Io(_))
    ));
}

#[test]
fn corrupted_pmx_reports_context() {
    let mut buffer = mmdio::common::MutableBuffer::create().unwrap();
    sample_model()
        .save_to_buffer(&mut buffer, &SaveOptions::default())
        .unwrap();
    let bytes = buffer.into_bytes();
    let truncated = &bytes[..bytes.len() / 2];
    let err = Model::load_from_buffer(
        &mut mmdio::common::Buffer::create(truncated),
        &LoadOptions::default(),
    )
    .unwrap_err();
    assert!(matches!(err, MmdError::Corrupted { .. }));
    assert!(matches!(err.root(), MmdError::UnexpectedEof));
}

#[test]
fn mszip_matches_reference_encoder() {
    let mut rng = StdRng::seed_from_u64(0x9E37_79B9_7F4A_7C15);
    let mut cases = vec![
        (random_bytes(&mut rng, 0), Compression::default()),
        (random_bytes(&mut rng, 100), Compression::none()),
        (random_bytes(&mut rng, 70_000), Compression::none()),
        (random_bytes(&mut rng, 5_000), Compression::best()),
        (random_text(&mut rng, 300), Compression::fast()),
        (random_text(&mut rng, 90_000), Compression::best()),
        (random_text(&mut rng, 40_000), Compression::default()),
    ];
    for _ in 0..12 {
        let len = rng.gen_range(1..100_000);
        let data = if rng.gen_bool(0.5) {
            random_bytes(&mut rng, len)
        } else {
            random_text(&mut rng, len)
        };
        cases.push((data, Compression::new(rng.gen_range(0..=9))));
    }
    for (data, level) in cases {
        let framed = mszip(b"tzip", &data, level);
        let output = inflate::decompress_mszip(&framed).unwrap();
        assert_eq!(&framed[..16], &output[..16]);
        assert_eq!(data.len(), output.len() - 16);
        assert!(data == output[16..], "mismatch for {} bytes", data.len());
    }
}

#[test]
fn compressed_x_expands_to_text() {
    let body = &X_MESH.as_bytes()[16..];
    let framed = mszip(b"tzip", body, Compression::best());
    let text = xfile::decompress(&framed).unwrap();
    assert!(text.starts_with(b"xof 0303txt "));
    let mut depth = 0i32;
    for byte in &text {
        match byte {
            b'{' => depth += 1,
            b'}' => depth -= 1,
            _ => {}
        }
        assert!(depth >= 0);
    }
    assert_eq!(0, depth);
    assert_eq!(X_MESH.as_bytes(), text.as_slice());

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("triangle.x");
    std::fs::write(&path, &framed).unwrap();
    let repository = Repository::default();
    let model = repository.load_model(&path).unwrap();
    assert_eq!("triangle", model.name);
    assert_eq!(1, model.faces.len());
    assert_eq!(
        "skin.bmp",
        model.textures.get(model.materials.get(0).unwrap().texture_index).unwrap().name
    );
    assert_eq!(
        Vector3::new(0.0, 10.0, 0.0),
        model.vertices.get(1).unwrap().position
    );
}

#[test]
fn x_converts_to_pmx() {
    let dir = tempfile::tempdir().unwrap();
    let x = dir.path().join("mesh.x");
    let pmx = dir.path().join("mesh.pmx");
    std::fs::write(&x, X_MESH).unwrap();
    let repository = Repository::default();
    assert_eq!("mesh", repository.load_name(&x).unwrap());
    let asset = repository.load(&x).unwrap();
    repository.save(&pmx, &asset).unwrap();
    let model = repository.load_model(&pmx).unwrap();
    assert_eq!("mesh", model.name);
    assert_eq!("X File Version 1.0, flags: 1", model.comment);
    assert_eq!(3, model.vertices.len());
    assert_eq!(8.0, model.materials.get(0).unwrap().specular.w);
    assert!(model.bones.find_by_name("センター").is_some());
    assert_eq!(2, model.display_slots.len());
}

#[test]
fn truncated_mszip_fails_with_block_number() {
    let framed = mszip(b"tzip", X_MESH.as_bytes(), Compression::best());
    let truncated = &framed[..framed.len() - 4];
    let err = inflate::decompress_mszip(truncated).unwrap_err();
    assert!(matches!(err, MmdError::DecompressionFailed { block: 1, .. }));
}
