//! JSON mirror of the bone list of a model.

use cgmath::Vector3;
use serde::{Deserialize, Serialize};

use crate::{
    collection::IndexModel,
    error::Result,
    model::{Bone, BoneFlags, Ik, IkLink, Model},
};

fn to_array(v: Vector3<f32>) -> [f32; 3] {
    [v.x, v.y, v.z]
}

fn to_vector(v: [f32; 3]) -> Vector3<f32> {
    Vector3::new(v[0], v[1], v[2])
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IkLinkJson {
    pub bone_index: i32,
    pub angle_limit: bool,
    /// Radians.
    pub min_angle: [f32; 3],
    /// Radians.
    pub max_angle: [f32; 3],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IkJson {
    pub bone_index: i32,
    pub loop_count: i32,
    pub unit_rotation: f32,
    pub links: Vec<IkLinkJson>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoneJson {
    pub index: i32,
    pub name: String,
    pub english_name: String,
    pub position: [f32; 3],
    pub parent_index: i32,
    pub layer: i32,
    pub bone_flag: u16,
    pub tail_position: [f32; 3],
    pub tail_index: i32,
    pub effect_index: i32,
    pub effect_factor: f32,
    pub fixed_axis: [f32; 3],
    pub local_axis_x: [f32; 3],
    pub local_axis_z: [f32; 3],
    pub effector_key: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ik: Option<IkJson>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelJson {
    pub name: String,
    pub bones: Vec<BoneJson>,
}

impl From<&Bone> for BoneJson {
    fn from(bone: &Bone) -> Self {
        Self {
            index: bone.index(),
            name: bone.name.clone(),
            english_name: bone.english_name.clone(),
            position: to_array(bone.position),
            parent_index: bone.parent_index,
            layer: bone.layer,
            bone_flag: bone.flags.bits(),
            tail_position: to_array(bone.tail_position),
            tail_index: bone.tail_index,
            effect_index: bone.effect_index,
            effect_factor: bone.effect_factor,
            fixed_axis: to_array(bone.fixed_axis),
            local_axis_x: to_array(bone.local_axis_x),
            local_axis_z: to_array(bone.local_axis_z),
            effector_key: bone.effector_key,
            ik: bone.ik.as_ref().map(|ik| IkJson {
                bone_index: ik.bone_index,
                loop_count: ik.loop_count,
                unit_rotation: ik.unit_rotation,
                links: ik
                    .links
                    .iter()
                    .map(|link| IkLinkJson {
                        bone_index: link.bone_index,
                        angle_limit: link.angle_limit,
                        min_angle: to_array(link.min_angle_limit),
                        max_angle: to_array(link.max_angle_limit),
                    })
                    .collect(),
            }),
        }
    }
}

impl BoneJson {
    fn into_bone(self) -> Bone {
        let mut bone = Bone::new(&self.name);
        bone.english_name = self.english_name;
        bone.position = to_vector(self.position);
        bone.parent_index = self.parent_index;
        bone.layer = self.layer;
        bone.flags = BoneFlags::from_bits_retain(self.bone_flag);
        bone.tail_position = to_vector(self.tail_position);
        bone.tail_index = self.tail_index;
        bone.effect_index = self.effect_index;
        bone.effect_factor = self.effect_factor;
        bone.fixed_axis = to_vector(self.fixed_axis);
        bone.local_axis_x = to_vector(self.local_axis_x);
        bone.local_axis_z = to_vector(self.local_axis_z);
        bone.effector_key = self.effector_key;
        bone.ik = self.ik.map(|ik| Ik {
            bone_index: ik.bone_index,
            loop_count: ik.loop_count,
            unit_rotation: ik.unit_rotation,
            links: ik
                .links
                .into_iter()
                .map(|link| IkLink {
                    bone_index: link.bone_index,
                    angle_limit: link.angle_limit,
                    min_angle_limit: to_vector(link.min_angle),
                    max_angle_limit: to_vector(link.max_angle),
                })
                .collect(),
        });
        bone
    }
}

impl ModelJson {
    pub fn from_model(model: &Model) -> Self {
        Self {
            name: model.name.clone(),
            bones: model.bones.iter().map(BoneJson::from).collect(),
        }
    }

    /// A model holding only the mirrored bones, set up.
    pub fn into_model(self) -> Model {
        let mut model = Model::default();
        model.name = self.name;
        for bone in self.bones {
            let expected = bone.index;
            let bone = bone.into_bone();
            let index = model.bones.len() as i32;
            if expected != index {
                log::warn!(
                    "bone `{}` is mirrored with index {} but lands at {}",
                    bone.name,
                    expected,
                    index
                );
            }
            model.bones.append(bone);
        }
        model.setup();
        model
    }
}

pub fn save_to_string(model: &Model) -> Result<String> {
    Ok(serde_json::to_string_pretty(&ModelJson::from_model(model))?)
}

pub fn load_from_str(text: &str) -> Result<Model> {
    let mirror: ModelJson = serde_json::from_str(text)?;
    log::debug!("JSON mirror `{}`: {} bones", mirror.name, mirror.bones.len());
    Ok(mirror.into_model())
}

pub fn load_name(text: &str) -> Result<String> {
    #[derive(Deserialize)]
    struct NameOnly {
        name: String,
    }
    Ok(serde_json::from_str::<NameOnly>(text)?.name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Model {
        let mut model = Model::default();
        model.name = "skeleton".to_owned();
        let mut root = Bone::new("センター");
        root.flags = BoneFlags::CAN_ROTATE | BoneFlags::CAN_TRANSLATE;
        root.position = Vector3::new(0.0, 8.0, 0.0);
        model.bones.append(root);
        let mut ik = Bone::new("左足ＩＫ");
        ik.parent_index = 0;
        ik.flags = BoneFlags::CAN_ROTATE | BoneFlags::IS_IK;
        ik.ik = Some(Ik {
            bone_index: 0,
            loop_count: 40,
            unit_rotation: 0.5,
            links: vec![IkLink {
                bone_index: 0,
                angle_limit: true,
                min_angle_limit: Vector3::new(-3.0, 0.0, 0.0),
                max_angle_limit: Vector3::new(-0.01, 0.0, 0.0),
            }],
        });
        model.bones.append(ik);
        model
    }

    #[test]
    fn test_mirror_round_trip() {
        let model = sample();
        let text = save_to_string(&model).unwrap();
        assert!(text.contains("\n  \"bones\": ["));
        assert!(text.contains("\"position\": [\n"));
        assert_eq!(1, text.matches("\"ik\"").count());
        assert_eq!("skeleton", load_name(&text).unwrap());

        let loaded = load_from_str(&text).unwrap();
        assert_eq!("skeleton", loaded.name);
        assert_eq!(2, loaded.bones.len());
        assert!(loaded.vertices.is_empty() && loaded.materials.is_empty());
        assert!(loaded.display_slots.is_empty());
        assert_eq!(
            ModelJson::from_model(&model),
            ModelJson::from_model(&loaded)
        );
        let ik = loaded.bones.get(1).unwrap().ik.as_ref().unwrap();
        assert_eq!(0.5, ik.unit_rotation);
        assert_eq!(Vector3::new(-3.0, 0.0, 0.0), ik.links[0].min_angle_limit);
    }

    #[test]
    fn test_ik_is_optional_on_load() {
        let text = r#"{"name": "a", "bones": [{"index": 0, "name": "b", "english_name": "",
            "position": [1, 2, 3], "parent_index": -1, "layer": 0, "bone_flag": 26,
            "tail_position": [0, 0, 0], "tail_index": -1, "effect_index": -1,
            "effect_factor": 0, "fixed_axis": [0, 0, 0], "local_axis_x": [1, 0, 0],
            "local_axis_z": [0, 0, 1], "effector_key": 0}]}"#;
        let model = load_from_str(text).unwrap();
        let bone = model.bones.get(0).unwrap();
        assert!(bone.ik.is_none());
        assert_eq!(Vector3::new(1.0, 2.0, 3.0), bone.position);
        assert!(bone.is_visible());
    }
}
