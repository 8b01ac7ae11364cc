use std::{
    collections::HashSet,
    ops::{Deref, DerefMut},
};

use cgmath::{InnerSpace, Vector3, Zero};

use crate::{
    collection::{IndexModel, NamedCollection, ReindexResult},
    error::{MmdError, Result},
};

use super::{bone::Bone, standard::standard_bone};

/// The bone collection plus the deformation order computed by [`Bones::setup`].
#[derive(Debug, Clone, Default)]
pub struct Bones {
    values: NamedCollection<Bone>,
    before_physics_indexes: Vec<i32>,
    after_physics_indexes: Vec<i32>,
}

impl Deref for Bones {
    type Target = NamedCollection<Bone>;

    fn deref(&self) -> &Self::Target {
        &self.values
    }
}

impl DerefMut for Bones {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.values
    }
}

impl From<NamedCollection<Bone>> for Bones {
    fn from(values: NamedCollection<Bone>) -> Self {
        Self {
            values,
            before_physics_indexes: vec![],
            after_physics_indexes: vec![],
        }
    }
}

#[derive(Default)]
struct BackReferences {
    ik_links: Vec<Vec<i32>>,
    ik_targets: Vec<Vec<i32>>,
    effectives: Vec<Vec<i32>>,
}

fn is_valid_index(bones: &[Bone], index: i32) -> bool {
    index >= 0
        && bones
            .get(index as usize)
            .map(|bone| bone.is_valid())
            .unwrap_or(false)
}

fn follow(
    bones: &[Bone],
    refs: &BackReferences,
    index: i32,
    relatives: &mut Vec<i32>,
    parents: &mut Vec<i32>,
) {
    if !is_valid_index(bones, index) {
        return;
    }
    let bone = &bones[index as usize];
    if is_valid_index(bones, bone.parent_index) && !relatives.contains(&bone.parent_index) {
        parents.insert(0, bone.parent_index);
        relatives.push(bone.parent_index);
        follow(bones, refs, bone.parent_index, relatives, parents);
    }
    let mut targets = vec![];
    if bone.has_effector() {
        targets.push(bone.effect_index);
    }
    if let (true, Some(ik)) = (bone.is_ik(), bone.ik.as_ref()) {
        targets.push(ik.bone_index);
        targets.extend(ik.links.iter().map(|link| link.bone_index));
    }
    let slot = index as usize;
    targets.extend(&refs.effectives[slot]);
    targets.extend(&refs.ik_targets[slot]);
    targets.extend(&refs.ik_links[slot]);
    for target in targets {
        if is_valid_index(bones, target) && !relatives.contains(&target) {
            relatives.push(target);
            let mut scratch = parents.clone();
            follow(bones, refs, target, relatives, &mut scratch);
        }
    }
}

impl Bones {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_inner(self) -> NamedCollection<Bone> {
        self.values
    }

    pub fn before_physics_indexes(&self) -> &[i32] {
        &self.before_physics_indexes
    }

    pub fn after_physics_indexes(&self) -> &[i32] {
        &self.after_physics_indexes
    }

    /// Global deformation order: every before-physics bone, then every after-physics bone.
    pub fn layer_sorted_indexes(&self) -> Vec<i32> {
        self.before_physics_indexes
            .iter()
            .chain(self.after_physics_indexes.iter())
            .copied()
            .collect()
    }

    pub fn layer_position(&self, index: i32) -> Option<usize> {
        self.before_physics_indexes
            .iter()
            .chain(self.after_physics_indexes.iter())
            .position(|v| *v == index)
    }

    /// First existing bone among `candidates`.
    pub fn resolve_parent(&self, candidates: &[&str]) -> Result<&Bone> {
        candidates
            .iter()
            .find_map(|name| self.values.find_by_name(name))
            .ok_or_else(|| MmdError::ParentNotFound {
                parent: candidates.first().map(|v| v.to_string()).unwrap_or_default(),
                candidates: candidates.iter().map(|v| v.to_string()).collect(),
            })
    }

    /// Resolves the parent of a semi-standard bone through the standard skeleton table.
    pub fn resolve_standard_parent(&self, name: &str) -> Result<&Bone> {
        let candidates = standard_bone(name)
            .map(|config| config.parents.clone())
            .unwrap_or_default();
        let candidates: Vec<&str> = candidates.iter().map(|v| v.as_str()).collect();
        self.resolve_parent(&candidates)
    }

    fn standard_child_position(&self, bone: &Bone) -> Option<Vector3<f32>> {
        standard_bone(&bone.name)?
            .tails
            .iter()
            .filter_map(|name| self.values.find_by_name(name))
            .find(|child| child.index() != bone.index())
            .map(|child| child.position)
    }

    fn child_relative_position(&self, bone: &Bone) -> Vector3<f32> {
        let bones = self.values.as_slice();
        let parent = is_valid_index(bones, bone.parent_index)
            .then(|| &bones[bone.parent_index as usize]);
        let (from, to) = if let Some(position) = self.standard_child_position(bone) {
            (bone.position, position)
        } else if bone.is_tail_bone() && is_valid_index(bones, bone.tail_index) {
            (bone.position, bones[bone.tail_index as usize].position)
        } else if !bone.is_tail_bone() && bone.tail_position.magnitude() > 0f32 {
            (bone.position, bone.tail_position + bone.position)
        } else if let Some(parent) = parent {
            (parent.position, bone.position)
        } else {
            return Vector3::zero();
        };
        to - from
    }

    /// Recomputes every derived link, the layer order and the per-bone deform sets.
    pub fn setup(&mut self) {
        let len = self.values.len();
        for bone in self.values.iter_mut() {
            bone.extend.clear_links();
        }
        let bones = self.values.as_slice();
        let mut refs = BackReferences {
            ik_links: vec![vec![]; len],
            ik_targets: vec![vec![]; len],
            effectives: vec![vec![]; len],
        };
        let mut limits = vec![None; len];
        for bone in bones {
            let index = bone.index();
            if let (true, Some(ik)) = (bone.is_ik(), bone.ik.as_ref()) {
                for link in &ik.links {
                    if is_valid_index(bones, link.bone_index)
                        && !refs.ik_links[link.bone_index as usize].contains(&index)
                    {
                        refs.ik_links[link.bone_index as usize].push(index);
                        limits[link.bone_index as usize] = Some((
                            link.angle_limit,
                            link.min_angle_limit,
                            link.max_angle_limit,
                        ));
                    }
                }
                if is_valid_index(bones, ik.bone_index)
                    && !refs.ik_targets[ik.bone_index as usize].contains(&index)
                {
                    refs.ik_targets[ik.bone_index as usize].push(index);
                }
            }
            if bone.has_effector()
                && is_valid_index(bones, bone.effect_index)
                && !refs.effectives[bone.effect_index as usize].contains(&index)
            {
                refs.effectives[bone.effect_index as usize].push(index);
            }
        }
        let mut children = vec![vec![]; len];
        let mut closures = Vec::with_capacity(len);
        let mut geometry = Vec::with_capacity(len);
        for bone in bones {
            let mut relatives = vec![];
            let mut parents = vec![];
            follow(bones, &refs, bone.index(), &mut relatives, &mut parents);
            relatives.retain(|index| *index != bone.index());
            parents.retain(|index| *index != bone.index());
            closures.push((parents, relatives));
            let parent_relative_position = if is_valid_index(bones, bone.parent_index) {
                children[bone.parent_index as usize].push(bone.index());
                bone.position - bones[bone.parent_index as usize].position
            } else {
                bone.position
            };
            geometry.push((parent_relative_position, self.child_relative_position(bone)));
        }
        let parent_names: Vec<Vec<String>> = closures
            .iter()
            .map(|(parents, _)| {
                parents
                    .iter()
                    .map(|index| bones[*index as usize].name.clone())
                    .collect()
            })
            .collect();
        for (slot, bone) in self.values.iter_mut().enumerate() {
            let extend = &mut bone.extend;
            if bone.name.starts_with('左') {
                extend.axis_sign = -1;
            }
            extend.ik_link_bone_indexes = std::mem::take(&mut refs.ik_links[slot]);
            extend.ik_target_bone_indexes = std::mem::take(&mut refs.ik_targets[slot]);
            extend.effective_bone_indexes = std::mem::take(&mut refs.effectives[slot]);
            extend.child_bone_indexes = std::mem::take(&mut children[slot]);
            if let Some((angle_limit, min, max)) = limits[slot] {
                extend.angle_limit = angle_limit;
                extend.min_angle_limit = min;
                extend.max_angle_limit = max;
            }
            let (parents, relatives) = std::mem::take(&mut closures[slot]);
            extend.parent_bone_indexes = parents;
            extend.relative_bone_indexes = relatives;
            extend.parent_bone_names = parent_names[slot].clone();
            (extend.parent_relative_position, extend.child_relative_position) = geometry[slot];
            bone.setup_local_frame();
        }
        self.sort_layers();
        log::trace!(
            "bones set up: {} before physics, {} after physics",
            self.before_physics_indexes.len(),
            self.after_physics_indexes.len()
        );
    }

    fn sort_layers(&mut self) {
        let mut keyed: Vec<(bool, i32, i32)> = self
            .values
            .iter()
            .filter(|bone| bone.is_valid())
            .map(|bone| (bone.is_after_physics_deform(), bone.layer, bone.index()))
            .collect();
        keyed.sort_unstable();
        self.before_physics_indexes = keyed
            .iter()
            .filter(|(after, _, _)| !after)
            .map(|(_, _, index)| *index)
            .collect();
        self.after_physics_indexes = keyed
            .iter()
            .filter(|(after, _, _)| *after)
            .map(|(_, _, index)| *index)
            .collect();
        let order = self.layer_sorted_indexes();
        for bone in self.values.iter_mut() {
            let mut members: HashSet<i32> =
                bone.extend.relative_bone_indexes.iter().copied().collect();
            members.insert(bone.index());
            bone.extend.deform_bone_indexes = order
                .iter()
                .copied()
                .filter(|index| members.contains(index))
                .collect();
        }
    }

    fn insertion_anchor(&self, bone: &Bone) -> Option<usize> {
        let mut anchors = vec![bone.parent_index];
        if let Some(ik) = bone.ik.as_ref().filter(|_| bone.is_ik()) {
            anchors.push(ik.bone_index);
            anchors.extend(ik.links.iter().map(|link| link.bone_index));
        }
        if bone.has_effector() {
            anchors.push(bone.effect_index);
            if let Ok(effector) = self.values.get(bone.effect_index) {
                if effector.has_effector() {
                    anchors.push(effector.effect_index);
                }
            }
        }
        anchors
            .into_iter()
            .filter(|index| *index >= 0)
            .filter_map(|index| self.layer_position(index))
            .max()
    }

    /// Appends `bone` and chooses its layer so that it deforms right after the bones it depends on.
    pub fn insert_after_setup(&mut self, mut bone: Bone) -> (i32, ReindexResult) {
        let order = self.layer_sorted_indexes();
        let layer_at = |position: usize| -> i32 {
            self.values
                .get(order[position])
                .map(|bone| bone.layer)
                .unwrap_or_default()
        };
        let insert_position = self.insertion_anchor(&bone).map(|v| v + 1).unwrap_or(0);
        let mut shift_from = None;
        bone.layer = match (insert_position.checked_sub(1), insert_position < order.len()) {
            (None, false) => 0,
            (None, true) => {
                let next = layer_at(0);
                if next > 0 {
                    next - 1
                } else {
                    shift_from = Some(0);
                    next
                }
            }
            (Some(prev), false) => layer_at(prev),
            (Some(prev), true) => {
                let (prev_layer, next_layer) = (layer_at(prev), layer_at(insert_position));
                if next_layer - prev_layer >= 2 {
                    prev_layer + 1
                } else if next_layer > prev_layer {
                    prev_layer
                } else {
                    shift_from = Some(insert_position);
                    prev_layer
                }
            }
        };
        if let Some(start) = shift_from {
            let shifted: HashSet<i32> = order[start..].iter().copied().collect();
            for other in self.values.iter_mut() {
                if shifted.contains(&other.index()) {
                    other.layer += 1;
                }
            }
        }
        log::debug!(
            "inserting bone {} at layer position {} with layer {}",
            bone.name,
            insert_position,
            bone.layer
        );
        let result = self.values.append(bone);
        self.setup();
        (self.values.len() as i32 - 1, result)
    }
}

#[cfg(test)]
mod tests {
    use cgmath::Vector3;

    use super::*;
    use crate::model::bone::{BoneFlags, Ik, IkLink};

    fn bone(name: &str, parent_index: i32, layer: i32, y: f32) -> Bone {
        Bone {
            parent_index,
            layer,
            position: Vector3::new(0f32, y, 0f32),
            flags: BoneFlags::CAN_ROTATE | BoneFlags::IS_VISIBLE,
            ..Bone::new(name)
        }
    }

    fn leg_chain() -> Bones {
        let mut bones = Bones::new();
        bones.append(bone("センター", -1, 0, 8f32));
        bones.append(bone("左足", 0, 0, 10f32));
        bones.append(bone("左ひざ", 1, 0, 5f32));
        bones.append(bone("左足首", 2, 0, 1f32));
        let mut ik = bone("左足ＩＫ", 0, 1, 1f32);
        ik.flags |= BoneFlags::IS_IK;
        ik.ik = Some(Ik {
            bone_index: 3,
            loop_count: 40,
            unit_rotation: 2f32,
            links: vec![
                IkLink {
                    bone_index: 2,
                    angle_limit: true,
                    min_angle_limit: Vector3::new(-3.14f32, 0f32, 0f32),
                    max_angle_limit: Vector3::new(-0.01f32, 0f32, 0f32),
                },
                IkLink {
                    bone_index: 1,
                    ..Default::default()
                },
            ],
        });
        bones.append(ik);
        let mut physics = bone("髪", 0, 0, 12f32);
        physics.flags |= BoneFlags::IS_AFTER_PHYSICS_DEFORM;
        bones.append(physics);
        bones.setup();
        bones
    }

    #[test]
    fn test_ik_back_references() {
        let bones = leg_chain();
        for bone in bones.iter() {
            for ik_index in &bone.extend.ik_link_bone_indexes {
                assert!(bones.get(*ik_index).unwrap().is_ik());
            }
        }
        let knee = bones.get_by_name("左ひざ").unwrap();
        assert_eq!(vec![4], knee.extend.ik_link_bone_indexes);
        assert!(knee.extend.angle_limit);
        assert_eq!(vec![4], bones.get(3).unwrap().extend.ik_target_bone_indexes);
        assert_eq!(vec![0, 1], knee.extend.parent_bone_indexes);
        assert_eq!(vec!["センター", "左足"], knee.extend.parent_bone_names);
        assert_eq!(-1, knee.extend.axis_sign);
        assert_eq!(vec![1, 4, 5], bones.get(0).unwrap().extend.child_bone_indexes);
    }

    #[test]
    fn test_layer_order_is_topological() {
        let bones = leg_chain();
        assert_eq!(vec![0, 1, 2, 3, 4], bones.before_physics_indexes());
        assert_eq!(vec![5], bones.after_physics_indexes());
        let order = bones.layer_sorted_indexes();
        let keys: Vec<(bool, i32, i32)> = order
            .iter()
            .map(|index| {
                let bone = bones.get(*index).unwrap();
                (bone.is_after_physics_deform(), bone.layer, bone.index())
            })
            .collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(sorted, keys);
        let ankle = bones.get(3).unwrap();
        assert_eq!(vec![0, 1, 2, 3, 4], ankle.extend.deform_bone_indexes);
    }

    #[test]
    fn test_geometry() {
        let bones = leg_chain();
        let knee = bones.get(2).unwrap();
        assert_eq!(Vector3::new(0f32, -5f32, 0f32), knee.extend.parent_relative_position);
        // standard child of 左ひざ is 左足首
        assert_eq!(Vector3::new(0f32, -4f32, 0f32), knee.extend.child_relative_position);
        assert_eq!(Vector3::new(0f32, -1f32, 0f32), knee.extend.local_axis);
        let center = bones.get(0).unwrap();
        assert_eq!(Vector3::new(0f32, 8f32, 0f32), center.extend.parent_relative_position);
    }

    #[test]
    fn test_setup_is_idempotent() {
        let mut bones = leg_chain();
        let first: Vec<Bone> = bones.iter().cloned().collect();
        bones.setup();
        let second: Vec<Bone> = bones.iter().cloned().collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_insert_after_setup_shifts_layers() {
        let mut bones = leg_chain();
        let (index, result) = bones.insert_after_setup(bone("左足D", 0, 0, 10f32));
        assert_eq!(6, index);
        assert!(!result.changed);
        assert_eq!(Some(1), bones.layer_position(6));
        assert_eq!(0, bones.get(6).unwrap().layer);
        assert_eq!(1, bones.get(1).unwrap().layer);
        assert_eq!(2, bones.get(4).unwrap().layer);
        assert_eq!(0, bones.get(0).unwrap().layer);
    }

    #[test]
    fn test_insert_after_setup_uses_gap() {
        let mut bones = Bones::new();
        bones.append(bone("a", -1, 0, 0f32));
        bones.append(bone("b", 0, 5, 0f32));
        bones.setup();
        let (index, _) = bones.insert_after_setup(bone("c", 0, 0, 0f32));
        assert_eq!(1, bones.get(index).unwrap().layer);
        assert_eq!(vec![0, 2, 1], bones.layer_sorted_indexes());
    }

    #[test]
    fn test_insert_root_goes_first() {
        let mut bones = leg_chain();
        let (index, _) = bones.insert_after_setup(bone("全ての親", -1, 0, 0f32));
        assert_eq!(Some(0), bones.layer_position(index));
    }

    #[test]
    fn test_resolve_parent() {
        let bones = leg_chain();
        assert_eq!(0, bones.resolve_parent(&["グルーブ", "センター"]).unwrap().index());
        assert_eq!(1, bones.resolve_standard_parent("左ひざ").unwrap().index());
        assert!(matches!(
            bones.resolve_parent(&["腰", "グルーブ"]),
            Err(MmdError::ParentNotFound { parent, candidates })
                if parent == "腰" && candidates.len() == 2
        ));
    }
}
