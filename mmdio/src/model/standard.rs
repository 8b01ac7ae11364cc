//! Names, parents and preferred children of the semi-standard MMD skeleton.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use super::bone::BoneFlags;

const ROOT_FLAGS: BoneFlags = BoneFlags::from_bits_retain(0x0002 | 0x0004 | 0x0008 | 0x0010);
const ROTATE_FLAGS: BoneFlags = BoneFlags::from_bits_retain(0x0002 | 0x0008 | 0x0010);
const CHAIN_FLAGS: BoneFlags = BoneFlags::from_bits_retain(0x0001 | 0x0002 | 0x0008 | 0x0010);
const TWIST_FLAGS: BoneFlags = BoneFlags::from_bits_retain(0x0002 | 0x0008 | 0x0010 | 0x0400);
const HIDDEN_EFFECT_FLAGS: BoneFlags = BoneFlags::from_bits_retain(0x0002 | 0x0100);
const IK_FLAGS: BoneFlags = BoneFlags::from_bits_retain(0x0002 | 0x0004 | 0x0008 | 0x0010 | 0x0020);

/// `{d}` expands to `左` and `右`.
const TABLE: &[(&str, &[&str], &[&str], BoneFlags)] = &[
    ("全ての親", &[], &["センター"], ROOT_FLAGS),
    ("センター", &["全ての親"], &["グルーブ", "腰", "上半身", "下半身"], ROOT_FLAGS),
    ("グルーブ", &["センター"], &["腰", "上半身", "下半身"], ROOT_FLAGS),
    ("腰", &["グルーブ", "センター"], &["上半身", "下半身"], ROOT_FLAGS),
    ("下半身", &["腰", "グルーブ", "センター"], &["足中心"], ROTATE_FLAGS),
    ("足中心", &["下半身"], &["{d}足"], BoneFlags::from_bits_retain(0x0002 | 0x0008)),
    ("上半身", &["腰", "グルーブ", "センター"], &["上半身2"], CHAIN_FLAGS),
    ("上半身2", &["上半身"], &["上半身3", "首根元"], CHAIN_FLAGS),
    ("上半身3", &["上半身2"], &["首根元"], CHAIN_FLAGS),
    ("首根元", &["上半身3", "上半身2", "上半身"], &["首"], ROTATE_FLAGS),
    ("首", &["首根元", "上半身3", "上半身2", "上半身"], &["頭"], CHAIN_FLAGS),
    ("頭", &["首"], &[], ROTATE_FLAGS),
    ("両目", &["頭"], &[], ROTATE_FLAGS),
    ("{d}目", &["頭"], &[], BoneFlags::from_bits_retain(0x0002 | 0x0008 | 0x0010 | 0x0100)),
    ("{d}胸", &["上半身3", "上半身2", "上半身"], &[], ROTATE_FLAGS),
    ("{d}肩根元", &["首根元"], &["{d}肩P", "{d}肩"], BoneFlags::from_bits_retain(0x0002 | 0x0008)),
    ("{d}肩P", &["{d}肩根元"], &["{d}肩"], ROTATE_FLAGS),
    ("{d}肩", &["{d}肩P", "{d}肩根元"], &["{d}肩C", "{d}腕"], CHAIN_FLAGS),
    ("{d}肩C", &["{d}肩"], &["{d}腕"], HIDDEN_EFFECT_FLAGS),
    ("{d}腕", &["{d}肩C", "{d}肩"], &["{d}腕捩", "{d}ひじ"], CHAIN_FLAGS),
    ("{d}腕捩", &["{d}腕"], &["{d}ひじ"], TWIST_FLAGS),
    ("{d}ひじ", &["{d}腕捩", "{d}腕"], &["{d}手捩", "{d}手首"], CHAIN_FLAGS),
    ("{d}手捩", &["{d}ひじ"], &["{d}手首"], TWIST_FLAGS),
    ("{d}手首", &["{d}手捩", "{d}ひじ"], &["{d}人指１", "{d}中指１", "{d}薬指１", "{d}小指１"], ROTATE_FLAGS),
    ("{d}親指０", &["{d}手首"], &["{d}親指１"], CHAIN_FLAGS),
    ("{d}親指１", &["{d}親指０"], &["{d}親指２"], CHAIN_FLAGS),
    ("{d}親指２", &["{d}親指１"], &["{d}親指先"], CHAIN_FLAGS),
    ("{d}親指先", &["{d}親指２"], &[], ROTATE_FLAGS),
    ("{d}人指１", &["{d}手首"], &["{d}人指２"], CHAIN_FLAGS),
    ("{d}人指２", &["{d}人指１"], &["{d}人指３"], CHAIN_FLAGS),
    ("{d}人指３", &["{d}人指２"], &["{d}人指先"], CHAIN_FLAGS),
    ("{d}人指先", &["{d}人指３"], &[], ROTATE_FLAGS),
    ("{d}中指１", &["{d}手首"], &["{d}中指２"], CHAIN_FLAGS),
    ("{d}中指２", &["{d}中指１"], &["{d}中指３"], CHAIN_FLAGS),
    ("{d}中指３", &["{d}中指２"], &["{d}中指先"], CHAIN_FLAGS),
    ("{d}中指先", &["{d}中指３"], &[], ROTATE_FLAGS),
    ("{d}薬指１", &["{d}手首"], &["{d}薬指２"], CHAIN_FLAGS),
    ("{d}薬指２", &["{d}薬指１"], &["{d}薬指３"], CHAIN_FLAGS),
    ("{d}薬指３", &["{d}薬指２"], &["{d}薬指先"], CHAIN_FLAGS),
    ("{d}薬指先", &["{d}薬指３"], &[], ROTATE_FLAGS),
    ("{d}小指１", &["{d}手首"], &["{d}小指２"], CHAIN_FLAGS),
    ("{d}小指２", &["{d}小指１"], &["{d}小指３"], CHAIN_FLAGS),
    ("{d}小指３", &["{d}小指２"], &["{d}小指先"], CHAIN_FLAGS),
    ("{d}小指先", &["{d}小指３"], &[], ROTATE_FLAGS),
    ("腰キャンセル{d}", &["腰"], &[], HIDDEN_EFFECT_FLAGS),
    ("{d}足", &["腰キャンセル{d}", "足中心", "下半身"], &["{d}ひざ"], CHAIN_FLAGS),
    ("{d}ひざ", &["{d}足"], &["{d}足首"], CHAIN_FLAGS),
    ("{d}足首", &["{d}ひざ"], &["{d}つま先"], CHAIN_FLAGS),
    ("{d}つま先", &["{d}足首"], &[], ROTATE_FLAGS),
    ("{d}足D", &["腰キャンセル{d}", "足中心", "下半身"], &["{d}ひざD"], CHAIN_FLAGS),
    ("{d}ひざD", &["{d}足D"], &["{d}足首D"], CHAIN_FLAGS),
    ("{d}足首D", &["{d}ひざD"], &["{d}足先EX"], CHAIN_FLAGS),
    ("{d}足先EX", &["{d}足首D"], &[], ROTATE_FLAGS),
    ("{d}足IK親", &["全ての親"], &["{d}足ＩＫ"], ROOT_FLAGS),
    ("{d}足ＩＫ", &["{d}足IK親", "全ての親"], &["{d}つま先ＩＫ"], IK_FLAGS.union(BoneFlags::TAIL_IS_BONE)),
    ("{d}つま先ＩＫ", &["{d}足ＩＫ"], &[], IK_FLAGS),
];

#[derive(Debug, Clone, PartialEq)]
pub struct StandardBoneConfig {
    pub name: String,
    /// Parent candidates, most specific first.
    pub parents: Vec<String>,
    /// Preferred child candidates, most specific first.
    pub tails: Vec<String>,
    pub flags: BoneFlags,
}

fn expand(template: &str, side: &str) -> String {
    template.replace("{d}", side)
}

static STANDARD_BONES: Lazy<HashMap<String, StandardBoneConfig>> = Lazy::new(|| {
    let mut configs = HashMap::with_capacity(TABLE.len() * 2);
    for (name, parents, tails, flags) in TABLE {
        let sides: &[&str] = if name.contains("{d}") {
            &["左", "右"]
        } else {
            &[""]
        };
        for side in sides {
            let config = StandardBoneConfig {
                name: expand(name, side),
                parents: parents.iter().map(|v| expand(v, side)).collect(),
                tails: tails.iter().map(|v| expand(v, side)).collect(),
                flags: *flags,
            };
            configs.insert(config.name.clone(), config);
        }
    }
    configs
});

pub fn standard_bone(name: &str) -> Option<&'static StandardBoneConfig> {
    STANDARD_BONES.get(name)
}

#[test]
fn test_standard_table_expands_sides() {
    let left_arm = standard_bone("左腕").unwrap();
    assert_eq!(vec!["左肩C", "左肩"], left_arm.parents);
    assert_eq!(vec!["左腕捩", "左ひじ"], left_arm.tails);
    assert!(left_arm.flags.contains(BoneFlags::TAIL_IS_BONE));
    let center = standard_bone("センター").unwrap();
    assert_eq!(vec!["全ての親"], center.parents);
    assert!(standard_bone("{d}腕").is_none());
    assert!(standard_bone("髪").is_none());
}
