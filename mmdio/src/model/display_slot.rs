use crate::{
    collection::{IndexModel, NameModel},
    common::{Buffer, MutableBuffer},
    error::{MmdError, Result, ResultExt},
};

use super::Info;

pub const ROOT_SLOT_NAME: &str = "Root";
pub const MORPH_SLOT_NAME: &str = "表情";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayReference {
    Bone(i32),
    Morph(i32),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DisplaySlot {
    pub(crate) index: i32,
    pub name: String,
    pub english_name: String,
    /// Special slots (`Root` and `表情`) cannot be removed in the editor.
    pub is_special: bool,
    pub references: Vec<DisplayReference>,
}

impl Default for DisplaySlot {
    fn default() -> Self {
        Self {
            index: -1,
            name: String::new(),
            english_name: String::new(),
            is_special: false,
            references: vec![],
        }
    }
}

impl IndexModel for DisplaySlot {
    fn index(&self) -> i32 {
        self.index
    }

    fn set_index(&mut self, index: i32) {
        self.index = index;
    }
}

impl NameModel for DisplaySlot {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: String) {
        self.name = name;
    }
}

impl DisplaySlot {
    const ENTITY: &'static str = "display slot";

    pub fn new(name: &str, english_name: &str, is_special: bool) -> Self {
        Self {
            name: name.to_owned(),
            english_name: english_name.to_owned(),
            is_special,
            ..Default::default()
        }
    }

    pub fn root() -> Self {
        Self::new(ROOT_SLOT_NAME, ROOT_SLOT_NAME, true)
    }

    pub fn morphs() -> Self {
        Self::new(MORPH_SLOT_NAME, "Exp", true)
    }

    pub(crate) fn parse_pmx(info: &Info, buffer: &mut Buffer, i: usize) -> Result<DisplaySlot> {
        let name = info.read_text(buffer).context(Self::ENTITY, i, "name")?;
        let english_name = info
            .read_text(buffer)
            .context(Self::ENTITY, i, "english name")?;
        let is_special = buffer.read_bool().context(Self::ENTITY, i, "special flag")?;
        let num_references = buffer
            .read_len()
            .context(Self::ENTITY, i, "reference count")?;
        let mut references = Vec::with_capacity(num_references.min(buffer.remaining()));
        for _ in 0..num_references {
            let reference = match buffer.read_byte().context(Self::ENTITY, i, "reference type")? {
                0 => DisplayReference::Bone(
                    buffer
                        .read_integer_nullable(info.bone_index_size as usize)
                        .context(Self::ENTITY, i, "bone index")?,
                ),
                1 => DisplayReference::Morph(
                    buffer
                        .read_integer_nullable(info.morph_index_size as usize)
                        .context(Self::ENTITY, i, "morph index")?,
                ),
                value => {
                    return Err(MmdError::UnknownEnum {
                        field: "display reference type",
                        value: value as i64,
                    }
                    .corrupted(Self::ENTITY, i, "reference type"))
                }
            };
            references.push(reference);
        }
        Ok(DisplaySlot {
            index: i as i32,
            name,
            english_name,
            is_special,
            references,
        })
    }

    pub(crate) fn save_to_buffer(&self, info: &Info, buffer: &mut MutableBuffer) -> Result<()> {
        info.write_text(buffer, &self.name)?;
        info.write_text(buffer, &self.english_name)?;
        buffer.write_bool(self.is_special)?;
        buffer.write_len(self.references.len())?;
        for reference in &self.references {
            match reference {
                DisplayReference::Bone(index) => {
                    buffer.write_byte(0)?;
                    buffer.write_integer(*index, info.bone_index_size as usize)?;
                }
                DisplayReference::Morph(index) => {
                    buffer.write_byte(1)?;
                    buffer.write_integer(*index, info.morph_index_size as usize)?;
                }
            }
        }
        Ok(())
    }
}
