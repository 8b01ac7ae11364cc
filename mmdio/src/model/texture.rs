use crate::{
    collection::{IndexModel, NameModel},
    common::{Buffer, MutableBuffer},
    error::{Result, ResultExt},
};

use super::Info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextureType {
    #[default]
    None,
    Texture,
    Toon,
    Sphere,
}

/// A texture path relative to the model file.
#[derive(Debug, Clone, PartialEq)]
pub struct Texture {
    pub(crate) index: i32,
    pub name: String,
    /// Usage derived by setup from the materials referencing this texture.
    pub texture_type: TextureType,
}

impl Default for Texture {
    fn default() -> Self {
        Self {
            index: -1,
            name: String::new(),
            texture_type: TextureType::None,
        }
    }
}

impl IndexModel for Texture {
    fn index(&self) -> i32 {
        self.index
    }

    fn set_index(&mut self, index: i32) {
        self.index = index;
    }
}

impl NameModel for Texture {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: String) {
        self.name = name;
    }
}

impl Texture {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            ..Default::default()
        }
    }

    pub(crate) fn parse_pmx(info: &Info, buffer: &mut Buffer, i: usize) -> Result<Texture> {
        Ok(Texture {
            index: i as i32,
            name: info.read_text(buffer).context("texture", i, "path")?,
            texture_type: TextureType::None,
        })
    }

    pub(crate) fn save_to_buffer(&self, info: &Info, buffer: &mut MutableBuffer) -> Result<()> {
        info.write_text(buffer, &self.name)
    }
}
