use crate::{
    collection::IndexModel,
    common::{Buffer, MutableBuffer},
    error::{Result, ResultExt},
};

use super::Info;

/// One triangle of the flat vertex index stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Face {
    pub(crate) index: i32,
    pub vertex_indexes: [i32; 3],
}

impl Default for Face {
    fn default() -> Self {
        Self {
            index: -1,
            vertex_indexes: [0; 3],
        }
    }
}

impl IndexModel for Face {
    fn index(&self) -> i32 {
        self.index
    }

    fn set_index(&mut self, index: i32) {
        self.index = index;
    }
}

impl Face {
    pub fn new(v0: i32, v1: i32, v2: i32) -> Self {
        Self {
            index: -1,
            vertex_indexes: [v0, v1, v2],
        }
    }

    pub(crate) fn parse_pmx(info: &Info, buffer: &mut Buffer, i: usize) -> Result<Face> {
        let size = info.vertex_index_size as usize;
        let indexes = buffer
            .read_integer_array(size, 3)
            .context("face", i, "vertex index")?;
        Ok(Face {
            index: i as i32,
            vertex_indexes: [indexes[0], indexes[1], indexes[2]],
        })
    }

    pub(crate) fn save_to_buffer(&self, info: &Info, buffer: &mut MutableBuffer) -> Result<()> {
        for index in self.vertex_indexes {
            buffer.write_integer(index, info.vertex_index_size as usize)?;
        }
        Ok(())
    }
}

#[test]
fn test_face_stream() {
    let info = Info {
        vertex_index_size: 1,
        ..Default::default()
    };
    let mut buffer = MutableBuffer::create().unwrap();
    for face in [Face::new(0, 1, 2), Face::new(2, 1, 3), Face::new(4, 5, 6)] {
        face.save_to_buffer(&info, &mut buffer).unwrap();
    }
    assert_eq!(&[0, 1, 2, 2, 1, 3, 4, 5, 6], buffer.as_bytes());
    let bytes = buffer.into_bytes();
    let mut reader = Buffer::create(&bytes);
    let second = {
        Face::parse_pmx(&info, &mut reader, 0).unwrap();
        Face::parse_pmx(&info, &mut reader, 1).unwrap()
    };
    assert_eq!([2, 1, 3], second.vertex_indexes);
    assert_eq!(1, second.index());
}
