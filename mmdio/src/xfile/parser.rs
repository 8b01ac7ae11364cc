use cgmath::{Vector2, Vector3, Vector4, Zero};

use crate::{
    error::{MmdError, Result},
    model::{Deform, Face, Material, Model, SphereMode, Texture, TextureType, Vertex},
};

use super::{
    lexer::Token,
    normals::{self, MeshNormals},
};

/// MMD units per .x unit.
const POSITION_SCALE: f32 = 10.0;

/// Per-mesh state needed after the mesh block closes.
#[derive(Debug, Default)]
struct MeshContext {
    vertex_offset: usize,
    vertex_count: usize,
    /// Triangles of each source face, in file order.
    face_groups: Vec<Vec<Face>>,
    /// Vertex indexes of each source face as written, before triangulation.
    face_indexes: Vec<Vec<usize>>,
    normals: Vec<Vector3<f32>>,
    normal_face_indexes: Vec<Vec<usize>>,
}

pub(crate) struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    model: &'a mut Model,
    threads: Option<usize>,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a [Token], model: &'a mut Model, threads: Option<usize>) -> Self {
        Self {
            tokens,
            pos: 0,
            model,
            threads,
        }
    }

    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<&'a Token> {
        let token = self.tokens.get(self.pos);
        self.pos += 1;
        token
    }

    fn peek_identifier(&self) -> Option<&'a str> {
        match self.peek() {
            Some(Token::Identifier(value)) => Some(value.as_str()),
            _ => None,
        }
    }

    fn unexpected(expected: &'static str, found: Option<&Token>) -> MmdError {
        MmdError::UnexpectedToken {
            expected,
            found: found
                .map(Token::describe)
                .unwrap_or_else(|| "end of file".to_owned()),
        }
    }

    fn expect(&mut self, expected: Token, label: &'static str) -> Result<()> {
        match self.next() {
            Some(token) if *token == expected => Ok(()),
            other => Err(Self::unexpected(label, other)),
        }
    }

    fn expect_semicolon(&mut self) -> Result<()> {
        self.expect(Token::Semicolon, "`;`")
    }

    fn skip_semicolon(&mut self) {
        if self.peek() == Some(&Token::Semicolon) {
            self.pos += 1;
        }
    }

    fn number(&mut self) -> Result<f64> {
        match self.next() {
            Some(Token::Number(value)) => value.parse().map_err(|_| MmdError::UnexpectedToken {
                expected: "number",
                found: format!("`{}`", value),
            }),
            other => Err(Self::unexpected("number", other)),
        }
    }

    fn float(&mut self) -> Result<f32> {
        let value = self.number()? as f32;
        self.expect_semicolon()?;
        Ok(value)
    }

    /// Every counted item takes at least one token, so a count beyond the tokens left is
    /// rejected before anything is reserved for it.
    fn count(&mut self, field: &'static str) -> Result<usize> {
        let value = self.number()?;
        self.expect_semicolon()?;
        let remaining = self.tokens.len().saturating_sub(self.pos);
        if value < 0.0 || value > remaining as f64 || value.fract() != 0.0 {
            return Err(MmdError::UnknownEnum {
                field,
                value: value as i64,
            });
        }
        Ok(value as usize)
    }

    fn vector3(&mut self) -> Result<Vector3<f32>> {
        Ok(Vector3::new(self.float()?, self.float()?, self.float()?))
    }

    fn vector4(&mut self) -> Result<Vector4<f32>> {
        Ok(Vector4::new(
            self.float()?,
            self.float()?,
            self.float()?,
            self.float()?,
        ))
    }

    /// Skips `{ ... }` including nested blocks. Nothing happens when no block follows.
    fn skip_block(&mut self) -> Result<()> {
        if self.peek() != Some(&Token::LeftBrace) {
            return Ok(());
        }
        self.pos += 1;
        let mut depth = 1;
        while depth > 0 {
            match self.next() {
                Some(Token::LeftBrace) => depth += 1,
                Some(Token::RightBrace) => depth -= 1,
                Some(_) => {}
                None => return Err(Self::unexpected("`}`", None)),
            }
        }
        Ok(())
    }

    /// Consumes the optional instance name before `{`.
    fn skip_instance_name(&mut self) {
        if matches!(self.peek(), Some(Token::Identifier(_) | Token::Text(_))) {
            self.pos += 1;
        }
    }

    pub fn parse(&mut self) -> Result<()> {
        while let Some(token) = self.peek() {
            match token {
                Token::Identifier(name) if name == "template" => {
                    self.pos += 1;
                    self.parse_template()?;
                }
                Token::Identifier(name) if name == "Header" => {
                    self.pos += 1;
                    self.parse_header()?;
                }
                Token::Identifier(name) if name == "Mesh" => {
                    self.pos += 1;
                    self.parse_mesh()?;
                }
                Token::Identifier(name) => {
                    self.pos += 1;
                    if self.peek() == Some(&Token::LeftBrace) {
                        log::debug!("skipping .x block {}", name);
                    }
                    self.skip_block()?;
                }
                _ => self.pos += 1,
            }
        }
        Ok(())
    }

    fn parse_template(&mut self) -> Result<()> {
        match self.next() {
            Some(Token::Identifier(name)) => log::trace!("template {}", name),
            other => return Err(Self::unexpected("template name", other)),
        }
        if self.tokens.get(self.pos + 1).map_or(true, |t| !matches!(t, Token::Guid(_))) {
            return Err(Self::unexpected("template guid", self.tokens.get(self.pos + 1)));
        }
        self.skip_block()
    }

    fn parse_header(&mut self) -> Result<()> {
        self.expect(Token::LeftBrace, "`{`")?;
        let major = self.number()?;
        self.expect_semicolon()?;
        let minor = self.number()?;
        self.expect_semicolon()?;
        let flags = self.number()?;
        self.expect_semicolon()?;
        self.expect(Token::RightBrace, "`}`")?;
        self.model.comment = format!(
            "X File Version {:.0}.{:.0}, flags: {:.0}",
            major, minor, flags
        );
        Ok(())
    }

    fn parse_mesh(&mut self) -> Result<()> {
        self.skip_instance_name();
        self.expect(Token::LeftBrace, "`{`")?;
        let mut mesh = MeshContext {
            vertex_offset: self.model.vertices.len(),
            ..Default::default()
        };
        mesh.vertex_count = self.count("mesh vertex count")?;
        for _ in 0..mesh.vertex_count {
            let mut vertex = Vertex::default();
            vertex.position = self.vector3()? * POSITION_SCALE;
            vertex.normal = Vector3::unit_y();
            vertex.deform = Deform::Bdef1 { index: 0 };
            vertex.edge_factor = 1.0;
            self.model.vertices.append(vertex);
        }
        self.skip_semicolon();
        let face_count = self.count("mesh face count")?;
        for _ in 0..face_count {
            let indexes = self.face_indexes("face vertex count")?;
            let mut group = Vec::with_capacity(indexes.len() - 2);
            for i in 1..indexes.len() - 1 {
                let mut triangle = [indexes[0], indexes[i], indexes[i + 1]];
                for index in triangle.iter_mut() {
                    if *index >= mesh.vertex_count {
                        return Err(MmdError::IndexOutOfRange {
                            index: *index as i32,
                            length: mesh.vertex_count,
                        });
                    }
                    *index += mesh.vertex_offset;
                }
                group.push(Face::new(
                    triangle[0] as i32,
                    triangle[1] as i32,
                    triangle[2] as i32,
                ));
            }
            mesh.face_groups.push(group);
            mesh.face_indexes.push(indexes);
        }
        self.skip_semicolon();
        let mut has_material_list = false;
        while let Some(name) = self.peek_identifier() {
            self.pos += 1;
            match name {
                "MeshMaterialList" => {
                    has_material_list = true;
                    self.parse_material_list(&mesh)?;
                }
                "MeshTextureCoords" => self.parse_texture_coords(&mesh)?,
                "MeshNormals" => self.parse_normals(&mut mesh)?,
                _ => {
                    log::debug!("skipping mesh block {}", name);
                    self.skip_instance_name();
                    self.skip_block()?;
                }
            }
        }
        if !has_material_list {
            let mut material = default_material(self.model.materials.len());
            for face in mesh.face_groups.iter().flatten() {
                self.model.faces.append(face.clone());
                material.vertex_count += 3;
            }
            self.model.materials.append(material);
        }
        self.expect(Token::RightBrace, "`}`")?;
        self.apply_normals(&mesh)?;
        log::debug!(
            "mesh: {} vertices, {} faces",
            mesh.vertex_count,
            mesh.face_groups.len()
        );
        Ok(())
    }

    /// Reads `n; i0, i1, ...;` with at least three indexes.
    fn face_indexes(&mut self, field: &'static str) -> Result<Vec<usize>> {
        let count = self.count(field)?;
        if count < 3 {
            return Err(MmdError::UnknownEnum {
                field,
                value: count as i64,
            });
        }
        let mut indexes = Vec::with_capacity(count);
        for _ in 0..count {
            let value = self.number()?;
            if value < 0.0 {
                return Err(MmdError::IndexOutOfRange {
                    index: value as i32,
                    length: count,
                });
            }
            indexes.push(value as usize);
        }
        self.expect_semicolon()?;
        Ok(indexes)
    }

    fn parse_material_list(&mut self, mesh: &MeshContext) -> Result<()> {
        self.expect(Token::LeftBrace, "`{`")?;
        let material_count = self.count("material count")?;
        let face_count = self.count("material face count")?;
        if face_count != mesh.face_groups.len() {
            return Err(MmdError::UnknownEnum {
                field: "material face count",
                value: face_count as i64,
            });
        }
        let mut faces_by_material: Vec<Vec<usize>> = vec![vec![]; material_count];
        for face in 0..face_count {
            let value = self.number()?;
            if value < 0.0 || value as usize >= material_count {
                return Err(MmdError::IndexOutOfRange {
                    index: value as i32,
                    length: material_count,
                });
            }
            faces_by_material[value as usize].push(face);
        }
        self.expect_semicolon()?;
        self.skip_semicolon();
        let first_material = self.model.materials.len();
        for _ in 0..material_count {
            match self.peek() {
                Some(Token::Identifier(name)) if name == "Material" => {
                    self.pos += 1;
                    self.parse_material()?;
                }
                Some(Token::Identifier(_)) => {
                    self.pos += 1;
                    self.skip_block()?;
                    let material = default_material(self.model.materials.len());
                    self.model.materials.append(material);
                }
                _ => {
                    // `{ name }` refers to a material defined elsewhere
                    self.skip_block()?;
                    let material = default_material(self.model.materials.len());
                    self.model.materials.append(material);
                }
            }
        }
        for (offset, faces) in faces_by_material.iter().enumerate() {
            let mut triangles = 0;
            for &face in faces {
                for triangle in &mesh.face_groups[face] {
                    self.model.faces.append(triangle.clone());
                    triangles += 1;
                }
            }
            let material = self
                .model
                .materials
                .get_mut((first_material + offset) as i32)?;
            material.vertex_count += triangles * 3;
        }
        self.expect(Token::RightBrace, "`}`")
    }

    fn parse_material(&mut self) -> Result<()> {
        self.skip_instance_name();
        self.expect(Token::LeftBrace, "`{`")?;
        let mut material = default_material(self.model.materials.len());
        material.diffuse = self.vector4()?;
        self.skip_semicolon();
        let power = self.float()?;
        let specular = self.vector3()?;
        self.skip_semicolon();
        material.specular = specular.extend(power);
        material.ambient = self.vector3()?;
        self.skip_semicolon();
        while let Some(name) = self.peek_identifier() {
            self.pos += 1;
            if name == "TextureFilename" || name == "TextureFileName" {
                self.expect(Token::LeftBrace, "`{`")?;
                let file_name = match self.next() {
                    Some(Token::Text(value) | Token::Identifier(value)) => value.clone(),
                    other => return Err(Self::unexpected("texture file name", other)),
                };
                self.skip_semicolon();
                self.expect(Token::RightBrace, "`}`")?;
                let (texture, sphere) = split_texture_name(&file_name);
                if let Some(texture) = texture {
                    material.texture_index = self.ensure_texture(texture, TextureType::Texture);
                }
                if let Some(sphere) = sphere {
                    material.sphere_texture_index =
                        self.ensure_texture(sphere, TextureType::Sphere);
                }
            } else {
                self.skip_instance_name();
                self.skip_block()?;
            }
        }
        self.expect(Token::RightBrace, "`}`")?;
        apply_sphere_mode(&mut material);
        self.model.materials.append(material);
        Ok(())
    }

    fn ensure_texture(&mut self, name: &str, texture_type: TextureType) -> i32 {
        if let Some(index) = self.model.textures.index_of(name) {
            return index;
        }
        let mut texture = Texture::new(name);
        texture.texture_type = texture_type;
        self.model.textures.append(texture);
        self.model.textures.len() as i32 - 1
    }

    fn parse_texture_coords(&mut self, mesh: &MeshContext) -> Result<()> {
        self.skip_instance_name();
        self.expect(Token::LeftBrace, "`{`")?;
        let count = self.count("texture coordinate count")?;
        if count > mesh.vertex_count {
            return Err(MmdError::IndexOutOfRange {
                index: count as i32 - 1,
                length: mesh.vertex_count,
            });
        }
        for i in 0..count {
            let uv = Vector2::new(self.float()?, self.float()?);
            self.skip_semicolon();
            self.model
                .vertices
                .get_mut((mesh.vertex_offset + i) as i32)?
                .uv = uv;
        }
        self.skip_semicolon();
        self.expect(Token::RightBrace, "`}`")
    }

    fn parse_normals(&mut self, mesh: &mut MeshContext) -> Result<()> {
        self.skip_instance_name();
        self.expect(Token::LeftBrace, "`{`")?;
        let count = self.count("normal count")?;
        let mut normals = Vec::with_capacity(count);
        for _ in 0..count {
            normals.push(self.vector3()?);
            self.skip_semicolon();
        }
        self.skip_semicolon();
        let mut face_indexes = vec![];
        if matches!(self.peek(), Some(Token::Number(_))) {
            let face_count = self.count("normal face count")?;
            for _ in 0..face_count {
                face_indexes.push(self.face_indexes("normal face vertex count")?);
            }
            self.skip_semicolon();
        }
        self.expect(Token::RightBrace, "`}`")?;
        mesh.normals = normals;
        mesh.normal_face_indexes = face_indexes;
        Ok(())
    }

    fn apply_normals(&mut self, mesh: &MeshContext) -> Result<()> {
        if mesh.vertex_count == 0 {
            return Ok(());
        }
        let offset = mesh.vertex_offset;
        let accumulated = if !mesh.normals.is_empty() && !mesh.normal_face_indexes.is_empty() {
            normals::accumulate_mapped(&MeshNormals {
                vertex_count: mesh.vertex_count,
                face_indexes: &mesh.face_indexes,
                normals: &mesh.normals,
                normal_face_indexes: &mesh.normal_face_indexes,
            })?
        } else if !mesh.normals.is_empty() {
            let mut accumulated = vec![Vector3::zero(); mesh.vertex_count];
            for (target, normal) in accumulated.iter_mut().zip(&mesh.normals) {
                *target = *normal;
            }
            accumulated
        } else {
            let positions: Vec<Vector3<f32>> = self.model.vertices.as_slice()
                [offset..offset + mesh.vertex_count]
                .iter()
                .map(|vertex| vertex.position)
                .collect();
            let triangles: Vec<[usize; 3]> = mesh
                .face_groups
                .iter()
                .flatten()
                .map(|face| {
                    let [a, b, c] = face.vertex_indexes;
                    [a as usize - offset, b as usize - offset, c as usize - offset]
                })
                .collect();
            normals::accumulate_from_faces(&positions, &triangles, self.threads)
        };
        normals::apply(
            self.model.vertices.iter_mut().skip(offset),
            &accumulated,
        );
        Ok(())
    }
}

fn default_material(index: usize) -> Material {
    let mut material = Material::new(&format!("材質{:02}", index + 1));
    material.edge = Vector4::new(0.0, 0.0, 0.0, 1.0);
    material.edge_size = 10.0;
    apply_sphere_mode(&mut material);
    material
}

fn apply_sphere_mode(material: &mut Material) {
    material.sphere_mode = if material.texture_index >= 0 && material.sphere_texture_index < 0 {
        SphereMode::None
    } else {
        SphereMode::Multiply
    };
}

/// `main.png*env.sph` names both textures; a lone `.sph` name is a sphere map.
fn split_texture_name(value: &str) -> (Option<&str>, Option<&str>) {
    fn non_empty(s: &str) -> Option<&str> {
        let s = s.trim();
        if s.is_empty() {
            None
        } else {
            Some(s)
        }
    }
    if let Some((texture, sphere)) = value.split_once('*') {
        return (non_empty(texture), non_empty(sphere));
    }
    if value.trim().to_lowercase().ends_with(".sph") {
        (None, non_empty(value))
    } else {
        (non_empty(value), None)
    }
}

#[test]
fn test_split_texture_name() {
    assert_eq!(
        (Some("a.png"), Some("b.sph")),
        split_texture_name("a.png*b.sph")
    );
    assert_eq!((None, Some("env.SPH")), split_texture_name("env.SPH"));
    assert_eq!((Some("a.bmp"), None), split_texture_name(" a.bmp "));
    assert_eq!((None, Some("b.sph")), split_texture_name(" *b.sph"));
    assert_eq!((None, None), split_texture_name(""));
}
