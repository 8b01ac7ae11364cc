use cgmath::{InnerSpace, Vector3, Zero};
use rayon::{prelude::*, ThreadPoolBuilder};

use crate::{
    error::{MmdError, Result},
    model::Vertex,
};

/// Triangles handed to one worker at a time.
const TRIANGLES_PER_TASK: usize = 4096;

/// `MeshNormals` data of one mesh, with the mesh's own face index lists.
pub(crate) struct MeshNormals<'a> {
    pub vertex_count: usize,
    pub face_indexes: &'a [Vec<usize>],
    pub normals: &'a [Vector3<f32>],
    pub normal_face_indexes: &'a [Vec<usize>],
}

/// Sums the normals each face assigns to its vertexes.
pub(crate) fn accumulate_mapped(mesh: &MeshNormals) -> Result<Vec<Vector3<f32>>> {
    if mesh.normal_face_indexes.len() != mesh.face_indexes.len() {
        return Err(MmdError::UnknownEnum {
            field: "normal face count",
            value: mesh.normal_face_indexes.len() as i64,
        });
    }
    let mut accumulated = vec![Vector3::zero(); mesh.vertex_count];
    for (face, normal_face) in mesh.face_indexes.iter().zip(mesh.normal_face_indexes) {
        if normal_face.len() < face.len() {
            return Err(MmdError::UnknownEnum {
                field: "normal face vertex count",
                value: normal_face.len() as i64,
            });
        }
        for (&vertex_index, &normal_index) in face.iter().zip(normal_face) {
            let normal = mesh
                .normals
                .get(normal_index)
                .ok_or(MmdError::IndexOutOfRange {
                    index: normal_index as i32,
                    length: mesh.normals.len(),
                })?;
            let target =
                accumulated
                    .get_mut(vertex_index)
                    .ok_or(MmdError::IndexOutOfRange {
                        index: vertex_index as i32,
                        length: mesh.vertex_count,
                    })?;
            *target += *normal;
        }
    }
    Ok(accumulated)
}

fn accumulate_triangles(positions: &[Vector3<f32>], triangles: &[[usize; 3]]) -> Vec<Vector3<f32>> {
    let mut accumulated = vec![Vector3::zero(); positions.len()];
    for triangle in triangles {
        let (Some(a), Some(b), Some(c)) = (
            positions.get(triangle[0]),
            positions.get(triangle[1]),
            positions.get(triangle[2]),
        ) else {
            continue;
        };
        let normal = (b - a).cross(c - a);
        if normal.is_zero() {
            continue;
        }
        for &index in triangle {
            accumulated[index] += normal;
        }
    }
    accumulated
}

/// Area weighted face normals summed per vertex. With more than one thread the triangles are
/// split over a pool owned by this call.
pub(crate) fn accumulate_from_faces(
    positions: &[Vector3<f32>],
    triangles: &[[usize; 3]],
    threads: Option<usize>,
) -> Vec<Vector3<f32>> {
    let threads = match threads {
        Some(threads) if threads > 1 && triangles.len() > TRIANGLES_PER_TASK => threads,
        _ => return accumulate_triangles(positions, triangles),
    };
    let pool = match ThreadPoolBuilder::new().num_threads(threads).build() {
        Ok(pool) => pool,
        Err(err) => {
            log::warn!("normal generation stays single threaded: {}", err);
            return accumulate_triangles(positions, triangles);
        }
    };
    log::debug!(
        "generating normals of {} triangles on {} threads",
        triangles.len(),
        threads
    );
    pool.install(|| {
        triangles
            .par_chunks(TRIANGLES_PER_TASK)
            .map(|chunk| accumulate_triangles(positions, chunk))
            .reduce(
                || vec![Vector3::zero(); positions.len()],
                |mut sum, part| {
                    for (total, value) in sum.iter_mut().zip(part) {
                        *total += value;
                    }
                    sum
                },
            )
    })
}

/// Normalizes each non-zero sum into the matching vertex. Vertexes with a zero sum keep their
/// normal.
pub(crate) fn apply<'v>(
    vertices: impl Iterator<Item = &'v mut Vertex>,
    accumulated: &[Vector3<f32>],
) {
    for (vertex, normal) in vertices.zip(accumulated) {
        if !normal.is_zero() {
            vertex.normal = normal.normalize();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(size: usize) -> (Vec<Vector3<f32>>, Vec<[usize; 3]>) {
        let mut positions = vec![];
        for z in 0..=size {
            for x in 0..=size {
                positions.push(Vector3::new(x as f32, 0.0, z as f32));
            }
        }
        let mut triangles = vec![];
        let row = size + 1;
        for z in 0..size {
            for x in 0..size {
                let i = z * row + x;
                triangles.push([i, i + row, i + 1]);
                triangles.push([i + 1, i + row, i + row + 1]);
            }
        }
        (positions, triangles)
    }

    #[test]
    fn test_face_normals_point_up() {
        let (positions, triangles) = grid(2);
        let accumulated = accumulate_from_faces(&positions, &triangles, None);
        for normal in accumulated {
            let normal = normal.normalize();
            assert!((normal.y - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_threaded_accumulation_matches_sequential() {
        let (positions, triangles) = grid(64);
        assert!(triangles.len() > TRIANGLES_PER_TASK);
        let sequential = accumulate_from_faces(&positions, &triangles, None);
        let threaded = accumulate_from_faces(&positions, &triangles, Some(4));
        for (a, b) in sequential.iter().zip(&threaded) {
            assert!((a - b).magnitude() < 1e-4);
        }
    }

    #[test]
    fn test_mapped_normals() {
        let faces = vec![vec![0, 1, 2, 3]];
        let normals = vec![Vector3::unit_x(), Vector3::unit_z()];
        let mesh = MeshNormals {
            vertex_count: 4,
            face_indexes: &faces,
            normals: &normals,
            normal_face_indexes: &[vec![0, 0, 1, 1, 1]],
        };
        let accumulated = accumulate_mapped(&mesh).unwrap();
        assert_eq!(Vector3::unit_x(), accumulated[0]);
        assert_eq!(Vector3::unit_z(), accumulated[3]);

        let short = MeshNormals {
            normal_face_indexes: &[vec![0, 1]],
            ..mesh
        };
        assert!(accumulate_mapped(&short).is_err());
        let bad_index = MeshNormals {
            normal_face_indexes: &[vec![0, 1, 2, 0]],
            ..mesh
        };
        assert!(matches!(
            accumulate_mapped(&bad_index),
            Err(MmdError::IndexOutOfRange { index: 2, .. })
        ));
    }

    #[test]
    fn test_apply_keeps_zero_sums() {
        let mut vertices = vec![Vertex::default(), Vertex::default()];
        vertices[1].normal = Vector3::unit_y();
        apply(
            vertices.iter_mut(),
            &[Vector3::new(0.0, 0.0, 2.0), Vector3::zero()],
        );
        assert_eq!(Vector3::unit_z(), vertices[0].normal);
        assert_eq!(Vector3::unit_y(), vertices[1].normal);
    }
}
