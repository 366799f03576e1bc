//! Mesh geometry: CPU vertex/index data, lazy GPU buffers, bounds and
//! procedural generators for the built-in marker shapes.

use cgmath::{InnerSpace, Matrix4, Vector3};
use wgpu::util::DeviceExt;

use crate::scene::vertex::Vertex3D;

/// Axis-aligned bounding box in whatever space its points were given in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vector3<f32>,
    pub max: Vector3<f32>,
}

impl Aabb {
    pub fn from_points<I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = Vector3<f32>>,
    {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let mut aabb = Aabb {
            min: first,
            max: first,
        };
        for p in iter {
            aabb.expand(p);
        }
        Some(aabb)
    }

    pub fn expand(&mut self, p: Vector3<f32>) {
        self.min.x = self.min.x.min(p.x);
        self.min.y = self.min.y.min(p.y);
        self.min.z = self.min.z.min(p.z);
        self.max.x = self.max.x.max(p.x);
        self.max.y = self.max.y.max(p.y);
        self.max.z = self.max.z.max(p.z);
    }

    pub fn union(&self, other: &Aabb) -> Aabb {
        let mut out = *self;
        out.expand(other.min);
        out.expand(other.max);
        out
    }

    pub fn center(&self) -> Vector3<f32> {
        (self.min + self.max) * 0.5
    }

    /// Radius of the sphere through the box corners, centered at
    /// [`center`](Self::center).
    pub fn bounding_radius(&self) -> f32 {
        ((self.max - self.min) * 0.5).magnitude()
    }

    /// Transforms all eight corners and refits an axis-aligned box around
    /// them. Conservative under rotation, exact under translation/scale.
    pub fn transform(&self, matrix: &Matrix4<f32>) -> Aabb {
        let corners = [
            Vector3::new(self.min.x, self.min.y, self.min.z),
            Vector3::new(self.max.x, self.min.y, self.min.z),
            Vector3::new(self.min.x, self.max.y, self.min.z),
            Vector3::new(self.max.x, self.max.y, self.min.z),
            Vector3::new(self.min.x, self.min.y, self.max.z),
            Vector3::new(self.max.x, self.min.y, self.max.z),
            Vector3::new(self.min.x, self.max.y, self.max.z),
            Vector3::new(self.max.x, self.max.y, self.max.z),
        ];
        let transformed = corners.iter().map(|c| {
            let v = matrix * c.extend(1.0);
            Vector3::new(v.x, v.y, v.z)
        });
        // Eight corners, always non-empty.
        Aabb::from_points(transformed).unwrap()
    }
}

/// GPU buffers backing a geometry, created lazily on first draw.
pub struct GpuMesh {
    pub vertex_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
}

/// Triangle mesh owned by a drawable node.
///
/// The vertex and index arrays stay resident on the CPU for raycasting;
/// GPU buffers are created on demand and released exactly once by
/// [`dispose`](Self::dispose).
pub struct Geometry {
    vertices: Vec<Vertex3D>,
    indices: Vec<u32>,
    gpu: Option<GpuMesh>,
    disposed: bool,
}

impl std::fmt::Debug for Geometry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Geometry")
            .field("vertices", &self.vertices.len())
            .field("indices", &self.indices.len())
            .field("uploaded", &self.gpu.is_some())
            .field("disposed", &self.disposed)
            .finish()
    }
}

impl Geometry {
    pub fn new(vertices: Vec<Vertex3D>, indices: Vec<u32>) -> Self {
        Self {
            vertices,
            indices,
            gpu: None,
            disposed: false,
        }
    }

    /// Builds a geometry from flat position/normal/index arrays as produced
    /// by model loaders. When `normals` is empty, face normals are computed.
    pub fn from_raw(positions: &[f32], normals: &[f32], indices: Vec<u32>) -> Self {
        let vertices = positions
            .chunks_exact(3)
            .enumerate()
            .map(|(i, p)| Vertex3D {
                position: [p[0], p[1], p[2]],
                normal: if normals.len() >= (i + 1) * 3 {
                    [normals[i * 3], normals[i * 3 + 1], normals[i * 3 + 2]]
                } else {
                    [0.0; 3]
                },
            })
            .collect();
        let mut geometry = Self::new(vertices, indices);
        if normals.is_empty() {
            geometry.calculate_face_normals();
        }
        geometry
    }

    /// Recomputes per-vertex normals by averaging face normals.
    pub fn calculate_face_normals(&mut self) {
        for v in &mut self.vertices {
            v.normal = [0.0; 3];
        }
        for tri in self.indices.chunks_exact(3) {
            let (a, b, c) = (tri[0] as usize, tri[1] as usize, tri[2] as usize);
            let pa = Vector3::from(self.vertices[a].position);
            let pb = Vector3::from(self.vertices[b].position);
            let pc = Vector3::from(self.vertices[c].position);
            let normal = (pb - pa).cross(pc - pa);
            for &i in &[a, b, c] {
                self.vertices[i].normal[0] += normal.x;
                self.vertices[i].normal[1] += normal.y;
                self.vertices[i].normal[2] += normal.z;
            }
        }
        for v in &mut self.vertices {
            let n = Vector3::from(v.normal);
            if n.magnitude2() > 0.0 {
                v.normal = n.normalize().into();
            }
        }
    }

    pub fn vertices(&self) -> &[Vertex3D] {
        &self.vertices
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }

    /// Iterates triangles as position triples, for raycasting.
    pub fn triangles(&self) -> impl Iterator<Item = [Vector3<f32>; 3]> + '_ {
        self.indices.chunks_exact(3).map(|tri| {
            [
                Vector3::from(self.vertices[tri[0] as usize].position),
                Vector3::from(self.vertices[tri[1] as usize].position),
                Vector3::from(self.vertices[tri[2] as usize].position),
            ]
        })
    }

    /// Bounds in local (model) space. `None` for empty meshes.
    pub fn local_aabb(&self) -> Option<Aabb> {
        Aabb::from_points(self.vertices.iter().map(|v| Vector3::from(v.position)))
    }

    /// Creates the vertex/index buffers if they do not exist yet. Does
    /// nothing on a disposed geometry.
    pub fn ensure_gpu(&mut self, device: &wgpu::Device) {
        if self.disposed || self.gpu.is_some() {
            return;
        }
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("geometry_vertex_buffer"),
            contents: bytemuck::cast_slice(&self.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("geometry_index_buffer"),
            contents: bytemuck::cast_slice(&self.indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        self.gpu = Some(GpuMesh {
            vertex_buffer,
            index_buffer,
        });
    }

    pub fn gpu(&self) -> Option<&GpuMesh> {
        self.gpu.as_ref()
    }

    /// Releases GPU buffers. The first call drops the buffers and latches
    /// the disposed flag; later calls do nothing.
    pub fn dispose(&mut self) {
        if !self.disposed {
            self.gpu = None;
            self.disposed = true;
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    // ---- generators ----------------------------------------------------

    pub fn cube(size: f32) -> Self {
        let h = size * 0.5;
        let faces: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
            // (normal, u axis, v axis)
            ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
            ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
            ([1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]),
            ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
            ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0]),
            ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
        ];
        let mut vertices = Vec::with_capacity(24);
        let mut indices = Vec::with_capacity(36);
        for (normal, u, v) in faces {
            let n = Vector3::from(normal);
            let u = Vector3::from(u);
            let v = Vector3::from(v);
            let base = vertices.len() as u32;
            for (su, sv) in [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
                let p = n * h + u * (su * h) + v * (sv * h);
                vertices.push(Vertex3D {
                    position: p.into(),
                    normal: n.into(),
                });
            }
            indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }
        Self::new(vertices, indices)
    }

    /// UV sphere with `longitudes` segments around and `latitudes` bands
    /// from pole to pole.
    pub fn sphere(radius: f32, longitudes: u32, latitudes: u32) -> Self {
        let longitudes = longitudes.max(3);
        let latitudes = latitudes.max(2);
        let mut vertices = Vec::new();
        let mut indices = Vec::new();

        for lat in 0..=latitudes {
            let theta = std::f32::consts::PI * lat as f32 / latitudes as f32;
            let (sin_t, cos_t) = theta.sin_cos();
            for lon in 0..=longitudes {
                let phi = 2.0 * std::f32::consts::PI * lon as f32 / longitudes as f32;
                let (sin_p, cos_p) = phi.sin_cos();
                let n = Vector3::new(sin_t * cos_p, cos_t, sin_t * sin_p);
                vertices.push(Vertex3D {
                    position: (n * radius).into(),
                    normal: n.into(),
                });
            }
        }

        let stride = longitudes + 1;
        for lat in 0..latitudes {
            for lon in 0..longitudes {
                let a = lat * stride + lon;
                let b = a + stride;
                indices.extend_from_slice(&[a, b, a + 1, a + 1, b, b + 1]);
            }
        }
        Self::new(vertices, indices)
    }

    /// Cone with its apex at +y and an open base at -y, centered on the
    /// origin. Used for the selection cursor.
    pub fn cone(radius: f32, height: f32, segments: u32) -> Self {
        let segments = segments.max(3);
        let half = height * 0.5;
        let mut vertices = Vec::new();
        let mut indices = Vec::new();

        // Side: one apex vertex per segment so normals stay flat-ish.
        for i in 0..segments {
            let a0 = 2.0 * std::f32::consts::PI * i as f32 / segments as f32;
            let a1 = 2.0 * std::f32::consts::PI * (i + 1) as f32 / segments as f32;
            let p0 = Vector3::new(radius * a0.cos(), -half, radius * a0.sin());
            let p1 = Vector3::new(radius * a1.cos(), -half, radius * a1.sin());
            let apex = Vector3::new(0.0, half, 0.0);
            let normal = (p1 - apex).cross(p0 - apex).normalize();
            let base = vertices.len() as u32;
            for p in [apex, p0, p1] {
                vertices.push(Vertex3D {
                    position: p.into(),
                    normal: normal.into(),
                });
            }
            indices.extend_from_slice(&[base, base + 1, base + 2]);
        }

        // Base cap.
        let center_index = vertices.len() as u32;
        vertices.push(Vertex3D {
            position: [0.0, -half, 0.0],
            normal: [0.0, -1.0, 0.0],
        });
        for i in 0..=segments {
            let a = 2.0 * std::f32::consts::PI * i as f32 / segments as f32;
            vertices.push(Vertex3D {
                position: [radius * a.cos(), -half, radius * a.sin()],
                normal: [0.0, -1.0, 0.0],
            });
        }
        for i in 0..segments {
            indices.extend_from_slice(&[center_index, center_index + 1 + i, center_index + 2 + i]);
        }
        Self::new(vertices, indices)
    }

    /// Thin square tube from `from` to `to`, for measurement lines. The
    /// endpoints are in the same space the node's transform leaves them in,
    /// so callers usually keep the node's transform at identity.
    pub fn segment(from: Vector3<f32>, to: Vector3<f32>, thickness: f32) -> Self {
        let dir = to - from;
        let length = dir.magnitude();
        if length <= f32::EPSILON {
            return Self::new(Vec::new(), Vec::new());
        }
        let dir = dir / length;
        let helper = if dir.x.abs() < 0.9 {
            Vector3::unit_x()
        } else {
            Vector3::unit_y()
        };
        let side = dir.cross(helper).normalize();
        let up = dir.cross(side);

        let ring = [side, up, -side, -up];
        let mut vertices = Vec::with_capacity(8);
        for d in ring {
            let offset = d * thickness;
            vertices.push(Vertex3D {
                position: (from + offset).into(),
                normal: d.into(),
            });
            vertices.push(Vertex3D {
                position: (to + offset).into(),
                normal: d.into(),
            });
        }
        let mut indices = Vec::with_capacity(24);
        for i in 0..4u32 {
            let a = i * 2;
            let b = ((i + 1) % 4) * 2;
            indices.extend_from_slice(&[a, a + 1, b, b, a + 1, b + 1]);
        }
        Self::new(vertices, indices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::SquareMatrix;

    #[test]
    fn cube_has_expected_counts() {
        let cube = Geometry::cube(2.0);
        assert_eq!(cube.vertices().len(), 24);
        assert_eq!(cube.index_count(), 36);
        let aabb = cube.local_aabb().unwrap();
        assert_eq!(aabb.min, Vector3::new(-1.0, -1.0, -1.0));
        assert_eq!(aabb.max, Vector3::new(1.0, 1.0, 1.0));
    }

    #[test]
    fn sphere_vertices_lie_on_radius() {
        let sphere = Geometry::sphere(2.5, 12, 8);
        for v in sphere.vertices() {
            let r = Vector3::from(v.position).magnitude();
            assert!((r - 2.5).abs() < 1e-4, "vertex off sphere: {r}");
        }
    }

    #[test]
    fn face_normals_point_outward_on_cube() {
        let mut cube = Geometry::cube(1.0);
        cube.calculate_face_normals();
        for v in cube.vertices() {
            let p = Vector3::from(v.position);
            let n = Vector3::from(v.normal);
            assert!(p.dot(n) > 0.0);
        }
    }

    #[test]
    fn from_raw_without_normals_computes_them() {
        let positions = [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0];
        let geometry = Geometry::from_raw(&positions, &[], vec![0, 1, 2]);
        for v in geometry.vertices() {
            assert!((Vector3::from(v.normal) - Vector3::unit_z()).magnitude() < 1e-5);
        }
    }

    #[test]
    fn dispose_latches() {
        let mut g = Geometry::cube(1.0);
        assert!(!g.is_disposed());
        g.dispose();
        assert!(g.is_disposed());
        g.dispose();
        assert!(g.is_disposed());
        assert!(g.gpu().is_none());
    }

    #[test]
    fn aabb_transform_translates() {
        let aabb = Aabb {
            min: Vector3::new(-1.0, -1.0, -1.0),
            max: Vector3::new(1.0, 1.0, 1.0),
        };
        let moved = aabb.transform(&Matrix4::from_translation(Vector3::new(5.0, 0.0, 0.0)));
        assert_eq!(moved.center(), Vector3::new(5.0, 0.0, 0.0));
        assert_eq!(moved.bounding_radius(), aabb.bounding_radius());

        let same = aabb.transform(&Matrix4::identity());
        assert_eq!(same, aabb);
    }

    #[test]
    fn segment_spans_endpoints() {
        let from = Vector3::new(0.0, 0.0, 0.0);
        let to = Vector3::new(0.0, 3.0, 0.0);
        let line = Geometry::segment(from, to, 0.01);
        let aabb = line.local_aabb().unwrap();
        assert!(aabb.min.y <= 0.0 && aabb.max.y >= 3.0);
        assert!(aabb.max.x - aabb.min.x <= 0.05);
    }
}
