//! CPU raycasting against the scene graph.
//!
//! A ray is unprojected from normalized device coordinates, prefiltered
//! against world-space bounding boxes, then tested triangle by triangle so
//! hits land on the actual surface.

use cgmath::{InnerSpace, Matrix4, Point3, SquareMatrix, Vector3};

use crate::gfx::view::View;
use crate::scene::geometry::Aabb;
use crate::scene::graph::SceneGraph;
use crate::scene::node::{LayerMask, NodeId};

/// A ray in world space.
#[derive(Debug, Clone, Copy)]
pub struct Ray {
    pub origin: Point3<f32>,
    pub direction: Vector3<f32>,
}

impl Ray {
    pub fn new(origin: Point3<f32>, direction: Vector3<f32>) -> Self {
        Self {
            origin,
            direction: direction.normalize(),
        }
    }

    /// Unprojects a pointer position in NDC (x right, y up, both -1..1)
    /// through the camera into a world-space ray.
    pub fn from_ndc(ndc_x: f32, ndc_y: f32, view: &View) -> Option<Self> {
        let inverse = view.view_projection().invert()?;

        let near = inverse * cgmath::Vector4::new(ndc_x, ndc_y, 0.0, 1.0);
        let far = inverse * cgmath::Vector4::new(ndc_x, ndc_y, 1.0, 1.0);
        if near.w.abs() < f32::EPSILON || far.w.abs() < f32::EPSILON {
            return None;
        }
        let near = near.truncate() / near.w;
        let far = far.truncate() / far.w;

        Some(Self::new(
            Point3::new(near.x, near.y, near.z),
            far - near,
        ))
    }

    pub fn point_at(&self, t: f32) -> Point3<f32> {
        self.origin + self.direction * t
    }

    /// Slab test. Returns the entry distance when the ray hits the box.
    pub fn intersect_aabb(&self, aabb: &Aabb) -> Option<f32> {
        let mut t_min = f32::NEG_INFINITY;
        let mut t_max = f32::INFINITY;

        for axis in 0..3 {
            let origin = self.origin[axis];
            let dir = self.direction[axis];
            let min = aabb.min[axis];
            let max = aabb.max[axis];

            if dir.abs() < f32::EPSILON {
                if origin < min || origin > max {
                    return None;
                }
            } else {
                let inv = 1.0 / dir;
                let (t0, t1) = if inv >= 0.0 {
                    ((min - origin) * inv, (max - origin) * inv)
                } else {
                    ((max - origin) * inv, (min - origin) * inv)
                };
                t_min = t_min.max(t0);
                t_max = t_max.min(t1);
                if t_min > t_max {
                    return None;
                }
            }
        }

        if t_max < 0.0 {
            return None;
        }
        Some(t_min.max(0.0))
    }

    /// Möller–Trumbore ray/triangle intersection. Returns the distance
    /// along the ray, or `None` for misses and back-facing grazes behind
    /// the origin. Both winding orders are accepted.
    pub fn intersect_triangle(&self, tri: &[Vector3<f32>; 3]) -> Option<f32> {
        const EPS: f32 = 1e-7;
        let edge1 = tri[1] - tri[0];
        let edge2 = tri[2] - tri[0];
        let h = self.direction.cross(edge2);
        let det = edge1.dot(h);
        if det.abs() < EPS {
            return None; // parallel to the triangle plane
        }
        let inv_det = 1.0 / det;
        let s = Vector3::new(
            self.origin.x - tri[0].x,
            self.origin.y - tri[0].y,
            self.origin.z - tri[0].z,
        );
        let u = s.dot(h) * inv_det;
        if !(0.0..=1.0).contains(&u) {
            return None;
        }
        let q = s.cross(edge1);
        let v = self.direction.dot(q) * inv_det;
        if v < 0.0 || u + v > 1.0 {
            return None;
        }
        let t = edge2.dot(q) * inv_det;
        (t > EPS).then_some(t)
    }
}

/// A confirmed ray hit on a drawable's surface.
#[derive(Debug, Clone, Copy)]
pub struct Intersection {
    pub node: NodeId,
    pub point: Point3<f32>,
    pub distance: f32,
}

/// Casts the ray against every visible drawable not carrying any layer in
/// `exclude`, returning the closest surface hit.
pub fn intersect_graph(
    ray: &Ray,
    graph: &SceneGraph,
    exclude: LayerMask,
) -> Option<Intersection> {
    let mut closest: Option<Intersection> = None;

    graph.traverse_world(&mut |node, world| {
        if node.layers.contains(exclude) {
            return;
        }
        let Some(geometry) = node.geometry() else {
            return;
        };
        let Some(local_aabb) = geometry.local_aabb() else {
            return;
        };

        // Cheap world-box rejection before per-triangle work.
        let world_aabb = local_aabb.transform(world);
        if ray.intersect_aabb(&world_aabb).is_none() {
            return;
        }

        for tri in geometry.triangles() {
            let world_tri = [
                (world * tri[0].extend(1.0)).truncate(),
                (world * tri[1].extend(1.0)).truncate(),
                (world * tri[2].extend(1.0)).truncate(),
            ];
            if let Some(t) = ray.intersect_triangle(&world_tri) {
                if closest.map_or(true, |c| t < c.distance) {
                    closest = Some(Intersection {
                        node: node.id(),
                        point: ray.point_at(t),
                        distance: t,
                    });
                }
            }
        }
    });

    closest
}
