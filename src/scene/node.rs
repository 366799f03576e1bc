//! Scene-graph nodes: a tree of groups and drawables.

use std::sync::atomic::{AtomicU64, Ordering};

use cgmath::{Matrix4, SquareMatrix, Vector3};

use crate::scene::geometry::{Aabb, Geometry};
use crate::scene::material::Material;

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique node identifier, assigned at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Bitmask deciding which passes and queries consider a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerMask(u32);

impl LayerMask {
    /// Every node starts here; the forward pass draws it.
    pub const DEFAULT: LayerMask = LayerMask(1);
    /// Drawables that keep their real material during the bloom source
    /// render, i.e. the ones that glow.
    pub const BLOOM: LayerMask = LayerMask(1 << 1);
    /// Tool overlay nodes (measurement markers, cursor) that raycasts
    /// must not hit.
    pub const MARKER: LayerMask = LayerMask(1 << 30);

    pub fn contains(self, other: LayerMask) -> bool {
        self.0 & other.0 != 0
    }

    pub fn with(self, other: LayerMask) -> LayerMask {
        LayerMask(self.0 | other.0)
    }

    pub fn without(self, other: LayerMask) -> LayerMask {
        LayerMask(self.0 & !other.0)
    }

    pub fn toggle(&mut self, other: LayerMask) {
        self.0 ^= other.0;
    }
}

impl Default for LayerMask {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Installation status attached to model parts by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    NotStarted,
    InProgress,
    PartiallyInstalled,
    Installed,
}

impl Status {
    pub const ALL: [Status; 4] = [
        Status::NotStarted,
        Status::InProgress,
        Status::PartiallyInstalled,
        Status::Installed,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Status::NotStarted => "Not started",
            Status::InProgress => "In progress",
            Status::PartiallyInstalled => "Partially installed",
            Status::Installed => "Installed",
        }
    }
}

/// What a node contributes to the scene beyond its transform.
pub enum NodeKind {
    /// Pure hierarchy/transform node.
    Group,
    /// Renderable mesh with its shading parameters.
    Drawable {
        geometry: Geometry,
        material: Material,
    },
}

/// One node in the scene tree. Children are owned; removing a node
/// detaches (and disposes) its whole subtree.
pub struct Node {
    id: NodeId,
    pub name: String,
    /// Transform relative to the parent.
    pub transform: Matrix4<f32>,
    /// Invisible nodes and their subtrees are skipped by rendering and
    /// raycasts.
    pub visible: bool,
    pub layers: LayerMask,
    /// Classification shown by the status highlight feature; `None` for
    /// nodes that are not model parts.
    pub status: Option<Status>,
    pub kind: NodeKind,
    pub children: Vec<Node>,
}

impl Node {
    fn new(name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id: NodeId(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed)),
            name: name.into(),
            transform: Matrix4::identity(),
            visible: true,
            layers: LayerMask::DEFAULT,
            status: None,
            kind,
            children: Vec::new(),
        }
    }

    pub fn group(name: impl Into<String>) -> Self {
        Self::new(name, NodeKind::Group)
    }

    pub fn drawable(name: impl Into<String>, geometry: Geometry, material: Material) -> Self {
        Self::new(name, NodeKind::Drawable { geometry, material })
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn is_drawable(&self) -> bool {
        matches!(self.kind, NodeKind::Drawable { .. })
    }

    pub fn material(&self) -> Option<&Material> {
        match &self.kind {
            NodeKind::Drawable { material, .. } => Some(material),
            NodeKind::Group => None,
        }
    }

    pub fn set_material(&mut self, new: Material) {
        if let NodeKind::Drawable { material, .. } = &mut self.kind {
            *material = new;
        }
    }

    pub fn geometry(&self) -> Option<&Geometry> {
        match &self.kind {
            NodeKind::Drawable { geometry, .. } => Some(geometry),
            NodeKind::Group => None,
        }
    }

    pub fn geometry_mut(&mut self) -> Option<&mut Geometry> {
        match &mut self.kind {
            NodeKind::Drawable { geometry, .. } => Some(geometry),
            NodeKind::Group => None,
        }
    }

    pub fn add_child(&mut self, child: Node) -> NodeId {
        let id = child.id;
        self.children.push(child);
        id
    }

    /// Moves this node's local position, leaving rotation/scale alone.
    pub fn set_position(&mut self, position: Vector3<f32>) {
        self.transform.w.x = position.x;
        self.transform.w.y = position.y;
        self.transform.w.z = position.z;
    }

    pub fn position(&self) -> Vector3<f32> {
        Vector3::new(self.transform.w.x, self.transform.w.y, self.transform.w.z)
    }

    /// Pre-order traversal over this node and all descendants.
    pub fn traverse(&self, f: &mut impl FnMut(&Node)) {
        f(self);
        for child in &self.children {
            child.traverse(f);
        }
    }

    pub fn traverse_mut(&mut self, f: &mut impl FnMut(&mut Node)) {
        f(self);
        for child in &mut self.children {
            child.traverse_mut(f);
        }
    }

    pub fn find(&self, id: NodeId) -> Option<&Node> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(id))
    }

    pub fn find_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter_mut().find_map(|c| c.find_mut(id))
    }

    /// Detaches the child subtree containing `id` (matching on the subtree
    /// root). Returns `None` if no descendant matches.
    pub fn remove_child(&mut self, id: NodeId) -> Option<Node> {
        if let Some(pos) = self.children.iter().position(|c| c.id == id) {
            return Some(self.children.remove(pos));
        }
        self.children.iter_mut().find_map(|c| c.remove_child(id))
    }

    /// Releases GPU resources for this node and every descendant,
    /// parent before children.
    pub(crate) fn dispose_recursive(&mut self) {
        if let Some(geometry) = self.geometry_mut() {
            geometry.dispose();
        }
        for child in &mut self.children {
            child.dispose_recursive();
        }
    }

    /// World-space bounds of this subtree given the parent's accumulated
    /// transform. Groups without drawable descendants yield `None`.
    pub fn world_aabb(&self, parent: &Matrix4<f32>) -> Option<Aabb> {
        let world = parent * self.transform;
        let mut result = self
            .geometry()
            .and_then(|g| g.local_aabb())
            .map(|aabb| aabb.transform(&world));
        for child in &self.children {
            if let Some(child_aabb) = child.world_aabb(&world) {
                result = Some(match result {
                    Some(acc) => acc.union(&child_aabb),
                    None => child_aabb,
                });
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        let a = Node::group("a");
        let b = Node::group("b");
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn layer_mask_operations() {
        let mut layers = LayerMask::DEFAULT;
        assert!(!layers.contains(LayerMask::BLOOM));
        layers.toggle(LayerMask::BLOOM);
        assert!(layers.contains(LayerMask::BLOOM));
        layers.toggle(LayerMask::BLOOM);
        assert!(!layers.contains(LayerMask::BLOOM));
        assert!(layers.contains(LayerMask::DEFAULT));
    }

    #[test]
    fn traversal_is_preorder() {
        let mut root = Node::group("root");
        let mut mid = Node::group("mid");
        mid.add_child(Node::group("leaf"));
        root.add_child(mid);
        root.add_child(Node::group("sibling"));

        let mut names = Vec::new();
        root.traverse(&mut |n| names.push(n.name.clone()));
        assert_eq!(names, vec!["root", "mid", "leaf", "sibling"]);
    }

    #[test]
    fn world_aabb_accumulates_transforms() {
        let mut root = Node::group("root");
        root.transform = Matrix4::from_translation(Vector3::new(10.0, 0.0, 0.0));
        let mut child = Node::drawable(
            "box",
            Geometry::cube(2.0),
            Material::default(),
        );
        child.transform = Matrix4::from_translation(Vector3::new(0.0, 5.0, 0.0));
        root.add_child(child);

        let aabb = root.world_aabb(&Matrix4::identity()).unwrap();
        assert_eq!(aabb.center(), Vector3::new(10.0, 5.0, 0.0));
    }

    #[test]
    fn group_without_drawables_has_no_bounds() {
        let root = Node::group("empty");
        assert!(root.world_aabb(&Matrix4::identity()).is_none());
    }
}
