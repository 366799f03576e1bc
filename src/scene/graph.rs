//! The scene container: owns the node tree and its GPU resource lifecycle.

use cgmath::{Matrix4, SquareMatrix};

use crate::scene::geometry::Aabb;
use crate::scene::node::{Node, NodeId};

/// Root container for everything rendered or raycast.
///
/// Nodes are owned by their parents; the graph owns an implicit root
/// group. Removal detaches a subtree and releases its GPU resources
/// before handing it back, so a detached node can still be inspected but
/// never draws again.
pub struct SceneGraph {
    root: Node,
    disposed: bool,
}

impl Default for SceneGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneGraph {
    pub fn new() -> Self {
        Self {
            root: Node::group("scene"),
            disposed: false,
        }
    }

    /// Adds a node under the root. Returns its id for later lookup.
    pub fn add(&mut self, node: Node) -> NodeId {
        debug_assert!(!self.disposed, "SceneGraph::add called after dispose");
        if self.disposed {
            log::error!("node added to a disposed scene graph");
        }
        self.root.add_child(node)
    }

    /// Adds a node under an existing parent. Returns `None` (dropping the
    /// node) when the parent does not exist.
    pub fn add_child(&mut self, parent: NodeId, node: Node) -> Option<NodeId> {
        debug_assert!(!self.disposed, "SceneGraph::add_child called after dispose");
        if self.disposed {
            log::error!("node added to a disposed scene graph");
        }
        Some(self.root.find_mut(parent)?.add_child(node))
    }

    /// Detaches the subtree rooted at `id`, disposing every GPU resource in
    /// it, and returns it. `None` when the id is not in the graph.
    pub fn remove(&mut self, id: NodeId) -> Option<Node> {
        let mut subtree = self.root.remove_child(id)?;
        subtree.dispose_recursive();
        Some(subtree)
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.root.find(id)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.root.find_mut(id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    /// Pre-order visit of every node, including the implicit root.
    pub fn traverse(&self, f: &mut impl FnMut(&Node)) {
        self.root.traverse(f);
    }

    pub fn traverse_mut(&mut self, f: &mut impl FnMut(&mut Node)) {
        self.root.traverse_mut(f);
    }

    /// Pre-order visit with accumulated world transforms. Invisible nodes
    /// and their whole subtrees are skipped, matching what rendering and
    /// raycasting may consider.
    pub fn traverse_world(&self, f: &mut impl FnMut(&Node, &Matrix4<f32>)) {
        fn walk(node: &Node, parent: &Matrix4<f32>, f: &mut impl FnMut(&Node, &Matrix4<f32>)) {
            if !node.visible {
                return;
            }
            let world = parent * node.transform;
            f(node, &world);
            for child in &node.children {
                walk(child, &world, f);
            }
        }
        walk(&self.root, &Matrix4::identity(), f);
    }

    /// Mutable variant of [`traverse_world`](Self::traverse_world), used by
    /// the renderer to create GPU buffers during its upload walk.
    pub fn traverse_world_mut(&mut self, f: &mut impl FnMut(&mut Node, &Matrix4<f32>)) {
        fn walk(
            node: &mut Node,
            parent: &Matrix4<f32>,
            f: &mut impl FnMut(&mut Node, &Matrix4<f32>),
        ) {
            if !node.visible {
                return;
            }
            let world = parent * node.transform;
            f(node, &world);
            for child in &mut node.children {
                walk(child, &world, f);
            }
        }
        walk(&mut self.root, &Matrix4::identity(), f);
    }

    /// World-space bounds of the subtree rooted at `id`.
    pub fn world_aabb_of(&self, id: NodeId) -> Option<Aabb> {
        fn locate(node: &Node, parent: &Matrix4<f32>, id: NodeId) -> Option<Aabb> {
            if node.id() == id {
                return node.world_aabb(parent);
            }
            let world = parent * node.transform;
            node.children
                .iter()
                .find_map(|c| locate(c, &world, id))
        }
        locate(&self.root, &Matrix4::identity(), id)
    }

    /// Number of nodes in the graph, excluding the implicit root.
    pub fn node_count(&self) -> usize {
        let mut count = 0;
        self.root.traverse(&mut |_| count += 1);
        count - 1
    }

    /// Removes every node, disposing GPU resources.
    pub fn clear(&mut self) {
        for child in &mut self.root.children {
            child.dispose_recursive();
        }
        self.root.children.clear();
    }

    /// Tears the whole container down. Idempotent.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.clear();
        self.disposed = true;
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::geometry::Geometry;
    use crate::scene::material::Material;
    use cgmath::Vector3;

    fn drawable(name: &str) -> Node {
        Node::drawable(name, Geometry::cube(1.0), Material::default())
    }

    #[test]
    fn remove_disposes_whole_subtree_exactly_once() {
        let mut graph = SceneGraph::new();
        let mut parent = Node::group("assembly");
        parent.add_child(drawable("a"));
        let mut nested = Node::group("sub");
        nested.add_child(drawable("b"));
        parent.add_child(nested);
        let parent_id = graph.add(parent);

        let removed = graph.remove(parent_id).unwrap();
        assert!(!graph.contains(parent_id));

        let mut disposed = 0;
        removed.traverse(&mut |n| {
            if let Some(g) = n.geometry() {
                assert!(g.is_disposed());
                disposed += 1;
            }
        });
        assert_eq!(disposed, 2);
    }

    #[test]
    fn remove_unknown_id_is_none() {
        let mut graph = SceneGraph::new();
        let id = graph.add(drawable("a"));
        graph.remove(id);
        assert!(graph.remove(id).is_none());
    }

    #[test]
    fn removed_subtree_no_longer_traversed() {
        let mut graph = SceneGraph::new();
        let keep = graph.add(drawable("keep"));
        let drop_id = graph.add(drawable("drop"));
        graph.remove(drop_id);

        let mut seen = Vec::new();
        graph.traverse(&mut |n| seen.push(n.id()));
        assert!(seen.contains(&keep));
        assert!(!seen.contains(&drop_id));
        assert_eq!(graph.node_count(), 1);
    }

    #[test]
    fn traverse_world_skips_invisible_subtrees() {
        let mut graph = SceneGraph::new();
        let mut hidden = Node::group("hidden");
        hidden.visible = false;
        hidden.add_child(drawable("inside"));
        graph.add(hidden);
        graph.add(drawable("shown"));

        let mut names = Vec::new();
        graph.traverse_world(&mut |n, _| names.push(n.name.clone()));
        assert_eq!(names, vec!["scene", "shown"]);
    }

    #[test]
    fn traverse_world_accumulates_transforms() {
        let mut graph = SceneGraph::new();
        let mut group = Node::group("g");
        group.transform = Matrix4::from_translation(Vector3::new(1.0, 0.0, 0.0));
        let mut child = drawable("c");
        child.transform = Matrix4::from_translation(Vector3::new(0.0, 2.0, 0.0));
        let child_id = group.add_child(child);
        graph.add(group);

        let mut found = None;
        graph.traverse_world(&mut |n, world| {
            if n.id() == child_id {
                found = Some(world.w.truncate());
            }
        });
        assert_eq!(found, Some(Vector3::new(1.0, 2.0, 0.0)));
    }

    #[test]
    fn dispose_is_idempotent() {
        let mut graph = SceneGraph::new();
        graph.add(drawable("a"));
        graph.dispose();
        assert!(graph.is_disposed());
        assert_eq!(graph.node_count(), 0);
        graph.dispose();
        assert!(graph.is_disposed());
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "after dispose")]
    fn add_after_dispose_trips_the_lifecycle_assertion() {
        let mut graph = SceneGraph::new();
        graph.dispose();
        graph.add(drawable("late"));
    }

    #[test]
    fn world_aabb_of_nested_node() {
        let mut graph = SceneGraph::new();
        let mut group = Node::group("g");
        group.transform = Matrix4::from_translation(Vector3::new(0.0, 0.0, 7.0));
        let id = group.add_child(drawable("c"));
        graph.add(group);

        let aabb = graph.world_aabb_of(id).unwrap();
        assert_eq!(aabb.center(), Vector3::new(0.0, 0.0, 7.0));
    }
}
