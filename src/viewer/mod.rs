//! The viewer session: model lifecycle, status highlighting and the
//! selection cursor, on top of the engine [`World`].

pub mod loader;
pub mod observable;
pub mod status;

use std::collections::HashMap;
use std::sync::Arc;

use cgmath::{Matrix4, Rad, Vector3};
use futures::channel::oneshot;
use winit::window::Window;

use crate::core::viewport::Viewport;
use crate::core::world::World;
use crate::error::ViewerError;
use crate::gfx::bloom::SelectiveBloom;
use crate::gfx::renderer::Renderer;
use crate::scene::geometry::Geometry;
use crate::scene::material::{Material, MaterialOverrides};
use crate::scene::node::{LayerMask, Node, NodeId, Status};
use crate::ui::{debug_enabled, DebugPanel};
use loader::{LoadError, ModelLoader};
use observable::Observable;
use status::{default_classifier, highlight_palette, StatusClassifier};

/// Coarse session state for UI binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadStatus {
    #[default]
    Idle,
    Loading,
    Error,
}

/// Owns a [`World`] and layers the product-level behavior on it: async
/// model loading, per-part status classification, highlight commands and
/// the bobbing selection cursor.
pub struct Viewer {
    pub world: World,
    /// Root node of the currently loaded model, when one is installed.
    pub model: Observable<Option<NodeId>>,
    pub load_status: Observable<LoadStatus>,
    classifier: StatusClassifier,
    palette: HashMap<Status, Material>,
    highlights: MaterialOverrides,
    cursor: NodeId,
    pending: Option<oneshot::Receiver<Result<Node, LoadError>>>,
    last_error: Option<ViewerError>,
}

impl Viewer {
    pub fn new(viewport: Viewport) -> Self {
        let mut world = World::new(viewport);

        // Selection cursor: a small cone pointing down at the highlighted
        // part, hidden until something is highlighted.
        let mut cursor = Node::drawable(
            "selection-cursor",
            Geometry::cone(0.2, 0.5, 4),
            Material::unlit([1.0, 0.9, 0.1]),
        );
        cursor.transform = Matrix4::from_angle_x(Rad(std::f32::consts::PI));
        cursor.layers = cursor.layers.with(LayerMask::MARKER);
        cursor.visible = false;
        let cursor_id = world.ctx.graph.add(cursor);

        // Gentle vertical bob while visible.
        world.on_tick.subscribe(2, move |tick, ctx| {
            if let Some(node) = ctx.graph.get_mut(cursor_id) {
                if node.visible {
                    node.transform.w.y += (tick.elapsed * 3.0).sin() * 0.002;
                }
            }
        });

        Self {
            world,
            model: Observable::new(None),
            load_status: Observable::new(LoadStatus::Idle),
            classifier: default_classifier(),
            palette: highlight_palette(),
            highlights: MaterialOverrides::new(),
            cursor: cursor_id,
            pending: None,
            last_error: None,
        }
    }

    /// Replaces the demo classifier with application-supplied logic.
    pub fn set_classifier(&mut self, classifier: StatusClassifier) {
        self.classifier = classifier;
    }

    /// Creates the GPU stack for a window and hands it to the world. The
    /// debug panel is attached when `ATRIUM_DEBUG` is set.
    pub fn attach_window(&mut self, window: Arc<Window>) -> anyhow::Result<()> {
        let viewport = self.world.ctx.viewport;
        let renderer = pollster::block_on(Renderer::new(window.clone(), &viewport))?;
        let bloom = SelectiveBloom::new(renderer.device(), renderer.surface_format(), &viewport);

        let debug = debug_enabled().then(|| {
            let mut panel = DebugPanel::new(
                renderer.device(),
                renderer.queue(),
                renderer.surface_format(),
                window,
            );
            panel.resize(&viewport);
            panel
        });

        self.world.ctx.renderer = Some(renderer);
        self.world.ctx.bloom = Some(bloom);
        self.world.ctx.debug = debug;
        Ok(())
    }

    /// Per-frame driver: finishes any pending load, then ticks the world.
    /// A redraw that was already queued when the session was disposed is
    /// dropped here instead of ticking a torn-down world.
    pub fn update(&mut self) {
        if self.world.is_disposed() {
            return;
        }
        self.poll_load();
        self.world.tick();
    }

    /// Starts loading a model on a worker thread. The session flips to
    /// `Loading` immediately and resolves to `Idle` or `Error` from a
    /// later [`update`](Self::update); a load failure is also kept in
    /// [`last_error`](Self::last_error).
    pub fn load_model<L: ModelLoader>(&mut self, mut loader: L) -> Result<(), ViewerError> {
        if self.world.is_disposed() {
            return Err(ViewerError::DisposedAccess("Viewer"));
        }
        self.last_error = None;
        self.load_status.set(LoadStatus::Loading);
        let (sender, receiver) = oneshot::channel();
        std::thread::spawn(move || {
            let _ = sender.send(loader.load());
        });
        self.pending = Some(receiver);
        Ok(())
    }

    /// The failure behind the most recent `Error` status, if any. Cleared
    /// when a new load starts.
    pub fn last_error(&self) -> Option<&ViewerError> {
        self.last_error.as_ref()
    }

    fn poll_load(&mut self) {
        let Some(receiver) = &mut self.pending else {
            return;
        };
        match receiver.try_recv() {
            Ok(None) => {} // still loading
            Ok(Some(Ok(root))) => {
                self.pending = None;
                self.install_model(root);
            }
            Ok(Some(Err(e))) => {
                self.pending = None;
                let error = ViewerError::Load(e);
                log::error!("{error}");
                self.last_error = Some(error);
                self.load_status.set(LoadStatus::Error);
            }
            Err(oneshot::Canceled) => {
                self.pending = None;
                log::error!("model loader dropped without a result");
                self.load_status.set(LoadStatus::Error);
            }
        }
    }

    /// Installs a loaded model: orients it Y-up, classifies its parts,
    /// swaps out any previous model and frames the camera on it.
    pub(crate) fn install_model(&mut self, mut root: Node) {
        // Source assets are Z-up; the scene is Y-up.
        root.transform = Matrix4::from_angle_x(Rad(-std::f32::consts::FRAC_PI_2)) * root.transform;

        let classifier = &self.classifier;
        root.traverse_mut(&mut |node| {
            if node.is_drawable() {
                node.status = Some(classifier(node));
            }
        });

        if let Some(previous) = self.model.get() {
            self.highlights.clear();
            self.world.ctx.graph.remove(previous);
        }

        let id = self.world.ctx.graph.add(root);
        if let Some(aabb) = self.world.ctx.graph.world_aabb_of(id) {
            self.world
                .ctx
                .controls
                .fit_to_box(&aabb, self.world.ctx.view.fovy);
        }

        self.model.set(Some(id));
        self.load_status.set(LoadStatus::Idle);
    }

    /// Applies the status highlight to one part subtree and parks the
    /// cursor above it. The cursor sits over the center of the subtree's
    /// bounding box, just above its top face, so it never overlaps the
    /// part it points at.
    pub fn highlight_object(&mut self, id: NodeId) {
        let Self {
            world,
            palette,
            highlights,
            cursor,
            ..
        } = self;
        let graph = &mut world.ctx.graph;

        let aabb = graph.world_aabb_of(id);
        let Some(target) = graph.get_mut(id) else {
            return;
        };
        target.traverse_mut(&mut |node| {
            if let Some(status) = node.status {
                if let Some(material) = palette.get(&status) {
                    highlights.substitute(node, *material);
                }
            }
        });

        if let (Some(aabb), Some(cursor_node)) = (aabb, graph.get_mut(*cursor)) {
            let center = aabb.center();
            cursor_node.set_position(Vector3::new(center.x, aabb.max.y + 0.6, center.z));
            cursor_node.visible = true;
        }
    }

    /// Restores the original materials of one part subtree and hides the
    /// cursor.
    pub fn reset_object_highlight(&mut self, id: NodeId) {
        let Self {
            world,
            highlights,
            cursor,
            ..
        } = self;
        let graph = &mut world.ctx.graph;

        if let Some(target) = graph.get_mut(id) {
            target.traverse_mut(&mut |node| highlights.restore(node));
        }
        if let Some(cursor_node) = graph.get_mut(*cursor) {
            cursor_node.visible = false;
        }
    }

    /// Highlights every part with the given status label and restores all
    /// others, across the whole model.
    pub fn highlight_by_status(&mut self, label: &str) {
        let Self {
            world,
            palette,
            highlights,
            cursor,
            model,
            ..
        } = self;
        let Some(model_id) = model.get() else {
            return;
        };
        let graph = &mut world.ctx.graph;

        if let Some(root) = graph.get_mut(model_id) {
            root.traverse_mut(&mut |node| match node.status {
                Some(status) if status.label() == label => {
                    if let Some(material) = palette.get(&status) {
                        highlights.substitute(node, *material);
                    }
                }
                _ => highlights.restore(node),
            });
        }
        if let Some(cursor_node) = graph.get_mut(*cursor) {
            cursor_node.visible = false;
        }
    }

    /// Restores every highlighted part.
    pub fn clear_highlights(&mut self) {
        if let Some(model_id) = self.model.get() {
            self.reset_object_highlight(model_id);
        }
    }

    /// Tears the whole session down. Idempotent.
    pub fn dispose(&mut self) {
        self.pending = None;
        self.world.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn viewer() -> Viewer {
        Viewer::new(Viewport::new(800, 600, 1.0))
    }

    fn sample_model() -> Node {
        let mut root = Node::group("model");
        for name in ["a", "b", "c"] {
            root.add_child(Node::drawable(
                name,
                Geometry::cube(1.0),
                Material::new([0.6, 0.6, 0.6, 1.0]),
            ));
        }
        root
    }

    fn wait_for<F: FnMut(&mut Viewer) -> bool>(viewer: &mut Viewer, mut done: F) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !done(viewer) {
            assert!(Instant::now() < deadline, "timed out waiting for load");
            viewer.update();
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn async_load_installs_model_and_settles_idle() {
        let mut viewer = viewer();
        viewer.load_model(|| Ok(sample_model())).unwrap();
        assert_eq!(viewer.load_status.get(), LoadStatus::Loading);

        wait_for(&mut viewer, |v| v.model.get().is_some());
        assert_eq!(viewer.load_status.get(), LoadStatus::Idle);

        // Every drawable part got a status.
        let model_id = viewer.model.get().unwrap();
        let mut classified = 0;
        viewer
            .world
            .ctx
            .graph
            .get(model_id)
            .unwrap()
            .traverse(&mut |node| {
                if node.is_drawable() {
                    assert!(node.status.is_some());
                    classified += 1;
                }
            });
        assert_eq!(classified, 3);
    }

    #[test]
    fn failed_load_reports_error_and_keeps_no_model() {
        let mut viewer = viewer();
        let nodes_before = viewer.world.ctx.graph.node_count();
        viewer
            .load_model(|| Err(LoadError::Parse("corrupt".into())))
            .unwrap();

        wait_for(&mut viewer, |v| v.load_status.get() != LoadStatus::Loading);
        assert_eq!(viewer.load_status.get(), LoadStatus::Error);
        assert!(viewer.model.get().is_none());
        // Nothing was added to the scene.
        assert_eq!(viewer.world.ctx.graph.node_count(), nodes_before);
        assert!(matches!(viewer.last_error(), Some(ViewerError::Load(_))));
    }

    #[test]
    fn load_after_dispose_is_rejected() {
        let mut viewer = viewer();
        viewer.dispose();
        let err = viewer.load_model(|| Ok(sample_model())).unwrap_err();
        assert!(matches!(err, ViewerError::DisposedAccess(_)));
        assert_eq!(viewer.load_status.get(), LoadStatus::Idle);
    }

    #[test]
    fn successful_load_clears_a_previous_error() {
        let mut viewer = viewer();
        viewer
            .load_model(|| Err(LoadError::Parse("corrupt".into())))
            .unwrap();
        wait_for(&mut viewer, |v| v.load_status.get() != LoadStatus::Loading);
        assert!(viewer.last_error().is_some());

        viewer.load_model(|| Ok(sample_model())).unwrap();
        assert!(viewer.last_error().is_none());
        wait_for(&mut viewer, |v| v.model.get().is_some());
        assert_eq!(viewer.load_status.get(), LoadStatus::Idle);
    }

    #[test]
    fn update_after_dispose_is_a_no_op() {
        let mut viewer = viewer();
        viewer.install_model(sample_model());
        viewer.dispose();
        // A redraw queued before teardown still lands here; it must not
        // reach the disposed world.
        viewer.update();
        viewer.update();
        assert!(viewer.world.is_disposed());
    }

    #[test]
    fn highlight_and_reset_round_trip() {
        let mut viewer = viewer();
        viewer.install_model(sample_model());
        let model_id = viewer.model.get().unwrap();

        let originals: Vec<Material> = {
            let mut v = Vec::new();
            viewer
                .world
                .ctx
                .graph
                .get(model_id)
                .unwrap()
                .traverse(&mut |n| {
                    if let Some(m) = n.material() {
                        v.push(*m);
                    }
                });
            v
        };

        viewer.highlight_object(model_id);
        let mut changed = 0;
        viewer
            .world
            .ctx
            .graph
            .get(model_id)
            .unwrap()
            .traverse(&mut |n| {
                if let Some(m) = n.material() {
                    assert!(m.unlit && m.is_transparent());
                    changed += 1;
                }
            });
        assert_eq!(changed, 3);

        // Cursor appears while highlighted.
        let cursor_visible = viewer.world.ctx.graph.get(viewer.cursor).unwrap().visible;
        assert!(cursor_visible);

        viewer.reset_object_highlight(model_id);
        let mut restored = Vec::new();
        viewer
            .world
            .ctx
            .graph
            .get(model_id)
            .unwrap()
            .traverse(&mut |n| {
                if let Some(m) = n.material() {
                    restored.push(*m);
                }
            });
        assert_eq!(restored, originals);
        assert!(!viewer.world.ctx.graph.get(viewer.cursor).unwrap().visible);
    }

    #[test]
    fn repeated_highlight_still_restores_original() {
        let mut viewer = viewer();
        viewer.install_model(sample_model());
        let model_id = viewer.model.get().unwrap();
        let first_child = viewer.world.ctx.graph.get(model_id).unwrap().children[0].id();
        let original = *viewer
            .world
            .ctx
            .graph
            .get(first_child)
            .unwrap()
            .material()
            .unwrap();

        viewer.highlight_object(first_child);
        viewer.highlight_object(first_child);
        viewer.reset_object_highlight(first_child);

        let after = *viewer
            .world
            .ctx
            .graph
            .get(first_child)
            .unwrap()
            .material()
            .unwrap();
        assert_eq!(after, original);
    }

    #[test]
    fn highlight_by_status_only_touches_matching_parts() {
        let mut viewer = viewer();
        // Force a known classification: everything InProgress except by name.
        viewer.set_classifier(Box::new(|node| {
            if node.name == "a" {
                Status::Installed
            } else {
                Status::InProgress
            }
        }));
        viewer.install_model(sample_model());
        let model_id = viewer.model.get().unwrap();

        viewer.highlight_by_status(Status::Installed.label());

        viewer
            .world
            .ctx
            .graph
            .get(model_id)
            .unwrap()
            .traverse(&mut |node| {
                if let Some(material) = node.material() {
                    if node.name == "a" {
                        assert!(material.unlit && material.is_transparent());
                    } else {
                        assert!(!material.unlit);
                    }
                }
            });
    }

    #[test]
    fn loading_a_second_model_replaces_the_first() {
        let mut viewer = viewer();
        viewer.install_model(sample_model());
        let first = viewer.model.get().unwrap();

        viewer.install_model(sample_model());
        let second = viewer.model.get().unwrap();

        assert_ne!(first, second);
        assert!(!viewer.world.ctx.graph.contains(first));
        assert!(viewer.world.ctx.graph.contains(second));
    }

    #[test]
    fn model_observable_notifies_subscribers() {
        let mut viewer = viewer();
        let seen = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        let s = seen.clone();
        viewer.model.subscribe(move |m| s.borrow_mut().push(m.is_some()));

        viewer.install_model(sample_model());
        assert_eq!(*seen.borrow(), vec![false, true]);
    }
}
