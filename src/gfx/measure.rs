//! Point-to-point measurement on model surfaces.
//!
//! While active, the tool raycasts the pointer against the scene every few
//! frames, snaps a hover marker to the surface, and lets two clicks commit
//! a pair of points whose distance is reported. Markers and the connecting
//! line are ordinary scene nodes on the marker layer, so the tool never
//! hits its own overlay.

use cgmath::{MetricSpace, Point3, Vector3};

use crate::gfx::picking::{intersect_graph, Ray};
use crate::gfx::view::View;
use crate::scene::geometry::Geometry;
use crate::scene::graph::SceneGraph;
use crate::scene::material::Material;
use crate::scene::node::{LayerMask, Node, NodeId};

const MARKER_RADIUS: f32 = 0.05;
const LINE_THICKNESS: f32 = 0.012;

/// What a click does once both measurement points are committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompletedClick {
    /// The finished measurement stays until the tool is deactivated.
    Ignore,
    /// The click clears the measurement and starts a new one.
    #[default]
    Restart,
}

/// Observable phase of the measurement interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeasureState {
    Inactive,
    Hovering,
    OnePoint,
    TwoPoints,
}

/// Pixel rectangle of the render surface, for pointer-to-NDC conversion.
#[derive(Debug, Clone, Copy)]
pub struct SurfaceRect {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

impl SurfaceRect {
    pub fn of_window(width: f32, height: f32) -> Self {
        Self {
            left: 0.0,
            top: 0.0,
            width,
            height,
        }
    }

    /// Maps a pointer position to NDC, x right and y up, both -1..1.
    pub fn to_ndc(&self, x: f32, y: f32) -> (f32, f32) {
        let nx = (x - self.left) / self.width * 2.0 - 1.0;
        let ny = -((y - self.top) / self.height * 2.0 - 1.0);
        (nx, ny)
    }
}

/// The measurement tool state machine.
pub struct MeasureTool {
    active: bool,
    /// Raycasts run every `frame_stride` frames to keep pointer tracking
    /// off the per-frame hot path.
    pub frame_stride: u32,
    frame_count: u32,
    pub completed_click: CompletedClick,

    ndc: Option<(f32, f32)>,
    hover: Option<Point3<f32>>,
    point1: Option<Point3<f32>>,
    point2: Option<Point3<f32>>,
    last_distance: Option<f32>,

    hover_marker: Option<NodeId>,
    marker1: Option<NodeId>,
    marker2: Option<NodeId>,
    line: Option<NodeId>,

    hover_material: Material,
    selected_material: Material,
    line_hover_material: Material,
    line_selected_material: Material,
}

impl Default for MeasureTool {
    fn default() -> Self {
        Self::new()
    }
}

impl MeasureTool {
    pub fn new() -> Self {
        Self {
            active: false,
            frame_stride: 3,
            frame_count: 0,
            completed_click: CompletedClick::default(),
            ndc: None,
            hover: None,
            point1: None,
            point2: None,
            last_distance: None,
            hover_marker: None,
            marker1: None,
            marker2: None,
            line: None,
            hover_material: Material::from_hex(0xff00ff).with_opacity(0.5),
            selected_material: Material::from_hex(0xff00ff),
            line_hover_material: Material::from_hex(0xcc00cc).with_opacity(0.5),
            line_selected_material: Material::from_hex(0xff00ff),
        }
    }

    pub fn state(&self) -> MeasureState {
        if !self.active {
            MeasureState::Inactive
        } else if self.point1.is_none() {
            MeasureState::Hovering
        } else if self.point2.is_none() {
            MeasureState::OnePoint
        } else {
            MeasureState::TwoPoints
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn last_distance(&self) -> Option<f32> {
        self.last_distance
    }

    pub fn committed_points(&self) -> (Option<Point3<f32>>, Option<Point3<f32>>) {
        (self.point1, self.point2)
    }

    pub fn activate(&mut self) {
        self.active = true;
    }

    /// Leaves measurement mode, removing every overlay node.
    pub fn deactivate(&mut self, graph: &mut SceneGraph) {
        self.clear_overlay(graph);
        self.ndc = None;
        self.hover = None;
        self.active = false;
    }

    pub fn set_active(&mut self, active: bool, graph: &mut SceneGraph) {
        if active {
            self.activate();
        } else {
            self.deactivate(graph);
        }
    }

    /// Records the pointer position for the next raycast. Ignored while
    /// inactive or once both points are committed.
    pub fn on_pointer_move(&mut self, x: f32, y: f32, rect: &SurfaceRect) {
        if !self.active || self.state() == MeasureState::TwoPoints {
            return;
        }
        self.ndc = Some(rect.to_ndc(x, y));
    }

    /// Commits the current hover point, if any.
    pub fn on_click(&mut self, graph: &mut SceneGraph) {
        if !self.active {
            return;
        }
        if self.state() == MeasureState::TwoPoints {
            match self.completed_click {
                CompletedClick::Ignore => {}
                CompletedClick::Restart => self.reset_points(graph),
            }
            return;
        }
        let Some(hover) = self.hover else {
            return;
        };

        // The hover marker is promoted in place to a committed marker.
        if let Some(id) = self.hover_marker.take() {
            if let Some(node) = graph.get_mut(id) {
                node.set_material(self.selected_material);
            }
            if self.point1.is_none() {
                self.point1 = Some(hover);
                self.marker1 = Some(id);
            } else {
                self.point2 = Some(hover);
                self.marker2 = Some(id);
                let distance = self.point1.map(|p1| p1.distance(hover));
                self.last_distance = distance;
                if let (Some(p1), Some(d)) = (self.point1, distance) {
                    self.redraw_line(graph, p1, hover, self.line_selected_material);
                    log::info!("measured distance: {d:.4}");
                }
            }
        }
        self.hover = None;
    }

    /// Per-tick update: throttled raycast plus overlay maintenance.
    pub fn update(&mut self, graph: &mut SceneGraph, view: &View) {
        if !self.active || self.state() == MeasureState::TwoPoints {
            return;
        }
        self.frame_count = self.frame_count.wrapping_add(1);
        if self.frame_count % self.frame_stride != 0 {
            return;
        }
        let Some((nx, ny)) = self.ndc else {
            return;
        };
        let Some(ray) = Ray::from_ndc(nx, ny, view) else {
            return;
        };

        match intersect_graph(&ray, graph, LayerMask::MARKER) {
            Some(hit) => {
                self.hover = Some(hit.point);
                match self.hover_marker {
                    Some(id) => {
                        if let Some(node) = graph.get_mut(id) {
                            node.set_position(Vector3::new(
                                hit.point.x,
                                hit.point.y,
                                hit.point.z,
                            ));
                        }
                    }
                    None => {
                        self.hover_marker =
                            Some(Self::spawn_marker(graph, hit.point, self.hover_material));
                    }
                }
                if let Some(p1) = self.point1 {
                    self.redraw_line(graph, p1, hit.point, self.line_hover_material);
                }
            }
            None => {
                self.hover = None;
                if let Some(id) = self.hover_marker.take() {
                    graph.remove(id);
                }
                if self.point2.is_none() {
                    if let Some(id) = self.line.take() {
                        graph.remove(id);
                    }
                }
            }
        }
    }

    fn spawn_marker(graph: &mut SceneGraph, at: Point3<f32>, material: Material) -> NodeId {
        let mut marker = Node::drawable(
            "measure-point",
            Geometry::sphere(MARKER_RADIUS, 16, 12),
            material,
        );
        marker.layers = marker.layers.with(LayerMask::MARKER);
        marker.set_position(Vector3::new(at.x, at.y, at.z));
        graph.add(marker)
    }

    /// Lines carry their endpoints in the mesh itself, so updating one
    /// means replacing the node.
    fn redraw_line(
        &mut self,
        graph: &mut SceneGraph,
        from: Point3<f32>,
        to: Point3<f32>,
        material: Material,
    ) {
        if let Some(id) = self.line.take() {
            graph.remove(id);
        }
        let mut line = Node::drawable(
            "measure-line",
            Geometry::segment(
                Vector3::new(from.x, from.y, from.z),
                Vector3::new(to.x, to.y, to.z),
                LINE_THICKNESS,
            ),
            material,
        );
        line.layers = line.layers.with(LayerMask::MARKER);
        self.line = Some(graph.add(line));
    }

    /// Clears committed points and overlay but stays active.
    fn reset_points(&mut self, graph: &mut SceneGraph) {
        self.clear_overlay(graph);
    }

    fn clear_overlay(&mut self, graph: &mut SceneGraph) {
        for id in [
            self.hover_marker.take(),
            self.marker1.take(),
            self.marker2.take(),
            self.line.take(),
        ]
        .into_iter()
        .flatten()
        {
            graph.remove(id);
        }
        self.point1 = None;
        self.point2 = None;
        self.hover = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::viewport::Viewport;
    use crate::scene::material::Material as Mat;

    fn scene_with_cube() -> SceneGraph {
        let mut graph = SceneGraph::new();
        graph.add(Node::drawable("cube", Geometry::cube(1.0), Mat::default()));
        graph
    }

    fn head_on_view() -> View {
        let mut view = View::new(&Viewport::new(800, 800, 1.0));
        view.eye = Point3::new(0.0, 0.0, 10.0);
        view.target = Point3::new(0.0, 0.0, 0.0);
        view
    }

    fn run_updates(tool: &mut MeasureTool, graph: &mut SceneGraph, view: &View, frames: u32) {
        for _ in 0..frames {
            tool.update(graph, view);
        }
    }

    #[test]
    fn full_measurement_scenario() {
        let mut graph = scene_with_cube();
        let view = head_on_view();
        let rect = SurfaceRect::of_window(800.0, 800.0);
        let mut tool = MeasureTool::new();

        assert_eq!(tool.state(), MeasureState::Inactive);
        tool.activate();
        assert_eq!(tool.state(), MeasureState::Hovering);

        // Hover the cube center; one marker appears after the stride.
        tool.on_pointer_move(400.0, 400.0, &rect);
        run_updates(&mut tool, &mut graph, &view, 3);
        assert_eq!(graph.node_count(), 2);

        tool.on_click(&mut graph);
        assert_eq!(tool.state(), MeasureState::OnePoint);
        let (p1, _) = tool.committed_points();
        assert!((p1.unwrap().z - 0.5).abs() < 1e-3);

        // Hover a second spot on the front face and commit it.
        tool.on_pointer_move(440.0, 400.0, &rect);
        run_updates(&mut tool, &mut graph, &view, 3);
        tool.on_click(&mut graph);
        assert_eq!(tool.state(), MeasureState::TwoPoints);

        let (p1, p2) = tool.committed_points();
        let (p1, p2) = (p1.unwrap(), p2.unwrap());
        let expected = p1.distance(p2);
        assert!(expected > 0.0);
        // The reading does not depend on commit order.
        assert!((p2.distance(p1) - expected).abs() < 1e-6);
        assert!((tool.last_distance().unwrap() - expected).abs() < 1e-5);

        // Two markers plus the line.
        assert_eq!(graph.node_count(), 4);
    }

    #[test]
    fn pointer_ignored_after_completion() {
        let mut graph = scene_with_cube();
        let view = head_on_view();
        let rect = SurfaceRect::of_window(800.0, 800.0);
        let mut tool = MeasureTool::new();
        complete_measurement(&mut tool, &mut graph, &view, &rect);

        let before = tool.committed_points();
        tool.on_pointer_move(100.0, 100.0, &rect);
        run_updates(&mut tool, &mut graph, &view, 6);
        assert_eq!(tool.committed_points(), before);
    }

    #[test]
    fn completed_click_restart_begins_new_measurement() {
        let mut graph = scene_with_cube();
        let view = head_on_view();
        let rect = SurfaceRect::of_window(800.0, 800.0);
        let mut tool = MeasureTool::new();
        tool.completed_click = CompletedClick::Restart;
        complete_measurement(&mut tool, &mut graph, &view, &rect);

        tool.on_click(&mut graph);
        assert_eq!(tool.state(), MeasureState::Hovering);
        // Only the cube remains.
        assert_eq!(graph.node_count(), 1);
        // The last reading survives the restart.
        assert!(tool.last_distance().is_some());
    }

    #[test]
    fn completed_click_ignore_keeps_measurement() {
        let mut graph = scene_with_cube();
        let view = head_on_view();
        let rect = SurfaceRect::of_window(800.0, 800.0);
        let mut tool = MeasureTool::new();
        tool.completed_click = CompletedClick::Ignore;
        complete_measurement(&mut tool, &mut graph, &view, &rect);

        let points = tool.committed_points();
        tool.on_click(&mut graph);
        assert_eq!(tool.state(), MeasureState::TwoPoints);
        assert_eq!(tool.committed_points(), points);
        assert_eq!(graph.node_count(), 4);
    }

    #[test]
    fn click_without_hover_does_nothing() {
        let mut graph = scene_with_cube();
        let mut tool = MeasureTool::new();
        tool.activate();
        tool.on_click(&mut graph);
        assert_eq!(tool.state(), MeasureState::Hovering);
        assert_eq!(graph.node_count(), 1);
    }

    #[test]
    fn hover_off_model_removes_marker() {
        let mut graph = scene_with_cube();
        let view = head_on_view();
        let rect = SurfaceRect::of_window(800.0, 800.0);
        let mut tool = MeasureTool::new();
        tool.activate();

        tool.on_pointer_move(400.0, 400.0, &rect);
        run_updates(&mut tool, &mut graph, &view, 3);
        assert_eq!(graph.node_count(), 2);

        // Point far off the cube.
        tool.on_pointer_move(10.0, 10.0, &rect);
        run_updates(&mut tool, &mut graph, &view, 3);
        assert_eq!(graph.node_count(), 1);
    }

    #[test]
    fn deactivate_disposes_overlay_nodes() {
        let mut graph = scene_with_cube();
        let view = head_on_view();
        let rect = SurfaceRect::of_window(800.0, 800.0);
        let mut tool = MeasureTool::new();
        complete_measurement(&mut tool, &mut graph, &view, &rect);
        assert_eq!(graph.node_count(), 4);

        tool.deactivate(&mut graph);
        assert_eq!(tool.state(), MeasureState::Inactive);
        assert_eq!(graph.node_count(), 1);
    }

    #[test]
    fn raycast_is_throttled_by_frame_stride() {
        let mut graph = scene_with_cube();
        let view = head_on_view();
        let rect = SurfaceRect::of_window(800.0, 800.0);
        let mut tool = MeasureTool::new();
        tool.activate();
        tool.on_pointer_move(400.0, 400.0, &rect);

        // Fewer frames than the stride: no raycast yet.
        run_updates(&mut tool, &mut graph, &view, 2);
        assert_eq!(graph.node_count(), 1);
        run_updates(&mut tool, &mut graph, &view, 1);
        assert_eq!(graph.node_count(), 2);
    }

    fn complete_measurement(
        tool: &mut MeasureTool,
        graph: &mut SceneGraph,
        view: &View,
        rect: &SurfaceRect,
    ) {
        tool.activate();
        tool.on_pointer_move(400.0, 400.0, rect);
        run_updates(tool, graph, view, 3);
        tool.on_click(graph);
        tool.on_pointer_move(440.0, 400.0, rect);
        run_updates(tool, graph, view, 3);
        tool.on_click(graph);
        assert_eq!(tool.state(), MeasureState::TwoPoints);
    }
}
