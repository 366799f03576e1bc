//! Surface materials with value semantics.
//!
//! Materials are small `Copy` values compared with `PartialEq`, so features
//! that temporarily replace them (bloom darkening, status highlighting) can
//! save the original, substitute, and later restore by plain assignment.

use std::collections::HashMap;

use crate::scene::node::{Node, NodeId};

/// Shading parameters for one drawable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Material {
    /// Linear RGBA base color; alpha below 1.0 renders translucent.
    pub base_color: [f32; 4],
    /// Additive emissive term, unaffected by lighting.
    pub emissive: [f32; 3],
    /// When set, the base color is output flat with no lighting applied.
    pub unlit: bool,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            base_color: [0.8, 0.8, 0.8, 1.0],
            emissive: [0.0; 3],
            unlit: false,
        }
    }
}

impl Material {
    pub fn new(base_color: [f32; 4]) -> Self {
        Self {
            base_color,
            ..Default::default()
        }
    }

    /// Flat-shaded material, the analog of a basic/unlit shader.
    pub fn unlit(color: [f32; 3]) -> Self {
        Self {
            base_color: [color[0], color[1], color[2], 1.0],
            emissive: [0.0; 3],
            unlit: true,
        }
    }

    /// Pure black unlit material. Substituted onto every non-glowing
    /// drawable while the bloom source texture is rendered.
    pub fn black() -> Self {
        Self::unlit([0.0; 3])
    }

    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.base_color[3] = opacity.clamp(0.0, 1.0);
        self
    }

    pub fn with_emissive(mut self, emissive: [f32; 3]) -> Self {
        self.emissive = emissive;
        self
    }

    /// Builds a material from an 8-bit sRGB hex triple like `0xff4444`.
    pub fn from_hex(hex: u32) -> Self {
        let r = ((hex >> 16) & 0xff) as f32 / 255.0;
        let g = ((hex >> 8) & 0xff) as f32 / 255.0;
        let b = (hex & 0xff) as f32 / 255.0;
        Self::new([r, g, b, 1.0])
    }

    pub fn is_transparent(&self) -> bool {
        self.base_color[3] < 1.0
    }

    /// Packs the material for the per-drawable uniform buffer.
    pub fn to_uniform(&self) -> MaterialUniform {
        MaterialUniform {
            base_color: self.base_color,
            emissive_unlit: [
                self.emissive[0],
                self.emissive[1],
                self.emissive[2],
                if self.unlit { 1.0 } else { 0.0 },
            ],
        }
    }
}

/// GPU-side material block; layout must match `shaders/scene.wgsl`.
#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MaterialUniform {
    pub base_color: [f32; 4],
    /// rgb = emissive, w = unlit flag.
    pub emissive_unlit: [f32; 4],
}

/// Bookkeeping for temporary material substitution.
///
/// The first substitution for a node saves its current material; later
/// substitutions keep that first saved value, so restore always returns to
/// what the node wore before the override began. Restoring a node that was
/// never saved is a no-op.
#[derive(Debug, Default)]
pub struct MaterialOverrides {
    saved: HashMap<NodeId, Material>,
}

impl MaterialOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the node's material, remembering the original on first use.
    /// Does nothing for group nodes.
    pub fn substitute(&mut self, node: &mut Node, replacement: Material) {
        let id = node.id();
        if let Some(current) = node.material().copied() {
            self.saved.entry(id).or_insert(current);
            node.set_material(replacement);
        }
    }

    /// Puts the saved material back, if one was saved.
    pub fn restore(&mut self, node: &mut Node) {
        if let Some(original) = self.saved.remove(&node.id()) {
            node.set_material(original);
        }
    }

    pub fn is_saved(&self, id: NodeId) -> bool {
        self.saved.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.saved.len()
    }

    pub fn is_empty(&self) -> bool {
        self.saved.is_empty()
    }

    pub fn clear(&mut self) {
        self.saved.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::geometry::Geometry;

    fn drawable(color: [f32; 4]) -> Node {
        Node::drawable("part", Geometry::cube(1.0), Material::new(color))
    }

    #[test]
    fn substitute_then_restore_round_trips() {
        let mut node = drawable([0.2, 0.4, 0.6, 1.0]);
        let original = *node.material().unwrap();
        let mut overrides = MaterialOverrides::new();

        overrides.substitute(&mut node, Material::black());
        assert_eq!(*node.material().unwrap(), Material::black());

        overrides.restore(&mut node);
        assert_eq!(*node.material().unwrap(), original);
        assert!(overrides.is_empty());
    }

    #[test]
    fn repeated_substitution_keeps_first_saved_material() {
        let mut node = drawable([1.0, 0.0, 0.0, 1.0]);
        let original = *node.material().unwrap();
        let mut overrides = MaterialOverrides::new();

        overrides.substitute(&mut node, Material::black());
        overrides.substitute(&mut node, Material::unlit([1.0, 0.0, 1.0]));
        overrides.restore(&mut node);

        assert_eq!(*node.material().unwrap(), original);
    }

    #[test]
    fn restore_without_save_is_noop() {
        let mut node = drawable([0.5, 0.5, 0.5, 1.0]);
        let before = *node.material().unwrap();
        let mut overrides = MaterialOverrides::new();

        overrides.restore(&mut node);
        assert_eq!(*node.material().unwrap(), before);
    }

    #[test]
    fn groups_are_ignored() {
        let mut group = Node::group("assembly");
        let mut overrides = MaterialOverrides::new();
        overrides.substitute(&mut group, Material::black());
        assert!(overrides.is_empty());
    }

    #[test]
    fn hex_colors_decode() {
        let m = Material::from_hex(0xff4444);
        assert!((m.base_color[0] - 1.0).abs() < 1e-6);
        assert!((m.base_color[1] - 0x44 as f32 / 255.0).abs() < 1e-6);
    }

    #[test]
    fn uniform_packs_unlit_flag() {
        let lit = Material::new([1.0; 4]).to_uniform();
        let unlit = Material::unlit([1.0; 3]).to_uniform();
        assert_eq!(lit.emissive_unlit[3], 0.0);
        assert_eq!(unlit.emissive_unlit[3], 1.0);
    }
}
