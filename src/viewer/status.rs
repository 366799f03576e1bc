//! Status classification and the highlight palette.

use std::collections::HashMap;

use crate::scene::material::Material;
use crate::scene::node::{Node, Status};

/// Assigns an installation status to a model part.
///
/// Supplied by the embedding application; real deployments derive this
/// from project data keyed by part name or external ids.
pub type StatusClassifier = Box<dyn Fn(&Node) -> Status>;

/// Demo classifier cycling deterministically through the four categories
/// by node id. Nothing outside demos should rely on the exact cycle.
pub fn default_classifier() -> StatusClassifier {
    Box::new(|node| Status::ALL[(node.id().raw() % 4) as usize])
}

/// Translucent unlit color per status, used while a part is highlighted.
pub fn highlight_palette() -> HashMap<Status, Material> {
    let mut palette = HashMap::new();
    for (status, hex) in [
        (Status::NotStarted, 0xff4444),
        (Status::InProgress, 0xff9933),
        (Status::PartiallyInstalled, 0xffeb3b),
        (Status::Installed, 0x4caf50),
    ] {
        let mut material = Material::from_hex(hex).with_opacity(0.5);
        material.unlit = true;
        palette.insert(status, material);
    }
    palette
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::geometry::Geometry;

    #[test]
    fn palette_covers_every_status() {
        let palette = highlight_palette();
        for status in Status::ALL {
            let material = palette.get(&status).expect("status missing from palette");
            assert!(material.unlit);
            assert!(material.is_transparent());
        }
    }

    #[test]
    fn default_classifier_is_deterministic_per_node() {
        let classifier = default_classifier();
        let node = Node::drawable("part", Geometry::cube(1.0), Material::default());
        let first = classifier(&node);
        assert_eq!(classifier(&node), first);
        assert!(Status::ALL.contains(&first));
    }
}
