//! Occurrence enumeration over a document's label tree.

use std::collections::HashSet;

use stepglb_kernel::{BaseShape, CadDocument, Label, ShapeIdentity, Transform};

use crate::config::ConvertConfig;

/// One placed shape, ready for tessellation and instancing.
#[derive(Debug, Clone)]
pub struct Occurrence<S> {
    /// Entry of the label the occurrence was read from; unique per walk.
    pub entry: ShapeIdentity,
    /// Display name (the entry when the label has no name).
    pub name: String,
    /// Geometry with its placement stripped.
    pub base: BaseShape<S>,
    /// Placement in output units.
    pub transform: Transform,
}

/// Enumerate every labelled occurrence of `document` once.
///
/// Each free label contributes its sub-shape labels first and then itself.
/// Labels whose entry was already visited, and labels without a shape, are
/// skipped.
pub fn walk_occurrences<D: CadDocument>(
    document: &D,
    config: &ConvertConfig,
) -> Vec<Occurrence<D::Shape>> {
    let mut seen: HashSet<ShapeIdentity> = HashSet::new();
    let mut occurrences = Vec::new();

    for root in document.free_labels() {
        let mut labels = document.sub_labels(&root);
        labels.push(root);

        for label in labels {
            if !seen.insert(label.entry().clone()) {
                continue;
            }
            let Some(shape) = document.shape(&label) else {
                tracing::trace!(entry = %label.entry(), "label has no shape");
                continue;
            };
            let (location, base) = shape.strip_location();
            occurrences.push(Occurrence {
                entry: label.entry().clone(),
                name: resolve_name(document, &label),
                base,
                transform: Transform::from_placement(&location, config.unit_scale_to_meters),
            });
        }
    }

    occurrences
}

/// The label's name annotation, or its entry when it has none.
pub fn resolve_name<D: CadDocument>(document: &D, label: &Label) -> String {
    match document.name(label) {
        Some(name) if !name.is_empty() => name,
        _ => label.entry().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stepglb_kernel::memory::{box_faces, MemoryDocument};
    use stepglb_kernel::Placement;

    #[test]
    fn test_children_before_root_and_dedup() {
        let mut doc = MemoryDocument::new();
        let part = doc.add_shape("#10", box_faces(1.0, 1.0, 1.0));
        let a = doc.add_free_label("0:1:1:1", Some("A"), None);
        let b = doc.add_free_label("0:1:1:2", Some("B"), Some((part, Placement::identity())));
        let pin = doc.add_sub_label(&a, "0:1:1:1:1", Some("Pin"), Some((part, Placement::identity())));
        doc.attach_sub_label(&b, &pin);

        let occ = walk_occurrences(&doc, &ConvertConfig::default());
        let entries: Vec<&str> = occ.iter().map(|o| o.entry.as_str()).collect();
        // root A has no shape; the pin is reached twice but kept once
        assert_eq!(entries, vec!["0:1:1:1:1", "0:1:1:2"]);
    }

    #[test]
    fn test_name_falls_back_to_entry() {
        let mut doc = MemoryDocument::new();
        let part = doc.add_shape("#1", box_faces(1.0, 1.0, 1.0));
        let named = doc.add_free_label("0:1:1:1", Some("Bolt"), Some((part, Placement::identity())));
        let anonymous = doc.add_free_label("0:1:1:2", None, Some((part, Placement::identity())));
        let blank = doc.add_free_label("0:1:1:3", Some(""), Some((part, Placement::identity())));

        assert_eq!(resolve_name(&doc, &named), "Bolt");
        assert_eq!(resolve_name(&doc, &anonymous), "0:1:1:2");
        assert_eq!(resolve_name(&doc, &blank), "0:1:1:3");
    }

    #[test]
    fn test_transform_scaled_and_base_stripped() {
        let mut doc = MemoryDocument::new();
        let part = doc.add_shape("#7", box_faces(1.0, 1.0, 1.0));
        doc.add_free_label("0:1:1:1", None, Some((part, Placement::translation(1000.0, 0.0, -20.0))));

        let occ = walk_occurrences(&doc, &ConvertConfig::default());
        assert_eq!(occ.len(), 1);
        assert_eq!(occ[0].base.identity.as_str(), "#7");
        let t = occ[0].transform.translation_part();
        assert!((t.x - 1.0).abs() < 1e-12);
        assert!((t.z + 0.02).abs() < 1e-12);
    }

    #[test]
    fn test_empty_document() {
        let doc = MemoryDocument::new();
        assert!(walk_occurrences(&doc, &ConvertConfig::default()).is_empty());
    }
}
