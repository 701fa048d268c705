//! End-to-end conversions through the in-memory kernel.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use stepglb::{
    convert_document, convert_file, force_double_sided, run_batch, run_batch_with, BatchEvent,
    ConversionMode, ConvertConfig, ConvertError,
};
use stepglb_kernel::memory::{box_faces, MemoryDocument, MemoryKernel};
use stepglb_kernel::Placement;

/// Two occurrences of one pin and one plate, placed in millimeters.
fn fixture() -> MemoryDocument {
    let mut doc = MemoryDocument::new();
    let pin = doc.add_shape("#pin", box_faces(10.0, 10.0, 50.0));
    let plate = doc.add_shape("#plate", box_faces(200.0, 100.0, 5.0));
    let root = doc.add_free_label("0:1:1:1", Some("Fixture"), None);
    doc.add_sub_label(&root, "0:1:1:1:1", Some("Pin"), Some((pin, Placement::identity())));
    doc.add_sub_label(
        &root,
        "0:1:1:1:2",
        Some("Pin"),
        Some((pin, Placement::translation(1000.0, 0.0, 0.0))),
    );
    doc.add_sub_label(
        &root,
        "0:1:1:1:3",
        Some("Plate"),
        Some((plate, Placement::translation(250.0, -40.0, -5.0))),
    );
    doc
}

fn node_translation(node: &gltf::Node) -> [f32; 3] {
    let m = node.transform().matrix();
    [m[3][0], m[3][1], m[3][2]]
}

#[test]
fn test_three_nodes_two_meshes() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("fixture.step");
    let output = dir.path().join("fixture.glb");
    fs::write(&input, "").unwrap();

    let mut kernel = MemoryKernel::new();
    kernel.insert("fixture.step", fixture());
    let summary = convert_file(&kernel, &input, &output, &ConvertConfig::default()).unwrap();
    assert_eq!(summary.instances, 3);
    assert_eq!(summary.meshes, 2);
    assert_eq!(summary.triangles, 24);

    let (document, _, _) = gltf::import(&output).unwrap();
    assert_eq!(document.nodes().count(), 3);
    assert_eq!(document.meshes().count(), 2);

    let nodes: Vec<_> = document.nodes().collect();
    let mesh_of = |i: usize| nodes[i].mesh().unwrap().index();
    assert_eq!(mesh_of(0), mesh_of(1));
    assert_ne!(mesh_of(0), mesh_of(2));

    let expected = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.25, -0.04, -0.005]];
    for (node, want) in nodes.iter().zip(expected) {
        let got = node_translation(node);
        for k in 0..3 {
            assert!((got[k] - want[k]).abs() < 1e-6, "{:?} != {:?}", got, want);
        }
    }

    assert_eq!(nodes[0].name(), Some("occ_0_1_1_1_1_Pin"));
    assert_eq!(nodes[2].name(), Some("occ_0_1_1_1_3_Plate"));

    for material in document.materials() {
        assert!(material.double_sided());
    }
    for primitive in document.meshes().flat_map(|m| m.primitives()) {
        assert_eq!(primitive.material().index(), Some(0));
    }
}

#[test]
fn test_instances_share_mesh_data() {
    let doc = fixture();
    let scene = convert_document(&doc, &ConvertConfig::default()).unwrap();
    let nodes = scene.nodes();
    assert_eq!(nodes.len(), 3);
    assert!(Arc::ptr_eq(scene.mesh_of(&nodes[0]), scene.mesh_of(&nodes[1])));
    assert!(!Arc::ptr_eq(scene.mesh_of(&nodes[1]), scene.mesh_of(&nodes[2])));
    assert_eq!(doc.mesh_calls(), 2);
}

#[test]
fn test_translation_only_transform() {
    let mut doc = MemoryDocument::new();
    let part = doc.add_shape("#1", box_faces(1.0, 1.0, 1.0));
    doc.add_free_label("0:1:1:1", None, Some((part, Placement::translation(12.0, -7.5, 300.0))));

    let scene = convert_document(&doc, &ConvertConfig::default()).unwrap();
    let t = scene.nodes()[0].transform;
    let m = t.matrix;
    for r in 0..3 {
        for c in 0..3 {
            assert_eq!(m[(r, c)], if r == c { 1.0 } else { 0.0 });
        }
    }
    assert!((m[(0, 3)] - 0.012).abs() < 1e-12);
    assert!((m[(1, 3)] + 0.0075).abs() < 1e-12);
    assert!((m[(2, 3)] - 0.3).abs() < 1e-12);
    assert_eq!([m[(3, 0)], m[(3, 1)], m[(3, 2)], m[(3, 3)]], [0.0, 0.0, 0.0, 1.0]);
    assert!((t.rotation_determinant() - 1.0).abs() < 1e-6);
}

#[test]
fn test_conversion_is_deterministic() {
    let config = ConvertConfig::default();
    let first = convert_document(&fixture(), &config).unwrap();
    let second = convert_document(&fixture(), &config).unwrap();

    assert_eq!(first.nodes().len(), second.nodes().len());
    for (a, b) in first.nodes().iter().zip(second.nodes()) {
        assert_eq!(a.name, b.name);
        assert_eq!(a.transform, b.transform);
        let (ma, mb) = (first.mesh_of(a), second.mesh_of(b));
        assert_eq!(ma.num_vertices(), mb.num_vertices());
        assert_eq!(ma.num_triangles(), mb.num_triangles());
    }
    assert_eq!(
        stepglb::scene_to_glb(&first).unwrap(),
        stepglb::scene_to_glb(&second).unwrap()
    );
}

#[test]
fn test_zero_face_shape_is_skipped() {
    let mut doc = fixture();
    let nothing = doc.add_shape("#nothing", Vec::new());
    doc.add_free_label("0:1:1:2", Some("Sketch"), Some((nothing, Placement::identity())));

    let scene = convert_document(&doc, &ConvertConfig::default()).unwrap();
    assert_eq!(scene.nodes().len(), 3);
    assert!(scene.nodes().iter().all(|n| !n.name.contains("Sketch")));
}

#[test]
fn test_empty_document_fails_only_its_file() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["empty.step", "fixture.stp"] {
        fs::write(dir.path().join(name), "").unwrap();
    }
    let mut kernel = MemoryKernel::new();
    kernel.insert("empty.step", MemoryDocument::new());
    kernel.insert("fixture.stp", fixture());

    let report = run_batch(&kernel, dir.path(), &ConvertConfig::default()).unwrap();
    assert_eq!(report.outcomes.len(), 2);
    assert_eq!(report.converted(), 1);
    assert_eq!(report.failed(), 1);

    let empty = &report.outcomes[0];
    assert!(empty.input.ends_with("empty.step"));
    assert!(matches!(empty.result, Err(ConvertError::NoInstancesExported)));
    assert!(!empty.output.exists());

    let converted = &report.outcomes[1];
    assert_eq!(converted.result.as_ref().unwrap().instances, 3);
    assert!(dir.path().join("fixture.glb").exists());
}

#[test]
fn test_unreadable_file_does_not_stop_batch() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["a.STEP", "b.step"] {
        fs::write(dir.path().join(name), "").unwrap();
    }
    let mut kernel = MemoryKernel::new();
    kernel.insert("b.step", fixture());

    let mut events = Vec::new();
    let report = run_batch_with(&kernel, dir.path(), &ConvertConfig::default(), |event| {
        events.push(match event {
            BatchEvent::Started { input, .. } => format!("start {}", file_name(input)),
            BatchEvent::Finished(outcome) => format!(
                "done {} {}",
                file_name(&outcome.input),
                outcome.result.is_ok()
            ),
        });
    })
    .unwrap();

    assert!(matches!(
        report.outcomes[0].result,
        Err(ConvertError::ReadFailure(_))
    ));
    assert_eq!(
        events,
        vec!["start a.STEP", "done a.STEP false", "start b.step", "done b.step true"]
    );
}

#[test]
fn test_empty_directory() {
    let dir = tempfile::tempdir().unwrap();
    let report = run_batch(&MemoryKernel::new(), dir.path(), &ConvertConfig::default()).unwrap();
    assert!(report.is_empty());
}

#[test]
fn test_post_processor_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("fixture.step");
    let output = dir.path().join("fixture.glb");
    fs::write(&input, "").unwrap();
    let mut kernel = MemoryKernel::new();
    kernel.insert("fixture.step", fixture());

    convert_file(&kernel, &input, &output, &ConvertConfig::default()).unwrap();
    let before = fs::read(&output).unwrap();
    assert!(force_double_sided(&output).unwrap().is_noop());
    assert!(force_double_sided(&output).unwrap().is_noop());
    assert_eq!(fs::read(&output).unwrap(), before);
}

#[test]
fn test_single_shape_mode() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("fixture.step");
    let output = dir.path().join("fixture.glb");
    fs::write(&input, "").unwrap();
    let mut kernel = MemoryKernel::new();
    kernel.insert("fixture.step", fixture());

    let config = ConvertConfig::for_mode(ConversionMode::SingleShape);
    let summary = convert_file(&kernel, &input, &output, &config).unwrap();
    assert_eq!(summary.instances, 1);
    assert_eq!(summary.meshes, 1);
    assert_eq!(summary.triangles, 36);

    let (document, _, _) = gltf::import(&output).unwrap();
    assert_eq!(document.nodes().count(), 1);
    let primitive = document.meshes().next().unwrap().primitives().next().unwrap();
    let bounds = primitive.bounding_box();
    assert!((bounds.min[2] + 0.005).abs() < 1e-6);
    assert!((bounds.max[0] - 1.010).abs() < 1e-6);
}

fn file_name(path: &Path) -> String {
    path.file_name().unwrap().to_string_lossy().into_owned()
}
