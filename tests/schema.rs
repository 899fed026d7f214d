//! Schema merge and equality semantics.
mod common;
use annoflow::error::SchemaError;
use annoflow::prelude::*;
use common::*;

#[test]
fn merge_is_commutative_without_conflicts() {
    let a = schema_of(&[("person", ShapeKind::Rectangle), ("car", ShapeKind::Polygon)]);
    let b = schema_of(&[("car", ShapeKind::Polygon), ("lane", ShapeKind::Polyline)]);

    let ab = Schema::merge(&a, &b).expect("a+b should merge");
    let ba = Schema::merge(&b, &a).expect("b+a should merge");
    assert_eq!(ab, ba);
    assert_eq!(ab.classes().len(), 3);
}

#[test]
fn merge_is_idempotent() {
    let a = schema_of(&[("person", ShapeKind::Rectangle)]);
    let merged = Schema::merge(&a, &a).expect("self-merge should succeed");
    assert_eq!(merged, a);
}

#[test]
fn merge_unions_one_of_tag_values() {
    let mut a = Schema::new();
    a.add_tag(TagDef::one_of("vehicle_type", ["car".to_string(), "bus".to_string()]))
        .unwrap();
    let mut b = Schema::new();
    b.add_tag(TagDef::one_of("vehicle_type", ["bus".to_string(), "truck".to_string()]))
        .unwrap();

    let merged = Schema::merge(&a, &b).expect("one-of tags should union");
    let tag = merged.get_tag("vehicle_type").unwrap();
    let values = tag.allowed_values.as_ref().unwrap();
    assert_eq!(values.len(), 3);
    assert!(values.contains("truck"));
}

#[test]
fn merge_rejects_conflicting_shapes() {
    let a = schema_of(&[("thing", ShapeKind::Rectangle)]);
    let b = schema_of(&[("thing", ShapeKind::Bitmap)]);

    let err = Schema::merge(&a, &b).unwrap_err();
    assert!(matches!(err, SchemaError::Conflict { ref name, .. } if name == "thing"));
}

#[test]
fn merge_rejects_conflicting_tag_kinds() {
    let mut a = Schema::new();
    a.add_tag(TagDef::new("score", TagValueKind::Number)).unwrap();
    let mut b = Schema::new();
    b.add_tag(TagDef::new("score", TagValueKind::AnyString)).unwrap();

    assert!(Schema::merge(&a, &b).is_err());
}

#[test]
fn identical_redefinition_is_a_no_op() {
    let mut schema = schema_of(&[("person", ShapeKind::Rectangle)]);
    schema
        .add_class(ClassDef::new("person", ShapeKind::Rectangle))
        .expect("identical redefinition should be accepted");
    assert_eq!(schema.classes().len(), 1);
}

#[test]
fn differing_redefinition_is_rejected() {
    let mut schema = schema_of(&[("person", ShapeKind::Rectangle)]);
    let err = schema
        .add_class(ClassDef::new("person", ShapeKind::Bitmap))
        .unwrap_err();
    assert!(matches!(err, SchemaError::DuplicateName { ref name, .. } if name == "person"));
}

#[test]
fn equality_ignores_declaration_order() {
    let a = schema_of(&[("person", ShapeKind::Rectangle), ("car", ShapeKind::Polygon)]);
    let b = schema_of(&[("car", ShapeKind::Polygon), ("person", ShapeKind::Rectangle)]);
    assert_eq!(a, b);
}

#[test]
fn shape_any_accepts_everything() {
    assert!(ShapeKind::Any.accepts(ShapeKind::Bitmap));
    assert!(ShapeKind::Polyline.accepts(ShapeKind::Any));
    assert!(ShapeKind::Rectangle.accepts(ShapeKind::Rectangle));
    assert!(!ShapeKind::Rectangle.accepts(ShapeKind::Bitmap));
}
