//! Tests for interface discovery

use objects::proc::{implement, interface, object};
use objects::{IObject, Iid, Interface, LocalRefCount, Object, ObjectBase, iid_of};
use std::ffi::c_void;
use std::mem::offset_of;

#[interface("query.IShape")]
pub trait IShape {
    fn area(&self) -> f64;
    fn scale(&mut self, factor: f64);
}

#[interface("query.INamed")]
pub trait INamed {
    fn id(&self) -> u32;
}

/// Declared but implemented by nobody
#[interface("query.IMissing")]
pub trait IMissing {
    fn never(&self);
}

#[object(IShape, INamed)]
pub struct Circle {
    radius: f64,
    id: u32,
}

#[implement(IShape)]
impl Circle {
    fn area(&self) -> f64 {
        3.0 * self.radius * self.radius
    }

    fn scale(&mut self, factor: f64) {
        self.radius *= factor;
    }
}

#[implement(INamed)]
impl Circle {
    fn id(&self) -> u32 {
        self.id
    }
}

fn circle(radius: f64, id: u32) -> objects::ObjectRef<Circle> {
    Object::new(Circle {
        vtable_i_shape: Circle::VTABLE_I_SHAPE,
        vtable_i_named: Circle::VTABLE_I_NAMED,
        radius,
        id,
    })
}

// =============================================================================
// Capability presence
// =============================================================================

#[test]
fn test_declared_interfaces_are_found() {
    let obj = circle(1.0, 11);

    let shape = obj.query::<IShape>().expect("IShape is declared");
    let named = obj.query::<INamed>().expect("INamed is declared");

    assert_eq!(shape.area(), 3.0);
    assert_eq!(named.id(), 11);
}

#[test]
fn test_missing_interface_leaves_count_unchanged() {
    let obj = circle(1.0, 1);
    let before = obj.ref_count();

    assert!(obj.query::<IMissing>().is_none());
    assert!(obj.query_iid(&Iid::new("query.Unknown")).is_none());
    assert_eq!(obj.ref_count(), before);

    // Also through an interface handle
    let shape = obj.query::<IShape>().unwrap();
    let before = obj.ref_count();
    assert!(shape.query::<IMissing>().is_none());
    assert_eq!(obj.ref_count(), before);
}

#[test]
fn test_query_implies_acquire() {
    let obj = circle(1.0, 1);
    assert_eq!(obj.ref_count(), 1);

    let shape = obj.query::<IShape>().unwrap();
    assert_eq!(obj.ref_count(), 2);

    let named = shape.query::<INamed>().unwrap();
    assert_eq!(obj.ref_count(), 3);

    let by_iid = named.query_iid(&iid_of::<IShape>()).unwrap();
    assert_eq!(obj.ref_count(), 4);

    // Each result is released independently of the handle it came from
    drop(shape);
    assert_eq!(obj.ref_count(), 3);
    drop(by_iid);
    drop(named);
    assert_eq!(obj.ref_count(), 1);
}

// =============================================================================
// Identity
// =============================================================================

#[test]
fn test_identity_through_iobject() {
    let obj = circle(2.0, 3);
    let shape = obj.query::<IShape>().unwrap();
    let named = obj.query::<INamed>().unwrap();

    // Distinct sub-objects...
    assert_ne!(
        shape.as_ptr().cast::<c_void>(),
        named.as_ptr().cast::<c_void>()
    );

    // ...one object
    let from_shape = shape.query::<IObject>().unwrap();
    let from_named = named.query::<IObject>().unwrap();
    assert_eq!(from_shape.as_ptr(), from_named.as_ptr());
    assert_eq!(from_shape.as_ptr(), obj.to_object().as_ptr());
    assert!(shape.same_object(&named));

    // The primary sub-object sits at the object base
    assert_eq!(
        from_shape.as_ptr().cast::<c_void>(),
        obj.as_ptr().cast::<c_void>()
    );
}

#[test]
fn test_distinct_objects_are_not_the_same() {
    let a = circle(1.0, 1);
    let b = circle(1.0, 1);
    let shape_a = a.query::<IShape>().unwrap();
    let shape_b = b.query::<IShape>().unwrap();
    assert!(!shape_a.same_object(&shape_b));
}

#[test]
fn test_requery_returns_same_sub_object() {
    let obj = circle(1.0, 1);
    let named = obj.query::<INamed>().unwrap();
    let shape = named.query::<IShape>().unwrap();
    let again = shape.query::<INamed>().unwrap();
    assert_eq!(named.as_ptr(), again.as_ptr());
}

#[test]
fn test_query_iid_matches_typed_query() {
    let obj = circle(1.0, 1);
    let typed = obj.query::<INamed>().unwrap();
    let untyped = obj.query_iid(&Iid::new("query.INamed")).unwrap();
    assert_eq!(typed.as_ptr().cast::<IObject>(), untyped.as_ptr());
}

// =============================================================================
// Table contents
// =============================================================================

#[test]
fn test_table_offsets_match_layout() {
    let table = Circle::interface_table();
    let entries = table.entries();

    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0].iid, IObject::IID);
    assert_eq!(entries[0].offset, 0);
    assert_eq!(entries[1].iid, IShape::IID);
    assert_eq!(entries[1].offset, offset_of!(Circle, vtable_i_shape) as isize);
    assert_eq!(entries[2].iid, INamed::IID);
    assert_eq!(entries[2].offset, offset_of!(Circle, vtable_i_named) as isize);
    assert!(table.type_name().ends_with("Circle"));
}

#[test]
fn test_method_through_view_reference() {
    let obj = circle(2.0, 8);
    let named = obj.query::<INamed>().unwrap();

    // A plain borrow of the view still reaches the whole payload
    let view: &INamed = &named;
    assert_eq!(view.id(), 8);
    let base: &IObject = view.as_object();
    let shape = unsafe { IObject::query_interface::<IShape>(std::ptr::NonNull::from(base)) }
        .map(|ptr| unsafe { objects::Ref::from_raw(ptr) })
        .unwrap();
    assert_eq!(shape.area(), 12.0);
}

#[test]
fn test_mut_method_through_interface() {
    let obj = circle(1.0, 1);
    let shape = obj.query::<IShape>().unwrap();

    let mut ptr = shape.as_ptr();
    unsafe { ptr.as_mut().scale(2.0) };

    assert_eq!(shape.area(), 12.0);
}

// =============================================================================
// Objects with no declared interfaces
// =============================================================================

#[object]
pub struct Plain {
    tag: u8,
}

#[test]
fn test_bare_object_answers_iobject_only() {
    let obj = Object::new(Plain {
        vtable_i_object: Plain::VTABLE_I_OBJECT,
        tag: 1,
    });
    assert_eq!(obj.tag, 1);

    let base = obj.query::<IObject>().expect("IObject is implied");
    assert_eq!(obj.ref_count(), 2);
    assert!(obj.query::<IShape>().is_none());
    assert_eq!(obj.ref_count(), 2);

    // Re-query through the base interface itself
    let again = base.query::<IObject>().unwrap();
    assert_eq!(base.as_ptr(), again.as_ptr());
    assert_eq!(Plain::interface_table().len(), 1);
}

// =============================================================================
// Single-threaded counter
// =============================================================================

#[object(INamed, refcount = LocalRefCount)]
pub struct Local {
    id: u32,
}

#[implement(INamed)]
impl Local {
    fn id(&self) -> u32 {
        self.id
    }
}

#[test]
fn test_local_refcount_object() {
    let obj = Object::new(Local {
        vtable_i_named: Local::VTABLE_I_NAMED,
        id: 42,
    });

    let named = obj.query::<INamed>().unwrap();
    assert_eq!(named.id(), 42);
    assert_eq!(obj.ref_count(), 2);

    drop(named);
    assert_eq!(obj.ref_count(), 1);
}
