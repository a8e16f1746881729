//! Intrusive reference counting and runtime interface discovery
//!
//! Objects are exposed through capability interfaces. Every object supports the
//! same three operations regardless of its concrete type:
//! - `acquire` - take a reference
//! - `release` - drop a reference; the last one destroys the object
//! - `query` - ask for another interface by identifier; a hit is a new reference
//!
//! ## Declaring interfaces and objects
//! ```ignore
//! use objects::proc::{implement, interface, object};
//!
//! #[interface("demo.IShape")]
//! pub trait IShape {
//!     fn area(&self) -> f64;
//! }
//!
//! #[interface("demo.INamed")]
//! pub trait INamed {
//!     fn id(&self) -> u32;
//! }
//!
//! #[object(IShape, INamed)]
//! pub struct Circle {
//!     radius: f64,
//! }
//!
//! #[implement(IShape)]
//! impl Circle {
//!     fn area(&self) -> f64 { 3.14159 * self.radius * self.radius }
//! }
//!
//! #[implement(INamed)]
//! impl Circle {
//!     fn id(&self) -> u32 { 7 }
//! }
//!
//! let circle = objects::Object::new(Circle {
//!     vtable_i_shape: Circle::VTABLE_I_SHAPE,
//!     vtable_i_named: Circle::VTABLE_I_NAMED,
//!     radius: 2.0,
//! });
//! let named = circle.query::<INamed>().unwrap();
//! assert_eq!(named.id(), 7);
//! ```
//!
//! ## Ownership convention
//! [`Object::create`] returns a raw object with count 0; the creator acquires
//! before sharing it. [`Object::new`] does that first acquire and returns an
//! [`ObjectRef`] owning count 1.

mod error;
mod handle;
mod iid;
mod object;
mod refcount;
pub mod registry;
mod thunks;

pub use error::CreateError;
pub use handle::{ObjectRef, Ref, SharedRef};
pub use iid::{Iid, iid_of};
pub use object::{IObject, IObjectVTable, Interface, Object, ObjectBase, VTablePtr};
pub use refcount::{AtomicRefCount, LocalRefCount, RefCount};
pub use registry::{InterfaceEntry, InterfaceRegistry, InterfaceTable, TableBuilder};

/// Proc-macros - re-exports from objects-macro crate
pub mod proc {
    pub use objects_macro::{implement, interface, object};
}
