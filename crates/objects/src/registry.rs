//! Per-type interface tables
//!
//! Each concrete payload type owns one [`InterfaceRegistry`]. On first use the
//! registry builds an [`InterfaceTable`]: one entry per implemented interface,
//! holding the interface identifier and the byte offset from the object base to
//! that interface's vtable pointer.
//!
//! ## Memory Layout
//!
//! ```text
//! Object<Circle> in memory:
//! ┌──────────────────────┐  ← base (offset 0): IObject, IShape
//! │ &IShapeVTable        │
//! ├──────────────────────┤  ← offset 8: INamed
//! │ &INamedVTable        │
//! ├──────────────────────┤
//! │ radius               │
//! │ ...                  │
//! ├──────────────────────┤
//! │ refcount             │
//! └──────────────────────┘
//! ```
//!
//! Entry 0 of every table is [`IObject`], which resolves to the primary
//! (first) sub-object. The table is immutable once built, so lookups take no
//! lock.

use std::ffi::c_void;
use std::marker::PhantomData;
use std::mem::MaybeUninit;
use std::ptr::NonNull;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::{IObject, Iid, Interface, ObjectBase};

/// Information about a single interface implementation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InterfaceEntry {
    /// Identifier of the interface
    pub iid: Iid,
    /// Byte offset from object start to this interface's vtable pointer
    pub offset: isize,
}

impl InterfaceEntry {
    /// Create a new InterfaceEntry
    #[must_use]
    pub const fn new(iid: Iid, offset: isize) -> Self {
        Self { iid, offset }
    }
}

/// Interface table for one concrete type
#[derive(Debug)]
pub struct InterfaceTable {
    type_name: &'static str,
    entries: Box<[InterfaceEntry]>,
}

impl InterfaceTable {
    /// Create a table from its entries
    #[must_use]
    pub fn new(type_name: &'static str, entries: Vec<InterfaceEntry>) -> Self {
        Self {
            type_name,
            entries: entries.into_boxed_slice(),
        }
    }

    /// Name of the concrete type this table describes
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// All entries, in declaration order
    #[must_use]
    pub fn entries(&self) -> &[InterfaceEntry] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Find the offset for `iid`.
    ///
    /// A linear scan: tables hold one entry per declared interface.
    #[inline]
    #[must_use]
    pub fn lookup(&self, iid: &Iid) -> Option<isize> {
        self.entries
            .iter()
            .find(|entry| entry.iid == *iid)
            .map(|entry| entry.offset)
    }

    /// Check if this type implements a given interface
    #[must_use]
    pub fn implements(&self, iid: &Iid) -> bool {
        self.lookup(iid).is_some()
    }

    /// Cast an object base pointer to the interface named by `iid`.
    ///
    /// # Safety
    /// - `base` must point to a live instance of the type this table describes
    #[inline]
    pub unsafe fn cast(&self, base: NonNull<c_void>, iid: &Iid) -> Option<NonNull<IObject>> {
        let offset = self.lookup(iid)?;
        // SAFETY: offset was measured on this type's layout
        Some(unsafe { resolve(base, offset) })
    }
}

/// Apply a byte offset to an object base pointer.
///
/// # Safety
/// - `base + offset` must stay within the object `base` points to
#[inline]
pub unsafe fn resolve<I>(base: NonNull<c_void>, offset: isize) -> NonNull<I> {
    unsafe { base.cast::<u8>().offset(offset).cast() }
}

/// Measure the byte offset of interface `I` inside `T`.
///
/// `project` maps a base pointer to the address of the interface's vtable
/// pointer field. It runs once, against an uninitialized placeholder, so it
/// must only compute a field address and never read through the pointer.
#[must_use]
pub fn interface_offset<T, I>(project: fn(*const T) -> *const I) -> isize {
    let placeholder = MaybeUninit::<T>::uninit();
    let base = placeholder.as_ptr();
    let interface = project(base);
    (interface.addr() as isize).wrapping_sub(base.addr() as isize)
}

/// Collects the entries of one type's table.
///
/// Handed to [`ObjectBase::declare_interfaces`].
pub struct TableBuilder<T> {
    entries: Vec<InterfaceEntry>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: ObjectBase> TableBuilder<T> {
    fn new() -> Self {
        Self {
            entries: Vec::new(),
            _marker: PhantomData,
        }
    }

    /// Declare interface `I`, located through `project`
    pub fn entry<I: Interface>(&mut self, project: fn(*const T) -> *const I) -> &mut Self {
        self.entries
            .push(InterfaceEntry::new(I::IID, interface_offset(project)));
        self
    }

    fn finish(self) -> InterfaceTable {
        InterfaceTable::new(std::any::type_name::<T>(), self.entries)
    }
}

/// Lazily built table storage, one `static` per concrete type.
#[derive(Debug)]
pub struct InterfaceRegistry {
    table: OnceLock<InterfaceTable>,
    builds: AtomicUsize,
}

impl InterfaceRegistry {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            table: OnceLock::new(),
            builds: AtomicUsize::new(0),
        }
    }

    /// The table for `T`, building it on first call.
    ///
    /// Concurrent first callers block until the single build finishes and
    /// then all observe the same table.
    pub fn table<T: ObjectBase>(&self) -> &InterfaceTable {
        self.table.get_or_init(|| {
            self.builds.fetch_add(1, Ordering::Relaxed);

            let mut builder = TableBuilder::<T>::new();
            T::declare_interfaces(&mut builder);
            let table = builder.finish();

            #[cfg(feature = "tracing")]
            tracing::debug!(
                type_name = table.type_name(),
                entries = table.len(),
                "built interface table"
            );

            table
        })
    }

    /// The table if it has been built
    #[must_use]
    pub fn get(&self) -> Option<&InterfaceTable> {
        self.table.get()
    }

    /// How many times the build ran (0 or 1)
    #[must_use]
    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::Relaxed)
    }
}

impl Default for InterfaceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
