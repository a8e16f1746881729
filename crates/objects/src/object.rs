//! The base interface and the lifecycle wrapper
//!
//! ## Key Types
//! - [`IObject`] - base of every interface: acquire, release, query
//! - [`Interface`] - implemented by every interface view struct
//! - [`ObjectBase`] - implemented by payload types (see `#[object]`)
//! - [`Object`] - payload + reference counter, the heap-allocated unit
//!
//! Every interface vtable starts with an [`IObjectVTable`], so any interface
//! pointer can be acquired, released or queried without knowing the concrete
//! type behind it.

use std::alloc::{self, Layout};
use std::ffi::c_void;
use std::fmt;
use std::marker::PhantomData;
use std::ptr::{self, NonNull};

use crate::registry::{self, InterfaceRegistry, InterfaceTable, TableBuilder};
use crate::{CreateError, Iid, ObjectRef, RefCount, thunks};

// =============================================================================
// IObject - base interface
// =============================================================================

/// Base vtable embedded as the first field of every interface vtable.
#[repr(C)]
pub struct IObjectVTable {
    /// Increment the reference count.
    pub acquire: unsafe extern "C" fn(this: *mut c_void),
    /// Decrement the reference count. Returns false once the object is destroyed.
    pub release: unsafe extern "C" fn(this: *mut c_void) -> bool,
    /// Query for another interface. Returns null if it is not implemented.
    pub query: unsafe extern "C" fn(this: *mut c_void, iid: *const Iid) -> *mut IObject,
}

impl IObjectVTable {
    /// Base vtable for a `T` sub-object located `OFFSET` bytes from the object base.
    #[must_use]
    pub const fn for_interface<T: ObjectBase, const OFFSET: usize>() -> Self {
        Self {
            acquire: thunks::acquire::<T, OFFSET>,
            release: thunks::release::<T, OFFSET>,
            query: thunks::query::<T, OFFSET>,
        }
    }
}

/// A vtable pointer bound to the payload type `T` it was built for.
///
/// `#[object]` gives every vtable field this type and `#[implement]` hands out
/// the only values of it, so a vtable built for one type cannot be stored in
/// another.
///
/// ```
/// use objects::proc::{implement, interface, object};
///
/// #[interface("doc.IShape")]
/// pub trait IShape {
///     fn area(&self) -> f64;
/// }
///
/// #[object(IShape)]
/// pub struct Wide {
///     x: f64,
///     w: f64,
/// }
///
/// #[implement(IShape)]
/// impl Wide {
///     fn area(&self) -> f64 {
///         self.x * self.w
///     }
/// }
///
/// let wide = objects::Object::new(Wide {
///     vtable_i_shape: Wide::VTABLE_I_SHAPE,
///     x: 1.0,
///     w: 5.0,
/// });
/// assert_eq!(wide.query::<IShape>().unwrap().area(), 5.0);
/// ```
///
/// A vtable of another type with the same interface is rejected:
///
/// ```compile_fail
/// use objects::proc::{implement, interface, object};
///
/// #[interface("doc.IShape")]
/// pub trait IShape {
///     fn area(&self) -> f64;
/// }
///
/// #[object(IShape)]
/// pub struct Small {
///     x: f64,
/// }
///
/// #[implement(IShape)]
/// impl Small {
///     fn area(&self) -> f64 {
///         self.x
///     }
/// }
///
/// #[object(IShape)]
/// pub struct Wide {
///     x: f64,
///     w: f64,
/// }
///
/// #[implement(IShape)]
/// impl Wide {
///     fn area(&self) -> f64 {
///         self.x * self.w
///     }
/// }
///
/// let wide = objects::Object::new(Wide {
///     vtable_i_shape: Small::VTABLE_I_SHAPE,
///     x: 1.0,
///     w: 5.0,
/// });
/// ```
#[repr(transparent)]
pub struct VTablePtr<T, V: 'static> {
    vtable: &'static V,
    _owner: PhantomData<fn() -> T>,
}

impl<T, V: 'static> VTablePtr<T, V> {
    /// Bind `vtable` to `T`.
    ///
    /// # Safety
    /// The base entries of `vtable` must come from
    /// [`IObjectVTable::for_interface::<T, OFFSET>`](IObjectVTable::for_interface),
    /// where `OFFSET` is the offset of the `T` field that will hold the pointer.
    #[must_use]
    pub const unsafe fn new(vtable: &'static V) -> Self {
        Self {
            vtable,
            _owner: PhantomData,
        }
    }

    /// The vtable
    #[inline]
    #[must_use]
    pub const fn get(self) -> &'static V {
        self.vtable
    }
}

impl<T, V: 'static> Clone for VTablePtr<T, V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T, V: 'static> Copy for VTablePtr<T, V> {}

impl<T, V: 'static> fmt::Debug for VTablePtr<T, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("VTablePtr")
            .field(&ptr::from_ref(self.vtable))
            .finish()
    }
}

/// IObject - base of all interfaces.
///
/// A view struct: it holds only the vtable pointer found at the start of every
/// interface sub-object.
#[repr(C)]
pub struct IObject {
    vtable: &'static IObjectVTable,
}

// SAFETY: IObject is the vtable pointer prefix shared by every interface
unsafe impl Interface for IObject {
    const IID: Iid = Iid::new("objects.IObject");
    type VTable = IObjectVTable;
}

impl IObject {
    /// Get the vtable
    #[inline]
    #[must_use]
    pub fn vtable(&self) -> &'static IObjectVTable {
        self.vtable
    }

    /// Increment the reference count.
    ///
    /// # Safety
    /// - `this` must point to a live interface sub-object
    #[inline]
    pub unsafe fn acquire(this: NonNull<Self>) {
        unsafe {
            let vtable = (*this.as_ptr()).vtable;
            (vtable.acquire)(this.as_ptr().cast())
        }
    }

    /// Decrement the reference count, destroying the object at zero.
    ///
    /// Returns `false` when the object was destroyed.
    ///
    /// # Safety
    /// - `this` must point to a live interface sub-object
    /// - the caller must own the reference being released
    #[inline]
    pub unsafe fn release(this: NonNull<Self>) -> bool {
        unsafe {
            let vtable = (*this.as_ptr()).vtable;
            (vtable.release)(this.as_ptr().cast())
        }
    }

    /// Query for the interface named by `iid`.
    ///
    /// On success the returned pointer carries a new reference.
    ///
    /// # Safety
    /// - `this` must point to a live interface sub-object
    #[inline]
    pub unsafe fn query(this: NonNull<Self>, iid: &Iid) -> Option<NonNull<IObject>> {
        unsafe {
            let vtable = (*this.as_ptr()).vtable;
            NonNull::new((vtable.query)(this.as_ptr().cast(), iid))
        }
    }

    /// Typed form of [`IObject::query`].
    ///
    /// # Safety
    /// - `this` must point to a live interface sub-object
    #[inline]
    pub unsafe fn query_interface<I: Interface>(this: NonNull<Self>) -> Option<NonNull<I>> {
        unsafe { Self::query(this, &I::IID) }.map(NonNull::cast)
    }
}

// =============================================================================
// Interface / ObjectBase traits
// =============================================================================

/// Trait for interface view structs.
///
/// Automatically implemented by `#[interface]`.
///
/// # Safety
/// The implementing struct must be `#[repr(C)]` and consist of a single
/// `&'static Self::VTable`, and `Self::VTable` must be `#[repr(C)]` with an
/// [`IObjectVTable`] as its first field.
pub unsafe trait Interface: Sized + 'static {
    /// The interface identifier
    const IID: Iid;

    /// The vtable struct
    type VTable: 'static;

    /// View this interface as its [`IObject`] prefix.
    #[inline]
    fn as_object(&self) -> &IObject {
        // SAFETY: guaranteed by the trait contract
        unsafe { &*(self as *const Self as *const IObject) }
    }
}

/// Trait for payload types that can live inside an [`Object`].
///
/// Automatically implemented by `#[object]`.
///
/// # Safety
/// Every entry declared by [`declare_interfaces`](ObjectBase::declare_interfaces)
/// must locate a field holding a vtable whose base entries were built with
/// [`IObjectVTable::for_interface::<Self, OFFSET>`](IObjectVTable::for_interface),
/// with `OFFSET` equal to that field's offset. The first entry must be [`IObject`].
pub unsafe trait ObjectBase: Sized + 'static {
    /// Counter embedded next to the payload
    type RefCount: RefCount;

    /// Storage for this type's table
    fn registry() -> &'static InterfaceRegistry;

    /// List the implemented interfaces. Runs at most once per type.
    fn declare_interfaces(table: &mut TableBuilder<Self>);

    /// This type's table, built on first use
    #[inline]
    fn interface_table() -> &'static InterfaceTable {
        Self::registry().table::<Self>()
    }
}

// =============================================================================
// Object - the lifecycle wrapper
// =============================================================================

/// A payload composed with its reference counter.
///
/// The payload sits at offset 0, so the object base, the payload base and the
/// primary interface sub-object share one address.
#[repr(C)]
pub struct Object<T: ObjectBase> {
    payload: T,
    refcount: T::RefCount,
}

impl<T: ObjectBase> Object<T> {
    /// Allocate an object around `payload`.
    ///
    /// The count starts at zero: the creator must [`acquire`](Self::acquire)
    /// before handing the pointer to anyone, and the last matching
    /// [`release`](Self::release) destroys it.
    #[must_use]
    pub fn create(payload: T) -> NonNull<Self> {
        Self::publish(NonNull::from(Box::leak(Box::new(Self::compose(payload)))))
    }

    /// Like [`create`](Self::create), but reports allocation failure.
    pub fn try_create(payload: T) -> Result<NonNull<Self>, CreateError> {
        let layout = Layout::new::<Self>();
        if layout.size() == 0 {
            return Ok(Self::create(payload));
        }

        // SAFETY: layout has a non-zero size
        let raw = unsafe { alloc::alloc(layout) }.cast::<Self>();
        let Some(ptr) = NonNull::new(raw) else {
            return Err(CreateError::OutOfMemory {
                size: layout.size(),
                align: layout.align(),
            });
        };

        // SAFETY: fresh allocation with the layout of Self; Box frees it with the same layout
        unsafe { ptr.as_ptr().write(Self::compose(payload)) };
        Ok(Self::publish(ptr))
    }

    /// Allocate an object and take the creator's reference (count = 1).
    #[must_use]
    pub fn new(payload: T) -> ObjectRef<T> {
        let ptr = Self::create(payload);
        // SAFETY: freshly created, the acquire is adopted by the handle
        unsafe {
            Self::acquire(ptr);
            ObjectRef::from_raw(ptr)
        }
    }

    fn compose(payload: T) -> Self {
        Self {
            payload,
            refcount: T::RefCount::default(),
        }
    }

    /// Expose the allocation so [`from_interface`](Self::from_interface) can
    /// recover it from a pointer that only covers one interface view.
    fn publish(ptr: NonNull<Self>) -> NonNull<Self> {
        let _ = ptr.as_ptr().expose_provenance();
        ptr
    }

    /// Increment the reference count.
    ///
    /// # Safety
    /// - `this` must point to a live object
    #[inline]
    pub unsafe fn acquire(this: NonNull<Self>) {
        unsafe { (*this.as_ptr()).refcount.increment() };
    }

    /// Decrement the reference count.
    ///
    /// Returns `true` while other references remain. The call that drops the
    /// count to zero destroys the object and returns `false`; `this` must not
    /// be used after that.
    ///
    /// # Safety
    /// - `this` must point to a live object
    /// - the caller must own the reference being released
    #[inline]
    pub unsafe fn release(this: NonNull<Self>) -> bool {
        if unsafe { (*this.as_ptr()).refcount.decrement() } != 0 {
            return true;
        }

        #[cfg(feature = "tracing")]
        tracing::trace!(type_name = std::any::type_name::<T>(), "destroying object");

        // SAFETY: the count reached zero, no other reference exists
        drop(unsafe { Box::from_raw(this.as_ptr()) });
        false
    }

    /// Query for the interface named by `iid`.
    ///
    /// On success the object is acquired once and the returned pointer owns
    /// that reference. On failure nothing changes.
    ///
    /// # Safety
    /// - `this` must point to a live object
    pub unsafe fn query(this: NonNull<Self>, iid: &Iid) -> Option<NonNull<IObject>> {
        // SAFETY: table offsets were measured on T, which sits at offset 0
        let instance = unsafe { T::interface_table().cast(this.cast(), iid) }?;
        unsafe { Self::acquire(this) };
        Some(instance)
    }

    /// Typed form of [`Object::query`].
    ///
    /// # Safety
    /// - `this` must point to a live object
    pub unsafe fn query_interface<I: Interface>(this: NonNull<Self>) -> Option<NonNull<I>> {
        unsafe { Self::query(this, &I::IID) }.map(NonNull::cast)
    }

    /// The primary sub-object. Does not acquire.
    ///
    /// # Safety
    /// - `this` must point to a live object
    #[must_use]
    pub unsafe fn as_object(this: NonNull<Self>) -> NonNull<IObject> {
        let primary = T::interface_table()
            .entries()
            .first()
            .map_or(0, |entry| entry.offset);
        unsafe { registry::resolve(this.cast(), primary) }
    }

    /// Recover the object from an interface pointer `offset` bytes into it.
    ///
    /// The pointer may be derived from a borrow of the interface view alone;
    /// the result carries the provenance of the whole allocation.
    ///
    /// # Safety
    /// - `interface` must point `offset` bytes into a live `Object<T>` made by
    ///   [`create`](Self::create), [`try_create`](Self::try_create) or [`new`](Self::new)
    #[inline]
    pub unsafe fn from_interface(interface: *mut c_void, offset: usize) -> NonNull<Self> {
        let base = ptr::with_exposed_provenance_mut::<Self>(interface.addr() - offset);
        unsafe { NonNull::new_unchecked(base) }
    }

    /// The payload
    #[inline]
    #[must_use]
    pub fn payload(&self) -> &T {
        &self.payload
    }

    /// Current reference count
    #[inline]
    #[must_use]
    pub fn ref_count(&self) -> usize {
        self.refcount.count()
    }
}
