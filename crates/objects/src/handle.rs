//! Owned handles
//!
//! [`Ref`] holds one reference to an object through one of its interfaces;
//! [`ObjectRef`] holds one reference to an object of a known concrete type.
//! [`SharedRef`] is a [`Ref`] to an object known to be thread-safe, and may
//! move between threads. Cloning acquires, dropping releases.

use std::fmt;
use std::marker::PhantomData;
use std::mem::ManuallyDrop;
use std::ops::Deref;
use std::ptr::NonNull;

use crate::{IObject, Iid, Interface, Object, ObjectBase};

// =============================================================================
// Ref - interface handle
// =============================================================================

/// One owned reference, typed as interface `I`.
pub struct Ref<I: Interface> {
    ptr: NonNull<I>,
}

impl<I: Interface> Ref<I> {
    /// Adopt a reference the caller already owns (e.g. a query result).
    ///
    /// # Safety
    /// - `ptr` must point to a live `I` sub-object
    /// - the caller transfers one reference to the handle
    #[inline]
    #[must_use]
    pub unsafe fn from_raw(ptr: NonNull<I>) -> Self {
        Self { ptr }
    }

    /// Acquire a new reference through a borrowed pointer.
    ///
    /// # Safety
    /// - `ptr` must point to a live `I` sub-object
    #[must_use]
    pub unsafe fn from_borrowed(ptr: NonNull<I>) -> Self {
        unsafe {
            IObject::acquire(ptr.cast());
            Self::from_raw(ptr)
        }
    }

    /// Give up the handle without releasing. The caller now owns the reference.
    #[must_use]
    pub fn into_raw(self) -> NonNull<I> {
        ManuallyDrop::new(self).ptr
    }

    /// The interface pointer. Ownership stays with the handle.
    #[inline]
    #[must_use]
    pub fn as_ptr(&self) -> NonNull<I> {
        self.ptr
    }

    /// Query for interface `J`.
    #[must_use]
    pub fn query<J: Interface>(&self) -> Option<Ref<J>> {
        // SAFETY: the handle keeps the object alive; a hit carries a new reference
        unsafe { IObject::query_interface::<J>(self.ptr.cast()).map(|ptr| Ref::from_raw(ptr)) }
    }

    /// Query for the interface named by `iid`.
    #[must_use]
    pub fn query_iid(&self, iid: &Iid) -> Option<Ref<IObject>> {
        // SAFETY: as in query
        unsafe { IObject::query(self.ptr.cast(), iid).map(|ptr| Ref::from_raw(ptr)) }
    }

    /// Reinterpret as the [`IObject`] prefix of the same sub-object.
    #[must_use]
    pub fn into_object(self) -> Ref<IObject> {
        // SAFETY: every interface starts with the IObject vtable pointer
        unsafe { Ref::from_raw(self.into_raw().cast()) }
    }

    /// Check whether two handles reach the same object.
    ///
    /// Compares the primary sub-objects both handles resolve to.
    #[must_use]
    pub fn same_object<J: Interface>(&self, other: &Ref<J>) -> bool {
        match (self.query::<IObject>(), other.query::<IObject>()) {
            (Some(this), Some(that)) => this.ptr == that.ptr,
            _ => false,
        }
    }
}

impl<I: Interface> Clone for Ref<I> {
    fn clone(&self) -> Self {
        // SAFETY: the handle keeps the object alive
        unsafe { Self::from_borrowed(self.ptr) }
    }
}

impl<I: Interface> Drop for Ref<I> {
    fn drop(&mut self) {
        // SAFETY: the handle owns exactly one reference
        unsafe { IObject::release(self.ptr.cast()) };
    }
}

impl<I: Interface> Deref for Ref<I> {
    type Target = I;

    #[inline]
    fn deref(&self) -> &I {
        // SAFETY: the handle keeps the object alive
        unsafe { self.ptr.as_ref() }
    }
}

impl<I: Interface> fmt::Debug for Ref<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ref")
            .field("iid", &I::IID)
            .field("ptr", &self.ptr)
            .finish()
    }
}

// =============================================================================
// SharedRef - thread-safe interface handle
// =============================================================================

/// One owned reference, typed as interface `I`, to a thread-safe object.
///
/// Made by [`ObjectRef::query_shared`], which checks the concrete type once.
/// Queries through a `SharedRef` stay on the same object and so stay shared.
pub struct SharedRef<I: Interface> {
    inner: Ref<I>,
}

// SAFETY: only built for objects whose payload is Send + Sync and whose
// counter is Sync; interface views expose the payload through &self only
unsafe impl<I: Interface> Send for SharedRef<I> {}
unsafe impl<I: Interface> Sync for SharedRef<I> {}

impl<I: Interface> SharedRef<I> {
    /// Query for interface `J`.
    #[must_use]
    pub fn query<J: Interface>(&self) -> Option<SharedRef<J>> {
        self.inner.query::<J>().map(|inner| SharedRef { inner })
    }

    /// Query for the interface named by `iid`.
    #[must_use]
    pub fn query_iid(&self, iid: &Iid) -> Option<SharedRef<IObject>> {
        self.inner.query_iid(iid).map(|inner| SharedRef { inner })
    }

    /// The interface pointer. Ownership stays with the handle.
    #[inline]
    #[must_use]
    pub fn as_ptr(&self) -> NonNull<I> {
        self.inner.as_ptr()
    }

    /// Check whether two handles reach the same object.
    #[must_use]
    pub fn same_object<J: Interface>(&self, other: &SharedRef<J>) -> bool {
        self.inner.same_object(&other.inner)
    }

    /// Drop the thread-safety marker, keeping the reference.
    #[must_use]
    pub fn into_ref(self) -> Ref<I> {
        self.inner
    }
}

impl<I: Interface> Clone for SharedRef<I> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<I: Interface> Deref for SharedRef<I> {
    type Target = I;

    #[inline]
    fn deref(&self) -> &I {
        &self.inner
    }
}

impl<I: Interface> fmt::Debug for SharedRef<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedRef")
            .field("iid", &I::IID)
            .field("ptr", &self.inner.as_ptr())
            .finish()
    }
}

// =============================================================================
// ObjectRef - concrete handle
// =============================================================================

/// One owned reference to an `Object<T>`.
///
/// Returned by [`Object::new`].
pub struct ObjectRef<T: ObjectBase> {
    ptr: NonNull<Object<T>>,
    _marker: PhantomData<Object<T>>,
}

// SAFETY: holders on several threads touch the payload through &T and the
// counter through &T::RefCount
unsafe impl<T> Send for ObjectRef<T>
where
    T: ObjectBase + Send + Sync,
    T::RefCount: Send + Sync,
{
}

unsafe impl<T> Sync for ObjectRef<T>
where
    T: ObjectBase + Send + Sync,
    T::RefCount: Send + Sync,
{
}

impl<T: ObjectBase> ObjectRef<T> {
    /// Adopt a reference the caller already owns.
    ///
    /// # Safety
    /// - `ptr` must point to a live object
    /// - the caller transfers one reference to the handle
    #[inline]
    #[must_use]
    pub unsafe fn from_raw(ptr: NonNull<Object<T>>) -> Self {
        Self {
            ptr,
            _marker: PhantomData,
        }
    }

    /// Give up the handle without releasing. The caller now owns the reference.
    #[must_use]
    pub fn into_raw(self) -> NonNull<Object<T>> {
        ManuallyDrop::new(self).ptr
    }

    /// The object pointer. Ownership stays with the handle.
    #[inline]
    #[must_use]
    pub fn as_ptr(&self) -> NonNull<Object<T>> {
        self.ptr
    }

    /// Current reference count
    #[must_use]
    pub fn ref_count(&self) -> usize {
        self.object().ref_count()
    }

    /// Query for interface `I`.
    #[must_use]
    pub fn query<I: Interface>(&self) -> Option<Ref<I>> {
        // SAFETY: the handle keeps the object alive; a hit carries a new reference
        unsafe { Object::query_interface::<I>(self.ptr).map(|ptr| Ref::from_raw(ptr)) }
    }

    /// Query for the interface named by `iid`.
    #[must_use]
    pub fn query_iid(&self, iid: &Iid) -> Option<Ref<IObject>> {
        // SAFETY: as in query
        unsafe { Object::query(self.ptr, iid).map(|ptr| Ref::from_raw(ptr)) }
    }

    /// Query for interface `I`, returning a handle that may cross threads.
    #[must_use]
    pub fn query_shared<I: Interface>(&self) -> Option<SharedRef<I>>
    where
        T: Send + Sync,
        T::RefCount: Send + Sync,
    {
        self.query::<I>().map(|inner| SharedRef { inner })
    }

    /// A new reference through the primary sub-object.
    #[must_use]
    pub fn to_object(&self) -> Ref<IObject> {
        // SAFETY: the handle keeps the object alive
        unsafe { Ref::from_borrowed(Object::as_object(self.ptr)) }
    }

    fn object(&self) -> &Object<T> {
        // SAFETY: the handle keeps the object alive
        unsafe { self.ptr.as_ref() }
    }
}

impl<T: ObjectBase> Clone for ObjectRef<T> {
    fn clone(&self) -> Self {
        // SAFETY: the handle keeps the object alive
        unsafe {
            Object::acquire(self.ptr);
            Self::from_raw(self.ptr)
        }
    }
}

impl<T: ObjectBase> Drop for ObjectRef<T> {
    fn drop(&mut self) {
        // SAFETY: the handle owns exactly one reference
        unsafe { Object::release(self.ptr) };
    }
}

impl<T: ObjectBase> Deref for ObjectRef<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        self.object().payload()
    }
}

impl<T: ObjectBase> fmt::Debug for ObjectRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectRef")
            .field("type", &std::any::type_name::<T>())
            .field("ptr", &self.ptr)
            .field("ref_count", &self.ref_count())
            .finish()
    }
}
