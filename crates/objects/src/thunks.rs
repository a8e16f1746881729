//! `extern "C"` entry points behind every [`IObjectVTable`](crate::IObjectVTable)
//!
//! Each thunk receives the interface pointer it was called through, steps back
//! `OFFSET` bytes to the object base and forwards to [`Object`].

use std::ffi::c_void;
use std::ptr;

use crate::{IObject, Iid, Object, ObjectBase};

pub(crate) unsafe extern "C" fn acquire<T: ObjectBase, const OFFSET: usize>(this: *mut c_void) {
    unsafe { Object::<T>::acquire(Object::from_interface(this, OFFSET)) }
}

pub(crate) unsafe extern "C" fn release<T: ObjectBase, const OFFSET: usize>(
    this: *mut c_void,
) -> bool {
    unsafe { Object::<T>::release(Object::from_interface(this, OFFSET)) }
}

#[allow(improper_ctypes_definitions)]
pub(crate) unsafe extern "C" fn query<T: ObjectBase, const OFFSET: usize>(
    this: *mut c_void,
    iid: *const Iid,
) -> *mut IObject {
    unsafe {
        let object = Object::<T>::from_interface(this, OFFSET);
        Object::query(object, &*iid).map_or(ptr::null_mut(), |found| found.as_ptr())
    }
}
