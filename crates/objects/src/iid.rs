//! Interface identifiers
//!
//! Every capability interface carries one [`Iid`]. Identifiers are compared by
//! their text, so two identifiers produced in different places (or by different
//! crates) match whenever they spell the same name.

use std::fmt;

use crate::Interface;

/// Identifier naming one capability interface.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Iid(&'static str);

impl Iid {
    /// Create an identifier from its textual name
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    /// The textual name of this identifier
    #[inline]
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        self.0
    }
}

impl fmt::Debug for Iid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Iid({:?})", self.0)
    }
}

impl fmt::Display for Iid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Identifier of interface `I`.
#[inline]
#[must_use]
pub fn iid_of<I: Interface>() -> Iid {
    I::IID
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::IObject;

    #[test]
    fn test_equal_text_matches() {
        // Built from separate allocations on purpose
        let owned = String::from("demo.IShape");
        let leaked: &'static str = Box::leak(owned.into_boxed_str());
        assert_eq!(Iid::new("demo.IShape"), Iid::new(leaked));
    }

    #[test]
    fn test_different_text_differs() {
        assert_ne!(Iid::new("demo.IShape"), Iid::new("demo.INamed"));
        assert_ne!(Iid::new("demo.IShape"), Iid::new("demo.IShape2"));
    }

    #[test]
    fn test_display_and_debug() {
        let iid = Iid::new("demo.IShape");
        assert_eq!(iid.to_string(), "demo.IShape");
        assert_eq!(format!("{:?}", iid), "Iid(\"demo.IShape\")");
    }

    #[test]
    fn test_iid_of_base_interface() {
        assert_eq!(iid_of::<IObject>(), IObject::IID);
        assert_eq!(iid_of::<IObject>().as_str(), "objects.IObject");
    }
}
