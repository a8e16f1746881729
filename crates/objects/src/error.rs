//! Error types

use thiserror::Error;

/// Failure to construct an [`Object`](crate::Object).
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CreateError {
    /// The global allocator returned null
    #[error("out of memory allocating object ({size} bytes, align {align})")]
    OutOfMemory { size: usize, align: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_out_of_memory_message() {
        let err = CreateError::OutOfMemory { size: 48, align: 8 };
        assert_eq!(
            err.to_string(),
            "out of memory allocating object (48 bytes, align 8)"
        );
    }
}
