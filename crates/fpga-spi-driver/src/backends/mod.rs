//! Collaborator implementations
//!
//! Only the in-memory backend ships here; a kernel binding would implement
//! the same traits from [`crate::backend`].

pub mod software;

pub use software::{SoftwareBus, SoftwareDevice, SoftwareHost};
