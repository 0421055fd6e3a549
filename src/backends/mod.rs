//! Backend implementations.

pub mod fs;
pub mod keychain;
