//! Build metadata baked in at compile time.

/// Crate version, from Cargo.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
