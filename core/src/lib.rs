//! # Vesper Core
//!
//! Engine-agnostic building blocks shared by the Vesper crates:
//!
//! - [`arena`] - generational slot storage behind every resource pool
//! - [`pool`] - allocation-preserving recycling for per-frame structures
//! - [`profiling`] - optional Tracy instrumentation macros

pub mod arena;
pub mod pool;
pub mod profiling;

/// Core library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
