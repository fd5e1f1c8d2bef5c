//! Profiling support via Tracy.
//!
//! Re-exports the CPU profiling macros from [`vesper_core::profiling`]. They
//! compile to nothing unless the `profiling` feature is enabled:
//!
//! ```toml
//! [dependencies]
//! vesper-graphics = { version = "0.1", features = ["profiling"] }
//! ```
//!
//! The device marks frame boundaries in `end_frame` and plots the frame
//! index; submission, upload and idle waits each open a named scope.
//!
//! ```ignore
//! use vesper_graphics::profiling::{profile_scope, profile_function};
//!
//! fn record_shadows(cmd: &CommandBuffer) {
//!     profile_function!();
//!     // ...
//! }
//! ```

pub use vesper_core::profiling::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_macros_compile() {
        frame_mark!();
        profile_scope!("test_scope");
        profile_function!();
        profile_plot!("test_value", 42.0);
        set_thread_name!("test_thread");
    }
}
