//! Tracy instrumentation.
//!
//! The macros here compile to nothing unless the `profiling` feature is on,
//! in which case they forward to [`tracy_client`]. The GPU core uses them on
//! the per-frame paths: submission, destruction flushes and bindless flushes.
//!
//! ```ignore
//! use vesper_core::profiling::{frame_mark, profile_plot, profile_scope};
//!
//! fn end_frame(pending: usize) {
//!     profile_scope!("end_frame");
//!     profile_plot!("pending destroys", pending);
//!     frame_mark!();
//! }
//! ```
//!
//! Run with `cargo run --features profiling` and attach the Tracy UI.

#[cfg(feature = "profiling")]
pub use tracy_client::{
    self, Client, frame_mark as tracy_frame_mark, plot as tracy_plot, span,
};

/// Marks the end of a frame.
#[macro_export]
#[cfg(feature = "profiling")]
macro_rules! frame_mark {
    () => {
        $crate::profiling::tracy_frame_mark()
    };
}

/// Marks the end of a frame (no-op).
#[macro_export]
#[cfg(not(feature = "profiling"))]
macro_rules! frame_mark {
    () => {};
}

/// Opens a named span that closes at the end of the enclosing scope.
#[macro_export]
#[cfg(feature = "profiling")]
macro_rules! profile_scope {
    ($name:expr) => {
        let _profile_span = $crate::profiling::span!($name);
    };
}

/// Opens a named span (no-op).
#[macro_export]
#[cfg(not(feature = "profiling"))]
macro_rules! profile_scope {
    ($name:expr) => {};
}

/// Opens a span named after the enclosing function.
#[macro_export]
#[cfg(feature = "profiling")]
macro_rules! profile_function {
    () => {
        let _profile_span = $crate::profiling::span!();
    };
}

/// Opens a span named after the enclosing function (no-op).
#[macro_export]
#[cfg(not(feature = "profiling"))]
macro_rules! profile_function {
    () => {};
}

/// Plots a value over time.
#[macro_export]
#[cfg(feature = "profiling")]
macro_rules! profile_plot {
    ($name:expr, $value:expr) => {
        $crate::profiling::tracy_plot!($name, $value as f64)
    };
}

/// Plots a value over time (no-op).
#[macro_export]
#[cfg(not(feature = "profiling"))]
macro_rules! profile_plot {
    ($name:expr, $value:expr) => {
        let _ = $value;
    };
}

/// Names the current thread in the profiler.
#[macro_export]
#[cfg(feature = "profiling")]
macro_rules! set_thread_name {
    ($name:expr) => {
        $crate::profiling::tracy_client::set_thread_name!($name)
    };
}

/// Names the current thread in the profiler (no-op).
#[macro_export]
#[cfg(not(feature = "profiling"))]
macro_rules! set_thread_name {
    ($name:expr) => {};
}

pub use frame_mark;
pub use profile_function;
pub use profile_plot;
pub use profile_scope;
pub use set_thread_name;

#[cfg(test)]
mod tests {
    #[test]
    fn macros_expand_without_client() {
        frame_mark!();
        profile_scope!("scope");
        profile_function!();
        profile_plot!("value", 3usize);
        set_thread_name!("worker");
    }
}
