//! Conditional tracing for the inference path
//!
//! With the `tracing` feature the macros below forward to the `tracing`
//! crate at DEBUG level; without it they compile to nothing, so the scalar
//! forward pass carries no logging cost.
//!
//! ```rust,ignore
//! fn forward(&self, image: &Image) -> PatchNetResult<Vec<f32>> {
//!     let _guard = trace_enter!("raw_forward");
//!     // ...
//! }
//! ```

/// Stand-in guard returned by `trace_enter!` without the feature
#[cfg(not(feature = "tracing"))]
pub struct NoopSpanGuard;

/// Enter a DEBUG span until the returned guard drops
///
/// Extra arguments become span fields, as in `tracing::span!`.
#[macro_export]
#[cfg(feature = "tracing")]
macro_rules! trace_enter {
    ($name:expr) => {
        tracing::span!(tracing::Level::DEBUG, $name).entered()
    };
    ($name:expr, $($field:tt)*) => {
        tracing::span!(tracing::Level::DEBUG, $name, $($field)*).entered()
    };
}

/// Enter a DEBUG span until the returned guard drops
#[macro_export]
#[cfg(not(feature = "tracing"))]
macro_rules! trace_enter {
    ($name:expr) => {
        $crate::trace::NoopSpanGuard
    };
    ($name:expr, $($field:tt)*) => {
        $crate::trace::NoopSpanGuard
    };
}

/// Emit a DEBUG event
#[macro_export]
#[cfg(feature = "tracing")]
macro_rules! trace_event {
    ($($arg:tt)*) => {
        tracing::debug!($($arg)*)
    };
}

/// Emit a DEBUG event
#[macro_export]
#[cfg(not(feature = "tracing"))]
macro_rules! trace_event {
    ($($arg:tt)*) => {};
}

pub use trace_enter;
pub use trace_event;
