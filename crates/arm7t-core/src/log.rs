//! Diagnostic logging shim.
//!
//! With the `log` feature the macros forward to `tracing`; without it they
//! expand to nothing so the hot step loop carries no logging cost.

#![allow(unused_imports, unused_macros)]

#[cfg(feature = "log")]
mod implementation {
    pub(crate) use tracing::debug;
    pub(crate) use tracing::trace;
    // `warn` would shadow the lint attribute of the same name.
    pub(crate) use tracing::warn as warning;
}

#[cfg(not(feature = "log"))]
mod implementation {
    macro_rules! warning {
        ($($ignore:tt)*) => {};
    }

    macro_rules! debug {
        ($($ignore:tt)*) => {};
    }

    macro_rules! trace {
        ($($ignore:tt)*) => {};
    }

    pub(crate) use debug;
    pub(crate) use trace;
    pub(crate) use warning;
}

pub(crate) use implementation::*;
