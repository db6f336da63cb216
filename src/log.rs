//! Logging macros that turn into no-ops unless the `log` Cargo feature is enabled.

#[cfg(feature = "log")]
macro_rules! error {
    ($($t:tt)*) => { log::error!($($t)*) };
}

#[cfg(feature = "log")]
macro_rules! warn {
    ($($t:tt)*) => { log::warn!($($t)*) };
}

#[cfg(feature = "log")]
macro_rules! debug {
    ($($t:tt)*) => { log::debug!($($t)*) };
}

#[cfg(feature = "log")]
macro_rules! trace {
    ($($t:tt)*) => { log::trace!($($t)*) };
}

// The no-op versions still expand their arguments through `format_args!` so that malformed format
// strings are caught no matter which features are enabled.

#[cfg(not(feature = "log"))]
macro_rules! error {
    ($($t:tt)*) => { { let _ = format_args!($($t)*); } };
}

#[cfg(not(feature = "log"))]
macro_rules! warn {
    ($($t:tt)*) => { { let _ = format_args!($($t)*); } };
}

#[cfg(not(feature = "log"))]
macro_rules! debug {
    ($($t:tt)*) => { { let _ = format_args!($($t)*); } };
}

#[cfg(not(feature = "log"))]
macro_rules! trace {
    ($($t:tt)*) => { { let _ = format_args!($($t)*); } };
}
