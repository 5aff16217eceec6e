//! Logging shims forwarding to `log` or `defmt`, filtered by the `log-level-*` features.
#![allow(unused)]

macro_rules! trace {
    ($s:literal $(, $x:expr)* $(,)?) => {
        {
            #[cfg(all(feature = "log", feature = "log-level-trace"))]
            ::log::trace!($s $(, $x)*);
            #[cfg(all(feature = "defmt", feature = "log-level-trace"))]
            ::defmt::trace!($s $(, $x)*);
            #[cfg(not(all(any(feature = "log", feature = "defmt"), feature = "log-level-trace")))]
            let _ = ($( & $x ),*);
        }
    };
}

macro_rules! debug {
    ($s:literal $(, $x:expr)* $(,)?) => {
        {
            #[cfg(all(feature = "log", feature = "log-level-debug"))]
            ::log::debug!($s $(, $x)*);
            #[cfg(all(feature = "defmt", feature = "log-level-debug"))]
            ::defmt::debug!($s $(, $x)*);
            #[cfg(not(all(any(feature = "log", feature = "defmt"), feature = "log-level-debug")))]
            let _ = ($( & $x ),*);
        }
    };
}

macro_rules! info {
    ($s:literal $(, $x:expr)* $(,)?) => {
        {
            #[cfg(all(feature = "log", feature = "log-level-info"))]
            ::log::info!($s $(, $x)*);
            #[cfg(all(feature = "defmt", feature = "log-level-info"))]
            ::defmt::info!($s $(, $x)*);
            #[cfg(not(all(any(feature = "log", feature = "defmt"), feature = "log-level-info")))]
            let _ = ($( & $x ),*);
        }
    };
}

macro_rules! warn_ {
    ($s:literal $(, $x:expr)* $(,)?) => {
        {
            #[cfg(all(feature = "log", feature = "log-level-warn"))]
            ::log::warn!($s $(, $x)*);
            #[cfg(all(feature = "defmt", feature = "log-level-warn"))]
            ::defmt::warn!($s $(, $x)*);
            #[cfg(not(all(any(feature = "log", feature = "defmt"), feature = "log-level-warn")))]
            let _ = ($( & $x ),*);
        }
    };
}

macro_rules! error {
    ($s:literal $(, $x:expr)* $(,)?) => {
        {
            #[cfg(all(feature = "log", feature = "log-level-error"))]
            ::log::error!($s $(, $x)*);
            #[cfg(all(feature = "defmt", feature = "log-level-error"))]
            ::defmt::error!($s $(, $x)*);
            #[cfg(not(all(any(feature = "log", feature = "defmt"), feature = "log-level-error")))]
            let _ = ($( & $x ),*);
        }
    };
}

pub(crate) use debug;
pub(crate) use error;
pub(crate) use info;
pub(crate) use trace;
pub(crate) use warn_ as warn;
