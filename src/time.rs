//! Time APIs used for protocol timeouts.
//!
//! The stack does not read a clock on its own; the link layer hands it [`Instant`]s obtained from
//! a hardware [`Timer`]. Microsecond resolution and 32-bit arithmetic keep this cheap on MCUs; an
//! `Instant` wraps around after roughly an hour, which is fine for the timeouts the stack needs
//! (the longest one is the 30 second Security Manager timeout).
//!
//! [`Instant`]: struct.Instant.html
//! [`Timer`]: trait.Timer.html

use core::fmt;
use core::ops::{Add, Sub};

/// A duration with microsecond resolution, up to about an hour.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Duration(u32);

impl Duration {
    /// Creates a `Duration` from a number of microseconds.
    pub const fn from_micros(micros: u32) -> Self {
        Duration(micros)
    }

    /// Creates a `Duration` representing the given number of milliseconds.
    pub const fn from_millis(millis: u16) -> Self {
        Duration(millis as u32 * 1_000)
    }

    /// Creates a `Duration` representing a number of seconds.
    pub const fn from_secs(secs: u16) -> Self {
        Duration(secs as u32 * 1_000_000)
    }

    /// Returns the number of microseconds represented by `self`.
    pub fn as_micros(&self) -> u32 {
        self.0
    }
}

impl Add for Duration {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Duration(self.0.checked_add(rhs.0).expect("duration overflow"))
    }
}

impl fmt::Debug for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 % 1_000_000 == 0 {
            write!(f, "{}s", self.0 / 1_000_000)
        } else if self.0 % 1_000 == 0 {
            write!(f, "{}ms", self.0 / 1_000)
        } else {
            write!(f, "{}µs", self.0)
        }
    }
}

/// A point in time, relative to an unspecified epoch.
///
/// Apart from wrapping around after about an hour, `Instant`s are monotonic. Instants created
/// from different [`Timer`] instances must not be mixed.
///
/// [`Timer`]: trait.Timer.html
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct Instant(u32);

impl Instant {
    /// Creates an `Instant` from raw microseconds since the timer's reference point.
    ///
    /// This should only be called by [`Timer`] implementations (and tests).
    ///
    /// [`Timer`]: trait.Timer.html
    pub const fn from_raw_micros(micros: u32) -> Self {
        Instant(micros)
    }

    /// Calculates the time that has passed between `earlier` and `self`.
    ///
    /// The subtraction wraps, so the result is only meaningful when the two instants are less
    /// than one wrap period (about an hour) apart.
    pub fn duration_since(&self, earlier: Instant) -> Duration {
        Duration(self.0.wrapping_sub(earlier.0))
    }
}

impl Sub<Instant> for Instant {
    type Output = Duration;

    fn sub(self, rhs: Self) -> Duration {
        self.duration_since(rhs)
    }
}

impl Add<Duration> for Instant {
    type Output = Self;

    fn add(self, d: Duration) -> Self {
        Instant(self.0.wrapping_add(d.as_micros()))
    }
}

impl fmt::Debug for Instant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t+{}µs", self.0)
    }
}

/// Trait for time providers.
///
/// The hardware interface has to supply an implementation with microsecond accuracy; a mock
/// implementation works for testing.
pub trait Timer {
    /// Obtains the current time as an [`Instant`].
    ///
    /// Returned `Instant`s must never move backwards in time, except when the underlying 32-bit
    /// counter wraps around.
    ///
    /// [`Instant`]: struct.Instant.html
    fn now(&self) -> Instant;
}
