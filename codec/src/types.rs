//! Identifier types: ticks, entity ids and event ids.

use std::fmt;

/// A simulation tick number.
///
/// Ticks start at [`Tick::START`] and only move forward. [`Tick::INVALID`]
/// marks "no tick" (nothing received yet, no removal scheduled) and compares
/// greater than every valid tick, so never order against it without checking
/// [`is_valid`](Self::is_valid) first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tick(u32);

impl Tick {
    /// The first tick of a room.
    pub const START: Self = Self(0);

    /// Sentinel for "no tick".
    pub const INVALID: Self = Self(u32::MAX);

    /// Creates a new tick.
    #[must_use]
    pub const fn new(tick: u32) -> Self {
        Self(tick)
    }

    /// Returns the raw tick value.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Returns `false` for [`Tick::INVALID`].
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != u32::MAX
    }

    /// The following tick, saturating one below the sentinel.
    ///
    /// The invalid tick stays invalid.
    #[must_use]
    pub const fn next(self) -> Self {
        if !self.is_valid() {
            return self;
        }
        if self.0 == u32::MAX - 1 {
            return self;
        }
        Self(self.0 + 1)
    }

    /// Returns `true` if this tick is a send tick for the given interval.
    ///
    /// An interval of zero never sends.
    #[must_use]
    pub const fn is_send_tick(self, interval: u32) -> bool {
        self.is_valid() && interval != 0 && self.0 % interval == 0
    }

    /// Ticks elapsed since `earlier`, if both are valid and `earlier` is not
    /// in the future.
    #[must_use]
    pub const fn since(self, earlier: Self) -> Option<u32> {
        if !self.is_valid() || !earlier.is_valid() || earlier.0 > self.0 {
            return None;
        }
        Some(self.0 - earlier.0)
    }

    /// Converts to `Some(self)` when valid.
    #[must_use]
    pub const fn valid(self) -> Option<Self> {
        if self.is_valid() {
            Some(self)
        } else {
            None
        }
    }
}

impl fmt::Display for Tick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "{}", self.0)
        } else {
            write!(f, "invalid")
        }
    }
}

/// A stable entity identifier.
///
/// Assigned by the server room starting at 1 and never reused while the
/// entity is alive. Zero is [`EntityId::INVALID`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityId(u32);

impl EntityId {
    /// Sentinel for "no entity".
    pub const INVALID: Self = Self(0);

    /// The first id a room hands out.
    pub const FIRST: Self = Self(1);

    /// Creates a new entity ID.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw entity ID value.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Returns `false` for [`EntityId::INVALID`].
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }

    /// The following id.
    ///
    /// # Panics
    ///
    /// Panics when the id space is exhausted.
    #[must_use]
    pub const fn next(self) -> Self {
        assert!(self.0 != u32::MAX, "entity id space exhausted");
        Self(self.0 + 1)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An event sequence number.
///
/// Reliable ids live in the cyclic space `1..=65535`. Ordering between two
/// reliable ids uses a sequence window: `a` is newer than `b` when the
/// forward distance from `b` to `a` is in `1..=32767`. Incrementing past
/// 65535 wraps to 1, skipping both sentinels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventId(i32);

impl EventId {
    /// Marks an event that is sent once and never acknowledged.
    pub const UNRELIABLE: Self = Self(-1);

    /// Sentinel for "no event" (e.g. nothing processed yet).
    pub const INVALID: Self = Self(0);

    /// The first reliable id a sender assigns.
    pub const FIRST: Self = Self(1);

    /// Largest reliable id before wrapping.
    pub const MAX: Self = Self(65_535);

    const SPACE: i32 = 65_535;
    const HALF: i32 = 32_767;

    /// Creates an event id from its raw value.
    #[must_use]
    pub const fn new(raw: i32) -> Self {
        Self(raw)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn raw(self) -> i32 {
        self.0
    }

    /// Returns `true` for ids in the reliable range.
    #[must_use]
    pub const fn is_reliable(self) -> bool {
        self.0 >= Self::FIRST.0 && self.0 <= Self::MAX.0
    }

    /// Returns `true` for a valid id (reliable or the unreliable marker).
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.is_reliable() || self.0 == Self::UNRELIABLE.0
    }

    /// The next reliable id, wrapping 65535 to 1.
    ///
    /// # Panics
    ///
    /// Panics if `self` is not reliable.
    #[must_use]
    pub const fn next(self) -> Self {
        assert!(self.is_reliable(), "only reliable event ids advance");
        if self.0 == Self::MAX.0 {
            Self::FIRST
        } else {
            Self(self.0 + 1)
        }
    }

    /// Sequence-window comparison between two reliable ids.
    ///
    /// # Panics
    ///
    /// Panics if either id is not reliable.
    #[must_use]
    pub const fn is_newer_than(self, other: Self) -> bool {
        assert!(
            self.is_reliable() && other.is_reliable(),
            "only reliable event ids are ordered"
        );
        let distance = (self.0 - other.0).rem_euclid(Self::SPACE);
        distance >= 1 && distance <= Self::HALF
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::UNRELIABLE => write!(f, "unreliable"),
            Self::INVALID => write!(f, "invalid"),
            Self(raw) => write!(f, "{raw}"),
        }
    }
}
