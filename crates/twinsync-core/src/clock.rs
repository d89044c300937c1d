//! Logical time and the time-advance computation.
//!
//! The external time source publishes a timestamp into the data lake and
//! announces it on `TimeChannel`. The twin keeps its own logical clock that
//! only moves in whole ticks of a fixed period. On every time notification
//! the dispatcher asks [`compute_and_apply_ticks`] how many ticks separate
//! the two clocks and advances the twin only when the answer is positive.
//!
//! # Design Principles
//!
//! - All arithmetic is checked or widened; no input pair can overflow.
//! - Time never moves backward: a twin that is ahead of the published time
//!   is left alone, and so is a twin within one period of it.
//! - The tick period is positive by construction ([`TickPeriod`]).

use std::fmt;
use std::num::NonZeroU64;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Signed number of ticks between two clocks.
///
/// Positive means the twin is behind the external source.
pub type TickCount = i64;

/// Errors raised by a [`ClockSource`].
#[derive(Debug, thiserror::Error)]
pub enum ClockError {
    /// Advancing would push the clock beyond `u64::MAX`.
    #[error("clock overflow: cannot advance {ticks} ticks from {from}")]
    Overflow {
        /// Time before the attempted advance.
        from: LogicalTime,
        /// Ticks requested.
        ticks: u64,
    },

    /// The clock could not be read or mutated.
    #[error("clock unavailable: {reason}")]
    Unavailable {
        /// Explanation of the failure.
        reason: String,
    },
}

/// A point on the shared logical timeline.
///
/// Both the external published time and the twin's internal time are
/// expressed in the same unit (milliseconds with the default configuration).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogicalTime(u64);

impl LogicalTime {
    /// The origin of the timeline.
    pub const ZERO: Self = Self(0);

    /// Wrap a raw timestamp.
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Return the raw timestamp.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for LogicalTime {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for LogicalTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Span of logical time represented by one tick. Always positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TickPeriod(NonZeroU64);

impl TickPeriod {
    /// Build a tick period, rejecting zero.
    pub const fn new(period: u64) -> Option<Self> {
        match NonZeroU64::new(period) {
            Some(p) => Some(Self(p)),
            None => None,
        }
    }

    /// Return the period as a raw integer.
    pub const fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for TickPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The twin's clock as seen by the dispatcher.
///
/// Mutation is only ever driven from the single listener, but an
/// implementation shared with other threads must serialize its own
/// mutations.
pub trait ClockSource {
    /// Return the twin's current logical time.
    fn current_time(&self) -> Result<LogicalTime, ClockError>;

    /// Advance the twin's clock by `ticks` whole ticks.
    fn advance_time(&mut self, ticks: u64) -> Result<(), ClockError>;
}

/// Compute how many whole ticks separate `twin_time` from `external_time`.
///
/// The difference is divided by the period with truncation toward zero, so
/// `(700 - 850) / 100` is `-1`, not `-2`. The computation is carried out in
/// `i128` and saturates into [`TickCount`].
pub fn compute_ticks(
    external_time: LogicalTime,
    twin_time: LogicalTime,
    tick_period: TickPeriod,
) -> TickCount {
    let diff = i128::from(external_time.get()).saturating_sub(i128::from(twin_time.get()));
    let ticks = diff.checked_div(i128::from(tick_period.get())).unwrap_or(0);
    TickCount::try_from(ticks).unwrap_or(if ticks.is_positive() {
        TickCount::MAX
    } else {
        TickCount::MIN
    })
}

/// Compute the tick difference and advance `clock` when it is positive.
///
/// Returns the computed [`TickCount`] whether or not the clock moved. Zero
/// and negative counts are a no-op.
///
/// # Errors
///
/// Propagates any [`ClockError`] from [`ClockSource::advance_time`].
pub fn compute_and_apply_ticks(
    clock: &mut dyn ClockSource,
    external_time: LogicalTime,
    twin_time: LogicalTime,
    tick_period: TickPeriod,
) -> Result<TickCount, ClockError> {
    let ticks = compute_ticks(external_time, twin_time, tick_period);
    match u64::try_from(ticks) {
        Ok(0) => {
            debug!(external = %external_time, twin = %twin_time, "twin clock caught up");
        }
        Ok(positive) => {
            clock.advance_time(positive)?;
            debug!(
                external = %external_time,
                twin = %twin_time,
                ticks = positive,
                "advanced twin clock"
            );
        }
        Err(_negative) => {
            debug!(
                external = %external_time,
                twin = %twin_time,
                ticks,
                "external time behind twin, not advancing"
            );
        }
    }
    Ok(ticks)
}

/// In-process logical clock that moves in whole ticks.
///
/// Used by the reference twin. `advance_time(n)` moves the clock forward by
/// `n * period` with checked arithmetic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TwinClock {
    now: LogicalTime,
    period: TickPeriod,
    ticks_elapsed: u64,
}

impl TwinClock {
    /// Create a clock at `start` that advances `period` per tick.
    pub const fn new(start: LogicalTime, period: TickPeriod) -> Self {
        Self {
            now: start,
            period,
            ticks_elapsed: 0,
        }
    }

    /// Current logical time.
    pub const fn now(&self) -> LogicalTime {
        self.now
    }

    /// Total ticks applied since construction.
    pub const fn ticks_elapsed(&self) -> u64 {
        self.ticks_elapsed
    }

    /// Configured tick period.
    pub const fn period(&self) -> TickPeriod {
        self.period
    }
}

impl ClockSource for TwinClock {
    fn current_time(&self) -> Result<LogicalTime, ClockError> {
        Ok(self.now)
    }

    fn advance_time(&mut self, ticks: u64) -> Result<(), ClockError> {
        let overflow = || ClockError::Overflow {
            from: self.now,
            ticks,
        };
        let span = ticks.checked_mul(self.period.get()).ok_or_else(overflow)?;
        let next = self.now.get().checked_add(span).ok_or_else(overflow)?;
        let elapsed = self.ticks_elapsed.checked_add(ticks).ok_or_else(overflow)?;
        self.now = LogicalTime::new(next);
        self.ticks_elapsed = elapsed;
        Ok(())
    }
}
