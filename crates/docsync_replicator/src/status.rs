//! Replicator status: activity level, flags, progress and error.

use crate::error::ErrorInfo;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitAnd, BitOr, Not};

/// How active a replicator is.
///
/// Levels are ordered; anything above [`ActivityLevel::Connecting`] means a
/// connection to the peer is established.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ActivityLevel {
    /// Finished, or never started.
    Stopped,
    /// Not connected, but will resume when possible.
    Offline,
    /// Connecting to the peer.
    Connecting,
    /// Connected, caught up, waiting for changes.
    Idle,
    /// Connected and transferring data.
    Busy,
}

impl ActivityLevel {
    /// Returns the lowercase name used in logs.
    pub fn name(self) -> &'static str {
        match self {
            ActivityLevel::Stopped => "stopped",
            ActivityLevel::Offline => "offline",
            ActivityLevel::Connecting => "connecting",
            ActivityLevel::Idle => "idle",
            ActivityLevel::Busy => "busy",
        }
    }

    /// Returns true if a connection is established.
    pub fn is_connected(self) -> bool {
        self > ActivityLevel::Connecting
    }
}

impl fmt::Display for ActivityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A set of status flag bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct StatusFlags(u32);

impl StatusFlags {
    /// No flags.
    pub const NONE: StatusFlags = StatusFlags(0);
    /// The replicator will reconnect after a transient failure.
    pub const WILL_RETRY: StatusFlags = StatusFlags(0x1);
    /// The peer host is believed to be reachable.
    pub const HOST_REACHABLE: StatusFlags = StatusFlags(0x2);
    /// The replicator is suspended by the application.
    pub const SUSPENDED: StatusFlags = StatusFlags(0x4);

    /// Returns the raw bits.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Returns true if every bit of `other` is set.
    #[must_use]
    pub const fn contains(self, other: StatusFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// Sets or clears the bits of `flag`.
    pub fn set(&mut self, flag: StatusFlags, on: bool) {
        if on {
            self.0 |= flag.0;
        } else {
            self.0 &= !flag.0;
        }
    }
}

impl BitOr for StatusFlags {
    type Output = StatusFlags;

    fn bitor(self, rhs: StatusFlags) -> StatusFlags {
        StatusFlags(self.0 | rhs.0)
    }
}

impl BitAnd for StatusFlags {
    type Output = StatusFlags;

    fn bitand(self, rhs: StatusFlags) -> StatusFlags {
        StatusFlags(self.0 & rhs.0)
    }
}

impl Not for StatusFlags {
    type Output = StatusFlags;

    fn not(self) -> StatusFlags {
        StatusFlags(!self.0)
    }
}

/// Transfer progress of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Progress {
    /// Abstract units of work completed.
    pub units_completed: u64,
    /// Total units of work known so far.
    pub units_total: u64,
    /// Documents transferred.
    pub document_count: u64,
}

impl Progress {
    /// Returns completion as a percentage, or 0 when nothing is known.
    pub fn percent(&self) -> f64 {
        if self.units_total == 0 {
            return 0.0;
        }
        100.0 * self.units_completed as f64 / self.units_total as f64
    }
}

/// A snapshot of a replicator's state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicatorStatus {
    /// Activity level.
    pub level: ActivityLevel,
    /// Flag bits.
    pub flags: StatusFlags,
    /// Transfer progress.
    pub progress: Progress,
    /// The error that stopped or interrupted the session, if any.
    pub error: Option<ErrorInfo>,
}

impl ReplicatorStatus {
    /// Creates a status at `level` with no flags, progress or error.
    pub fn new(level: ActivityLevel) -> Self {
        Self {
            level,
            flags: StatusFlags::NONE,
            progress: Progress::default(),
            error: None,
        }
    }

    /// Returns this status with `progress` set.
    #[must_use]
    pub fn with_progress(mut self, units_completed: u64, units_total: u64) -> Self {
        self.progress.units_completed = units_completed;
        self.progress.units_total = units_total;
        self
    }

    /// Returns this status with `error` set.
    #[must_use]
    pub fn with_error(mut self, error: ErrorInfo) -> Self {
        self.error = Some(error);
        self
    }

    /// Returns true if `flag` is set.
    pub fn has_flag(&self, flag: StatusFlags) -> bool {
        self.flags.contains(flag)
    }

    /// Sets or clears `flag`, returning true if the flags changed.
    pub fn set_flag(&mut self, flag: StatusFlags, on: bool) -> bool {
        let before = self.flags;
        self.flags.set(flag, on);
        self.flags != before
    }

    /// Copies level, progress and error from an engine report.
    ///
    /// Engines don't own any flag bits, so the flags are left untouched.
    pub fn update_from_engine(&mut self, reported: &ReplicatorStatus) {
        self.level = reported.level;
        self.progress = reported.progress;
        self.error = reported.error.clone();
    }
}

impl Default for ReplicatorStatus {
    fn default() -> Self {
        Self::new(ActivityLevel::Stopped)
    }
}
