//! Run configuration.

use std::fmt;
use std::str::FromStr;

use crate::topology::RankOrder;

/// Communication schedule of the shift-multiply loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Schedule {
    /// Multiply, then exchange with a blocking send-receive-replace.
    Blocking,
    /// Post the exchange into a second buffer and multiply while it runs.
    #[default]
    NonBlocking,
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Schedule::Blocking => write!(f, "blocking"),
            Schedule::NonBlocking => write!(f, "non-blocking"),
        }
    }
}

impl FromStr for Schedule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "blocking" => Ok(Schedule::Blocking),
            "non-blocking" | "nonblocking" => Ok(Schedule::NonBlocking),
            other => Err(format!(
                "unknown schedule '{other}' (expected 'blocking' or 'non-blocking')"
            )),
        }
    }
}

/// Everything needed to set up a distributed multiply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CannonConfig {
    /// Number of cooperating processes; must be a perfect square.
    pub processes: usize,
    pub schedule: Schedule,
    pub rank_order: RankOrder,
}

impl Default for CannonConfig {
    fn default() -> Self {
        Self {
            processes: 1,
            schedule: Schedule::default(),
            rank_order: RankOrder::default(),
        }
    }
}

impl CannonConfig {
    pub fn new(processes: usize) -> Self {
        Self {
            processes,
            ..Self::default()
        }
    }

    pub fn with_schedule(mut self, schedule: Schedule) -> Self {
        self.schedule = schedule;
        self
    }

    pub fn with_rank_order(mut self, rank_order: RankOrder) -> Self {
        self.rank_order = rank_order;
        self
    }
}
