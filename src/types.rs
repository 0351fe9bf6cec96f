use derive_more::{Display, From, Into};
use std::error::Error;

/// Stable handle of a node inside one [`Graph`](crate::graph::Graph).
///
/// Handles are dense indices handed out by
/// [`JobGraph`](crate::graph::JobGraph) in insertion order. They are only
/// meaningful for the graph that issued them.
#[derive(Debug, Display, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, From, Into)]
#[display("#{_0}")]
#[repr(transparent)]
pub struct JobId(u32);

impl JobId {
    #[inline]
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }

    pub(crate) fn from_index(index: usize) -> Self {
        Self(index.try_into().expect("JobId::from_index: graph too large"))
    }
}

/// Priority class of a job. Each class has its own ready queue; a higher
/// class is always drained before a lower one is inspected.
#[derive(Debug, Display, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Priority {
    Low = 0,
    #[default]
    Normal = 1,
    High = 2,
    Critical = 3,
}

impl Priority {
    /// Number of priority levels.
    pub const COUNT: usize = 4;

    /// Every level, highest first. This is the order ready queues are
    /// drained in.
    pub const DESCENDING: [Self; Self::COUNT] =
        [Self::Critical, Self::High, Self::Normal, Self::Low];

    #[inline]
    pub(crate) fn as_index(self) -> usize {
        self as usize
    }
}

/// Error type accepted from fallible job payloads.
pub type JobError = Box<dyn Error + Send + Sync + 'static>;

/// Outcome of a node as observed from outside the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum JobStatus {
    /// Not executed yet.
    #[default]
    Pending,
    /// The payload returned normally (barriers always end here).
    Succeeded,
    /// The payload returned an error; the message is its `Display` output.
    Failed(String),
    /// The payload panicked; the message is the panic payload if it was a
    /// string.
    Panicked(String),
}

impl JobStatus {
    pub fn is_finished(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descending_covers_every_level_once() {
        let mut indexes: Vec<_> = Priority::DESCENDING.iter().map(|p| p.as_index()).collect();
        assert!(Priority::DESCENDING.windows(2).all(|w| w[0] > w[1]));
        indexes.sort_unstable();
        assert_eq!(indexes, (0..Priority::COUNT).collect::<Vec<_>>());
    }

    #[test]
    fn job_id_displays_as_handle() {
        assert_eq!(JobId::from_index(7).to_string(), "#7");
        assert_eq!(u32::from(JobId::from(3)), 3);
    }
}
