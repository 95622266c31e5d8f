use serde::{Deserialize, Serialize};

/// Queue priority of a definition (and of every instance created from it).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

impl Priority {
    /// Lower rank is dequeued first.
    pub fn rank(self) -> u8 {
        match self {
            Priority::Critical => 0,
            Priority::High => 1,
            Priority::Normal => 2,
            Priority::Low => 3,
        }
    }

    /// True when `self` should run before `other`.
    pub fn outranks(self, other: Priority) -> bool {
        self.rank() < other.rank()
    }
}
