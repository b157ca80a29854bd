use serde::Serialize;

/// Aggregated result of writing one frame to a set of connections
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BroadcastOutcome {
    /// Connections written to successfully
    pub success_count: usize,
    /// Connections whose write failed; these were evicted
    pub failure_count: usize,
}

impl BroadcastOutcome {
    pub fn new(success_count: usize, failure_count: usize) -> Self {
        Self {
            success_count,
            failure_count,
        }
    }

    pub fn attempted(&self) -> usize {
        self.success_count + self.failure_count
    }
}

/// Who an event is addressed to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationTarget {
    /// Every connection owned by one identity
    Identity(String),
    /// Every registered connection
    Broadcast,
}

impl NotificationTarget {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Identity(_) => "identity",
            Self::Broadcast => "broadcast",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_serialization() {
        let outcome = BroadcastOutcome::new(3, 1);
        assert_eq!(outcome.attempted(), 4);

        let json = serde_json::to_value(outcome).unwrap();
        assert_eq!(json["success_count"], 3);
        assert_eq!(json["failure_count"], 1);
    }

    #[test]
    fn test_target_labels() {
        assert_eq!(NotificationTarget::Identity("u1".into()).label(), "identity");
        assert_eq!(NotificationTarget::Broadcast.label(), "broadcast");
    }
}
