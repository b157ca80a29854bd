//! Connection statistics

use serde::Serialize;

/// Snapshot of registry occupancy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConnectionStats {
    pub total_connections: usize,
    pub unique_identities: usize,
}
