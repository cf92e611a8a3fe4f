use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{AggregateId, Version};

/// Serialized aggregate state at a given stream version.
///
/// Loading starts from the latest snapshot and replays only the events after
/// it, which keeps long-lived cart streams cheap to rebuild.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,
    pub version: Version,
    pub timestamp: DateTime<Utc>,
    pub state: serde_json::Value,
}

impl Snapshot {
    pub fn from_state<T: Serialize>(
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        version: Version,
        state: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            aggregate_id,
            aggregate_type: aggregate_type.into(),
            version,
            timestamp: Utc::now(),
            state: serde_json::to_value(state)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct CartState {
        lines: usize,
    }

    #[test]
    fn state_round_trips_through_snapshot() {
        let snapshot = Snapshot::from_state(
            AggregateId::new(),
            "Cart",
            Version::new(50),
            &CartState { lines: 3 },
        )
        .unwrap();

        assert_eq!(snapshot.aggregate_type, "Cart");
        let state: CartState = serde_json::from_value(snapshot.state).unwrap();
        assert_eq!(state, CartState { lines: 3 });
    }
}
