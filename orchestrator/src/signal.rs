use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Name of a data-availability marker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Signal(String);

impl Signal {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Signal {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalVersion {
    pub version: u64,
    pub produced_at: DateTime<Utc>,
}

/// Last produced version of every signal, plus the versions each unit saw
/// when it last succeeded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TriggerTable {
    clock: u64,
    versions: BTreeMap<Signal, SignalVersion>,
    observed: BTreeMap<String, BTreeMap<Signal, u64>>,
}

impl TriggerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a new version of `signal`. Versions grow across all signals.
    pub fn publish(&mut self, signal: &Signal) -> SignalVersion {
        self.clock += 1;
        let version = SignalVersion {
            version: self.clock,
            produced_at: Utc::now(),
        };
        self.versions.insert(signal.clone(), version);
        version
    }

    pub fn version(&self, signal: &Signal) -> Option<SignalVersion> {
        self.versions.get(signal).copied()
    }

    pub fn observed(&self, unit: &str, signal: &Signal) -> u64 {
        self.observed
            .get(unit)
            .and_then(|seen| seen.get(signal))
            .copied()
            .unwrap_or(0)
    }

    /// True when every consumed signal has been produced since `unit` last
    /// observed it. A unit with no inputs is never signal-ready.
    pub fn is_runnable(&self, unit: &str, consumes: &[Signal]) -> bool {
        !consumes.is_empty()
            && consumes.iter().all(|signal| match self.version(signal) {
                Some(current) => current.version > self.observed(unit, signal),
                None => false,
            })
    }

    /// Current versions of `consumes`, taken when a unit is dispatched.
    pub fn snapshot(&self, consumes: &[Signal]) -> BTreeMap<Signal, u64> {
        consumes
            .iter()
            .filter_map(|signal| self.version(signal).map(|v| (signal.clone(), v.version)))
            .collect()
    }

    pub fn mark_observed(&mut self, unit: &str, snapshot: BTreeMap<Signal, u64>) {
        let seen = self.observed.entry(unit.to_string()).or_default();
        for (signal, version) in snapshot {
            seen.insert(signal, version);
        }
    }

    pub fn signals(&self) -> impl Iterator<Item = (&Signal, &SignalVersion)> {
        self.versions.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig(name: &str) -> Signal {
        Signal::new(name)
    }

    #[test]
    fn test_versions_are_monotonic() {
        let mut table = TriggerTable::new();
        let a = table.publish(&sig("x"));
        let b = table.publish(&sig("y"));
        let c = table.publish(&sig("x"));

        assert!(a.version < b.version && b.version < c.version);
        assert_eq!(table.version(&sig("x")).unwrap().version, c.version);
    }

    #[test]
    fn test_conjunctive_trigger_needs_every_input() {
        let consumes = [sig("x"), sig("y")];
        let mut table = TriggerTable::new();

        assert!(!table.is_runnable("report", &consumes));

        table.publish(&sig("x"));
        assert!(!table.is_runnable("report", &consumes));

        table.publish(&sig("y"));
        assert!(table.is_runnable("report", &consumes));
    }

    #[test]
    fn test_one_fresh_input_after_success_is_not_enough() {
        let consumes = [sig("x"), sig("y")];
        let mut table = TriggerTable::new();
        table.publish(&sig("x"));
        table.publish(&sig("y"));

        let snapshot = table.snapshot(&consumes);
        table.mark_observed("report", snapshot);
        assert!(!table.is_runnable("report", &consumes));

        table.publish(&sig("x"));
        table.publish(&sig("x"));
        assert!(!table.is_runnable("report", &consumes));

        table.publish(&sig("y"));
        assert!(table.is_runnable("report", &consumes));
    }

    #[test]
    fn test_observation_is_per_unit() {
        let consumes = [sig("x")];
        let mut table = TriggerTable::new();
        table.publish(&sig("x"));
        table.mark_observed("a", table.snapshot(&consumes));

        assert!(!table.is_runnable("a", &consumes));
        assert!(table.is_runnable("b", &consumes));
    }

    #[test]
    fn test_roots_are_never_signal_ready() {
        let table = TriggerTable::new();
        assert!(!table.is_runnable("root", &[]));
    }

    #[test]
    fn test_table_survives_json() {
        let mut table = TriggerTable::new();
        table.publish(&sig("x"));
        table.mark_observed("a", table.snapshot(&[sig("x")]));

        let json = serde_json::to_string(&table).unwrap();
        let restored: TriggerTable = serde_json::from_str(&json).unwrap();

        assert_eq!(restored, table);
        let mut restored = restored;
        assert_eq!(restored.publish(&sig("y")).version, 2);
    }
}
