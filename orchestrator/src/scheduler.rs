use crate::graph::Dag;
use crate::retry::{RetryPolicy, UnitOutcome};
use crate::signal::{Signal, SignalVersion, TriggerTable};
use crate::unit::{UnitKind, UnitState};
use common::Error;
use futures::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{error, info};

#[derive(Debug, Clone, Serialize)]
pub struct UnitReport {
    pub name: String,
    pub kind: UnitKind,
    pub state: UnitState,
    pub runs: u32,
    pub attempts: u32,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub units: Vec<UnitReport>,
    pub signals: BTreeMap<Signal, SignalVersion>,
}

impl RunReport {
    /// No unit ended the run in the failed state.
    pub fn success(&self) -> bool {
        self.units.iter().all(|unit| unit.state != UnitState::Failed)
    }

    pub fn failed(&self) -> impl Iterator<Item = &UnitReport> {
        self.units
            .iter()
            .filter(|unit| unit.state == UnitState::Failed)
    }

    pub fn unit(&self, name: &str) -> Option<&UnitReport> {
        self.units.iter().find(|unit| unit.name == name)
    }
}

/// Dispatches runnable units to a bounded pool of tokio tasks and republishes
/// signals as units succeed.
pub struct Scheduler {
    dag: Dag,
    policy: RetryPolicy,
    workers: usize,
    table: TriggerTable,
}

impl Scheduler {
    pub fn new(dag: Dag, policy: RetryPolicy, workers: usize) -> Self {
        Self {
            dag,
            policy,
            workers: workers.max(1),
            table: TriggerTable::new(),
        }
    }

    /// Resumes from a trigger table persisted by an earlier run.
    pub fn with_table(mut self, table: TriggerTable) -> Self {
        self.table = table;
        self
    }

    pub fn dag(&self) -> &Dag {
        &self.dag
    }

    pub fn table(&self) -> &TriggerTable {
        &self.table
    }

    /// Runs until no unit is running and none is runnable.
    ///
    /// A failed unit stays failed for the rest of the run; units downstream of
    /// it simply never see their inputs refreshed.
    pub async fn run(&mut self) -> RunReport {
        let units = self.dag.units().to_vec();
        let count = units.len();

        let mut states = vec![UnitState::Waiting; count];
        let mut runs = vec![0u32; count];
        let mut attempts = vec![0u32; count];
        let mut errors: Vec<Option<String>> = vec![None; count];
        let mut roots_pending: Vec<bool> = units.iter().map(|u| u.spec().is_root()).collect();
        let mut snapshots: HashMap<usize, BTreeMap<Signal, u64>> = HashMap::new();
        let mut in_flight = FuturesUnordered::new();

        loop {
            for &idx in self.dag.order() {
                if matches!(states[idx], UnitState::Running | UnitState::Failed) {
                    continue;
                }
                let spec = units[idx].spec();
                let ready = if spec.is_root() {
                    roots_pending[idx]
                } else {
                    self.table.is_runnable(&spec.name, &spec.consumes)
                };
                if ready {
                    states[idx] = UnitState::Runnable;
                }
            }

            for &idx in self.dag.order() {
                if in_flight.len() >= self.workers {
                    break;
                }
                if states[idx] != UnitState::Runnable {
                    continue;
                }

                let unit = Arc::clone(&units[idx]);
                let spec = unit.spec();
                info!(unit = %spec.name, kind = %spec.kind, "Dispatching unit");

                states[idx] = UnitState::Running;
                roots_pending[idx] = false;
                snapshots.insert(idx, self.table.snapshot(&spec.consumes));

                let policy = self.policy;
                let handle = tokio::spawn(async move { policy.execute(&*unit).await });
                in_flight.push(async move { (idx, handle.await) });
            }

            let Some((idx, joined)) = in_flight.next().await else {
                break;
            };

            let outcome = joined.unwrap_or_else(|e| UnitOutcome {
                attempts: 1,
                result: Err(Error::Other(format!("unit task aborted: {}", e))),
            });

            let spec = units[idx].spec();
            runs[idx] += 1;
            attempts[idx] += outcome.attempts;

            match outcome.result {
                Ok(()) => {
                    states[idx] = UnitState::Succeeded;
                    errors[idx] = None;
                    if let Some(snapshot) = snapshots.remove(&idx) {
                        self.table.mark_observed(&spec.name, snapshot);
                    }
                    for signal in &spec.produces {
                        let version = self.table.publish(signal);
                        info!(
                            unit = %spec.name,
                            signal = %signal,
                            version = version.version,
                            "Signal published"
                        );
                    }
                }
                Err(e) => {
                    error!(
                        unit = %spec.name,
                        attempts = outcome.attempts,
                        error = %e,
                        "Unit failed terminally"
                    );
                    states[idx] = UnitState::Failed;
                    errors[idx] = Some(e.to_string());
                    snapshots.remove(&idx);
                }
            }
        }

        let reports = units
            .iter()
            .enumerate()
            .map(|(idx, unit)| UnitReport {
                name: unit.name().to_string(),
                kind: unit.spec().kind,
                state: states[idx],
                runs: runs[idx],
                attempts: attempts[idx],
                error: errors[idx].clone(),
            })
            .collect();

        RunReport {
            units: reports,
            signals: self
                .table
                .signals()
                .map(|(signal, version)| (signal.clone(), *version))
                .collect(),
        }
    }
}
