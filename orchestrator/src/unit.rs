use crate::signal::Signal;
use async_trait::async_trait;
use common::Result;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    Provision,
    Fetch,
    Load,
    Aggregate,
    Export,
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UnitKind::Provision => "provision",
            UnitKind::Fetch => "fetch",
            UnitKind::Load => "load",
            UnitKind::Aggregate => "aggregate",
            UnitKind::Export => "export",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitState {
    Waiting,
    Runnable,
    Running,
    Succeeded,
    Failed,
}

/// Static description of a unit: its name and its place in the graph.
#[derive(Debug, Clone, Serialize)]
pub struct UnitSpec {
    pub name: String,
    pub kind: UnitKind,
    pub consumes: Vec<Signal>,
    pub produces: Vec<Signal>,
}

impl UnitSpec {
    pub fn new(name: &str, kind: UnitKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            consumes: Vec::new(),
            produces: Vec::new(),
        }
    }

    pub fn consumes(mut self, signals: &[&str]) -> Self {
        self.consumes = signals.iter().map(|s| Signal::new(*s)).collect();
        self
    }

    pub fn produces(mut self, signals: &[&str]) -> Self {
        self.produces = signals.iter().map(|s| Signal::new(*s)).collect();
        self
    }

    pub fn is_root(&self) -> bool {
        self.consumes.is_empty()
    }
}

/// One schedulable task. `run` is an opaque blocking step from the
/// scheduler's point of view.
#[async_trait]
pub trait Unit: Send + Sync {
    fn spec(&self) -> &UnitSpec;

    async fn run(&self) -> Result<()>;

    fn name(&self) -> &str {
        &self.spec().name
    }
}
