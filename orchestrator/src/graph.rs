use crate::signal::Signal;
use crate::unit::Unit;
use common::{Error, Result};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Arc;

/// A validated set of units wired together by signals.
pub struct Dag {
    units: Vec<Arc<dyn Unit>>,
    order: Vec<usize>,
}

impl Dag {
    pub fn new(units: Vec<Arc<dyn Unit>>) -> Result<Self> {
        let mut names = HashSet::new();
        for unit in &units {
            if !names.insert(unit.name().to_string()) {
                return Err(Error::InvalidGraph(format!(
                    "unit '{}' is declared twice",
                    unit.name()
                )));
            }
        }

        let mut producers: HashMap<&Signal, Vec<usize>> = HashMap::new();
        for (idx, unit) in units.iter().enumerate() {
            for signal in &unit.spec().produces {
                producers.entry(signal).or_default().push(idx);
            }
        }

        for unit in &units {
            for signal in &unit.spec().consumes {
                if !producers.contains_key(signal) {
                    return Err(Error::InvalidGraph(format!(
                        "unit '{}' consumes '{}' which no unit produces",
                        unit.name(),
                        signal
                    )));
                }
            }
        }

        let order = topological_order(&units, &producers)?;
        Ok(Self { units, order })
    }

    pub fn units(&self) -> &[Arc<dyn Unit>] {
        &self.units
    }

    /// Unit indices such that every producer precedes its consumers.
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    pub fn topological_order(&self) -> impl Iterator<Item = &Arc<dyn Unit>> {
        self.order.iter().map(|&idx| &self.units[idx])
    }

}

// Kahn's algorithm over the unit graph; an edge runs from a producer to every
// consumer of one of its signals.
fn topological_order(
    units: &[Arc<dyn Unit>],
    producers: &HashMap<&Signal, Vec<usize>>,
) -> Result<Vec<usize>> {
    let mut indegree = vec![0usize; units.len()];
    let mut edges: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); units.len()];

    for (consumer, unit) in units.iter().enumerate() {
        for signal in &unit.spec().consumes {
            for &producer in producers.get(signal).into_iter().flatten() {
                if edges[producer].insert(consumer) {
                    indegree[consumer] += 1;
                }
            }
        }
    }

    let mut ready: VecDeque<usize> = (0..units.len()).filter(|&i| indegree[i] == 0).collect();
    let mut order = Vec::with_capacity(units.len());

    while let Some(idx) = ready.pop_front() {
        order.push(idx);
        for &next in &edges[idx] {
            indegree[next] -= 1;
            if indegree[next] == 0 {
                ready.push_back(next);
            }
        }
    }

    if order.len() != units.len() {
        let stuck: Vec<&str> = (0..units.len())
            .filter(|i| !order.contains(i))
            .map(|i| units[i].name())
            .collect();
        return Err(Error::InvalidGraph(format!(
            "signal cycle between units: {}",
            stuck.join(", ")
        )));
    }

    Ok(order)
}
