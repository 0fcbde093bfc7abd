//! Profile parsing into a loop-nesting graph.
//!
//! Two collaborator files feed the graph: a flat CSV profile (one row per
//! profiled entity, header id 0 meaning "whole function") and a graph
//! profile whose row i lists, per column j, the time share entity i spends
//! inside entity j. Non-numeric cells mean "not observed".

use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

pub type LoopId = usize;

/// A profiled loop. Immutable once the graph is built.
#[derive(Debug, Clone, Serialize)]
pub struct Loop {
    pub id: LoopId,
    /// Function the loop lives in.
    pub function: String,
    /// Profiler id of the loop's entry block; never 0 here.
    pub header_id: u32,
    /// Relative share of total time, 0-100.
    pub time_pct: f64,
    /// Observed invocation count.
    pub runs: u64,
    /// Ids of loops invoked from within this one. May form cycles.
    pub nested: Vec<LoopId>,
}

/// Mapping from loop id to loop, plus a per-function index.
#[derive(Debug, Default)]
pub struct LoopGraph {
    loops: BTreeMap<LoopId, Loop>,
    by_function: HashMap<String, Vec<LoopId>>,
}

impl LoopGraph {
    /// Build a graph from in-memory loops, dropping nested references to
    /// ids that are not in the set. After this, no reference dangles.
    pub fn from_loops(loops: impl IntoIterator<Item = Loop>) -> Self {
        let mut map: BTreeMap<LoopId, Loop> = loops
            .into_iter()
            .map(|l| (l.id, l))
            .collect();

        let known: Vec<LoopId> = map.keys().copied().collect();
        for l in map.values_mut() {
            l.nested.retain(|id| known.binary_search(id).is_ok());
        }

        let mut by_function: HashMap<String, Vec<LoopId>> = HashMap::new();
        for l in map.values() {
            by_function.entry(l.function.clone()).or_default().push(l.id);
        }

        Self {
            loops: map,
            by_function,
        }
    }

    /// Parse the flat and graph profile files.
    pub fn from_files(flat_profile: &Path, graph_profile: &Path) -> Result<Self> {
        let flat = fs::read_to_string(flat_profile)
            .with_context(|| format!("reading flat profile {}", flat_profile.display()))?;
        let graph = fs::read_to_string(graph_profile)
            .with_context(|| format!("reading graph profile {}", graph_profile.display()))?;
        Self::parse(&flat, &graph)
    }

    /// Parse profile text. Row order assigns loop ids: the i-th data row of
    /// the flat profile and the i-th row of the graph profile describe the
    /// same entity.
    pub fn parse(flat_profile: &str, graph_profile: &str) -> Result<Self> {
        let mut rows = flat_profile.lines();
        let header = rows.next().context("flat profile is empty")?;
        let columns = FlatColumns::from_header(header)?;

        let mut loops = Vec::new();
        for (id, row) in rows.filter(|row| !row.trim().is_empty()).enumerate() {
            if let Some(l) = columns.parse_row(id, row)? {
                loops.push(l);
            }
        }

        let mut graph = Self::from_loops(loops);
        graph.read_nesting(graph_profile);
        tracing::debug!(loops = graph.len(), "parsed loop profile");
        Ok(graph)
    }

    /// Fill in nesting edges from the graph profile. Cells that are not
    /// positive numbers, or that reference unknown loops, are ignored.
    fn read_nesting(&mut self, graph_profile: &str) {
        let known: Vec<LoopId> = self.loops.keys().copied().collect();
        for (id, row) in graph_profile.lines().enumerate() {
            if !self.loops.contains_key(&id) {
                continue;
            }
            let mut nested = Vec::new();
            for (callee, cell) in row.split_whitespace().enumerate() {
                if callee == id || known.binary_search(&callee).is_err() {
                    continue;
                }
                match cell.parse::<f64>() {
                    Ok(share) if share > 0.0 => nested.push(callee),
                    _ => {}
                }
            }
            if let Some(l) = self.loops.get_mut(&id) {
                l.nested = nested;
            }
        }
    }

    pub fn get(&self, id: LoopId) -> Option<&Loop> {
        self.loops.get(&id)
    }

    pub fn ids(&self) -> impl Iterator<Item = LoopId> + '_ {
        self.loops.keys().copied()
    }

    pub fn loops(&self) -> impl Iterator<Item = &Loop> {
        self.loops.values()
    }

    pub fn loops_in(&self, function: &str) -> &[LoopId] {
        self.by_function
            .get(function)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.loops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loops.is_empty()
    }
}

/// Column indices resolved from the flat profile's header row.
struct FlatColumns {
    function: usize,
    header_id: usize,
    time_pct: usize,
    runs: usize,
}

impl FlatColumns {
    fn from_header(header: &str) -> Result<Self> {
        let names: Vec<&str> = header.split(',').map(str::trim).collect();
        let find = |name: &str| {
            names
                .iter()
                .position(|n| *n == name)
                .with_context(|| format!("flat profile is missing column {name:?}"))
        };
        Ok(Self {
            function: find("function")?,
            header_id: find("header-id")?,
            time_pct: find("time(pct)")?,
            runs: find("runs")?,
        })
    }

    /// Parse one data row. Whole-function rows (header id 0) and loops
    /// with no recorded time yield `None` but still consume their id.
    fn parse_row(&self, id: LoopId, row: &str) -> Result<Option<Loop>> {
        let cells: Vec<&str> = row.split(',').map(str::trim).collect();
        let cell = |idx: usize| {
            cells
                .get(idx)
                .copied()
                .with_context(|| format!("flat profile row {id} is too short: {row:?}"))
        };

        let header_id: u32 = cell(self.header_id)?
            .parse()
            .with_context(|| format!("bad header id in row {id}"))?;
        if header_id == 0 {
            return Ok(None);
        }

        let time_pct: f64 = cell(self.time_pct)?
            .parse()
            .with_context(|| format!("bad time share in row {id}"))?;
        if !(0.0..=100.0).contains(&time_pct) {
            bail!("time share {time_pct} out of range in row {id}");
        }
        if time_pct <= 0.0 {
            return Ok(None);
        }

        Ok(Some(Loop {
            id,
            function: cell(self.function)?.to_string(),
            header_id,
            time_pct,
            runs: cell(self.runs)?
                .parse()
                .with_context(|| format!("bad run count in row {id}"))?,
            nested: Vec::new(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FLAT: &str = "\
function,header-id,time(pct),runs
main,0,95.0,1
compute,3,40.0,120
compute,5,15.0,4000
idle,2,0.0,7
";

    const GRAPH: &str = "\
nan 0.0 nan nan
nan nan 15.0 nan
nan nan nan nan
nan nan nan nan
";

    #[test]
    fn test_parse_skips_functions_and_dead_loops() {
        let graph = LoopGraph::parse(FLAT, GRAPH).unwrap();
        // row 0 is a whole function, row 3 has no recorded time
        assert_eq!(graph.len(), 2);
        assert_eq!(graph.get(1).unwrap().function, "compute");
        assert_eq!(graph.get(2).unwrap().header_id, 5);
    }

    #[test]
    fn test_parse_nesting_edges() {
        let graph = LoopGraph::parse(FLAT, GRAPH).unwrap();
        assert_eq!(graph.get(1).unwrap().nested, vec![2]);
        assert!(graph.get(2).unwrap().nested.is_empty());
    }

    #[test]
    fn test_dangling_nested_references_dropped() {
        let graph = LoopGraph::from_loops([Loop {
            id: 0,
            function: "f".into(),
            header_id: 1,
            time_pct: 20.0,
            runs: 3,
            nested: vec![0, 7, 99],
        }]);
        assert_eq!(graph.get(0).unwrap().nested, vec![0]);
    }

    #[test]
    fn test_missing_column_is_fatal() {
        assert!(LoopGraph::parse("function,runs\nf,3\n", "").is_err());
    }

    #[test]
    fn test_loops_by_function() {
        let graph = LoopGraph::parse(FLAT, GRAPH).unwrap();
        assert_eq!(graph.loops_in("compute"), &[1, 2]);
        assert!(graph.loops_in("absent").is_empty());
    }
}
