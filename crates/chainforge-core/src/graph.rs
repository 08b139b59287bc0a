//! The process-pool flow graph: [`FlowGraph`], its [`Pool`] nodes, and matrix
//! extraction for the MILP solver loop.
//!
//! Pools reference processes by name; processes never back-reference pools.
//! There is no cyclic ownership and no generational-key indirection -- the
//! graph is a pair of insertion-ordered name -> value maps plus a flat alias
//! table for coalescence history.

use indexmap::{IndexMap, IndexSet};

use crate::process::AugmentedProcess;

#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("cannot coalesce pools of different kinds: '{0}' != '{1}'")]
    KindMismatch(String, String),
    #[error("process '{process}' has no '{kind}' {direction} to connect to pool '{pool}'")]
    KindUnavailable {
        process: String,
        kind: String,
        pool: String,
        direction: &'static str,
    },
    #[error("no unique shared kind between '{src}' outputs and '{dst}' inputs: {candidates:?}")]
    AmbiguousKind {
        src: String,
        dst: String,
        candidates: Vec<String>,
    },
    #[error("corrupt graph: {0}")]
    CorruptGraph(String),
    #[error("unknown process: {0}")]
    UnknownProcess(String),
    #[error("unknown pool: {0}")]
    UnknownPool(String),
}

/// An endpoint `(process_name, kind)` not yet hooked up to a pool.
pub type Endpoint = (String, String);

/// A typed resource buffer node connecting producers and consumers of one kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pool {
    pub name: String,
    pub kind: String,
    pub producers: Vec<String>,
    pub consumers: Vec<String>,
}

impl Pool {
    fn empty(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            producers: Vec::new(),
            consumers: Vec::new(),
        }
    }
}

/// Either side of a `connect` call: a process or a pool, identified by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EndpointKind {
    Process,
    Pool,
}

/// Processes and pools wired together into a flow graph.
///
/// A fresh name counter backs [`FlowGraph::add_process`] and
/// [`FlowGraph::add_pool`] when no explicit name is given; this crate has no
/// random-name-generator dependency (that is an external collaborator, per
/// spec), so generated names are simply `process-{n}` / `{kind}-pool-{n}`.
#[derive(Debug, Clone, Default)]
pub struct FlowGraph {
    processes: IndexMap<String, AugmentedProcess>,
    pools: IndexMap<String, Pool>,
    pool_aliases: IndexMap<String, String>,
    open_inputs: IndexSet<Endpoint>,
    open_outputs: IndexSet<Endpoint>,
    name_counter: u64,
}

impl FlowGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn processes(&self) -> &IndexMap<String, AugmentedProcess> {
        &self.processes
    }

    pub fn pools(&self) -> &IndexMap<String, Pool> {
        &self.pools
    }

    pub fn pool_aliases(&self) -> &IndexMap<String, String> {
        &self.pool_aliases
    }

    pub fn open_inputs(&self) -> &IndexSet<Endpoint> {
        &self.open_inputs
    }

    pub fn open_outputs(&self) -> &IndexSet<Endpoint> {
        &self.open_outputs
    }

    fn fresh_process_name(&mut self) -> String {
        self.name_counter += 1;
        format!("process-{}", self.name_counter)
    }

    fn fresh_pool_name(&mut self, kind: &str) -> String {
        self.name_counter += 1;
        format!("{kind}-pool-{}", self.name_counter)
    }

    /// Inserts a process, populating `open_inputs`/`open_outputs` from its
    /// nonzero declared kinds. Generates a unique name if `name` is `None`.
    pub fn add_process(
        &mut self,
        process: AugmentedProcess,
        name: Option<String>,
    ) -> Result<String, GraphError> {
        let name = name.unwrap_or_else(|| self.fresh_process_name());
        let outputs = process.outputs().map_err(|e| GraphError::CorruptGraph(e.to_string()))?;
        let inputs = process.inputs().map_err(|e| GraphError::CorruptGraph(e.to_string()))?;
        for kind in outputs.nonzero_components().keys() {
            self.open_outputs.insert((name.clone(), kind.clone()));
        }
        for kind in inputs.nonzero_components().keys() {
            self.open_inputs.insert((name.clone(), kind.clone()));
        }
        self.processes.insert(name.clone(), process);
        Ok(name)
    }

    /// Removes a process from `processes` and from every pool's
    /// producer/consumer list.
    pub fn remove_process(&mut self, name: &str) -> Result<(), GraphError> {
        if !self.processes.contains_key(name) {
            return Err(GraphError::UnknownProcess(name.to_string()));
        }
        for pool in self.pools.values_mut() {
            pool.producers.retain(|p| p != name);
            pool.consumers.retain(|p| p != name);
        }
        self.open_inputs.retain(|(p, _)| p != name);
        self.open_outputs.retain(|(p, _)| p != name);
        self.processes.shift_remove(name);
        Ok(())
    }

    /// Creates an empty pool of `kind`. Generates a unique name if omitted.
    pub fn add_pool(&mut self, kind: &str, name: Option<String>) -> String {
        let name = name.unwrap_or_else(|| self.fresh_pool_name(kind));
        self.pools.insert(name.clone(), Pool::empty(name.clone(), kind));
        name
    }

    /// Resolves `name` through `pool_aliases` transitively, so a reference
    /// taken before a coalescence still finds the surviving pool.
    pub fn resolve_pool_alias<'a>(&'a self, name: &'a str) -> &'a str {
        let mut current = name;
        while let Some(next) = self.pool_aliases.get(current) {
            if next == current {
                break;
            }
            current = next;
        }
        current
    }

    fn endpoint_kind(&self, name: &str) -> Option<EndpointKind> {
        if self.processes.contains_key(name) {
            Some(EndpointKind::Process)
        } else if self.pools.contains_key(name) {
            Some(EndpointKind::Pool)
        } else {
            None
        }
    }

    fn pools_by_kind_and_producer(&self, kind: &str, process: &str) -> Vec<String> {
        self.pools
            .values()
            .filter(|p| p.kind == kind && p.producers.iter().any(|n| n == process))
            .map(|p| p.name.clone())
            .collect()
    }

    fn pools_by_kind_and_consumer(&self, kind: &str, process: &str) -> Vec<String> {
        self.pools
            .values()
            .filter(|p| p.kind == kind && p.consumers.iter().any(|n| n == process))
            .map(|p| p.name.clone())
            .collect()
    }

    /// Links `src` as a producer into the pool named `pool`.
    fn to_pool(&mut self, pool: &str, src_process: &str) -> Result<(), GraphError> {
        let process = self
            .processes
            .get(src_process)
            .ok_or_else(|| GraphError::UnknownProcess(src_process.to_string()))?;
        let outputs = process.outputs().map_err(|e| GraphError::CorruptGraph(e.to_string()))?;
        let kind = self.pools[pool].kind.clone();
        if outputs.get(&kind) <= 0.0 {
            return Err(GraphError::KindUnavailable {
                process: src_process.to_string(),
                kind,
                pool: pool.to_string(),
                direction: "output",
            });
        }
        self.pools.get_mut(pool).unwrap().producers.push(src_process.to_string());
        self.open_outputs.shift_remove(&(src_process.to_string(), kind));
        Ok(())
    }

    /// Links `dst` as a consumer out of the pool named `pool`.
    fn from_pool(&mut self, pool: &str, dst_process: &str) -> Result<(), GraphError> {
        let process = self
            .processes
            .get(dst_process)
            .ok_or_else(|| GraphError::UnknownProcess(dst_process.to_string()))?;
        let inputs = process.inputs().map_err(|e| GraphError::CorruptGraph(e.to_string()))?;
        let kind = self.pools[pool].kind.clone();
        if inputs.get(&kind) <= 0.0 {
            return Err(GraphError::KindUnavailable {
                process: dst_process.to_string(),
                kind,
                pool: pool.to_string(),
                direction: "input",
            });
        }
        self.pools.get_mut(pool).unwrap().consumers.push(dst_process.to_string());
        self.open_inputs.shift_remove(&(dst_process.to_string(), kind));
        Ok(())
    }

    /// Coalesces two pools of the same kind into a fresh pool whose
    /// producer/consumer lists are the concatenation of both. Coalescing a
    /// pool with itself is a no-op (see DESIGN.md Open Question 1).
    pub fn coalesce_pools(&mut self, pool1: &str, pool2: &str) -> Result<String, GraphError> {
        if pool1 == pool2 {
            if !self.pools.contains_key(pool1) {
                return Err(GraphError::UnknownPool(pool1.to_string()));
            }
            return Ok(pool1.to_string());
        }
        let p1 = self.pools.get(pool1).ok_or_else(|| GraphError::UnknownPool(pool1.to_string()))?.clone();
        let p2 = self.pools.get(pool2).ok_or_else(|| GraphError::UnknownPool(pool2.to_string()))?.clone();
        if p1.kind != p2.kind {
            return Err(GraphError::KindMismatch(p1.kind, p2.kind));
        }
        let new_name = self.fresh_pool_name(&p1.kind);
        let mut merged = Pool::empty(new_name.clone(), p1.kind.clone());
        merged.producers = p1.producers.iter().chain(p2.producers.iter()).cloned().collect();
        merged.consumers = p1.consumers.iter().chain(p2.consumers.iter()).cloned().collect();
        self.pools.shift_remove(pool1);
        self.pools.shift_remove(pool2);
        self.pools.insert(new_name.clone(), merged);
        self.pool_aliases.insert(pool1.to_string(), new_name.clone());
        self.pool_aliases.insert(pool2.to_string(), new_name.clone());
        Ok(new_name)
    }

    fn connect_process_to_process(
        &mut self,
        src: &str,
        dst: &str,
        kind: Option<&str>,
    ) -> Result<String, GraphError> {
        let kind = match kind {
            Some(k) => k.to_string(),
            None => {
                let src_outputs = self
                    .processes
                    .get(src)
                    .ok_or_else(|| GraphError::UnknownProcess(src.to_string()))?
                    .outputs()
                    .map_err(|e| GraphError::CorruptGraph(e.to_string()))?;
                let dst_inputs = self
                    .processes
                    .get(dst)
                    .ok_or_else(|| GraphError::UnknownProcess(dst.to_string()))?
                    .inputs()
                    .map_err(|e| GraphError::CorruptGraph(e.to_string()))?;
                let src_kinds = src_outputs.nonzero_components();
                let dst_kinds = dst_inputs.nonzero_components();
                let candidates: Vec<String> = src_kinds
                    .keys()
                    .filter(|k| dst_kinds.contains_key(*k))
                    .cloned()
                    .collect();
                if candidates.len() != 1 {
                    return Err(GraphError::AmbiguousKind {
                        src: src.to_string(),
                        dst: dst.to_string(),
                        candidates,
                    });
                }
                candidates.into_iter().next().unwrap()
            }
        };

        let src_pools = self.pools_by_kind_and_producer(&kind, src);
        let dst_pools = self.pools_by_kind_and_consumer(&kind, dst);
        if src_pools.len() > 1 {
            return Err(GraphError::CorruptGraph(format!(
                "multiple pools for process '{src}' and kind '{kind}'"
            )));
        }
        if dst_pools.len() > 1 {
            return Err(GraphError::CorruptGraph(format!(
                "multiple pools for process '{dst}' and kind '{kind}'"
            )));
        }

        match (src_pools.first(), dst_pools.first()) {
            (None, None) => {
                let pool = self.add_pool(&kind, None);
                self.to_pool(&pool, src)?;
                self.from_pool(&pool, dst)?;
                Ok(pool)
            }
            (Some(src_pool), None) => {
                self.from_pool(src_pool, dst)?;
                Ok(src_pool.clone())
            }
            (None, Some(dst_pool)) => {
                self.to_pool(dst_pool, src)?;
                Ok(dst_pool.clone())
            }
            (Some(src_pool), Some(dst_pool)) if src_pool == dst_pool => Ok(src_pool.clone()),
            (Some(src_pool), Some(dst_pool)) => self.coalesce_pools(src_pool, dst_pool),
        }
    }

    /// Polymorphic connect over `(process | pool, process | pool)`.
    pub fn connect(&mut self, src: &str, dst: &str, kind: Option<&str>) -> Result<String, GraphError> {
        let src_kind = self
            .endpoint_kind(src)
            .ok_or_else(|| GraphError::UnknownProcess(src.to_string()))?;
        let dst_kind = self
            .endpoint_kind(dst)
            .ok_or_else(|| GraphError::UnknownProcess(dst.to_string()))?;

        match (src_kind, dst_kind) {
            (EndpointKind::Pool, EndpointKind::Pool) => self.coalesce_pools(src, dst),
            (EndpointKind::Process, EndpointKind::Pool) => {
                self.to_pool(dst, src)?;
                Ok(dst.to_string())
            }
            (EndpointKind::Pool, EndpointKind::Process) => {
                self.from_pool(src, dst)?;
                Ok(src.to_string())
            }
            (EndpointKind::Process, EndpointKind::Process) => {
                self.connect_process_to_process(src, dst, kind)
            }
        }
    }

    /// For each shared kind between `keep` and `drop`'s pools, coalesces the
    /// connecting pools; then removes `drop`.
    pub fn consolidate_processes(&mut self, keep: &str, drop: &str) -> Result<(), GraphError> {
        if !self.processes.contains_key(keep) {
            return Err(GraphError::UnknownProcess(keep.to_string()));
        }
        if !self.processes.contains_key(drop) {
            return Err(GraphError::UnknownProcess(drop.to_string()));
        }

        let keep_inputs: IndexMap<String, String> = self
            .pools
            .values()
            .filter(|p| p.consumers.iter().any(|n| n == keep))
            .map(|p| (p.kind.clone(), p.name.clone()))
            .collect();
        let keep_outputs: IndexMap<String, String> = self
            .pools
            .values()
            .filter(|p| p.producers.iter().any(|n| n == keep))
            .map(|p| (p.kind.clone(), p.name.clone()))
            .collect();
        let drop_inputs: IndexMap<String, String> = self
            .pools
            .values()
            .filter(|p| p.consumers.iter().any(|n| n == drop))
            .map(|p| (p.kind.clone(), p.name.clone()))
            .collect();
        let drop_outputs: IndexMap<String, String> = self
            .pools
            .values()
            .filter(|p| p.producers.iter().any(|n| n == drop))
            .map(|p| (p.kind.clone(), p.name.clone()))
            .collect();

        for (kind, keep_pool) in &keep_inputs {
            if let Some(drop_pool) = drop_inputs.get(kind) {
                self.coalesce_pools(keep_pool, drop_pool)?;
            }
        }
        for (kind, keep_pool) in &keep_outputs {
            if let Some(drop_pool) = drop_outputs.get(kind) {
                self.coalesce_pools(keep_pool, drop_pool)?;
            }
        }

        self.remove_process(drop)
    }

    /// Disjoint-namespace structural merge: unions processes, pools, aliases,
    /// and open endpoints. Later entries win on name collision.
    pub fn unify(&mut self, other: FlowGraph) {
        self.processes.extend(other.processes);
        self.pools.extend(other.pools);
        self.pool_aliases.extend(other.pool_aliases);
        self.open_inputs.extend(other.open_inputs);
        self.open_outputs.extend(other.open_outputs);
        self.name_counter = self.name_counter.max(other.name_counter);
    }

    /// Non-mutating union of two graphs.
    pub fn union(left: &FlowGraph, right: &FlowGraph) -> FlowGraph {
        let mut merged = left.clone();
        merged.unify(right.clone());
        merged
    }

    /// Dense rate matrix `A[pool_index][process_index]`, signed by whether
    /// the process is a producer (+) or consumer (-) of that pool's kind.
    pub fn build_matrix(&self) -> Result<DenseMatrix, GraphError> {
        self.build_generic(true)
    }

    /// Identical to [`FlowGraph::build_matrix`] but uses `transfer` rather
    /// than `transfer_rate`, so it is usable for durationless processes.
    pub fn build_batch_matrix(&self) -> Result<DenseMatrix, GraphError> {
        self.build_generic(false)
    }

    fn build_generic(&self, rate: bool) -> Result<DenseMatrix, GraphError> {
        let process_names: Vec<String> = self.processes.keys().cloned().collect();
        let pool_names: Vec<String> = self.pools.keys().cloned().collect();
        let mut matrix = Vec::with_capacity(pool_names.len());

        for pool_name in &pool_names {
            let pool = &self.pools[pool_name];
            let mut row = Vec::with_capacity(process_names.len());
            for process_name in &process_names {
                let is_producer = pool.producers.iter().any(|n| n == process_name);
                let is_consumer = pool.consumers.iter().any(|n| n == process_name);
                if is_producer || is_consumer {
                    let process = &self.processes[process_name];
                    let vector = if rate {
                        process.transfer_rate().map_err(|e| GraphError::CorruptGraph(e.to_string()))?
                    } else {
                        process.transfer().map_err(|e| GraphError::CorruptGraph(e.to_string()))?
                    };
                    row.push(vector.get(&pool.kind));
                } else {
                    row.push(0.0);
                }
            }
            matrix.push(row);
        }

        Ok(DenseMatrix { matrix, processes: process_names, pools: pool_names })
    }
}

/// A dense rate/batch matrix plus the row (pool) and column (process) labels
/// it was built against.
#[derive(Debug, Clone, PartialEq)]
pub struct DenseMatrix {
    pub matrix: Vec<Vec<f64>>,
    pub processes: Vec<String>,
    pub pools: Vec<String>,
}
