//! Chainforge Core -- a crafting-chain planner.
//!
//! Given a registry of production recipes (each turning a multiset of input
//! resources into a multiset of output resources, optionally over a time
//! duration) and a target output resource, this crate searches for a feasible
//! procedure tree of recipes that produces the target, compiles that tree
//! into a process-pool flow graph, and solves an integer program over the
//! graph to assign an integer repetition count to each recipe so that
//! resource flows balance.
//!
//! # Pipeline
//!
//! 1. **Register** -- structured recipe specs are normalised into
//!    [`process::AugmentedProcess`] values and named by
//!    [`context::CraftingContext::add_recipes_from_structured`].
//! 2. **Search** -- [`context::CraftingContext::find_procedures`] recurses
//!    through the registry to enumerate candidate
//!    [`context::ProcedureNode`] trees for a target resource.
//! 3. **Lower** -- [`context::CraftingContext::procedure_to_graph`] compiles
//!    a chosen tree into a [`graph::FlowGraph`] of processes connected
//!    through typed [`graph::Pool`] nodes.
//! 4. **Solve** -- [`graph::FlowGraph::build_matrix`] extracts the resource
//!    balance matrix; [`solver::best_sequence`] iterates the integer program
//!    over it, tightening the leakage bound on each successful solve.
//!
//! # Key Types
//!
//! - [`ingredients::Ingredients`] -- the free-module algebra over resource
//!   names that every quantity in this crate is expressed in.
//! - [`process::Process`] / [`process::AugmentedProcess`] -- immutable
//!   recipes and their lazy augmentation pipeline (machine tiers, speed and
//!   power-draw modifiers).
//! - [`graph::FlowGraph`] -- processes and pools wired into a flow graph,
//!   with pool coalescence, graph union, and matrix extraction.
//! - [`solver::best_sequence`] -- the leakage-tightening MILP iteration over
//!   a resource balance matrix, backed by the `highs` solver.
//! - [`context::CraftingContext`] -- the recipe registry, procedure search,
//!   and graph/procedure conversion that ties the above together.
//! - [`error::CraftError`] -- the union of every error surface in this crate.

pub mod context;
pub mod error;
pub mod graph;
pub mod ingredients;
pub mod process;
pub mod solver;
