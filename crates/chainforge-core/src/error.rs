//! Per-surface error types, aggregated into [`CraftError`] for callers that
//! want one return type across the public API.

use crate::graph::GraphError;
use crate::ingredients::IngredientsError;
use crate::process::ProcessError;
use crate::solver::SolverError;

/// Recipe registry / procedure search failures raised by [`crate::context::CraftingContext`].
#[derive(Debug, thiserror::Error)]
pub enum ProcedureError {
    #[error("no procedure found producing '{0}'")]
    NoProcedure(String),
    #[error(
        "more than {limit} procedures for '{target}' before exhaustion (recipe histogram: {histogram:?})"
    )]
    ResultsetTooLarge {
        target: String,
        limit: usize,
        histogram: Vec<(String, usize)>,
    },
    #[error("graph '{0}' does not have exactly one open output")]
    MultipleOpenOutputs(String),
    #[error("unknown recipe: {0}")]
    UnknownRecipe(String),
    #[error("unknown graph: {0}")]
    UnknownGraph(String),
    #[error("unknown augment primitive: {0}")]
    UnknownAugmentPrimitive(String),
    #[error(transparent)]
    Ingredients(#[from] IngredientsError),
    #[error(transparent)]
    Process(#[from] ProcessError),
    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// The union of every error surface in this crate.
#[derive(Debug, thiserror::Error)]
pub enum CraftError {
    #[error(transparent)]
    Ingredients(#[from] IngredientsError),
    #[error(transparent)]
    Process(#[from] ProcessError),
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Procedure(#[from] ProcedureError),
    #[error(transparent)]
    Solver(#[from] SolverError),
}
