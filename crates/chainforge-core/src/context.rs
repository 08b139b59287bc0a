//! [`CraftingContext`]: the recipe registry, procedure-tree enumerator, and
//! graph <-> procedure conversion that orchestrates components A-D.

use indexmap::IndexMap;

use crate::error::ProcedureError;
use crate::graph::{FlowGraph, GraphError};
use crate::ingredients::Ingredients;
use crate::process::{Augment, AugmentedProcess, Process};
use crate::solver::{best_sequence, LeakageSolution, SolverConfig, SolverError};

/// A structured, language-agnostic recipe record (the contractual external
/// interface; text parsing into this shape is out of scope for this crate).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RecipeSpec {
    pub outputs: String,
    #[serde(default)]
    pub inputs: Option<String>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub process: Option<String>,
}

/// A structured augment record: a name plus an ordered list of
/// `(primitive_name, argument)` pairs.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct AugmentSpec {
    pub name: String,
    pub augments: Vec<(String, AugmentArg)>,
}

/// The argument half of an `(primitive_name, argument)` pair: a scalar for
/// the multiplicative primitives, an Ingredients expression for the additive
/// ones.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum AugmentArg {
    Scalar(f64),
    Ingredients(String),
    EnergyPct { kind: String, percent: f64 },
}

/// Decodes a single `(primitive_name, argument)` pair into an [`Augment`].
/// `add_input_rate` is deliberately rejected rather than aliased to
/// `add_input`: a rate and a per-batch quantity are different units, and
/// silently accepting one for the other would corrupt the transfer-rate
/// computation (see Open Question 4 in DESIGN.md).
fn decode_augment(primitive: &str, arg: &AugmentArg) -> Result<Augment, ProcedureError> {
    let scalar = || match arg {
        AugmentArg::Scalar(k) => Ok(*k),
        _ => Err(ProcedureError::UnknownAugmentPrimitive(format!("{primitive} expects a scalar"))),
    };
    let ingredients = || match arg {
        AugmentArg::Ingredients(s) => Ok(Ingredients::parse(s)?),
        _ => Err(ProcedureError::UnknownAugmentPrimitive(format!("{primitive} expects an ingredients expression"))),
    };

    match primitive {
        "mul_duration" => Ok(Augment::MulDuration(scalar()?)),
        "mul_speed" => Ok(Augment::MulSpeed(scalar()?)),
        "mul_inputs" => Ok(Augment::MulInputs(scalar()?)),
        "mul_outputs" => Ok(Augment::MulOutputs(scalar()?)),
        "add_input" => Ok(Augment::AddInput(ingredients()?)),
        "add_output" => Ok(Augment::AddOutput(ingredients()?)),
        "increase_energy_pct" => match arg {
            AugmentArg::EnergyPct { kind, percent } => {
                Ok(Augment::IncreaseEnergyPct { kind: kind.clone(), percent: *percent })
            }
            _ => Err(ProcedureError::UnknownAugmentPrimitive(format!(
                "{primitive} expects a kind/percent pair"
            ))),
        },
        other => Err(ProcedureError::UnknownAugmentPrimitive(other.to_string())),
    }
}

/// Decodes every `(primitive, argument)` pair in `spec`, in order, into a
/// single [`Augment::Composed`].
pub fn decode_augment_spec(spec: &AugmentSpec) -> Result<Augment, ProcedureError> {
    let decoded = spec
        .augments
        .iter()
        .map(|(primitive, arg)| decode_augment(primitive, arg))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Augment::Composed(decoded))
}

/// Bounds on procedure-tree enumeration: how many results to materialise
/// before giving up.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchConfig {
    pub limit: usize,
    pub hard_limit: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self { limit: 64, hard_limit: 4096 }
    }
}

/// A node in a procedure tree: the recipe chosen for a resource (if any) and
/// the sub-procedures for its declared inputs. An absent `recipe` with empty
/// `inputs` denotes an unresolved terminal.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcedureNode {
    pub resource: String,
    pub recipe: Option<String>,
    pub inputs: IndexMap<String, ProcedureNode>,
}

impl ProcedureNode {
    fn terminal(resource: impl Into<String>) -> Self {
        Self { resource: resource.into(), recipe: None, inputs: IndexMap::new() }
    }

    pub fn is_terminal(&self) -> bool {
        self.recipe.is_none()
    }
}

/// A predicate over a registered recipe, used to bound procedure enumeration.
pub type RecipePredicate<'a> = dyn Fn(&str, &AugmentedProcess) -> bool + 'a;

/// A re-annotated MILP solution: per-process human-readable counts plus the
/// leakage epsilon used to find it.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotatedSolution {
    pub epsilon: f64,
    pub counts: Vec<(String, i64)>,
    pub residual: Ingredients,
}

/// Recipe registry, named graphs, and the procedure search/lowering logic
/// tying components A-D together. The sole mutable state container in this
/// crate; not safe for concurrent mutation.
#[derive(Debug, Default)]
pub struct CraftingContext {
    recipes: IndexMap<String, AugmentedProcess>,
    graphs: IndexMap<String, FlowGraph>,
    name_counter: u64,
}

impl CraftingContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recipes(&self) -> &IndexMap<String, AugmentedProcess> {
        &self.recipes
    }

    pub fn graphs(&self) -> &IndexMap<String, FlowGraph> {
        &self.graphs
    }

    pub fn get_graph(&self, name: &str) -> Result<&FlowGraph, ProcedureError> {
        self.graphs.get(name).ok_or_else(|| ProcedureError::UnknownGraph(name.to_string()))
    }

    fn get_graph_mut(&mut self, name: &str) -> &mut FlowGraph {
        self.graphs.entry(name.to_string()).or_default()
    }

    pub fn get_recipe(&self, name: &str) -> Result<&AugmentedProcess, ProcedureError> {
        self.recipes.get(name).ok_or_else(|| ProcedureError::UnknownRecipe(name.to_string()))
    }

    /// Generates a recipe name from its output kinds and process tag, with an
    /// integer disambiguator on collision: `"a + b via kind"`, `"a + b via
    /// kind 2"`, ...
    fn name_recipe(&self, process: &Process) -> String {
        let outputs = process
            .outputs
            .nonzero_components()
            .keys()
            .cloned()
            .collect::<Vec<_>>()
            .join(" + ");
        let base = match &process.process {
            Some(tag) => format!("{outputs} via {tag}"),
            None => outputs,
        };
        if !self.recipes.contains_key(&base) {
            return base;
        }
        let mut n = 2;
        loop {
            let candidate = format!("{base} {n}");
            if !self.recipes.contains_key(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }

    fn parse_recipe_spec(spec: &RecipeSpec) -> Result<Process, ProcedureError> {
        let outputs = Ingredients::parse(&spec.outputs)?;
        let inputs = match &spec.inputs {
            Some(s) => Ingredients::parse(s)?,
            None => Ingredients::zero(),
        };
        let mut process = Process::new(outputs, inputs);
        if let Some(d) = spec.duration {
            process = process.with_duration(d);
        }
        if let Some(tag) = &spec.process {
            process = process.with_tag(tag.clone());
        }
        Ok(process)
    }

    /// Normalises structured recipe specs into `AugmentedProcess` with an
    /// empty augment list, names them, and registers them. Returns the
    /// assigned names in input order.
    pub fn add_recipes_from_structured(
        &mut self,
        specs: &[RecipeSpec],
    ) -> Result<Vec<String>, ProcedureError> {
        let mut names = Vec::with_capacity(specs.len());
        for spec in specs {
            let process = Self::parse_recipe_spec(spec)?;
            let name = self.name_recipe(&process);
            self.recipes.insert(name.clone(), AugmentedProcess::from_process(process));
            names.push(name);
        }
        Ok(names)
    }

    /// Appends `augment` to the named recipe. If `new_tag` is given, the
    /// base process's tag is overwritten before the augment list is
    /// re-attached, so the effective process's `process_tag()` reads as
    /// `new_tag` rather than the original recipe's tag. If `replace`, the
    /// result supersedes the original name; otherwise it is registered under
    /// a freshly generated name.
    pub fn apply_augment_to_recipe(
        &mut self,
        recipe_name: &str,
        augment: Augment,
        new_tag: Option<&str>,
        replace: bool,
    ) -> Result<String, ProcedureError> {
        let existing = self.get_recipe(recipe_name)?.clone();
        let mut updated = existing.with_augment(augment);
        if let Some(tag) = new_tag {
            let mut base = updated.base().clone();
            base.process = Some(tag.to_string());
            updated = AugmentedProcess::new(base, updated.augments().to_vec());
        }
        let name = if replace {
            recipe_name.to_string()
        } else {
            self.name_counter += 1;
            format!("{recipe_name}~{}", self.name_counter)
        };
        self.recipes.insert(name.clone(), updated);
        Ok(name)
    }

    /// Recipes whose outputs include `resource`, in registry insertion order.
    pub fn find_recipe_producing(&self, resource: &str) -> IndexMap<String, AugmentedProcess> {
        self.recipes
            .iter()
            .filter(|(_, r)| r.outputs().map(|o| o.get(resource) > 0.0).unwrap_or(false))
            .map(|(n, r)| (n.clone(), r.clone()))
            .collect()
    }

    /// Recipes whose inputs include `resource`, in registry insertion order.
    pub fn find_recipe_consuming(&self, resource: &str) -> IndexMap<String, AugmentedProcess> {
        self.recipes
            .iter()
            .filter(|(_, r)| r.inputs().map(|i| i.get(resource) > 0.0).unwrap_or(false))
            .map(|(n, r)| (n.clone(), r.clone()))
            .collect()
    }

    /// Recipes whose effective process tag equals `kind`.
    pub fn find_recipe_using(&self, kind: &str) -> IndexMap<String, AugmentedProcess> {
        self.recipes
            .iter()
            .filter(|(_, r)| r.process_tag().ok().flatten().as_deref() == Some(kind))
            .map(|(n, r)| (n.clone(), r.clone()))
            .collect()
    }

    /// Enumerates candidate procedure trees for `target`, lazily: for each
    /// recipe producing `target` (in registry order), unless `stop_pred`
    /// holds (short-circuits the whole enumeration for this target) or
    /// `skip_pred` holds (skips just that recipe), recurse on each distinct
    /// input kind and take the Cartesian product of the sub-results.
    ///
    /// `stop_pred`/`skip_pred` are evaluated per producer up front (cheap
    /// predicate calls, no subtree construction), but the Cartesian-product
    /// explosion itself is built out of nested iterator combinators and only
    /// materialised as far as the caller actually pulls. This is what makes
    /// `find_procedures`'s `hard_limit` a real bound on work done rather
    /// than a `take` applied after the fact to an already-built `Vec`.
    pub fn iterate_possible_procedures<'a>(
        &'a self,
        target: &str,
        stop_pred: &'a RecipePredicate<'a>,
        skip_pred: &'a RecipePredicate<'a>,
    ) -> Box<dyn Iterator<Item = ProcedureNode> + 'a> {
        let _span = tracing::debug_span!("iterate_possible_procedures", target).entered();
        let producers = self.find_recipe_producing(target);
        if producers.is_empty() {
            tracing::trace!(target, "no producing recipe, emitting terminal");
            return Box::new(std::iter::once(ProcedureNode::terminal(target)));
        }

        let mut survivors: Vec<(String, AugmentedProcess)> = Vec::new();
        for (name, recipe) in producers {
            if stop_pred(&name, &recipe) {
                tracing::trace!(target, recipe = name.as_str(), "stop_pred short-circuited enumeration");
                return Box::new(std::iter::once(ProcedureNode::terminal(target)));
            }
            if skip_pred(&name, &recipe) {
                tracing::trace!(target, recipe = name.as_str(), "skip_pred skipped recipe");
                continue;
            }
            survivors.push((name, recipe));
        }

        let target = target.to_string();
        Box::new(survivors.into_iter().flat_map(move |(name, recipe)| {
            let input_kinds: Vec<String> = recipe
                .inputs()
                .map(|i| i.nonzero_components().keys().cloned().collect())
                .unwrap_or_default();
            self.procedure_combinations(target.clone(), name, input_kinds, stop_pred, skip_pred)
        }))
    }

    /// Lazily builds the Cartesian product of sub-procedures across a
    /// recipe's declared input kinds, wrapping each combination into a
    /// `ProcedureNode` for `target` under `name`. Each stage recurses into
    /// [`CraftingContext::iterate_possible_procedures`] only as the caller
    /// pulls the previous stage's combinations, not up front.
    fn procedure_combinations<'a>(
        &'a self,
        target: String,
        name: String,
        input_kinds: Vec<String>,
        stop_pred: &'a RecipePredicate<'a>,
        skip_pred: &'a RecipePredicate<'a>,
    ) -> Box<dyn Iterator<Item = ProcedureNode> + 'a> {
        let seed: Box<dyn Iterator<Item = IndexMap<String, ProcedureNode>> + 'a> =
            Box::new(std::iter::once(IndexMap::new()));

        let combos = input_kinds.into_iter().fold(seed, |acc, kind| {
            let next: Box<dyn Iterator<Item = IndexMap<String, ProcedureNode>> + 'a> =
                Box::new(acc.flat_map(move |combo| {
                    let kind = kind.clone();
                    self.iterate_possible_procedures(&kind, stop_pred, skip_pred)
                        .map(move |sub| {
                            let mut extended = combo.clone();
                            extended.insert(kind.clone(), sub);
                            extended
                        })
                }));
            next
        });

        Box::new(combos.map(move |combo| ProcedureNode {
            resource: target.clone(),
            recipe: Some(name.clone()),
            inputs: combo,
        }))
    }

    /// Materialises up to `hard_limit` procedures, pulling at most
    /// `hard_limit + 1` items from the lazy enumerator -- enough to detect
    /// whether more than `limit` exist without ever fully expanding an
    /// unbounded result set. Fails `ResultsetTooLarge` if more than `limit`
    /// exist (carrying a recipe-occurrence histogram over the first
    /// `hard_limit`), `NoProcedure` if none exist.
    pub fn find_procedures(
        &self,
        target: &str,
        config: SearchConfig,
        stop_pred: &RecipePredicate<'_>,
        skip_pred: &RecipePredicate<'_>,
    ) -> Result<Vec<ProcedureNode>, ProcedureError> {
        let mut all: Vec<ProcedureNode> = self
            .iterate_possible_procedures(target, stop_pred, skip_pred)
            .filter(|p| !p.is_terminal())
            .take(config.hard_limit + 1)
            .collect();

        if all.is_empty() {
            return Err(ProcedureError::NoProcedure(target.to_string()));
        }

        if all.len() > config.limit {
            let mut histogram: IndexMap<String, usize> = IndexMap::new();
            for procedure in all.iter().take(config.hard_limit) {
                count_recipes(procedure, &mut histogram);
            }
            return Err(ProcedureError::ResultsetTooLarge {
                target: target.to_string(),
                limit: config.limit,
                histogram: histogram.into_iter().collect(),
            });
        }

        all.truncate(config.hard_limit);
        Ok(all)
    }

    /// Lowers `procedure` into a fresh flow graph stored under `graph_name`,
    /// recursively: the recipe's process is added, each declared sub-input is
    /// lowered and unified in, and the sub-top connected to this node's top.
    pub fn procedure_to_graph(
        &mut self,
        procedure: &ProcedureNode,
        graph_name: &str,
    ) -> Result<(), ProcedureError> {
        let graph = self.lower_procedure(procedure)?;
        self.graphs.insert(graph_name.to_string(), graph);
        Ok(())
    }

    fn lower_procedure(&self, procedure: &ProcedureNode) -> Result<FlowGraph, ProcedureError> {
        let mut graph = FlowGraph::new();
        let Some(recipe_name) = &procedure.recipe else {
            // Unresolvable node: left as an open input on an empty graph.
            return Ok(graph);
        };

        let recipe = self.get_recipe(recipe_name)?.clone();
        let top = graph.add_process(recipe, Some(recipe_name.clone()))?;

        for sub_procedure in procedure.inputs.values() {
            if sub_procedure.is_terminal() {
                continue;
            }
            let sub_graph = self.lower_procedure(sub_procedure)?;
            let sub_top = sub_procedure.recipe.clone().unwrap();
            graph.unify(sub_graph);
            graph.connect(&sub_top, &top, None)?;
        }

        Ok(graph)
    }

    /// The inverse of [`CraftingContext::procedure_to_graph`]: walks upstream
    /// from the graph's single open output through pools, rebuilding the
    /// procedure tree. Any input not connected to a producing pool becomes a
    /// leaf stub. Fails `MultipleOpenOutputs` unless the graph has exactly
    /// one.
    pub fn graph_to_procedure(&self, graph_name: &str) -> Result<ProcedureNode, ProcedureError> {
        let graph = self.get_graph(graph_name)?;
        let open_outputs: Vec<_> = graph.open_outputs().iter().collect();
        if open_outputs.len() != 1 {
            return Err(ProcedureError::MultipleOpenOutputs(graph_name.to_string()));
        }
        let (top_process, resource) = open_outputs[0].clone();
        Ok(self.walk_upstream(graph, &top_process, &resource))
    }

    fn walk_upstream(&self, graph: &FlowGraph, process_name: &str, resource: &str) -> ProcedureNode {
        let mut inputs = IndexMap::new();
        if let Some(process) = graph.processes().get(process_name) {
            if let Ok(process_inputs) = process.inputs() {
                for kind in process_inputs.nonzero_components().keys() {
                    let producer = graph.pools().values().find(|pool| {
                        pool.kind == *kind && pool.consumers.iter().any(|c| c == process_name)
                    });
                    let node = match producer.and_then(|pool| pool.producers.first()) {
                        Some(upstream) => self.walk_upstream(graph, upstream, kind),
                        None => ProcedureNode::terminal(kind.clone()),
                    };
                    inputs.insert(kind.clone(), node);
                }
            }
        }
        ProcedureNode { resource: resource.to_string(), recipe: Some(process_name.to_string()), inputs }
    }

    /// `build_matrix`, then `solve_best_sequence`, re-annotated with readable
    /// recipe descriptions and residual net throughput projected over the
    /// graph's open endpoints.
    pub fn milps(&self, graph_name: &str, config: SolverConfig) -> Result<Vec<AnnotatedSolution>, SolverError> {
        self.solve_annotated(graph_name, config, true)
    }

    /// As [`CraftingContext::milps`] but built from `build_batch_matrix`.
    pub fn batch_milps(&self, graph_name: &str, config: SolverConfig) -> Result<Vec<AnnotatedSolution>, SolverError> {
        self.solve_annotated(graph_name, config, false)
    }

    fn solve_annotated(
        &self,
        graph_name: &str,
        config: SolverConfig,
        rate: bool,
    ) -> Result<Vec<AnnotatedSolution>, SolverError> {
        let graph = match self.graphs.get(graph_name) {
            Some(g) => g,
            None => return Ok(Vec::new()),
        };
        let dense = if rate { graph.build_matrix() } else { graph.build_batch_matrix() };
        let dense = match dense {
            Ok(d) => d,
            Err(_) => return Ok(Vec::new()),
        };

        let solutions = best_sequence(&dense.matrix, config)?;
        let mut annotated = Vec::with_capacity(solutions.len());
        for LeakageSolution { epsilon, counts } in solutions {
            let named: Vec<(String, i64)> =
                dense.processes.iter().cloned().zip(counts.iter().copied()).collect();
            let dangling: Vec<_> = graph
                .open_inputs()
                .iter()
                .chain(graph.open_outputs().iter())
                .cloned()
                .collect();
            let mut residual = Ingredients::zero();
            for (process_name, kind) in &dangling {
                if let (Some(process), Some(&count)) = (
                    graph.processes().get(process_name),
                    named.iter().find(|(n, _)| n == process_name).map(|(_, c)| c),
                ) {
                    let vector = if rate {
                        process.transfer_rate()
                    } else {
                        process.transfer()
                    };
                    if let Ok(vector) = vector {
                        residual = residual + (count as f64) * vector.project(kind);
                    }
                }
            }
            annotated.push(AnnotatedSolution { epsilon, counts: named, residual });
        }
        Ok(annotated)
    }

    /// Thin wrapper over [`FlowGraph::consolidate_processes`] scoped to a named graph.
    pub fn consolidate(&mut self, graph_name: &str, keep: &str, drop: &str) -> Result<(), GraphError> {
        self.get_graph_mut(graph_name).consolidate_processes(keep, drop)
    }

    /// Per-process transfer rates for the named graph's processes, in insertion order.
    pub fn transfer_rates(&self, graph_name: &str) -> Result<IndexMap<String, Ingredients>, ProcedureError> {
        let graph = self.get_graph(graph_name)?;
        Ok(graph
            .processes()
            .iter()
            .filter_map(|(name, p)| p.transfer_rate().ok().map(|r| (name.clone(), r)))
            .collect())
    }
}

fn count_recipes(procedure: &ProcedureNode, histogram: &mut IndexMap<String, usize>) {
    if let Some(recipe) = &procedure.recipe {
        *histogram.entry(recipe.clone()).or_insert(0) += 1;
    }
    for sub in procedure.inputs.values() {
        count_recipes(sub, histogram);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(outputs: &str, inputs: Option<&str>, duration: Option<f64>) -> RecipeSpec {
        RecipeSpec {
            outputs: outputs.to_string(),
            inputs: inputs.map(|s| s.to_string()),
            duration,
            process: None,
        }
    }

    fn always_false(_: &str, _: &AugmentedProcess) -> bool {
        false
    }

    // Test 1: recipes get disambiguated names on collision
    #[test]
    fn recipe_naming_disambiguates_on_collision() {
        let mut cc = CraftingContext::new();
        let names = cc
            .add_recipes_from_structured(&[spec("plate", None, Some(1.0)), spec("plate", None, Some(1.0))])
            .unwrap();
        assert_ne!(names[0], names[1]);
        assert_eq!(names[0], "plate");
        assert_eq!(names[1], "plate 2");
    }

    // Test 2: find_recipe_producing filters correctly
    #[test]
    fn find_recipe_producing_filters_by_output() {
        let mut cc = CraftingContext::new();
        cc.add_recipes_from_structured(&[spec("plate", None, Some(1.0)), spec("gear", None, Some(1.0))])
            .unwrap();
        let producers = cc.find_recipe_producing("plate");
        assert_eq!(producers.len(), 1);
    }

    // Test 3: scenario 5 -- procedure fan-out (2 x 2 = 4 trees)
    #[test]
    fn scenario_five_procedure_fan_out() {
        let mut cc = CraftingContext::new();
        cc.add_recipes_from_structured(&[
            spec("target", Some("sub"), Some(1.0)),
            spec("target", Some("sub"), Some(1.0)),
            spec("sub", None, Some(1.0)),
            spec("sub", None, Some(1.0)),
        ])
        .unwrap();

        let procedures =
            cc.find_procedures("target", SearchConfig::default(), &always_false, &always_false).unwrap();
        assert_eq!(procedures.len(), 4);
    }

    // Test 4: no producing recipe yields NoProcedure
    #[test]
    fn no_producing_recipe_fails() {
        let cc = CraftingContext::new();
        let result = cc.find_procedures("missing", SearchConfig::default(), &always_false, &always_false);
        assert!(matches!(result, Err(ProcedureError::NoProcedure(_))));
    }

    // Test 5: stop_pred short-circuits the whole enumeration for a target
    #[test]
    fn stop_pred_short_circuits() {
        let mut cc = CraftingContext::new();
        cc.add_recipes_from_structured(&[spec("target", None, Some(1.0))]).unwrap();
        let stop = |_: &str, _: &AugmentedProcess| true;
        let procedures: Vec<_> = cc.iterate_possible_procedures("target", &stop, &always_false).collect();
        assert_eq!(procedures.len(), 1);
        assert!(procedures[0].is_terminal());
    }

    // Test 6: skip_pred skips just that recipe, not the whole target
    #[test]
    fn skip_pred_skips_one_recipe() {
        let mut cc = CraftingContext::new();
        let names = cc
            .add_recipes_from_structured(&[spec("target", None, Some(1.0)), spec("target", None, Some(1.0))])
            .unwrap();
        let skip_name = names[0].clone();
        let skip = move |name: &str, _: &AugmentedProcess| name == skip_name;
        let procedures: Vec<_> = cc.iterate_possible_procedures("target", &always_false, &skip).collect();
        assert_eq!(procedures.len(), 1);
        assert_eq!(procedures[0].recipe.as_deref(), Some(names[1].as_str()));
    }

    // Test 7: procedure_to_graph then graph_to_procedure round-trips a linear chain
    #[test]
    fn procedure_and_graph_round_trip_linear_chain() {
        let mut cc = CraftingContext::new();
        let names = cc
            .add_recipes_from_structured(&[spec("b", None, Some(1.0)), spec("c", Some("b"), Some(1.0))])
            .unwrap();
        let b_name = names[0].clone();
        let c_name = names[1].clone();

        let mut inputs = IndexMap::new();
        inputs.insert("b".to_string(), ProcedureNode { resource: "b".to_string(), recipe: Some(b_name.clone()), inputs: IndexMap::new() });
        let procedure = ProcedureNode { resource: "c".to_string(), recipe: Some(c_name.clone()), inputs };

        cc.procedure_to_graph(&procedure, "chain").unwrap();
        let rebuilt = cc.graph_to_procedure("chain").unwrap();
        assert_eq!(rebuilt.recipe.as_deref(), Some(c_name.as_str()));
        assert_eq!(rebuilt.inputs["b"].recipe.as_deref(), Some(b_name.as_str()));
    }

    // Test 8: graph_to_procedure fails on more than one open output
    #[test]
    fn graph_to_procedure_fails_on_multiple_open_outputs() {
        let mut cc = CraftingContext::new();
        let names = cc
            .add_recipes_from_structured(&[spec("a", None, Some(1.0)), spec("b", None, Some(1.0))])
            .unwrap();
        let procedure_a = ProcedureNode { resource: "a".to_string(), recipe: Some(names[0].clone()), inputs: IndexMap::new() };
        cc.procedure_to_graph(&procedure_a, "g").unwrap();
        let recipe_b = cc.get_recipe(&names[1]).unwrap().clone();
        cc.get_graph_mut("g").add_process(recipe_b, Some(names[1].clone())).unwrap();
        let result = cc.graph_to_procedure("g");
        assert!(matches!(result, Err(ProcedureError::MultipleOpenOutputs(_))));
    }

    // Test 9: milps end to end -- scenario 1
    #[test]
    fn milps_end_to_end_scenario_one() {
        let mut cc = CraftingContext::new();
        let names = cc
            .add_recipes_from_structured(&[
                spec("a", None, Some(1.0)),
                spec("c", Some("a + 2 b"), Some(1.0)),
                spec("b", None, Some(1.0)),
            ])
            .unwrap();

        let mut graph = FlowGraph::new();
        let a = graph.add_process(cc.get_recipe(&names[0]).unwrap().clone(), Some(names[0].clone())).unwrap();
        let b = graph.add_process(cc.get_recipe(&names[1]).unwrap().clone(), Some(names[1].clone())).unwrap();
        let c = graph.add_process(cc.get_recipe(&names[2]).unwrap().clone(), Some(names[2].clone())).unwrap();
        graph.connect(&a, &b, Some("a")).unwrap();
        graph.connect(&c, &b, Some("b")).unwrap();
        cc.graphs.insert("chain".to_string(), graph);

        let solutions = cc.milps("chain", SolverConfig::default()).unwrap();
        assert!(!solutions.is_empty());
        let first = &solutions[0];
        let by_name: IndexMap<_, _> = first.counts.iter().cloned().collect();
        assert_eq!(by_name[&names[0]], 1);
        assert_eq!(by_name[&names[1]], 1);
        assert_eq!(by_name[&names[2]], 2);
    }

    // Test 10: apply_augment_to_recipe without replace registers a fresh name
    #[test]
    fn apply_augment_without_replace_registers_fresh_name() {
        let mut cc = CraftingContext::new();
        let names = cc.add_recipes_from_structured(&[spec("plate", None, Some(1.0))]).unwrap();
        let new_name = cc
            .apply_augment_to_recipe(&names[0], Augment::MulSpeed(2.0), None, false)
            .unwrap();
        assert_ne!(new_name, names[0]);
        assert!(cc.get_recipe(&names[0]).is_ok());
        assert!(cc.get_recipe(&new_name).is_ok());
    }

    // Test 11b: add_input_rate is rejected rather than aliased to add_input
    #[test]
    fn add_input_rate_is_rejected() {
        let spec = AugmentSpec {
            name: "bad".to_string(),
            augments: vec![("add_input_rate".to_string(), AugmentArg::Ingredients("2 coal".to_string()))],
        };
        let result = decode_augment_spec(&spec);
        assert!(matches!(result, Err(ProcedureError::UnknownAugmentPrimitive(_))));
    }

    // Test 11c: decode_augment_spec composes multiple primitives in order
    #[test]
    fn decode_augment_spec_composes_in_order() {
        let spec = AugmentSpec {
            name: "boosted".to_string(),
            augments: vec![
                ("mul_speed".to_string(), AugmentArg::Scalar(2.0)),
                ("mul_duration".to_string(), AugmentArg::Scalar(3.0)),
            ],
        };
        let augment = decode_augment_spec(&spec).unwrap();
        let mut cc = CraftingContext::new();
        let names = cc.add_recipes_from_structured(&[spec_with_duration(4.0)]).unwrap();
        let name = cc.apply_augment_to_recipe(&names[0], augment, None, true).unwrap();
        assert_eq!(cc.get_recipe(&name).unwrap().duration().unwrap(), Some(6.0));
    }

    fn spec_with_duration(duration: f64) -> RecipeSpec {
        spec("plate", None, Some(duration))
    }

    // Test 11: apply_augment_to_recipe with replace overwrites in place
    #[test]
    fn apply_augment_with_replace_overwrites() {
        let mut cc = CraftingContext::new();
        let names = cc
            .add_recipes_from_structured(&[spec("plate", None, Some(4.0))])
            .unwrap();
        let name = cc
            .apply_augment_to_recipe(&names[0], Augment::MulSpeed(2.0), None, true)
            .unwrap();
        assert_eq!(name, names[0]);
        assert_eq!(cc.get_recipe(&name).unwrap().duration().unwrap(), Some(2.0));
    }

    // Test 12: RecipeSpec decodes from the contractual JSON shape (the
    // external parser's output -- see spec EXTERNAL INTERFACES)
    #[test]
    fn recipe_spec_decodes_from_contractual_json() {
        let json = r#"{"outputs": "c", "inputs": "a + 2 b", "duration": 1.0, "process": "assembler"}"#;
        let spec: RecipeSpec = serde_json::from_str(json).unwrap();
        assert_eq!(spec.outputs, "c");
        assert_eq!(spec.inputs.as_deref(), Some("a + 2 b"));
        assert_eq!(spec.duration, Some(1.0));
        assert_eq!(spec.process.as_deref(), Some("assembler"));

        let mut cc = CraftingContext::new();
        let names = cc.add_recipes_from_structured(&[spec]).unwrap();
        assert_eq!(cc.get_recipe(&names[0]).unwrap().outputs().unwrap().get("c"), 1.0);
    }

    // Test 13: AugmentSpec decodes from the contractual JSON shape, with
    // untagged scalar/ingredients/energy-pct argument variants
    #[test]
    fn augment_spec_decodes_from_contractual_json() {
        let json = r#"{
            "name": "overclocked",
            "augments": [
                ["mul_speed", 2.0],
                ["add_input", "1 coal"],
                ["increase_energy_pct", {"kind": "kWe", "percent": 25.0}]
            ]
        }"#;
        let spec: AugmentSpec = serde_json::from_str(json).unwrap();
        assert_eq!(spec.name, "overclocked");
        assert_eq!(spec.augments.len(), 3);
        let decoded = decode_augment_spec(&spec).unwrap();
        assert!(matches!(decoded, Augment::Composed(ref v) if v.len() == 3));
    }
}
