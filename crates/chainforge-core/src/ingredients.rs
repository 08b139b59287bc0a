//! The formal free-module over resource names: [`Ingredients`].
//!
//! An `Ingredients` value is a sparse vector of real coefficients indexed by
//! resource name. It supports the usual vector-space operations plus a
//! compact textual grammar (`2 iron + plate - 3 scrap`) used by recipe specs.

use std::fmt;
use std::ops::{Add, Mul, Neg, Sub};

use indexmap::IndexMap;

/// A single `(name, coefficient, basis)` entry, as returned by [`Ingredients::triples`].
pub type Triple = (String, f64, Option<String>);

#[derive(Debug, thiserror::Error)]
pub enum IngredientsError {
    #[error("malformed ingredients expression '{0}': {1}")]
    ParseError(String, String),
}

/// Per-name storage: the coefficient and an optional display/provenance basis tag.
#[derive(Debug, Clone, PartialEq)]
struct Component {
    coefficient: f64,
    basis: Option<String>,
}

/// A free-module element over resource names with real coefficients.
///
/// Iteration order is insertion order, not sorted order: callers that build
/// matrices from an `Ingredients` value (or from a [`crate::graph::FlowGraph`]
/// built out of them) get a deterministic, declaration-order row/column
/// layout for free.
#[derive(Debug, Clone, Default)]
pub struct Ingredients {
    components: IndexMap<String, Component>,
}

/// Equality compares only nonzero components (zero coefficients are
/// semantically identical to absence, per the data-model invariant) and
/// ignores `basis`, which is a display/provenance tag rather than part of
/// the vector's magnitude.
impl PartialEq for Ingredients {
    fn eq(&self, other: &Self) -> bool {
        let lhs = self.nonzero_components();
        let rhs = other.nonzero_components();
        lhs.len() == rhs.len() && lhs.iter().all(|(name, c)| rhs.get(name) == Some(c))
    }
}

impl Ingredients {
    /// The canonical zero element.
    pub fn zero() -> Self {
        Self::default()
    }

    /// Builds an `Ingredients` value from explicit `(name, coefficient, basis)` triples.
    /// Later entries for the same name overwrite earlier ones (last write wins),
    /// matching the behaviour of repeated assignment into a mapping.
    pub fn from_triples<I>(triples: I) -> Self
    where
        I: IntoIterator<Item = Triple>,
    {
        let mut components = IndexMap::new();
        for (name, coefficient, basis) in triples {
            components.insert(name, Component { coefficient, basis });
        }
        Self { components }
    }

    /// Parses the compact grammar:
    ///
    /// ```text
    /// expr   := term (('+' | '-') term)*
    /// term   := [ number ] name
    /// number := signed decimal
    /// name   := one-or-more-tokens-up-to-'+'/'-'/end, trimmed
    /// ```
    ///
    /// Coefficient defaults to `1` when omitted. Whitespace around `+`/`-` is
    /// optional but tolerated.
    pub fn parse(s: &str) -> Result<Self, IngredientsError> {
        let mut result = IndexMap::new();
        for (sign, term) in split_terms(s) {
            let term = term.trim();
            if term.is_empty() {
                return Err(IngredientsError::ParseError(
                    s.to_string(),
                    "empty term".to_string(),
                ));
            }
            let (coefficient, name) = split_coefficient(term).map_err(|msg| {
                IngredientsError::ParseError(s.to_string(), msg)
            })?;
            if name.is_empty() {
                return Err(IngredientsError::ParseError(
                    s.to_string(),
                    "term has no resource name".to_string(),
                ));
            }
            let signed = sign * coefficient;
            result
                .entry(name.to_string())
                .and_modify(|c: &mut Component| c.coefficient += signed)
                .or_insert(Component {
                    coefficient: signed,
                    basis: None,
                });
        }
        Ok(Self { components: result })
    }

    /// Returns the coefficient for `name`, or `0.0` if absent.
    pub fn get(&self, name: &str) -> f64 {
        self.components
            .get(name)
            .map(|c| c.coefficient)
            .unwrap_or(0.0)
    }

    /// A singleton `Ingredients` holding only `name`'s component (zero if absent).
    pub fn project(&self, name: &str) -> Self {
        match self.components.get(name) {
            Some(c) if c.coefficient != 0.0 => {
                let mut components = IndexMap::new();
                components.insert(name.to_string(), c.clone());
                Self { components }
            }
            _ => Self::zero(),
        }
    }

    /// Nonzero components, in insertion order, as name -> coefficient.
    pub fn nonzero_components(&self) -> IndexMap<String, f64> {
        self.components
            .iter()
            .filter(|(_, c)| c.coefficient != 0.0)
            .map(|(name, c)| (name.clone(), c.coefficient))
            .collect()
    }

    /// All `(name, coefficient, basis)` triples in insertion order, including zeros.
    pub fn triples(&self) -> Vec<Triple> {
        self.components
            .iter()
            .map(|(name, c)| (name.clone(), c.coefficient, c.basis.clone()))
            .collect()
    }

    /// Sums an iterable of `Ingredients`, returning [`Ingredients::zero`] for an empty iterator.
    pub fn sum<I>(items: I) -> Self
    where
        I: IntoIterator<Item = Ingredients>,
    {
        items.into_iter().fold(Self::zero(), |acc, x| acc + x)
    }

    /// Sets (or overwrites) the basis tag for `name`, creating a zero component if absent.
    pub fn with_basis(mut self, name: &str, basis: impl Into<String>) -> Self {
        self.components
            .entry(name.to_string())
            .or_insert(Component {
                coefficient: 0.0,
                basis: None,
            })
            .basis = Some(basis.into());
        self
    }
}

impl Add for Ingredients {
    type Output = Ingredients;

    fn add(self, rhs: Ingredients) -> Ingredients {
        let mut components = self.components;
        for (name, rhs_c) in rhs.components {
            components
                .entry(name)
                .and_modify(|c| c.coefficient += rhs_c.coefficient)
                .or_insert(rhs_c);
        }
        Ingredients { components }
    }
}

impl Sub for Ingredients {
    type Output = Ingredients;

    fn sub(self, rhs: Ingredients) -> Ingredients {
        self + (-rhs)
    }
}

impl Neg for Ingredients {
    type Output = Ingredients;

    fn neg(self) -> Ingredients {
        let components = self
            .components
            .into_iter()
            .map(|(name, mut c)| {
                c.coefficient = -c.coefficient;
                (name, c)
            })
            .collect();
        Ingredients { components }
    }
}

impl Mul<Ingredients> for f64 {
    type Output = Ingredients;

    fn mul(self, rhs: Ingredients) -> Ingredients {
        let components = rhs
            .components
            .into_iter()
            .map(|(name, mut c)| {
                c.coefficient *= self;
                (name, c)
            })
            .collect();
        Ingredients { components }
    }
}

impl fmt::Display for Ingredients {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let nonzero: Vec<_> = self
            .components
            .iter()
            .filter(|(_, c)| c.coefficient != 0.0)
            .collect();
        if nonzero.is_empty() {
            return write!(f, "Ingredients.NONE");
        }
        for (i, (name, c)) in nonzero.iter().enumerate() {
            if i > 0 {
                write!(f, " {} ", if c.coefficient < 0.0 { "-" } else { "+" })?;
            } else if c.coefficient < 0.0 {
                write!(f, "-")?;
            }
            let magnitude = c.coefficient.abs();
            if (magnitude - 1.0).abs() < f64::EPSILON {
                write!(f, "{name}")?;
            } else {
                write!(f, "{magnitude} {name}")?;
            }
        }
        Ok(())
    }
}

/// Splits `s` into signed terms, honoring the leading sign (default `+`).
fn split_terms(s: &str) -> Vec<(f64, &str)> {
    let mut terms = Vec::new();
    let mut sign = 1.0;
    let mut start = 0usize;
    let bytes = s.as_bytes();
    let mut i = 0usize;
    while i < bytes.len() {
        if (bytes[i] == b'+' || bytes[i] == b'-') && i > start {
            let term = &s[start..i];
            if !term.trim().is_empty() {
                terms.push((sign, term));
            }
            sign = if bytes[i] == b'-' { -1.0 } else { 1.0 };
            start = i + 1;
        } else if (bytes[i] == b'+' || bytes[i] == b'-') && i == start {
            sign = if bytes[i] == b'-' { -1.0 } else { 1.0 };
            start = i + 1;
        }
        i += 1;
    }
    let term = &s[start..];
    if !term.trim().is_empty() {
        terms.push((sign, term));
    }
    terms
}

/// Splits a single term into `(coefficient, name)`. Coefficient defaults to `1`.
fn split_coefficient(term: &str) -> Result<(f64, &str), String> {
    let term = term.trim();
    let mut split_at = None;
    for (idx, ch) in term.char_indices() {
        if ch.is_whitespace() {
            split_at = Some(idx);
            break;
        }
    }
    match split_at {
        Some(idx) => {
            let (head, rest) = term.split_at(idx);
            match head.parse::<f64>() {
                Ok(n) => Ok((n, rest.trim())),
                Err(_) => Ok((1.0, term)),
            }
        }
        None => Ok((1.0, term)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ing(pairs: &[(&str, f64)]) -> Ingredients {
        Ingredients::from_triples(
            pairs
                .iter()
                .map(|(n, c)| (n.to_string(), *c, None)),
        )
    }

    // Test 1: zero is the additive identity
    #[test]
    fn zero_is_additive_identity() {
        let a = ing(&[("iron", 2.0)]);
        assert_eq!(a.clone() + Ingredients::zero(), a);
    }

    // Test 2: addition is commutative
    #[test]
    fn addition_commutative() {
        let a = ing(&[("iron", 2.0), ("copper", 1.0)]);
        let b = ing(&[("copper", 3.0), ("plastic", 1.0)]);
        assert_eq!(a.clone() + b.clone(), b + a);
    }

    // Test 3: addition is associative
    #[test]
    fn addition_associative() {
        let a = ing(&[("iron", 2.0)]);
        let b = ing(&[("copper", 1.0)]);
        let c = ing(&[("iron", 1.0), ("plastic", 4.0)]);
        assert_eq!(
            (a.clone() + b.clone()) + c.clone(),
            a + (b + c)
        );
    }

    // Test 4: a - a = zero
    #[test]
    fn subtract_self_is_zero() {
        let a = ing(&[("iron", 3.5), ("copper", -1.0)]);
        let diff = a.clone() - a;
        assert_eq!(diff.nonzero_components().len(), 0);
    }

    // Test 5: scalar distributes over addition
    #[test]
    fn scalar_distributes() {
        let a = ing(&[("iron", 2.0)]);
        let b = ing(&[("copper", 3.0)]);
        let lhs = 2.0 * (a.clone() + b.clone());
        let rhs = (2.0 * a) + (2.0 * b);
        assert_eq!(lhs, rhs);
    }

    // Test 6: scalar multiplication associates
    #[test]
    fn scalar_multiplication_associative() {
        let a = ing(&[("iron", 2.0)]);
        let lhs = 3.0 * (2.0 * a.clone());
        let rhs = 6.0 * a;
        assert_eq!(lhs, rhs);
    }

    // Test 7: multiplying by 1 is identity, by 0 is zero
    #[test]
    fn scalar_identity_and_annihilator() {
        let a = ing(&[("iron", 2.0)]);
        assert_eq!(1.0 * a.clone(), a);
        assert_eq!((0.0 * a).nonzero_components().len(), 0);
    }

    // Test 8: parse defaults coefficient to 1
    #[test]
    fn parse_default_coefficient() {
        let a = Ingredients::parse("iron").unwrap();
        assert_eq!(a.get("iron"), 1.0);
    }

    // Test 9: parse handles mixed signs and explicit coefficients
    #[test]
    fn parse_mixed_terms() {
        let a = Ingredients::parse("a + 2 b").unwrap();
        assert_eq!(a.get("a"), 1.0);
        assert_eq!(a.get("b"), 2.0);
    }

    // Test 10: parse tolerates missing whitespace around operators
    #[test]
    fn parse_tight_spacing() {
        let a = Ingredients::parse("5 iron+2 copper-1 scrap").unwrap();
        assert_eq!(a.get("iron"), 5.0);
        assert_eq!(a.get("copper"), 2.0);
        assert_eq!(a.get("scrap"), -1.0);
    }

    // Test 11: round trip for non-negative coefficients
    #[test]
    fn parse_to_string_round_trips() {
        let a = Ingredients::parse("2 iron + plate").unwrap();
        let rendered = a.to_string();
        let reparsed = Ingredients::parse(&rendered).unwrap();
        assert_eq!(a, reparsed);
    }

    // Test 12: projection splits off exactly one component
    #[test]
    fn project_and_complement_recombine() {
        let a = ing(&[("iron", 2.0), ("copper", 3.0)]);
        let projected = a.project("iron");
        let complement = a.clone() - projected.clone();
        assert_eq!(projected + complement, a);
    }

    // Test 13: project on an absent name yields zero
    #[test]
    fn project_absent_name_is_zero() {
        let a = ing(&[("iron", 2.0)]);
        let projected = a.project("copper");
        assert_eq!(projected.nonzero_components().len(), 0);
    }

    // Test 14: nonzero_components excludes zero coefficients
    #[test]
    fn nonzero_components_excludes_zeros() {
        let a = ing(&[("iron", 0.0), ("copper", 5.0)]);
        let nz = a.nonzero_components();
        assert_eq!(nz.len(), 1);
        assert!(nz.contains_key("copper"));
    }

    // Test 15: sum over an empty iterator is zero
    #[test]
    fn sum_of_empty_is_zero() {
        let s = Ingredients::sum(Vec::<Ingredients>::new());
        assert_eq!(s, Ingredients::zero());
    }

    // Test 16: iteration order follows insertion order, not sort order
    #[test]
    fn iteration_order_is_insertion_order() {
        let a = Ingredients::from_triples(vec![
            ("zinc".to_string(), 1.0, None),
            ("amber".to_string(), 1.0, None),
        ]);
        let names: Vec<_> = a.triples().into_iter().map(|(n, _, _)| n).collect();
        assert_eq!(names, vec!["zinc", "amber"]);
    }

    // Test 17: malformed expression surfaces ParseError
    #[test]
    fn parse_empty_term_errors() {
        let result = Ingredients::parse("iron + ");
        assert!(result.is_err());
    }

    // Test 18: basis never affects equality of magnitudes
    #[test]
    fn basis_does_not_affect_get() {
        let a = ing(&[("iron", 2.0)]).with_basis("iron", "ore-grade");
        assert_eq!(a.get("iron"), 2.0);
    }
}
