//! Factorization of a formula into independent factors.
//!
//! A formula is split into its top-level conjuncts, and conjuncts are grouped
//! into the connected components of the "shares a free variable" relation.
//! Each component becomes one factor. Factors share no free variables, so the
//! model count of the formula is the product of the factors' model counts.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use log::debug;

use crate::expr::Expr;
use crate::types::Variable;

/// Independent factors of a formula, in the order of their first conjunct.
pub type FactorSet = Vec<Expr>;

/// Decomposition context of a parent formula, shared by its children.
///
/// Stores the free variables of every conjunct of the parent's full
/// expression. Children usually repeat most of their parent's conjuncts, so
/// factorizing them with this context skips the variable collection for all
/// shared conjuncts.
#[derive(Debug, Default)]
pub struct FactorContext {
    variables: HashMap<Expr, Arc<BTreeSet<Variable>>>,
}

impl FactorContext {
    pub fn new(formula: &Expr) -> Self {
        let variables = formula
            .conjuncts()
            .into_iter()
            .filter(|c| !c.is_true())
            .map(|c| (c.clone(), Arc::new(c.free_variables())))
            .collect();
        Self { variables }
    }

    /// Number of conjuncts known to the context.
    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    fn variables_of(&self, conjunct: &Expr) -> Option<Arc<BTreeSet<Variable>>> {
        self.variables.get(conjunct).cloned()
    }
}

/// Union-find over conjunct indices.
struct DisjointSets {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl DisjointSets {
    fn new(size: usize) -> Self {
        Self {
            parent: (0..size).collect(),
            rank: vec![0; size],
        }
    }

    fn find(&mut self, mut i: usize) -> usize {
        while self.parent[i] != i {
            // Path halving
            self.parent[i] = self.parent[self.parent[i]];
            i = self.parent[i];
        }
        i
    }

    fn union(&mut self, a: usize, b: usize) {
        let (a, b) = (self.find(a), self.find(b));
        if a == b {
            return;
        }
        if self.rank[a] < self.rank[b] {
            self.parent[a] = b;
        } else {
            self.parent[b] = a;
            if self.rank[a] == self.rank[b] {
                self.rank[a] += 1;
            }
        }
    }
}

/// Splits `formula` into independent factors.
///
/// `true` conjuncts and duplicate conjuncts are dropped, so a trivially true
/// formula has no factors. Ground conjuncts (without variables) form a factor
/// each. The result does not depend on `context`; the context only saves work.
pub fn factorize(formula: &Expr, context: Option<&FactorContext>) -> FactorSet {
    let mut seen = HashSet::new();
    let conjuncts: Vec<&Expr> = formula
        .conjuncts()
        .into_iter()
        .filter(|c| !c.is_true() && seen.insert(*c))
        .collect();

    let mut reused = 0;
    let variables: Vec<Arc<BTreeSet<Variable>>> = conjuncts
        .iter()
        .map(|c| match context.and_then(|ctx| ctx.variables_of(c)) {
            Some(vars) => {
                reused += 1;
                vars
            }
            None => Arc::new(c.free_variables()),
        })
        .collect();

    let mut sets = DisjointSets::new(conjuncts.len());
    let mut owner: HashMap<&Variable, usize> = HashMap::new();
    for (i, vars) in variables.iter().enumerate() {
        for v in vars.iter() {
            match owner.get(v) {
                Some(&j) => sets.union(i, j),
                None => {
                    owner.insert(v, i);
                }
            }
        }
    }

    // Components are ordered by their smallest conjunct index.
    let mut order: Vec<usize> = Vec::new();
    let mut groups: HashMap<usize, Vec<Expr>> = HashMap::new();
    for (i, conjunct) in conjuncts.iter().enumerate() {
        let root = sets.find(i);
        let group = groups.entry(root).or_insert_with(|| {
            order.push(root);
            Vec::new()
        });
        group.push((*conjunct).clone());
    }

    let factors: FactorSet = order
        .into_iter()
        .filter_map(|root| groups.remove(&root))
        .map(Expr::conjunction)
        .collect();

    debug!(
        "factorize: {} conjuncts ({} from context) -> {} factors",
        conjuncts.len(),
        reused,
        factors.len()
    );
    factors
}

#[cfg(test)]
mod tests {
    use super::*;

    use test_log::test;

    fn int(name: &str) -> Expr {
        Expr::var(Variable::int(name))
    }

    #[test]
    fn test_factorize_trivial() {
        assert!(factorize(&Expr::tt(), None).is_empty());
        assert!(factorize(&Expr::and(Expr::tt(), Expr::tt()), None).is_empty());
    }

    #[test]
    fn test_factorize_single() {
        let f = Expr::lt(int("x"), Expr::int(3));
        assert_eq!(factorize(&f, None), vec![f]);
    }

    #[test]
    fn test_factorize_independent() {
        let a = Expr::lt(int("x"), Expr::int(3));
        let b = Expr::gt(int("y"), Expr::int(0));
        let c = Expr::lt(int("x"), int("z"));
        let f = Expr::conjunction([a.clone(), b.clone(), c.clone()]);
        let factors = factorize(&f, None);
        println!("factors = {:?}", factors);
        assert_eq!(factors, vec![Expr::conjunction([a, c]), b]);
    }

    #[test]
    fn test_factorize_transitive() {
        // x-y and y-z link x and z through y
        let a = Expr::lt(int("x"), int("y"));
        let b = Expr::gt(int("w"), Expr::int(1));
        let c = Expr::lt(int("y"), int("z"));
        let d = Expr::eq(int("z"), Expr::int(5));
        let f = Expr::conjunction([a.clone(), b.clone(), c.clone(), d.clone()]);
        let factors = factorize(&f, None);
        assert_eq!(factors, vec![Expr::conjunction([a, c, d]), b]);
    }

    #[test]
    fn test_factorize_ground_and_duplicates() {
        let a = Expr::lt(int("x"), Expr::int(3));
        let g = Expr::lt(Expr::int(1), Expr::int(2));
        let f = Expr::conjunction([a.clone(), g.clone(), a.clone(), Expr::tt(), Expr::ff()]);
        let factors = factorize(&f, None);
        assert_eq!(factors, vec![a, g, Expr::ff()]);
    }

    #[test]
    fn test_factorize_with_context() {
        let a = Expr::lt(int("x"), int("y"));
        let b = Expr::gt(int("z"), Expr::int(1));
        let parent = Expr::and(a.clone(), b.clone());
        let context = FactorContext::new(&parent);
        assert_eq!(context.len(), 2);

        let c = Expr::lt(int("y"), int("z"));
        let child = Expr::conjunction([a, b, c]);
        let with = factorize(&child, Some(&context));
        let without = factorize(&child, None);
        assert_eq!(with, without);
        assert_eq!(with.len(), 1);
    }
}
