//! SMT-LIB query construction.
//!
//! Turns an expression into the query text sent to a solver, together with
//! the two lookup tables needed to read the answer back: the solver-visible
//! name of every variable, and the label of every asserted clause.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt::Write;

use log::debug;

use crate::expr::Expr;
use crate::types::Variable;

#[derive(Debug, Clone)]
pub struct Query {
    /// Single-line query text, ending with `(check-sat)`.
    pub text: String,
    pub variables: HashMap<Variable, String>,
    pub labels: HashMap<String, Expr>,
}

impl Query {
    /// Builds a query asserting every top-level conjunct of `formula` under
    /// its own label `c0`, `c1`, ...
    ///
    /// Every declared symbol is distinct: a variable sharing its name with a
    /// variable of another sort is declared under a fresh name, and a label
    /// that would clash with a variable gets `_` prepended until it does not.
    pub fn new(formula: &Expr) -> Self {
        let mut text = String::from("(set-option :produce-models true) (set-option :produce-unsat-cores true)");

        let variables = symbols(formula.free_variables());
        let mut declared: Vec<(&Variable, &String)> = variables.iter().collect();
        declared.sort();
        for (var, symbol) in declared {
            let _ = write!(text, " (declare-fun {} () {})", symbol, var.sort());
        }

        let taken: HashSet<&str> = variables.values().map(String::as_str).collect();
        let mut labels = HashMap::new();
        for (i, clause) in formula.conjuncts().into_iter().filter(|c| !c.is_true()).enumerate() {
            let mut label = format!("c{}", i);
            while taken.contains(label.as_str()) {
                label.insert(0, '_');
            }
            let _ = write!(text, " (assert (! {} :named {}))", clause.render_with(&variables), label);
            labels.insert(label, clause.clone());
        }

        text.push_str(" (check-sat)");
        Query { text, variables, labels }
    }
}

/// Assigns each variable a distinct solver symbol.
///
/// The first variable of each name (in `Variable` order) keeps its own
/// symbol; a later one with the same name gets `name!k` for the smallest free
/// `k`.
fn symbols(vars: BTreeSet<Variable>) -> HashMap<Variable, String> {
    let mut taken: HashSet<String> = HashSet::new();
    let mut clashing = Vec::new();
    let mut result = HashMap::new();
    for var in vars {
        let symbol = var.symbol();
        if taken.insert(symbol.clone()) {
            result.insert(var, symbol);
        } else {
            clashing.push(var);
        }
    }
    for var in clashing {
        let symbol = (1..)
            .map(|k| Variable::new(format!("{}!{}", var.name(), k), var.sort()).symbol())
            .find(|s| !taken.contains(s))
            .unwrap_or_default();
        debug!("variable {} of sort {} declared as {}", var.name(), var.sort(), symbol);
        taken.insert(symbol.clone());
        result.insert(var, symbol);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse_core;

    #[test]
    fn test_query_text() {
        let x = Variable::int("x");
        let y = Variable::real("y");
        let f = Expr::and(
            Expr::lt(Expr::var(x.clone()), Expr::int(3)),
            Expr::ge(Expr::var(y.clone()), Expr::real(0.5)),
        );
        let query = Query::new(&f);
        println!("query = {}", query.text);
        assert_eq!(
            query.text,
            "(set-option :produce-models true) (set-option :produce-unsat-cores true) \
             (declare-fun x () Int) (declare-fun y () Real) \
             (assert (! (< x 3) :named c0)) (assert (! (>= y 0.5) :named c1)) (check-sat)"
        );
        assert_eq!(query.variables[&x], "x");
        assert_eq!(query.variables[&y], "y");
        assert_eq!(query.labels.len(), 2);
    }

    #[test]
    fn test_labels_map_back() {
        let x = Expr::var(Variable::int("x"));
        let a = Expr::lt(x.clone(), Expr::int(1));
        let b = Expr::gt(x, Expr::int(5));
        let query = Query::new(&Expr::and(a.clone(), b.clone()));
        let core = parse_core("(c0 c1)", &query.labels);
        assert!(core.contains(&a));
        assert!(core.contains(&b));
    }

    #[test]
    fn test_labels_avoid_variable_names() {
        let c0 = Variable::int("c0");
        let c1 = Variable::int("c1");
        let f = Expr::and(
            Expr::lt(Expr::var(c0.clone()), Expr::int(3)),
            Expr::gt(Expr::var(c1.clone()), Expr::int(0)),
        );
        let query = Query::new(&f);
        println!("query = {}", query.text);
        assert!(query.text.contains("(assert (! (< c0 3) :named _c0))"));
        assert!(query.text.contains("(assert (! (> c1 0) :named _c1))"));
        assert_eq!(query.variables[&c0], "c0");
        let mut labels: Vec<&String> = query.labels.keys().collect();
        labels.sort();
        assert_eq!(labels, ["_c0", "_c1"]);
    }

    #[test]
    fn test_same_name_different_sorts() {
        let xi = Variable::int("x");
        let xr = Variable::real("x");
        let f = Expr::and(
            Expr::lt(Expr::var(xi.clone()), Expr::int(3)),
            Expr::ge(Expr::var(xr.clone()), Expr::real(0.5)),
        );
        let query = Query::new(&f);
        println!("query = {}", query.text);
        assert_eq!(query.variables[&xi], "x");
        assert_eq!(query.variables[&xr], "x!1");
        assert!(query.text.contains("(declare-fun x () Int) (declare-fun x!1 () Real)"));
        assert!(query.text.contains("(assert (! (< x 3) :named c0)) (assert (! (>= x!1 0.5) :named c1))"));
    }

    #[test]
    fn test_renamed_symbol_skips_taken_names() {
        let vars = BTreeSet::from([Variable::int("x"), Variable::real("x"), Variable::int("x!1")]);
        let symbols = symbols(vars);
        let distinct: HashSet<&String> = symbols.values().collect();
        assert_eq!(distinct.len(), 3);
        assert_eq!(symbols[&Variable::int("x")], "x");
        assert_eq!(symbols[&Variable::int("x!1")], "x!1");
        assert_eq!(symbols[&Variable::real("x")], "x!2");
    }

    #[test]
    fn test_trivial_query() {
        let query = Query::new(&Expr::tt());
        assert!(query.labels.is_empty());
        assert!(query.variables.is_empty());
        assert!(query.text.ends_with("(check-sat)"));
    }
}
