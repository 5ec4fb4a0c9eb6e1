//! Parsing of solver responses.
//!
//! Pure text-to-data transforms for the artifacts an SMT solver prints after
//! `(get-model)` and `(get-unsat-core)`. Model output is a list of
//! definitions, optionally wrapped in a `(model ...)` form:
//!
//! ```text
//! (model
//!   (define-fun x () Int (- 5))
//!   (define-fun y () Real 2.5)
//! )
//! ```
//!
//! Unsat core output is a parenthesized list of clause labels: `(c0 c3)`.

use std::collections::{HashMap, HashSet};
use std::num::ParseIntError;

use crate::expr::Expr;
use crate::types::{Constant, Sort, Variable};

/// A satisfying assignment. Variables the solver did not assign are absent.
pub type Model = HashMap<Variable, Constant>;

/// Original expressions jointly responsible for unsatisfiability.
pub type Core = HashSet<Expr>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("unbalanced parentheses in solver output at byte {0}")]
    Unbalanced(usize),
    #[error("invalid integer value `{text}` for `{name}`")]
    Integer {
        name: String,
        text: String,
        #[source]
        source: ParseIntError,
    },
    #[error("invalid real value `{text}` for `{name}`")]
    Real { name: String, text: String },
}

/// Splits `text` into its top-level s-expressions and atoms.
///
/// `|...|` quoted symbols are kept whole, whitespace separates atoms.
fn split_forms(text: &str) -> Result<Vec<&str>, ParseError> {
    let mut forms = Vec::new();
    let mut depth = 0usize;
    let mut quoted = false;
    let mut start: Option<usize> = None;

    for (i, c) in text.char_indices() {
        if quoted {
            quoted = c != '|';
            continue;
        }
        match c {
            '|' => {
                quoted = true;
                start.get_or_insert(i);
            }
            '(' => {
                if depth == 0 {
                    if let Some(s) = start.take() {
                        forms.push(&text[s..i]);
                    }
                    start = Some(i);
                }
                depth += 1;
            }
            ')' => {
                if depth == 0 {
                    return Err(ParseError::Unbalanced(i));
                }
                depth -= 1;
                if depth == 0 {
                    if let Some(s) = start.take() {
                        forms.push(&text[s..=i]);
                    }
                }
            }
            c if c.is_whitespace() => {
                if depth == 0 {
                    if let Some(s) = start.take() {
                        forms.push(&text[s..i]);
                    }
                }
            }
            _ => {
                start.get_or_insert(i);
            }
        }
    }

    if depth != 0 || quoted {
        return Err(ParseError::Unbalanced(text.len()));
    }
    if let Some(s) = start {
        forms.push(&text[s..]);
    }
    Ok(forms)
}

/// Returns the inside of a parenthesized form, or `None` for an atom.
fn inner(form: &str) -> Option<&str> {
    form.strip_prefix('(')?.strip_suffix(')')
}

fn is_definition(form: &str) -> bool {
    inner(form).is_some_and(|body| body.trim_start().starts_with("define-fun"))
}

/// Reduces the model text to `name -> value text` pairs.
///
/// The enclosing wrapper (`(model ...)` or a bare `(...)`) is stripped first.
/// Definitions with parameters are not variable assignments and are skipped.
fn assignments(output: &str) -> Result<HashMap<String, String>, ParseError> {
    let mut forms = split_forms(output)?;
    if let [single] = forms[..] {
        if !is_definition(single) {
            if let Some(body) = inner(single) {
                forms = split_forms(body)?;
            }
        }
    }

    let mut table = HashMap::new();
    for form in forms.into_iter().filter(|f| is_definition(f)) {
        let Some(body) = inner(form) else { continue };
        let parts = split_forms(body)?;
        // define-fun <name> () <sort> <value>
        if let [_, name, "()", _, value] = parts[..] {
            table.insert(name.to_string(), value.to_string());
        }
    }
    Ok(table)
}

/// Rewrites `(- n)` into `-n`.
fn normalize_negation(text: &str) -> Result<String, ParseError> {
    if let Some(body) = inner(text) {
        if let ["-", value] = split_forms(body)?[..] {
            return Ok(format!("-{}", value));
        }
    }
    Ok(text.to_string())
}

fn parse_real(text: &str) -> Option<f64> {
    let Some(body) = inner(text) else {
        return text.parse().ok();
    };
    match split_forms(body).ok()?[..] {
        ["-", value] => parse_real(value).map(|v| -v),
        ["/", num, den] => Some(parse_real(num)? / parse_real(den)?),
        _ => None,
    }
}

/// Extracts a model from `(get-model)` output.
///
/// `variables` maps each variable of interest to the name the solver knows it
/// by. Integer values must fit in an `i64`; anything else is an error.
pub fn parse_model(output: &str, variables: &HashMap<Variable, String>) -> Result<Model, ParseError> {
    let table = assignments(output)?;

    let mut model = Model::new();
    for (var, name) in variables {
        let Some(text) = table.get(name) else {
            continue;
        };
        let value = match var.sort() {
            Sort::Int => {
                let normalized = normalize_negation(text)?;
                let value = normalized.parse::<i64>().map_err(|source| ParseError::Integer {
                    name: name.clone(),
                    text: text.clone(),
                    source,
                })?;
                Constant::Int(value)
            }
            Sort::Real => {
                let value = parse_real(text).ok_or_else(|| ParseError::Real {
                    name: name.clone(),
                    text: text.clone(),
                })?;
                Constant::Real(value)
            }
        };
        model.insert(var.clone(), value);
    }
    Ok(model)
}

/// Extracts an unsat core from `(get-unsat-core)` output.
///
/// Labels missing from `labels` are dropped: solvers may report labels the
/// caller never registered.
pub fn parse_core(output: &str, labels: &HashMap<String, Expr>) -> Core {
    let trimmed = output.trim();
    let body = inner(trimmed).unwrap_or(trimmed);
    body.split_whitespace()
        .filter_map(|label| labels.get(label))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    use test_log::test;

    fn names(vars: &[&Variable]) -> HashMap<Variable, String> {
        vars.iter().map(|v| ((*v).clone(), v.symbol())).collect()
    }

    #[test]
    fn test_split_forms() {
        let forms = split_forms("(a (b c)) d  |e f| (g)").unwrap();
        assert_eq!(forms, vec!["(a (b c))", "d", "|e f|", "(g)"]);
        assert_eq!(split_forms("(a").unwrap_err(), ParseError::Unbalanced(2));
        assert_eq!(split_forms("a)").unwrap_err(), ParseError::Unbalanced(1));
    }

    #[test]
    fn test_parse_model_int_and_real() {
        let x = Variable::int("x");
        let y = Variable::real("y");
        let output = "(model (define-fun x () Int (- 5)) (define-fun y () Real 2.5))";
        let model = parse_model(output, &names(&[&x, &y])).unwrap();
        println!("model = {:?}", model);
        assert_eq!(model.len(), 2);
        assert_eq!(model[&x], Constant::Int(-5));
        assert_eq!(model[&y], Constant::Real(2.5));
    }

    #[test]
    fn test_parse_model_without_keyword() {
        // Newer solvers omit the `model` keyword and break lines freely.
        let x = Variable::int("x");
        let output = "(\n  (define-fun x () Int\n    42)\n)";
        let model = parse_model(output, &names(&[&x])).unwrap();
        assert_eq!(model[&x], Constant::Int(42));
    }

    #[test]
    fn test_parse_model_unwrapped_definitions() {
        let x = Variable::int("x");
        let z = Variable::int("z");
        let output = "(define-fun x () Int 1) (define-fun z () Int (- 0))";
        let model = parse_model(output, &names(&[&x, &z])).unwrap();
        assert_eq!(model[&x], Constant::Int(1));
        assert_eq!(model[&z], Constant::Int(0));
    }

    #[test]
    fn test_parse_model_missing_variable_omitted() {
        let x = Variable::int("x");
        let w = Variable::int("w");
        let output = "(model (define-fun x () Int 7))";
        let model = parse_model(output, &names(&[&x, &w])).unwrap();
        assert_eq!(model.len(), 1);
        assert!(!model.contains_key(&w));
    }

    #[test]
    fn test_parse_model_skips_functions() {
        let f = Variable::int("f");
        let output = "(model (define-fun f ((a Int)) Int a))";
        let model = parse_model(output, &names(&[&f])).unwrap();
        assert!(model.is_empty());
    }

    #[test]
    fn test_parse_model_real_forms() {
        let a = Variable::real("a");
        let b = Variable::real("b");
        let c = Variable::real("c");
        let output = "(model (define-fun a () Real (- 1.5)) (define-fun b () Real (/ 5.0 2.0)) (define-fun c () Real (- (/ 1.0 4.0))))";
        let model = parse_model(output, &names(&[&a, &b, &c])).unwrap();
        assert_eq!(model[&a], Constant::Real(-1.5));
        assert_eq!(model[&b], Constant::Real(2.5));
        assert_eq!(model[&c], Constant::Real(-0.25));
    }

    #[test]
    fn test_parse_model_quoted_name() {
        let v = Variable::int("a b");
        let output = "(model (define-fun |a b| () Int 3))";
        let model = parse_model(output, &names(&[&v])).unwrap();
        assert_eq!(model[&v], Constant::Int(3));
    }

    #[test]
    fn test_parse_model_integer_errors() {
        let x = Variable::int("x");
        let output = "(model (define-fun x () Int 99999999999999999999))";
        let err = parse_model(output, &names(&[&x])).unwrap_err();
        println!("err = {}", err);
        assert!(matches!(err, ParseError::Integer { ref name, .. } if name == "x"));

        let output = "(model (define-fun x () Int foo))";
        assert!(matches!(parse_model(output, &names(&[&x])), Err(ParseError::Integer { .. })));
    }

    #[test]
    fn test_parse_model_real_error() {
        let y = Variable::real("y");
        let output = "(model (define-fun y () Real (root-obj (+ (^ x 2) (- 2)) 1)))";
        let err = parse_model(output, &names(&[&y])).unwrap_err();
        assert!(matches!(err, ParseError::Real { .. }));
    }

    #[test]
    fn test_parse_model_unbalanced() {
        let x = Variable::int("x");
        let output = "(model (define-fun x () Int 1)";
        assert!(matches!(parse_model(output, &names(&[&x])), Err(ParseError::Unbalanced(_))));
    }

    #[test]
    fn test_parse_core() {
        let e1 = Expr::lt(Expr::var(Variable::int("x")), Expr::int(1));
        let e2 = Expr::gt(Expr::var(Variable::int("x")), Expr::int(5));
        let e3 = Expr::eq(Expr::var(Variable::int("y")), Expr::int(0));
        let labels: HashMap<String, Expr> = [
            ("label1".to_string(), e1.clone()),
            ("label2".to_string(), e2.clone()),
            ("label3".to_string(), e3),
        ]
        .into_iter()
        .collect();
        let core = parse_core("(label1 label2)", &labels);
        assert_eq!(core, HashSet::from([e1.clone(), e2]));

        // Unknown labels are dropped.
        let core = parse_core("  (label1 solver!internal)\n", &labels);
        assert_eq!(core, HashSet::from([e1]));

        assert!(parse_core("()", &labels).is_empty());
    }
}
