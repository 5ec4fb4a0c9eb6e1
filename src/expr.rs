//! Immutable constraint expressions.
//!
//! Identity is structural: two expressions built the same way are equal and
//! hash the same, so expressions can key label tables and caches directly.
//! The [`Display`][std::fmt::Display] impl renders SMT-LIB syntax.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use crate::types::{Constant, Variable};

/// Relational operators.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum RelOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl RelOp {
    fn smtlib(self) -> &'static str {
        match self {
            RelOp::Eq => "=",
            RelOp::Ne => "distinct",
            RelOp::Lt => "<",
            RelOp::Le => "<=",
            RelOp::Gt => ">",
            RelOp::Ge => ">=",
        }
    }
}

/// Binary arithmetic operators.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
}

impl ArithOp {
    fn smtlib(self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum Expr {
    Const(Constant),
    Var(Variable),
    Not(Box<Expr>),
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Implies(Box<Expr>, Box<Expr>),
    Rel(RelOp, Box<Expr>, Box<Expr>),
    Arith(ArithOp, Box<Expr>, Box<Expr>),
    Neg(Box<Expr>),
}

impl Expr {
    pub fn tt() -> Self {
        Expr::Const(Constant::Bool(true))
    }

    pub fn ff() -> Self {
        Expr::Const(Constant::Bool(false))
    }

    pub fn int(value: i64) -> Self {
        Expr::Const(Constant::Int(value))
    }

    pub fn real(value: f64) -> Self {
        Expr::Const(Constant::Real(value))
    }

    pub fn var(variable: Variable) -> Self {
        Expr::Var(variable)
    }

    pub fn not(value: Self) -> Self {
        match value {
            Expr::Not(inner) => *inner,
            _ => Expr::Not(Box::new(value)),
        }
    }

    pub fn and(lhs: Self, rhs: Self) -> Self {
        Self::conjunction([lhs, rhs])
    }

    pub fn or(lhs: Self, rhs: Self) -> Self {
        Expr::Or(vec![lhs, rhs])
    }

    pub fn implies(lhs: Self, rhs: Self) -> Self {
        Expr::Implies(Box::new(lhs), Box::new(rhs))
    }

    /// Builds the conjunction of `parts`.
    ///
    /// An empty conjunction is `true`, and a single part is returned as is.
    pub fn conjunction(parts: impl IntoIterator<Item = Self>) -> Self {
        let mut parts: Vec<Self> = parts.into_iter().collect();
        match parts.len() {
            0 => Self::tt(),
            1 => parts.pop().unwrap_or_else(Self::tt),
            _ => Expr::And(parts),
        }
    }

    pub fn rel(op: RelOp, lhs: Self, rhs: Self) -> Self {
        Expr::Rel(op, Box::new(lhs), Box::new(rhs))
    }

    pub fn eq(lhs: Self, rhs: Self) -> Self {
        Self::rel(RelOp::Eq, lhs, rhs)
    }

    pub fn ne(lhs: Self, rhs: Self) -> Self {
        Self::rel(RelOp::Ne, lhs, rhs)
    }

    pub fn lt(lhs: Self, rhs: Self) -> Self {
        Self::rel(RelOp::Lt, lhs, rhs)
    }

    pub fn le(lhs: Self, rhs: Self) -> Self {
        Self::rel(RelOp::Le, lhs, rhs)
    }

    pub fn gt(lhs: Self, rhs: Self) -> Self {
        Self::rel(RelOp::Gt, lhs, rhs)
    }

    pub fn ge(lhs: Self, rhs: Self) -> Self {
        Self::rel(RelOp::Ge, lhs, rhs)
    }

    pub fn arith(op: ArithOp, lhs: Self, rhs: Self) -> Self {
        Expr::Arith(op, Box::new(lhs), Box::new(rhs))
    }

    pub fn add(lhs: Self, rhs: Self) -> Self {
        Self::arith(ArithOp::Add, lhs, rhs)
    }

    pub fn sub(lhs: Self, rhs: Self) -> Self {
        Self::arith(ArithOp::Sub, lhs, rhs)
    }

    pub fn mul(lhs: Self, rhs: Self) -> Self {
        Self::arith(ArithOp::Mul, lhs, rhs)
    }

    pub fn neg(value: Self) -> Self {
        Expr::Neg(Box::new(value))
    }
}

impl Expr {
    pub fn is_true(&self) -> bool {
        matches!(self, Expr::Const(Constant::Bool(true)))
    }

    pub fn is_false(&self) -> bool {
        matches!(self, Expr::Const(Constant::Bool(false)))
    }

    /// Returns the top-level conjuncts, flattening nested conjunctions.
    ///
    /// A non-conjunction is its own single conjunct. An empty conjunction has
    /// no conjuncts.
    pub fn conjuncts(&self) -> Vec<&Expr> {
        let mut result = Vec::new();
        let mut stack = vec![self];
        while let Some(expr) = stack.pop() {
            match expr {
                // Push in reverse so conjuncts come out left to right.
                Expr::And(parts) => stack.extend(parts.iter().rev()),
                _ => result.push(expr),
            }
        }
        result
    }

    /// Returns the set of free variables.
    pub fn free_variables(&self) -> BTreeSet<Variable> {
        let mut vars = BTreeSet::new();
        let mut stack = vec![self];
        while let Some(expr) = stack.pop() {
            match expr {
                Expr::Const(_) => {}
                Expr::Var(v) => {
                    vars.insert(v.clone());
                }
                Expr::Not(a) | Expr::Neg(a) => stack.push(a),
                Expr::And(parts) | Expr::Or(parts) => stack.extend(parts.iter()),
                Expr::Implies(a, b) | Expr::Rel(_, a, b) | Expr::Arith(_, a, b) => {
                    stack.push(a);
                    stack.push(b);
                }
            }
        }
        vars
    }
}

/// SMT-LIB rendering of an expression under a variable-to-symbol table.
///
/// Variables missing from the table render as their own symbol.
pub struct Rendered<'a> {
    expr: &'a Expr,
    symbols: Option<&'a HashMap<Variable, String>>,
}

impl Rendered<'_> {
    fn nested<'b>(&'b self, expr: &'b Expr) -> Rendered<'b> {
        Rendered {
            expr,
            symbols: self.symbols,
        }
    }

    fn write_nary(&self, f: &mut fmt::Formatter<'_>, op: &str, parts: &[Expr]) -> fmt::Result {
        write!(f, "({}", op)?;
        for part in parts {
            write!(f, " {}", self.nested(part))?;
        }
        write!(f, ")")
    }
}

impl fmt::Display for Rendered<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.expr {
            Expr::Const(c) => write!(f, "{}", c),
            Expr::Var(v) => match self.symbols.and_then(|s| s.get(v)) {
                Some(symbol) => f.write_str(symbol),
                None => write!(f, "{}", v),
            },
            Expr::Not(a) => write!(f, "(not {})", self.nested(a)),
            Expr::And(parts) if parts.is_empty() => write!(f, "true"),
            Expr::And(parts) => self.write_nary(f, "and", parts),
            Expr::Or(parts) if parts.is_empty() => write!(f, "false"),
            Expr::Or(parts) => self.write_nary(f, "or", parts),
            Expr::Implies(a, b) => write!(f, "(=> {} {})", self.nested(a), self.nested(b)),
            Expr::Rel(op, a, b) => write!(f, "({} {} {})", op.smtlib(), self.nested(a), self.nested(b)),
            Expr::Arith(op, a, b) => write!(f, "({} {} {})", op.smtlib(), self.nested(a), self.nested(b)),
            Expr::Neg(a) => write!(f, "(- {})", self.nested(a)),
        }
    }
}

impl Expr {
    /// Renders `self` with variables replaced by their entry in `symbols`.
    pub fn render_with<'a>(&'a self, symbols: &'a HashMap<Variable, String>) -> Rendered<'a> {
        Rendered {
            expr: self,
            symbols: Some(symbols),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered = Rendered {
            expr: self,
            symbols: None,
        };
        fmt::Display::fmt(&rendered, f)
    }
}

impl From<Variable> for Expr {
    fn from(variable: Variable) -> Self {
        Expr::Var(variable)
    }
}

impl From<Constant> for Expr {
    fn from(constant: Constant) -> Self {
        Expr::Const(constant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn x() -> Expr {
        Expr::var(Variable::int("x"))
    }

    fn y() -> Expr {
        Expr::var(Variable::real("y"))
    }

    #[test]
    fn test_structural_identity() {
        let a = Expr::lt(x(), Expr::int(3));
        let b = Expr::lt(x(), Expr::int(3));
        assert_eq!(a, b);
        assert_ne!(a, Expr::le(x(), Expr::int(3)));
    }

    #[test]
    fn test_double_negation() {
        let a = Expr::gt(x(), Expr::int(0));
        assert_eq!(Expr::not(Expr::not(a.clone())), a);
    }

    #[test]
    fn test_conjunction_shapes() {
        assert!(Expr::conjunction([]).is_true());
        let a = Expr::gt(x(), Expr::int(0));
        assert_eq!(Expr::conjunction([a.clone()]), a);
        assert!(matches!(Expr::and(a.clone(), a), Expr::And(_)));
    }

    #[test]
    fn test_conjuncts_flatten() {
        let a = Expr::gt(x(), Expr::int(0));
        let b = Expr::lt(x(), Expr::int(9));
        let c = Expr::ge(y(), Expr::real(1.5));
        let f = Expr::and(Expr::and(a.clone(), b.clone()), c.clone());
        assert_eq!(f.conjuncts(), vec![&a, &b, &c]);
        assert!(Expr::And(vec![]).conjuncts().is_empty());
    }

    #[test]
    fn test_free_variables() {
        let f = Expr::or(
            Expr::eq(Expr::add(x(), Expr::int(1)), Expr::int(2)),
            Expr::not(Expr::lt(y(), Expr::neg(Expr::real(0.5)))),
        );
        let vars: Vec<_> = f.free_variables().into_iter().collect();
        assert_eq!(vars, vec![Variable::int("x"), Variable::real("y")]);
        assert!(Expr::tt().free_variables().is_empty());
    }

    #[test]
    fn test_display_smtlib() {
        let f = Expr::and(
            Expr::ne(x(), Expr::int(-5)),
            Expr::implies(Expr::le(y(), Expr::real(2.0)), Expr::ff()),
        );
        assert_eq!(f.to_string(), "(and (distinct x (- 5)) (=> (<= y 2.0) false))");
    }

    #[test]
    fn test_render_with_symbols() {
        let f = Expr::or(Expr::gt(x(), Expr::int(0)), Expr::lt(Expr::neg(y()), Expr::real(1.5)));
        let symbols = HashMap::from([(Variable::real("y"), "y!1".to_string())]);
        assert_eq!(f.render_with(&symbols).to_string(), "(or (> x 0) (< (- y!1) 1.5))");
    }
}
