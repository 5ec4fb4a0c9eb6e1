//! Typed variables and constants.
//!
//! Variables carry their declared sort, which decides how a solver's textual
//! value for them is interpreted. Constants are the values a model assigns.
use std::fmt;
use std::hash::{Hash, Hasher};

/// The declared sort of a variable.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Sort {
    Int,
    Real,
}

impl Sort {
    /// Returns the SMT-LIB name of the sort.
    pub fn smtlib_name(self) -> &'static str {
        match self {
            Sort::Int => "Int",
            Sort::Real => "Real",
        }
    }
}

impl fmt::Display for Sort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.smtlib_name())
    }
}

/// A typed variable.
///
/// Two variables are the same variable iff both name and sort match.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Variable {
    name: String,
    sort: Sort,
}

impl Variable {
    /// Creates a new variable with the given name and sort.
    ///
    /// # Panics
    ///
    /// Panics if `name` is empty or contains `|` or `\`, which no SMT-LIB
    /// symbol can hold.
    pub fn new(name: impl Into<String>, sort: Sort) -> Self {
        let name = name.into();
        assert!(!name.is_empty(), "Variable names must be non-empty");
        assert!(
            !name.contains(['|', '\\']),
            "Variable name `{}` contains `|` or `\\`",
            name
        );
        Variable { name, sort }
    }

    /// Creates an integer variable.
    pub fn int(name: impl Into<String>) -> Self {
        Self::new(name, Sort::Int)
    }

    /// Creates a real variable.
    pub fn real(name: impl Into<String>) -> Self {
        Self::new(name, Sort::Real)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sort(&self) -> Sort {
        self.sort
    }

    /// Returns the name as an SMT-LIB symbol, quoted with `|...|` when it is
    /// not a simple symbol.
    pub fn symbol(&self) -> String {
        let mut chars = self.name.chars();
        let simple = chars.next().is_some_and(|c| c.is_ascii_alphabetic() || "_.$".contains(c))
            && chars.all(|c| c.is_ascii_alphanumeric() || "_.$-!?".contains(c));
        if simple {
            self.name.clone()
        } else {
            format!("|{}|", self.name)
        }
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// A typed constant value.
///
/// Reals compare and hash by bit pattern, so `Constant` can key hash tables.
/// Under this equality `NaN == NaN` and `0.0 != -0.0`.
#[derive(Debug, Copy, Clone)]
pub enum Constant {
    Bool(bool),
    Int(i64),
    Real(f64),
}

impl Constant {
    pub fn sort(&self) -> Option<Sort> {
        match self {
            Constant::Bool(_) => None,
            Constant::Int(_) => Some(Sort::Int),
            Constant::Real(_) => Some(Sort::Real),
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match *self {
            Constant::Int(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_real(&self) -> Option<f64> {
        match *self {
            Constant::Real(v) => Some(v),
            _ => None,
        }
    }
}

impl PartialEq for Constant {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Constant::Bool(a), Constant::Bool(b)) => a == b,
            (Constant::Int(a), Constant::Int(b)) => a == b,
            (Constant::Real(a), Constant::Real(b)) => a.to_bits() == b.to_bits(),
            _ => false,
        }
    }
}

impl Eq for Constant {}

impl Hash for Constant {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Constant::Bool(v) => v.hash(state),
            Constant::Int(v) => v.hash(state),
            Constant::Real(v) => v.to_bits().hash(state),
        }
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Constant::Bool(v) => write!(f, "{}", v),
            Constant::Int(v) if v < 0 => write!(f, "(- {})", v.unsigned_abs()),
            Constant::Int(v) => write!(f, "{}", v),
            Constant::Real(v) if v < 0.0 => write!(f, "(- {})", Constant::Real(-v)),
            Constant::Real(v) if v.fract() == 0.0 && v.is_finite() => write!(f, "{:.1}", v),
            Constant::Real(v) => write!(f, "{}", v),
        }
    }
}

impl From<bool> for Constant {
    fn from(value: bool) -> Self {
        Constant::Bool(value)
    }
}

impl From<i64> for Constant {
    fn from(value: i64) -> Self {
        Constant::Int(value)
    }
}

impl From<f64> for Constant {
    fn from(value: f64) -> Self {
        Constant::Real(value)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_variable_creation() {
        let x = Variable::int("x");
        let y = Variable::real("y");
        assert_eq!(x.name(), "x");
        assert_eq!(x.sort(), Sort::Int);
        assert_eq!(y.sort(), Sort::Real);
        assert_ne!(Variable::int("x"), Variable::real("x"));
    }

    #[test]
    #[should_panic(expected = "Variable names must be non-empty")]
    fn test_variable_empty_name_panics() {
        Variable::int("");
    }

    #[test]
    #[should_panic(expected = "contains `|` or `\\`")]
    fn test_variable_bar_in_name_panics() {
        Variable::int("a|b");
    }

    #[test]
    #[should_panic(expected = "contains `|` or `\\`")]
    fn test_variable_backslash_in_name_panics() {
        Variable::real("a\\b");
    }

    #[test]
    fn test_variable_symbol_quoting() {
        assert_eq!(Variable::int("x_1").symbol(), "x_1");
        assert_eq!(Variable::int("a b").symbol(), "|a b|");
        assert_eq!(Variable::int("1x").symbol(), "|1x|");
    }

    #[test]
    fn test_constant_display() {
        assert_eq!(Constant::Int(5).to_string(), "5");
        assert_eq!(Constant::Int(-5).to_string(), "(- 5)");
        assert_eq!(Constant::Int(i64::MIN).to_string(), "(- 9223372036854775808)");
        assert_eq!(Constant::Real(2.5).to_string(), "2.5");
        assert_eq!(Constant::Real(2.0).to_string(), "2.0");
        assert_eq!(Constant::Real(-0.5).to_string(), "(- 0.5)");
        assert_eq!(Constant::Bool(true).to_string(), "true");
    }

    #[test]
    fn test_constant_hash_by_bits() {
        let mut set = HashSet::new();
        set.insert(Constant::Real(2.5));
        set.insert(Constant::Real(2.5));
        set.insert(Constant::Int(2));
        assert_eq!(set.len(), 2);
        assert_eq!(Constant::Real(f64::NAN), Constant::Real(f64::NAN));
    }
}
