//! # factor-rs: factorized model counting and SMT answer extraction
//!
//! **`factor-rs`** is the solving core of a constraint-caching framework. It
//! covers two jobs the framework hands out to workers:
//!
//! - **Counting by factorization.** A formula is split into factors that share
//!   no variables, each factor is counted separately, and the counts are
//!   multiplied. The [`CountAggregator`][crate::aggregator::CountAggregator]
//!   issues the sub-tasks and combines their counts exactly once, even when
//!   completions arrive out of order, repeatedly, or from several threads.
//! - **Solving through an external solver.** The
//!   [`SolverProcess`][crate::solver::SolverProcess] drives an SMT-LIB solver
//!   process (Z3 by default) and turns its answer into a typed model or an
//!   unsat core over the caller's original expressions.
//!
//! Counts are exact: [`Count`][crate::aggregator::Count] is a
//! [`BigUint`][num_bigint::BigUint].
//!
//! ## Basic Usage
//!
//! ```rust
//! use factor_rs::expr::Expr;
//! use factor_rs::factor::factorize;
//! use factor_rs::types::Variable;
//!
//! let x = Expr::var(Variable::int("x"));
//! let y = Expr::var(Variable::int("y"));
//! let z = Expr::var(Variable::real("z"));
//!
//! // (x < y) && (z >= 0.5) && (y <= 10)
//! let f = Expr::conjunction([
//!     Expr::lt(x.clone(), y.clone()),
//!     Expr::ge(z, Expr::real(0.5)),
//!     Expr::le(y, Expr::int(10)),
//! ]);
//!
//! // `x` and `y` are linked, `z` stands alone.
//! let factors = factorize(&f, None);
//! assert_eq!(factors.len(), 2);
//! ```
//!
//! Solving requires a solver executable; see [`config`] for how it is located.
//!
//! ```no_run
//! use factor_rs::config::SolverConfig;
//! use factor_rs::expr::Expr;
//! use factor_rs::solver::{SolveResult, SolverProcess};
//! use factor_rs::types::Variable;
//!
//! let solver = SolverProcess::new(SolverConfig::default().with_path("/usr/bin/z3"));
//! let x = Variable::int("x");
//! let f = Expr::gt(Expr::var(x.clone()), Expr::int(3));
//! if let Some(SolveResult::Sat(model)) = solver.solve_expr(&f) {
//!     println!("x = {:?}", model.get(&x));
//! }
//! ```
//!
//! ## Core Components
//!
//! - **[`aggregator`]**: per-task factorization and exact product of sub-counts.
//! - **[`factor`]**: splitting a formula into independent factors.
//! - **[`solver`]**: the solver process adapter.
//! - **[`parse`]**: parsing of model and unsat core output.
//! - **[`smtlib`]**: building queries and their lookup tables.

pub mod aggregator;
pub mod config;
pub mod expr;
pub mod factor;
pub mod parse;
pub mod report;
pub mod smtlib;
pub mod solver;
pub mod task;
pub mod types;
