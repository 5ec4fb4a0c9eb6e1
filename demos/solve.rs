use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use factor_rs::aggregator::CountAggregator;
use factor_rs::config::SolverConfig;
use factor_rs::expr::Expr;
use factor_rs::report::LogReporter;
use factor_rs::solver::{SolveResult, SolverProcess};
use factor_rs::task::Task;
use factor_rs::types::Variable;

#[derive(Debug, Parser)]
#[command(author, version)]
struct Cli {
    /// Solver executable.
    #[arg(long, value_name = "PATH")]
    solver: Option<PathBuf>,

    /// Solver arguments (whitespace-separated).
    #[arg(long, value_name = "ARGS", allow_hyphen_values = true)]
    args: Option<String>,

    /// Time limit per solver call, in milliseconds.
    #[arg(long, value_name = "INT")]
    timeout: Option<u64>,

    /// Make the sample formula unsatisfiable, to get an unsat core.
    #[arg(long)]
    unsat: bool,
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    simplelog::TermLogger::init(
        simplelog::LevelFilter::Info,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )?;

    let args = Cli::parse();
    println!("args = {:?}", args);

    let mut properties = HashMap::new();
    if let Some(path) = &args.solver {
        properties.insert(factor_rs::config::PATH_KEY.to_string(), path.display().to_string());
    }
    if let Some(solver_args) = &args.args {
        properties.insert(factor_rs::config::ARGS_KEY.to_string(), solver_args.clone());
    }
    let mut config = SolverConfig::from_properties(&properties)?;
    if let Some(ms) = args.timeout {
        config = config.with_timeout(Duration::from_millis(ms));
    }
    println!("config = {:?}", config);

    // (x < y) && (y <= 10) && (z >= 0.5) && (w != 3)
    let x = Variable::int("x");
    let y = Variable::int("y");
    let z = Variable::real("z");
    let w = Variable::int("w");
    let mut parts = vec![
        Expr::lt(Expr::var(x.clone()), Expr::var(y.clone())),
        Expr::le(Expr::var(y.clone()), Expr::int(10)),
        Expr::ge(Expr::var(z.clone()), Expr::real(0.5)),
        Expr::ne(Expr::var(w.clone()), Expr::int(3)),
    ];
    if args.unsat {
        parts.push(Expr::gt(Expr::var(x.clone()), Expr::int(10)));
    }
    let formula = Expr::conjunction(parts);
    println!("formula = {}", formula);

    let aggregator = CountAggregator::new();
    let task = Task::root("demo", formula.clone());
    let children = aggregator.request(&task);
    println!("Formula splits into {} factor(s):", children.len());
    for child in &children {
        println!("  - {}", child.expression());
    }

    let solver = SolverProcess::new(config);
    let time_solve = std::time::Instant::now();
    match solver.solve_expr(&formula) {
        Some(SolveResult::Sat(model)) => {
            println!("SAT in {:?}", time_solve.elapsed());
            for var in [&x, &y, &z, &w] {
                match model.get(var) {
                    Some(value) => println!("  {} = {}", var, value),
                    None => println!("  {} = (any)", var),
                }
            }
        }
        Some(SolveResult::Unsat(core)) => {
            println!("UNSAT in {:?}, core of size {}:", time_solve.elapsed(), core.len());
            for clause in &core {
                println!("  - {}", clause);
            }
        }
        None => println!("No answer from the solver (see log)"),
    }

    aggregator.report_to(&LogReporter);
    solver.report_to(&LogReporter);

    Ok(())
}
