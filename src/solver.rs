//! External solver process adapter.
//!
//! Every [`SolverProcess::solve`] call runs one fresh solver process through a
//! two-phase exchange over stdin/stdout:
//!
//! 1. send the query and read the verdict line, `sat` or `unsat`;
//! 2. ask for the model (`sat`) or the unsat core (`unsat`), send `(exit)`,
//!    close stdin and read everything the solver prints until it exits.
//!
//! The process is killed and reaped when the call ends, whichever way it ends.
//! Calls are independent and may run concurrently from many threads; the only
//! shared state is the set of timing counters.

use std::collections::HashMap;
use std::io::{self, BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use log::{debug, error, warn};

use crate::config::SolverConfig;
use crate::expr::Expr;
use crate::parse::{parse_core, parse_model, Core, Model, ParseError};
use crate::report::Reporter;
use crate::smtlib::Query;
use crate::types::Variable;

#[derive(Debug, Clone, PartialEq)]
pub enum SolveResult {
    Sat(Model),
    Unsat(Core),
}

#[derive(Debug, thiserror::Error)]
pub enum SolverError {
    #[error("failed to start solver `{program}`")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("solver pipe failed")]
    Io(#[from] io::Error),
    #[error("expected `sat` or `unsat` from solver, got {0:?}")]
    Protocol(Option<String>),
    #[error("solver exceeded the time limit of {0:?}")]
    Timeout(Duration),
    #[error("unreadable solver output")]
    Parse(#[from] ParseError),
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum Verdict {
    Sat,
    Unsat,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Kills the solver when the deadline passes, unless cancelled first.
struct Watchdog {
    cancel: Option<mpsc::Sender<()>>,
    fired: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Watchdog {
    fn arm(child: Arc<Mutex<Child>>, timeout: Duration) -> Self {
        let (cancel, cancelled) = mpsc::channel::<()>();
        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();
        let handle = std::thread::spawn(move || {
            if let Err(RecvTimeoutError::Timeout) = cancelled.recv_timeout(timeout) {
                flag.store(true, Ordering::SeqCst);
                if let Err(e) = lock(&child).kill() {
                    debug!("watchdog: kill failed: {}", e);
                }
            }
        });
        Self {
            cancel: Some(cancel),
            fired,
            handle: Some(handle),
        }
    }

    fn fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    fn disarm(&mut self) {
        // Dropping the sender wakes the watchdog thread up.
        self.cancel.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// One running solver process.
///
/// Dropping the session closes both pipes, kills the process if it is still
/// alive, and reaps it.
struct Session {
    child: Arc<Mutex<Child>>,
    stdin: Option<ChildStdin>,
    stdout: BufReader<ChildStdout>,
    watchdog: Option<Watchdog>,
}

impl Session {
    fn spawn(config: &SolverConfig) -> Result<Self, SolverError> {
        let spawn_error = |source| SolverError::Spawn {
            program: config.path.display().to_string(),
            source,
        };
        let mut child = Command::new(&config.path)
            .args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(spawn_error)?;

        let pipes = (child.stdin.take(), child.stdout.take());
        let child = Arc::new(Mutex::new(child));
        let (Some(stdin), Some(stdout)) = pipes else {
            // Dropping the child handle here would leave the process running.
            let mut child = lock(&child);
            let _ = child.kill();
            let _ = child.wait();
            return Err(spawn_error(io::Error::new(io::ErrorKind::BrokenPipe, "missing stdio pipe")));
        };
        let watchdog = config.timeout.map(|t| Watchdog::arm(child.clone(), t));

        Ok(Self {
            child,
            stdin: Some(stdin),
            stdout: BufReader::new(stdout),
            watchdog,
        })
    }

    fn send(&mut self, text: &str) -> io::Result<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "solver stdin already closed"))?;
        stdin.write_all(text.as_bytes())?;
        stdin.write_all(b"\n")?;
        stdin.flush()
    }

    fn close_input(&mut self) {
        self.stdin.take();
    }

    /// Reads one line, without its line terminator. `None` at end of output.
    fn read_line(&mut self) -> io::Result<Option<String>> {
        let mut line = String::new();
        if self.stdout.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
    }

    /// Reads all remaining output, joining lines with single spaces.
    fn read_rest(&mut self) -> io::Result<String> {
        let mut lines = Vec::new();
        for line in (&mut self.stdout).lines() {
            lines.push(line?);
        }
        Ok(lines.join(" "))
    }

    fn timed_out(&self) -> bool {
        self.watchdog.as_ref().is_some_and(Watchdog::fired)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close_input();
        if let Some(mut watchdog) = self.watchdog.take() {
            watchdog.disarm();
        }
        let mut child = lock(&self.child);
        if let Err(e) = child.kill() {
            debug!("solver kill failed: {}", e);
        }
        match child.wait() {
            Ok(status) => debug!("solver exited with {}", status),
            Err(e) => warn!("failed to reap solver process: {}", e),
        }
    }
}

/// Snapshot of accumulated solver time.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct SolverStats {
    pub time: Duration,
    pub sat_time: Duration,
    pub unsat_time: Duration,
}

#[derive(Debug, Default)]
struct TimeCounters {
    total: AtomicU64,
    sat: AtomicU64,
    unsat: AtomicU64,
}

impl TimeCounters {
    fn record(&self, verdict: Verdict, elapsed: Duration) {
        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.total.fetch_add(nanos, Ordering::Relaxed);
        match verdict {
            Verdict::Sat => self.sat.fetch_add(nanos, Ordering::Relaxed),
            Verdict::Unsat => self.unsat.fetch_add(nanos, Ordering::Relaxed),
        };
    }
}

/// Adapter running queries through an external SMT solver process.
#[derive(Debug, Default)]
pub struct SolverProcess {
    config: SolverConfig,
    times: TimeCounters,
}

impl SolverProcess {
    pub fn new(config: SolverConfig) -> Self {
        Self {
            config,
            times: TimeCounters::default(),
        }
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Solves `query`, returning `None` when no answer could be obtained.
    ///
    /// Failures are logged and never propagate past this call.
    pub fn solve(
        &self,
        query: &str,
        variables: &HashMap<Variable, String>,
        labels: &HashMap<String, Expr>,
    ) -> Option<SolveResult> {
        match self.try_solve(query, variables, labels) {
            Ok(result) => Some(result),
            Err(e @ (SolverError::Protocol(_) | SolverError::Timeout(_))) => {
                warn!("solver gave no answer: {}", e);
                None
            }
            Err(e) => {
                match std::error::Error::source(&e) {
                    Some(cause) => error!("solver call failed: {}: {}", e, cause),
                    None => error!("solver call failed: {}", e),
                }
                None
            }
        }
    }

    /// Builds the query for `formula` and solves it.
    pub fn solve_expr(&self, formula: &Expr) -> Option<SolveResult> {
        let query = Query::new(formula);
        self.solve(&query.text, &query.variables, &query.labels)
    }

    /// Like [`solve`][Self::solve], but reports why no answer was obtained.
    pub fn try_solve(
        &self,
        query: &str,
        variables: &HashMap<Variable, String>,
        labels: &HashMap<String, Expr>,
    ) -> Result<SolveResult, SolverError> {
        let start = Instant::now();
        let (verdict, output) = self.exchange(query)?;
        let elapsed = start.elapsed();
        self.times.record(verdict, elapsed);
        debug!("solver answered {:?} in {:?}", verdict, elapsed);

        match verdict {
            Verdict::Sat => Ok(SolveResult::Sat(parse_model(&output, variables)?)),
            Verdict::Unsat => Ok(SolveResult::Unsat(parse_core(&output, labels))),
        }
    }

    /// Runs the protocol and returns the verdict with the raw artifact text.
    /// The process is gone by the time this returns.
    fn exchange(&self, query: &str) -> Result<(Verdict, String), SolverError> {
        let mut session = Session::spawn(&self.config)?;
        let timeout_error = || SolverError::Timeout(self.config.timeout.unwrap_or_default());

        session.send(query)?;
        let line = session.read_line()?;
        let verdict = match line.as_deref().map(str::trim) {
            Some("sat") => Some(Verdict::Sat),
            Some("unsat") => Some(Verdict::Unsat),
            _ => None,
        };
        let Some(verdict) = verdict else {
            if session.timed_out() {
                return Err(timeout_error());
            }
            return Err(SolverError::Protocol(line));
        };

        let request = match verdict {
            Verdict::Sat => "(get-model)",
            Verdict::Unsat => "(get-unsat-core)",
        };
        session.send(&format!("{}(exit)", request))?;
        session.close_input();

        let output = session.read_rest()?;
        if session.timed_out() {
            return Err(timeout_error());
        }
        drop(session);
        Ok((verdict, output))
    }

    pub fn report(&self) -> SolverStats {
        let load = |counter: &AtomicU64| Duration::from_nanos(counter.load(Ordering::Relaxed));
        SolverStats {
            time: load(&self.times.total),
            sat_time: load(&self.times.sat),
            unsat_time: load(&self.times.unsat),
        }
    }

    pub fn report_to(&self, reporter: &dyn Reporter) {
        let stats = self.report();
        let name = "SolverProcess";
        reporter.report(name, &format!("timeConsumption = {}", stats.time.as_millis()));
        reporter.report(name, &format!("satTimeConsumption = {}", stats.sat_time.as_millis()));
        reporter.report(name, &format!("unsatTimeConsumption = {}", stats.unsat_time.as_millis()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use test_log::test;

    #[test]
    fn test_spawn_failure_is_no_result() {
        let solver = SolverProcess::new(SolverConfig::default().with_path("/nonexistent/solver/binary"));
        let err = solver.try_solve("(check-sat)", &HashMap::new(), &HashMap::new()).unwrap_err();
        assert!(matches!(err, SolverError::Spawn { .. }), "unexpected error: {:?}", err);
        assert_eq!(solver.solve("(check-sat)", &HashMap::new(), &HashMap::new()), None);
        assert_eq!(solver.report(), SolverStats::default());
    }

    #[test]
    fn test_time_counters() {
        let times = TimeCounters::default();
        times.record(Verdict::Sat, Duration::from_millis(3));
        times.record(Verdict::Unsat, Duration::from_millis(5));
        times.record(Verdict::Sat, Duration::from_millis(2));
        let solver = SolverProcess {
            config: SolverConfig::default(),
            times,
        };
        let stats = solver.report();
        assert_eq!(stats.time, Duration::from_millis(10));
        assert_eq!(stats.sat_time, Duration::from_millis(5));
        assert_eq!(stats.unsat_time, Duration::from_millis(5));
    }
}
