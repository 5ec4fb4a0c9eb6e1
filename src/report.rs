//! Diagnostics reporting.
//!
//! Components never report on their own; the host asks for a report and
//! passes a [`Reporter`] that receives `(component, line)` pairs.

use log::info;

pub trait Reporter {
    fn report(&self, component: &str, line: &str);
}

impl<F> Reporter for F
where
    F: Fn(&str, &str),
{
    fn report(&self, component: &str, line: &str) {
        self(component, line)
    }
}

/// Writes every report line to the log at `info` level.
#[derive(Debug, Default, Copy, Clone)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn report(&self, component: &str, line: &str) {
        info!("{}: {}", component, line);
    }
}
