use std::fmt;

use chrono::Utc;
use log::info;

use super::individual::Individual;

/// Log target of machine-readable search events.
pub const EVENT_TARGET: &str = "pipevo::events";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventToken {
    EvaluationResult,
    EaRestart,
    EaRemoveInd,
    EaTerminated,
}

impl fmt::Display for EventToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let token = match self {
            EventToken::EvaluationResult => "EVALUATION_RESULT",
            EventToken::EaRestart => "EA_RESTART",
            EventToken::EaRemoveInd => "EA_REMOVE_IND",
            EventToken::EaTerminated => "EA_TERMINATED",
        };
        f.write_str(token)
    }
}

/// `TOKEN;timestamp;field;...` as a single line.
pub fn format_parseable_event(token: EventToken, fields: &[&dyn fmt::Display]) -> String {
    let mut line = format!("{};{}", token, Utc::now().format("%Y-%m-%d %H:%M:%S,%3f"));
    for field in fields {
        line.push(';');
        line.push_str(&field.to_string());
    }
    line
}

pub fn log_parseable_event(token: EventToken, fields: &[&dyn fmt::Display]) {
    info!(target: EVENT_TARGET, "{}", format_parseable_event(token, fields));
}

/// Hooks the search loop calls on its control path.
///
/// Errors returned by the `on_*` hooks are logged and swallowed by the loop,
/// except [`PipevoError::Cancelled`](crate::error::PipevoError::Cancelled),
/// which stops the search.
pub trait SearchObserver {
    fn on_evaluation(&mut self, _individual: &Individual) -> anyhow::Result<()> {
        Ok(())
    }

    /// Queried once per processed result with the loop's evaluation index.
    fn should_restart(&mut self, _evaluation_index: usize) -> bool {
        false
    }

    fn on_restart(&mut self, _evaluation_index: usize) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_elimination(&mut self, _individual: &Individual) -> anyhow::Result<()> {
        Ok(())
    }
}

pub struct NoopObserver;

impl SearchObserver for NoopObserver {}
