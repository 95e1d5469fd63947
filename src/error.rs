use std::path::PathBuf;
use thiserror::Error;

pub type TbResult<T = ()> = Result<T, TbError>;

/// Everything that can end a scenario. None of these are retried.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TbError {
    #[error("value {value} not representable in {width} bit {mode}")]
    Range {
        value: i128,
        width: u32,
        mode: &'static str,
    },

    #[error("scoreboard '{interface}': {}", describe_mismatches(.mismatches))]
    Mismatch {
        interface: String,
        mismatches: Vec<MismatchEntry>,
    },

    #[error("scoreboard '{interface}': expected {expected} transactions, observed {observed}")]
    CountImbalance {
        interface: String,
        expected: usize,
        observed: usize,
    },

    #[error("test '{test}' exceeded its budget of {budget}")]
    Timeout { test: String, budget: String },

    #[error("streaming engine failed ({stage}): {reason}")]
    Invocation { stage: String, reason: String },

    #[error("{left} and {right} differ at index {index}: {left_value} != {right_value}")]
    CrossEngineMismatch {
        left: &'static str,
        right: &'static str,
        index: usize,
        left_value: f32,
        right_value: f32,
    },

    #[error("signal error: {0}")]
    Signal(String),

    #[error("i/o error on {path}: {reason}")]
    Io { path: PathBuf, reason: String },

    #[error("simulation ended before test '{0}' completed")]
    Aborted(String),

    #[error("{0}")]
    Failed(String),
}

impl TbError {
    pub(crate) fn io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        TbError::Io {
            path: path.into(),
            reason: err.to_string(),
        }
    }

    /// Short name used in the summary table and the junit report.
    pub fn kind(&self) -> &'static str {
        match self {
            TbError::Range { .. } => "RangeError",
            TbError::Mismatch { .. } => "MismatchError",
            TbError::CountImbalance { .. } => "CountImbalanceError",
            TbError::Timeout { .. } => "TimeoutError",
            TbError::Invocation { .. } => "InvocationError",
            TbError::CrossEngineMismatch { .. } => "CrossEngineMismatchError",
            TbError::Signal(_) => "SignalError",
            TbError::Io { .. } => "IoError",
            TbError::Aborted(_) => "Aborted",
            TbError::Failed(_) => "Failure",
        }
    }
}

fn describe_mismatches(mismatches: &[MismatchEntry]) -> String {
    match mismatches.first() {
        Some(first) => format!(
            "{} mismatch(es), first at #{}: {}",
            mismatches.len(),
            first.index,
            first
        ),
        None => "mismatch".to_string(),
    }
}

/// One scoreboard disagreement.
#[derive(Debug, Clone, PartialEq)]
pub struct MismatchEntry {
    pub index: usize,
    pub expected: String,
    pub observed: String,
    pub origin: Option<String>,
}

impl std::fmt::Display for MismatchEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "expected {}, observed {}", self.expected, self.observed)?;
        if let Some(origin) = &self.origin {
            write!(f, " (stimulus: {})", origin)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mismatch_message_names_first_entry() {
        let err = TbError::Mismatch {
            interface: "o_sum".to_string(),
            mismatches: vec![
                MismatchEntry {
                    index: 3,
                    expected: "5".to_string(),
                    observed: "4".to_string(),
                    origin: Some("2 + 3".to_string()),
                },
                MismatchEntry {
                    index: 7,
                    expected: "1".to_string(),
                    observed: "0".to_string(),
                    origin: None,
                },
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("2 mismatch(es)"));
        assert!(msg.contains("first at #3"));
        assert!(msg.contains("stimulus: 2 + 3"));
        assert_eq!(err.kind(), "MismatchError");
    }

    #[test]
    fn imbalance_message_reports_both_totals() {
        let err = TbError::CountImbalance {
            interface: "o_clk".to_string(),
            expected: 11,
            observed: 10,
        };
        assert_eq!(
            err.to_string(),
            "scoreboard 'o_clk': expected 11 transactions, observed 10"
        );
    }
}
