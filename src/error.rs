// ⚠️ Error Types - what can go wrong between raw rows and a snapshot
//
// Row-level problems degrade (flag or reject one row). Only input that cannot
// be read at all is fatal to a reload.

use thiserror::Error;

/// Amount normalization failure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AmountError {
    #[error("malformed amount: {raw:?}")]
    MalformedAmount { raw: String },
}

/// Why a row never made it into the record set
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum RejectReason {
    MissingField(String),
    UnknownRegion(String),
    Unparseable(String),
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::MissingField(field) => write!(f, "missing required field '{}'", field),
            RejectReason::UnknownRegion(region) => write!(f, "unknown region '{}'", region),
            RejectReason::Unparseable(msg) => write!(f, "unparseable row: {}", msg),
        }
    }
}

/// Pipeline errors
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("record rejected at line {line}: {reason}")]
    RecordRejected { line: usize, reason: RejectReason },

    #[error("unreadable input: {0}")]
    UnreadableInput(String),
}

impl From<csv::Error> for PipelineError {
    fn from(err: csv::Error) -> Self {
        PipelineError::UnreadableInput(err.to_string())
    }
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("region list is empty")]
    NoRegions,

    #[error("duplicate rule id '{0}'")]
    DuplicateRule(String),

    #[error("rule '{0}' has an empty pattern")]
    EmptyPattern(String),
}

pub type PipelineResult<T> = Result<T, PipelineError>;
