//! Execution-facing types: code classification, requests, and outcomes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::RunnerError;
use crate::runtime::RuntimeKind;

/// A single unit of data flowing into or out of user code. Contents are
/// opaque to the runner; only the child-side shim inspects them, to
/// base64-encode binary payloads before they cross the result channel.
pub type Record = serde_json::Value;

/// Language of the submitted source. Decides the materialized file name
/// and nothing else; the runtimes execute both natively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodeType {
    JavaScript,
    TypeScript,
}

impl CodeType {
    pub fn extension(&self) -> &'static str {
        match self {
            CodeType::JavaScript => ".js",
            CodeType::TypeScript => ".ts",
        }
    }

    /// Name of the source file inside a code directory.
    pub fn file_name(&self) -> &'static str {
        match self {
            CodeType::JavaScript => "code.js",
            CodeType::TypeScript => "code.ts",
        }
    }
}

impl FromStr for CodeType {
    type Err = RunnerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "javascript" => Ok(CodeType::JavaScript),
            "typescript" => Ok(CodeType::TypeScript),
            other => Err(RunnerError::InvalidCodeType(other.to_string())),
        }
    }
}

impl fmt::Display for CodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodeType::JavaScript => write!(f, "javascript"),
            CodeType::TypeScript => write!(f, "typescript"),
        }
    }
}

/// One request to run a piece of user code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub runtime: RuntimeKind,
    pub code_type: CodeType,
    pub source: String,
    pub inputs: Vec<Record>,
    /// Isolates one caller's cached code from another's; becomes a path
    /// component under the cache root.
    pub caller_namespace: String,
    /// Unique per attempt; names the execution's log file.
    pub execution_id: String,
}

impl ExecutionRequest {
    pub fn new(
        runtime: RuntimeKind,
        code_type: CodeType,
        source: impl Into<String>,
        caller_namespace: impl Into<String>,
        execution_id: impl Into<String>,
    ) -> Self {
        Self {
            runtime,
            code_type,
            source: source.into(),
            inputs: Vec::new(),
            caller_namespace: caller_namespace.into(),
            execution_id: execution_id.into(),
        }
    }

    pub fn with_inputs(mut self, inputs: Vec<Record>) -> Self {
        self.inputs = inputs;
        self
    }

    /// Both identifiers become path components on disk; reject anything
    /// that could escape the cache layout.
    pub(crate) fn validate(&self) -> Result<(), RunnerError> {
        validate_path_component("caller_namespace", &self.caller_namespace)?;
        validate_path_component("execution_id", &self.execution_id)
    }
}

pub(crate) fn validate_path_component(
    field: &'static str,
    value: &str,
) -> Result<(), RunnerError> {
    let usable = !value.is_empty()
        && value != "."
        && value != ".."
        && !value.contains(['/', '\\', '\0']);
    if usable {
        Ok(())
    } else {
        Err(RunnerError::InvalidIdentifier {
            field,
            value: value.to_string(),
        })
    }
}

/// Terminal result of a supervised child process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExecutionOutcome {
    /// The child exited 0. `records` is whatever it emitted on the result
    /// channel, empty when it exited without writing to it.
    Success { records: Vec<Record> },
    /// The child exited nonzero, died on a signal, or overran its deadline.
    Failure(ChildFailure),
}

impl ExecutionOutcome {
    pub fn success(records: Vec<Record>) -> Self {
        ExecutionOutcome::Success { records }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionOutcome::Success { .. })
    }

    /// Converts the outcome for callers that treat child failure as an
    /// error instead of matching on the variants.
    pub fn into_result(self) -> Result<Vec<Record>, ChildFailure> {
        match self {
            ExecutionOutcome::Success { records } => Ok(records),
            ExecutionOutcome::Failure(failure) => Err(failure),
        }
    }
}

/// Diagnostics captured from a failed child.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildFailure {
    /// Process exit code; -1 when the child was killed by a signal.
    pub exit_code: i32,
    /// Terminating signal number, when there was one.
    pub signal: Option<i32>,
    /// Combined stdout and stderr read back from the execution's log file.
    pub log: String,
    /// True when the runner killed the child at the configured deadline.
    pub timed_out: bool,
}

impl fmt::Display for ChildFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.signal {
            Some(signal) => write!(f, "child killed by signal {}", signal)?,
            None => write!(f, "child exited with code {}", self.exit_code)?,
        }
        if self.timed_out {
            write!(f, " (timed out)")?;
        }
        Ok(())
    }
}
