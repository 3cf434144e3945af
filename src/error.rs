use std::path::PathBuf;
use std::process::ExitStatus;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, BuildError>;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("failed to read plan {path:?}: {source}")]
    PlanRead {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse plan {path:?}: {reason}")]
    PlanParse { path: PathBuf, reason: String },
    #[error("unknown variable `{{{name}}}` in {context:?}")]
    UnknownVariable { name: String, context: String },
    #[error("unbalanced brace in {context:?}")]
    UnbalancedBrace { context: String },
    #[error("malformed define {0:?}, expected KEY=VALUE")]
    MalformedDefine(String),
    #[error("[{index}] {description}: cannot spawn `{program}`: {source}")]
    Spawn {
        index: usize,
        description: String,
        program: String,
        source: std::io::Error,
    },
    #[error("[{index}] {description}: `{command}` exited with {status}")]
    StepFailed {
        index: usize,
        description: String,
        command: String,
        status: ExitStatus,
    },
    #[error("[{index}] {description}: declared output {output:?} was not produced")]
    MissingOutput {
        index: usize,
        description: String,
        output: PathBuf,
    },
    #[error("failed to write {path:?}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot determine the current directory: {0}")]
    CurrentDir(std::io::Error),
}
