use std::path::PathBuf;
use thiserror::Error;

/// A toolchain problem confined to a single test. The campaign records it and moves on.
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Unable to execute {tool}: {source}")]
    Launch {
        tool: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{tool} failed with:\n{stderr}")]
    Failed { tool: String, stderr: String },
    #[error("{tool} timed out after {secs} s")]
    TimedOut { tool: String, secs: u64 },
    #[error("{tool} could not be found in PATH")]
    Missing { tool: String },
    #[error("{what}: {source}")]
    Io {
        what: String,
        #[source]
        source: std::io::Error,
    },
}

impl ToolError {
    pub fn io(what: impl Into<String>, source: std::io::Error) -> Self {
        ToolError::Io {
            what: what.into(),
            source,
        }
    }
}

/// Anything that must stop the whole run before (or instead of) the campaign.
#[derive(Error, Debug)]
pub enum FatalError {
    #[error("Path does not exist: {}", .0.display())]
    SubmissionNotFound(PathBuf),
    #[error("Archive is not named according to submission guidelines: {0}")]
    BadArchiveName(String),
    #[error("Unpacking failed with:\n{0}")]
    Unpack(String),
    #[error("Submission lacks directory: \"{0}\"")]
    MissingDirectory(&'static str),
    #[error("Submission lacks Makefile in root")]
    MissingBuildFile,
    #[error("make failed with:\n{0}")]
    Build(String),
    #[error("Build did not produce the executable \"{0}\"")]
    MissingExecutable(String),
    #[error("The file \"{0}\" is not executable")]
    NotExecutable(String),
    #[error("\"{0}\" is missing from \"lib\"")]
    MissingRuntime(&'static str),
    #[error("Could not assemble the runtime: {0}")]
    RuntimeAssembly(#[source] ToolError),
    #[error("Not a valid extension: {0}")]
    UnknownExtension(String),
    #[error("Test directory is missing: {}", .0.display())]
    MissingCorpus(PathBuf),
    #[error("Invalid toolchain file {}: {message}", .path.display())]
    Config { path: PathBuf, message: String },
    #[error(transparent)]
    Tool(#[from] ToolError),
    #[error("{what}: {source}")]
    Io {
        what: String,
        #[source]
        source: std::io::Error,
    },
}

impl FatalError {
    pub fn io(what: impl Into<String>, source: std::io::Error) -> Self {
        FatalError::Io {
            what: what.into(),
            source,
        }
    }
}
