use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChapterForgeError {
    #[error("cannot read {path}: {source}")]
    InputUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid input: {0}")]
    InputInvalid(String),

    #[error("{what} exceeds u32::MAX bytes ({size})")]
    Oversize { what: &'static str, size: u64 },

    #[error("cannot write {path}: {source}")]
    OutputUnwritable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("read incomplete: {0}")]
    ReadIncomplete(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ChapterForgeError>;
