use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("processing error in vertex `{vertex}` instance {task_number}: {message}")]
    Processing {
        vertex: String,
        task_number: u16,
        message: String,
    },

    /// observed by instances after the job-wide cancellation. never a failure cause
    #[error("cancelled")]
    Cancelled,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn connection<T: ToString>(msg: T) -> Self {
        Error::Connection(msg.to_string())
    }

    pub fn processing<V: ToString, M: ToString>(vertex: V, task_number: u16, message: M) -> Self {
        Error::Processing {
            vertex: vertex.to_string(),
            task_number,
            message: message.to_string(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        match self {
            Error::Cancelled => true,
            _ => false,
        }
    }

    pub fn is_validation(&self) -> bool {
        match self {
            Error::Validation(_) => true,
            _ => false,
        }
    }

    pub fn is_connection(&self) -> bool {
        match self {
            Error::Connection(_) => true,
            _ => false,
        }
    }

    pub fn is_processing(&self) -> bool {
        match self {
            Error::Processing { .. } => true,
            _ => false,
        }
    }
}

/// Malformed DAG. Always raised before any vertex instance starts.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("DAG is empty")]
    Empty,
    #[error("DAG has no source vertex")]
    SourceNotFound,
    #[error("duplicate vertex name `{0}`")]
    DuplicateVertexName(String),
    #[error("vertex `{0}` has parallelism 0")]
    ZeroParallelism(String),
    #[error("edge references a vertex not present in this DAG")]
    DanglingEdge,
    #[error("DAG would cycle at edge `{upstream}` -> `{downstream}`")]
    WouldCycle {
        upstream: String,
        downstream: String,
    },
    #[error("source vertex `{0}` must not have inbound edges")]
    SourceWithInput(String),
    #[error("sink vertex `{0}` must not have outbound edges")]
    SinkWithOutput(String),
    #[error("duplicate edge `{upstream}` -> `{downstream}`")]
    DuplicateEdge {
        upstream: String,
        downstream: String,
    },
    #[error("vertex `{0}` has no edge")]
    IsolatedVertex(String),
    #[error("vertex `{0}` is unreachable from any source vertex")]
    Unreachable(String),
    #[error(
        "forward edge `{upstream}` -> `{downstream}` requires equal parallelism, \
         found {upstream_parallelism} and {downstream_parallelism}"
    )]
    ForwardParallelismMismatch {
        upstream: String,
        downstream: String,
        upstream_parallelism: u16,
        downstream_parallelism: u16,
    },
}

#[cfg(test)]
mod tests {
    use crate::error::{Error, ValidationError};

    #[test]
    pub fn error_display_test() {
        let e = Error::from(ValidationError::DuplicateVertexName("map".to_string()));
        assert!(e.is_validation());
        assert_eq!(
            e.to_string(),
            "validation error: duplicate vertex name `map`"
        );

        let e = Error::processing("map", 1, "boom");
        assert!(e.is_processing());
        assert_eq!(
            e.to_string(),
            "processing error in vertex `map` instance 1: boom"
        );
    }
}
