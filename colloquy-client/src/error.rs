use crate::api::{CommentId, Error as ApiError};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("Comment thread was already disposed")]
    Disposed,

    #[error("Comment {0} is not a loaded root comment")]
    NotARoot(CommentId),
}

impl Error {
    /// Returns the transport error this error originates from, if any
    pub fn api(&self) -> Option<&ApiError> {
        match self {
            Error::Api(e) => Some(e),
            Error::Anyhow(e) => e.downcast_ref::<ApiError>(),
            _ => None,
        }
    }
}
