use thiserror::Error;

/// Everything that can go wrong between option parsing and rendering.
///
/// Passes never catch errors from lower layers; all of these bubble up to
/// [`run`](crate::run::run) and out to the caller.
#[derive(Debug, Error)]
pub enum Error {
    #[error("unknown output language `{0}`")]
    UnknownOutputLanguage(String),

    #[error("unknown option `{option}` for renderer `{renderer}`")]
    UnknownRendererOption { renderer: String, option: String },

    /// A builder or pass produced an illegal shape: empty union, dangling
    /// reference, forwarder past its lifetime, non-terminating fixed point.
    /// Signals a bug in the pipeline itself, not in the input.
    #[error("structural invariant violated: {0}")]
    StructuralInvariant(String),

    #[error("malformed input: {0}")]
    Input(String),

    #[error("render failed: {0}")]
    Render(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn structural(msg: impl Into<String>) -> Self {
        Error::StructuralInvariant(msg.into())
    }

    pub(crate) fn input(msg: impl Into<String>) -> Self {
        Error::Input(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
