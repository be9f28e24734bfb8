pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("worker spawn failed: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("fork failed: {0}")]
    Fork(#[source] std::io::Error),

    #[error("signal setup failed: {0}")]
    Signal(#[source] std::io::Error),

    #[error("a supervised run is already in progress in this process")]
    AlreadyRunning,

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("config error: {0}")]
    Config(String),
}

impl Error {
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        Error::InvalidArgument(msg.into())
    }

    pub fn resource_exhausted<S: Into<String>>(msg: S) -> Self {
        Error::ResourceExhausted(msg.into())
    }

    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::Config(msg.into())
    }

    pub fn unsupported<S: Into<String>>(msg: S) -> Self {
        Error::Unsupported(msg.into())
    }
}
