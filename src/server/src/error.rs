/// Error type for server configuration errors
#[derive(Debug)]
pub enum ServerError {
    InvalidPort(String),
    IoError(std::io::Error),
    Coordinator(twopc::CoordinatorError),
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerError::InvalidPort(msg) => write!(f, "Invalid port: {}", msg),
            ServerError::IoError(e) => write!(f, "IO error: {}", e),
            ServerError::Coordinator(e) => write!(f, "Coordinator error: {}", e),
        }
    }
}

impl std::error::Error for ServerError {}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        ServerError::IoError(err)
    }
}

impl From<twopc::CoordinatorError> for ServerError {
    fn from(err: twopc::CoordinatorError) -> Self {
        ServerError::Coordinator(err)
    }
}
