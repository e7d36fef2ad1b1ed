#[derive(Debug)]
pub enum EngineError {
    /// A caller handed over something of the wrong shape (e.g. a JSON object
    /// where an array of records is required, or an unknown granularity).
    InvalidArgument(String),
    Json(serde_json::Error),
    Csv(csv::Error),
    Io(std::io::Error),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            EngineError::Json(err) => write!(f, "json: {err}"),
            EngineError::Csv(err) => write!(f, "csv: {err}"),
            EngineError::Io(err) => write!(f, "io: {err}"),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::InvalidArgument(_) => None,
            EngineError::Json(err) => Some(err),
            EngineError::Csv(err) => Some(err),
            EngineError::Io(err) => Some(err),
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Json(err)
    }
}

impl From<csv::Error> for EngineError {
    fn from(err: csv::Error) -> Self {
        EngineError::Csv(err)
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::Io(err)
    }
}
