use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    /// The audio sink could not be opened. Fatal at startup.
    SinkUnavailable(String),
    /// A single sink write failed. Logged and counted; playback continues.
    SinkWrite(String),
    /// Configuration or parameter JSON was rejected.
    InvalidConfig(String),
    /// The output device reported an error.
    Device(String),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::SinkUnavailable(msg) => write!(f, "Audio sink unavailable: {msg}"),
            EngineError::SinkWrite(msg) => write!(f, "Audio sink write failed: {msg}"),
            EngineError::InvalidConfig(msg) => write!(f, "Invalid configuration: {msg}"),
            EngineError::Device(msg) => write!(f, "Audio device error: {msg}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::InvalidConfig(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_failure() {
        let e = EngineError::SinkUnavailable("no device".into());
        assert_eq!(e.to_string(), "Audio sink unavailable: no device");
        let e = EngineError::InvalidConfig("chunk_frames must be > 0".into());
        assert!(e.to_string().contains("chunk_frames"));
    }

    #[test]
    fn json_errors_convert() {
        let err: EngineError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(err, EngineError::InvalidConfig(_)));
    }
}
