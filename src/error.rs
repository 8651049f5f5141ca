use thiserror::Error;

/// Main decoder error type
#[derive(Debug, Error)]
pub enum DecoderError {
    #[error("Setup error: {0}")]
    Setup(#[from] SetupError),

    #[error("Command error: {0}")]
    Command(#[from] CommandError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("File error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Decoding has not been started")]
    NotStarted,
}

impl DecoderError {
    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            DecoderError::Setup(err) => err.user_message(),
            DecoderError::Command(err) => err.user_message(),
            DecoderError::Config(err) => err.user_message(),
            DecoderError::Io(err) => Self::format_file_error(err),
            DecoderError::NotStarted => {
                "The decoder must be started before it can be waited on".to_string()
            }
        }
    }

    /// Check if this error allows the same decoder instance to keep going
    pub fn is_recoverable(&self) -> bool {
        match self {
            DecoderError::Setup(err) => err.is_recoverable(),
            DecoderError::Command(err) => err.is_recoverable(),
            DecoderError::Config(err) => err.is_recoverable(),
            DecoderError::Io(_) => false,
            DecoderError::NotStarted => true, // start() and retry
        }
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            DecoderError::Setup(SetupError::AlreadyStarted) => ErrorSeverity::Warning,
            DecoderError::Setup(_) => ErrorSeverity::Critical,
            DecoderError::Command(_) => ErrorSeverity::Error,
            DecoderError::Config(_) => ErrorSeverity::Warning,
            DecoderError::Io(_) => ErrorSeverity::Error,
            DecoderError::NotStarted => ErrorSeverity::Info,
        }
    }

    fn format_file_error(err: &std::io::Error) -> String {
        match err.kind() {
            std::io::ErrorKind::NotFound => "File or directory not found".to_string(),
            std::io::ErrorKind::PermissionDenied => "Permission denied - cannot access file".to_string(),
            std::io::ErrorKind::UnexpectedEof => "File appears to be truncated or corrupted".to_string(),
            _ => format!("File system error: {}", err),
        }
    }
}

/// Error severity levels for logging and user feedback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

impl ErrorSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorSeverity::Info => "INFO",
            ErrorSeverity::Warning => "WARNING",
            ErrorSeverity::Error => "ERROR",
            ErrorSeverity::Critical => "CRITICAL",
        }
    }

    pub fn log_level(&self) -> log::Level {
        match self {
            ErrorSeverity::Info => log::Level::Info,
            ErrorSeverity::Warning => log::Level::Warn,
            ErrorSeverity::Error => log::Level::Error,
            ErrorSeverity::Critical => log::Level::Error,
        }
    }
}

/// Unrecoverable failures while preparing a stream for decoding
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("Decoding was already started")]
    AlreadyStarted,

    #[error("Error opening file or stream: {0}")]
    OpenInput(BackendError),

    #[error("Error finding stream info: {0}")]
    NoStreamInfo(String),

    #[error("Couldn't find audio stream")]
    NoAudioStream,

    #[error("No decoder available for codec {codec}")]
    NoDecoder { codec: String },
}

impl SetupError {
    pub fn user_message(&self) -> String {
        match self {
            SetupError::AlreadyStarted => "Decoding is already running for this stream".to_string(),
            SetupError::OpenInput(err) => format!("Cannot open the audio input: {}", err),
            SetupError::NoStreamInfo(msg) => format!("The input could not be probed: {}", msg),
            SetupError::NoAudioStream => "The input does not contain an audio stream".to_string(),
            SetupError::NoDecoder { codec } => {
                format!("No decoder could be opened for codec '{}'", codec)
            }
        }
    }

    pub fn is_recoverable(&self) -> bool {
        // The decoder instance must be discarded and recreated for every fault except a double start.
        matches!(self, SetupError::AlreadyStarted)
    }
}

/// Signals reported by the demux/decode backend.
///
/// `Again` and `EndOfStream` are flow control, not failures.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Resource temporarily unavailable")]
    Again,

    #[error("End of stream")]
    EndOfStream,

    #[error("Out of memory")]
    OutOfMemory,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Decode failed: {0}")]
    Decode(String),

    #[error("Unsupported: {0}")]
    Unsupported(String),
}

impl BackendError {
    /// Whether this is a flow-control signal rather than a failure
    pub fn is_transient(&self) -> bool {
        matches!(self, BackendError::Again | BackendError::EndOfStream)
    }

    pub fn is_recoverable(&self) -> bool {
        match self {
            BackendError::Again | BackendError::EndOfStream => true,
            BackendError::OutOfMemory => true, // hardware gets disabled
            BackendError::Io(_) => false,
            BackendError::Decode(_) => true, // frame dropped
            BackendError::Unsupported(_) => false,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            BackendError::Again | BackendError::EndOfStream => ErrorSeverity::Info,
            BackendError::Decode(_) => ErrorSeverity::Warning,
            BackendError::OutOfMemory => ErrorSeverity::Error,
            BackendError::Io(_) | BackendError::Unsupported(_) => ErrorSeverity::Error,
        }
    }
}

/// Failures converting a raw frame into the output format
#[derive(Debug, Error, PartialEq)]
pub enum NormalizeError {
    #[error("Frame has no channels")]
    EmptyLayout,

    #[error("Sample count {samples} is not a multiple of {channels} channels")]
    SampleCountMismatch { samples: usize, channels: usize },

    #[error("Layout with {channels} channels cannot be remixed")]
    UnsupportedLayout { channels: usize },
}

impl NormalizeError {
    pub fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::Warning
    }
}

/// Command queue errors
#[derive(Debug, Error, PartialEq)]
pub enum CommandError {
    #[error("Decode thread is no longer running")]
    Disconnected,
}

impl CommandError {
    pub fn user_message(&self) -> String {
        match self {
            CommandError::Disconnected => {
                "The decoder stopped before the request could be processed".to_string()
            }
        }
    }

    pub fn is_recoverable(&self) -> bool {
        false
    }
}

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found")]
    ConfigDirNotFound,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] toml::ser::Error),

    #[error("Deserialization error: {0}")]
    DeserializationError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn user_message(&self) -> String {
        match self {
            ConfigError::ConfigDirNotFound => {
                "Cannot find or create configuration directory".to_string()
            }
            ConfigError::IoError(err) => {
                format!("Cannot access configuration file: {}", err)
            }
            ConfigError::SerializationError(_) => {
                "Failed to save configuration settings".to_string()
            }
            ConfigError::DeserializationError(_) => {
                "Configuration file is corrupted or has invalid format".to_string()
            }
            ConfigError::Invalid(msg) => format!("Configuration value rejected: {}", msg),
        }
    }

    pub fn is_recoverable(&self) -> bool {
        true // falls back to defaults
    }
}
