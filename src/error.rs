use thiserror::Error;

use crate::models::OpenStatus;

/// Main engine error type
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("File error: {0}")]
    File(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl EngineError {
    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            EngineError::Decode(err) => err.user_message(),
            EngineError::File(err) => Self::format_file_error(err),
            EngineError::Config(err) => err.user_message(),
        }
    }

    /// Get suggested recovery actions for the error
    pub fn recovery_suggestions(&self) -> Vec<String> {
        match self {
            EngineError::Decode(err) => err.recovery_suggestions(),
            EngineError::File(err) => Self::file_error_suggestions(err),
            EngineError::Config(err) => err.recovery_suggestions(),
        }
    }

    pub fn is_recoverable(&self) -> bool {
        match self {
            EngineError::Decode(err) => err.is_recoverable(),
            EngineError::File(_) => false,
            EngineError::Config(err) => err.is_recoverable(),
        }
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            EngineError::Decode(DecodeError::SeekError(_)) => ErrorSeverity::Warning,
            EngineError::Decode(DecodeError::Closed) => ErrorSeverity::Info,
            EngineError::Decode(_) => ErrorSeverity::Error,
            EngineError::File(_) => ErrorSeverity::Error,
            EngineError::Config(_) => ErrorSeverity::Warning,
        }
    }

    fn format_file_error(err: &std::io::Error) -> String {
        match err.kind() {
            std::io::ErrorKind::NotFound => "File or directory not found".to_string(),
            std::io::ErrorKind::PermissionDenied => "Permission denied - cannot access file".to_string(),
            std::io::ErrorKind::UnexpectedEof => "File appears to be truncated".to_string(),
            _ => format!("File system error: {}", err),
        }
    }

    fn file_error_suggestions(err: &std::io::Error) -> Vec<String> {
        match err.kind() {
            std::io::ErrorKind::NotFound => vec![
                "Check that the file path is correct".to_string(),
                "Try using absolute path instead of relative path".to_string(),
            ],
            std::io::ErrorKind::PermissionDenied => vec![
                "Check file permissions".to_string(),
                "Ensure the file is not locked by another application".to_string(),
            ],
            _ => vec!["Try the operation again".to_string()],
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

/// Audio decoding errors
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Unsupported format: {format}")]
    UnsupportedFormat { format: String },

    #[error("Corrupted stream: {0}")]
    CorruptStream(String),

    #[error("Unsupported channel count: {channels}")]
    UnsupportedChannels { channels: u16 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Seek error: {0}")]
    SeekError(String),

    #[error("Decoder is closed")]
    Closed,
}

impl DecodeError {
    /// Status reported through the decoder contract's `open`
    pub fn open_status(&self) -> OpenStatus {
        match self {
            DecodeError::Io(_) => OpenStatus::FileError,
            _ => OpenStatus::BadFormat,
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            DecodeError::UnsupportedFormat { format } => {
                format!("Not a playable MPEG audio stream: {}", format)
            }
            DecodeError::CorruptStream(msg) => {
                format!("MPEG audio stream appears to be corrupted: {}", msg)
            }
            DecodeError::UnsupportedChannels { channels } => {
                format!("Streams with {} channels are not supported", channels)
            }
            DecodeError::Io(err) => format!("Cannot read audio data: {}", err),
            DecodeError::SeekError(msg) => format!("Cannot seek in this stream: {}", msg),
            DecodeError::Closed => "The decoder has already been closed".to_string(),
        }
    }

    pub fn recovery_suggestions(&self) -> Vec<String> {
        match self {
            DecodeError::UnsupportedFormat { .. } => vec![
                "Supported formats: MPEG-1/2/2.5 Layer I, II and III".to_string(),
                "Check if the file extension matches the actual format".to_string(),
            ],
            DecodeError::CorruptStream(_) => vec![
                "Try re-downloading or re-copying the file".to_string(),
                "Verify file integrity with a checksum if available".to_string(),
            ],
            DecodeError::UnsupportedChannels { .. } => vec![
                "Only mono and stereo streams can be decoded".to_string(),
            ],
            DecodeError::Io(_) => vec![
                "Check that the file is readable and not truncated".to_string(),
                "Check network connectivity for streamed sources".to_string(),
            ],
            DecodeError::SeekError(_) => vec![
                "Network streams cannot be seeked".to_string(),
                "Play from the beginning instead of seeking".to_string(),
            ],
            DecodeError::Closed => vec!["Open the file again".to_string()],
        }
    }

    pub fn is_recoverable(&self) -> bool {
        match self {
            DecodeError::UnsupportedFormat { .. } => false,
            DecodeError::CorruptStream(_) => false,
            DecodeError::UnsupportedChannels { .. } => false,
            DecodeError::Io(_) => false,
            DecodeError::SeekError(_) => true, // playback continues from the old position
            DecodeError::Closed => false,
        }
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
        }
    }

    pub fn recovery_suggestions(&self) -> Vec<String> {
        match self {
            ConfigError::ConfigDirNotFound => vec![
                "Check that you have write permissions to your home directory".to_string(),
                "Try creating the directory manually: ~/.config/mpeg-engine/".to_string(),
            ],
            ConfigError::IoError(_) => vec![
                "Check file permissions for the configuration directory".to_string(),
                "Ensure the disk is not full".to_string(),
            ],
            ConfigError::SerializationError(_) => vec![
                "Try resetting configuration to defaults".to_string(),
            ],
            ConfigError::DeserializationError(_) => vec![
                "Delete the configuration file to reset to defaults".to_string(),
                "Check the configuration file format manually".to_string(),
            ],
        }
    }

    pub fn is_recoverable(&self) -> bool {
        // defaults are always usable
        true
    }
}
