//!A mod for the error types
use std::{
    error::Error,
    fmt::{Debug, Display, Formatter},
};

///A failed bus transaction. The error reported by the bus driver is kept as the `source`.
pub struct TransportError {
    pub message: String,
    source: Option<Box<dyn Error + Send + Sync + 'static>>,
}

impl TransportError {
    pub fn new<E>(message: &str, source: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        Self {
            message: message.to_string(),
            source: Some(Box::new(source)),
        }
    }

    pub fn from_string(message: String) -> Self {
        Self {
            message,
            source: None,
        }
    }

    ///The originating bus error, if one was captured.
    pub fn inner(&self) -> Option<&(dyn Error + Send + Sync + 'static)> {
        self.source.as_deref()
    }
}

impl Debug for TransportError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.source {
            Some(source) => f.write_fmt(format_args!(
                "TransportError: {} - Cause: {:?}",
                self.message, source
            )),
            None => f.write_fmt(format_args!("TransportError: {}", self.message)),
        }
    }
}

impl Display for TransportError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.source {
            Some(source) => f.write_fmt(format_args!("{}: {}", self.message, source)),
            None => f.write_str(&self.message),
        }
    }
}

impl Error for TransportError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source
            .as_deref()
            .map(|err| err as &(dyn Error + 'static))
    }
}

///Common error type for every driver operation.
pub enum PwmError {
    ///Invalid construction options.
    Configuration(String),
    ///A bus read or write failed.
    Transport(TransportError),
    ///A channel, tick value or frequency the chip cannot represent.
    InvalidArgument(String),
}

impl PwmError {
    pub fn configuration(msg: &str) -> Self {
        PwmError::Configuration(msg.to_string())
    }

    pub fn invalid_argument(msg: String) -> Self {
        PwmError::InvalidArgument(msg)
    }
}

impl Debug for PwmError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Configuration(message) => {
                f.write_fmt(format_args!("PwmError (configuration): {}", message))
            }
            Self::Transport(err) => f.write_fmt(format_args!("PwmError (transport): {:?}", err)),
            Self::InvalidArgument(message) => {
                f.write_fmt(format_args!("PwmError (invalid argument): {}", message))
            }
        }
    }
}

impl Display for PwmError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Configuration(message) => write!(f, "configuration error: {}", message),
            Self::Transport(err) => write!(f, "transport error: {}", err),
            Self::InvalidArgument(message) => write!(f, "invalid argument: {}", message),
        }
    }
}

impl Error for PwmError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Transport(err) => Some(err),
            _ => None,
        }
    }
}

impl From<TransportError> for PwmError {
    fn from(err: TransportError) -> Self {
        PwmError::Transport(err)
    }
}
