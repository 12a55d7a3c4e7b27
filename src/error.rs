use thiserror::Error;

#[derive(Error, Debug)]
pub enum MistralError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Payload decode error: {details}")]
    Decode { details: String },

    #[error("Handler #{num} error: {details}")]
    Handler { num: usize, details: String },

    #[error("Metric socket error: {details}")]
    Producer { details: String },

    #[error("HTTP server error: {details}")]
    Server { details: String },

    #[error("System error: {message}")]
    System { message: String },
}

impl MistralError {
    pub fn decode<S: Into<String>>(details: S) -> Self {
        Self::Decode {
            details: details.into(),
        }
    }

    pub fn handler<S: Into<String>>(num: usize, details: S) -> Self {
        Self::Handler {
            num,
            details: details.into(),
        }
    }

    pub fn producer<S: Into<String>>(details: S) -> Self {
        Self::Producer {
            details: details.into(),
        }
    }

    pub fn server<S: Into<String>>(details: S) -> Self {
        Self::Server {
            details: details.into(),
        }
    }

    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, MistralError>;
