/// All error types that can occur while running an HTTP light sensor accessory.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A required configuration property was not set.
    #[error("property '{0}' is required")]
    MissingProperty(&'static str),

    /// A URL property could not be turned into a request descriptor.
    #[error("error occurred while parsing '{property}': {reason}")]
    InvalidUrl {
        property: &'static str,
        reason: String,
    },

    /// `minValue` is above `maxValue`.
    #[error("minValue {min} is greater than maxValue {max}")]
    InvalidBounds { min: f64, max: f64 },

    /// Failed to deserialize JSON data.
    #[error("failed to load json: {0}")]
    JsonLoad(serde_json::Error),

    /// The HTTP request failed before a response was received.
    ///
    /// The message is the executor's own message, unchanged.
    #[error("{0}")]
    Transport(Box<dyn std::error::Error + Send + Sync>),

    /// The server answered with something other than `200 OK`.
    #[error("Got http error code {0}")]
    HttpStatus(u16),

    /// The response body was not a number.
    #[error("could not parse sensor value from body {body:?}")]
    Parse { body: String },

    /// A notification body did not have the expected shape.
    #[error("invalid notification body: {0}")]
    InvalidNotification(String),

    /// Another accessory already registered this notification ID.
    #[error("notification id '{0}' is already registered")]
    NotificationIdTaken(String),

    /// No accessory registered this notification ID.
    #[error("no accessory registered for notification id '{0}'")]
    UnknownNotificationId(String),

    /// The notification password did not match the registered one.
    #[error("wrong password for notification id '{0}'")]
    NotificationUnauthorized(String),

    /// The accessory failed to initialize and only serves a stub.
    #[error("accessory '{name}' is disabled: {reason}")]
    Disabled { name: String, reason: String },
}

impl Error {
    /// Wrap an executor failure.
    pub fn transport<E>(err: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Error::Transport(err.into())
    }

    /// Create a new invalid URL error
    pub fn invalid_url(property: &'static str, reason: impl ToString) -> Self {
        Error::InvalidUrl {
            property,
            reason: reason.to_string(),
        }
    }

    /// Create a new disabled accessory error
    pub fn disabled(name: &str, reason: &Error) -> Self {
        Error::Disabled {
            name: name.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Whether this error came from the configuration rather than the network.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Error::MissingProperty(_)
                | Error::InvalidUrl { .. }
                | Error::InvalidBounds { .. }
                | Error::JsonLoad(_)
        )
    }
}

/// Hacky implementation of PartialEq for testing
#[cfg(test)]
impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        self.to_string() == other.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_keeps_message() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "connect ECONNREFUSED");
        assert_eq!(Error::transport(io).to_string(), "connect ECONNREFUSED");
    }

    #[test]
    fn test_http_status_mentions_code() {
        assert!(Error::HttpStatus(404).to_string().contains("404"));
    }

    #[test]
    fn test_is_config() {
        assert!(Error::MissingProperty("getUrl").is_config());
        assert!(Error::invalid_url("getUrl", "relative URL without a base").is_config());
        assert!(Error::InvalidBounds { min: 10.0, max: 1.0 }.is_config());
        assert!(!Error::HttpStatus(500).is_config());
    }
}
