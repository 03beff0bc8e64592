//! Error types for ClaimDesk core.

use std::{error::Error, fmt, io};

/// Error type for ClaimDesk core operations.
#[derive(Debug)]
pub enum ClaimDeskError {
    /// An underlying I/O error.
    Io(io::Error),
    /// Shipment data that cannot be audited meaningfully.
    InvalidShipment(String),
    /// A referenced entity does not exist.
    NotFound(String),
    /// A catch-all error with a message.
    Other(String),
}

impl fmt::Display for ClaimDeskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "io error: {err}"),
            Self::InvalidShipment(message) => write!(f, "invalid shipment: {message}"),
            Self::NotFound(message) => write!(f, "not found: {message}"),
            Self::Other(message) => write!(f, "{message}"),
        }
    }
}

impl Error for ClaimDeskError {}

impl From<io::Error> for ClaimDeskError {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

/// Convenience result type for ClaimDesk core.
pub type Result<T> = std::result::Result<T, ClaimDeskError>;

#[cfg(test)]
mod tests {
    use super::ClaimDeskError;
    use std::io;

    #[test]
    fn io_error_formats_message() {
        let error = ClaimDeskError::Io(io::Error::new(io::ErrorKind::Other, "boom"));
        assert_eq!(format!("{error}"), "io error: boom");
    }

    #[test]
    fn invalid_shipment_formats_message() {
        let error = ClaimDeskError::InvalidShipment("quoted rate must be positive".to_string());
        assert_eq!(
            format!("{error}"),
            "invalid shipment: quoted rate must be positive"
        );
    }

    #[test]
    fn not_found_and_other_format_messages() {
        let missing = ClaimDeskError::NotFound("case 7".to_string());
        assert_eq!(format!("{missing}"), "not found: case 7");
        let other = ClaimDeskError::Other("claimdesk failed".to_string());
        assert_eq!(format!("{other}"), "claimdesk failed");
    }

    #[test]
    fn from_io_error_maps_variant() {
        let error: ClaimDeskError = io::Error::new(io::ErrorKind::NotFound, "missing").into();
        match error {
            ClaimDeskError::Io(inner) => {
                assert_eq!(inner.kind(), io::ErrorKind::NotFound);
            }
            _ => panic!("expected Io variant"),
        }
    }
}
