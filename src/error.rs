use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("device unreachable: {device}: {reason}")]
    DeviceUnreachable { device: String, reason: String },

    #[error("device requires authentication (pair it with the OS Bluetooth stack first): {device}: {reason}")]
    AuthenticationRequired { device: String, reason: String },

    #[error("unsupported field: {device}: {field}: {reason}")]
    UnsupportedField {
        device: String,
        field: &'static str,
        reason: String,
    },

    #[error("invalid reading discarded: {device}: {reason}")]
    InvalidReading { device: String, reason: String },

    #[error("write rejected by time-series store: {reason}")]
    WriteRejected { reason: String },
}

impl IngestError {
    /// Only `UnsupportedField` is recovered locally by dropping the field.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, IngestError::UnsupportedField { .. })
    }

    pub fn unreachable(device: impl Into<String>, reason: impl ToString) -> Self {
        IngestError::DeviceUnreachable {
            device: device.into(),
            reason: reason.to_string(),
        }
    }

    pub fn authentication_required(device: impl Into<String>, reason: impl ToString) -> Self {
        IngestError::AuthenticationRequired {
            device: device.into(),
            reason: reason.to_string(),
        }
    }

    pub fn invalid(device: impl Into<String>, reason: impl ToString) -> Self {
        IngestError::InvalidReading {
            device: device.into(),
            reason: reason.to_string(),
        }
    }

    pub fn write_rejected(reason: impl ToString) -> Self {
        IngestError::WriteRejected {
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_unsupported_field_is_recoverable() {
        let dropped = IngestError::UnsupportedField {
            device: "eve".to_string(),
            field: "voc_ppb",
            reason: "absent".to_string(),
        };
        assert!(!dropped.is_fatal());
        assert!(IngestError::unreachable("aranet4", "timed out").is_fatal());
        assert!(IngestError::authentication_required("eve", "401").is_fatal());
        assert!(IngestError::invalid("aranet4", "co2 out of range").is_fatal());
        assert!(IngestError::write_rejected("503").is_fatal());
    }

    #[test]
    fn messages_name_the_device() {
        let err = IngestError::unreachable("aranet4", "scan timed out after 30s");
        assert_eq!(
            err.to_string(),
            "device unreachable: aranet4: scan timed out after 30s"
        );
    }
}
