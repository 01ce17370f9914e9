//! Envelope types for protocol messages.

use rkyv::{Archive, Deserialize, Serialize};

use crate::types::CorrelationId;

/// A protocol envelope containing header metadata and a typed payload.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Envelope<T> {
    /// Envelope header with metadata.
    pub header: EnvelopeHeader,

    /// The message payload.
    pub payload: T,
}

impl<T> Envelope<T> {
    /// Creates a new envelope with the given payload.
    ///
    /// Uses the current protocol version and generates a new correlation ID.
    #[must_use]
    pub fn new(payload: T) -> Self {
        Self {
            header: EnvelopeHeader::new(),
            payload,
        }
    }

    /// Creates a new envelope with the given payload and deadline.
    #[must_use]
    pub fn with_deadline(payload: T, deadline_ns: u64) -> Self {
        Self {
            header: EnvelopeHeader::with_deadline(deadline_ns),
            payload,
        }
    }

    /// Creates a response envelope echoing the request's correlation ID.
    #[must_use]
    pub fn response_to(request_header: &EnvelopeHeader, payload: T) -> Self {
        Self {
            header: EnvelopeHeader::response_to(request_header),
            payload,
        }
    }
}

/// Header metadata for all protocol envelopes.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct EnvelopeHeader {
    /// Protocol version.
    ///
    /// Receivers should reject messages with unsupported versions.
    pub version: u16,

    /// Correlation ID for request/response matching.
    ///
    /// Responses must echo the correlation ID from the request.
    pub correlation_id: CorrelationId,

    /// Message timestamp in nanoseconds since Unix epoch.
    pub timestamp_ns: u64,

    /// Optional deadline in nanoseconds since Unix epoch.
    ///
    /// Receivers should reject requests past their deadline.
    pub deadline_ns: Option<u64>,
}

impl EnvelopeHeader {
    /// Creates a new header with default values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            version: crate::version::CURRENT,
            correlation_id: CorrelationId::new(),
            timestamp_ns: current_timestamp_ns(),
            deadline_ns: None,
        }
    }

    /// Creates a new header with a deadline.
    #[must_use]
    pub fn with_deadline(deadline_ns: u64) -> Self {
        Self {
            deadline_ns: Some(deadline_ns),
            ..Self::new()
        }
    }

    /// Creates a response header echoing the request's correlation ID.
    #[must_use]
    pub fn response_to(request: &Self) -> Self {
        Self {
            correlation_id: request.correlation_id,
            ..Self::new()
        }
    }

    /// Checks if this message version is compatible.
    #[must_use]
    pub const fn is_compatible(&self) -> bool {
        self.version >= crate::version::MIN_SUPPORTED && self.version <= crate::version::CURRENT
    }

    /// Checks if this message has exceeded its deadline.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.deadline_ns
            .is_some_and(|deadline| current_timestamp_ns() > deadline)
    }
}

impl Default for EnvelopeHeader {
    fn default() -> Self {
        Self::new()
    }
}

/// Returns the current timestamp in nanoseconds since Unix epoch.
#[allow(clippy::cast_possible_truncation)]
pub fn current_timestamp_ns() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_new() {
        let envelope = Envelope::new("test payload");
        assert_eq!(envelope.header.version, crate::version::CURRENT);
        assert!(envelope.header.deadline_ns.is_none());
    }

    #[test]
    fn envelope_with_deadline() {
        let deadline = current_timestamp_ns() + 1_000_000_000; // 1 second
        let envelope = Envelope::with_deadline("test", deadline);
        assert_eq!(envelope.header.deadline_ns, Some(deadline));
        assert!(!envelope.header.is_expired());
    }

    #[test]
    fn header_response_echoes_correlation_id() {
        let request = EnvelopeHeader::new();
        let response = EnvelopeHeader::response_to(&request);
        assert_eq!(request.correlation_id, response.correlation_id);
    }

    #[test]
    fn header_expiry() {
        let past = current_timestamp_ns().saturating_sub(1_000_000_000);
        let header = EnvelopeHeader {
            deadline_ns: Some(past),
            ..Default::default()
        };
        assert!(header.is_expired());

        let no_deadline = EnvelopeHeader::new();
        assert!(!no_deadline.is_expired());
    }
}
