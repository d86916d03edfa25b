//! Typed errors for the store and delivery layers.

use thiserror::Error;

/// Errors from the data store.
///
/// A store error during the due-set query is fatal for the whole batch;
/// anywhere else it is recorded on the row and the batch continues.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("store returned {status}: {body}")]
    Backend { status: u16, body: String },

    #[error("row not found in {table}")]
    NotFound { table: &'static str },

    #[error("failed to decode {table} row: {source}")]
    Decode {
        table: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors from an outbound delivery call (webhook or email provider).
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{endpoint} returned {status}: {body}")]
    Rejected {
        endpoint: &'static str,
        status: u16,
        body: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_display() {
        let err = StoreError::Backend {
            status: 503,
            body: "upstream unavailable".to_string(),
        };
        assert_eq!(err.to_string(), "store returned 503: upstream unavailable");
    }

    #[test]
    fn test_delivery_error_display() {
        let err = DeliveryError::Rejected {
            endpoint: "webhook",
            status: 500,
            body: "boom".to_string(),
        };
        assert_eq!(err.to_string(), "webhook returned 500: boom");
    }
}
