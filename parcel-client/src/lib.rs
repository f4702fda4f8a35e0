//! Parcel HTTP Client
//!
//! A small, type-safe client for the Parcel server API, used by the CLI.
//!
//! # Example
//!
//! ```no_run
//! use parcel_client::{ParcelClient, ResultFetch};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> parcel_client::Result<()> {
//!     let client = ParcelClient::new("http://localhost:8080");
//!
//!     let submitted = client.submit_bytes("a.txt", b"hello".to_vec()).await?;
//!     client
//!         .wait_for_completion(submitted.job_id, Duration::from_millis(500), Duration::from_secs(60))
//!         .await?;
//!
//!     if let ResultFetch::Ready { filename, bytes } = client.fetch_result(submitted.job_id).await? {
//!         println!("{}: {} bytes", filename, bytes.len());
//!     }
//!     Ok(())
//! }
//! ```

pub mod error;
mod jobs;

// Re-export commonly used types
pub use error::{ClientError, Result};
pub use jobs::ResultFetch;

use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;

/// HTTP client for the Parcel server API
#[derive(Debug, Clone)]
pub struct ParcelClient {
    /// Base URL of the server (e.g., "http://localhost:8080")
    base_url: String,
    /// HTTP client instance
    client: Client,
}

impl ParcelClient {
    /// Create a new client
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Create a new client with a custom HTTP client
    ///
    /// This allows you to configure timeouts, proxies, TLS settings, etc.
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Get the base URL of the server
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Check the status code and deserialize the JSON body
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let status = response.status();

        if !status.is_success() {
            return Err(Self::error_from(response).await);
        }

        response
            .json()
            .await
            .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
    }

    /// Convert an unsuccessful response into an error
    async fn error_from(response: reqwest::Response) -> ClientError {
        let status = response.status();
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());

        let message = serde_json::from_str::<serde_json::Value>(&error_text)
            .ok()
            .and_then(|body| body.get("error").and_then(|e| e.as_str()).map(String::from))
            .unwrap_or(error_text);

        if status == StatusCode::NOT_FOUND {
            ClientError::NotFound(message)
        } else {
            ClientError::api_error(status.as_u16(), message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = ParcelClient::new("http://localhost:8080");
        assert_eq!(client.base_url(), "http://localhost:8080");
    }

    #[test]
    fn test_client_trims_trailing_slash() {
        let client = ParcelClient::new("http://localhost:8080/");
        assert_eq!(client.base_url(), "http://localhost:8080");
    }

    #[test]
    fn test_client_with_custom_client() {
        let client = ParcelClient::with_client("http://localhost:8080", Client::new());
        assert_eq!(client.base_url(), "http://localhost:8080");
    }
}
