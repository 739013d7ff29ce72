//! Nimbus HTTP Client
//!
//! A typed HTTP client for the Nimbus controller API, shared by the CLI and
//! any other tooling that drives the controller.
//!
//! # Example
//!
//! ```no_run
//! use nimbus_client::ControllerClient;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = ControllerClient::new("http://localhost:8080");
//!
//!     let task_id = client.start_instance("i-0123456789abcdef0").await?;
//!     println!("Start accepted as task {}", task_id);
//!     Ok(())
//! }
//! ```

pub mod error;
mod instances;
mod schedules;
mod tasks;

// Re-export commonly used types
pub use error::{ClientError, Result};
pub use nimbus_core::dto::status::StatusSummary;

use reqwest::Client;
use serde::de::DeserializeOwned;

/// HTTP client for the Nimbus controller API
///
/// Methods are grouped by resource:
/// - Instance tracking and lifecycle (create, register, start, stop, rename, remove)
/// - Daily schedules and trigger diagnostics
/// - Active tasks, the operation log and the status summary
#[derive(Debug, Clone)]
pub struct ControllerClient {
    /// Base URL of the controller (e.g., "http://localhost:8080")
    base_url: String,
    client: Client,
}

impl ControllerClient {
    /// Create a new controller client
    ///
    /// # Example
    /// ```
    /// use nimbus_client::ControllerClient;
    ///
    /// let client = ControllerClient::new("http://localhost:8080");
    /// ```
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Create a new controller client with a custom HTTP client
    ///
    /// Useful for configuring timeouts, proxies or TLS settings.
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Get the base URL of the controller
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Check that the controller answers its health probe
    pub async fn health(&self) -> Result<()> {
        let response = self.client.get(self.url("/health")).send().await?;
        self.handle_empty_response(response).await
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Handle an API response and deserialize JSON
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            tracing::debug!("Controller answered {}: {}", status, error_text);
            return Err(ClientError::from_response(status.as_u16(), &error_text));
        }

        response
            .json()
            .await
            .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
    }

    /// Handle an API response that returns no content
    async fn handle_empty_response(&self, response: reqwest::Response) -> Result<()> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::from_response(status.as_u16(), &error_text));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = ControllerClient::new("http://localhost:8080");
        assert_eq!(client.base_url(), "http://localhost:8080");
    }

    #[test]
    fn test_client_trims_trailing_slash() {
        let client = ControllerClient::new("http://localhost:8080/");
        assert_eq!(client.base_url(), "http://localhost:8080");
        assert_eq!(client.url("/instances"), "http://localhost:8080/instances");
    }

    #[test]
    fn test_client_with_custom_client() {
        let client = ControllerClient::with_client("http://ctl:9000", Client::new());
        assert_eq!(client.base_url(), "http://ctl:9000");
    }
}
