//! Instance DTOs

use serde::{Deserialize, Serialize};

/// Request to allocate and provision a new instance
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateInstance {
    #[serde(default)]
    pub display_name: Option<String>,
}

/// Request to start tracking an instance that already exists on the provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterInstance {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

/// Request to change an instance's label
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenameInstance {
    pub display_name: String,
}

/// Application status and log tail fetched from a running instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppLog {
    pub instance_id: String,
    /// Whether the application process was found running
    pub process_running: bool,
    pub lines: usize,
    pub content: String,
}
