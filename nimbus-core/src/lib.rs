//! Nimbus Core
//!
//! Core types and abstractions for the Nimbus instance control plane.
//!
//! This crate contains:
//! - Domain types: Core business entities (Instance, Schedule, Task, etc.)
//! - DTOs: Data transfer objects for controller/client communication

pub mod domain;
pub mod dto;
