//! Data Transfer Objects for controller/client communication
//!
//! This module contains DTOs used for communication between the controller
//! API and its consumers (client library, CLI).

pub mod instance;
pub mod schedule;
pub mod status;
pub mod task;
