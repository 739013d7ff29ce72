//! Core domain types
//!
//! This module contains the core domain structures used across Nimbus crates.
//! These types represent the fundamental business entities and are shared between
//! the controller (which owns and persists them) and the client/CLI (which display them).

pub mod instance;
pub mod log;
pub mod schedule;
pub mod task;
