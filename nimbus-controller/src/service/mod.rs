//! Service Module
//!
//! Lifecycle state machine, recurring scheduler and the control plane facade
//! exposed to the API layer.

pub mod control;
pub mod lifecycle;
pub mod scheduler;

pub use control::ControlPlane;
pub use lifecycle::LifecycleController;
pub use scheduler::Scheduler;
