//! Forward CRD Definitions
//!
//! Kubernetes Custom Resource Definitions for the forward controller.

pub mod map;

pub use map::*;
