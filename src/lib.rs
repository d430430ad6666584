//! Consent coordination for installation applications tied to a physical
//! property.
//!
//! The crate decides whether an application may still request owner consent,
//! reconciles competing applications that share a property identifier once
//! one of them wins consent, and manages the signed expiring token embedded
//! in the consent email link. Application state itself lives in an external
//! Applications service; this crate only reads snapshots and issues commands
//! through the [`consent::ApplicationDirectory`] boundary.

pub mod config;
pub mod consent;
pub mod error;
pub mod telemetry;
