//! # Desk Events
//!
//! This crate defines the user-facing notification payloads that the trading
//! desk hands to presentation. Toasts are fire-and-forget: the desk emits them
//! and never waits on how, or whether, they are displayed.
//!
//! As a Layer 0 crate it has no workspace dependencies.

// Declare the modules that make up this crate.
pub mod messages;

// Re-export the core types to provide a clean public API.
pub use messages::{Toast, ToastVariant};
