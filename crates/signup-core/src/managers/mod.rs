//! Core managers for signup bot state.
//!
//! These managers own resident state and its persistence without any
//! transport-specific dependencies. They are used by:
//! - the command layer (`crate::commands`)
//! - the polling daemon

pub mod reservation_store;

pub use reservation_store::{LoadOutcome, ReservationStore, StoreError, StoreOptions};
