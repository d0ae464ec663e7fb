//! Re-exports common types for convenient usage.
//!
//! # Example
//! ```rust,no_run
//! use circuitpolicy_rs::prelude::*;
//!
//! let request = CircuitRequest::builder("api-books").retry(2).build();
//! let engine = CircuitEngine::builder().build();
//! # let _ = (request, engine);
//! ```

pub use crate::{
    Attempt, CircuitEngine, CircuitRequest, CircuitResponse, ContextSettingsProvider,
    ConfigSettingsProvider, Outcome, PolicySettings, SettingsProvider, State, StatusListener,
    StatusSnapshot,
};
