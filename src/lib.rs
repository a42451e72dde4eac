//! Library crate for vpos-reset: discovers reachable self-checkout shares, reads their
//! `ResetVPOSData` flag and rewrites it with backup-before-write.
pub mod address;
pub mod clock;
pub mod config_store;
pub mod document;
pub mod engine;
pub mod error;
pub mod fs;
pub mod journal;
pub mod probe;
pub mod reset;
pub mod scanner;
pub mod server;
pub mod settings;
pub mod types;

pub use engine::Engine;
pub use error::{EngineError, StoreError};
pub use settings::Settings;
