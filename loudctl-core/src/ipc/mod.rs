//! Types handed to presentation layers (console line, meter, JSON reports).
//!
//! All event types derive `serde::Serialize` + `serde::Deserialize` so a host
//! can forward them unchanged.

pub mod events;
pub mod slot;
