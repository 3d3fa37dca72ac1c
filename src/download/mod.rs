//! Download pipeline.
//!
//! - `transfer` — one streamed file transfer with resume support
//! - `batch`    — the orchestrator that walks a query down to transfers

pub mod batch;
pub mod transfer;
