//! A form relay service in Rust.
//!
//! Two listeners run side by side in one process:
//!
//! - an HTTP listener that serves a few pages and static files, and relays
//!   every `POST`ed form body as one UDP datagram;
//! - a UDP ingest listener that stamps each received submission with its
//!   receipt time and appends it to a JSON record store on disk.
//!
//! The datagram is fire-and-forget: the HTTP client is redirected as soon as
//! the form has been decoded and sent. All writes to the store go through a
//! single writer task, so concurrent ingests never lose each other's records.

pub mod config;
pub mod connection;
pub mod form;
pub mod http;
pub mod ingest;
pub mod record_store;
pub mod relay;
pub mod router;
pub mod server;
pub mod stats;
pub mod store_writer;
pub mod submission;

pub use server::run;
