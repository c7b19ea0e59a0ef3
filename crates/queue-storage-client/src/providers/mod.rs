//! Queue service client implementations.
//!
//! `http` talks to a storage account (or emulator) over the REST API;
//! `memory` emulates the service in-process for tests and offline runs.

pub mod http;
pub mod memory;
mod xml;

pub use http::HttpQueueServiceClient;
pub use memory::InMemoryQueueService;
