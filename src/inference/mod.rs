//! Remote inference: transport abstraction and the retrying client.

pub mod client;
pub mod transport;

pub use client::NavInferenceClient;
pub use transport::HttpTransport;
