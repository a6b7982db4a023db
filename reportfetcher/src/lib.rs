pub mod client;
pub mod envelope;
pub mod error;
pub mod params;

pub use crate::client::HttpUpstreamClient;
pub use crate::params::UpstreamConfig;
