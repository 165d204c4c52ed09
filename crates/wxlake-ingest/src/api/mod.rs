//! OpenWeather API client module
//!
//! HTTP client for the paginated history endpoints and the geocoding lookup.

pub mod client;
pub mod endpoints;
pub mod types;

pub use client::OpenWeatherClient;
pub use endpoints::Endpoint;
pub use types::*;
