// restcache-api: async transport boundary between the cache and a JSON REST API

pub mod client;
pub mod error;
pub mod http;
pub mod transport;

pub use client::{ApiResponse, FetchConfig, Method, RequestOptions, Transport};
pub use error::Error;
pub use http::HttpTransport;
pub use transport::{TlsMode, TransportConfig};
