pub mod config;
pub mod digest;
pub mod download;
pub mod error;
pub mod picture;

pub use config::{ConfigLayer, FetchConfig};
pub use download::{FetchOutcome, Fetcher};
pub use error::FetchError;
