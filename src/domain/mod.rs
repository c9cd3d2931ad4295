pub mod dates;
pub mod error;
pub mod headers;
pub mod models;
pub mod normalizer;
pub mod ports;
