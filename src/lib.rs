//! Network speed testing: a measurement client that estimates latency and
//! throughput, and the stateless byte source service it measures against.

pub mod client;
pub mod config;
pub mod errors;
pub mod geo;
pub mod measurements;
pub mod output;
pub mod random;
pub mod results;
pub mod server;
pub mod speedtest;
pub mod stats;
