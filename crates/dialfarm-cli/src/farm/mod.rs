//! Device farm runtime: transport, resolution, sessions and discovery.

pub mod config;
pub mod discovery;
pub mod paths;
pub mod recorder;
pub mod resolver;
pub mod session;
pub mod transport;

#[cfg(test)]
pub mod test_support;

// Public API - used by main.rs
pub use discovery::DiscoveryLoop;
pub use recorder::CsvRecorder;
pub use resolver::CoordinateResolver;
pub use session::SessionDriver;
pub use transport::AdbTransport;
