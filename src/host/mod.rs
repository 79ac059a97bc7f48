//! Host process integration: the NDJSON command contract, a notification
//! surface that writes to the host, and the stdio bridge.

pub mod contract;
pub mod stdio;
pub mod surface;

pub use stdio::{run_bridge, run_stdio_bridge};
pub use surface::HostSurface;
