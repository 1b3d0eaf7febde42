//! Frame sources available to the host application.

mod serial;
mod simulated;

pub use serial::SerialTransport;
pub use simulated::demo_session;
