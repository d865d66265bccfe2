pub mod channel;
pub mod registry;

pub use channel::Channel;
pub use registry::{Endpoint, Registry, COORDINATOR};
