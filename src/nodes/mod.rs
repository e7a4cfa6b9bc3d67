// Pipeline nodes: one independent process per role.
//
// Each node is an explicit struct owning its transport handles and a
// cancellation token; every long-running loop observes the token at each
// iteration boundary and releases its sockets on stop.

mod consumer;
mod producer;
mod transform;

pub use consumer::{Consumer, ConsumerConfig, ViewHandle};
pub use producer::{Producer, ProducerConfig};
pub use transform::{Transform, TransformConfig};

/// Loopback host every session runs on.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Discovery-service port agreed out-of-band.
pub const DEFAULT_REGISTRY_PORT: u16 = 25798;
