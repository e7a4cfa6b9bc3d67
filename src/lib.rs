//! Loopback streaming coordination for real-time multichannel biosignal
//! pipelines: a port registry for dynamic discovery, a one-shot metadata
//! publish/query channel, an N-subscriber broadcast transport, and the
//! producer/filter/consumer nodes that run on top of them.

pub mod broadcast;
pub mod buffer;
pub mod codec;
pub mod error;
pub mod filters;
pub mod metadata;
pub mod nodes;
pub mod ports;
pub mod registry;
pub mod source;
pub mod types;

pub use broadcast::{subscribe, BroadcastServer, ControlMessage};
pub use buffer::WindowBuffer;
pub use error::{Error, Result};
pub use filters::{apply_car, Filter, FilterCommand, HighPass, LowPass};
pub use metadata::{query_info, MetadataPublisher};
pub use nodes::{
    Consumer, ConsumerConfig, Producer, ProducerConfig, Transform, TransformConfig, ViewHandle,
    DEFAULT_HOST, DEFAULT_REGISTRY_PORT,
};
pub use ports::{find_free_ports, is_port_free};
pub use registry::{query_port, resolve_ports, PortRegistry};
pub use source::{create_source, parse_device, SignalSource, SourceConfig};
pub use types::{Chunk, SignalInfo, FILTERED_STREAM, INFO_STREAM, RAW_STREAM};
