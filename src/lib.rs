pub mod tracking;

pub use tracking::bridge::{MethodError, handle_method_call};
pub use tracking::config::{PluginOptions, TransmissionConfig};
pub use tracking::error::{TrackingError, TransportError};
pub use tracking::fanout::{LocationEvent, SampleSink};
pub use tracking::manager::TrackingManager;
pub use tracking::source::{LocationSource, ReplaySource};
pub use tracking::types::{HttpMethod, LocationSample, TrackingState};
