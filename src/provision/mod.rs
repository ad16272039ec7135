//! VM provisioning
//!
//! - [`naming`] - Resource names derived from a prefix and an ordinal
//! - [`request`] - The provisioning request document
//! - [`clients`] - Control-plane operations the pipeline depends on
//! - [`pipeline`] - Ordered, fail-fast provisioning run

pub mod clients;
pub mod error;
pub mod naming;
pub mod pipeline;
pub mod request;

pub use clients::ResourceClients;
pub use error::ProvisionError;
pub use naming::ResourceNames;
pub use pipeline::{PipelineOutcome, Provisioned, ProvisioningPipeline, Step};
pub use request::ProvisioningRequest;
