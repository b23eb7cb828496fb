//! Requester-side client for confidential work orders
//!
//! Builds encrypted, signed work orders for attested workers, submits them
//! over a `TransportChannel`, polls them to a terminal status and releases
//! their results only once the worker's signature has been verified.
//!
//! ## Authors
//!
//! The Veracruz Development Team.
//!
//! ## Licensing and copyright notice
//!
//! See the `LICENSE.md` file in the Veracruz root directory for
//! information on licensing and copyright.

pub mod builder;
pub mod client;
pub mod config;
pub mod data;
pub mod error;
#[cfg(feature = "http")]
pub mod http;
pub mod jrpc;
pub mod registry;
pub mod state_machine;
pub mod transport;

#[cfg(test)]
mod test_support;

pub use builder::{request_hash, SessionSecrets, WorkOrderParams, WorkOrderRequest, WorkOrderRequestBuilder};
pub use client::{PendingWorkOrder, TcfClient};
pub use config::ClientConfig;
pub use data::{
    payload_digest, DataItem, ItemEncryption, WorkOrderStatus, WorkerDetails, WorkerStatus,
    WorkerType,
};
pub use error::{BuilderError, ConfigError, RegistryError, TransportError, WorkOrderError};
#[cfg(feature = "http")]
pub use http::{HttpJrpcChannel, RetryConfig};
pub use jrpc::{JrpcErrorCode, SignedResponse};
pub use registry::{
    InMemoryWorkerRegistry, JrpcWorkerRegistry, WorkerPage, WorkerQuery, WorkerRegistry,
    WorkerRegistryView,
};
pub use state_machine::{
    accept_response, poll_until_terminal, DecryptedItem, DecryptedResult, PollPolicy,
    SubmitOutcome, WorkOrderStateMachine,
};
pub use transport::TransportChannel;
