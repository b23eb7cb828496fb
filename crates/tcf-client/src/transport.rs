//! The request/response channel work orders travel over
//!
//! ## Authors
//!
//! The Veracruz Development Team.
//!
//! ## Licensing and copyright notice
//!
//! See the `LICENSE.md` file in the Veracruz root directory for
//! information on licensing and copyright.

use crate::{
    error::TransportError,
    jrpc::{JrpcOutcome, JrpcRequest, JrpcResponse, Method, RequestId},
};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

/// A JSON-RPC request/response primitive.  Implementations own any retrying
/// of transient failures; an error returned here is final.
#[async_trait]
pub trait TransportChannel: Send + Sync {
    async fn send(&self, request: &JrpcRequest) -> Result<JrpcResponse, TransportError>;
}

#[async_trait]
impl<T: TransportChannel + ?Sized> TransportChannel for Arc<T> {
    async fn send(&self, request: &JrpcRequest) -> Result<JrpcResponse, TransportError> {
        (**self).send(request).await
    }
}

/// Source of request ids, unique per holder.
#[derive(Debug, Default)]
pub struct RequestIds(AtomicU64);

impl RequestIds {
    pub fn next(&self) -> RequestId {
        RequestId::Number(self.0.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

/// Send one typed call and decode its typed outcome.
pub async fn call<P, R>(
    channel: &dyn TransportChannel,
    method: Method,
    id: RequestId,
    params: &P,
) -> Result<JrpcOutcome<R>, TransportError>
where
    P: Serialize + Sync,
    R: DeserializeOwned,
{
    let request = JrpcRequest::new(method, id, params)?;
    let response = channel.send(&request).await?;
    if let Some(received) = &response.id {
        if *received != request.id {
            return Err(TransportError::MalformedResponse(format!(
                "response id {:?} does not answer request id {:?}",
                received, request.id
            )));
        }
    }
    response.into_outcome()
}
