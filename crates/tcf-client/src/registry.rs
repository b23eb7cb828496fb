//! Read-only view of registered workers
//!
//! The registry itself is a collaborator behind the `WorkerRegistry` trait:
//! a JSON-RPC listener (`JrpcWorkerRegistry`) or a fixed in-process table
//! (`InMemoryWorkerRegistry`).  Either way the core only reads from it.
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
    data::{WorkerDetails, WorkerType},
    error::{RegistryError, TransportError},
    jrpc::{
        JrpcErrorCode, JrpcOutcome, Method, WorkerLookUpNextParams, WorkerLookUpParams,
        WorkerLookUpResult, WorkerRecord, WorkerRetrieveParams,
    },
    transport::{call, RequestIds, TransportChannel},
};
use async_trait::async_trait;
use log::{debug, warn};
use std::{
    collections::{BTreeMap, HashSet},
    sync::Arc,
};

/// Upper bound on the pages `WorkerRegistryView::lookup_all` will follow.
pub const MAX_LOOKUP_PAGES: usize = 256;

/// Capability filter for worker lookups.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkerQuery {
    pub worker_type: WorkerType,
    pub organization_id: Option<String>,
    pub application_type_id: Option<String>,
}

impl WorkerQuery {
    pub fn new(worker_type: WorkerType) -> Self {
        WorkerQuery {
            worker_type,
            organization_id: None,
            application_type_id: None,
        }
    }

    fn matches(&self, worker: &WorkerDetails) -> bool {
        worker.worker_type == self.worker_type
            && self
                .organization_id
                .as_ref()
                .map_or(true, |org| *org == worker.organization_id)
            && self
                .application_type_id
                .as_ref()
                .map_or(true, |app| worker.application_type_ids.contains(app))
    }

    fn to_params(&self) -> WorkerLookUpParams {
        WorkerLookUpParams {
            worker_type: self.worker_type,
            organization_id: self.organization_id.clone(),
            application_type_id: self.application_type_id.clone(),
        }
    }
}

/// One page of a capability lookup.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WorkerPage {
    pub total_count: u64,
    pub ids: Vec<String>,
    /// Continuation tag; `None` on the last page.
    pub lookup_tag: Option<String>,
}

impl From<WorkerLookUpResult> for WorkerPage {
    fn from(result: WorkerLookUpResult) -> Self {
        WorkerPage {
            total_count: result.total_count,
            ids: result.ids,
            lookup_tag: result.lookup_tag.filter(|tag| !tag.is_empty()),
        }
    }
}

/// A source of worker records.
#[async_trait]
pub trait WorkerRegistry: Send + Sync {
    async fn retrieve(&self, worker_id: &str) -> Result<WorkerDetails, RegistryError>;

    /// One page of ids matching `query`, continuing after `lookup_tag`.
    async fn lookup_page(
        &self,
        query: &WorkerQuery,
        lookup_tag: Option<&str>,
    ) -> Result<WorkerPage, RegistryError>;
}

#[derive(Clone)]
pub struct WorkerRegistryView {
    registry: Arc<dyn WorkerRegistry>,
}

impl WorkerRegistryView {
    pub fn new(registry: Arc<dyn WorkerRegistry>) -> Self {
        WorkerRegistryView { registry }
    }

    /// Fetch a worker, refusing records whose id is not derived from their
    /// verification key.
    pub async fn lookup(&self, worker_id: &str) -> Result<WorkerDetails, RegistryError> {
        let worker = self.registry.retrieve(worker_id).await?;
        if worker.worker_id != worker_id {
            return Err(RegistryError::IdentityMismatch {
                expected: worker_id.to_string(),
                received: worker.worker_id,
            });
        }
        if !worker.has_consistent_id() {
            warn!("registry returned worker {} with a foreign verification key", worker_id);
            return Err(RegistryError::IdentityMismatch {
                expected: WorkerDetails::derive_worker_id(&worker.verification_key),
                received: worker.worker_id,
            });
        }
        Ok(worker)
    }

    pub async fn lookup_by_capability(
        &self,
        worker_type: WorkerType,
        organization_id: Option<&str>,
        application_type_id: Option<&str>,
        lookup_tag: Option<&str>,
    ) -> Result<WorkerPage, RegistryError> {
        let query = WorkerQuery {
            worker_type,
            organization_id: organization_id.map(str::to_string),
            application_type_id: application_type_id.map(str::to_string),
        };
        self.registry.lookup_page(&query, lookup_tag).await
    }

    /// Follow continuation tags to the last page.  Pages are not a
    /// consistent snapshot: ids may be missed or repeated if the registry
    /// changes in between.
    pub async fn lookup_all(&self, query: &WorkerQuery) -> Result<Vec<String>, RegistryError> {
        let mut ids = Vec::new();
        let mut seen_tags = HashSet::new();
        let mut tag: Option<String> = None;
        for _ in 0..MAX_LOOKUP_PAGES {
            let page = self.registry.lookup_page(query, tag.as_deref()).await?;
            ids.extend(page.ids);
            match page.lookup_tag {
                Some(next) if seen_tags.insert(next.clone()) => tag = Some(next),
                Some(next) => {
                    warn!("registry repeated lookup tag {}, stopping", next);
                    return Ok(ids);
                }
                None => return Ok(ids),
            }
        }
        warn!("lookup stopped after {} pages", MAX_LOOKUP_PAGES);
        Ok(ids)
    }
}

////////////////////////////////////////////////////////////////////////////////
// JSON-RPC registry.
////////////////////////////////////////////////////////////////////////////////

pub struct JrpcWorkerRegistry {
    channel: Arc<dyn TransportChannel>,
    ids: RequestIds,
}

impl JrpcWorkerRegistry {
    pub fn new(channel: Arc<dyn TransportChannel>) -> Self {
        JrpcWorkerRegistry {
            channel,
            ids: RequestIds::default(),
        }
    }
}

fn registry_error(method: Method, code: JrpcErrorCode, message: String) -> RegistryError {
    RegistryError::Unavailable(format!("{:?} failed with code {}: {}", method, code, message))
}

#[async_trait]
impl WorkerRegistry for JrpcWorkerRegistry {
    async fn retrieve(&self, worker_id: &str) -> Result<WorkerDetails, RegistryError> {
        let params = WorkerRetrieveParams {
            worker_id: worker_id.to_string(),
        };
        let outcome: JrpcOutcome<WorkerRecord> =
            call(&*self.channel, Method::WorkerRetrieve, self.ids.next(), &params).await?;
        match outcome {
            JrpcOutcome::Result(record) => record.into_details(),
            JrpcOutcome::Error(error) if error.code == JrpcErrorCode::InvalidParameter => {
                debug!("WorkerRetrieve: {}", error.message);
                Err(RegistryError::NotFound(worker_id.to_string()))
            }
            JrpcOutcome::Error(error) => {
                Err(registry_error(Method::WorkerRetrieve, error.code, error.message))
            }
        }
    }

    async fn lookup_page(
        &self,
        query: &WorkerQuery,
        lookup_tag: Option<&str>,
    ) -> Result<WorkerPage, RegistryError> {
        let (method, outcome): (Method, Result<JrpcOutcome<WorkerLookUpResult>, TransportError>) =
            match lookup_tag {
                None => (
                    Method::WorkerLookUp,
                    call(&*self.channel, Method::WorkerLookUp, self.ids.next(), &query.to_params())
                        .await,
                ),
                Some(tag) => {
                    let params = WorkerLookUpNextParams {
                        query: query.to_params(),
                        lookup_tag: tag.to_string(),
                    };
                    (
                        Method::WorkerLookUpNext,
                        call(&*self.channel, Method::WorkerLookUpNext, self.ids.next(), &params)
                            .await,
                    )
                }
            };
        match outcome? {
            JrpcOutcome::Result(result) => Ok(result.into()),
            JrpcOutcome::Error(error) => Err(registry_error(method, error.code, error.message)),
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// In-process registry.
////////////////////////////////////////////////////////////////////////////////

/// A fixed set of workers, paged in `worker_id` order.  The lookup tag is
/// the last id of the previous page.
pub struct InMemoryWorkerRegistry {
    workers: BTreeMap<String, WorkerDetails>,
    page_size: usize,
}

impl InMemoryWorkerRegistry {
    pub fn new<I: IntoIterator<Item = WorkerDetails>>(workers: I, page_size: usize) -> Self {
        InMemoryWorkerRegistry {
            workers: workers
                .into_iter()
                .map(|worker| (worker.worker_id.clone(), worker))
                .collect(),
            page_size: page_size.max(1),
        }
    }
}

#[async_trait]
impl WorkerRegistry for InMemoryWorkerRegistry {
    async fn retrieve(&self, worker_id: &str) -> Result<WorkerDetails, RegistryError> {
        self.workers
            .get(worker_id)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(worker_id.to_string()))
    }

    async fn lookup_page(
        &self,
        query: &WorkerQuery,
        lookup_tag: Option<&str>,
    ) -> Result<WorkerPage, RegistryError> {
        let matching: Vec<&String> = self
            .workers
            .values()
            .filter(|worker| query.matches(worker))
            .map(|worker| &worker.worker_id)
            .collect();
        let remaining: Vec<&String> = matching
            .iter()
            .copied()
            .filter(|id| lookup_tag.map_or(true, |tag| id.as_str() > tag))
            .collect();
        let ids: Vec<String> = remaining
            .iter()
            .take(self.page_size)
            .map(|id| id.to_string())
            .collect();
        let lookup_tag = if remaining.len() > ids.len() {
            ids.last().cloned()
        } else {
            None
        };
        Ok(WorkerPage {
            total_count: matching.len() as u64,
            ids,
            lookup_tag,
        })
    }
}
