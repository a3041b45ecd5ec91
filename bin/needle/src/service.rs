//! NeedleService gRPC handlers

use needle_api::proto::needle_service_server::NeedleService;
use needle_api::proto::{
    DelegationTable, DeleteDentryByIdRequest, DeleteDentryByIdResponse,
    DeleteDentryByPrefixRequest, DeleteDentryByPrefixResponse, GetServiceRequest,
    GetServiceResponse, ListDelegationTablesRequest, ListDelegationTablesResponse,
    ListDentriesByDtabRequest, ListDentriesByDtabResponse, PutDentryRequest, PutDentryResponse,
    PutServiceRequest, PutServiceResponse, RouteToVersionRequest, RouteToVersionResponse,
};
use needle_core::{CoreError, Store, VersionRouter};
use std::future::Future;
use std::time::Instant;
use tonic::metadata::MetadataMap;
use tonic::{Request, Response, Status};
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

/// Metadata key callers may set to correlate their logs with ours
pub const REQUEST_ID_KEY: &str = "request_id";

/// NeedleApi serves the store and the version router over gRPC
#[derive(Clone)]
pub struct NeedleApi {
    store: Store,
    router: VersionRouter,
}

impl NeedleApi {
    pub fn new(store: Store, router: VersionRouter) -> Self {
        Self { store, router }
    }
}

/// Map a domain error to the status code clients see
pub fn status_from(err: CoreError) -> Status {
    let message = err.to_string();
    match err {
        CoreError::NotFound(_) | CoreError::InstanceNotFound { .. } => Status::not_found(message),
        CoreError::Conflict(_) => Status::already_exists(message),
        CoreError::InvalidArgument(_)
        | CoreError::AmbiguousInstance { .. }
        | CoreError::MissingAnnotation { .. }
        | CoreError::InvalidPriority(_) => Status::invalid_argument(message),
        _ => Status::internal(message),
    }
}

fn request_id(metadata: &MetadataMap) -> String {
    metadata
        .get(REQUEST_ID_KEY)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// Run one handler inside a span carrying the method and request id
async fn rpc<T, F>(method: &'static str, request_id: String, handler: F) -> Result<Response<T>, Status>
where
    F: Future<Output = Result<T, Status>>,
{
    let span = info_span!("rpc", method, request_id = %request_id);
    async move {
        info!("handling request");
        let started = Instant::now();
        let result = handler.await;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        match result {
            Ok(reply) => {
                info!(elapsed_ms, "request completed");
                Ok(Response::new(reply))
            }
            Err(status) => {
                warn!(
                    elapsed_ms,
                    code = ?status.code(),
                    message = status.message(),
                    "request failed"
                );
                Err(status)
            }
        }
    }
    .instrument(span)
    .await
}

fn required<T>(field: Option<T>, name: &str) -> Result<T, Status> {
    field.ok_or_else(|| Status::invalid_argument(format!("{} is required", name)))
}

#[tonic::async_trait]
impl NeedleService for NeedleApi {
    async fn put_service(
        &self,
        request: Request<PutServiceRequest>,
    ) -> Result<Response<PutServiceResponse>, Status> {
        let id = request_id(request.metadata());
        let message = request.into_inner();
        rpc("PutService", id, async move {
            let service = required(message.service, "service")?;
            let service = self
                .store
                .put_service(service.into())
                .await
                .map_err(status_from)?;
            Ok(PutServiceResponse {
                service: Some(service.into()),
            })
        })
        .await
    }

    async fn get_service(
        &self,
        request: Request<GetServiceRequest>,
    ) -> Result<Response<GetServiceResponse>, Status> {
        let id = request_id(request.metadata());
        let message = request.into_inner();
        rpc("GetService", id, async move {
            let service = self
                .store
                .get_service_by_logical_name(&message.logical_name)
                .await
                .map_err(status_from)?;
            Ok(GetServiceResponse {
                service: Some(service.into()),
            })
        })
        .await
    }

    async fn put_dentry(
        &self,
        request: Request<PutDentryRequest>,
    ) -> Result<Response<PutDentryResponse>, Status> {
        let id = request_id(request.metadata());
        let message = request.into_inner();
        rpc("PutDentry", id, async move {
            let dentry = required(message.dentry, "dentry")?;
            let dentry = self
                .store
                .put_dentry(dentry.into())
                .await
                .map_err(status_from)?;
            Ok(PutDentryResponse {
                dentry: Some(dentry.into()),
            })
        })
        .await
    }

    async fn delete_dentry_by_id(
        &self,
        request: Request<DeleteDentryByIdRequest>,
    ) -> Result<Response<DeleteDentryByIdResponse>, Status> {
        let id = request_id(request.metadata());
        let message = request.into_inner();
        rpc("DeleteDentryById", id, async move {
            let dentry_id = Uuid::parse_str(&message.id)
                .map_err(|e| Status::invalid_argument(format!("invalid dentry id: {}", e)))?;
            let affected = self
                .store
                .delete_dentry_by_id(dentry_id)
                .await
                .map_err(status_from)?;
            Ok(DeleteDentryByIdResponse {
                deleted: affected > 0,
            })
        })
        .await
    }

    async fn delete_dentry_by_prefix(
        &self,
        request: Request<DeleteDentryByPrefixRequest>,
    ) -> Result<Response<DeleteDentryByPrefixResponse>, Status> {
        let id = request_id(request.metadata());
        let message = request.into_inner();
        rpc("DeleteDentryByPrefix", id, async move {
            let affected = self
                .store
                .delete_dentry_by_prefix(&message.dtab, &message.prefix)
                .await
                .map_err(status_from)?;
            Ok(DeleteDentryByPrefixResponse {
                deleted: affected > 0,
            })
        })
        .await
    }

    async fn list_delegation_tables(
        &self,
        request: Request<ListDelegationTablesRequest>,
    ) -> Result<Response<ListDelegationTablesResponse>, Status> {
        let id = request_id(request.metadata());
        rpc("ListDelegationTables", id, async move {
            let tables = self
                .store
                .list_delegation_tables()
                .await
                .map_err(status_from)?;
            Ok(ListDelegationTablesResponse {
                delegation_tables: tables
                    .into_iter()
                    .map(|name| DelegationTable { name })
                    .collect(),
            })
        })
        .await
    }

    async fn list_dentries_by_dtab(
        &self,
        request: Request<ListDentriesByDtabRequest>,
    ) -> Result<Response<ListDentriesByDtabResponse>, Status> {
        let id = request_id(request.metadata());
        let message = request.into_inner();
        rpc("ListDentriesByDtab", id, async move {
            let dentries = self
                .store
                .list_dentries_by_dtab(&message.dtab)
                .await
                .map_err(status_from)?;
            Ok(ListDentriesByDtabResponse {
                dentries: dentries.into_iter().map(Into::into).collect(),
            })
        })
        .await
    }

    async fn route_to_version(
        &self,
        request: Request<RouteToVersionRequest>,
    ) -> Result<Response<RouteToVersionResponse>, Status> {
        let id = request_id(request.metadata());
        let message = request.into_inner();
        rpc("RouteToVersion", id, async move {
            let dentry = self
                .router
                .route_to_version(&message.logical_name, &message.version)
                .await
                .map_err(status_from)?;
            Ok(RouteToVersionResponse {
                dentry: Some(dentry.into()),
            })
        })
        .await
    }
}
