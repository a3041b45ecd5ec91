//! gRPC server

use anyhow::{Context, Result};
use needle_api::proto::needle_service_server::NeedleServiceServer;
use std::net::SocketAddr;
use tokio_util::sync::CancellationToken;
use tonic::transport::Server;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::service::NeedleApi;

pub struct GrpcServer {
    api: NeedleApi,
}

impl GrpcServer {
    pub fn new(api: NeedleApi) -> Self {
        Self { api }
    }

    /// Serve until `shutdown` is cancelled, letting in-flight calls finish
    pub async fn start_with_shutdown(self, addr: SocketAddr, shutdown: CancellationToken) -> Result<()> {
        info!(%addr, "gRPC server listening");
        Server::builder()
            .layer(TraceLayer::new_for_grpc())
            .add_service(NeedleServiceServer::new(self.api))
            .serve_with_shutdown(addr, async move { shutdown.cancelled().await })
            .await
            .with_context(|| format!("gRPC server on {} failed", addr))?;
        info!("gRPC server stopped");
        Ok(())
    }
}
