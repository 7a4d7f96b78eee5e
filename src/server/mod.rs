//! HTTP API 服务器
//!
//! 对外提供 OpenAI 兼容接口，请求转发到上游后端。

pub mod error;
pub mod handlers;
pub mod metadata;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::providers::{ChatBackend, CursorProvider};

pub use error::ProxyError;

/// 请求体大小上限
const MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

/// 应用状态
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub backend: Arc<dyn ChatBackend>,
}

impl AppState {
    pub fn new(config: Config, backend: Arc<dyn ChatBackend>) -> Self {
        Self {
            config: Arc::new(config),
            backend,
        }
    }
}

/// 构建路由
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/v1/chat/completions", post(handlers::chat_completions))
        .route("/health", get(handlers::health))
        .layer(axum::extract::DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// 启动服务器，收到 Ctrl+C 后优雅退出
pub async fn run(config: Config) -> anyhow::Result<()> {
    let addr = config.bind_addr();
    let provider = CursorProvider::new(config.upstream.clone())?;
    let state = AppState::new(config, Arc::new(provider));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("[SERVER] 监听地址: {}", addr);

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("[SERVER] 服务已停止");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("[SERVER] 无法监听退出信号: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("[SERVER] 收到退出信号");
}
