use std::sync::Arc;

use erdscope_core::adapter::PoolSettings;
use erdscope_core::connection::{ConnectionManager, ConnectionManagerConfig, sqlx_opener};
use erdscope_core::control::ErdControlPlane;
use erdscope_core::graph::BuildOptions;
use erdscope_core::render::{RenderConfig, RenderDispatch};
use erdscope_mcp::server::McpHttpServerConfig;

use crate::config::ErdscopeConfig;

pub fn build_control_plane(config: &ErdscopeConfig) -> ErdControlPlane {
    let pool = PoolSettings {
        max_connections: config.pool_max_connections,
        acquire_timeout: config.connect_timeout,
    };
    let connections = ConnectionManager::new(
        ConnectionManagerConfig::new(sqlx_opener(pool))
            .with_connect_timeout(config.connect_timeout),
    );

    let render = RenderDispatch::new(
        RenderConfig::new(config.render_backend.clone(), config.output_dir.clone())
            .with_timeout(config.render_timeout),
    );

    ErdControlPlane::new(Arc::new(connections), Arc::new(render))
        .with_build_options(BuildOptions::default().with_concurrency(config.concurrency))
}

pub fn http_config(config: &ErdscopeConfig) -> McpHttpServerConfig {
    McpHttpServerConfig::new(config.http_addr).with_stateful_mode(!config.http_stateless)
}
