use anyhow::Result;
use ano_engine::RepositoryRegistry;
use ano_server::AnonServer;
use std::sync::Arc;

pub async fn handle(registry: RepositoryRegistry, host: Option<String>, port: Option<u16>) -> Result<()> {
    let host = host.unwrap_or_else(|| registry.config().server.host.clone());
    let port = port.unwrap_or(registry.config().server.port);

    for id in registry.ids() {
        tracing::info!("Serving repository {}", id);
    }
    println!("Starting server on {}:{}", host, port);
    AnonServer::serve(Arc::new(registry), &host, port).await?;

    Ok(())
}
