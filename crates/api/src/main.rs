#[tokio::main]
async fn main() {
    freightdesk_observability::init();

    let app = freightdesk_api::app::build_app().await;

    let addr = std::env::var("FREIGHTDESK_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| panic!("failed to bind {addr}: {e}"));

    tracing::info!("listening on {}", listener.local_addr().unwrap());

    axum::serve(listener, app).await.unwrap();
}
