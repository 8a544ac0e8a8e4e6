use std::sync::Arc;

use uprl_api::app::{build_app, AppServices};
use uprl_infra::{FactStore, InMemoryFactStore, PostgresFactStore};

#[tokio::main]
async fn main() {
    uprl_observability::init();

    let store: Arc<dyn FactStore> = match std::env::var("DATABASE_URL") {
        Ok(url) => {
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(10)
                .connect(&url)
                .await
                .expect("failed to connect to DATABASE_URL");
            let store = PostgresFactStore::new(pool);
            store
                .ensure_schema()
                .await
                .expect("failed to ensure fact store schema");
            tracing::info!("using Postgres fact store");
            Arc::new(store)
        }
        Err(_) => {
            tracing::warn!("DATABASE_URL not set; using in-memory fact store");
            Arc::new(InMemoryFactStore::new())
        }
    };

    let services = Arc::new(AppServices::new(store));
    let app = build_app(services);

    let bind = std::env::var("UPRL_BIND").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .unwrap_or_else(|e| panic!("failed to bind {bind}: {e}"));

    tracing::info!("listening on {}", bind);

    axum::serve(listener, app).await.expect("server error");
}
