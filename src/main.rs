use inferd::application::context::AppContext;
use inferd::application::usecases::recover_queue::RecoverQueueUseCase;
use inferd::application::usecases::scheduler::SchedulerUseCase;
use inferd::application::usecases::worker_manager::WorkerManager;
use inferd::config;
use inferd::domain::runners::RunnerRegistryBuilder;
use inferd::domain::runners::builtin::register_builtin;
use inferd::infrastructure::db::postgres::PostgresDatabase;
use inferd::infrastructure::db::repositories::Repositories;
use inferd::infrastructure::notify::HttpNotifier;
use inferd::infrastructure::observability::{init_metrics, init_tracing};
use inferd::infrastructure::storage::LocalStorage;
use inferd::interface::http;
use inferd::interface::http::state::AppState;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() {
    // Step 1: Load configuration and install telemetry.
    let settings = config::load().expect("load config");
    init_tracing(&settings.observability);
    let metrics = init_metrics(&settings.observability);

    // Step 2: Pick the storage backend.
    let repos = match settings.db.url.as_deref() {
        Some(url) => {
            let db = PostgresDatabase::connect(url, settings.db.max_connections)
                .await
                .expect("connect database");
            db.migrate().await.expect("run migrations");
            Repositories::postgres(Arc::new(db))
        }
        None => Repositories::memory(),
    };
    info!(backend = repos.db.backend(), "storage_selected");

    // Step 3: Register runners and build the shared context.
    let mut registry = RunnerRegistryBuilder::new();
    register_builtin(&mut registry).expect("register builtin runners");
    let registry = registry.build();
    info!(job_types = ?registry.job_types(), "runners_registered");
    let notifier = HttpNotifier::new(std::time::Duration::from_millis(
        settings.notify.request_timeout_ms,
    ))
    .expect("build notifier");
    let ctx = Arc::new(AppContext::new(
        repos,
        registry,
        Arc::new(LocalStorage::new(settings.storage.root.clone())),
        Arc::new(notifier),
        &settings,
    ));

    // Step 4: Put persisted pending work back in the queue.
    RecoverQueueUseCase::execute(&ctx)
        .await
        .expect("recover queue");

    // Step 5: Start workers and the maintenance loop.
    let manager = WorkerManager::new(ctx.clone(), &settings.workers);
    manager.start().await;

    let (maintenance_tx, maintenance_rx) = tokio::sync::watch::channel(false);
    let maintenance_ctx = ctx.clone();
    let maintenance_interval =
        time::Duration::milliseconds(settings.maintenance.poll_interval_ms as i64);
    let batch_size = settings.maintenance.batch_size;
    let maintenance = tokio::spawn(async move {
        SchedulerUseCase::run_loop(
            &maintenance_ctx,
            maintenance_interval,
            batch_size,
            maintenance_rx,
        )
        .await;
    });

    // Step 6: Bind and serve until ctrl-c.
    let state = AppState {
        ctx,
        settings: settings.clone(),
        metrics,
    };
    let app = http::app(state);
    let bind_addr = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .expect("bind server");
    info!(addr = %bind_addr, "server_listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown_requested");
        })
        .await
        .expect("serve");

    // Step 7: Drain workers, then stop maintenance.
    manager.shutdown().await;
    let _ = maintenance_tx.send(true);
    let _ = maintenance.await;
    info!("shutdown_complete");
}
