use std::sync::Arc;

use dropship_server::dispatch::transport::SuppaFtpConnector;
use dropship_server::notify::LogNotifier;
use dropship_server::{BackgroundTasks, Config, EngineStorage, ServerState, api, init_logger_with_file};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. 环境变量与配置
    let _ = dotenvy::dotenv();
    let config = Config::from_env();

    // 2. 日志
    init_logger_with_file(&config.log_level, config.log_json, config.log_dir.as_deref())?;
    tracing::info!(environment = %config.environment, "Dropship server starting...");

    // 3. 存储
    std::fs::create_dir_all(&config.work_dir)?;
    let storage = EngineStorage::open(config.database_path())?;

    // 4. 引擎与后台任务
    let (state, workers) = ServerState::new(
        config.clone(),
        storage,
        Arc::new(SuppaFtpConnector),
        Arc::new(LogNotifier),
    )?;
    let mut tasks = BackgroundTasks::new();
    state.start_background(workers, &mut tasks);
    tasks.log_summary();

    // 5. HTTP
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.http_port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, api::build_app(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down...");
        })
        .await?;

    tasks.shutdown().await;
    Ok(())
}
