use {
    crate::{
        api::{
            self,
            ws,
            ServerState,
        },
        auction::service::Service as AuctionService,
        auth::TokenIssuer,
        config::RunOptions,
        lock::{
            AuctionLocker,
            MemoryLocker,
            RedisLocker,
        },
        metrics,
        user::service::Service as UserService,
    },
    anyhow::{
        anyhow,
        Result,
    },
    axum_prometheus::PrometheusMetricLayer,
    futures::Future,
    sqlx::{
        migrate,
        postgres::PgPoolOptions,
    },
    std::{
        sync::{
            atomic::{
                AtomicBool,
                AtomicUsize,
                Ordering,
            },
            Arc,
        },
        time::Duration,
    },
    tokio::{
        sync::broadcast,
        time::sleep,
    },
};

const NOTIFICATIONS_CHAN_LEN: usize = 1000;
const TASK_RESTART_DELAY: Duration = Duration::from_millis(500);

/// Keeps one long-running task alive: a task that returns an error is
/// restarted after a short pause, a clean return ends supervision (that is
/// the shutdown path), and a panic takes the whole process down with it.
async fn supervise<F, Fut>(name: &str, make_task: F)
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    loop {
        match tokio::spawn(make_task()).await {
            Ok(Ok(())) => break,
            Ok(Err(err)) => {
                tracing::error!(task = name, error = ?err, "Task failed, restarting");
                sleep(TASK_RESTART_DELAY).await;
            }
            Err(err) => {
                tracing::error!(task = name, error = ?err, "Task panicked, shutting down");
                SHOULD_EXIT.store(true, Ordering::Release);
                break;
            }
        }
    }
}

pub async fn start_server(run_options: RunOptions) -> Result<()> {
    tokio::spawn(async move {
        tracing::info!("Listening for shutdown signal...");
        tokio::signal::ctrl_c().await.unwrap();
        tracing::info!("Shutdown signal received, winding down...");
        SHOULD_EXIT.store(true, Ordering::Release);
    });

    let token_issuer = Arc::new(TokenIssuer::new(&run_options.auth)?);

    let pool = PgPoolOptions::new()
        .max_connections(run_options.server.database_max_connections)
        .connect(&run_options.server.database_url)
        .await
        .map_err(|err| anyhow!("Failed to connect to the database: {:?}", err))?;
    migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|err| anyhow!("Failed to run migrations: {:?}", err))?;

    let locker: Arc<dyn AuctionLocker> = if run_options.lock.distributed_lock_enabled {
        Arc::new(RedisLocker::new(&run_options.lock.redis_url).await?)
    } else {
        // Correct only while a single instance serves all bids.
        tracing::warn!("Distributed lock disabled, falling back to the in-process lock");
        Arc::new(MemoryLocker::new())
    };

    let (broadcast_sender, broadcast_receiver) =
        broadcast::channel(NOTIFICATIONS_CHAN_LEN);
    let auction_service = AuctionService::new(
        pool.clone(),
        locker.clone(),
        broadcast_sender.clone(),
    );
    let user_service = UserService::new(pool, token_issuer.clone());
    let (metric_layer, metrics_handle) = PrometheusMetricLayer::pair();

    let state = Arc::new(ServerState {
        auction_service: auction_service.clone(),
        user_service,
        token_issuer,
        ws: ws::WsState {
            subscriber_counter: AtomicUsize::new(0),
            connection_count: AtomicUsize::new(0),
            broadcast_sender,
            broadcast_receiver,
        },
        requester_ip_header_name: run_options.server.requester_ip_header_name.clone(),
    });

    tokio::join!(
        supervise("expiry loop", {
            let auction_service = auction_service.clone();
            move || {
                let auction_service = auction_service.clone();
                async move { auction_service.run_expiry_loop().await }
            }
        }),
        supervise("api server", || api::start_api(
            run_options.clone(),
            state.clone(),
            metric_layer.clone(),
        )),
        supervise("metrics server", || metrics::start_metrics(
            run_options.clone(),
            metrics_handle.clone(),
        )),
    );

    Ok(())
}

// Process-wide shutdown flag. The signal handler sets it exactly once and
// every loop polls it between ticks, so no task needs to be individually
// addressable to be told to stop.
pub(crate) static SHOULD_EXIT: AtomicBool = AtomicBool::new(false);
pub const EXIT_CHECK_INTERVAL: Duration = Duration::from_secs(1);
