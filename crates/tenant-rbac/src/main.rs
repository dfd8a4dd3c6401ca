use clap::{Args, Parser, Subcommand};
use kube::api::Api;
use kube::runtime::{watcher, WatchStreamExt};
use kube::CustomResourceExt;
use std::sync::Arc;
use std::time::Duration;
use tenant_rbac_controller::{
    dispatch_role_binding_events, dispatch_tenant_events, pump, CacheReadinessGate,
    ControllerConfig, ConvergenceLock, Informer, KubeStore, OwnerTraceController,
    ResourceStore, TenantController,
};
use tenant_rbac_core::{management_label_selector, to_yaml, RoleBinding, Tenant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "tenant-rbac", about = "Tenant RBAC operator for Kubernetes")]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true, env = "TENANT_RBAC_LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch Tenants and managed RoleBindings and keep them converged
    Run(RunArgs),
    /// Reconcile every Tenant once and exit
    ReconcileAll,
    /// Print the Tenant CustomResourceDefinition as YAML
    Crd,
}

#[derive(Args)]
struct RunArgs {
    /// Times to wait for the watch caches before giving up
    #[arg(long, default_value_t = 3, env = "TENANT_RBAC_CACHE_SYNC_ATTEMPTS")]
    cache_sync_attempts: u32,
    /// Seconds to pause between cache sync attempts
    #[arg(long, default_value_t = 2, env = "TENANT_RBAC_CACHE_SYNC_BACKOFF_SECS")]
    cache_sync_backoff_secs: u64,
    /// Seconds a single cache sync attempt may take
    #[arg(long, default_value_t = 30, env = "TENANT_RBAC_CACHE_SYNC_TIMEOUT_SECS")]
    cache_sync_timeout_secs: u64,
    /// Seconds before a failed Tenant pass is retried
    #[arg(long, default_value_t = 10, env = "TENANT_RBAC_REQUEUE_AFTER_SECS")]
    requeue_after_secs: u64,
    /// Capacity of each event queue
    #[arg(long, default_value_t = 256, env = "TENANT_RBAC_QUEUE_CAPACITY")]
    queue_capacity: usize,
}

impl RunArgs {
    fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            cache_sync_attempts: self.cache_sync_attempts,
            cache_sync_backoff: Duration::from_secs(self.cache_sync_backoff_secs),
            cache_sync_timeout: Duration::from_secs(self.cache_sync_timeout_secs),
            requeue_after: Duration::from_secs(self.requeue_after_secs),
        }
    }
}

#[tokio::main]
async fn main() -> miette::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Commands::Run(args) => {
            run_controllers(args.controller_config(), args.queue_capacity.max(1)).await
        }
        Commands::ReconcileAll => run_reconcile_all().await,
        Commands::Crd => print_crd(),
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn kube_client() -> miette::Result<kube::Client> {
    kube::Client::try_default()
        .await
        .map_err(|e| miette::miette!("Failed to create Kubernetes client: {}", e))
}

/// Run both controllers until ctrl-c
async fn run_controllers(config: ControllerConfig, queue_capacity: usize) -> miette::Result<()> {
    info!("Starting tenant RBAC operator");

    let client = kube_client().await?;
    let store: Arc<dyn ResourceStore> = Arc::new(KubeStore::new(client.clone()));
    let lock = ConvergenceLock::new();
    let token = CancellationToken::new();

    // 1. Start the watchers; only managed role bindings are observed
    let tenant_informer = Informer::<Tenant>::new("tenants");
    let binding_informer = Informer::<RoleBinding>::new("rolebindings");
    let tenants_synced = tenant_informer.sync_flag();
    let bindings_synced = binding_informer.sync_flag();

    let (tenant_tx, tenant_rx) = mpsc::channel(queue_capacity);
    let (binding_tx, binding_rx) = mpsc::channel(queue_capacity);

    let tenant_stream = watcher(
        Api::<Tenant>::all(client.clone()),
        watcher::Config::default(),
    )
    .default_backoff();
    let binding_stream = watcher(
        Api::<RoleBinding>::all(client),
        watcher::Config::default().labels(&management_label_selector()),
    )
    .default_backoff();

    let tenant_watch = tokio::spawn(pump(
        tenant_stream,
        tenant_informer,
        tenant_tx.clone(),
        token.clone(),
    ));
    let binding_watch = tokio::spawn(pump(
        binding_stream,
        binding_informer,
        binding_tx,
        token.clone(),
    ));

    // 2. Hold dispatch back until both caches are synced
    let gate = CacheReadinessGate::from_config(&config);
    if let Err(e) = gate.wait(&[&tenants_synced, &bindings_synced]).await {
        error!("Unable to sync watch caches: {}", e);
        token.cancel();
        return Err(e.into());
    }

    // 3. Dispatch notifications to the controllers
    let tenant_controller = Arc::new(TenantController::new(store.clone(), lock.clone()));
    let owner_trace = Arc::new(OwnerTraceController::new(store, lock));

    let tenant_dispatch = tokio::spawn(dispatch_tenant_events(
        tenant_rx,
        tenant_tx,
        tenant_controller,
        config.requeue_after,
        token.clone(),
    ));
    let binding_dispatch = tokio::spawn(dispatch_role_binding_events(
        binding_rx,
        owner_trace,
        token.clone(),
    ));

    info!("Controllers started");

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| miette::miette!("Failed to listen for ctrl-c: {}", e))?;

    info!("Shutting down gracefully...");
    token.cancel();

    let shutdown_timeout = Duration::from_secs(5);
    let _ = tokio::time::timeout(shutdown_timeout, async {
        let _ = tokio::join!(
            tenant_watch,
            binding_watch,
            tenant_dispatch,
            binding_dispatch
        );
    })
    .await;

    info!("Shutdown complete");

    Ok(())
}

/// One primary pass per Tenant; fails if any pass failed
async fn run_reconcile_all() -> miette::Result<()> {
    let client = kube_client().await?;
    let controller = TenantController::new(
        Arc::new(KubeStore::new(client)),
        ConvergenceLock::new(),
    );

    let summary = controller.reconcile_all().await?;
    info!("Reconciled {} tenant(s)", summary.reconciled);

    if !summary.failed.is_empty() {
        return Err(miette::miette!(
            "{} tenant(s) failed to reconcile: {}",
            summary.failed.len(),
            summary.failed.join(", ")
        ));
    }
    Ok(())
}

fn print_crd() -> miette::Result<()> {
    print!("{}", to_yaml(&Tenant::crd())?);
    Ok(())
}
