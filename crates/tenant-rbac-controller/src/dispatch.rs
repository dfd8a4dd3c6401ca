use crate::owner_trace::OwnerTraceController;
use crate::tenant_controller::TenantController;
use kube::ResourceExt;
use std::sync::Arc;
use std::time::Duration;
use tenant_rbac_core::{ResourceEvent, RoleBinding, Tenant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// Run the primary controller for every queued Tenant notification.
///
/// Each notification gets its own task; the Convergence Lock inside the
/// controller serializes the passes. A failed pass is fed back into the queue
/// through `requeue` after `requeue_after`.
pub async fn dispatch_tenant_events(
    mut rx: mpsc::Receiver<ResourceEvent<Tenant>>,
    requeue: mpsc::Sender<ResourceEvent<Tenant>>,
    controller: Arc<TenantController>,
    requeue_after: Duration,
    token: CancellationToken,
) {
    let tracker = TaskTracker::new();
    info!("Tenant dispatcher started");

    loop {
        let event = tokio::select! {
            _ = token.cancelled() => break,
            event = rx.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        let controller = controller.clone();
        let requeue = requeue.clone();
        let token = token.clone();
        tracker.spawn(async move {
            let name = event.object().name_any();
            match controller.handle(&event).await {
                Ok(report) => debug!(
                    "Tenant {} pass finished with {} write(s)",
                    name,
                    report.writes()
                ),
                Err(e) => {
                    warn!(
                        "Tenant {} pass failed: {}; requeueing in {:?}",
                        name, e, requeue_after
                    );
                    tokio::select! {
                        _ = token.cancelled() => {}
                        _ = tokio::time::sleep(requeue_after) => {
                            if requeue.send(event).await.is_err() {
                                debug!("Tenant queue closed, dropping requeue for {}", name);
                            }
                        }
                    }
                }
            }
        });
    }

    tracker.close();
    tracker.wait().await;
    info!("Tenant dispatcher stopped");
}

/// Run the owner-trace controller for every queued RoleBinding notification
pub async fn dispatch_role_binding_events(
    mut rx: mpsc::Receiver<ResourceEvent<RoleBinding>>,
    controller: Arc<OwnerTraceController>,
    token: CancellationToken,
) {
    let tracker = TaskTracker::new();
    info!("RoleBinding dispatcher started");

    loop {
        let event = tokio::select! {
            _ = token.cancelled() => break,
            event = rx.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        let controller = controller.clone();
        tracker.spawn(async move {
            controller.handle(&event).await;
        });
    }

    tracker.close();
    tracker.wait().await;
    info!("RoleBinding dispatcher stopped");
}
