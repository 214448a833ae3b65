//! Apply scheduling and rollback coordination.
//!
//! The coordinator drives applier groups in dependency order. Within a
//! group every item of every applier runs concurrently, throttled by one
//! shared semaphore. Item failures never abort siblings; they are
//! aggregated by a single collector task and surface as one error after
//! the group joins. On any group error the coordinator replays every
//! recorded rollbacker, in the order they were recorded.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use stratus_core::{OrgId, UserId};

use crate::apply::{Applier, Rollbacker};
use crate::error::{ApplyErrBody, ApplyError, ApplyFailure};

/// Hard per-item deadline for a single create or update call.
pub(crate) const ITEM_TIMEOUT: Duration = Duration::from_secs(30);

fn cancelled_err(name: String) -> ApplyErrBody {
    ApplyErrBody {
        name,
        msg: "apply cancelled".to_string(),
    }
}

pub(crate) struct RollbackCoordinator {
    /// Every rollbacker recorded so far, across all groups, in apply
    /// order.
    rollbacks: Vec<Rollbacker>,
    sem: Arc<Semaphore>,
}

impl RollbackCoordinator {
    pub(crate) fn new(apply_req_limit: usize) -> Self {
        Self {
            rollbacks: Vec::new(),
            sem: Arc::new(Semaphore::new(apply_req_limit.max(1))),
        }
    }

    /// Run every item of every applier in the group to completion, then
    /// report the aggregated error if any item failed.
    ///
    /// Rollbackers are recorded before their items run, so a group that
    /// fails halfway can still be undone. Workers observe cancellation
    /// through the token and are always joined before this returns.
    pub(crate) async fn run_til_end(
        &mut self,
        token: &CancellationToken,
        org_id: OrgId,
        user_id: UserId,
        appliers: Vec<Applier>,
    ) -> Result<(), ApplyError> {
        if token.is_cancelled() {
            return Err(ApplyError {
                failures: vec![ApplyFailure {
                    resource: "apply",
                    errors: vec![cancelled_err("apply".to_string())],
                }],
            });
        }

        let (stream, collector) = ErrStream::spawn();
        let mut handles: Vec<JoinHandle<()>> = Vec::new();

        'schedule: for applier in appliers {
            let Applier { creater, rollbacker } = applier;
            let resource = rollbacker.resource;
            self.rollbacks.push(rollbacker);

            for i in 0..creater.entries {
                // Blocking acquire bounds how many port calls are in
                // flight across all appliers of this apply.
                let permit = tokio::select! {
                    _ = token.cancelled() => {
                        stream.push(resource, cancelled_err(format!("{resource} {i}")));
                        break 'schedule;
                    }
                    permit = Arc::clone(&self.sem).acquire_owned() => {
                        permit.expect("apply semaphore closed")
                    }
                };

                let call = Arc::clone(&creater.call);
                let stream = stream.clone();
                let token = token.clone();
                handles.push(tokio::spawn(async move {
                    // Held for the worker's whole lifetime; dropped on
                    // every exit path, including panic and cancellation.
                    let _permit = permit;

                    let work = call.as_ref()(i, org_id, user_id);
                    let outcome = tokio::select! {
                        _ = token.cancelled() => {
                            Some(cancelled_err(format!("{resource} {i}")))
                        }
                        result = tokio::time::timeout(ITEM_TIMEOUT, work) => {
                            match result {
                                Ok(outcome) => outcome,
                                Err(_) => Some(ApplyErrBody {
                                    name: format!("{resource} {i}"),
                                    msg: format!(
                                        "timed out after {}s",
                                        ITEM_TIMEOUT.as_secs()
                                    ),
                                }),
                            }
                        }
                    };
                    if let Some(err) = outcome {
                        stream.push(resource, err);
                    }
                }));
            }
        }

        for handle in handles {
            if let Err(err) = handle.await {
                tracing::error!(error = %err, "apply worker panicked");
            }
        }
        drop(stream);

        match collector.await {
            Ok(None) => Ok(()),
            Ok(Some(err)) => Err(err),
            Err(err) => {
                tracing::error!(error = %err, "apply error collector panicked");
                Err(ApplyError {
                    failures: vec![ApplyFailure {
                        resource: "apply",
                        errors: vec![ApplyErrBody {
                            name: "error stream".to_string(),
                            msg: err.to_string(),
                        }],
                    }],
                })
            }
        }
    }

    /// Replay every recorded rollbacker in the order it was recorded,
    /// including those from groups that completed cleanly. Failures are
    /// logged, never returned; the caller is already reporting the
    /// primary error.
    pub(crate) async fn rollback(&self) {
        for rollbacker in &self.rollbacks {
            if let Err(err) = (rollbacker.call)().await {
                tracing::error!(
                    resource = rollbacker.resource,
                    error = %err,
                    "failed to roll back resource group"
                );
            }
        }
    }
}

struct ErrMsg {
    resource: &'static str,
    err: ApplyErrBody,
}

/// Concurrency-safe failure aggregator. Many workers push; one collector
/// task buckets by resource kind and emits a single error once every
/// sender is gone. The emitted kind ordering is sorted and therefore
/// deterministic regardless of worker interleaving.
#[derive(Clone)]
pub(crate) struct ErrStream {
    tx: mpsc::UnboundedSender<ErrMsg>,
}

impl ErrStream {
    pub(crate) fn spawn() -> (Self, JoinHandle<Option<ApplyError>>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<ErrMsg>();
        let collector = tokio::spawn(async move {
            let mut by_resource: BTreeMap<&'static str, Vec<ApplyErrBody>> = BTreeMap::new();
            while let Some(msg) = rx.recv().await {
                by_resource.entry(msg.resource).or_default().push(msg.err);
            }
            if by_resource.is_empty() {
                None
            } else {
                Some(ApplyError {
                    failures: by_resource
                        .into_iter()
                        .map(|(resource, errors)| ApplyFailure { resource, errors })
                        .collect(),
                })
            }
        });
        (Self { tx }, collector)
    }

    /// Push one failure. Sends after the collector has shut down are
    /// discarded rather than blocking the worker.
    pub(crate) fn push(&self, resource: &'static str, err: ApplyErrBody) {
        let _ = self.tx.send(ErrMsg { resource, err });
    }
}
