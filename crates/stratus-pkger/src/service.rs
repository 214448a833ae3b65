//! The package engine service.
//!
//! [`PkgerService`] owns one port per resource kind and the apply
//! request limit. It exposes the three phases of the package lifecycle:
//! [`create_pkg`](PkgerService::create_pkg) (clone),
//! [`dry_run`](PkgerService::dry_run) (diff without mutation), and
//! [`apply`](PkgerService::apply) (reconcile with bounded concurrency
//! and all-or-nothing rollback).

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use stratus_core::{
    BucketService, DashboardService, LabelService, NotificationEndpointService, OrgId,
    SecretService, TelegrafService, UserId, VariableService,
};

use crate::coordinator::RollbackCoordinator;
use crate::error::{PkgerError, PkgerResult};
use crate::package::{Package, Summary};

/// Default cap on concurrent in-flight port calls during an apply.
pub const DEFAULT_APPLY_REQ_LIMIT: usize = 5;

/// The package engine. One instance serves many packages; each apply
/// call owns its own coordinator, semaphore, and error stream.
pub struct PkgerService {
    pub(crate) buckets: Arc<dyn BucketService>,
    pub(crate) dashboards: Arc<dyn DashboardService>,
    pub(crate) labels: Arc<dyn LabelService>,
    pub(crate) endpoints: Arc<dyn NotificationEndpointService>,
    pub(crate) secrets: Arc<dyn SecretService>,
    pub(crate) telegrafs: Arc<dyn TelegrafService>,
    pub(crate) variables: Arc<dyn VariableService>,
    pub(crate) apply_req_limit: usize,
}

impl std::fmt::Debug for PkgerService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PkgerService")
            .field("apply_req_limit", &self.apply_req_limit)
            .finish_non_exhaustive()
    }
}

impl PkgerService {
    /// Start building a service. Every port is required; the apply
    /// request limit defaults to [`DEFAULT_APPLY_REQ_LIMIT`].
    #[must_use]
    pub fn builder() -> PkgerServiceBuilder {
        PkgerServiceBuilder::default()
    }

    /// Apply every resource in the package. The package is applied in
    /// its entirety: if any item fails midway, everything already
    /// created is deleted and everything updated is restored before the
    /// aggregated error is returned.
    ///
    /// An unverified package is dry-run first to bind it against the
    /// organization's current state.
    pub async fn apply(
        &self,
        token: &CancellationToken,
        org_id: OrgId,
        user_id: UserId,
        pkg: &mut Package,
    ) -> PkgerResult<Summary> {
        if org_id.is_nil() {
            return Err(PkgerError::OrgIdRequired);
        }
        if !pkg.is_parsed() {
            pkg.validate()?;
        }
        if !pkg.is_verified() {
            self.dry_run(org_id, user_id, pkg).await?;
        }

        tracing::info!(
            org_id = %org_id,
            pkg = %pkg.meta().name,
            "applying package"
        );

        let mut coordinator = RollbackCoordinator::new(self.apply_req_limit);
        match self
            .run_appliers(&mut coordinator, token, org_id, user_id, pkg)
            .await
        {
            Ok(()) => {
                tracing::info!(
                    org_id = %org_id,
                    pkg = %pkg.meta().name,
                    "package applied"
                );
                Ok(pkg.summary())
            }
            Err(err) => {
                tracing::error!(
                    org_id = %org_id,
                    pkg = %pkg.meta().name,
                    error = %err,
                    "package apply failed, rolling back"
                );
                coordinator.rollback().await;
                Err(err)
            }
        }
    }

    /// Groups run serially; a failed group stops everything after it.
    /// Each group's errors aggregate across all of its appliers, so one
    /// failing label does not hide a failing variable next to it.
    async fn run_appliers(
        &self,
        coordinator: &mut RollbackCoordinator,
        token: &CancellationToken,
        org_id: OrgId,
        user_id: UserId,
        pkg: &Package,
    ) -> PkgerResult<()> {
        // Labels first: the resources below may reference them.
        coordinator
            .run_til_end(token, org_id, user_id, vec![self.apply_labels(pkg.labels())])
            .await?;

        coordinator
            .run_til_end(
                token,
                org_id,
                user_id,
                vec![
                    self.apply_variables(pkg.variables()),
                    self.apply_buckets(pkg.buckets()),
                    self.apply_dashboards(pkg.dashboards()),
                    self.apply_notification_endpoints(pkg.endpoints()),
                    self.apply_telegrafs(pkg.telegrafs()),
                ],
            )
            .await?;

        // Mappings resolve both of their endpoints' IDs, so they can
        // only run once the groups above have fully completed.
        coordinator
            .run_til_end(
                token,
                org_id,
                user_id,
                vec![self.apply_label_mappings(pkg.label_mappings())],
            )
            .await?;
        Ok(())
    }
}

/// Builder for [`PkgerService`].
#[derive(Default)]
pub struct PkgerServiceBuilder {
    buckets: Option<Arc<dyn BucketService>>,
    dashboards: Option<Arc<dyn DashboardService>>,
    labels: Option<Arc<dyn LabelService>>,
    endpoints: Option<Arc<dyn NotificationEndpointService>>,
    secrets: Option<Arc<dyn SecretService>>,
    telegrafs: Option<Arc<dyn TelegrafService>>,
    variables: Option<Arc<dyn VariableService>>,
    apply_req_limit: Option<usize>,
}

impl PkgerServiceBuilder {
    #[must_use]
    pub fn with_bucket_service(mut self, svc: Arc<dyn BucketService>) -> Self {
        self.buckets = Some(svc);
        self
    }

    #[must_use]
    pub fn with_dashboard_service(mut self, svc: Arc<dyn DashboardService>) -> Self {
        self.dashboards = Some(svc);
        self
    }

    #[must_use]
    pub fn with_label_service(mut self, svc: Arc<dyn LabelService>) -> Self {
        self.labels = Some(svc);
        self
    }

    #[must_use]
    pub fn with_notification_endpoint_service(
        mut self,
        svc: Arc<dyn NotificationEndpointService>,
    ) -> Self {
        self.endpoints = Some(svc);
        self
    }

    #[must_use]
    pub fn with_secret_service(mut self, svc: Arc<dyn SecretService>) -> Self {
        self.secrets = Some(svc);
        self
    }

    #[must_use]
    pub fn with_telegraf_service(mut self, svc: Arc<dyn TelegrafService>) -> Self {
        self.telegrafs = Some(svc);
        self
    }

    #[must_use]
    pub fn with_variable_service(mut self, svc: Arc<dyn VariableService>) -> Self {
        self.variables = Some(svc);
        self
    }

    /// Cap concurrent in-flight port calls across all appliers of one
    /// apply. Values below one are clamped to one.
    #[must_use]
    pub fn with_apply_req_limit(mut self, limit: usize) -> Self {
        self.apply_req_limit = Some(limit);
        self
    }

    pub fn build(self) -> PkgerResult<PkgerService> {
        Ok(PkgerService {
            buckets: self.buckets.ok_or(PkgerError::MissingService("bucket"))?,
            dashboards: self
                .dashboards
                .ok_or(PkgerError::MissingService("dashboard"))?,
            labels: self.labels.ok_or(PkgerError::MissingService("label"))?,
            endpoints: self
                .endpoints
                .ok_or(PkgerError::MissingService("notification endpoint"))?,
            secrets: self.secrets.ok_or(PkgerError::MissingService("secret"))?,
            telegrafs: self
                .telegrafs
                .ok_or(PkgerError::MissingService("telegraf"))?,
            variables: self
                .variables
                .ok_or(PkgerError::MissingService("variable"))?,
            apply_req_limit: self.apply_req_limit.unwrap_or(DEFAULT_APPLY_REQ_LIMIT).max(1),
        })
    }
}
