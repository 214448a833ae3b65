//! Applier builders, one per resource kind.
//!
//! Each builder wraps a create-or-update closure and a rollback closure
//! around the package's record set for that kind. The create closure
//! snapshots its record under the kind's mutex, performs the port call
//! with no lock held, then writes the assigned ID back and appends the
//! record to the builder's rollback list. Only records whose port call
//! succeeded ever enter a rollback list.
//!
//! Rollback inverts what apply did: delete what was created, restore
//! what was updated from the `existing` snapshot captured at dry-run
//! time.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use stratus_core::{
    Bucket, BucketService, BucketUpdate, Cell, Dashboard, DashboardId, Label, LabelMapping,
    LabelService, LabelUpdate, NotificationEndpoint, NotificationEndpointService, OrgId,
    ServiceError, UserId, Variable, VariableService, VariableUpdate, View,
};

use crate::error::ApplyErrBody;
use crate::package::{
    with_lock, PkgBucket, PkgChart, PkgDashboard, PkgEndpoint, PkgLabel, PkgTelegraf, PkgVariable,
    Records, SummaryLabelMapping,
};
use crate::service::PkgerService;

pub(crate) type ApplyFuture = Pin<Box<dyn Future<Output = Option<ApplyErrBody>> + Send>>;
pub(crate) type CreateFn = Arc<dyn Fn(usize, OrgId, UserId) -> ApplyFuture + Send + Sync>;
pub(crate) type RollbackFuture = Pin<Box<dyn Future<Output = Result<(), String>> + Send>>;
pub(crate) type RollbackFn = Box<dyn Fn() -> RollbackFuture + Send + Sync>;

/// The create half of an applier: how many work items it has and the
/// closure that applies the i-th item.
pub(crate) struct Creater {
    pub entries: usize,
    pub call: CreateFn,
}

/// The rollback half of an applier.
pub(crate) struct Rollbacker {
    pub resource: &'static str,
    pub call: RollbackFn,
}

/// The create/rollback pair for one resource kind within one apply.
pub(crate) struct Applier {
    pub creater: Creater,
    pub rollbacker: Rollbacker,
}

fn rollback_failure(resource: &str, ids: Vec<String>) -> Result<(), String> {
    if ids.is_empty() {
        Ok(())
    } else {
        Err(format!(
            "{resource}_ids=[{}] err=\"unable to roll back {resource}\"",
            ids.join(", ")
        ))
    }
}

impl PkgerService {
    pub(crate) fn apply_buckets(&self, buckets: Records<PkgBucket>) -> Applier {
        const RESOURCE: &str = "bucket";

        let entries = with_lock(&buckets, |records| records.len());
        let rollback_list: Records<PkgBucket> = Arc::new(Mutex::new(Vec::new()));
        let svc = Arc::clone(&self.buckets);

        let create: CreateFn = {
            let buckets = Arc::clone(&buckets);
            let rollback_list = Arc::clone(&rollback_list);
            let svc = Arc::clone(&svc);
            Arc::new(move |i, org_id, _user_id| {
                let buckets = Arc::clone(&buckets);
                let rollback_list = Arc::clone(&rollback_list);
                let svc = Arc::clone(&svc);
                Box::pin(async move {
                    let bucket = with_lock(&buckets, |records| records[i].clone());
                    if !bucket.should_apply() {
                        return None;
                    }

                    match apply_bucket(svc.as_ref(), &bucket, org_id).await {
                        Ok(applied) => {
                            let snapshot = with_lock(&buckets, |records| {
                                records[i].id = Some(applied.id);
                                records[i].clone()
                            });
                            with_lock(&rollback_list, |list| list.push(snapshot));
                            None
                        }
                        Err(err) => Some(ApplyErrBody {
                            name: bucket.name.clone(),
                            msg: err.to_string(),
                        }),
                    }
                })
            })
        };

        let rollback: RollbackFn = {
            let svc = Arc::clone(&self.buckets);
            Box::new(move || {
                let svc = Arc::clone(&svc);
                let rollback_list = Arc::clone(&rollback_list);
                Box::pin(async move {
                    let buckets = with_lock(&rollback_list, |list| list.clone());
                    rollback_buckets(svc.as_ref(), &buckets).await
                })
            })
        };

        Applier {
            creater: Creater {
                entries,
                call: create,
            },
            rollbacker: Rollbacker {
                resource: RESOURCE,
                call: rollback,
            },
        }
    }

    pub(crate) fn apply_labels(&self, labels: Records<PkgLabel>) -> Applier {
        const RESOURCE: &str = "label";

        let entries = with_lock(&labels, |records| records.len());
        let rollback_list: Records<PkgLabel> = Arc::new(Mutex::new(Vec::new()));

        let create: CreateFn = {
            let labels = Arc::clone(&labels);
            let rollback_list = Arc::clone(&rollback_list);
            let svc = Arc::clone(&self.labels);
            Arc::new(move |i, org_id, _user_id| {
                let labels = Arc::clone(&labels);
                let rollback_list = Arc::clone(&rollback_list);
                let svc = Arc::clone(&svc);
                Box::pin(async move {
                    let label = with_lock(&labels, |records| records[i].clone());
                    if !label.should_apply() {
                        return None;
                    }

                    match apply_label(svc.as_ref(), &label, org_id).await {
                        Ok(applied) => {
                            let snapshot = with_lock(&labels, |records| {
                                records[i].id = Some(applied.id);
                                records[i].clone()
                            });
                            with_lock(&rollback_list, |list| list.push(snapshot));
                            None
                        }
                        Err(err) => Some(ApplyErrBody {
                            name: label.name.clone(),
                            msg: err.to_string(),
                        }),
                    }
                })
            })
        };

        let rollback: RollbackFn = {
            let svc = Arc::clone(&self.labels);
            Box::new(move || {
                let svc = Arc::clone(&svc);
                let rollback_list = Arc::clone(&rollback_list);
                Box::pin(async move {
                    let labels = with_lock(&rollback_list, |list| list.clone());
                    rollback_labels(svc.as_ref(), &labels).await
                })
            })
        };

        Applier {
            creater: Creater {
                entries,
                call: create,
            },
            rollbacker: Rollbacker {
                resource: RESOURCE,
                call: rollback,
            },
        }
    }

    pub(crate) fn apply_dashboards(&self, dashboards: Records<PkgDashboard>) -> Applier {
        const RESOURCE: &str = "dashboard";

        let entries = with_lock(&dashboards, |records| records.len());
        let rollback_list: Arc<Mutex<Vec<DashboardId>>> = Arc::new(Mutex::new(Vec::new()));

        let create: CreateFn = {
            let dashboards = Arc::clone(&dashboards);
            let rollback_list = Arc::clone(&rollback_list);
            let svc = Arc::clone(&self.dashboards);
            Arc::new(move |i, org_id, _user_id| {
                let dashboards = Arc::clone(&dashboards);
                let rollback_list = Arc::clone(&rollback_list);
                let svc = Arc::clone(&svc);
                Box::pin(async move {
                    let dash = with_lock(&dashboards, |records| records[i].clone());

                    let dashboard = Dashboard {
                        id: DashboardId::nil(),
                        org_id,
                        name: dash.name.clone(),
                        description: dash.description.clone(),
                        cells: convert_charts_to_cells(&dash.charts),
                    };
                    match svc.create_dashboard(dashboard).await {
                        Ok(created) => {
                            with_lock(&dashboards, |records| {
                                records[i].id = Some(created.id);
                            });
                            with_lock(&rollback_list, |list| list.push(created.id));
                            None
                        }
                        Err(err) => Some(ApplyErrBody {
                            name: dash.name.clone(),
                            msg: err.to_string(),
                        }),
                    }
                })
            })
        };

        let rollback: RollbackFn = {
            let svc = Arc::clone(&self.dashboards);
            Box::new(move || {
                let svc = Arc::clone(&svc);
                let rollback_list = Arc::clone(&rollback_list);
                Box::pin(async move {
                    let ids = with_lock(&rollback_list, |list| list.clone());
                    let mut failed = Vec::new();
                    for id in ids {
                        if svc.delete_dashboard(id).await.is_err() {
                            failed.push(id.to_string());
                        }
                    }
                    rollback_failure(RESOURCE, failed)
                })
            })
        };

        Applier {
            creater: Creater {
                entries,
                call: create,
            },
            rollbacker: Rollbacker {
                resource: RESOURCE,
                call: rollback,
            },
        }
    }

    pub(crate) fn apply_notification_endpoints(&self, endpoints: Records<PkgEndpoint>) -> Applier {
        const RESOURCE: &str = "notification_endpoint";

        let entries = with_lock(&endpoints, |records| records.len());
        let rollback_list: Records<PkgEndpoint> = Arc::new(Mutex::new(Vec::new()));

        let create: CreateFn = {
            let endpoints = Arc::clone(&endpoints);
            let rollback_list = Arc::clone(&rollback_list);
            let svc = Arc::clone(&self.endpoints);
            Arc::new(move |i, org_id, user_id| {
                let endpoints = Arc::clone(&endpoints);
                let rollback_list = Arc::clone(&rollback_list);
                let svc = Arc::clone(&svc);
                Box::pin(async move {
                    let endpoint = with_lock(&endpoints, |records| records[i].clone());

                    match apply_endpoint(svc.as_ref(), &endpoint, org_id, user_id).await {
                        Ok(applied) => {
                            let snapshot = with_lock(&endpoints, |records| {
                                records[i].id = Some(applied.id);
                                // Bind the platform-generated secret keys
                                // back into the package so later
                                // references resolve canonically.
                                for secret in applied.secret_fields() {
                                    if !records[i].bind_secret_key(&secret.key) {
                                        tracing::warn!(
                                            key = %secret.key,
                                            endpoint = %records[i].name,
                                            "no secret field matches generated key"
                                        );
                                    }
                                }
                                records[i].clone()
                            });
                            with_lock(&rollback_list, |list| list.push(snapshot));
                            None
                        }
                        Err(err) => Some(ApplyErrBody {
                            name: endpoint.name.clone(),
                            msg: err.to_string(),
                        }),
                    }
                })
            })
        };

        let rollback: RollbackFn = {
            let svc = Arc::clone(&self.endpoints);
            Box::new(move || {
                let svc = Arc::clone(&svc);
                let rollback_list = Arc::clone(&rollback_list);
                Box::pin(async move {
                    let endpoints = with_lock(&rollback_list, |list| list.clone());
                    rollback_endpoints(svc.as_ref(), &endpoints).await
                })
            })
        };

        Applier {
            creater: Creater {
                entries,
                call: create,
            },
            rollbacker: Rollbacker {
                resource: RESOURCE,
                call: rollback,
            },
        }
    }

    pub(crate) fn apply_telegrafs(&self, telegrafs: Records<PkgTelegraf>) -> Applier {
        const RESOURCE: &str = "telegraf";

        let entries = with_lock(&telegrafs, |records| records.len());
        let rollback_list: Arc<Mutex<Vec<stratus_core::TelegrafId>>> =
            Arc::new(Mutex::new(Vec::new()));

        let create: CreateFn = {
            let telegrafs = Arc::clone(&telegrafs);
            let rollback_list = Arc::clone(&rollback_list);
            let svc = Arc::clone(&self.telegrafs);
            Arc::new(move |i, org_id, user_id| {
                let telegrafs = Arc::clone(&telegrafs);
                let rollback_list = Arc::clone(&rollback_list);
                let svc = Arc::clone(&svc);
                Box::pin(async move {
                    let tele = with_lock(&telegrafs, |records| records[i].clone());

                    match svc
                        .create_telegraf_config(tele.to_telegraf(org_id), user_id)
                        .await
                    {
                        Ok(created) => {
                            with_lock(&telegrafs, |records| {
                                records[i].id = Some(created.id);
                            });
                            with_lock(&rollback_list, |list| list.push(created.id));
                            None
                        }
                        Err(err) => Some(ApplyErrBody {
                            name: tele.name.clone(),
                            msg: err.to_string(),
                        }),
                    }
                })
            })
        };

        let rollback: RollbackFn = {
            let svc = Arc::clone(&self.telegrafs);
            Box::new(move || {
                let svc = Arc::clone(&svc);
                let rollback_list = Arc::clone(&rollback_list);
                Box::pin(async move {
                    let ids = with_lock(&rollback_list, |list| list.clone());
                    let mut failed = Vec::new();
                    for id in ids {
                        if svc.delete_telegraf_config(id).await.is_err() {
                            failed.push(id.to_string());
                        }
                    }
                    rollback_failure(RESOURCE, failed)
                })
            })
        };

        Applier {
            creater: Creater {
                entries,
                call: create,
            },
            rollbacker: Rollbacker {
                resource: RESOURCE,
                call: rollback,
            },
        }
    }

    pub(crate) fn apply_variables(&self, variables: Records<PkgVariable>) -> Applier {
        const RESOURCE: &str = "variable";

        let entries = with_lock(&variables, |records| records.len());
        let rollback_list: Records<PkgVariable> = Arc::new(Mutex::new(Vec::new()));

        let create: CreateFn = {
            let variables = Arc::clone(&variables);
            let rollback_list = Arc::clone(&rollback_list);
            let svc = Arc::clone(&self.variables);
            Arc::new(move |i, org_id, _user_id| {
                let variables = Arc::clone(&variables);
                let rollback_list = Arc::clone(&rollback_list);
                let svc = Arc::clone(&svc);
                Box::pin(async move {
                    let variable = with_lock(&variables, |records| records[i].clone());
                    if !variable.should_apply() {
                        return None;
                    }

                    match apply_variable(svc.as_ref(), &variable, org_id).await {
                        Ok(applied) => {
                            let snapshot = with_lock(&variables, |records| {
                                records[i].id = Some(applied.id);
                                records[i].clone()
                            });
                            with_lock(&rollback_list, |list| list.push(snapshot));
                            None
                        }
                        Err(err) => Some(ApplyErrBody {
                            name: variable.name.clone(),
                            msg: err.to_string(),
                        }),
                    }
                })
            })
        };

        let rollback: RollbackFn = {
            let svc = Arc::clone(&self.variables);
            Box::new(move || {
                let svc = Arc::clone(&svc);
                let rollback_list = Arc::clone(&rollback_list);
                Box::pin(async move {
                    let variables = with_lock(&rollback_list, |list| list.clone());
                    rollback_variables(svc.as_ref(), &variables).await
                })
            })
        };

        Applier {
            creater: Creater {
                entries,
                call: create,
            },
            rollbacker: Rollbacker {
                resource: RESOURCE,
                call: rollback,
            },
        }
    }

    pub(crate) fn apply_label_mappings(&self, mappings: Vec<SummaryLabelMapping>) -> Applier {
        const RESOURCE: &str = "label_mapping";

        let entries = mappings.len();
        let mappings = Arc::new(mappings);
        let rollback_list: Arc<Mutex<Vec<LabelMapping>>> = Arc::new(Mutex::new(Vec::new()));

        let create: CreateFn = {
            let mappings = Arc::clone(&mappings);
            let rollback_list = Arc::clone(&rollback_list);
            let svc = Arc::clone(&self.labels);
            Arc::new(move |i, _org_id, _user_id| {
                let mappings = Arc::clone(&mappings);
                let rollback_list = Arc::clone(&rollback_list);
                let svc = Arc::clone(&svc);
                Box::pin(async move {
                    let mapping = mappings[i].clone();
                    if mapping.exists {
                        // Already satisfied on the platform. Skipping it
                        // here also keeps it out of the rollback list.
                        return None;
                    }

                    let name = format!(
                        "{}:{}:{}",
                        mapping.resource_type, mapping.resource_name, mapping.label_name
                    );
                    let (Some(label_id), Some(resource_id)) =
                        (mapping.label_id, mapping.resource_id)
                    else {
                        return Some(ApplyErrBody {
                            name,
                            msg: "mapping endpoints were never assigned ids".to_string(),
                        });
                    };

                    let edge = LabelMapping {
                        label_id,
                        resource_id,
                        resource_type: mapping.resource_type,
                    };
                    match svc.create_label_mapping(edge).await {
                        Ok(()) => {
                            with_lock(&rollback_list, |list| list.push(edge));
                            None
                        }
                        Err(err) => Some(ApplyErrBody {
                            name,
                            msg: err.to_string(),
                        }),
                    }
                })
            })
        };

        let rollback: RollbackFn = {
            let svc = Arc::clone(&self.labels);
            Box::new(move || {
                let svc = Arc::clone(&svc);
                let rollback_list = Arc::clone(&rollback_list);
                Box::pin(async move {
                    let edges = with_lock(&rollback_list, |list| list.clone());
                    let mut failed = Vec::new();
                    for edge in edges {
                        if svc.delete_label_mapping(&edge).await.is_err() {
                            failed.push(format!("{}:{}", edge.label_id, edge.resource_id));
                        }
                    }
                    rollback_failure(RESOURCE, failed)
                })
            })
        };

        Applier {
            creater: Creater {
                entries,
                call: create,
            },
            rollbacker: Rollbacker {
                resource: RESOURCE,
                call: rollback,
            },
        }
    }
}

async fn apply_bucket(
    svc: &dyn BucketService,
    bucket: &PkgBucket,
    org_id: OrgId,
) -> Result<Bucket, ServiceError> {
    match &bucket.existing {
        Some(existing) => {
            svc.update_bucket(
                existing.id,
                BucketUpdate {
                    description: Some(bucket.description.clone()),
                    retention_period: Some(bucket.retention_period.unwrap_or(Duration::ZERO)),
                },
            )
            .await
        }
        None => svc.create_bucket(bucket.to_bucket(org_id)).await,
    }
}

async fn rollback_buckets(svc: &dyn BucketService, buckets: &[PkgBucket]) -> Result<(), String> {
    let mut failed = Vec::new();
    for bucket in buckets {
        let result = match (&bucket.existing, bucket.id) {
            (None, Some(id)) => svc.delete_bucket(id).await,
            (Some(existing), _) => svc
                .update_bucket(
                    existing.id,
                    BucketUpdate {
                        description: Some(existing.description.clone()),
                        retention_period: Some(existing.retention_period.unwrap_or(Duration::ZERO)),
                    },
                )
                .await
                .map(|_| ()),
            (None, None) => Ok(()),
        };
        if result.is_err() {
            failed.push(bucket.name.clone());
        }
    }
    rollback_failure("bucket", failed)
}

async fn apply_label(
    svc: &dyn LabelService,
    label: &PkgLabel,
    org_id: OrgId,
) -> Result<Label, ServiceError> {
    match &label.existing {
        Some(existing) => {
            svc.update_label(
                existing.id,
                LabelUpdate {
                    name: None,
                    properties: Some(label.properties()),
                },
            )
            .await
        }
        None => svc.create_label(label.to_label(org_id)).await,
    }
}

async fn rollback_labels(svc: &dyn LabelService, labels: &[PkgLabel]) -> Result<(), String> {
    let mut failed = Vec::new();
    for label in labels {
        let result = match (&label.existing, label.id) {
            (None, Some(id)) => svc.delete_label(id).await,
            (Some(existing), _) => svc
                .update_label(
                    existing.id,
                    LabelUpdate {
                        name: None,
                        properties: Some(existing.properties.clone()),
                    },
                )
                .await
                .map(|_| ()),
            (None, None) => Ok(()),
        };
        if result.is_err() {
            failed.push(label.name.clone());
        }
    }
    rollback_failure("label", failed)
}

async fn apply_endpoint(
    svc: &dyn NotificationEndpointService,
    endpoint: &PkgEndpoint,
    org_id: OrgId,
    user_id: UserId,
) -> Result<NotificationEndpoint, ServiceError> {
    match &endpoint.existing {
        Some(existing) => {
            svc.update_endpoint(existing.id, endpoint.to_endpoint(org_id), user_id)
                .await
        }
        None => svc.create_endpoint(endpoint.to_endpoint(org_id), user_id).await,
    }
}

async fn rollback_endpoints(
    svc: &dyn NotificationEndpointService,
    endpoints: &[PkgEndpoint],
) -> Result<(), String> {
    let mut failed = Vec::new();
    for endpoint in endpoints {
        let result = match (&endpoint.existing, endpoint.id) {
            (None, Some(id)) => svc.delete_endpoint(id).await,
            (Some(existing), _) => svc
                .update_endpoint(existing.id, existing.clone(), UserId::nil())
                .await
                .map(|_| ()),
            (None, None) => Ok(()),
        };
        if result.is_err() {
            failed.push(endpoint.name.clone());
        }
    }
    rollback_failure("notification_endpoint", failed)
}

async fn apply_variable(
    svc: &dyn VariableService,
    variable: &PkgVariable,
    org_id: OrgId,
) -> Result<Variable, ServiceError> {
    match &variable.existing {
        Some(existing) => {
            svc.update_variable(
                existing.id,
                VariableUpdate {
                    description: Some(variable.description.clone()),
                    arguments: Some(variable.arguments.clone()),
                },
            )
            .await
        }
        None => svc.create_variable(variable.to_variable(org_id)).await,
    }
}

async fn rollback_variables(
    svc: &dyn VariableService,
    variables: &[PkgVariable],
) -> Result<(), String> {
    let mut failed = Vec::new();
    for variable in variables {
        let result = match (&variable.existing, variable.id) {
            (None, Some(id)) => svc.delete_variable(id).await,
            (Some(existing), _) => svc
                .update_variable(
                    existing.id,
                    VariableUpdate {
                        description: Some(existing.description.clone()),
                        arguments: Some(existing.arguments.clone()),
                    },
                )
                .await
                .map(|_| ()),
            (None, None) => Ok(()),
        };
        if result.is_err() {
            failed.push(variable.name.clone());
        }
    }
    rollback_failure("variable", failed)
}

/// Convert package chart definitions into the dashboard cell grid.
fn convert_charts_to_cells(charts: &[PkgChart]) -> Vec<Cell> {
    charts
        .iter()
        .map(|chart| Cell {
            x: chart.x,
            y: chart.y,
            w: chart.width,
            h: chart.height,
            view: View {
                name: chart.name.clone(),
                properties: chart.properties.clone(),
            },
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn charts_convert_to_cells_preserving_geometry() {
        let charts = vec![PkgChart {
            name: "cpu".to_string(),
            x: 1,
            y: 2,
            width: 6,
            height: 4,
            properties: json!({"shade": true}),
        }];
        let cells = convert_charts_to_cells(&charts);
        assert_eq!(cells.len(), 1);
        assert_eq!(cells[0].x, 1);
        assert_eq!(cells[0].y, 2);
        assert_eq!(cells[0].w, 6);
        assert_eq!(cells[0].h, 4);
        assert_eq!(cells[0].view.name, "cpu");
        assert_eq!(cells[0].view.properties["shade"], json!(true));
    }

    #[test]
    fn rollback_failure_formats_ids() {
        assert!(rollback_failure("bucket", vec![]).is_ok());
        let err = rollback_failure("bucket", vec!["b1".to_string(), "b2".to_string()]).unwrap_err();
        assert_eq!(err, "bucket_ids=[b1, b2] err=\"unable to roll back bucket\"");
    }
}
