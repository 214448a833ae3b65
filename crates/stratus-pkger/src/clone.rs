//! Cloning platform resources into a package.
//!
//! The inverse of apply: read resources out of the ports and emit a
//! package describing them. Labels attached to a cloned resource become
//! `associations` on that resource, and each distinct label is emitted
//! once as a top-level resource of its own.

use std::collections::{BTreeSet, HashSet};

use rand::Rng;

use stratus_core::{
    BucketId, BucketType, DashboardId, EndpointId, EndpointKind, HttpAuth, LabelFilter, LabelId,
    NotificationEndpoint, OrgId, ResourceId, ResourceType, TelegrafId, VariableId,
};

use crate::error::{PkgerError, PkgerResult};
use crate::package::{
    LabelAssociation, Package, PackageMeta, PkgBucket, PkgChart, PkgDashboard, PkgEndpoint,
    PkgEndpointKind, PkgHttpAuth, PkgLabel, PkgTelegraf, PkgVariable, ResourceKind, SecretRef,
};
use crate::service::PkgerService;

const CLONE_DASHBOARD_LIMIT: usize = 100;
const CLONE_LABEL_LIMIT: usize = 10_000;
const CLONE_VARIABLE_LIMIT: usize = 10_000;

/// One explicit resource to clone into a package, optionally renamed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceToClone {
    pub kind: ResourceKind,
    pub id: ResourceId,
    pub name: Option<String>,
}

/// Options for [`PkgerService::create_pkg`]: metadata, explicit clone
/// targets, and organizations to clone wholesale.
#[derive(Debug, Default)]
pub struct CreateOpt {
    pub metadata: Option<PackageMeta>,
    pub org_ids: BTreeSet<OrgId>,
    pub resources: Vec<ResourceToClone>,
}

impl CreateOpt {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: PackageMeta) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Clone every resource the organization owns.
    #[must_use]
    pub fn with_org(mut self, org_id: OrgId) -> Self {
        self.org_ids.insert(org_id);
        self
    }

    #[must_use]
    pub fn with_resources(mut self, resources: impl IntoIterator<Item = ResourceToClone>) -> Self {
        self.resources.extend(resources);
        self
    }
}

impl PkgerService {
    /// Produce a package from the given clone targets.
    pub async fn create_pkg(&self, opt: CreateOpt) -> PkgerResult<Package> {
        for org_id in &opt.org_ids {
            if org_id.is_nil() {
                return Err(PkgerError::OrgIdRequired);
            }
        }

        let mut meta = opt.metadata.unwrap_or_default();
        if meta.name.is_empty() {
            // Naming only; uniqueness is the consumer's problem.
            meta.name = format!("new_{:07}", rand::thread_rng().gen_range(0..10_000_000));
        }
        if meta.version.is_empty() {
            meta.version = "v1".to_string();
        }

        let mut targets = opt.resources;
        for org_id in &opt.org_ids {
            targets.extend(self.clone_org_resources(*org_id).await?);
        }

        let mut seen = HashSet::new();
        targets.retain(|t| seen.insert((t.kind.resource_type(), t.id)));

        let mut sets = CloneSets::default();
        for target in targets {
            self.clone_resource(target, &mut sets).await?;
        }
        sets.dedupe_and_sort();

        tracing::debug!(
            pkg = %meta.name,
            buckets = sets.buckets.len(),
            dashboards = sets.dashboards.len(),
            labels = sets.labels.len(),
            "cloned resources into package"
        );

        Ok(Package::from_records(
            meta,
            sets.buckets,
            sets.dashboards,
            sets.labels,
            sets.endpoints,
            sets.telegrafs,
            sets.variables,
        ))
    }

    /// Enumerate every cloneable resource an organization owns. System
    /// buckets are never exported.
    async fn clone_org_resources(&self, org_id: OrgId) -> PkgerResult<Vec<ResourceToClone>> {
        let mut targets = Vec::new();

        for bucket in self.buckets.find_buckets(org_id).await? {
            if bucket.bucket_type == BucketType::System {
                continue;
            }
            targets.push(ResourceToClone {
                kind: ResourceKind::Bucket,
                id: bucket.id.into(),
                name: None,
            });
        }
        for dashboard in self
            .dashboards
            .find_dashboards(org_id, CLONE_DASHBOARD_LIMIT)
            .await?
        {
            targets.push(ResourceToClone {
                kind: ResourceKind::Dashboard,
                id: dashboard.id.into(),
                name: None,
            });
        }
        for label in self
            .labels
            .find_labels(LabelFilter {
                org_id: Some(org_id),
                name: None,
                limit: Some(CLONE_LABEL_LIMIT),
            })
            .await?
        {
            targets.push(ResourceToClone {
                kind: ResourceKind::Label,
                id: label.id.into(),
                name: None,
            });
        }
        for endpoint in self.endpoints.find_endpoints(org_id).await? {
            targets.push(ResourceToClone {
                kind: ResourceKind::NotificationEndpoint,
                id: endpoint.id.into(),
                name: None,
            });
        }
        for telegraf in self.telegrafs.find_telegraf_configs(org_id).await? {
            targets.push(ResourceToClone {
                kind: ResourceKind::Telegraf,
                id: telegraf.id.into(),
                name: None,
            });
        }
        for variable in self
            .variables
            .find_variables(org_id, CLONE_VARIABLE_LIMIT)
            .await?
        {
            targets.push(ResourceToClone {
                kind: ResourceKind::Variable,
                id: variable.id.into(),
                name: None,
            });
        }

        Ok(targets)
    }

    async fn clone_resource(
        &self,
        target: ResourceToClone,
        sets: &mut CloneSets,
    ) -> PkgerResult<()> {
        let uuid = *target.id.as_uuid();
        match target.kind.resource_type() {
            ResourceType::Bucket => {
                let bucket = self
                    .buckets
                    .find_bucket_by_id(BucketId::from_uuid(uuid))
                    .await?;
                let labels = self
                    .clone_associations(target.id, ResourceType::Bucket, sets)
                    .await?;
                sets.buckets.push(PkgBucket {
                    name: target.name.unwrap_or(bucket.name),
                    description: bucket.description,
                    retention_period: bucket.retention_period,
                    labels,
                    id: None,
                    existing: None,
                });
            }
            ResourceType::Label => {
                let label = self
                    .labels
                    .find_label_by_id(LabelId::from_uuid(uuid))
                    .await?;
                if sets.seen_labels.insert((label.id, label.name.clone())) {
                    sets.labels.push(PkgLabel {
                        name: target.name.unwrap_or(label.name),
                        color: label.properties.color,
                        description: label.properties.description,
                        id: None,
                        existing: None,
                    });
                }
            }
            ResourceType::Dashboard => {
                let dashboard = self
                    .dashboards
                    .find_dashboard_by_id(DashboardId::from_uuid(uuid))
                    .await?;
                let labels = self
                    .clone_associations(target.id, ResourceType::Dashboard, sets)
                    .await?;
                sets.dashboards.push(PkgDashboard {
                    name: target.name.unwrap_or(dashboard.name),
                    description: dashboard.description,
                    charts: dashboard
                        .cells
                        .into_iter()
                        .map(|cell| PkgChart {
                            name: cell.view.name,
                            x: cell.x,
                            y: cell.y,
                            width: cell.w,
                            height: cell.h,
                            properties: cell.view.properties,
                        })
                        .collect(),
                    labels,
                    id: None,
                });
            }
            ResourceType::NotificationEndpoint => {
                let endpoint = self
                    .endpoints
                    .find_endpoint_by_id(EndpointId::from_uuid(uuid))
                    .await?;
                let labels = self
                    .clone_associations(target.id, ResourceType::NotificationEndpoint, sets)
                    .await?;
                sets.endpoints
                    .push(endpoint_to_record(endpoint, target.name, labels));
            }
            ResourceType::Telegraf => {
                let telegraf = self
                    .telegrafs
                    .find_telegraf_by_id(TelegrafId::from_uuid(uuid))
                    .await?;
                let labels = self
                    .clone_associations(target.id, ResourceType::Telegraf, sets)
                    .await?;
                sets.telegrafs.push(PkgTelegraf {
                    name: target.name.unwrap_or(telegraf.name),
                    description: telegraf.description,
                    config: telegraf.config,
                    labels,
                    id: None,
                });
            }
            ResourceType::Variable => {
                let variable = self
                    .variables
                    .find_variable_by_id(VariableId::from_uuid(uuid))
                    .await?;
                let labels = self
                    .clone_associations(target.id, ResourceType::Variable, sets)
                    .await?;
                sets.variables.push(PkgVariable {
                    name: target.name.unwrap_or(variable.name),
                    description: variable.description,
                    arguments: variable.arguments,
                    labels,
                    id: None,
                    existing: None,
                });
            }
        }
        Ok(())
    }

    /// Discover the labels attached to a resource and emit each distinct
    /// one as a top-level label resource, memoized by (id, name) so no
    /// label appears twice.
    async fn clone_associations(
        &self,
        resource_id: ResourceId,
        resource_type: ResourceType,
        sets: &mut CloneSets,
    ) -> PkgerResult<Vec<LabelAssociation>> {
        let labels = self
            .labels
            .find_resource_labels(resource_id, resource_type)
            .await?;

        let mut associations = Vec::with_capacity(labels.len());
        for label in labels {
            associations.push(LabelAssociation {
                name: label.name.clone(),
                exists: false,
            });
            if sets.seen_labels.insert((label.id, label.name.clone())) {
                sets.labels.push(PkgLabel {
                    name: label.name,
                    color: label.properties.color,
                    description: label.properties.description,
                    id: None,
                    existing: None,
                });
            }
        }
        Ok(associations)
    }
}

fn endpoint_to_record(
    endpoint: NotificationEndpoint,
    rename: Option<String>,
    labels: Vec<LabelAssociation>,
) -> PkgEndpoint {
    let kind = match endpoint.kind {
        EndpointKind::Http { url, method, auth } => PkgEndpointKind::Http {
            url,
            method,
            auth: match auth {
                HttpAuth::None => PkgHttpAuth::None,
                HttpAuth::Basic { username, password } => PkgHttpAuth::Basic {
                    username: SecretRef { key: username.key },
                    password: SecretRef { key: password.key },
                },
                HttpAuth::Bearer { token } => PkgHttpAuth::Bearer {
                    token: SecretRef { key: token.key },
                },
            },
        },
        EndpointKind::Slack { url, token } => PkgEndpointKind::Slack {
            url,
            token: SecretRef { key: token.key },
        },
        EndpointKind::PagerDuty {
            client_url,
            routing_key,
        } => PkgEndpointKind::PagerDuty {
            client_url,
            routing_key: SecretRef {
                key: routing_key.key,
            },
        },
    };
    PkgEndpoint {
        name: rename.unwrap_or(endpoint.name),
        description: endpoint.description,
        status: endpoint.status,
        kind,
        labels,
        id: None,
        existing: None,
    }
}

#[derive(Default)]
struct CloneSets {
    buckets: Vec<PkgBucket>,
    dashboards: Vec<PkgDashboard>,
    labels: Vec<PkgLabel>,
    endpoints: Vec<PkgEndpoint>,
    telegrafs: Vec<PkgTelegraf>,
    variables: Vec<PkgVariable>,
    seen_labels: HashSet<(LabelId, String)>,
}

impl CloneSets {
    fn dedupe_and_sort(&mut self) {
        let mut names = HashSet::new();
        self.labels.retain(|l| names.insert(l.name.clone()));

        self.buckets.sort_by(|a, b| a.name.cmp(&b.name));
        self.dashboards.sort_by(|a, b| a.name.cmp(&b.name));
        self.labels.sort_by(|a, b| a.name.cmp(&b.name));
        self.endpoints.sort_by(|a, b| a.name.cmp(&b.name));
        self.telegrafs.sort_by(|a, b| a.name.cmp(&b.name));
        self.variables.sort_by(|a, b| a.name.cmp(&b.name));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_opt_collects_orgs_and_resources() {
        let org = OrgId::new();
        let target = ResourceToClone {
            kind: ResourceKind::Bucket,
            id: ResourceId::new(),
            name: Some("renamed".to_string()),
        };
        let opt = CreateOpt::new()
            .with_org(org)
            .with_org(org)
            .with_resources(vec![target.clone()]);
        assert_eq!(opt.org_ids.len(), 1);
        assert_eq!(opt.resources, vec![target]);
    }
}
