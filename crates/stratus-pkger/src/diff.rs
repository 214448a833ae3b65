//! The dry-run diff model.
//!
//! A [`Diff`] is a point-in-time snapshot of what an apply would do:
//! each entry carries the desired state, the matched platform state when
//! one exists, and the resulting create-versus-update classification.

use std::time::Duration;

use serde::Serialize;
use serde_json::Value as JsonValue;

use stratus_core::{
    Bucket, EndpointStatus, Label, LabelId, LabelProperties, NotificationEndpoint, ResourceId,
    ResourceType, Variable, VariableArguments,
};

use crate::package::{PkgBucket, PkgDashboard, PkgEndpoint, PkgLabel, PkgTelegraf, PkgVariable};

/// Snapshot of the delta between a package and the organization's
/// current state. Section orderings are deterministic for identical
/// inputs.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Diff {
    pub buckets: Vec<DiffBucket>,
    pub dashboards: Vec<DiffDashboard>,
    pub labels: Vec<DiffLabel>,
    pub label_mappings: Vec<DiffLabelMapping>,
    pub notification_endpoints: Vec<DiffEndpoint>,
    pub telegrafs: Vec<DiffTelegraf>,
    pub variables: Vec<DiffVariable>,
}

/// Comparable bucket fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiffBucketValues {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retention_period: Option<Duration>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiffBucket {
    pub is_new: bool,
    pub name: String,
    pub new: DiffBucketValues,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old: Option<DiffBucketValues>,
}

impl DiffBucket {
    pub(crate) fn new(pkg: &PkgBucket, existing: Option<&Bucket>) -> Self {
        DiffBucket {
            is_new: existing.is_none(),
            name: pkg.name.clone(),
            new: DiffBucketValues {
                description: pkg.description.clone(),
                retention_period: pkg.retention_period,
            },
            old: existing.map(|b| DiffBucketValues {
                description: b.description.clone(),
                retention_period: b.retention_period,
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DiffLabel {
    pub is_new: bool,
    pub name: String,
    pub new: LabelProperties,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old: Option<LabelProperties>,
}

impl DiffLabel {
    pub(crate) fn new(pkg: &PkgLabel, existing: Option<&Label>) -> Self {
        DiffLabel {
            is_new: existing.is_none(),
            name: pkg.name.clone(),
            new: pkg.properties(),
            old: existing.map(|l| l.properties.clone()),
        }
    }
}

/// Dashboards are create-only; the diff never carries an old state.
#[derive(Debug, Clone, Serialize)]
pub struct DiffDashboard {
    pub is_new: bool,
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub charts: Vec<DiffChart>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiffChart {
    pub name: String,
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    #[serde(skip_serializing_if = "JsonValue::is_null")]
    pub properties: JsonValue,
}

impl DiffDashboard {
    pub(crate) fn new(pkg: &PkgDashboard) -> Self {
        DiffDashboard {
            is_new: true,
            name: pkg.name.clone(),
            description: pkg.description.clone(),
            charts: pkg
                .charts
                .iter()
                .map(|c| DiffChart {
                    name: c.name.clone(),
                    x: c.x,
                    y: c.y,
                    width: c.width,
                    height: c.height,
                    properties: c.properties.clone(),
                })
                .collect(),
        }
    }
}

/// Comparable notification endpoint fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffEndpointValues {
    pub status: EndpointStatus,
    pub url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiffEndpoint {
    pub is_new: bool,
    pub name: String,
    pub new: DiffEndpointValues,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old: Option<DiffEndpointValues>,
}

impl DiffEndpoint {
    pub(crate) fn new(pkg: &PkgEndpoint, existing: Option<&NotificationEndpoint>) -> Self {
        fn url_of(endpoint: &NotificationEndpoint) -> String {
            match &endpoint.kind {
                stratus_core::EndpointKind::Http { url, .. }
                | stratus_core::EndpointKind::Slack { url, .. } => url.clone(),
                stratus_core::EndpointKind::PagerDuty { client_url, .. } => client_url.clone(),
            }
        }

        let url = match &pkg.kind {
            crate::package::PkgEndpointKind::Http { url, .. }
            | crate::package::PkgEndpointKind::Slack { url, .. } => url.clone(),
            crate::package::PkgEndpointKind::PagerDuty { client_url, .. } => client_url.clone(),
        };

        DiffEndpoint {
            is_new: existing.is_none(),
            name: pkg.name.clone(),
            new: DiffEndpointValues {
                status: pkg.status,
                url,
            },
            old: existing.map(|e| DiffEndpointValues {
                status: e.status,
                url: url_of(e),
            }),
        }
    }
}

/// Telegraf configurations are create-only.
#[derive(Debug, Clone, Serialize)]
pub struct DiffTelegraf {
    pub is_new: bool,
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
}

impl DiffTelegraf {
    pub(crate) fn new(pkg: &PkgTelegraf) -> Self {
        DiffTelegraf {
            is_new: true,
            name: pkg.name.clone(),
            description: pkg.description.clone(),
        }
    }
}

/// Comparable variable fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffVariableValues {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub arguments: VariableArguments,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiffVariable {
    pub is_new: bool,
    pub name: String,
    pub new: DiffVariableValues,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old: Option<DiffVariableValues>,
}

impl DiffVariable {
    pub(crate) fn new(pkg: &PkgVariable, existing: Option<&Variable>) -> Self {
        DiffVariable {
            is_new: existing.is_none(),
            name: pkg.name.clone(),
            new: DiffVariableValues {
                description: pkg.description.clone(),
                arguments: pkg.arguments.clone(),
            },
            old: existing.map(|v| DiffVariableValues {
                description: v.description.clone(),
                arguments: v.arguments.clone(),
            }),
        }
    }
}

/// One desired (resource, label) edge and whether the platform already
/// carries it. IDs are present only for endpoints that already exist.
#[derive(Debug, Clone, Serialize)]
pub struct DiffLabelMapping {
    pub is_new: bool,
    pub res_type: ResourceType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub res_id: Option<ResourceId>,
    pub res_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label_id: Option<LabelId>,
    pub label_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use stratus_core::{BucketId, BucketType, OrgId};

    #[test]
    fn bucket_diff_classifies_create_vs_update() {
        let pkg = PkgBucket {
            name: "b1".to_string(),
            description: "d".to_string(),
            retention_period: Some(Duration::from_secs(3600)),
            labels: vec![],
            id: None,
            existing: None,
        };

        let diff = DiffBucket::new(&pkg, None);
        assert!(diff.is_new);
        assert!(diff.old.is_none());

        let existing = Bucket {
            id: BucketId::new(),
            org_id: OrgId::new(),
            name: "b1".to_string(),
            description: String::new(),
            retention_period: Some(Duration::from_secs(60)),
            bucket_type: BucketType::User,
        };
        let diff = DiffBucket::new(&pkg, Some(&existing));
        assert!(!diff.is_new);
        assert_eq!(
            diff.old.unwrap().retention_period,
            Some(Duration::from_secs(60))
        );
        assert_eq!(diff.new.retention_period, Some(Duration::from_secs(3600)));
    }
}
