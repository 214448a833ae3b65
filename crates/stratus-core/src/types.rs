//! Platform resource model.
//!
//! The domain types the package engine reads and writes through its
//! service ports: buckets, labels, dashboards, variables, telegraf
//! configurations, notification endpoints, and the label mappings that
//! associate labels with the other kinds.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use crate::ids::{
    BucketId, DashboardId, EndpointId, LabelId, OrgId, ResourceId, TelegrafId, VariableId,
};

/// The resource taxonomy used for label mappings and human-readable
/// ordering. The priority ranks kinds for deterministic output, labels
/// first since everything else may reference them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Label,
    Bucket,
    Variable,
    Dashboard,
    NotificationEndpoint,
    Telegraf,
}

impl ResourceType {
    /// Fixed ordering rank, labels first.
    #[must_use]
    pub fn priority(&self) -> u8 {
        match self {
            ResourceType::Label => 1,
            ResourceType::Bucket => 2,
            ResourceType::Variable => 3,
            ResourceType::Dashboard => 4,
            ResourceType::NotificationEndpoint => 5,
            ResourceType::Telegraf => 6,
        }
    }

    /// Convert to string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Label => "label",
            ResourceType::Bucket => "bucket",
            ResourceType::Variable => "variable",
            ResourceType::Dashboard => "dashboard",
            ResourceType::NotificationEndpoint => "notification_endpoint",
            ResourceType::Telegraf => "telegraf",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Distinguishes user buckets from the system buckets every organization
/// gets at creation time. System buckets are never exported or mutated by
/// the package engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BucketType {
    User,
    System,
}

/// A retention-policied data stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bucket {
    pub id: BucketId,
    pub org_id: OrgId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Retention window; `None` keeps data forever.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retention_period: Option<Duration>,
    pub bucket_type: BucketType,
}

/// Mutable subset of a bucket. `None` fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct BucketUpdate {
    pub description: Option<String>,
    /// `Some(Duration::ZERO)` clears the retention window.
    pub retention_period: Option<Duration>,
}

/// Key/value metadata attachable to any other resource kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub id: LabelId,
    pub org_id: OrgId,
    pub name: String,
    #[serde(default)]
    pub properties: LabelProperties,
}

/// Display properties carried by a label.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelProperties {
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub description: String,
}

/// Mutable subset of a label.
#[derive(Debug, Clone, Default)]
pub struct LabelUpdate {
    pub name: Option<String>,
    pub properties: Option<LabelProperties>,
}

/// A dashboard and its cell grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dashboard {
    pub id: DashboardId,
    pub org_id: OrgId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub cells: Vec<Cell>,
}

/// Placement of one view on a dashboard grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
    pub view: View,
}

/// The visualization rendered inside a cell. Properties are an opaque
/// chart definition owned by the UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct View {
    pub name: String,
    #[serde(default)]
    pub properties: JsonValue,
}

/// A dashboard variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    pub id: VariableId,
    pub org_id: OrgId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub arguments: VariableArguments,
}

/// The value source of a variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum VariableArguments {
    /// Values produced by running a query.
    Query { query: String, language: String },
    /// A fixed list of values.
    Constant { values: Vec<String> },
    /// A fixed display-name to value mapping.
    Map { values: BTreeMap<String, String> },
}

/// Mutable subset of a variable.
#[derive(Debug, Clone, Default)]
pub struct VariableUpdate {
    pub description: Option<String>,
    pub arguments: Option<VariableArguments>,
}

/// A telegraf agent configuration. The config body is TOML owned by the
/// agent; the platform stores it verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelegrafConfig {
    pub id: TelegrafId,
    pub org_id: OrgId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub config: String,
}

/// Whether a notification endpoint is eligible to receive notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointStatus {
    Active,
    Inactive,
}

impl EndpointStatus {
    /// Convert to string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointStatus::Active => "active",
            EndpointStatus::Inactive => "inactive",
        }
    }
}

impl fmt::Display for EndpointStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A secret-valued field on a notification endpoint. The key names an
/// entry in the organization's secret store; the value is only populated
/// on the write path and never read back.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretField {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl SecretField {
    /// A reference to an existing secret key, with no inline value.
    #[must_use]
    pub fn reference(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: None,
        }
    }

    /// True when neither a key nor a value is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.key.is_empty() && self.value.is_none()
    }
}

/// Authentication scheme for an HTTP notification endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scheme", rename_all = "lowercase")]
pub enum HttpAuth {
    None,
    Basic {
        username: SecretField,
        password: SecretField,
    },
    Bearer {
        token: SecretField,
    },
}

/// Destination-specific shape of a notification endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EndpointKind {
    Http {
        url: String,
        method: String,
        auth: HttpAuth,
    },
    Slack {
        url: String,
        token: SecretField,
    },
    PagerDuty {
        client_url: String,
        routing_key: SecretField,
    },
}

/// A destination for alert notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationEndpoint {
    pub id: EndpointId,
    pub org_id: OrgId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub status: EndpointStatus,
    pub kind: EndpointKind,
}

impl NotificationEndpoint {
    /// The secret-valued fields of this endpoint, in a fixed order.
    #[must_use]
    pub fn secret_fields(&self) -> Vec<SecretField> {
        match &self.kind {
            EndpointKind::Http { auth, .. } => match auth {
                HttpAuth::None => vec![],
                HttpAuth::Basic { username, password } => {
                    vec![username.clone(), password.clone()]
                }
                HttpAuth::Bearer { token } => vec![token.clone()],
            },
            EndpointKind::Slack { token, .. } => vec![token.clone()],
            EndpointKind::PagerDuty { routing_key, .. } => vec![routing_key.clone()],
        }
    }
}

/// An edge associating a label with another resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LabelMapping {
    pub label_id: LabelId,
    pub resource_id: ResourceId,
    pub resource_type: ResourceType,
}
