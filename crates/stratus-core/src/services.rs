//! Resource service ports.
//!
//! One trait per resource kind, covering exactly the operations the
//! package engine drives. Implementations live behind these seams so the
//! engine never sees a storage backend or an HTTP client, only the
//! operation set below.

use async_trait::async_trait;

use crate::error::ServiceResult;
use crate::ids::{
    BucketId, DashboardId, EndpointId, LabelId, OrgId, ResourceId, TelegrafId, UserId, VariableId,
};
use crate::types::{
    Bucket, BucketUpdate, Dashboard, Label, LabelMapping, LabelUpdate, NotificationEndpoint,
    ResourceType, TelegrafConfig, Variable, VariableUpdate,
};

/// Filter for label enumeration.
#[derive(Debug, Clone, Default)]
pub struct LabelFilter {
    pub org_id: Option<OrgId>,
    /// Exact-match label name.
    pub name: Option<String>,
    pub limit: Option<usize>,
}

/// Bucket storage and retrieval.
#[async_trait]
pub trait BucketService: Send + Sync {
    async fn find_bucket_by_id(&self, id: BucketId) -> ServiceResult<Bucket>;

    async fn find_bucket_by_name(&self, org_id: OrgId, name: &str) -> ServiceResult<Bucket>;

    async fn find_buckets(&self, org_id: OrgId) -> ServiceResult<Vec<Bucket>>;

    /// Create a bucket, returning it with its assigned ID.
    async fn create_bucket(&self, bucket: Bucket) -> ServiceResult<Bucket>;

    async fn update_bucket(&self, id: BucketId, update: BucketUpdate) -> ServiceResult<Bucket>;

    async fn delete_bucket(&self, id: BucketId) -> ServiceResult<()>;
}

/// Label storage, plus the label-to-resource mapping edges.
#[async_trait]
pub trait LabelService: Send + Sync {
    async fn find_label_by_id(&self, id: LabelId) -> ServiceResult<Label>;

    async fn find_labels(&self, filter: LabelFilter) -> ServiceResult<Vec<Label>>;

    /// Create a label, returning it with its assigned ID.
    async fn create_label(&self, label: Label) -> ServiceResult<Label>;

    async fn update_label(&self, id: LabelId, update: LabelUpdate) -> ServiceResult<Label>;

    async fn delete_label(&self, id: LabelId) -> ServiceResult<()>;

    /// All labels currently mapped onto the given resource.
    async fn find_resource_labels(
        &self,
        resource_id: ResourceId,
        resource_type: ResourceType,
    ) -> ServiceResult<Vec<Label>>;

    async fn create_label_mapping(&self, mapping: LabelMapping) -> ServiceResult<()>;

    async fn delete_label_mapping(&self, mapping: &LabelMapping) -> ServiceResult<()>;
}

/// Dashboard storage and retrieval. Reads return cells with their views
/// fully populated.
#[async_trait]
pub trait DashboardService: Send + Sync {
    async fn find_dashboards(&self, org_id: OrgId, limit: usize) -> ServiceResult<Vec<Dashboard>>;

    async fn find_dashboard_by_id(&self, id: DashboardId) -> ServiceResult<Dashboard>;

    /// Create a dashboard, returning it with its assigned ID.
    async fn create_dashboard(&self, dashboard: Dashboard) -> ServiceResult<Dashboard>;

    async fn delete_dashboard(&self, id: DashboardId) -> ServiceResult<()>;
}

/// Notification endpoint storage and retrieval.
#[async_trait]
pub trait NotificationEndpointService: Send + Sync {
    async fn find_endpoints(&self, org_id: OrgId) -> ServiceResult<Vec<NotificationEndpoint>>;

    async fn find_endpoint_by_id(&self, id: EndpointId) -> ServiceResult<NotificationEndpoint>;

    /// Create an endpoint, returning it with its assigned ID and the
    /// canonical secret keys generated for its secret fields.
    async fn create_endpoint(
        &self,
        endpoint: NotificationEndpoint,
        user_id: UserId,
    ) -> ServiceResult<NotificationEndpoint>;

    /// Replace an endpoint's definition.
    async fn update_endpoint(
        &self,
        id: EndpointId,
        endpoint: NotificationEndpoint,
        user_id: UserId,
    ) -> ServiceResult<NotificationEndpoint>;

    async fn delete_endpoint(&self, id: EndpointId) -> ServiceResult<()>;
}

/// Telegraf configuration storage.
#[async_trait]
pub trait TelegrafService: Send + Sync {
    async fn find_telegraf_configs(&self, org_id: OrgId) -> ServiceResult<Vec<TelegrafConfig>>;

    async fn find_telegraf_by_id(&self, id: TelegrafId) -> ServiceResult<TelegrafConfig>;

    /// Create a configuration, returning it with its assigned ID.
    async fn create_telegraf_config(
        &self,
        config: TelegrafConfig,
        user_id: UserId,
    ) -> ServiceResult<TelegrafConfig>;

    async fn delete_telegraf_config(&self, id: TelegrafId) -> ServiceResult<()>;
}

/// Dashboard variable storage.
#[async_trait]
pub trait VariableService: Send + Sync {
    async fn find_variables(&self, org_id: OrgId, limit: usize) -> ServiceResult<Vec<Variable>>;

    async fn find_variable_by_id(&self, id: VariableId) -> ServiceResult<Variable>;

    /// Create a variable, returning it with its assigned ID.
    async fn create_variable(&self, variable: Variable) -> ServiceResult<Variable>;

    async fn update_variable(
        &self,
        id: VariableId,
        update: VariableUpdate,
    ) -> ServiceResult<Variable>;

    async fn delete_variable(&self, id: VariableId) -> ServiceResult<()>;
}

/// Read access to the organization's secret store. The engine only ever
/// checks key existence; values never cross this seam.
#[async_trait]
pub trait SecretService: Send + Sync {
    async fn secret_keys(&self, org_id: OrgId) -> ServiceResult<Vec<String>>;
}
