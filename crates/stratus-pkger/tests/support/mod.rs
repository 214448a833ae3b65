//! Shared in-memory mock services for the engine's integration tests.
//!
//! Each mock keeps its resources in a hash map, counts every call with
//! atomics, and supports per-name failure injection plus an optional
//! create delay. All mocks share one event log (for ordering
//! assertions) and one in-flight gauge (for concurrency assertions).

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use stratus_core::{
    Bucket, BucketId, BucketService, BucketUpdate, Dashboard, DashboardId, DashboardService,
    EndpointId, EndpointKind, HttpAuth, Label, LabelFilter, LabelId, LabelMapping, LabelService,
    LabelUpdate, NotificationEndpoint, NotificationEndpointService, OrgId, ResourceId,
    ResourceType, SecretService, ServiceError, ServiceResult, TelegrafConfig, TelegrafId,
    TelegrafService, UserId, Variable, VariableId, VariableService, VariableUpdate,
};
use stratus_pkger::PkgerService;

/// Shared log of mutation events, in completion order.
pub type EventLog = Arc<Mutex<Vec<String>>>;

pub fn record(events: &EventLog, event: impl Into<String>) {
    events.lock().unwrap().push(event.into());
}

/// Tracks how many port calls are in flight at once and the high-water
/// mark across the whole run.
#[derive(Default)]
pub struct InFlightGauge {
    current: AtomicUsize,
    max: AtomicUsize,
}

impl InFlightGauge {
    pub fn enter(&self) {
        let current = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max.fetch_max(current, Ordering::SeqCst);
    }

    pub fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn high_water_mark(&self) -> usize {
        self.max.load(Ordering::SeqCst)
    }
}

/// Per-mock failure injection and pacing knobs.
#[derive(Default)]
struct Behavior {
    fail_create: Mutex<HashMap<String, String>>,
    create_delay: Mutex<Option<Duration>>,
}

impl Behavior {
    fn injected_failure(&self, name: &str) -> Option<String> {
        self.fail_create.lock().unwrap().get(name).cloned()
    }

    fn delay(&self) -> Option<Duration> {
        *self.create_delay.lock().unwrap()
    }
}

pub struct MockBuckets {
    store: Mutex<HashMap<BucketId, Bucket>>,
    behavior: Behavior,
    pub create_calls: AtomicUsize,
    pub update_calls: AtomicUsize,
    pub delete_calls: AtomicUsize,
    events: EventLog,
    gauge: Arc<InFlightGauge>,
}

impl MockBuckets {
    fn new(events: EventLog, gauge: Arc<InFlightGauge>) -> Self {
        Self {
            store: Mutex::new(HashMap::new()),
            behavior: Behavior::default(),
            create_calls: AtomicUsize::new(0),
            update_calls: AtomicUsize::new(0),
            delete_calls: AtomicUsize::new(0),
            events,
            gauge,
        }
    }

    pub fn seed(&self, bucket: Bucket) {
        self.store.lock().unwrap().insert(bucket.id, bucket);
    }

    pub fn fail_create(&self, name: &str, msg: &str) {
        self.behavior
            .fail_create
            .lock()
            .unwrap()
            .insert(name.to_string(), msg.to_string());
    }

    pub fn set_create_delay(&self, delay: Duration) {
        *self.behavior.create_delay.lock().unwrap() = Some(delay);
    }

    pub fn get_by_name(&self, org_id: OrgId, name: &str) -> Option<Bucket> {
        self.store
            .lock()
            .unwrap()
            .values()
            .find(|b| b.org_id == org_id && b.name == name)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.store.lock().unwrap().len()
    }

    pub fn mutation_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
            + self.update_calls.load(Ordering::SeqCst)
            + self.delete_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BucketService for MockBuckets {
    async fn find_bucket_by_id(&self, id: BucketId) -> ServiceResult<Bucket> {
        self.store
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| ServiceError::not_found("bucket", id))
    }

    async fn find_bucket_by_name(&self, org_id: OrgId, name: &str) -> ServiceResult<Bucket> {
        self.get_by_name(org_id, name)
            .ok_or_else(|| ServiceError::not_found("bucket", name))
    }

    async fn find_buckets(&self, org_id: OrgId) -> ServiceResult<Vec<Bucket>> {
        Ok(self
            .store
            .lock()
            .unwrap()
            .values()
            .filter(|b| b.org_id == org_id)
            .cloned()
            .collect())
    }

    async fn create_bucket(&self, mut bucket: Bucket) -> ServiceResult<Bucket> {
        self.gauge.enter();
        if let Some(delay) = self.behavior.delay() {
            tokio::time::sleep(delay).await;
        }
        self.create_calls.fetch_add(1, Ordering::SeqCst);

        let result = if let Some(msg) = self.behavior.injected_failure(&bucket.name) {
            Err(ServiceError::Internal { message: msg })
        } else {
            bucket.id = BucketId::new();
            self.store.lock().unwrap().insert(bucket.id, bucket.clone());
            record(&self.events, format!("create:bucket:{}", bucket.name));
            Ok(bucket)
        };
        self.gauge.exit();
        result
    }

    async fn update_bucket(&self, id: BucketId, update: BucketUpdate) -> ServiceResult<Bucket> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        let mut store = self.store.lock().unwrap();
        let bucket = store
            .get_mut(&id)
            .ok_or_else(|| ServiceError::not_found("bucket", id))?;
        if let Some(description) = update.description {
            bucket.description = description;
        }
        if let Some(retention) = update.retention_period {
            bucket.retention_period = (retention > Duration::ZERO).then_some(retention);
        }
        record(&self.events, format!("update:bucket:{}", bucket.name));
        Ok(bucket.clone())
    }

    async fn delete_bucket(&self, id: BucketId) -> ServiceResult<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        let removed = self.store.lock().unwrap().remove(&id);
        match removed {
            Some(bucket) => {
                record(&self.events, format!("delete:bucket:{}", bucket.name));
                Ok(())
            }
            None => Err(ServiceError::not_found("bucket", id)),
        }
    }
}

pub struct MockLabels {
    store: Mutex<HashMap<LabelId, Label>>,
    mappings: Mutex<Vec<LabelMapping>>,
    behavior: Behavior,
    fail_mapping: Mutex<bool>,
    pub create_calls: AtomicUsize,
    pub update_calls: AtomicUsize,
    pub delete_calls: AtomicUsize,
    pub mapping_creates: AtomicUsize,
    pub mapping_deletes: AtomicUsize,
    events: EventLog,
    gauge: Arc<InFlightGauge>,
}

impl MockLabels {
    fn new(events: EventLog, gauge: Arc<InFlightGauge>) -> Self {
        Self {
            store: Mutex::new(HashMap::new()),
            mappings: Mutex::new(Vec::new()),
            behavior: Behavior::default(),
            fail_mapping: Mutex::new(false),
            create_calls: AtomicUsize::new(0),
            update_calls: AtomicUsize::new(0),
            delete_calls: AtomicUsize::new(0),
            mapping_creates: AtomicUsize::new(0),
            mapping_deletes: AtomicUsize::new(0),
            events,
            gauge,
        }
    }

    pub fn seed(&self, label: Label) {
        self.store.lock().unwrap().insert(label.id, label);
    }

    pub fn seed_mapping(&self, mapping: LabelMapping) {
        self.mappings.lock().unwrap().push(mapping);
    }

    pub fn fail_create(&self, name: &str, msg: &str) {
        self.behavior
            .fail_create
            .lock()
            .unwrap()
            .insert(name.to_string(), msg.to_string());
    }

    pub fn fail_mappings(&self) {
        *self.fail_mapping.lock().unwrap() = true;
    }

    pub fn set_create_delay(&self, delay: Duration) {
        *self.behavior.create_delay.lock().unwrap() = Some(delay);
    }

    pub fn get_by_name(&self, org_id: OrgId, name: &str) -> Option<Label> {
        self.store
            .lock()
            .unwrap()
            .values()
            .find(|l| l.org_id == org_id && l.name == name)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.store.lock().unwrap().len()
    }

    pub fn mapping_count(&self) -> usize {
        self.mappings.lock().unwrap().len()
    }

    pub fn mutation_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
            + self.update_calls.load(Ordering::SeqCst)
            + self.delete_calls.load(Ordering::SeqCst)
            + self.mapping_creates.load(Ordering::SeqCst)
            + self.mapping_deletes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LabelService for MockLabels {
    async fn find_label_by_id(&self, id: LabelId) -> ServiceResult<Label> {
        self.store
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| ServiceError::not_found("label", id))
    }

    async fn find_labels(&self, filter: LabelFilter) -> ServiceResult<Vec<Label>> {
        let store = self.store.lock().unwrap();
        let mut labels: Vec<Label> = store
            .values()
            .filter(|l| filter.org_id.map_or(true, |org| l.org_id == org))
            .filter(|l| filter.name.as_deref().map_or(true, |name| l.name == name))
            .cloned()
            .collect();
        labels.sort_by(|a, b| a.name.cmp(&b.name));
        if let Some(limit) = filter.limit {
            labels.truncate(limit);
        }
        Ok(labels)
    }

    async fn create_label(&self, mut label: Label) -> ServiceResult<Label> {
        self.gauge.enter();
        if let Some(delay) = self.behavior.delay() {
            tokio::time::sleep(delay).await;
        }
        self.create_calls.fetch_add(1, Ordering::SeqCst);

        let result = if let Some(msg) = self.behavior.injected_failure(&label.name) {
            Err(ServiceError::Internal { message: msg })
        } else {
            label.id = LabelId::new();
            self.store.lock().unwrap().insert(label.id, label.clone());
            record(&self.events, format!("create:label:{}", label.name));
            Ok(label)
        };
        self.gauge.exit();
        result
    }

    async fn update_label(&self, id: LabelId, update: LabelUpdate) -> ServiceResult<Label> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        let mut store = self.store.lock().unwrap();
        let label = store
            .get_mut(&id)
            .ok_or_else(|| ServiceError::not_found("label", id))?;
        if let Some(name) = update.name {
            label.name = name;
        }
        if let Some(properties) = update.properties {
            label.properties = properties;
        }
        record(&self.events, format!("update:label:{}", label.name));
        Ok(label.clone())
    }

    async fn delete_label(&self, id: LabelId) -> ServiceResult<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        let removed = self.store.lock().unwrap().remove(&id);
        match removed {
            Some(label) => {
                record(&self.events, format!("delete:label:{}", label.name));
                Ok(())
            }
            None => Err(ServiceError::not_found("label", id)),
        }
    }

    async fn find_resource_labels(
        &self,
        resource_id: ResourceId,
        resource_type: ResourceType,
    ) -> ServiceResult<Vec<Label>> {
        let mappings = self.mappings.lock().unwrap();
        let store = self.store.lock().unwrap();
        Ok(mappings
            .iter()
            .filter(|m| m.resource_id == resource_id && m.resource_type == resource_type)
            .filter_map(|m| store.get(&m.label_id).cloned())
            .collect())
    }

    async fn create_label_mapping(&self, mapping: LabelMapping) -> ServiceResult<()> {
        self.mapping_creates.fetch_add(1, Ordering::SeqCst);
        if *self.fail_mapping.lock().unwrap() {
            return Err(ServiceError::Internal {
                message: "mapping rejected".to_string(),
            });
        }
        self.mappings.lock().unwrap().push(mapping);
        record(
            &self.events,
            format!("create:mapping:{}:{}", mapping.resource_id, mapping.label_id),
        );
        Ok(())
    }

    async fn delete_label_mapping(&self, mapping: &LabelMapping) -> ServiceResult<()> {
        self.mapping_deletes.fetch_add(1, Ordering::SeqCst);
        self.mappings
            .lock()
            .unwrap()
            .retain(|m| !(m.label_id == mapping.label_id && m.resource_id == mapping.resource_id));
        record(
            &self.events,
            format!("delete:mapping:{}:{}", mapping.resource_id, mapping.label_id),
        );
        Ok(())
    }
}

pub struct MockDashboards {
    store: Mutex<HashMap<DashboardId, Dashboard>>,
    behavior: Behavior,
    pub create_calls: AtomicUsize,
    pub delete_calls: AtomicUsize,
    events: EventLog,
    gauge: Arc<InFlightGauge>,
}

impl MockDashboards {
    fn new(events: EventLog, gauge: Arc<InFlightGauge>) -> Self {
        Self {
            store: Mutex::new(HashMap::new()),
            behavior: Behavior::default(),
            create_calls: AtomicUsize::new(0),
            delete_calls: AtomicUsize::new(0),
            events,
            gauge,
        }
    }

    pub fn seed(&self, dashboard: Dashboard) {
        self.store.lock().unwrap().insert(dashboard.id, dashboard);
    }

    pub fn fail_create(&self, name: &str, msg: &str) {
        self.behavior
            .fail_create
            .lock()
            .unwrap()
            .insert(name.to_string(), msg.to_string());
    }

    pub fn len(&self) -> usize {
        self.store.lock().unwrap().len()
    }

    pub fn mutation_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst) + self.delete_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DashboardService for MockDashboards {
    async fn find_dashboards(&self, org_id: OrgId, limit: usize) -> ServiceResult<Vec<Dashboard>> {
        let mut dashboards: Vec<Dashboard> = self
            .store
            .lock()
            .unwrap()
            .values()
            .filter(|d| d.org_id == org_id)
            .cloned()
            .collect();
        dashboards.sort_by(|a, b| a.name.cmp(&b.name));
        dashboards.truncate(limit);
        Ok(dashboards)
    }

    async fn find_dashboard_by_id(&self, id: DashboardId) -> ServiceResult<Dashboard> {
        self.store
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| ServiceError::not_found("dashboard", id))
    }

    async fn create_dashboard(&self, mut dashboard: Dashboard) -> ServiceResult<Dashboard> {
        self.gauge.enter();
        if let Some(delay) = self.behavior.delay() {
            tokio::time::sleep(delay).await;
        }
        self.create_calls.fetch_add(1, Ordering::SeqCst);

        let result = if let Some(msg) = self.behavior.injected_failure(&dashboard.name) {
            Err(ServiceError::Internal { message: msg })
        } else {
            dashboard.id = DashboardId::new();
            self.store
                .lock()
                .unwrap()
                .insert(dashboard.id, dashboard.clone());
            record(&self.events, format!("create:dashboard:{}", dashboard.name));
            Ok(dashboard)
        };
        self.gauge.exit();
        result
    }

    async fn delete_dashboard(&self, id: DashboardId) -> ServiceResult<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        let removed = self.store.lock().unwrap().remove(&id);
        match removed {
            Some(dashboard) => {
                record(&self.events, format!("delete:dashboard:{}", dashboard.name));
                Ok(())
            }
            None => Err(ServiceError::not_found("dashboard", id)),
        }
    }
}

pub struct MockEndpoints {
    store: Mutex<HashMap<EndpointId, NotificationEndpoint>>,
    behavior: Behavior,
    pub create_calls: AtomicUsize,
    pub update_calls: AtomicUsize,
    pub delete_calls: AtomicUsize,
    events: EventLog,
    gauge: Arc<InFlightGauge>,
}

impl MockEndpoints {
    fn new(events: EventLog, gauge: Arc<InFlightGauge>) -> Self {
        Self {
            store: Mutex::new(HashMap::new()),
            behavior: Behavior::default(),
            create_calls: AtomicUsize::new(0),
            update_calls: AtomicUsize::new(0),
            delete_calls: AtomicUsize::new(0),
            events,
            gauge,
        }
    }

    pub fn seed(&self, endpoint: NotificationEndpoint) {
        self.store.lock().unwrap().insert(endpoint.id, endpoint);
    }

    pub fn fail_create(&self, name: &str, msg: &str) {
        self.behavior
            .fail_create
            .lock()
            .unwrap()
            .insert(name.to_string(), msg.to_string());
    }

    pub fn get_by_name(&self, org_id: OrgId, name: &str) -> Option<NotificationEndpoint> {
        self.store
            .lock()
            .unwrap()
            .values()
            .find(|e| e.org_id == org_id && e.name == name)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.store.lock().unwrap().len()
    }

    pub fn mutation_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
            + self.update_calls.load(Ordering::SeqCst)
            + self.delete_calls.load(Ordering::SeqCst)
    }
}

/// Rewrite an endpoint's secret fields to the canonical keys the
/// platform generates from the endpoint ID.
fn assign_canonical_secret_keys(endpoint: &mut NotificationEndpoint) {
    let id = endpoint.id;
    match &mut endpoint.kind {
        EndpointKind::Http { auth, .. } => match auth {
            HttpAuth::None => {}
            HttpAuth::Basic { username, password } => {
                username.key = format!("{id}-username");
                password.key = format!("{id}-password");
            }
            HttpAuth::Bearer { token } => token.key = format!("{id}-token"),
        },
        EndpointKind::Slack { token, .. } => token.key = format!("{id}-token"),
        EndpointKind::PagerDuty { routing_key, .. } => {
            routing_key.key = format!("{id}-routing-key");
        }
    }
}

#[async_trait]
impl NotificationEndpointService for MockEndpoints {
    async fn find_endpoints(&self, org_id: OrgId) -> ServiceResult<Vec<NotificationEndpoint>> {
        Ok(self
            .store
            .lock()
            .unwrap()
            .values()
            .filter(|e| e.org_id == org_id)
            .cloned()
            .collect())
    }

    async fn find_endpoint_by_id(&self, id: EndpointId) -> ServiceResult<NotificationEndpoint> {
        self.store
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| ServiceError::not_found("notification endpoint", id))
    }

    async fn create_endpoint(
        &self,
        mut endpoint: NotificationEndpoint,
        _user_id: UserId,
    ) -> ServiceResult<NotificationEndpoint> {
        self.gauge.enter();
        if let Some(delay) = self.behavior.delay() {
            tokio::time::sleep(delay).await;
        }
        self.create_calls.fetch_add(1, Ordering::SeqCst);

        let result = if let Some(msg) = self.behavior.injected_failure(&endpoint.name) {
            Err(ServiceError::Internal { message: msg })
        } else {
            endpoint.id = EndpointId::new();
            assign_canonical_secret_keys(&mut endpoint);
            self.store
                .lock()
                .unwrap()
                .insert(endpoint.id, endpoint.clone());
            record(&self.events, format!("create:endpoint:{}", endpoint.name));
            Ok(endpoint)
        };
        self.gauge.exit();
        result
    }

    async fn update_endpoint(
        &self,
        id: EndpointId,
        mut endpoint: NotificationEndpoint,
        _user_id: UserId,
    ) -> ServiceResult<NotificationEndpoint> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        let mut store = self.store.lock().unwrap();
        if !store.contains_key(&id) {
            return Err(ServiceError::not_found("notification endpoint", id));
        }
        endpoint.id = id;
        store.insert(id, endpoint.clone());
        record(&self.events, format!("update:endpoint:{}", endpoint.name));
        Ok(endpoint)
    }

    async fn delete_endpoint(&self, id: EndpointId) -> ServiceResult<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        let removed = self.store.lock().unwrap().remove(&id);
        match removed {
            Some(endpoint) => {
                record(&self.events, format!("delete:endpoint:{}", endpoint.name));
                Ok(())
            }
            None => Err(ServiceError::not_found("notification endpoint", id)),
        }
    }
}

pub struct MockTelegrafs {
    store: Mutex<HashMap<TelegrafId, TelegrafConfig>>,
    behavior: Behavior,
    pub create_calls: AtomicUsize,
    pub delete_calls: AtomicUsize,
    events: EventLog,
    gauge: Arc<InFlightGauge>,
}

impl MockTelegrafs {
    fn new(events: EventLog, gauge: Arc<InFlightGauge>) -> Self {
        Self {
            store: Mutex::new(HashMap::new()),
            behavior: Behavior::default(),
            create_calls: AtomicUsize::new(0),
            delete_calls: AtomicUsize::new(0),
            events,
            gauge,
        }
    }

    pub fn seed(&self, config: TelegrafConfig) {
        self.store.lock().unwrap().insert(config.id, config);
    }

    pub fn fail_create(&self, name: &str, msg: &str) {
        self.behavior
            .fail_create
            .lock()
            .unwrap()
            .insert(name.to_string(), msg.to_string());
    }

    pub fn len(&self) -> usize {
        self.store.lock().unwrap().len()
    }

    pub fn mutation_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst) + self.delete_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TelegrafService for MockTelegrafs {
    async fn find_telegraf_configs(&self, org_id: OrgId) -> ServiceResult<Vec<TelegrafConfig>> {
        Ok(self
            .store
            .lock()
            .unwrap()
            .values()
            .filter(|t| t.org_id == org_id)
            .cloned()
            .collect())
    }

    async fn find_telegraf_by_id(&self, id: TelegrafId) -> ServiceResult<TelegrafConfig> {
        self.store
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| ServiceError::not_found("telegraf config", id))
    }

    async fn create_telegraf_config(
        &self,
        mut config: TelegrafConfig,
        _user_id: UserId,
    ) -> ServiceResult<TelegrafConfig> {
        self.gauge.enter();
        if let Some(delay) = self.behavior.delay() {
            tokio::time::sleep(delay).await;
        }
        self.create_calls.fetch_add(1, Ordering::SeqCst);

        let result = if let Some(msg) = self.behavior.injected_failure(&config.name) {
            Err(ServiceError::Internal { message: msg })
        } else {
            config.id = TelegrafId::new();
            self.store.lock().unwrap().insert(config.id, config.clone());
            record(&self.events, format!("create:telegraf:{}", config.name));
            Ok(config)
        };
        self.gauge.exit();
        result
    }

    async fn delete_telegraf_config(&self, id: TelegrafId) -> ServiceResult<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        let removed = self.store.lock().unwrap().remove(&id);
        match removed {
            Some(config) => {
                record(&self.events, format!("delete:telegraf:{}", config.name));
                Ok(())
            }
            None => Err(ServiceError::not_found("telegraf config", id)),
        }
    }
}

pub struct MockVariables {
    store: Mutex<HashMap<VariableId, Variable>>,
    behavior: Behavior,
    pub create_calls: AtomicUsize,
    pub update_calls: AtomicUsize,
    pub delete_calls: AtomicUsize,
    events: EventLog,
    gauge: Arc<InFlightGauge>,
}

impl MockVariables {
    fn new(events: EventLog, gauge: Arc<InFlightGauge>) -> Self {
        Self {
            store: Mutex::new(HashMap::new()),
            behavior: Behavior::default(),
            create_calls: AtomicUsize::new(0),
            update_calls: AtomicUsize::new(0),
            delete_calls: AtomicUsize::new(0),
            events,
            gauge,
        }
    }

    pub fn seed(&self, variable: Variable) {
        self.store.lock().unwrap().insert(variable.id, variable);
    }

    pub fn fail_create(&self, name: &str, msg: &str) {
        self.behavior
            .fail_create
            .lock()
            .unwrap()
            .insert(name.to_string(), msg.to_string());
    }

    pub fn get_by_name(&self, org_id: OrgId, name: &str) -> Option<Variable> {
        self.store
            .lock()
            .unwrap()
            .values()
            .find(|v| v.org_id == org_id && v.name == name)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.store.lock().unwrap().len()
    }

    pub fn mutation_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
            + self.update_calls.load(Ordering::SeqCst)
            + self.delete_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VariableService for MockVariables {
    async fn find_variables(&self, org_id: OrgId, limit: usize) -> ServiceResult<Vec<Variable>> {
        let mut variables: Vec<Variable> = self
            .store
            .lock()
            .unwrap()
            .values()
            .filter(|v| v.org_id == org_id)
            .cloned()
            .collect();
        variables.sort_by(|a, b| a.name.cmp(&b.name));
        variables.truncate(limit);
        Ok(variables)
    }

    async fn find_variable_by_id(&self, id: VariableId) -> ServiceResult<Variable> {
        self.store
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| ServiceError::not_found("variable", id))
    }

    async fn create_variable(&self, mut variable: Variable) -> ServiceResult<Variable> {
        self.gauge.enter();
        if let Some(delay) = self.behavior.delay() {
            tokio::time::sleep(delay).await;
        }
        self.create_calls.fetch_add(1, Ordering::SeqCst);

        let result = if let Some(msg) = self.behavior.injected_failure(&variable.name) {
            Err(ServiceError::Internal { message: msg })
        } else {
            variable.id = VariableId::new();
            self.store
                .lock()
                .unwrap()
                .insert(variable.id, variable.clone());
            record(&self.events, format!("create:variable:{}", variable.name));
            Ok(variable)
        };
        self.gauge.exit();
        result
    }

    async fn update_variable(
        &self,
        id: VariableId,
        update: VariableUpdate,
    ) -> ServiceResult<Variable> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        let mut store = self.store.lock().unwrap();
        let variable = store
            .get_mut(&id)
            .ok_or_else(|| ServiceError::not_found("variable", id))?;
        if let Some(description) = update.description {
            variable.description = description;
        }
        if let Some(arguments) = update.arguments {
            variable.arguments = arguments;
        }
        record(&self.events, format!("update:variable:{}", variable.name));
        Ok(variable.clone())
    }

    async fn delete_variable(&self, id: VariableId) -> ServiceResult<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        let removed = self.store.lock().unwrap().remove(&id);
        match removed {
            Some(variable) => {
                record(&self.events, format!("delete:variable:{}", variable.name));
                Ok(())
            }
            None => Err(ServiceError::not_found("variable", id)),
        }
    }
}

#[derive(Default)]
pub struct MockSecrets {
    keys: Mutex<HashMap<OrgId, Vec<String>>>,
}

impl MockSecrets {
    pub fn seed(&self, org_id: OrgId, keys: impl IntoIterator<Item = impl Into<String>>) {
        self.keys
            .lock()
            .unwrap()
            .entry(org_id)
            .or_default()
            .extend(keys.into_iter().map(Into::into));
    }
}

#[async_trait]
impl SecretService for MockSecrets {
    async fn secret_keys(&self, org_id: OrgId) -> ServiceResult<Vec<String>> {
        Ok(self
            .keys
            .lock()
            .unwrap()
            .get(&org_id)
            .cloned()
            .unwrap_or_default())
    }
}

/// Everything a test needs: the mocks, the shared event log and gauge,
/// and a service wired to all of them.
pub struct Harness {
    pub buckets: Arc<MockBuckets>,
    pub labels: Arc<MockLabels>,
    pub dashboards: Arc<MockDashboards>,
    pub endpoints: Arc<MockEndpoints>,
    pub telegrafs: Arc<MockTelegrafs>,
    pub variables: Arc<MockVariables>,
    pub secrets: Arc<MockSecrets>,
    pub events: EventLog,
    pub gauge: Arc<InFlightGauge>,
}

impl Harness {
    pub fn new() -> Self {
        let events: EventLog = Arc::new(Mutex::new(Vec::new()));
        let gauge = Arc::new(InFlightGauge::default());
        Self {
            buckets: Arc::new(MockBuckets::new(Arc::clone(&events), Arc::clone(&gauge))),
            labels: Arc::new(MockLabels::new(Arc::clone(&events), Arc::clone(&gauge))),
            dashboards: Arc::new(MockDashboards::new(Arc::clone(&events), Arc::clone(&gauge))),
            endpoints: Arc::new(MockEndpoints::new(Arc::clone(&events), Arc::clone(&gauge))),
            telegrafs: Arc::new(MockTelegrafs::new(Arc::clone(&events), Arc::clone(&gauge))),
            variables: Arc::new(MockVariables::new(Arc::clone(&events), Arc::clone(&gauge))),
            secrets: Arc::new(MockSecrets::default()),
            events,
            gauge,
        }
    }

    pub fn service(&self) -> PkgerService {
        self.service_with_limit(stratus_pkger::DEFAULT_APPLY_REQ_LIMIT)
    }

    pub fn service_with_limit(&self, apply_req_limit: usize) -> PkgerService {
        PkgerService::builder()
            .with_bucket_service(Arc::clone(&self.buckets) as Arc<dyn BucketService>)
            .with_dashboard_service(Arc::clone(&self.dashboards) as Arc<dyn DashboardService>)
            .with_label_service(Arc::clone(&self.labels) as Arc<dyn LabelService>)
            .with_notification_endpoint_service(
                Arc::clone(&self.endpoints) as Arc<dyn NotificationEndpointService>,
            )
            .with_secret_service(Arc::clone(&self.secrets) as Arc<dyn SecretService>)
            .with_telegraf_service(Arc::clone(&self.telegrafs) as Arc<dyn TelegrafService>)
            .with_variable_service(Arc::clone(&self.variables) as Arc<dyn VariableService>)
            .with_apply_req_limit(apply_req_limit)
            .build()
            .expect("all services configured")
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    /// Position of the first event matching the prefix, if any.
    pub fn event_index(&self, prefix: &str) -> Option<usize> {
        self.events().iter().position(|e| e.starts_with(prefix))
    }

    pub fn total_mutations(&self) -> usize {
        self.buckets.mutation_calls()
            + self.labels.mutation_calls()
            + self.dashboards.mutation_calls()
            + self.endpoints.mutation_calls()
            + self.telegrafs.mutation_calls()
            + self.variables.mutation_calls()
    }
}
