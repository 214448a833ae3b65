//! The package document model.
//!
//! A package is a portable, versioned document describing a set of
//! platform resources and the label associations among them. This module
//! decodes the external YAML/JSON shape into typed records, validates
//! them, and tracks the per-record bindings (`id`, `existing`) the dry
//! run and apply phases read and write.
//!
//! Decoding is forgiving: resources that fail to decode are recorded as
//! validation failures and skipped, so a dry run can still report on the
//! rest of the document.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use stratus_core::{
    Bucket, BucketId, BucketType, DashboardId, EndpointId, EndpointKind, EndpointStatus, HttpAuth,
    Label, LabelId, LabelProperties, NotificationEndpoint, OrgId, ResourceId, ResourceType,
    SecretField, TelegrafConfig, TelegrafId, Variable, VariableArguments, VariableId,
};

use crate::error::{PkgerError, PkgerResult, ValidationError, ValidationFailure};

/// The package document API version this engine understands.
pub const API_VERSION: &str = "0.1.0";

/// Document kind of the package envelope itself.
pub const KIND_PACKAGE: &str = "Package";

/// Document-level resource kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    Bucket,
    Dashboard,
    Label,
    /// Generic endpoint kind, accepted for clone targets where the
    /// destination subtype is discovered from the platform record.
    NotificationEndpoint,
    #[serde(rename = "NotificationEndpointHTTP")]
    NotificationEndpointHttp,
    NotificationEndpointSlack,
    NotificationEndpointPagerDuty,
    Telegraf,
    Variable,
}

impl ResourceKind {
    /// Parse a document kind string. Matching is case-insensitive.
    #[must_use]
    pub fn parse(kind: &str) -> Option<Self> {
        let kind = kind.trim();
        let candidates = [
            ("Bucket", ResourceKind::Bucket),
            ("Dashboard", ResourceKind::Dashboard),
            ("Label", ResourceKind::Label),
            ("NotificationEndpoint", ResourceKind::NotificationEndpoint),
            ("NotificationEndpointHTTP", ResourceKind::NotificationEndpointHttp),
            ("NotificationEndpointSlack", ResourceKind::NotificationEndpointSlack),
            (
                "NotificationEndpointPagerDuty",
                ResourceKind::NotificationEndpointPagerDuty,
            ),
            ("Telegraf", ResourceKind::Telegraf),
            ("Variable", ResourceKind::Variable),
        ];
        candidates
            .iter()
            .find(|(name, _)| kind.eq_ignore_ascii_case(name))
            .map(|(_, k)| *k)
    }

    /// Canonical document spelling.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Bucket => "Bucket",
            ResourceKind::Dashboard => "Dashboard",
            ResourceKind::Label => "Label",
            ResourceKind::NotificationEndpoint => "NotificationEndpoint",
            ResourceKind::NotificationEndpointHttp => "NotificationEndpointHTTP",
            ResourceKind::NotificationEndpointSlack => "NotificationEndpointSlack",
            ResourceKind::NotificationEndpointPagerDuty => "NotificationEndpointPagerDuty",
            ResourceKind::Telegraf => "Telegraf",
            ResourceKind::Variable => "Variable",
        }
    }

    /// The platform taxonomy this document kind maps onto.
    #[must_use]
    pub fn resource_type(&self) -> ResourceType {
        match self {
            ResourceKind::Bucket => ResourceType::Bucket,
            ResourceKind::Dashboard => ResourceType::Dashboard,
            ResourceKind::Label => ResourceType::Label,
            ResourceKind::NotificationEndpoint
            | ResourceKind::NotificationEndpointHttp
            | ResourceKind::NotificationEndpointSlack
            | ResourceKind::NotificationEndpointPagerDuty => ResourceType::NotificationEndpoint,
            ResourceKind::Telegraf => ResourceType::Telegraf,
            ResourceKind::Variable => ResourceType::Variable,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Package metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageMeta {
    #[serde(rename = "pkgName", default)]
    pub name: String,
    #[serde(rename = "pkgVersion", default)]
    pub version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

/// A label association declared on a non-label resource. The `exists`
/// flag is set by the dry run when the platform already has the mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LabelAssociation {
    pub name: String,
    pub exists: bool,
}

impl LabelAssociation {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            exists: false,
        }
    }
}

/// A reference into the organization's secret store. The key may be
/// rewritten after an endpoint create to the canonical key generated by
/// the platform.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct SecretRef {
    pub key: String,
}

impl SecretRef {
    fn new(key: Option<String>) -> Self {
        Self {
            key: key.unwrap_or_default(),
        }
    }
}

pub(crate) type Records<T> = Arc<Mutex<Vec<T>>>;

/// Run a closure under a record mutex. Critical sections stay short and
/// never hold the guard across an await point.
pub(crate) fn with_lock<T, R>(records: &Mutex<T>, f: impl FnOnce(&mut T) -> R) -> R {
    let mut guard = records.lock().expect("records mutex poisoned");
    f(&mut guard)
}

/// Desired bucket state plus its apply-time bindings.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PkgBucket {
    pub name: String,
    pub description: String,
    pub retention_period: Option<Duration>,
    pub labels: Vec<LabelAssociation>,
    pub id: Option<BucketId>,
    pub existing: Option<Bucket>,
}

impl PkgBucket {
    /// False when the platform bucket already matches the desired state,
    /// in which case apply skips the port call entirely.
    pub fn should_apply(&self) -> bool {
        match &self.existing {
            None => true,
            Some(existing) => {
                existing.description != self.description
                    || existing.retention_period != self.retention_period
            }
        }
    }

    pub fn to_bucket(&self, org_id: OrgId) -> Bucket {
        Bucket {
            id: self.id.unwrap_or(BucketId::nil()),
            org_id,
            name: self.name.clone(),
            description: self.description.clone(),
            retention_period: self.retention_period,
            bucket_type: BucketType::User,
        }
    }
}

/// Desired label state plus its apply-time bindings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PkgLabel {
    pub name: String,
    pub color: String,
    pub description: String,
    pub id: Option<LabelId>,
    pub existing: Option<Label>,
}

impl PkgLabel {
    pub fn properties(&self) -> LabelProperties {
        LabelProperties {
            color: self.color.clone(),
            description: self.description.clone(),
        }
    }

    pub fn should_apply(&self) -> bool {
        match &self.existing {
            None => true,
            Some(existing) => existing.properties != self.properties(),
        }
    }

    pub fn to_label(&self, org_id: OrgId) -> Label {
        Label {
            id: self.id.unwrap_or(LabelId::nil()),
            org_id,
            name: self.name.clone(),
            properties: self.properties(),
        }
    }
}

/// One chart on a package dashboard. Converted to a cell grid entry at
/// apply time.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PkgChart {
    pub name: String,
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub properties: JsonValue,
}

/// Desired dashboard state. Dashboards have no update path; they are
/// always created fresh and rolled back by delete.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PkgDashboard {
    pub name: String,
    pub description: String,
    pub charts: Vec<PkgChart>,
    pub labels: Vec<LabelAssociation>,
    pub id: Option<DashboardId>,
}

/// Desired variable state plus its apply-time bindings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PkgVariable {
    pub name: String,
    pub description: String,
    pub arguments: VariableArguments,
    pub labels: Vec<LabelAssociation>,
    pub id: Option<VariableId>,
    pub existing: Option<Variable>,
}

impl PkgVariable {
    pub fn should_apply(&self) -> bool {
        match &self.existing {
            None => true,
            Some(existing) => {
                existing.description != self.description || existing.arguments != self.arguments
            }
        }
    }

    pub fn to_variable(&self, org_id: OrgId) -> Variable {
        Variable {
            id: self.id.unwrap_or(VariableId::nil()),
            org_id,
            name: self.name.clone(),
            description: self.description.clone(),
            arguments: self.arguments.clone(),
        }
    }
}

/// Desired telegraf configuration. Create-only, rollback is delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PkgTelegraf {
    pub name: String,
    pub description: String,
    pub config: String,
    pub labels: Vec<LabelAssociation>,
    pub id: Option<TelegrafId>,
}

impl PkgTelegraf {
    pub fn to_telegraf(&self, org_id: OrgId) -> TelegrafConfig {
        TelegrafConfig {
            id: self.id.unwrap_or(TelegrafId::nil()),
            org_id,
            name: self.name.clone(),
            description: self.description.clone(),
            config: self.config.clone(),
        }
    }
}

/// Authentication declared on an HTTP package endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PkgHttpAuth {
    None,
    Basic { username: SecretRef, password: SecretRef },
    Bearer { token: SecretRef },
}

/// Destination-specific shape of a package endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PkgEndpointKind {
    Http {
        url: String,
        method: String,
        auth: PkgHttpAuth,
    },
    Slack {
        url: String,
        token: SecretRef,
    },
    PagerDuty {
        client_url: String,
        routing_key: SecretRef,
    },
}

/// Desired notification endpoint state plus its apply-time bindings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PkgEndpoint {
    pub name: String,
    pub description: String,
    pub status: EndpointStatus,
    pub kind: PkgEndpointKind,
    pub labels: Vec<LabelAssociation>,
    pub id: Option<EndpointId>,
    pub existing: Option<NotificationEndpoint>,
}

impl PkgEndpoint {
    /// The document kind this endpoint round-trips to.
    pub fn resource_kind(&self) -> ResourceKind {
        match self.kind {
            PkgEndpointKind::Http { .. } => ResourceKind::NotificationEndpointHttp,
            PkgEndpointKind::Slack { .. } => ResourceKind::NotificationEndpointSlack,
            PkgEndpointKind::PagerDuty { .. } => ResourceKind::NotificationEndpointPagerDuty,
        }
    }

    /// All secret references declared on this endpoint.
    pub fn secret_refs(&self) -> Vec<&SecretRef> {
        match &self.kind {
            PkgEndpointKind::Http { auth, .. } => match auth {
                PkgHttpAuth::None => vec![],
                PkgHttpAuth::Basic { username, password } => vec![username, password],
                PkgHttpAuth::Bearer { token } => vec![token],
            },
            PkgEndpointKind::Slack { token, .. } => vec![token],
            PkgEndpointKind::PagerDuty { routing_key, .. } => vec![routing_key],
        }
    }

    /// Rewrite the secret reference whose role matches the suffix of the
    /// given platform-generated key.
    pub fn bind_secret_key(&mut self, key: &str) -> bool {
        let target = match &mut self.kind {
            PkgEndpointKind::Http { auth, .. } => match auth {
                PkgHttpAuth::None => None,
                PkgHttpAuth::Basic { username, password } => {
                    if key.ends_with("-username") {
                        Some(username)
                    } else if key.ends_with("-password") {
                        Some(password)
                    } else {
                        None
                    }
                }
                PkgHttpAuth::Bearer { token } => key.ends_with("-token").then_some(token),
            },
            PkgEndpointKind::Slack { token, .. } => key.ends_with("-token").then_some(token),
            PkgEndpointKind::PagerDuty { routing_key, .. } => {
                key.ends_with("-routing-key").then_some(routing_key)
            }
        };
        match target {
            Some(secret) => {
                secret.key = key.to_string();
                true
            }
            None => false,
        }
    }

    pub fn to_endpoint(&self, org_id: OrgId) -> NotificationEndpoint {
        let kind = match &self.kind {
            PkgEndpointKind::Http { url, method, auth } => EndpointKind::Http {
                url: url.clone(),
                method: method.clone(),
                auth: match auth {
                    PkgHttpAuth::None => HttpAuth::None,
                    PkgHttpAuth::Basic { username, password } => HttpAuth::Basic {
                        username: SecretField::reference(username.key.as_str()),
                        password: SecretField::reference(password.key.as_str()),
                    },
                    PkgHttpAuth::Bearer { token } => HttpAuth::Bearer {
                        token: SecretField::reference(token.key.as_str()),
                    },
                },
            },
            PkgEndpointKind::Slack { url, token } => EndpointKind::Slack {
                url: url.clone(),
                token: SecretField::reference(token.key.as_str()),
            },
            PkgEndpointKind::PagerDuty {
                client_url,
                routing_key,
            } => EndpointKind::PagerDuty {
                client_url: client_url.clone(),
                routing_key: SecretField::reference(routing_key.key.as_str()),
            },
        };
        NotificationEndpoint {
            id: self.id.unwrap_or(EndpointId::nil()),
            org_id,
            name: self.name.clone(),
            description: self.description.clone(),
            status: self.status,
            kind,
        }
    }
}

/// Uniform access to the label associations of a non-label record, used
/// by the dry run and the mapping summary.
pub(crate) trait LabelAssociater {
    const RESOURCE_TYPE: ResourceType;

    fn resource_name(&self) -> &str;
    fn resource_id(&self) -> Option<ResourceId>;
    fn exists(&self) -> bool;
    fn associations(&self) -> &[LabelAssociation];
    fn associations_mut(&mut self) -> &mut [LabelAssociation];
}

macro_rules! impl_label_associater {
    ($record:ident, $res_type:expr, existing) => {
        impl LabelAssociater for $record {
            const RESOURCE_TYPE: ResourceType = $res_type;

            fn resource_name(&self) -> &str {
                &self.name
            }
            fn resource_id(&self) -> Option<ResourceId> {
                // Updated and skipped records keep the platform ID they
                // were matched to at dry-run time.
                self.id
                    .map(Into::into)
                    .or_else(|| self.existing.as_ref().map(|e| e.id.into()))
            }
            fn exists(&self) -> bool {
                self.existing.is_some()
            }
            fn associations(&self) -> &[LabelAssociation] {
                &self.labels
            }
            fn associations_mut(&mut self) -> &mut [LabelAssociation] {
                &mut self.labels
            }
        }
    };
    ($record:ident, $res_type:expr, create_only) => {
        impl LabelAssociater for $record {
            const RESOURCE_TYPE: ResourceType = $res_type;

            fn resource_name(&self) -> &str {
                &self.name
            }
            fn resource_id(&self) -> Option<ResourceId> {
                self.id.map(Into::into)
            }
            fn exists(&self) -> bool {
                false
            }
            fn associations(&self) -> &[LabelAssociation] {
                &self.labels
            }
            fn associations_mut(&mut self) -> &mut [LabelAssociation] {
                &mut self.labels
            }
        }
    };
}

impl_label_associater!(PkgBucket, ResourceType::Bucket, existing);
impl_label_associater!(PkgDashboard, ResourceType::Dashboard, create_only);
impl_label_associater!(PkgEndpoint, ResourceType::NotificationEndpoint, existing);
impl_label_associater!(PkgTelegraf, ResourceType::Telegraf, create_only);
impl_label_associater!(PkgVariable, ResourceType::Variable, existing);

/// A parsed package and its apply-time state. Lives for one apply call;
/// after a successful apply the record bindings are considered consumed.
#[derive(Debug)]
pub struct Package {
    meta: PackageMeta,
    buckets: Records<PkgBucket>,
    dashboards: Records<PkgDashboard>,
    labels: Records<PkgLabel>,
    endpoints: Records<PkgEndpoint>,
    telegrafs: Records<PkgTelegraf>,
    variables: Records<PkgVariable>,
    decode_failures: Vec<ValidationFailure>,
    is_parsed: bool,
    is_verified: bool,
}

impl Package {
    /// Decode a package from its YAML document form.
    ///
    /// Only a document that cannot be decoded at all produces an error;
    /// per-resource failures are recorded on the package and surface
    /// through [`Package::validate`].
    pub fn from_yaml(input: &str) -> PkgerResult<Self> {
        let doc: serde_yaml::Value = serde_yaml::from_str(input).map_err(|e| {
            PkgerError::Decode {
                message: e.to_string(),
            }
        })?;
        let doc = serde_json::to_value(doc).map_err(|e| PkgerError::Decode {
            message: e.to_string(),
        })?;
        Self::from_value(doc)
    }

    /// Decode a package from its JSON document form.
    pub fn from_json(input: &str) -> PkgerResult<Self> {
        let doc: JsonValue = serde_json::from_str(input).map_err(|e| PkgerError::Decode {
            message: e.to_string(),
        })?;
        Self::from_value(doc)
    }

    /// Decode a package from an already-deserialized document value.
    pub fn from_value(doc: JsonValue) -> PkgerResult<Self> {
        let envelope: PackageEnvelope =
            serde_json::from_value(doc).map_err(|e| PkgerError::Decode {
                message: e.to_string(),
            })?;

        let mut failures = Vec::new();
        if envelope.api_version != API_VERSION {
            failures.push(ValidationFailure {
                kind: KIND_PACKAGE.to_string(),
                idx: 0,
                field: "apiVersion".to_string(),
                reason: format!("unsupported api version {:?}", envelope.api_version),
            });
        }
        if !envelope.kind.eq_ignore_ascii_case(KIND_PACKAGE) {
            failures.push(ValidationFailure {
                kind: KIND_PACKAGE.to_string(),
                idx: 0,
                field: "kind".to_string(),
                reason: format!("document kind must be {:?}", KIND_PACKAGE),
            });
        }

        let mut sets = RecordSets::default();
        for (idx, node) in envelope.spec.resources.into_iter().enumerate() {
            sets.add(idx, node, &mut failures);
        }

        let mut pkg = Package {
            meta: envelope.meta,
            buckets: Arc::new(Mutex::new(sets.buckets)),
            dashboards: Arc::new(Mutex::new(sets.dashboards)),
            labels: Arc::new(Mutex::new(sets.labels)),
            endpoints: Arc::new(Mutex::new(sets.endpoints)),
            telegrafs: Arc::new(Mutex::new(sets.telegrafs)),
            variables: Arc::new(Mutex::new(sets.variables)),
            decode_failures: failures,
            is_parsed: false,
            is_verified: false,
        };
        // Records the parse state; failures resurface on the next
        // validate call.
        let _ = pkg.validate();
        Ok(pkg)
    }

    pub(crate) fn from_records(
        meta: PackageMeta,
        buckets: Vec<PkgBucket>,
        dashboards: Vec<PkgDashboard>,
        labels: Vec<PkgLabel>,
        endpoints: Vec<PkgEndpoint>,
        telegrafs: Vec<PkgTelegraf>,
        variables: Vec<PkgVariable>,
    ) -> Self {
        Package {
            meta,
            buckets: Arc::new(Mutex::new(buckets)),
            dashboards: Arc::new(Mutex::new(dashboards)),
            labels: Arc::new(Mutex::new(labels)),
            endpoints: Arc::new(Mutex::new(endpoints)),
            telegrafs: Arc::new(Mutex::new(telegrafs)),
            variables: Arc::new(Mutex::new(variables)),
            decode_failures: Vec::new(),
            is_parsed: true,
            is_verified: false,
        }
    }

    #[must_use]
    pub fn meta(&self) -> &PackageMeta {
        &self.meta
    }

    /// True once the document has passed validation.
    #[must_use]
    pub fn is_parsed(&self) -> bool {
        self.is_parsed
    }

    /// True once a dry run has bound the package against platform state.
    #[must_use]
    pub fn is_verified(&self) -> bool {
        self.is_verified
    }

    pub(crate) fn set_verified(&mut self) {
        self.is_verified = true;
    }

    /// Validate the package, aggregating decode failures and semantic
    /// rule violations. On success the package is marked parsed.
    pub fn validate(&mut self) -> PkgerResult<()> {
        let mut failures = self.decode_failures.clone();
        self.check_duplicate_names(&mut failures);
        self.check_associations(&mut failures);
        self.check_records(&mut failures);

        if failures.is_empty() {
            self.is_parsed = true;
            Ok(())
        } else {
            Err(ValidationError { failures }.into())
        }
    }

    fn check_duplicate_names(&self, failures: &mut Vec<ValidationFailure>) {
        fn check<T>(
            records: &Records<T>,
            kind: ResourceKind,
            name_of: impl Fn(&T) -> &str,
            failures: &mut Vec<ValidationFailure>,
        ) {
            with_lock(records, |records| {
                let mut seen = HashSet::new();
                for (idx, record) in records.iter().enumerate() {
                    if !seen.insert(name_of(record).to_string()) {
                        failures.push(ValidationFailure {
                            kind: kind.as_str().to_string(),
                            idx,
                            field: "name".to_string(),
                            reason: format!("duplicate name {:?}", name_of(record)),
                        });
                    }
                }
            });
        }

        check(&self.buckets, ResourceKind::Bucket, |b| b.name.as_str(), failures);
        check(
            &self.dashboards,
            ResourceKind::Dashboard,
            |d| d.name.as_str(),
            failures,
        );
        check(&self.labels, ResourceKind::Label, |l| l.name.as_str(), failures);
        check(
            &self.endpoints,
            ResourceKind::NotificationEndpoint,
            |e| e.name.as_str(),
            failures,
        );
        check(
            &self.telegrafs,
            ResourceKind::Telegraf,
            |t| t.name.as_str(),
            failures,
        );
        check(
            &self.variables,
            ResourceKind::Variable,
            |v| v.name.as_str(),
            failures,
        );
    }

    fn check_associations(&self, failures: &mut Vec<ValidationFailure>) {
        let label_names: HashSet<String> = with_lock(&self.labels, |labels| {
            labels.iter().map(|l| l.name.clone()).collect()
        });

        fn check<T: LabelAssociater>(
            records: &Records<T>,
            kind: ResourceKind,
            label_names: &HashSet<String>,
            failures: &mut Vec<ValidationFailure>,
        ) {
            with_lock(records, |records| {
                for (idx, record) in records.iter().enumerate() {
                    for assoc in record.associations() {
                        if !label_names.contains(&assoc.name) {
                            failures.push(ValidationFailure {
                                kind: kind.as_str().to_string(),
                                idx,
                                field: "associations".to_string(),
                                reason: format!(
                                    "associated label {:?} is not defined in the package",
                                    assoc.name
                                ),
                            });
                        }
                    }
                }
            });
        }

        check(&self.buckets, ResourceKind::Bucket, &label_names, failures);
        check(&self.dashboards, ResourceKind::Dashboard, &label_names, failures);
        check(
            &self.endpoints,
            ResourceKind::NotificationEndpoint,
            &label_names,
            failures,
        );
        check(&self.telegrafs, ResourceKind::Telegraf, &label_names, failures);
        check(&self.variables, ResourceKind::Variable, &label_names, failures);
    }

    fn check_records(&self, failures: &mut Vec<ValidationFailure>) {
        with_lock(&self.dashboards, |dashboards| {
            for (idx, dash) in dashboards.iter().enumerate() {
                for chart in &dash.charts {
                    if chart.width <= 0 || chart.height <= 0 {
                        failures.push(ValidationFailure {
                            kind: ResourceKind::Dashboard.as_str().to_string(),
                            idx,
                            field: "charts".to_string(),
                            reason: format!(
                                "chart {:?} must have positive width and height",
                                chart.name
                            ),
                        });
                    }
                }
            }
        });

        with_lock(&self.telegrafs, |telegrafs| {
            for (idx, tele) in telegrafs.iter().enumerate() {
                if tele.config.trim().is_empty() {
                    failures.push(ValidationFailure {
                        kind: ResourceKind::Telegraf.as_str().to_string(),
                        idx,
                        field: "config".to_string(),
                        reason: "config must not be empty".to_string(),
                    });
                }
            }
        });

        with_lock(&self.variables, |variables| {
            for (idx, var) in variables.iter().enumerate() {
                let reason = match &var.arguments {
                    VariableArguments::Query { query, language } => {
                        if query.trim().is_empty() {
                            Some("query must not be empty".to_string())
                        } else if language.trim().is_empty() {
                            Some("language must not be empty".to_string())
                        } else {
                            None
                        }
                    }
                    VariableArguments::Constant { values } => values
                        .is_empty()
                        .then(|| "constant variable requires at least one value".to_string()),
                    VariableArguments::Map { values } => values
                        .is_empty()
                        .then(|| "map variable requires at least one value".to_string()),
                };
                if let Some(reason) = reason {
                    failures.push(ValidationFailure {
                        kind: ResourceKind::Variable.as_str().to_string(),
                        idx,
                        field: "arguments".to_string(),
                        reason,
                    });
                }
            }
        });

        with_lock(&self.endpoints, |endpoints| {
            for (idx, endpoint) in endpoints.iter().enumerate() {
                let url = match &endpoint.kind {
                    PkgEndpointKind::Http { url, .. } | PkgEndpointKind::Slack { url, .. } => url,
                    PkgEndpointKind::PagerDuty { client_url, .. } => client_url,
                };
                if url.trim().is_empty() {
                    failures.push(ValidationFailure {
                        kind: endpoint.resource_kind().as_str().to_string(),
                        idx,
                        field: "url".to_string(),
                        reason: "url must not be empty".to_string(),
                    });
                }
            }
        });
    }

    /// The secret keys referenced anywhere in the package.
    pub(crate) fn secrets(&self) -> BTreeSet<String> {
        with_lock(&self.endpoints, |endpoints| {
            let mut keys = BTreeSet::new();
            for endpoint in endpoints.iter() {
                for secret in endpoint.secret_refs() {
                    if !secret.key.is_empty() {
                        keys.insert(secret.key.clone());
                    }
                }
            }
            keys
        })
    }

    /// The desired (resource, label) edges, with whatever ID bindings the
    /// records currently hold. Sorted for deterministic output.
    pub(crate) fn label_mappings(&self) -> Vec<SummaryLabelMapping> {
        let label_ids: BTreeMap<String, Option<LabelId>> = with_lock(&self.labels, |labels| {
            labels
                .iter()
                .map(|l| (l.name.clone(), l.id.or_else(|| l.existing.as_ref().map(|e| e.id))))
                .collect()
        });

        fn collect<T: LabelAssociater>(
            records: &Records<T>,
            label_ids: &BTreeMap<String, Option<LabelId>>,
            out: &mut Vec<SummaryLabelMapping>,
        ) {
            with_lock(records, |records| {
                for record in records.iter() {
                    for assoc in record.associations() {
                        out.push(SummaryLabelMapping {
                            exists: assoc.exists,
                            label_name: assoc.name.clone(),
                            label_id: label_ids.get(&assoc.name).copied().flatten(),
                            resource_name: record.resource_name().to_string(),
                            resource_id: record.resource_id(),
                            resource_type: T::RESOURCE_TYPE,
                        });
                    }
                }
            });
        }

        let mut mappings = Vec::new();
        collect(&self.buckets, &label_ids, &mut mappings);
        collect(&self.dashboards, &label_ids, &mut mappings);
        collect(&self.endpoints, &label_ids, &mut mappings);
        collect(&self.telegrafs, &label_ids, &mut mappings);
        collect(&self.variables, &label_ids, &mut mappings);
        mappings.sort_by(|a, b| {
            a.resource_type
                .priority()
                .cmp(&b.resource_type.priority())
                .then_with(|| a.resource_name.cmp(&b.resource_name))
                .then_with(|| a.label_name.cmp(&b.label_name))
        });
        mappings
    }

    /// Build the user-facing summary from the current record bindings.
    #[must_use]
    pub fn summary(&self) -> Summary {
        let buckets = with_lock(&self.buckets, |records| {
            records
                .iter()
                .map(|b| SummaryBucket {
                    id: b.id,
                    name: b.name.clone(),
                    description: b.description.clone(),
                    retention_period: b.retention_period,
                })
                .collect()
        });
        let dashboards = with_lock(&self.dashboards, |records| {
            records
                .iter()
                .map(|d| SummaryDashboard {
                    id: d.id,
                    name: d.name.clone(),
                    description: d.description.clone(),
                    chart_count: d.charts.len(),
                })
                .collect()
        });
        let labels = with_lock(&self.labels, |records| {
            records
                .iter()
                .map(|l| SummaryLabel {
                    id: l.id,
                    name: l.name.clone(),
                    properties: l.properties(),
                })
                .collect()
        });
        let notification_endpoints = with_lock(&self.endpoints, |records| {
            records
                .iter()
                .map(|e| SummaryEndpoint {
                    id: e.id,
                    name: e.name.clone(),
                    kind: e.resource_kind(),
                    status: e.status,
                    secret_keys: e
                        .secret_refs()
                        .into_iter()
                        .filter(|s| !s.key.is_empty())
                        .map(|s| s.key.clone())
                        .collect(),
                })
                .collect()
        });
        let telegrafs = with_lock(&self.telegrafs, |records| {
            records
                .iter()
                .map(|t| SummaryTelegraf {
                    id: t.id,
                    name: t.name.clone(),
                    description: t.description.clone(),
                })
                .collect()
        });
        let variables = with_lock(&self.variables, |records| {
            records
                .iter()
                .map(|v| SummaryVariable {
                    id: v.id,
                    name: v.name.clone(),
                    description: v.description.clone(),
                    arguments: v.arguments.clone(),
                })
                .collect()
        });

        Summary {
            buckets,
            dashboards,
            labels,
            label_mappings: self.label_mappings(),
            notification_endpoints,
            telegrafs,
            variables,
        }
    }

    /// Encode the package back into its external document form.
    ///
    /// The resource list is flattened and ordered by kind priority,
    /// labels first, then by name, so an exported package reads
    /// dependencies-first and serializes deterministically.
    #[must_use]
    pub fn to_value(&self) -> JsonValue {
        let mut resources: Vec<(u8, String, JsonValue)> = Vec::new();
        with_lock(&self.labels, |records| {
            for label in records.iter() {
                resources.push((
                    ResourceType::Label.priority(),
                    label.name.clone(),
                    label_value(label),
                ));
            }
        });
        with_lock(&self.buckets, |records| {
            for bucket in records.iter() {
                resources.push((
                    ResourceType::Bucket.priority(),
                    bucket.name.clone(),
                    bucket_value(bucket),
                ));
            }
        });
        with_lock(&self.variables, |records| {
            for variable in records.iter() {
                resources.push((
                    ResourceType::Variable.priority(),
                    variable.name.clone(),
                    variable_value(variable),
                ));
            }
        });
        with_lock(&self.dashboards, |records| {
            for dashboard in records.iter() {
                resources.push((
                    ResourceType::Dashboard.priority(),
                    dashboard.name.clone(),
                    dashboard_value(dashboard),
                ));
            }
        });
        with_lock(&self.endpoints, |records| {
            for endpoint in records.iter() {
                resources.push((
                    ResourceType::NotificationEndpoint.priority(),
                    endpoint.name.clone(),
                    endpoint_value(endpoint),
                ));
            }
        });
        with_lock(&self.telegrafs, |records| {
            for telegraf in records.iter() {
                resources.push((
                    ResourceType::Telegraf.priority(),
                    telegraf.name.clone(),
                    telegraf_value(telegraf),
                ));
            }
        });
        resources.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

        serde_json::json!({
            "apiVersion": API_VERSION,
            "kind": KIND_PACKAGE,
            "meta": &self.meta,
            "spec": {
                "resources": resources
                    .into_iter()
                    .map(|(_, _, value)| value)
                    .collect::<Vec<_>>(),
            },
        })
    }

    /// Encode the package as a YAML document.
    pub fn to_yaml(&self) -> PkgerResult<String> {
        serde_yaml::to_string(&self.to_value()).map_err(|e| PkgerError::Encode {
            message: e.to_string(),
        })
    }

    /// Encode the package as a JSON document.
    pub fn to_json(&self) -> PkgerResult<String> {
        serde_json::to_string_pretty(&self.to_value()).map_err(|e| PkgerError::Encode {
            message: e.to_string(),
        })
    }

    pub(crate) fn buckets(&self) -> Records<PkgBucket> {
        Arc::clone(&self.buckets)
    }

    pub(crate) fn dashboards(&self) -> Records<PkgDashboard> {
        Arc::clone(&self.dashboards)
    }

    pub(crate) fn labels(&self) -> Records<PkgLabel> {
        Arc::clone(&self.labels)
    }

    pub(crate) fn endpoints(&self) -> Records<PkgEndpoint> {
        Arc::clone(&self.endpoints)
    }

    pub(crate) fn telegrafs(&self) -> Records<PkgTelegraf> {
        Arc::clone(&self.telegrafs)
    }

    pub(crate) fn variables(&self) -> Records<PkgVariable> {
        Arc::clone(&self.variables)
    }
}

/// User-facing report of what a package contains, with whatever ID
/// bindings the records hold at the time it is built.
#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub buckets: Vec<SummaryBucket>,
    pub dashboards: Vec<SummaryDashboard>,
    pub labels: Vec<SummaryLabel>,
    pub label_mappings: Vec<SummaryLabelMapping>,
    pub notification_endpoints: Vec<SummaryEndpoint>,
    pub telegrafs: Vec<SummaryTelegraf>,
    pub variables: Vec<SummaryVariable>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SummaryBucket {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<BucketId>,
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retention_period: Option<Duration>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SummaryDashboard {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<DashboardId>,
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub chart_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SummaryLabel {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<LabelId>,
    pub name: String,
    pub properties: LabelProperties,
}

/// One desired (resource, label) edge. `exists` is true when the platform
/// already carries the mapping, in which case apply treats it as
/// satisfied.
#[derive(Debug, Clone, Serialize)]
pub struct SummaryLabelMapping {
    pub exists: bool,
    pub label_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label_id: Option<LabelId>,
    pub resource_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<ResourceId>,
    pub resource_type: ResourceType,
}

#[derive(Debug, Clone, Serialize)]
pub struct SummaryEndpoint {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<EndpointId>,
    pub name: String,
    pub kind: ResourceKind,
    pub status: EndpointStatus,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub secret_keys: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SummaryTelegraf {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<TelegrafId>,
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SummaryVariable {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<VariableId>,
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub arguments: VariableArguments,
}

#[derive(Debug, Deserialize)]
struct PackageEnvelope {
    #[serde(rename = "apiVersion", default)]
    api_version: String,
    #[serde(default)]
    kind: String,
    #[serde(default)]
    meta: PackageMeta,
    #[serde(default)]
    spec: EnvelopeSpec,
}

#[derive(Debug, Default, Deserialize)]
struct EnvelopeSpec {
    #[serde(default)]
    resources: Vec<JsonValue>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssociationNode {
    #[serde(default)]
    kind: String,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BucketNode {
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    retention_seconds: Option<u64>,
    #[serde(default)]
    associations: Vec<AssociationNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LabelNode {
    #[serde(default)]
    name: String,
    #[serde(default)]
    color: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartNode {
    #[serde(default)]
    name: String,
    #[serde(default)]
    x_pos: i32,
    #[serde(default)]
    y_pos: i32,
    #[serde(default)]
    width: i32,
    #[serde(default)]
    height: i32,
    #[serde(default)]
    properties: JsonValue,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DashboardNode {
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    charts: Vec<ChartNode>,
    #[serde(default)]
    associations: Vec<AssociationNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TelegrafNode {
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    config: String,
    #[serde(default)]
    associations: Vec<AssociationNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VariableNode {
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: String,
    #[serde(rename = "type", default)]
    arg_type: String,
    #[serde(default)]
    query: Option<String>,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    values: Option<JsonValue>,
    #[serde(default)]
    associations: Vec<AssociationNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EndpointHttpNode {
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    url: String,
    #[serde(rename = "type", default = "default_http_auth")]
    auth_type: String,
    #[serde(default = "default_http_method")]
    method: String,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
    #[serde(default)]
    token: Option<String>,
    #[serde(default = "default_status")]
    status: String,
    #[serde(default)]
    associations: Vec<AssociationNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EndpointSlackNode {
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    token: Option<String>,
    #[serde(default = "default_status")]
    status: String,
    #[serde(default)]
    associations: Vec<AssociationNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EndpointPagerDutyNode {
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    routing_key: Option<String>,
    #[serde(default = "default_status")]
    status: String,
    #[serde(default)]
    associations: Vec<AssociationNode>,
}

fn default_http_auth() -> String {
    "none".to_string()
}

fn default_http_method() -> String {
    "POST".to_string()
}

fn default_status() -> String {
    "active".to_string()
}

fn parse_status(
    status: &str,
    kind: ResourceKind,
    idx: usize,
    failures: &mut Vec<ValidationFailure>,
) -> EndpointStatus {
    match status.to_ascii_lowercase().as_str() {
        "active" => EndpointStatus::Active,
        "inactive" => EndpointStatus::Inactive,
        other => {
            failures.push(ValidationFailure {
                kind: kind.as_str().to_string(),
                idx,
                field: "status".to_string(),
                reason: format!("status {other:?} must be one of [active, inactive]"),
            });
            EndpointStatus::Active
        }
    }
}

fn build_associations(
    nodes: Vec<AssociationNode>,
    kind: ResourceKind,
    idx: usize,
    failures: &mut Vec<ValidationFailure>,
) -> Vec<LabelAssociation> {
    let mut associations = Vec::with_capacity(nodes.len());
    for node in nodes {
        if !node.kind.eq_ignore_ascii_case("Label") {
            failures.push(ValidationFailure {
                kind: kind.as_str().to_string(),
                idx,
                field: "associations".to_string(),
                reason: format!("association kind {:?} is not supported", node.kind),
            });
            continue;
        }
        if node.name.is_empty() {
            failures.push(ValidationFailure {
                kind: kind.as_str().to_string(),
                idx,
                field: "associations".to_string(),
                reason: "association name must not be empty".to_string(),
            });
            continue;
        }
        associations.push(LabelAssociation::new(node.name));
    }
    associations
}

#[derive(Debug, Default)]
struct RecordSets {
    buckets: Vec<PkgBucket>,
    dashboards: Vec<PkgDashboard>,
    labels: Vec<PkgLabel>,
    endpoints: Vec<PkgEndpoint>,
    telegrafs: Vec<PkgTelegraf>,
    variables: Vec<PkgVariable>,
}

impl RecordSets {
    fn add(&mut self, idx: usize, node: JsonValue, failures: &mut Vec<ValidationFailure>) {
        let kind_str = node
            .get("kind")
            .and_then(JsonValue::as_str)
            .unwrap_or_default()
            .to_string();
        let Some(kind) = ResourceKind::parse(&kind_str) else {
            failures.push(ValidationFailure {
                kind: kind_str,
                idx,
                field: "kind".to_string(),
                reason: "unsupported resource kind".to_string(),
            });
            return;
        };

        // Resources without a name are recorded and skipped so the rest
        // of the document still dry-runs.
        macro_rules! decode {
            ($ty:ty) => {
                match serde_json::from_value::<$ty>(node) {
                    Ok(decoded) if decoded.name.is_empty() => {
                        failures.push(ValidationFailure {
                            kind: kind.as_str().to_string(),
                            idx,
                            field: "name".to_string(),
                            reason: "name must not be empty".to_string(),
                        });
                        return;
                    }
                    Ok(decoded) => decoded,
                    Err(err) => {
                        failures.push(ValidationFailure {
                            kind: kind.as_str().to_string(),
                            idx,
                            field: String::new(),
                            reason: err.to_string(),
                        });
                        return;
                    }
                }
            };
        }

        match kind {
            ResourceKind::Bucket => {
                let node = decode!(BucketNode);
                self.buckets.push(PkgBucket {
                    name: node.name,
                    description: node.description,
                    retention_period: node
                        .retention_seconds
                        .filter(|secs| *secs > 0)
                        .map(Duration::from_secs),
                    labels: build_associations(node.associations, kind, idx, failures),
                    id: None,
                    existing: None,
                });
            }
            ResourceKind::Label => {
                let node = decode!(LabelNode);
                self.labels.push(PkgLabel {
                    name: node.name,
                    color: node.color,
                    description: node.description,
                    id: None,
                    existing: None,
                });
            }
            ResourceKind::Dashboard => {
                let node = decode!(DashboardNode);
                self.dashboards.push(PkgDashboard {
                    name: node.name,
                    description: node.description,
                    charts: node
                        .charts
                        .into_iter()
                        .map(|c| PkgChart {
                            name: c.name,
                            x: c.x_pos,
                            y: c.y_pos,
                            width: c.width,
                            height: c.height,
                            properties: c.properties,
                        })
                        .collect(),
                    labels: build_associations(node.associations, kind, idx, failures),
                    id: None,
                });
            }
            ResourceKind::Telegraf => {
                let node = decode!(TelegrafNode);
                self.telegrafs.push(PkgTelegraf {
                    name: node.name,
                    description: node.description,
                    config: node.config,
                    labels: build_associations(node.associations, kind, idx, failures),
                    id: None,
                });
            }
            ResourceKind::Variable => {
                let node = decode!(VariableNode);
                let arguments = build_variable_arguments(&node, idx, failures);
                self.variables.push(PkgVariable {
                    name: node.name,
                    description: node.description,
                    arguments,
                    labels: build_associations(node.associations, kind, idx, failures),
                    id: None,
                    existing: None,
                });
            }
            ResourceKind::NotificationEndpointHttp => {
                let node = decode!(EndpointHttpNode);
                let status = parse_status(&node.status, kind, idx, failures);
                let auth = build_http_auth(&node, idx, failures);
                self.endpoints.push(PkgEndpoint {
                    name: node.name,
                    description: node.description,
                    status,
                    kind: PkgEndpointKind::Http {
                        url: node.url,
                        method: node.method,
                        auth,
                    },
                    labels: build_associations(node.associations, kind, idx, failures),
                    id: None,
                    existing: None,
                });
            }
            ResourceKind::NotificationEndpointSlack => {
                let node = decode!(EndpointSlackNode);
                let status = parse_status(&node.status, kind, idx, failures);
                self.endpoints.push(PkgEndpoint {
                    name: node.name,
                    description: node.description,
                    status,
                    kind: PkgEndpointKind::Slack {
                        url: node.url,
                        token: SecretRef::new(node.token),
                    },
                    labels: build_associations(node.associations, kind, idx, failures),
                    id: None,
                    existing: None,
                });
            }
            ResourceKind::NotificationEndpointPagerDuty => {
                let node = decode!(EndpointPagerDutyNode);
                let status = parse_status(&node.status, kind, idx, failures);
                if node.routing_key.as_deref().unwrap_or_default().is_empty() {
                    failures.push(ValidationFailure {
                        kind: kind.as_str().to_string(),
                        idx,
                        field: "routingKey".to_string(),
                        reason: "routingKey must reference a secret key".to_string(),
                    });
                }
                self.endpoints.push(PkgEndpoint {
                    name: node.name,
                    description: node.description,
                    status,
                    kind: PkgEndpointKind::PagerDuty {
                        client_url: node.url,
                        routing_key: SecretRef::new(node.routing_key),
                    },
                    labels: build_associations(node.associations, kind, idx, failures),
                    id: None,
                    existing: None,
                });
            }
            ResourceKind::NotificationEndpoint => {
                failures.push(ValidationFailure {
                    kind: kind.as_str().to_string(),
                    idx,
                    field: "kind".to_string(),
                    reason: "endpoint documents must name a concrete kind \
                             (HTTP, Slack, or PagerDuty)"
                        .to_string(),
                });
            }
        }
    }
}

fn build_variable_arguments(
    node: &VariableNode,
    idx: usize,
    failures: &mut Vec<ValidationFailure>,
) -> VariableArguments {
    let fail = |field: &str, reason: String, failures: &mut Vec<ValidationFailure>| {
        failures.push(ValidationFailure {
            kind: ResourceKind::Variable.as_str().to_string(),
            idx,
            field: field.to_string(),
            reason,
        });
    };

    match node.arg_type.to_ascii_lowercase().as_str() {
        "query" => VariableArguments::Query {
            query: node.query.clone().unwrap_or_default(),
            language: node.language.clone().unwrap_or_default(),
        },
        "constant" => {
            let values = node
                .values
                .as_ref()
                .and_then(JsonValue::as_array)
                .map(|values| {
                    values
                        .iter()
                        .filter_map(JsonValue::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();
            VariableArguments::Constant { values }
        }
        "map" => {
            let values = node
                .values
                .as_ref()
                .and_then(JsonValue::as_object)
                .map(|values| {
                    values
                        .iter()
                        .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                        .collect()
                })
                .unwrap_or_default();
            VariableArguments::Map { values }
        }
        other => {
            fail(
                "type",
                format!("variable type {other:?} must be one of [query, constant, map]"),
                failures,
            );
            VariableArguments::Constant { values: vec![] }
        }
    }
}

fn build_http_auth(
    node: &EndpointHttpNode,
    idx: usize,
    failures: &mut Vec<ValidationFailure>,
) -> PkgHttpAuth {
    let kind = ResourceKind::NotificationEndpointHttp;
    let require = |value: &Option<String>,
                   field: &str,
                   failures: &mut Vec<ValidationFailure>|
     -> SecretRef {
        if value.as_deref().unwrap_or_default().is_empty() {
            failures.push(ValidationFailure {
                kind: kind.as_str().to_string(),
                idx,
                field: field.to_string(),
                reason: format!("{field} must reference a secret key"),
            });
        }
        SecretRef::new(value.clone())
    };

    match node.auth_type.to_ascii_lowercase().as_str() {
        "none" => PkgHttpAuth::None,
        "basic" => PkgHttpAuth::Basic {
            username: require(&node.username, "username", failures),
            password: require(&node.password, "password", failures),
        },
        "bearer" => PkgHttpAuth::Bearer {
            token: require(&node.token, "token", failures),
        },
        other => {
            failures.push(ValidationFailure {
                kind: kind.as_str().to_string(),
                idx,
                field: "type".to_string(),
                reason: format!("auth type {other:?} must be one of [none, basic, bearer]"),
            });
            PkgHttpAuth::None
        }
    }
}

fn associations_value(labels: &[LabelAssociation]) -> Option<JsonValue> {
    if labels.is_empty() {
        return None;
    }
    Some(JsonValue::Array(
        labels
            .iter()
            .map(|l| serde_json::json!({ "kind": "Label", "name": l.name }))
            .collect(),
    ))
}

fn label_value(label: &PkgLabel) -> JsonValue {
    let mut map = serde_json::Map::new();
    map.insert("kind".to_string(), ResourceKind::Label.as_str().into());
    map.insert("name".to_string(), label.name.clone().into());
    if !label.color.is_empty() {
        map.insert("color".to_string(), label.color.clone().into());
    }
    if !label.description.is_empty() {
        map.insert("description".to_string(), label.description.clone().into());
    }
    JsonValue::Object(map)
}

fn bucket_value(bucket: &PkgBucket) -> JsonValue {
    let mut map = serde_json::Map::new();
    map.insert("kind".to_string(), ResourceKind::Bucket.as_str().into());
    map.insert("name".to_string(), bucket.name.clone().into());
    if !bucket.description.is_empty() {
        map.insert("description".to_string(), bucket.description.clone().into());
    }
    if let Some(retention) = bucket.retention_period {
        map.insert("retentionSeconds".to_string(), retention.as_secs().into());
    }
    if let Some(assocs) = associations_value(&bucket.labels) {
        map.insert("associations".to_string(), assocs);
    }
    JsonValue::Object(map)
}

fn variable_value(variable: &PkgVariable) -> JsonValue {
    let mut map = serde_json::Map::new();
    map.insert("kind".to_string(), ResourceKind::Variable.as_str().into());
    map.insert("name".to_string(), variable.name.clone().into());
    if !variable.description.is_empty() {
        map.insert("description".to_string(), variable.description.clone().into());
    }
    match &variable.arguments {
        VariableArguments::Query { query, language } => {
            map.insert("type".to_string(), "query".into());
            map.insert("query".to_string(), query.clone().into());
            map.insert("language".to_string(), language.clone().into());
        }
        VariableArguments::Constant { values } => {
            map.insert("type".to_string(), "constant".into());
            map.insert("values".to_string(), values.clone().into());
        }
        VariableArguments::Map { values } => {
            map.insert("type".to_string(), "map".into());
            map.insert("values".to_string(), serde_json::json!(values));
        }
    }
    if let Some(assocs) = associations_value(&variable.labels) {
        map.insert("associations".to_string(), assocs);
    }
    JsonValue::Object(map)
}

fn chart_value(chart: &PkgChart) -> JsonValue {
    let mut map = serde_json::Map::new();
    if !chart.name.is_empty() {
        map.insert("name".to_string(), chart.name.clone().into());
    }
    map.insert("xPos".to_string(), chart.x.into());
    map.insert("yPos".to_string(), chart.y.into());
    map.insert("width".to_string(), chart.width.into());
    map.insert("height".to_string(), chart.height.into());
    if !chart.properties.is_null() {
        map.insert("properties".to_string(), chart.properties.clone());
    }
    JsonValue::Object(map)
}

fn dashboard_value(dashboard: &PkgDashboard) -> JsonValue {
    let mut map = serde_json::Map::new();
    map.insert("kind".to_string(), ResourceKind::Dashboard.as_str().into());
    map.insert("name".to_string(), dashboard.name.clone().into());
    if !dashboard.description.is_empty() {
        map.insert(
            "description".to_string(),
            dashboard.description.clone().into(),
        );
    }
    if !dashboard.charts.is_empty() {
        map.insert(
            "charts".to_string(),
            JsonValue::Array(dashboard.charts.iter().map(chart_value).collect()),
        );
    }
    if let Some(assocs) = associations_value(&dashboard.labels) {
        map.insert("associations".to_string(), assocs);
    }
    JsonValue::Object(map)
}

fn endpoint_value(endpoint: &PkgEndpoint) -> JsonValue {
    let mut map = serde_json::Map::new();
    map.insert(
        "kind".to_string(),
        endpoint.resource_kind().as_str().into(),
    );
    map.insert("name".to_string(), endpoint.name.clone().into());
    if !endpoint.description.is_empty() {
        map.insert(
            "description".to_string(),
            endpoint.description.clone().into(),
        );
    }
    match &endpoint.kind {
        PkgEndpointKind::Http { url, method, auth } => {
            map.insert("url".to_string(), url.clone().into());
            map.insert("method".to_string(), method.clone().into());
            match auth {
                PkgHttpAuth::None => {
                    map.insert("type".to_string(), "none".into());
                }
                PkgHttpAuth::Basic { username, password } => {
                    map.insert("type".to_string(), "basic".into());
                    map.insert("username".to_string(), username.key.clone().into());
                    map.insert("password".to_string(), password.key.clone().into());
                }
                PkgHttpAuth::Bearer { token } => {
                    map.insert("type".to_string(), "bearer".into());
                    map.insert("token".to_string(), token.key.clone().into());
                }
            }
        }
        PkgEndpointKind::Slack { url, token } => {
            map.insert("url".to_string(), url.clone().into());
            if !token.key.is_empty() {
                map.insert("token".to_string(), token.key.clone().into());
            }
        }
        PkgEndpointKind::PagerDuty {
            client_url,
            routing_key,
        } => {
            map.insert("url".to_string(), client_url.clone().into());
            map.insert("routingKey".to_string(), routing_key.key.clone().into());
        }
    }
    map.insert("status".to_string(), endpoint.status.as_str().into());
    if let Some(assocs) = associations_value(&endpoint.labels) {
        map.insert("associations".to_string(), assocs);
    }
    JsonValue::Object(map)
}

fn telegraf_value(telegraf: &PkgTelegraf) -> JsonValue {
    let mut map = serde_json::Map::new();
    map.insert("kind".to_string(), ResourceKind::Telegraf.as_str().into());
    map.insert("name".to_string(), telegraf.name.clone().into());
    if !telegraf.description.is_empty() {
        map.insert(
            "description".to_string(),
            telegraf.description.clone().into(),
        );
    }
    map.insert("config".to_string(), telegraf.config.clone().into());
    if let Some(assocs) = associations_value(&telegraf.labels) {
        map.insert("associations".to_string(), assocs);
    }
    JsonValue::Object(map)
}
