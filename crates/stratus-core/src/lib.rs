//! # stratus-core
//!
//! Shared domain model for the stratus observability platform: strongly
//! typed identifiers, the resource types, the service port traits the
//! rest of the platform implements, and the common error taxonomy.
//!
//! This crate carries no runtime of its own; it is the vocabulary the
//! other crates speak.

pub mod error;
pub mod ids;
pub mod services;
pub mod types;

pub use error::{ServiceError, ServiceResult};
pub use ids::{
    BucketId, DashboardId, EndpointId, LabelId, OrgId, ParseIdError, ResourceId, TelegrafId,
    UserId, VariableId,
};
pub use services::{
    BucketService, DashboardService, LabelFilter, LabelService, NotificationEndpointService,
    SecretService, TelegrafService, VariableService,
};
pub use types::{
    Bucket, BucketType, BucketUpdate, Cell, Dashboard, EndpointKind, EndpointStatus, HttpAuth,
    Label, LabelMapping, LabelProperties, LabelUpdate, NotificationEndpoint, ResourceType,
    SecretField, TelegrafConfig, Variable, VariableArguments, VariableUpdate, View,
};
