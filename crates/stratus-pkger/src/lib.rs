//! # stratus-pkger
//!
//! The declarative resource package engine for the stratus platform.
//!
//! A package is a portable, versioned document describing buckets,
//! labels, dashboards, variables, telegraf configurations, notification
//! endpoints, and the label associations among them. The engine
//! reconciles a package against an organization's current state in
//! three phases:
//!
//! - **clone**: export existing resources into a package
//!   ([`PkgerService::create_pkg`])
//! - **dry run**: compute a [`Diff`] without mutation and bind each
//!   package record to its matched platform resource
//!   ([`PkgerService::dry_run`])
//! - **apply**: create and update resources with bounded concurrency,
//!   rolling every completed mutation back on any failure
//!   ([`PkgerService::apply`])
//!
//! Apply drives heterogeneous ports concurrently under one semaphore,
//! in dependency order: labels first, primary resources next, label
//! mappings last. Failures aggregate across workers into a single
//! [`ApplyError`]; rollback failures are logged, never returned.
//!
//! ## Example
//!
//! ```ignore
//! use stratus_pkger::{Package, PkgerService};
//! use tokio_util::sync::CancellationToken;
//!
//! let svc = PkgerService::builder()
//!     .with_bucket_service(buckets)
//!     .with_dashboard_service(dashboards)
//!     .with_label_service(labels)
//!     .with_notification_endpoint_service(endpoints)
//!     .with_secret_service(secrets)
//!     .with_telegraf_service(telegrafs)
//!     .with_variable_service(variables)
//!     .build()?;
//!
//! let mut pkg = Package::from_yaml(document)?;
//! let dry = svc.dry_run(org_id, user_id, &mut pkg).await?;
//! let summary = svc
//!     .apply(&CancellationToken::new(), org_id, user_id, &mut pkg)
//!     .await?;
//! ```

mod apply;
mod coordinator;

pub mod clone;
pub mod diff;
pub mod dry_run;
pub mod error;
pub mod package;
pub mod service;

pub use clone::{CreateOpt, ResourceToClone};
pub use diff::{
    Diff, DiffBucket, DiffBucketValues, DiffChart, DiffDashboard, DiffEndpoint,
    DiffEndpointValues, DiffLabel, DiffLabelMapping, DiffTelegraf, DiffVariable,
    DiffVariableValues,
};
pub use dry_run::DryRunResult;
pub use error::{
    ApplyErrBody, ApplyError, ApplyFailure, PkgerError, PkgerResult, ValidationError,
    ValidationFailure,
};
pub use package::{
    Package, PackageMeta, ResourceKind, Summary, SummaryBucket, SummaryDashboard, SummaryEndpoint,
    SummaryLabel, SummaryLabelMapping, SummaryTelegraf, SummaryVariable, API_VERSION,
};
pub use service::{PkgerService, PkgerServiceBuilder, DEFAULT_APPLY_REQ_LIMIT};
