//! The dry run: compute a [`Diff`] against the organization's current
//! state and bind each package record to its matched platform resource.
//!
//! A dry run never mutates a backend. Its only writes are the `existing`
//! bindings on the package records (which apply later branches on) and
//! the package's verified flag.

use std::collections::{BTreeMap, HashMap, HashSet};

use stratus_core::{LabelFilter, LabelId, OrgId, UserId};

use crate::diff::{
    Diff, DiffBucket, DiffDashboard, DiffEndpoint, DiffLabel, DiffLabelMapping, DiffTelegraf,
    DiffVariable,
};
use crate::error::{PkgerError, PkgerResult, ValidationError};
use crate::package::{with_lock, LabelAssociater, Package, Records, Summary};
use crate::service::PkgerService;

/// Variable lookups enumerate the organization; names are unique within
/// an org so this bound comfortably covers real packages.
const DRY_RUN_VARIABLE_LIMIT: usize = 100;

/// Outcome of a dry run. `validation` carries resource-level failures of
/// the parse-only class; the summary and diff remain valid for the
/// resources that did decode.
#[derive(Debug)]
pub struct DryRunResult {
    pub summary: Summary,
    pub diff: Diff,
    pub validation: Option<ValidationError>,
}

impl PkgerService {
    /// Compute the diff for a package and mark it verified for a later
    /// apply. Apply runs this itself when it has not been run already.
    pub async fn dry_run(
        &self,
        org_id: OrgId,
        user_id: UserId,
        pkg: &mut Package,
    ) -> PkgerResult<DryRunResult> {
        tracing::debug!(org_id = %org_id, user_id = %user_id, pkg = %pkg.meta().name, "starting dry run");

        // Validation failures of the parse-only class ride along with
        // the diff; resources that failed to decode were skipped at
        // parse time and do not bleed into the sections below.
        let mut validation = None;
        if !pkg.is_parsed() {
            match pkg.validate() {
                Ok(()) => {}
                Err(PkgerError::Validation(err)) => validation = Some(err),
                Err(err) => return Err(err),
            }
        }

        self.dry_run_secrets(org_id, pkg).await?;

        let buckets = self.dry_run_buckets(org_id, pkg).await?;
        let labels = self.dry_run_labels(org_id, pkg).await?;
        let notification_endpoints = self.dry_run_endpoints(org_id, pkg).await?;
        let variables = self.dry_run_variables(org_id, pkg).await?;
        let label_mappings = self.dry_run_label_mappings(pkg).await?;

        pkg.set_verified();

        let diff = Diff {
            buckets,
            dashboards: self.dry_run_dashboards(pkg),
            labels,
            label_mappings,
            notification_endpoints,
            telegrafs: self.dry_run_telegrafs(pkg),
            variables,
        };
        Ok(DryRunResult {
            summary: pkg.summary(),
            diff,
            validation,
        })
    }

    /// Every secret reference in the package must already exist in the
    /// organization's secret store. This is a precondition of apply, not
    /// a diff entry.
    async fn dry_run_secrets(&self, org_id: OrgId, pkg: &Package) -> PkgerResult<()> {
        let mut referenced = pkg.secrets();
        if referenced.is_empty() {
            return Ok(());
        }

        for key in self.secrets.secret_keys(org_id).await? {
            referenced.remove(&key);
        }

        if referenced.is_empty() {
            Ok(())
        } else {
            Err(PkgerError::SecretsMissing {
                keys: referenced.into_iter().collect(),
            })
        }
    }

    async fn dry_run_buckets(&self, org_id: OrgId, pkg: &Package) -> PkgerResult<Vec<DiffBucket>> {
        let records = pkg.buckets();
        let names: Vec<String> =
            with_lock(&records, |records| records.iter().map(|b| b.name.clone()).collect());

        let mut diffs = Vec::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            let existing = match self.buckets.find_bucket_by_name(org_id, name).await {
                Ok(bucket) => Some(bucket),
                Err(err) if err.is_not_found() => None,
                Err(err) => return Err(err.into()),
            };
            with_lock(&records, |records| {
                records[i].existing = existing;
                diffs.push(DiffBucket::new(&records[i], records[i].existing.as_ref()));
            });
        }
        diffs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(diffs)
    }

    async fn dry_run_labels(&self, org_id: OrgId, pkg: &Package) -> PkgerResult<Vec<DiffLabel>> {
        let records = pkg.labels();
        let names: Vec<String> =
            with_lock(&records, |records| records.iter().map(|l| l.name.clone()).collect());

        let mut diffs = Vec::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            let found = self
                .labels
                .find_labels(LabelFilter {
                    org_id: Some(org_id),
                    name: Some(name.clone()),
                    limit: Some(1),
                })
                .await?;
            with_lock(&records, |records| {
                records[i].existing = found.into_iter().next();
                diffs.push(DiffLabel::new(&records[i], records[i].existing.as_ref()));
            });
        }
        diffs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(diffs)
    }

    async fn dry_run_endpoints(
        &self,
        org_id: OrgId,
        pkg: &Package,
    ) -> PkgerResult<Vec<DiffEndpoint>> {
        let mut by_name: HashMap<String, stratus_core::NotificationEndpoint> = self
            .endpoints
            .find_endpoints(org_id)
            .await?
            .into_iter()
            .map(|e| (e.name.clone(), e))
            .collect();

        let records = pkg.endpoints();
        let mut diffs = with_lock(&records, |records| {
            records
                .iter_mut()
                .map(|record| {
                    record.existing = by_name.remove(&record.name);
                    DiffEndpoint::new(record, record.existing.as_ref())
                })
                .collect::<Vec<_>>()
        });
        diffs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(diffs)
    }

    async fn dry_run_variables(
        &self,
        org_id: OrgId,
        pkg: &Package,
    ) -> PkgerResult<Vec<DiffVariable>> {
        let mut by_name: HashMap<String, stratus_core::Variable> = self
            .variables
            .find_variables(org_id, DRY_RUN_VARIABLE_LIMIT)
            .await?
            .into_iter()
            .map(|v| (v.name.clone(), v))
            .collect();

        let records = pkg.variables();
        let mut diffs = with_lock(&records, |records| {
            records
                .iter_mut()
                .map(|record| {
                    record.existing = by_name.remove(&record.name);
                    DiffVariable::new(record, record.existing.as_ref())
                })
                .collect::<Vec<_>>()
        });
        diffs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(diffs)
    }

    fn dry_run_dashboards(&self, pkg: &Package) -> Vec<DiffDashboard> {
        let records = pkg.dashboards();
        let mut diffs = with_lock(&records, |records| {
            records.iter().map(DiffDashboard::new).collect::<Vec<_>>()
        });
        diffs.sort_by(|a, b| a.name.cmp(&b.name));
        diffs
    }

    fn dry_run_telegrafs(&self, pkg: &Package) -> Vec<DiffTelegraf> {
        let records = pkg.telegrafs();
        let mut diffs = with_lock(&records, |records| {
            records.iter().map(DiffTelegraf::new).collect::<Vec<_>>()
        });
        diffs.sort_by(|a, b| a.name.cmp(&b.name));
        diffs
    }

    /// Compare each resource's declared associations with the platform's
    /// current mappings. Labels attached on the platform but absent from
    /// the package are left alone; the package is additive.
    async fn dry_run_label_mappings(&self, pkg: &Package) -> PkgerResult<Vec<DiffLabelMapping>> {
        let label_ids: BTreeMap<String, Option<LabelId>> =
            with_lock(&pkg.labels(), |labels| {
                labels
                    .iter()
                    .map(|l| (l.name.clone(), l.existing.as_ref().map(|e| e.id)))
                    .collect()
            });

        let mut diffs = Vec::new();
        self.diff_mappings(&pkg.buckets(), &label_ids, &mut diffs).await?;
        self.diff_mappings(&pkg.dashboards(), &label_ids, &mut diffs).await?;
        self.diff_mappings(&pkg.endpoints(), &label_ids, &mut diffs).await?;
        self.diff_mappings(&pkg.telegrafs(), &label_ids, &mut diffs).await?;
        self.diff_mappings(&pkg.variables(), &label_ids, &mut diffs).await?;

        diffs.sort_by(|a, b| {
            a.res_type
                .priority()
                .cmp(&b.res_type.priority())
                .then_with(|| a.res_name.cmp(&b.res_name))
                .then_with(|| a.label_name.cmp(&b.label_name))
        });
        Ok(diffs)
    }

    async fn diff_mappings<T: LabelAssociater>(
        &self,
        records: &Records<T>,
        label_ids: &BTreeMap<String, Option<LabelId>>,
        diffs: &mut Vec<DiffLabelMapping>,
    ) -> PkgerResult<()> {
        let entries = with_lock(records, |records| records.len());
        for i in 0..entries {
            let (exists, resource_id) =
                with_lock(records, |records| (records[i].exists(), records[i].resource_id()));

            let platform_labels: HashSet<String> = match (exists, resource_id) {
                (true, Some(resource_id)) => self
                    .labels
                    .find_resource_labels(resource_id, T::RESOURCE_TYPE)
                    .await?
                    .into_iter()
                    .map(|l| l.name)
                    .collect(),
                _ => HashSet::new(),
            };

            with_lock(records, |records| {
                let record = &mut records[i];
                let res_name = record.resource_name().to_string();
                let res_id = record.resource_id();
                for assoc in record.associations_mut() {
                    let already_mapped = exists && platform_labels.contains(&assoc.name);
                    assoc.exists = already_mapped;
                    diffs.push(DiffLabelMapping {
                        is_new: !already_mapped,
                        res_type: T::RESOURCE_TYPE,
                        res_id,
                        res_name: res_name.clone(),
                        label_id: label_ids.get(&assoc.name).copied().flatten(),
                        label_name: assoc.name.clone(),
                    });
                }
            });
        }
        Ok(())
    }
}
