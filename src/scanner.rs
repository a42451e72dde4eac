use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::address::{AddressSpace, AddressTemplate, EndpointAddress};
use crate::clock;
use crate::config_store::ConfigStore;
use crate::error::EngineError;
use crate::journal::{Journal, Level};
use crate::probe::PathProbe;
use crate::types::{
    report, EndpointId, EndpointRecord, EndpointStatus, GroupRecord, ProgressSender, Scope,
    RESET_FIELD,
};

/// Upper bound on in-flight endpoint tasks regardless of configuration.
pub const MAX_CONCURRENCY: usize = 256;

/// Probes endpoints and reads their current reset flag.
///
/// - One task per endpoint on a `JoinSet`, admission limited by a `Semaphore`.
/// - Each task owns its record; the join loop is the only place results are combined.
/// - Records come back in address-space order no matter which task finishes first.
#[derive(Clone)]
pub struct ScanEngine {
    space: Arc<AddressSpace>,
    template: Arc<AddressTemplate>,
    probe: PathProbe,
    store: ConfigStore,
    journal: Journal,
    concurrency: usize,
}

impl ScanEngine {
    pub fn new(
        space: Arc<AddressSpace>,
        template: Arc<AddressTemplate>,
        probe: PathProbe,
        store: ConfigStore,
        journal: Journal,
        concurrency: usize,
    ) -> Self {
        Self {
            space,
            template,
            probe,
            store,
            journal,
            concurrency: concurrency.clamp(1, MAX_CONCURRENCY),
        }
    }

    /// Scan `scope` and keep only stores with at least one accessible checkout.
    pub async fn scan(
        &self,
        scope: Scope,
        progress: Option<&ProgressSender>,
        cancel: &CancellationToken,
    ) -> Result<Vec<GroupRecord>, EngineError> {
        let groups = self.run_scope(scope, progress, cancel).await?;
        Ok(groups.into_iter().filter(GroupRecord::has_accessible).collect())
    }

    /// Scan one store and return it even when none of its checkouts answered.
    pub async fn scan_group(
        &self,
        group: u16,
        progress: Option<&ProgressSender>,
        cancel: &CancellationToken,
    ) -> Result<GroupRecord, EngineError> {
        let mut groups = self.run_scope(Scope::Group(group), progress, cancel).await?;
        Ok(groups.pop().unwrap_or_else(|| GroupRecord::new(group)))
    }

    /// Re-probe and re-read a single endpoint in place.
    pub async fn refresh(&self, record: &mut EndpointRecord) {
        let address = self.template.address(record.id);
        record.address = address.to_string();
        self.inspect(&address, record).await;
    }

    async fn run_scope(
        &self,
        scope: Scope,
        progress: Option<&ProgressSender>,
        cancel: &CancellationToken,
    ) -> Result<Vec<GroupRecord>, EngineError> {
        let started = clock::log_stamp(clock::local_now());
        let (groups, per_unit) = match scope {
            Scope::All => {
                self.journal
                    .session(format!("Network Scan Started - {started}"));
                self.journal
                    .info("Starting network scan for stores and self-checkouts...");
                (self.space.groups().collect::<Vec<_>>(), false)
            }
            Scope::Group(g) => {
                self.space.check_group(g)?;
                self.journal
                    .session(format!("Store Scan Started - Store {g:03} - {started}"));
                self.journal.info(format!("Starting scan for Store {g:03}..."));
                (vec![g], true)
            }
        };

        let ids: Vec<EndpointId> = groups
            .iter()
            .flat_map(|&g| self.space.group_members(g))
            .collect();
        let total = ids.len();
        let records = self.run(ids, per_unit, progress, cancel).await;
        let scanned = records.len();
        if scanned < total {
            self.journal
                .warning(format!("Scan cancelled after {scanned} of {total} checkouts"));
        }

        let results = group_records(records);
        let accessible: usize = results.iter().map(GroupRecord::accessible_count).sum();

        match scope {
            Scope::All => {
                let kept: Vec<&GroupRecord> = results.iter().filter(|g| g.has_accessible()).collect();
                for g in &kept {
                    self.journal.info(format!(
                        "{}: {} accessible checkout(s)",
                        g.display_name(),
                        g.accessible_count()
                    ));
                }
                self.journal.log(
                    Level::Success,
                    format!(
                        "Network scan completed: {accessible} accessible checkouts found out of {scanned} scanned"
                    ),
                    Some(format!("Found {} store(s) with accessible checkouts", kept.len())),
                );
            }
            Scope::Group(g) => {
                self.journal.success(format!(
                    "Store {g:03} scan completed: {accessible} accessible checkouts found out of {scanned} scanned"
                ));
            }
        }
        report(
            progress,
            format!("Scan complete: {accessible} accessible checkouts found"),
            scanned,
            total,
        );

        Ok(results)
    }

    async fn run(
        &self,
        ids: Vec<EndpointId>,
        per_unit: bool,
        progress: Option<&ProgressSender>,
        cancel: &CancellationToken,
    ) -> Vec<EndpointRecord> {
        let total = ids.len();
        let sem = Arc::new(Semaphore::new(self.concurrency));
        let mut set = JoinSet::new();
        let mut slots: Vec<Option<EndpointRecord>> = vec![None; total];
        let mut current_group = None;

        for (idx, id) in ids.into_iter().enumerate() {
            if cancel.is_cancelled() {
                break;
            }
            if current_group != Some(id.group) {
                current_group = Some(id.group);
                report(progress, format!("Scanning Store {:03}...", id.group), idx, total);
            }
            if per_unit {
                report(progress, format!("Checking SCO {:03}...", id.unit), idx, total);
            }

            let permit = tokio::select! {
                permit = sem.clone().acquire_owned() => match permit {
                    Ok(p) => p,
                    Err(_) => break,
                },
                _ = cancel.cancelled() => break,
            };
            let worker = self.clone();
            let cancel = cancel.clone();

            set.spawn(async move {
                let _permit = permit; // keep permit until task completes
                if cancel.is_cancelled() {
                    return (idx, None);
                }
                (idx, Some(worker.process(id).await))
            });
        }

        while let Some(res) = set.join_next().await {
            match res {
                Ok((idx, record)) => slots[idx] = record,
                Err(e) => tracing::warn!("scan task failed: {e}"),
            }
        }

        slots.into_iter().flatten().collect()
    }

    async fn process(&self, id: EndpointId) -> EndpointRecord {
        let address = self.template.address(id);
        let mut record = EndpointRecord::new(id, address.to_string());
        self.inspect(&address, &mut record).await;

        if record.is_accessible() {
            self.journal.log(
                Level::Info,
                format!(
                    "Found accessible checkout: Store {}, SCO {}",
                    id.group_label(),
                    id.unit_label()
                ),
                Some(format!(
                    "Current {RESET_FIELD} value: {}",
                    record
                        .current_value()
                        .map(|v| v.to_string())
                        .unwrap_or_else(|| "N/A".into())
                )),
            );
        } else {
            self.journal.info(format!(
                "Checkout not accessible: Store {}, SCO {}",
                id.group_label(),
                id.unit_label()
            ));
        }
        record
    }

    async fn inspect(&self, address: &EndpointAddress, record: &mut EndpointRecord) {
        let probe = self.probe.check(address).await;
        let reachable = probe.reachable;
        record.probe = Some(probe);

        if !reachable {
            record.config.value = None;
            record.status = EndpointStatus::NotAccessible;
            return;
        }

        let store = self.store.clone();
        let path = address.document_path();
        let value = tokio::task::spawn_blocking(move || store.read_field(&path, RESET_FIELD))
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(address = %address, "config read task failed: {e}");
                None
            });

        record.config.value = value;
        record.status = match value {
            Some(v) => EndpointStatus::Current(v),
            None => EndpointStatus::ConfigError,
        };
    }
}

/// Split ordered records into per-store groups, preserving order.
fn group_records(records: Vec<EndpointRecord>) -> Vec<GroupRecord> {
    let mut out: Vec<GroupRecord> = Vec::new();
    for record in records {
        match out.last_mut() {
            Some(g) if g.group == record.id.group => g.endpoints.push(record),
            _ => {
                let mut g = GroupRecord::new(record.id.group);
                g.endpoints.push(record);
                out.push(g);
            }
        }
    }
    out
}
