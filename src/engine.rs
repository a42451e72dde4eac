use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::address::AddressSpace;
use crate::config_store::ConfigStore;
use crate::error::EngineError;
use crate::fs::{LocalFs, ShareFs};
use crate::journal::{Journal, LogEntry};
use crate::probe::PathProbe;
use crate::reset::ResetEngine;
use crate::scanner::ScanEngine;
use crate::settings::Settings;
use crate::types::{EndpointId, EndpointRecord, GroupRecord, ProgressSender, ResetTally, Scope};

/// Entry point for front ends: scan, reset, and observe the log.
#[derive(Clone)]
pub struct Engine {
    space: Arc<AddressSpace>,
    journal: Journal,
    scanner: ScanEngine,
    resetter: ResetEngine,
}

impl Engine {
    pub fn new(settings: &Settings) -> Result<Self, EngineError> {
        Self::with_fs(settings, Arc::new(LocalFs))
    }

    /// Build an engine that reaches the shares through `fs`.
    pub fn with_fs(settings: &Settings, fs: Arc<dyn ShareFs>) -> Result<Self, EngineError> {
        let space = Arc::new(settings.address_space()?);
        let template = Arc::new(settings.template());
        let journal = Journal::open(&settings.log_file)?;

        let probe = PathProbe::new(fs.clone(), journal.clone(), settings.probe_timeout());
        let store = ConfigStore::new(fs, journal.clone());
        let scanner = ScanEngine::new(
            space.clone(),
            template.clone(),
            probe,
            store.clone(),
            journal.clone(),
            settings.concurrency,
        );
        let resetter = ResetEngine::new(template, store, journal.clone(), settings.verify_writes);

        Ok(Self { space, journal, scanner, resetter })
    }

    pub fn address_space(&self) -> &AddressSpace {
        &self.space
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    pub fn subscribe_log(&self) -> broadcast::Receiver<LogEntry> {
        self.journal.subscribe()
    }

    pub async fn scan_all(&self, progress: Option<&ProgressSender>) -> Result<Vec<GroupRecord>, EngineError> {
        self.scanner
            .scan(Scope::All, progress, &CancellationToken::new())
            .await
    }

    pub async fn scan_group(&self, group: u16, progress: Option<&ProgressSender>) -> Result<GroupRecord, EngineError> {
        self.scanner
            .scan_group(group, progress, &CancellationToken::new())
            .await
    }

    /// Like [`Engine::scan_group`], stopping early once `cancel` fires.
    pub async fn scan_group_until(
        &self,
        group: u16,
        progress: Option<&ProgressSender>,
        cancel: &CancellationToken,
    ) -> Result<GroupRecord, EngineError> {
        self.scanner.scan_group(group, progress, cancel).await
    }

    pub async fn scan(
        &self,
        scope: Scope,
        progress: Option<&ProgressSender>,
        cancel: &CancellationToken,
    ) -> Result<Vec<GroupRecord>, EngineError> {
        self.scanner.scan(scope, progress, cancel).await
    }

    pub async fn refresh(&self, record: &mut EndpointRecord) {
        self.scanner.refresh(record).await
    }

    pub async fn apply_value(
        &self,
        selection: &mut [EndpointRecord],
        value: i32,
        progress: Option<&ProgressSender>,
    ) -> ResetTally {
        self.resetter.apply_value(selection, value, progress).await
    }

    /// Parse `STORE:SCO` targets and reject any outside the address space.
    pub fn parse_targets<S: AsRef<str>>(&self, raw: &[S]) -> Result<Vec<EndpointId>, EngineError> {
        raw.iter()
            .map(|s| {
                let id: EndpointId = s.as_ref().parse()?;
                if self.space.contains(id) {
                    Ok(id)
                } else {
                    Err(EngineError::InvalidTarget(s.as_ref().to_string()))
                }
            })
            .collect()
    }
}

/// Accessible records from `groups`, restricted to `targets` when given.
pub fn select_accessible(groups: &[GroupRecord], targets: Option<&[EndpointId]>) -> Vec<EndpointRecord> {
    groups
        .iter()
        .flat_map(|g| g.endpoints.iter())
        .filter(|e| e.is_accessible())
        .filter(|e| targets.map_or(true, |t| t.contains(&e.id)))
        .cloned()
        .collect()
}

/// Copy updated records back into their groups.
pub fn merge_records(groups: &mut [GroupRecord], updated: &[EndpointRecord]) {
    for rec in updated {
        if let Some(slot) = groups
            .iter_mut()
            .filter(|g| g.group == rec.id.group)
            .flat_map(|g| g.endpoints.iter_mut())
            .find(|e| e.id == rec.id)
        {
            *slot = rec.clone();
        }
    }
}
