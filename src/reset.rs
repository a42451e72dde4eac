use std::sync::Arc;

use crate::address::AddressTemplate;
use crate::config_store::ConfigStore;
use crate::journal::{Journal, Level};
use crate::types::{report, EndpointId, EndpointRecord, EndpointStatus, ProgressSender, ResetTally, RESET_FIELD};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Written,
    Failed,
}

/// Writes a new reset flag to selected endpoints, one after another.
///
/// A failing endpoint never stops the pass and is not retried.
#[derive(Clone)]
pub struct ResetEngine {
    template: Arc<AddressTemplate>,
    store: ConfigStore,
    journal: Journal,
    verify_writes: bool,
}

impl ResetEngine {
    pub fn new(template: Arc<AddressTemplate>, store: ConfigStore, journal: Journal, verify_writes: bool) -> Self {
        Self { template, store, journal, verify_writes }
    }

    pub async fn apply_value(
        &self,
        selection: &mut [EndpointRecord],
        value: i32,
        progress: Option<&ProgressSender>,
    ) -> ResetTally {
        self.journal
            .session(format!("Reset Operation Started - Value: {value}"));

        let total = selection.len();
        let mut tally = ResetTally::default();

        for (done, record) in selection.iter_mut().enumerate() {
            report(progress, format!("Processing {}...", record.id.display_name()), done, total);
            record.status = EndpointStatus::Processing;

            match self.write_one(record.id, value).await {
                Ok(Outcome::Written) => {
                    record.status = EndpointStatus::Success(value);
                    record.config.value = Some(value);
                    tally.success += 1;
                }
                Ok(Outcome::Failed) => {
                    record.status = EndpointStatus::Failed;
                    tally.failure += 1;
                }
                Err(e) => {
                    record.status = EndpointStatus::Error;
                    tally.failure += 1;
                    self.journal.log(
                        Level::Error,
                        format!("Error processing Store {} {}", record.id.group_label(), record.id.display_name()),
                        Some(e.to_string()),
                    );
                }
            }
        }

        let summary = format!(
            "Reset operation completed: {} successful, {} failed",
            tally.success, tally.failure
        );
        self.journal.success(summary.clone());
        report(progress, summary, total, total);
        tally
    }

    async fn write_one(&self, id: EndpointId, value: i32) -> Result<Outcome, tokio::task::JoinError> {
        let path = self.template.address(id).document_path();
        let store = self.store.clone();
        let journal = self.journal.clone();
        let verify = self.verify_writes;

        tokio::task::spawn_blocking(move || {
            if !store.write_field(&path, RESET_FIELD, value) {
                return Outcome::Failed;
            }
            if !verify {
                return Outcome::Written;
            }
            match store.read_field(&path, RESET_FIELD) {
                Some(v) if v == value => Outcome::Written,
                other => {
                    journal.log(
                        Level::Error,
                        format!("Verification failed for: {}", path.display()),
                        Some(format!(
                            "expected {value}, read back {}",
                            other.map(|v| v.to_string()).unwrap_or_else(|| "N/A".into())
                        )),
                    );
                    Outcome::Failed
                }
            }
        })
        .await
    }
}
