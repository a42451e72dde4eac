use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::EngineError;

/// Name of the element holding the reset flag inside `vpos_state.cfg`.
pub const RESET_FIELD: &str = "ResetVPOSData";

/// A self-checkout unit: store number plus SCO number.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EndpointId {
    pub group: u16,
    pub unit: u16,
}

impl EndpointId {
    pub fn new(group: u16, unit: u16) -> Self {
        Self { group, unit }
    }

    pub fn group_label(&self) -> String {
        format!("{:03}", self.group)
    }

    pub fn unit_label(&self) -> String {
        format!("{:03}", self.unit)
    }

    pub fn display_name(&self) -> String {
        format!("SCO {:03}", self.unit)
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03}:{:03}", self.group, self.unit)
    }
}

/// Parses the `STORE:SCO` form used on the command line and in the HTTP API.
impl FromStr for EndpointId {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || EngineError::InvalidTarget(s.to_string());
        let (g, u) = s.trim().split_once(':').ok_or_else(invalid)?;
        let group = g.trim().parse::<u16>().map_err(|_| invalid())?;
        let unit = u.trim().parse::<u16>().map_err(|_| invalid())?;
        Ok(Self { group, unit })
    }
}

/// Outcome of one reachability probe.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    pub reachable: bool,
    pub checked_at: String,
}

/// The scalar read from (or written to) the remote document.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ConfigValue {
    pub field: String,
    pub value: Option<i32>,
}

impl ConfigValue {
    pub fn reset_flag(value: Option<i32>) -> Self {
        Self { field: RESET_FIELD.to_string(), value }
    }
}

/// Where an endpoint is in its scan/reset lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EndpointStatus {
    #[default]
    Pending,
    Current(i32),
    ConfigError,
    NotAccessible,
    Processing,
    Success(i32),
    Failed,
    Error,
}

impl EndpointStatus {
    pub fn label(&self) -> String {
        match self {
            EndpointStatus::Pending => "Pending".into(),
            EndpointStatus::Current(v) => format!("Current: {v}"),
            EndpointStatus::ConfigError => "Config Error".into(),
            EndpointStatus::NotAccessible => "Not Accessible".into(),
            EndpointStatus::Processing => "Processing...".into(),
            EndpointStatus::Success(v) => format!("Success - Set to {v}"),
            EndpointStatus::Failed => "Failed".into(),
            EndpointStatus::Error => "Error".into(),
        }
    }

    /// Colour hint for front ends.
    pub fn color(&self) -> &'static str {
        match self {
            EndpointStatus::Pending => "#FFFFFF",
            EndpointStatus::Current(_) | EndpointStatus::Success(_) => "#4CAF50",
            EndpointStatus::ConfigError | EndpointStatus::Processing => "#FF9800",
            EndpointStatus::NotAccessible => "#757575",
            EndpointStatus::Failed | EndpointStatus::Error => "#F44336",
        }
    }

    fn state(&self) -> &'static str {
        match self {
            EndpointStatus::Pending => "pending",
            EndpointStatus::Current(_) => "current",
            EndpointStatus::ConfigError => "config_error",
            EndpointStatus::NotAccessible => "not_accessible",
            EndpointStatus::Processing => "processing",
            EndpointStatus::Success(_) => "success",
            EndpointStatus::Failed => "failed",
            EndpointStatus::Error => "error",
        }
    }
}

impl fmt::Display for EndpointStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

impl Serialize for EndpointStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("EndpointStatus", 3)?;
        s.serialize_field("state", self.state())?;
        s.serialize_field("label", &self.label())?;
        s.serialize_field("color", self.color())?;
        s.end()
    }
}

/// Everything known about one endpoint after a scan or reset pass.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct EndpointRecord {
    pub id: EndpointId,
    pub address: String,
    pub probe: Option<ProbeResult>,
    pub config: ConfigValue,
    pub status: EndpointStatus,
}

impl EndpointRecord {
    pub fn new(id: EndpointId, address: String) -> Self {
        Self {
            id,
            address,
            probe: None,
            config: ConfigValue::reset_flag(None),
            status: EndpointStatus::Pending,
        }
    }

    pub fn is_accessible(&self) -> bool {
        self.probe.as_ref().is_some_and(|p| p.reachable)
    }

    pub fn current_value(&self) -> Option<i32> {
        self.config.value
    }
}

/// All scanned units of one store.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct GroupRecord {
    pub group: u16,
    pub endpoints: Vec<EndpointRecord>,
}

impl GroupRecord {
    pub fn new(group: u16) -> Self {
        Self { group, endpoints: Vec::new() }
    }

    pub fn display_name(&self) -> String {
        format!("Store {:03}", self.group)
    }

    pub fn accessible_count(&self) -> usize {
        self.endpoints.iter().filter(|e| e.is_accessible()).count()
    }

    pub fn has_accessible(&self) -> bool {
        self.endpoints.iter().any(EndpointRecord::is_accessible)
    }
}

/// Which part of the address space a scan covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    All,
    Group(u16),
}

/// Success/failure counts of a reset pass.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResetTally {
    pub success: usize,
    pub failure: usize,
}

/// One progress notification. `total` is zero when the amount of work is not known up front.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    pub message: String,
    pub done: usize,
    pub total: usize,
}

/// Channel the engines push [`Progress`] notifications into. Sends never block and a dropped
/// receiver is ignored.
pub type ProgressSender = tokio::sync::mpsc::UnboundedSender<Progress>;

pub(crate) fn report(progress: Option<&ProgressSender>, message: impl Into<String>, done: usize, total: usize) {
    if let Some(tx) = progress {
        let _ = tx.send(Progress { message: message.into(), done, total });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_id_round_trips_through_target_syntax() {
        let id: EndpointId = "2:31".parse().unwrap();
        assert_eq!(id, EndpointId::new(2, 31));
        assert_eq!(id.to_string(), "002:031");
        assert!("002-031".parse::<EndpointId>().is_err());
        assert!("abc:1".parse::<EndpointId>().is_err());
    }

    #[test]
    fn status_labels_and_colors() {
        assert_eq!(EndpointStatus::Current(0).label(), "Current: 0");
        assert_eq!(EndpointStatus::Success(1).label(), "Success - Set to 1");
        assert_eq!(EndpointStatus::NotAccessible.color(), "#757575");
        assert_eq!(EndpointStatus::ConfigError.color(), "#FF9800");
    }

    #[test]
    fn status_serializes_with_label_and_color() {
        let json = serde_json::to_value(EndpointStatus::Failed).unwrap();
        assert_eq!(json["state"], "failed");
        assert_eq!(json["label"], "Failed");
        assert_eq!(json["color"], "#F44336");
    }

    #[test]
    fn group_counts_accessible_on_demand() {
        let mut g = GroupRecord::new(5);
        let mut a = EndpointRecord::new(EndpointId::new(5, 31), String::new());
        a.probe = Some(ProbeResult { reachable: true, checked_at: String::new() });
        g.endpoints.push(a);
        g.endpoints.push(EndpointRecord::new(EndpointId::new(5, 32), String::new()));
        assert_eq!(g.accessible_count(), 1);
        assert!(g.has_accessible());
        assert_eq!(g.display_name(), "Store 005");
    }
}
