use anyhow::{bail, Context, Result};
use std::collections::BTreeSet;
use std::fmt;
use std::ops::RangeInclusive;
use std::path::PathBuf;

use crate::error::EngineError;
use crate::types::EndpointId;

/// Directories between the share root and the config document.
pub const DATA_DIR: [&str; 2] = ["Robot", "Data"];
/// File name of the config document inside [`DATA_DIR`].
pub const DOCUMENT_NAME: &str = "vpos_state.cfg";

/// Parse a unit list into an ascending, deduplicated set of unit numbers (1..=999).
///
/// Entries are separated by commas or newlines:
/// - single number: `31`
/// - inclusive range: `31-38`
/// - comments: everything after `#` is ignored
pub fn parse_units_str(s: &str) -> Result<Vec<u16>> {
    let mut seen = BTreeSet::new();

    for (idx, raw_line) in s.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw_line.split('#').next().map(str::trim).unwrap_or("");
        for part in line.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            if let Some((a, b)) = part.split_once('-') {
                let start = parse_unit_str(a.trim())
                    .with_context(|| format!("line {line_no}: invalid start in range: {a}"))?;
                let end = parse_unit_str(b.trim())
                    .with_context(|| format!("line {line_no}: invalid end in range: {b}"))?;
                if start > end {
                    bail!("line {line_no}: invalid range {start}-{end} (start > end)");
                }
                seen.extend(start..=end);
                continue;
            }
            let u = parse_unit_str(part)
                .with_context(|| format!("line {line_no}: invalid unit value: {part}"))?;
            seen.insert(u);
        }
    }

    Ok(seen.into_iter().collect())
}

fn parse_unit_str(s: &str) -> Result<u16> {
    let val: u32 = s.parse::<u32>().map_err(|e| anyhow::anyhow!(e))?;
    if val == 0 || val > 999 {
        bail!("unit out of range: {val}");
    }
    Ok(val as u16)
}

/// The fixed grid of candidate endpoints: every store in an inclusive range times a discrete
/// set of SCO numbers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressSpace {
    groups: RangeInclusive<u16>,
    units: Vec<u16>,
}

impl AddressSpace {
    pub fn new(groups: RangeInclusive<u16>, units: impl IntoIterator<Item = u16>) -> Result<Self, EngineError> {
        let units: Vec<u16> = units.into_iter().collect::<BTreeSet<_>>().into_iter().collect();
        if groups.is_empty() {
            return Err(EngineError::AddressSpace(format!(
                "empty store range {}-{}",
                groups.start(),
                groups.end()
            )));
        }
        if *groups.start() == 0 || *groups.end() > 999 {
            return Err(EngineError::AddressSpace(format!(
                "store range {}-{} must lie within 1-999",
                groups.start(),
                groups.end()
            )));
        }
        match (units.first(), units.last()) {
            (Some(&first), Some(&last)) if first >= 1 && last <= 999 => {}
            (Some(&first), Some(&last)) => {
                return Err(EngineError::AddressSpace(format!(
                    "SCO units {first}-{last} must lie within 1-999"
                )));
            }
            _ => return Err(EngineError::AddressSpace("no SCO units configured".into())),
        }
        Ok(Self { groups, units })
    }

    pub fn groups(&self) -> RangeInclusive<u16> {
        self.groups.clone()
    }

    pub fn units(&self) -> &[u16] {
        &self.units
    }

    pub fn contains_group(&self, group: u16) -> bool {
        self.groups.contains(&group)
    }

    pub fn contains(&self, id: EndpointId) -> bool {
        self.contains_group(id.group) && self.units.binary_search(&id.unit).is_ok()
    }

    /// Reject a store number outside the configured range.
    pub fn check_group(&self, group: u16) -> Result<(), EngineError> {
        if self.contains_group(group) {
            Ok(())
        } else {
            Err(EngineError::InvalidGroup {
                group,
                first: *self.groups.start(),
                last: *self.groups.end(),
            })
        }
    }

    pub fn len(&self) -> usize {
        self.groups.clone().count() * self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every endpoint, ascending by store then by unit.
    pub fn enumerate(&self) -> impl Iterator<Item = EndpointId> + '_ {
        self.groups.clone().flat_map(move |g| self.group_members(g))
    }

    /// The endpoints of one store, ascending by unit.
    pub fn group_members(&self, group: u16) -> impl Iterator<Item = EndpointId> + '_ {
        self.units.iter().map(move |&u| EndpointId::new(group, u))
    }
}

/// Renders endpoint ids into share addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressTemplate {
    pub prefix: String,
    pub middle: String,
    pub share: String,
    /// When set, shares are reached below this directory instead of through UNC paths.
    pub mount_root: Option<PathBuf>,
}

impl Default for AddressTemplate {
    fn default() -> Self {
        Self {
            prefix: "ld".into(),
            middle: "scopos".into(),
            share: "c$".into(),
            mount_root: None,
        }
    }
}

impl AddressTemplate {
    pub fn host(&self, id: EndpointId) -> String {
        format!("{}{:03}{}{:03}", self.prefix, id.group, self.middle, id.unit)
    }

    pub fn address(&self, id: EndpointId) -> EndpointAddress {
        let host = self.host(id);
        let display = format!("\\\\{host}\\{}", self.share);
        let root = match &self.mount_root {
            Some(base) => base.join(&host).join(&self.share),
            None => PathBuf::from(&display),
        };
        EndpointAddress { display, root }
    }
}

/// A share address derived from an [`EndpointId`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointAddress {
    display: String,
    root: PathBuf,
}

impl EndpointAddress {
    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    pub fn data_dir(&self) -> PathBuf {
        DATA_DIR.iter().fold(self.root.clone(), |p, d| p.join(d))
    }

    pub fn document_path(&self) -> PathBuf {
        self.data_dir().join(DOCUMENT_NAME)
    }
}

impl fmt::Display for EndpointAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display)
    }
}
