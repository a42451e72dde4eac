use std::sync::OnceLock;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};

static LOCAL_OFFSET: OnceLock<UtcOffset> = OnceLock::new();

/// Determine the local offset and pin it for [`local_now`].
///
/// Must run before any other thread is started: on Unix the offset can only be read while the
/// process is single-threaded. Returns `None` if it could not be determined.
pub fn pin_local_offset() -> Option<UtcOffset> {
    UtcOffset::current_local_offset().ok().map(pin_offset)
}

/// Pin `offset` unless one is already pinned; returns the offset in effect.
pub fn pin_offset(offset: UtcOffset) -> UtcOffset {
    *LOCAL_OFFSET.get_or_init(|| offset)
}

/// Local wall-clock time using the pinned offset. Without one, asks the OS and falls back to
/// UTC where it cannot answer (multi-threaded processes on Unix).
pub fn local_now() -> OffsetDateTime {
    let now = OffsetDateTime::now_utc();
    match LOCAL_OFFSET.get() {
        Some(offset) => now.to_offset(*offset),
        None => OffsetDateTime::now_local().unwrap_or(now),
    }
}

/// `yyyy-MM-dd HH:mm:ss`, used for log lines and session banners.
pub fn log_stamp(at: OffsetDateTime) -> String {
    at.format(format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"))
        .unwrap_or_default()
}

/// `yyyyMMdd_HHmmss`, used in backup file names.
pub fn backup_stamp(at: OffsetDateTime) -> String {
    at.format(format_description!("[year][month][day]_[hour][minute][second]"))
        .unwrap_or_default()
}

pub fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}
