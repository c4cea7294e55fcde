pub mod attachments;
pub mod chats;
pub mod error;
pub mod events;
pub mod messages;
pub mod reads;
mod views;

#[cfg(test)]
pub(crate) mod testutil;

pub use attachments::{AttachmentLinker, AttachmentUpload, StagedAttachment};
pub use chats::ChatRegistry;
pub use error::{CoreError, Result};
pub use events::{EventSink, NullSink, RecordingSink};
pub use messages::MessageStore;
pub use reads::ReadTracker;

use chrono::{DateTime, SecondsFormat, Utc};

/// Timestamps are stored as fixed-width RFC 3339 strings so that SQLite's
/// lexicographic TEXT ordering matches chronological ordering.
pub(crate) fn now_string() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}

pub(crate) fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    let parsed = DateTime::parse_from_rfc3339(s)
        .map_err(|e| anyhow::anyhow!("bad timestamp {:?}: {}", s, e))?;
    Ok(parsed.with_timezone(&Utc))
}

pub(crate) fn parse_ts_opt(s: Option<&str>) -> Result<Option<DateTime<Utc>>> {
    s.map(parse_ts).transpose()
}
