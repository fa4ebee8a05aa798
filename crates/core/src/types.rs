/// Entity identifiers are opaque strings carried over from the source
/// systems (legacy meeting ids, project codes).
pub type EntityId = String;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
