/// Jobs and users are identified by opaque UUIDs.
pub type JobId = uuid::Uuid;

/// Owning-user identifier.
pub type UserId = uuid::Uuid;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
