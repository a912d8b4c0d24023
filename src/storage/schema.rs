//! Database schema definitions using sea-query.
//!
//! These define the table and column identifiers for type-safe query building.

use sea_query::Iden;

/// Events table schema.
#[derive(Iden)]
pub enum Events {
    Table,
    #[iden = "position"]
    Position,
    #[iden = "aggregate_type"]
    AggregateType,
    #[iden = "aggregate_id"]
    AggregateId,
    #[iden = "sequence"]
    Sequence,
    #[iden = "resource_owner"]
    ResourceOwner,
    #[iden = "event_type"]
    EventType,
    #[iden = "editor_user"]
    EditorUser,
    #[iden = "editor_name"]
    EditorName,
    #[iden = "payload"]
    Payload,
    #[iden = "created_at"]
    CreatedAt,
}

/// Snapshots table schema.
#[derive(Iden)]
pub enum Snapshots {
    Table,
    #[iden = "aggregate_type"]
    AggregateType,
    #[iden = "aggregate_id"]
    AggregateId,
    #[iden = "sequence"]
    Sequence,
    #[iden = "position"]
    Position,
    #[iden = "resource_owner"]
    ResourceOwner,
    #[iden = "change_date"]
    ChangeDate,
    #[iden = "state_data"]
    StateData,
    #[iden = "created_at"]
    CreatedAt,
}

/// Per-aggregate projection watermarks.
#[derive(Iden)]
pub enum Positions {
    Table,
    #[iden = "projection"]
    Projection,
    #[iden = "aggregate_type"]
    AggregateType,
    #[iden = "aggregate_id"]
    AggregateId,
    #[iden = "sequence"]
    Sequence,
    #[iden = "updated_at"]
    UpdatedAt,
}

/// Global projection cursors.
#[derive(Iden)]
pub enum Cursors {
    Table,
    #[iden = "projection"]
    Projection,
    #[iden = "position"]
    Position,
    #[iden = "updated_at"]
    UpdatedAt,
}

/// SQL for creating the events table.
pub const CREATE_EVENTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS events (
    position INTEGER PRIMARY KEY AUTOINCREMENT,
    aggregate_type TEXT NOT NULL,
    aggregate_id TEXT NOT NULL,
    sequence INTEGER NOT NULL,
    resource_owner TEXT NOT NULL,
    event_type TEXT NOT NULL,
    editor_user TEXT NOT NULL,
    editor_name TEXT NOT NULL,
    payload TEXT NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE (aggregate_type, aggregate_id, sequence)
);

CREATE INDEX IF NOT EXISTS idx_events_owner ON events(resource_owner);
CREATE INDEX IF NOT EXISTS idx_events_type ON events(event_type);
"#;

/// SQL for creating the snapshots table.
pub const CREATE_SNAPSHOTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS snapshots (
    aggregate_type TEXT NOT NULL,
    aggregate_id TEXT NOT NULL,
    sequence INTEGER NOT NULL,
    position INTEGER NOT NULL,
    resource_owner TEXT NOT NULL,
    change_date TEXT NOT NULL,
    state_data TEXT NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (aggregate_type, aggregate_id)
);
"#;

/// SQL for creating the watermark and cursor tables.
pub const CREATE_POSITIONS_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS positions (
    projection TEXT NOT NULL,
    aggregate_type TEXT NOT NULL,
    aggregate_id TEXT NOT NULL,
    sequence INTEGER NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (projection, aggregate_type, aggregate_id)
);

CREATE TABLE IF NOT EXISTS cursors (
    projection TEXT PRIMARY KEY,
    position INTEGER NOT NULL,
    updated_at TEXT NOT NULL
);
"#;
