//! `SQLite` schema definitions for visitlog.
//!
//! This module contains the SQL statements for creating and managing
//! the database schema.

/// SQL statement to create the users table.
pub const CREATE_USERS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    login TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    full_name TEXT,
    role TEXT NOT NULL DEFAULT 'user',
    is_active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL
)
";

/// SQL statement to create the cameras table.
pub const CREATE_CAMERAS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS cameras (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    ip TEXT NOT NULL,
    camera_type TEXT NOT NULL DEFAULT 'ip',
    location TEXT,
    status TEXT NOT NULL DEFAULT 'inactive',
    created_at TEXT NOT NULL
)
";

/// SQL statement to create the visitors table.
pub const CREATE_VISITORS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS visitors (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    full_name TEXT NOT NULL,
    camera_id INTEGER NOT NULL REFERENCES cameras(id) ON DELETE RESTRICT,
    notes TEXT,
    entry_time TEXT NOT NULL,
    exit_time TEXT,
    photo TEXT,
    operator TEXT,
    created_at TEXT NOT NULL
)
";

/// SQL statement to create the visits table.
pub const CREATE_VISITS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS visits (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    photo_path TEXT NOT NULL,
    time_in TEXT NOT NULL,
    time_out TEXT,
    duration_seconds INTEGER,
    person_data TEXT,
    image_hash TEXT,
    exited INTEGER NOT NULL DEFAULT 0
)
";

/// Index for listing a camera's visitors.
pub const CREATE_VISITORS_CAMERA_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_visitors_camera ON visitors(camera_id)
";

/// Index for listing visitors by entry time.
pub const CREATE_VISITORS_ENTRY_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_visitors_entry ON visitors(entry_time DESC)
";

/// Index for finding open visits.
pub const CREATE_VISITS_EXITED_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_visits_exited ON visits(exited, time_in DESC)
";

/// SQL statement to create the metadata table for storing key-value pairs.
pub const CREATE_METADATA_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// All schema creation statements in order.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    CREATE_USERS_TABLE,
    CREATE_CAMERAS_TABLE,
    CREATE_VISITORS_TABLE,
    CREATE_VISITS_TABLE,
    CREATE_VISITORS_CAMERA_INDEX,
    CREATE_VISITORS_ENTRY_INDEX,
    CREATE_VISITS_EXITED_INDEX,
    CREATE_METADATA_TABLE,
];
