//! `SQLite` schema definitions for bloodbank.
//!
//! Timestamps are RFC 3339 text in UTC and dates are `YYYY-MM-DD`, so both
//! sort correctly as strings.

/// SQL statement to create the users table.
pub const CREATE_USERS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    email TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    role TEXT NOT NULL,
    status TEXT NOT NULL,
    approved_by INTEGER REFERENCES users(id),
    created_at TEXT NOT NULL
)
";

/// SQL statement to create the donors table.
pub const CREATE_DONORS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS donors (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER UNIQUE REFERENCES users(id),
    name TEXT NOT NULL,
    email TEXT,
    phone TEXT NOT NULL,
    blood_group TEXT NOT NULL,
    date_of_birth TEXT NOT NULL,
    weight_kg REAL NOT NULL,
    city TEXT,
    last_donation_on TEXT,
    is_available INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL
)
";

/// SQL statement to create the inventory lots table.
pub const CREATE_LOTS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS inventory_lots (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    blood_group TEXT NOT NULL,
    units INTEGER NOT NULL CHECK (units >= 0),
    initial_units INTEGER NOT NULL,
    collected_on TEXT NOT NULL,
    expires_on TEXT NOT NULL,
    source_appointment_id INTEGER REFERENCES appointments(id),
    created_at TEXT NOT NULL
)
";

/// SQL statement to create the movement ledger.
pub const CREATE_MOVEMENTS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS inventory_movements (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    lot_id INTEGER NOT NULL REFERENCES inventory_lots(id),
    delta INTEGER NOT NULL,
    reason TEXT NOT NULL,
    request_id INTEGER REFERENCES requests(id),
    appointment_id INTEGER REFERENCES appointments(id),
    note TEXT,
    at TEXT NOT NULL
)
";

/// SQL statement to create the allocations table.
pub const CREATE_ALLOCATIONS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS allocations (
    request_id INTEGER NOT NULL REFERENCES requests(id),
    lot_id INTEGER NOT NULL REFERENCES inventory_lots(id),
    units INTEGER NOT NULL CHECK (units > 0),
    PRIMARY KEY (request_id, lot_id)
)
";

/// SQL statement to create the requests table.
pub const CREATE_REQUESTS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS requests (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    requester_id INTEGER NOT NULL REFERENCES users(id),
    hospital_name TEXT NOT NULL,
    patient_name TEXT NOT NULL,
    blood_group TEXT NOT NULL,
    units_requested INTEGER NOT NULL CHECK (units_requested > 0),
    units_allocated INTEGER NOT NULL DEFAULT 0,
    urgency TEXT NOT NULL,
    status TEXT NOT NULL,
    reason TEXT,
    approved_by INTEGER REFERENCES users(id),
    approved_at TEXT,
    pickup_deadline TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
)
";

/// SQL statement to create the notifications table.
pub const CREATE_NOTIFICATIONS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS notifications (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    donor_id INTEGER NOT NULL REFERENCES donors(id),
    request_id INTEGER REFERENCES requests(id),
    title TEXT NOT NULL,
    message TEXT NOT NULL,
    response TEXT,
    responded_at TEXT,
    read_at TEXT,
    created_at TEXT NOT NULL
)
";

/// SQL statement to create the appointments table.
pub const CREATE_APPOINTMENTS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS appointments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    donor_id INTEGER NOT NULL REFERENCES donors(id),
    request_id INTEGER REFERENCES requests(id),
    notification_id INTEGER REFERENCES notifications(id),
    scheduled_at TEXT NOT NULL,
    status TEXT NOT NULL,
    units_collected INTEGER,
    notes TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
)
";

/// SQL statement to create the medical reports table.
pub const CREATE_REPORTS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS medical_reports (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    donor_id INTEGER NOT NULL REFERENCES donors(id),
    appointment_id INTEGER REFERENCES appointments(id),
    hemoglobin_g_dl REAL,
    blood_pressure TEXT,
    pulse_bpm INTEGER,
    temperature_c REAL,
    notes TEXT,
    attachment_name TEXT,
    attachment_type TEXT,
    attachment_size INTEGER,
    attachment_checksum TEXT,
    created_at TEXT NOT NULL
)
";

/// SQL statement to create the metadata table for storing key-value pairs.
pub const CREATE_METADATA_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// Index for FIFO lot selection.
pub const CREATE_LOTS_FIFO_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_lots_group_expiry ON inventory_lots(blood_group, expires_on, id)
";

/// Index for reading a lot's ledger.
pub const CREATE_MOVEMENTS_LOT_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_movements_lot ON inventory_movements(lot_id)
";

/// Index for filtering requests by state.
pub const CREATE_REQUESTS_STATUS_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_requests_status ON requests(status)
";

/// Index for donor matching by group.
pub const CREATE_DONORS_GROUP_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_donors_group ON donors(blood_group)
";

/// Index for a donor's notifications.
pub const CREATE_NOTIFICATIONS_DONOR_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_notifications_donor ON notifications(donor_id, request_id)
";

/// Index for a donor's appointments.
pub const CREATE_APPOINTMENTS_DONOR_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_appointments_donor ON appointments(donor_id)
";

/// Index for the no-show sweep.
pub const CREATE_APPOINTMENTS_STATUS_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_appointments_status ON appointments(status, scheduled_at)
";

/// All schema creation statements in order.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    CREATE_USERS_TABLE,
    CREATE_DONORS_TABLE,
    CREATE_LOTS_TABLE,
    CREATE_MOVEMENTS_TABLE,
    CREATE_ALLOCATIONS_TABLE,
    CREATE_REQUESTS_TABLE,
    CREATE_NOTIFICATIONS_TABLE,
    CREATE_APPOINTMENTS_TABLE,
    CREATE_REPORTS_TABLE,
    CREATE_METADATA_TABLE,
    CREATE_LOTS_FIFO_INDEX,
    CREATE_MOVEMENTS_LOT_INDEX,
    CREATE_REQUESTS_STATUS_INDEX,
    CREATE_DONORS_GROUP_INDEX,
    CREATE_NOTIFICATIONS_DONOR_INDEX,
    CREATE_APPOINTMENTS_DONOR_INDEX,
    CREATE_APPOINTMENTS_STATUS_INDEX,
];
