//! SQL schema for the visit SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- `reference` is NULL only inside the insert transaction, between the row
-- receiving its id and the reference derived from that id being written.
CREATE TABLE IF NOT EXISTS visit (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    reference         TEXT UNIQUE,
    prisoner_id       TEXT NOT NULL,
    prison_id         TEXT NOT NULL,
    visit_room        TEXT NOT NULL,
    visit_type        TEXT NOT NULL,
    visit_status      TEXT NOT NULL,   -- 'RESERVED' | 'BOOKED' | 'CANCELLED'
    visit_restriction TEXT NOT NULL,   -- 'OPEN' | 'CLOSED'
    visit_start       TEXT NOT NULL,   -- local wall-clock, fixed-width ISO 8601
    visit_end         TEXT NOT NULL,
    outcome_status    TEXT,
    create_timestamp  TEXT NOT NULL,   -- RFC 3339 UTC
    modify_timestamp  TEXT NOT NULL,
    CHECK (visit_start < visit_end)
);

CREATE TABLE IF NOT EXISTS visit_contact (
    visit_id      INTEGER PRIMARY KEY REFERENCES visit(id) ON DELETE CASCADE,
    contact_name  TEXT NOT NULL,
    contact_phone TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS visit_visitor (
    visit_id        INTEGER NOT NULL REFERENCES visit(id) ON DELETE CASCADE,
    nomis_person_id INTEGER NOT NULL,
    position        INTEGER NOT NULL,
    PRIMARY KEY (visit_id, nomis_person_id)
);

CREATE TABLE IF NOT EXISTS visit_support (
    visit_id INTEGER NOT NULL REFERENCES visit(id) ON DELETE CASCADE,
    type     TEXT    NOT NULL,
    text     TEXT,
    position INTEGER NOT NULL,
    PRIMARY KEY (visit_id, type)
);

-- Notes accumulate over the life of a visit; no natural key.
CREATE TABLE IF NOT EXISTS visit_notes (
    id       INTEGER PRIMARY KEY AUTOINCREMENT,
    visit_id INTEGER NOT NULL REFERENCES visit(id) ON DELETE CASCADE,
    type     TEXT    NOT NULL,
    text     TEXT    NOT NULL
);

CREATE TABLE IF NOT EXISTS legacy_data (
    visit_id       INTEGER PRIMARY KEY REFERENCES visit(id) ON DELETE CASCADE,
    lead_person_id INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS support_type (
    code        INTEGER PRIMARY KEY,
    name        TEXT NOT NULL UNIQUE,
    description TEXT NOT NULL
);

INSERT OR IGNORE INTO support_type (code, name, description) VALUES
    (1001, 'WHEELCHAIR',      'Wheelchair ramp'),
    (1002, 'INDUCTION_LOOP',  'Portable induction loop for people with hearing aids'),
    (1003, 'BSL_INTERPRETER', 'British Sign Language (BSL) Interpreter'),
    (1004, 'MASK_EXEMPT',     'Face covering exemption'),
    (1005, 'OTHER',           'Other');

CREATE INDEX IF NOT EXISTS visit_prisoner_idx ON visit(prisoner_id);
CREATE INDEX IF NOT EXISTS visit_prison_idx   ON visit(prison_id);
CREATE INDEX IF NOT EXISTS visit_start_idx    ON visit(visit_start);
CREATE INDEX IF NOT EXISTS visitor_person_idx ON visit_visitor(nomis_person_id);

PRAGMA user_version = 1;
";
