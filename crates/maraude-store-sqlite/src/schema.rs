//! SQL schema for the outreach SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS categories (
    id          TEXT PRIMARY KEY,
    kind        TEXT NOT NULL,      -- 'need' | 'action'
    code        TEXT NOT NULL,
    name        TEXT NOT NULL,
    icon        TEXT,
    color       TEXT,
    parent_id   TEXT REFERENCES categories(id),
    created_at  TEXT NOT NULL,
    UNIQUE (kind, code)
);

CREATE TABLE IF NOT EXISTS beneficiaries (
    id                    TEXT PRIMARY KEY,
    nickname              TEXT NOT NULL,
    estimated_age         INTEGER,
    gender                TEXT NOT NULL,
    housing_status        TEXT NOT NULL,
    administrative_status TEXT NOT NULL,
    usual_location        TEXT,
    nationality           TEXT,
    spoken_languages      TEXT NOT NULL DEFAULT '[]',
    tags                  TEXT NOT NULL DEFAULT '[]',
    notes                 TEXT,
    gdpr_consent_status   TEXT NOT NULL DEFAULT 'PENDING',
    gdpr_consent_date     TEXT,
    photo_consent_given   INTEGER NOT NULL DEFAULT 0,
    lat                   REAL,
    lng                   REAL,
    created_at            TEXT NOT NULL,
    updated_at            TEXT NOT NULL,
    anonymized_at         TEXT,
    CHECK (photo_consent_given = 0
           OR gdpr_consent_status NOT IN ('REFUSED', 'WITHDRAWN'))
);

CREATE TABLE IF NOT EXISTS zones (
    id          TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    color       TEXT,
    center_lat  REAL,
    center_lng  REAL,
    radius_km   REAL
);

CREATE TABLE IF NOT EXISTS sessions (
    id                TEXT PRIMARY KEY,
    title             TEXT,
    description       TEXT,
    zone_id           TEXT REFERENCES zones(id),
    coordinator_kind  TEXT,
    coordinator_id    TEXT,
    planned_start_at  TEXT NOT NULL,
    started_at        TEXT,
    ended_at          TEXT,
    status            TEXT NOT NULL,
    version           INTEGER NOT NULL,
    report_json       TEXT,           -- cached OutreachReport, set on end
    created_at        TEXT NOT NULL,
    CHECK (status != 'COMPLETED' OR report_json IS NOT NULL)
);

-- The primary key gives join its set-union semantics.
CREATE TABLE IF NOT EXISTS session_participants (
    session_id        TEXT NOT NULL REFERENCES sessions(id),
    member_kind       TEXT NOT NULL,  -- 'user' | 'volunteer'
    member_id         TEXT NOT NULL,
    role              TEXT NOT NULL,
    joined_at         TEXT NOT NULL,
    availability_json TEXT,
    PRIMARY KEY (session_id, member_kind, member_id)
);

CREATE TABLE IF NOT EXISTS encounters (
    id                TEXT PRIMARY KEY,
    session_id        TEXT NOT NULL REFERENCES sessions(id),
    beneficiary_id    TEXT REFERENCES beneficiaries(id),
    encounter_type    TEXT NOT NULL,
    notes             TEXT,
    recorded_by_kind  TEXT,
    recorded_by_id    TEXT,
    lat               REAL,
    lng               REAL,
    created_at        TEXT NOT NULL,
    updated_at        TEXT NOT NULL
);

-- Taxonomy codes attached to an encounter, referenced by value.
CREATE TABLE IF NOT EXISTS encounter_codes (
    encounter_id  TEXT NOT NULL REFERENCES encounters(id),
    kind          TEXT NOT NULL,
    code          TEXT NOT NULL,
    position      INTEGER NOT NULL,
    PRIMARY KEY (encounter_id, kind, code)
);

CREATE TABLE IF NOT EXISTS structures (
    id              TEXT PRIMARY KEY,
    name            TEXT NOT NULL,
    structure_type  TEXT NOT NULL,
    address         TEXT,
    phone           TEXT,
    email           TEXT,
    lat             REAL,
    lng             REAL
);

CREATE TABLE IF NOT EXISTS referrals (
    id                TEXT PRIMARY KEY,
    beneficiary_id    TEXT NOT NULL REFERENCES beneficiaries(id),
    structure_id      TEXT REFERENCES structures(id),
    structure_name    TEXT,
    encounter_id      TEXT REFERENCES encounters(id),
    reason            TEXT,
    appointment_date  TEXT,
    status            TEXT NOT NULL,  -- stored status; EXPIRED is derived on read
    follow_up_notes   TEXT,
    follow_up_date    TEXT,
    created_at        TEXT NOT NULL,
    updated_at        TEXT NOT NULL,
    CHECK (structure_id IS NOT NULL OR structure_name IS NOT NULL)
);

CREATE INDEX IF NOT EXISTS encounters_session_idx      ON encounters(session_id);
CREATE INDEX IF NOT EXISTS encounters_beneficiary_idx  ON encounters(beneficiary_id);
CREATE INDEX IF NOT EXISTS encounter_codes_code_idx    ON encounter_codes(kind, code);
CREATE INDEX IF NOT EXISTS beneficiaries_location_idx  ON beneficiaries(lat, lng);
CREATE INDEX IF NOT EXISTS referrals_beneficiary_idx   ON referrals(beneficiary_id);
CREATE INDEX IF NOT EXISTS referrals_follow_up_idx     ON referrals(follow_up_date);
CREATE INDEX IF NOT EXISTS sessions_status_idx         ON sessions(status);

PRAGMA user_version = 1;
";
