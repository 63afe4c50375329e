//! SQL schema for the Civitas SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS accounts (
    account_id    TEXT PRIMARY KEY,
    email         TEXT NOT NULL UNIQUE,   -- normalized lowercase
    display_name  TEXT NOT NULL,
    phone         TEXT,
    password_hash TEXT NOT NULL,          -- argon2 PHC string
    role          TEXT NOT NULL,          -- 'citizen' | 'agent' | 'admin'
    status        TEXT NOT NULL DEFAULT 'active',
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL
);

-- Only the SHA-256 hex digest of a bearer token is stored.
CREATE TABLE IF NOT EXISTS sessions (
    token_hash  TEXT PRIMARY KEY,
    account_id  TEXT NOT NULL REFERENCES accounts(account_id) ON DELETE CASCADE,
    created_at  TEXT NOT NULL,
    expires_at  TEXT NOT NULL
);

-- `version` is the compare-and-swap token for status writes.
CREATE TABLE IF NOT EXISTS birth_declarations (
    request_id       TEXT PRIMARY KEY,
    citizen_id       TEXT NOT NULL REFERENCES accounts(account_id),
    agent_id         TEXT REFERENCES accounts(account_id) ON DELETE SET NULL,
    status           TEXT NOT NULL,
    comment          TEXT,
    version          INTEGER NOT NULL DEFAULT 0,
    child_first_name TEXT NOT NULL,
    child_last_name  TEXT NOT NULL,
    birth_date       TEXT NOT NULL,       -- YYYY-MM-DD
    birth_place      TEXT NOT NULL,
    gender           TEXT NOT NULL,       -- 'male' | 'female'
    father_name      TEXT,
    mother_name      TEXT,
    created_at       TEXT NOT NULL,
    updated_at       TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS birth_certificates (
    request_id            TEXT PRIMARY KEY,
    citizen_id            TEXT NOT NULL REFERENCES accounts(account_id),
    agent_id              TEXT REFERENCES accounts(account_id) ON DELETE SET NULL,
    status                TEXT NOT NULL,
    comment               TEXT,
    version               INTEGER NOT NULL DEFAULT 0,
    full_name             TEXT NOT NULL,
    birth_date            TEXT NOT NULL,
    birth_place           TEXT NOT NULL,
    father_full_name      TEXT,
    mother_full_name      TEXT,
    certificate_number    TEXT UNIQUE,
    tracking_number       TEXT NOT NULL UNIQUE,
    source_declaration_id TEXT UNIQUE REFERENCES birth_declarations(request_id),
    created_at            TEXT NOT NULL,
    updated_at            TEXT NOT NULL
);

-- Documents are never mutated. Several rows may share a storage_key.
CREATE TABLE IF NOT EXISTS documents (
    document_id  TEXT PRIMARY KEY,
    request_kind TEXT NOT NULL,           -- 'birth_declaration' | 'birth_certificate'
    request_id   TEXT NOT NULL,
    doc_type     TEXT NOT NULL,
    file_name    TEXT NOT NULL,
    media_type   TEXT NOT NULL,
    size_bytes   INTEGER NOT NULL,
    storage_key  TEXT NOT NULL,
    uploaded_by  TEXT NOT NULL,
    created_at   TEXT NOT NULL
);

-- At most one payment per request.
CREATE TABLE IF NOT EXISTS payments (
    payment_id          TEXT PRIMARY KEY,
    request_kind        TEXT NOT NULL,
    request_id          TEXT NOT NULL,
    amount_minor        INTEGER NOT NULL CHECK (amount_minor >= 0),
    currency            TEXT NOT NULL,
    status              TEXT NOT NULL,
    checkout_session_id TEXT NOT NULL UNIQUE,
    created_at          TEXT NOT NULL,
    updated_at          TEXT NOT NULL,
    UNIQUE (request_kind, request_id)
);

CREATE TABLE IF NOT EXISTS notifications (
    notification_id TEXT PRIMARY KEY,
    citizen_id      TEXT NOT NULL REFERENCES accounts(account_id) ON DELETE CASCADE,
    title           TEXT NOT NULL,
    message         TEXT NOT NULL,
    kind            TEXT NOT NULL,
    status          TEXT NOT NULL DEFAULT 'UNREAD',
    reference_id    TEXT,
    created_at      TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS declarations_citizen_idx ON birth_declarations(citizen_id);
CREATE INDEX IF NOT EXISTS certificates_citizen_idx ON birth_certificates(citizen_id);
CREATE INDEX IF NOT EXISTS documents_request_idx    ON documents(request_kind, request_id);
CREATE INDEX IF NOT EXISTS payments_created_idx     ON payments(created_at);
CREATE INDEX IF NOT EXISTS notifications_owner_idx  ON notifications(citizen_id, status);

PRAGMA user_version = 1;
";

/// Rewrites status labels written by earlier deployments to the canonical
/// uppercase set, so compare-and-swap writes can match on `status`.
pub const NORMALIZE_STATUSES: &str = "
UPDATE birth_declarations SET status = 'PENDING'
 WHERE status IN ('pending', 'en_attente', 'en attente');
UPDATE birth_declarations SET status = 'COMPLETED'
 WHERE status IN ('completed', 'APPROVED', 'approved', 'approuvé', 'approuve');
UPDATE birth_declarations SET status = 'REJECTED'
 WHERE status IN ('rejected', 'rejeté', 'rejete');
UPDATE birth_certificates SET status = 'PENDING'
 WHERE status IN ('pending', 'en_attente', 'en attente');
UPDATE birth_certificates SET status = 'COMPLETED'
 WHERE status IN ('completed', 'APPROVED', 'approved', 'approuvé', 'approuve');
UPDATE birth_certificates SET status = 'REJECTED'
 WHERE status IN ('rejected', 'rejeté', 'rejete');
";
