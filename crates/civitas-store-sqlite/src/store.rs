//! [`SqliteStore`]: the SQLite implementation of [`PortalStore`].

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension as _, TransactionBehavior, params};
use uuid::Uuid;

use civitas_core::{
  account::{Account, AccountStatus, NewAccount, ProfileUpdate, Role, Session},
  document::{self, Document, NewDocument},
  notification::{NewNotification, Notification},
  payment::{NewPayment, Payment, PaymentFilter, to_major},
  request::{
    BirthCertificate, BirthDeclaration, NewBirthCertificate, NewBirthDeclaration,
    RequestFilter, RequestHeader, RequestKind,
  },
  stats::{AccountCounts, PaymentTotals, StatusCounts},
  status::{NotificationStatus, PaymentStatus, RequestStatus},
  store::{ApprovalWrite, CasOutcome, PortalStore, RecordedPayment, TransitionWrite},
};

use crate::{
  Error, Result,
  encode::{
    ACCOUNT_COLUMNS, CERTIFICATE_FIELDS, DECLARATION_FIELDS, DOCUMENT_COLUMNS,
    HEADER_COLUMNS, NOTIFICATION_COLUMNS, PAYMENT_COLUMNS, RawAccount, RawCertificate,
    RawDeclaration, RawDocument, RawHeader, RawNotification, RawPayment, decode_request_status,
    encode_date, encode_dt, encode_uuid,
  },
  schema::{NORMALIZE_STATUSES, SCHEMA},
};

/// `?1` citizen, `?2` status, `?3` created-after; each may be NULL.
const REQUEST_FILTER: &str = "WHERE (?1 IS NULL OR citizen_id = ?1)
     AND (?2 IS NULL OR status = ?2)
     AND (?3 IS NULL OR created_at >= ?3)";

/// `?1` status, `?2` created-after; each may be NULL.
const PAYMENT_FILTER: &str = "WHERE (?1 IS NULL OR status = ?1)
     AND (?2 IS NULL OR created_at >= ?2)";

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Civitas portal store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    tracing::debug!(path = %path.as_ref().display(), "opening sqlite store");
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        conn.execute_batch(NORMALIZE_STATUSES)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── Row helpers (run on the connection thread) ─────────────────────────────

fn table(kind: RequestKind) -> &'static str {
  match kind {
    RequestKind::BirthDeclaration => "birth_declarations",
    RequestKind::BirthCertificate => "birth_certificates",
  }
}

fn select_header(
  conn: &Connection,
  kind: RequestKind,
  id: &str,
) -> rusqlite::Result<Option<RawHeader>> {
  let table = table(kind);
  conn
    .query_row(
      &format!("SELECT {HEADER_COLUMNS} FROM {table} WHERE request_id = ?1"),
      params![id],
      RawHeader::from_row,
    )
    .optional()
}

fn select_documents(
  conn: &Connection,
  kind: &str,
  id: &str,
) -> rusqlite::Result<Vec<RawDocument>> {
  let mut stmt = conn.prepare(&format!(
    "SELECT {DOCUMENT_COLUMNS} FROM documents
      WHERE request_kind = ?1 AND request_id = ?2
      ORDER BY created_at, rowid"
  ))?;
  let rows = stmt
    .query_map(params![kind, id], RawDocument::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>();
  rows
}

fn select_payment(
  conn: &Connection,
  kind: &str,
  id: &str,
) -> rusqlite::Result<Option<RawPayment>> {
  conn
    .query_row(
      &format!(
        "SELECT {PAYMENT_COLUMNS} FROM payments WHERE request_kind = ?1 AND request_id = ?2"
      ),
      params![kind, id],
      RawPayment::from_row,
    )
    .optional()
}

fn query_declarations<P: rusqlite::Params>(
  conn: &Connection,
  where_sql: &str,
  params: P,
) -> rusqlite::Result<Vec<RawDeclaration>> {
  let mut stmt = conn.prepare(&format!(
    "SELECT {HEADER_COLUMNS}, {DECLARATION_FIELDS} FROM birth_declarations {where_sql}"
  ))?;
  let raws = stmt
    .query_map(params, RawDeclaration::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;

  let kind = RequestKind::BirthDeclaration.as_str();
  raws
    .into_iter()
    .map(|mut raw| -> rusqlite::Result<_> {
      raw.documents = select_documents(conn, kind, &raw.header.request_id)?;
      raw.payment = select_payment(conn, kind, &raw.header.request_id)?;
      Ok(raw)
    })
    .collect()
}

fn query_certificates<P: rusqlite::Params>(
  conn: &Connection,
  where_sql: &str,
  params: P,
) -> rusqlite::Result<Vec<RawCertificate>> {
  let mut stmt = conn.prepare(&format!(
    "SELECT {HEADER_COLUMNS}, {CERTIFICATE_FIELDS} FROM birth_certificates {where_sql}"
  ))?;
  let raws = stmt
    .query_map(params, RawCertificate::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;

  let kind = RequestKind::BirthCertificate.as_str();
  raws
    .into_iter()
    .map(|mut raw| -> rusqlite::Result<_> {
      raw.documents = select_documents(conn, kind, &raw.header.request_id)?;
      raw.payment = select_payment(conn, kind, &raw.header.request_id)?;
      Ok(raw)
    })
    .collect()
}

fn insert_certificate(
  conn: &Connection,
  id: &str,
  c: &NewBirthCertificate,
  now: &str,
) -> rusqlite::Result<()> {
  conn.execute(
    "INSERT INTO birth_certificates (
       request_id, citizen_id, agent_id, status, comment, version,
       full_name, birth_date, birth_place, father_full_name, mother_full_name,
       certificate_number, tracking_number, source_declaration_id,
       created_at, updated_at
     ) VALUES (?1, ?2, ?3, ?4, NULL, 0, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?13)",
    params![
      id,
      encode_uuid(c.citizen_id),
      c.agent_id.map(encode_uuid),
      c.status.as_ref(),
      c.full_name,
      encode_date(c.birth_date),
      c.birth_place,
      c.father_full_name,
      c.mother_full_name,
      c.certificate_number,
      c.tracking_number,
      c.source_declaration_id.map(encode_uuid),
      now,
    ],
  )?;
  Ok(())
}

fn insert_notification(
  conn: &Connection,
  n: &NewNotification,
  now: &str,
) -> rusqlite::Result<()> {
  conn.execute(
    "INSERT INTO notifications (
       notification_id, citizen_id, title, message, kind, status, reference_id, created_at
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    params![
      encode_uuid(Uuid::new_v4()),
      encode_uuid(n.citizen_id),
      n.title,
      n.message,
      n.kind.as_ref(),
      NotificationStatus::Unread.as_ref(),
      n.reference_id.map(encode_uuid),
      now,
    ],
  )?;
  Ok(())
}

/// Outcome of a conditional write, still in column form.
enum RawOutcome<T> {
  Applied(T),
  Stale(RawHeader),
  Missing,
}

impl<T> RawOutcome<T> {
  /// The row the conditional write missed: moved on, or gone.
  fn lost_race(conn: &Connection, kind: RequestKind, id: &str) -> rusqlite::Result<Self> {
    Ok(match select_header(conn, kind, id)? {
      Some(current) => Self::Stale(current),
      None => Self::Missing,
    })
  }

  fn decode<U>(
    self,
    kind: RequestKind,
    f: impl FnOnce(T) -> Result<U>,
  ) -> Result<CasOutcome<U>> {
    Ok(match self {
      Self::Applied(t) => CasOutcome::Applied(f(t)?),
      Self::Stale(h) => CasOutcome::Stale(h.into_header(kind)?),
      Self::Missing => CasOutcome::Missing,
    })
  }
}

fn count(n: i64, what: &'static str) -> Result<u64> {
  u64::try_from(n).map_err(|_| Error::Negative(what))
}

fn encode_request_filter(
  filter: &RequestFilter,
) -> (Option<String>, Option<String>, Option<String>) {
  (
    filter.citizen_id.map(encode_uuid),
    filter.status.map(|s| s.as_ref().to_owned()),
    filter.created_after.map(encode_dt),
  )
}

fn encode_payment_filter(filter: &PaymentFilter) -> (Option<String>, Option<String>) {
  (
    filter.status.map(|s| s.as_ref().to_owned()),
    filter.created_after.map(encode_dt),
  )
}

// ─── PortalStore impl ────────────────────────────────────────────────────────

impl PortalStore for SqliteStore {
  type Error = Error;

  // ── Accounts ──────────────────────────────────────────────────────────────

  async fn create_account(&self, input: NewAccount) -> Result<Option<Account>> {
    let now = Utc::now();
    let account = Account {
      account_id:    Uuid::new_v4(),
      email:         input.email,
      display_name:  input.display_name,
      phone:         input.phone,
      password_hash: input.password_hash,
      role:          input.role,
      status:        AccountStatus::Active,
      created_at:    now,
      updated_at:    now,
    };

    let id_str = encode_uuid(account.account_id);
    let email = account.email.clone();
    let display_name = account.display_name.clone();
    let phone = account.phone.clone();
    let password_hash = account.password_hash.clone();
    let role = account.role.as_ref().to_owned();
    let status = account.status.as_ref().to_owned();
    let at_str = encode_dt(now);

    let inserted = self
      .conn
      .call(move |conn| {
        let n = conn.execute(
          "INSERT INTO accounts (
             account_id, email, display_name, phone, password_hash,
             role, status, created_at, updated_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
           ON CONFLICT(email) DO NOTHING",
          params![id_str, email, display_name, phone, password_hash, role, status, at_str],
        )?;
        Ok(n == 1)
      })
      .await?;

    Ok(inserted.then_some(account))
  }

  async fn get_account(&self, id: Uuid) -> Result<Option<Account>> {
    let id_str = encode_uuid(id);
    let raw = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE account_id = ?1"),
              params![id_str],
              RawAccount::from_row,
            )
            .optional()?,
        )
      })
      .await?;
    raw.map(RawAccount::into_account).transpose()
  }

  async fn find_account_by_email(&self, email: &str) -> Result<Option<Account>> {
    let email = email.to_owned();
    let raw = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE email = ?1"),
              params![email],
              RawAccount::from_row,
            )
            .optional()?,
        )
      })
      .await?;
    raw.map(RawAccount::into_account).transpose()
  }

  async fn list_accounts(&self, role: Option<Role>) -> Result<Vec<Account>> {
    let role_str = role.map(|r| r.as_ref().to_owned());
    let raws = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {ACCOUNT_COLUMNS} FROM accounts
            WHERE (?1 IS NULL OR role = ?1)
            ORDER BY created_at, rowid"
        ))?;
        let rows = stmt
          .query_map(params![role_str], RawAccount::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    raws.into_iter().map(RawAccount::into_account).collect()
  }

  async fn set_account_status(
    &self,
    id: Uuid,
    status: AccountStatus,
  ) -> Result<Option<Account>> {
    let id_str = encode_uuid(id);
    let status_str = status.as_ref().to_owned();
    let at_str = encode_dt(Utc::now());

    let raw = self
      .conn
      .call(move |conn| {
        let n = conn.execute(
          "UPDATE accounts SET status = ?2, updated_at = ?3 WHERE account_id = ?1",
          params![id_str, status_str, at_str],
        )?;
        if n == 0 {
          return Ok(None);
        }
        Ok(
          conn
            .query_row(
              &format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE account_id = ?1"),
              params![id_str],
              RawAccount::from_row,
            )
            .optional()?,
        )
      })
      .await?;
    raw.map(RawAccount::into_account).transpose()
  }

  async fn update_profile(
    &self,
    id: Uuid,
    update: ProfileUpdate,
  ) -> Result<Option<Account>> {
    let id_str = encode_uuid(id);
    let at_str = encode_dt(Utc::now());
    let ProfileUpdate { display_name, phone } = update;

    let raw = self
      .conn
      .call(move |conn| {
        let n = conn.execute(
          "UPDATE accounts
              SET display_name = COALESCE(?2, display_name),
                  phone        = COALESCE(?3, phone),
                  updated_at   = ?4
            WHERE account_id = ?1",
          params![id_str, display_name, phone, at_str],
        )?;
        if n == 0 {
          return Ok(None);
        }
        Ok(
          conn
            .query_row(
              &format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE account_id = ?1"),
              params![id_str],
              RawAccount::from_row,
            )
            .optional()?,
        )
      })
      .await?;
    raw.map(RawAccount::into_account).transpose()
  }

  async fn delete_account(&self, id: Uuid) -> Result<bool> {
    let id_str = encode_uuid(id);
    let n = self
      .conn
      .call(move |conn| {
        Ok(conn.execute("DELETE FROM accounts WHERE account_id = ?1", params![id_str])?)
      })
      .await?;
    Ok(n > 0)
  }

  async fn account_counts(&self) -> Result<AccountCounts> {
    let rows = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare("SELECT role, COUNT(*) FROM accounts GROUP BY role")?;
        let rows = stmt
          .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    let mut counts = AccountCounts::default();
    for (role, n) in rows {
      let n = count(n, "account count")?;
      match role.parse::<Role>() {
        Ok(Role::Citizen) => counts.citizens += n,
        Ok(Role::Agent) => counts.agents += n,
        Ok(Role::Admin) => counts.admins += n,
        Err(_) => return Err(Error::UnknownTag { column: "role", value: role }),
      }
    }
    Ok(counts)
  }

  // ── Sessions ──────────────────────────────────────────────────────────────

  async fn create_session(&self, session: Session) -> Result<()> {
    let account_id = encode_uuid(session.account_id);
    let created_at = encode_dt(session.created_at);
    let expires_at = encode_dt(session.expires_at);
    let token_hash = session.token_hash;

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO sessions (token_hash, account_id, created_at, expires_at)
           VALUES (?1, ?2, ?3, ?4)",
          params![token_hash, account_id, created_at, expires_at],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn resolve_session(
    &self,
    token_hash: String,
    now: DateTime<Utc>,
  ) -> Result<Option<Account>> {
    let now_str = encode_dt(now);
    let raw = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {ACCOUNT_COLUMNS} FROM accounts
                  WHERE status = 'active'
                    AND account_id = (
                      SELECT account_id FROM sessions
                       WHERE token_hash = ?1 AND expires_at > ?2
                    )"
              ),
              params![token_hash, now_str],
              RawAccount::from_row,
            )
            .optional()?,
        )
      })
      .await?;
    raw.map(RawAccount::into_account).transpose()
  }

  async fn delete_session(&self, token_hash: String) -> Result<bool> {
    let n = self
      .conn
      .call(move |conn| {
        Ok(conn.execute("DELETE FROM sessions WHERE token_hash = ?1", params![token_hash])?)
      })
      .await?;
    Ok(n > 0)
  }

  // ── Requests ──────────────────────────────────────────────────────────────

  async fn create_declaration(
    &self,
    citizen_id: Uuid,
    input: NewBirthDeclaration,
  ) -> Result<BirthDeclaration> {
    let now = Utc::now();
    let declaration = BirthDeclaration {
      header:           RequestHeader {
        kind: RequestKind::BirthDeclaration,
        request_id: Uuid::new_v4(),
        citizen_id,
        agent_id: None,
        status: RequestStatus::Pending,
        comment: None,
        version: 0,
        created_at: now,
        updated_at: now,
      },
      child_first_name: input.child_first_name.trim().to_owned(),
      child_last_name:  input.child_last_name.trim().to_owned(),
      birth_date:       input.birth_date,
      birth_place:      input.birth_place.trim().to_owned(),
      gender:           input.gender,
      father_name:      input.father_name,
      mother_name:      input.mother_name,
      documents:        Vec::new(),
      payment:          None,
    };

    let id_str = encode_uuid(declaration.header.request_id);
    let citizen_str = encode_uuid(citizen_id);
    let status = declaration.header.status.as_ref().to_owned();
    let first = declaration.child_first_name.clone();
    let last = declaration.child_last_name.clone();
    let birth_date = encode_date(declaration.birth_date);
    let place = declaration.birth_place.clone();
    let gender = declaration.gender.as_str();
    let father = declaration.father_name.clone();
    let mother = declaration.mother_name.clone();
    let at_str = encode_dt(now);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO birth_declarations (
             request_id, citizen_id, agent_id, status, comment, version,
             child_first_name, child_last_name, birth_date, birth_place, gender,
             father_name, mother_name, created_at, updated_at
           ) VALUES (?1, ?2, NULL, ?3, NULL, 0, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)",
          params![
            id_str,
            citizen_str,
            status,
            first,
            last,
            birth_date,
            place,
            gender,
            father,
            mother,
            at_str
          ],
        )?;
        Ok(())
      })
      .await?;

    Ok(declaration)
  }

  async fn get_declaration(&self, id: Uuid) -> Result<Option<BirthDeclaration>> {
    let id_str = encode_uuid(id);
    let raw = self
      .conn
      .call(move |conn| {
        Ok(query_declarations(conn, "WHERE request_id = ?1", params![id_str])?.pop())
      })
      .await?;
    raw.map(RawDeclaration::into_declaration).transpose()
  }

  async fn list_declarations(&self, filter: RequestFilter) -> Result<Vec<BirthDeclaration>> {
    let (citizen, status, after) = encode_request_filter(&filter);
    let raws = self
      .conn
      .call(move |conn| {
        Ok(query_declarations(
          conn,
          &format!("{REQUEST_FILTER} ORDER BY created_at DESC, rowid DESC"),
          params![citizen, status, after],
        )?)
      })
      .await?;
    raws.into_iter().map(RawDeclaration::into_declaration).collect()
  }

  async fn create_certificate(&self, input: NewBirthCertificate) -> Result<BirthCertificate> {
    let now = Utc::now();
    let request_id = Uuid::new_v4();
    let id_str = encode_uuid(request_id);
    let at_str = encode_dt(now);
    let row = input.clone();

    self
      .conn
      .call(move |conn| {
        insert_certificate(conn, &id_str, &row, &at_str)?;
        Ok(())
      })
      .await?;

    Ok(BirthCertificate {
      header:                RequestHeader {
        kind: RequestKind::BirthCertificate,
        request_id,
        citizen_id: input.citizen_id,
        agent_id: input.agent_id,
        status: input.status,
        comment: None,
        version: 0,
        created_at: now,
        updated_at: now,
      },
      full_name:             input.full_name,
      birth_date:            input.birth_date,
      birth_place:           input.birth_place,
      father_full_name:      input.father_full_name,
      mother_full_name:      input.mother_full_name,
      certificate_number:    input.certificate_number,
      tracking_number:       input.tracking_number,
      source_declaration_id: input.source_declaration_id,
      documents:             Vec::new(),
      payment:               None,
    })
  }

  async fn get_certificate(&self, id: Uuid) -> Result<Option<BirthCertificate>> {
    let id_str = encode_uuid(id);
    let raw = self
      .conn
      .call(move |conn| {
        Ok(query_certificates(conn, "WHERE request_id = ?1", params![id_str])?.pop())
      })
      .await?;
    raw.map(RawCertificate::into_certificate).transpose()
  }

  async fn find_certificate_by_tracking(
    &self,
    tracking_number: &str,
  ) -> Result<Option<BirthCertificate>> {
    let tracking = tracking_number.trim().to_uppercase();
    let raw = self
      .conn
      .call(move |conn| {
        Ok(query_certificates(conn, "WHERE tracking_number = ?1", params![tracking])?.pop())
      })
      .await?;
    raw.map(RawCertificate::into_certificate).transpose()
  }

  async fn list_certificates(&self, filter: RequestFilter) -> Result<Vec<BirthCertificate>> {
    let (citizen, status, after) = encode_request_filter(&filter);
    let raws = self
      .conn
      .call(move |conn| {
        Ok(query_certificates(
          conn,
          &format!("{REQUEST_FILTER} ORDER BY created_at DESC, rowid DESC"),
          params![citizen, status, after],
        )?)
      })
      .await?;
    raws.into_iter().map(RawCertificate::into_certificate).collect()
  }

  async fn get_request_header(
    &self,
    kind: RequestKind,
    id: Uuid,
  ) -> Result<Option<RequestHeader>> {
    let id_str = encode_uuid(id);
    let raw = self
      .conn
      .call(move |conn| Ok(select_header(conn, kind, &id_str)?))
      .await?;
    raw.map(|h| h.into_header(kind)).transpose()
  }

  async fn apply_transition(&self, write: TransitionWrite) -> Result<CasOutcome<RequestHeader>> {
    let kind = write.kind;
    let id_str = encode_uuid(write.request_id);
    let expected = write.expected_status.as_ref().to_owned();
    let target = write.target.as_ref().to_owned();
    let agent = encode_uuid(write.agent_id);
    let at_str = encode_dt(Utc::now());
    let TransitionWrite {
      expected_version,
      comment,
      certificate_number,
      notification,
      ..
    } = write;

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let changed = match kind {
          RequestKind::BirthDeclaration => tx.execute(
            "UPDATE birth_declarations
                SET status = ?1, comment = COALESCE(?2, comment), agent_id = ?3,
                    version = version + 1, updated_at = ?4
              WHERE request_id = ?5 AND status = ?6 AND version = ?7",
            params![target, comment, agent, at_str, id_str, expected, expected_version],
          )?,
          RequestKind::BirthCertificate => tx.execute(
            "UPDATE birth_certificates
                SET status = ?1, comment = COALESCE(?2, comment), agent_id = ?3,
                    version = version + 1, updated_at = ?4,
                    certificate_number = COALESCE(certificate_number, ?8)
              WHERE request_id = ?5 AND status = ?6 AND version = ?7",
            params![
              target,
              comment,
              agent,
              at_str,
              id_str,
              expected,
              expected_version,
              certificate_number
            ],
          )?,
        };
        if changed == 0 {
          return Ok(RawOutcome::lost_race(&tx, kind, &id_str)?);
        }

        insert_notification(&tx, &notification, &at_str)?;
        let updated = select_header(&tx, kind, &id_str)?;
        tx.commit()?;
        Ok(updated.map_or(RawOutcome::Missing, RawOutcome::Applied))
      })
      .await?;

    outcome.decode(kind, |h| h.into_header(kind))
  }

  async fn approve_declaration(
    &self,
    write: ApprovalWrite,
  ) -> Result<CasOutcome<BirthCertificate>> {
    let ApprovalWrite {
      declaration_id,
      expected_version,
      agent_id,
      certificate_id,
      certificate,
      declaration_notification,
      certificate_notification,
    } = write;

    let decl_str = encode_uuid(declaration_id);
    let cert_str = encode_uuid(certificate_id);
    let agent = encode_uuid(agent_id);
    let at_str = encode_dt(Utc::now());
    let completed = RequestStatus::Completed.as_ref().to_owned();
    let pending = RequestStatus::Pending.as_ref().to_owned();

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let changed = tx.execute(
          "UPDATE birth_declarations
              SET status = ?1, agent_id = ?2, version = version + 1, updated_at = ?3
            WHERE request_id = ?4 AND status = ?5 AND version = ?6",
          params![completed, agent, at_str, decl_str, pending, expected_version],
        )?;
        if changed == 0 {
          return Ok(RawOutcome::lost_race(&tx, RequestKind::BirthDeclaration, &decl_str)?);
        }

        insert_certificate(&tx, &cert_str, &certificate, &at_str)?;

        // Documents are copied by reference: new rows, same storage key.
        let sources =
          select_documents(&tx, RequestKind::BirthDeclaration.as_str(), &decl_str)?;
        for doc in sources {
          tx.execute(
            "INSERT INTO documents (
               document_id, request_kind, request_id, doc_type, file_name,
               media_type, size_bytes, storage_key, uploaded_by, created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
              encode_uuid(Uuid::new_v4()),
              RequestKind::BirthCertificate.as_str(),
              cert_str,
              doc.doc_type,
              doc.file_name,
              doc.media_type,
              doc.size_bytes,
              doc.storage_key,
              doc.uploaded_by,
              at_str,
            ],
          )?;
        }

        insert_notification(&tx, &declaration_notification, &at_str)?;
        insert_notification(&tx, &certificate_notification, &at_str)?;

        let issued = query_certificates(&tx, "WHERE request_id = ?1", params![cert_str])?.pop();
        tx.commit()?;
        Ok(issued.map_or(RawOutcome::Missing, RawOutcome::Applied))
      })
      .await?;

    outcome.decode(RequestKind::BirthDeclaration, RawCertificate::into_certificate)
  }

  async fn request_counts(
    &self,
    kind: RequestKind,
    filter: RequestFilter,
  ) -> Result<StatusCounts> {
    let (citizen, status, after) = encode_request_filter(&filter);
    let table = table(kind);
    let rows = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT status, COUNT(*) FROM {table} {REQUEST_FILTER} GROUP BY status"
        ))?;
        let rows = stmt
          .query_map(params![citizen, status, after], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    let mut counts = StatusCounts::default();
    for (status, n) in rows {
      counts.add(decode_request_status(&status)?, count(n, "request count")?);
    }
    Ok(counts)
  }

  // ── Documents ─────────────────────────────────────────────────────────────

  async fn add_document(&self, input: NewDocument) -> Result<Document> {
    let now = Utc::now();
    let document_id = Uuid::new_v4();
    let size = i64::try_from(input.size_bytes).map_err(|_| Error::Negative("size_bytes"))?;

    let id_str = encode_uuid(document_id);
    let kind = input.request_kind.as_str();
    let request_str = encode_uuid(input.request_id);
    let doc_type = input.doc_type.clone();
    let file_name = input.file_name.clone();
    let media_type = input.media_type.clone();
    let storage_key = input.storage_key.clone();
    let uploaded_by = encode_uuid(input.uploaded_by);
    let at_str = encode_dt(now);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO documents (
             document_id, request_kind, request_id, doc_type, file_name,
             media_type, size_bytes, storage_key, uploaded_by, created_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
          params![
            id_str,
            kind,
            request_str,
            doc_type,
            file_name,
            media_type,
            size,
            storage_key,
            uploaded_by,
            at_str
          ],
        )?;
        Ok(())
      })
      .await?;

    Ok(Document {
      document_id,
      request_kind: input.request_kind,
      request_id: input.request_id,
      doc_type: input.doc_type,
      file_name: input.file_name,
      media_type: input.media_type,
      size_bytes: input.size_bytes,
      storage_key: input.storage_key,
      url: document::content_url(document_id),
      uploaded_by: input.uploaded_by,
      created_at: now,
    })
  }

  async fn get_document(&self, id: Uuid) -> Result<Option<Document>> {
    let id_str = encode_uuid(id);
    let raw = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE document_id = ?1"),
              params![id_str],
              RawDocument::from_row,
            )
            .optional()?,
        )
      })
      .await?;
    raw.map(RawDocument::into_document).transpose()
  }

  async fn list_documents(&self, kind: RequestKind, request_id: Uuid) -> Result<Vec<Document>> {
    let id_str = encode_uuid(request_id);
    let raws = self
      .conn
      .call(move |conn| Ok(select_documents(conn, kind.as_str(), &id_str)?))
      .await?;
    raws.into_iter().map(RawDocument::into_document).collect()
  }

  // ── Payments ──────────────────────────────────────────────────────────────

  async fn record_payment_once(
    &self,
    input: NewPayment,
    notification: Option<NewNotification>,
  ) -> Result<RecordedPayment> {
    let now = Utc::now();
    let payment = Payment {
      payment_id:          Uuid::new_v4(),
      target:              input.target,
      amount_minor:        input.amount_minor,
      currency:            input.currency,
      status:              input.status,
      checkout_session_id: input.checkout_session_id,
      created_at:          now,
      updated_at:          now,
    };

    let id_str = encode_uuid(payment.payment_id);
    let kind = payment.target.kind().as_str();
    let request_str = encode_uuid(payment.target.request_id());
    let amount = payment.amount_minor;
    let currency = payment.currency.clone();
    let status = payment.status.as_ref().to_owned();
    let session_id = payment.checkout_session_id.clone();
    let at_str = encode_dt(now);

    let existing = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        if let Some(existing) = select_payment(&tx, kind, &request_str)? {
          return Ok(Some(existing));
        }

        tx.execute(
          "INSERT INTO payments (
             payment_id, request_kind, request_id, amount_minor, currency,
             status, checkout_session_id, created_at, updated_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
          params![id_str, kind, request_str, amount, currency, status, session_id, at_str],
        )?;
        if let Some(n) = &notification {
          insert_notification(&tx, n, &at_str)?;
        }
        tx.commit()?;
        Ok(None)
      })
      .await?;

    Ok(match existing {
      Some(raw) => RecordedPayment { payment: raw.into_payment()?, newly_recorded: false },
      None => RecordedPayment { payment, newly_recorded: true },
    })
  }

  async fn find_payment(&self, kind: RequestKind, request_id: Uuid) -> Result<Option<Payment>> {
    let id_str = encode_uuid(request_id);
    let raw = self
      .conn
      .call(move |conn| Ok(select_payment(conn, kind.as_str(), &id_str)?))
      .await?;
    raw.map(RawPayment::into_payment).transpose()
  }

  async fn list_payments(&self, filter: PaymentFilter) -> Result<Vec<Payment>> {
    let (status, after) = encode_payment_filter(&filter);
    let raws = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {PAYMENT_COLUMNS} FROM payments {PAYMENT_FILTER}
            ORDER BY created_at DESC, rowid DESC"
        ))?;
        let rows = stmt
          .query_map(params![status, after], RawPayment::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    raws.into_iter().map(RawPayment::into_payment).collect()
  }

  async fn payment_totals(&self, filter: PaymentFilter) -> Result<PaymentTotals> {
    let (status, after) = encode_payment_filter(&filter);
    let paid = PaymentStatus::Paid.as_ref().to_owned();
    let (n, paid_minor) = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          &format!(
            "SELECT COUNT(*),
                    COALESCE(SUM(CASE WHEN status = ?3 THEN amount_minor ELSE 0 END), 0)
               FROM payments {PAYMENT_FILTER}"
          ),
          params![status, after, paid],
          |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
        )?)
      })
      .await?;

    Ok(PaymentTotals {
      count: count(n, "payment count")?,
      paid_minor,
      paid_amount: to_major(paid_minor),
    })
  }

  // ── Notifications ─────────────────────────────────────────────────────────

  async fn list_notifications(
    &self,
    citizen_id: Uuid,
    unread_only: bool,
  ) -> Result<Vec<Notification>> {
    let id_str = encode_uuid(citizen_id);
    let unread = NotificationStatus::Unread.as_ref().to_owned();
    let raws = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {NOTIFICATION_COLUMNS} FROM notifications
            WHERE citizen_id = ?1 AND (?2 = 0 OR status = ?3)
            ORDER BY created_at DESC, rowid DESC"
        ))?;
        let rows = stmt
          .query_map(params![id_str, unread_only, unread], RawNotification::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    raws.into_iter().map(RawNotification::into_notification).collect()
  }

  async fn mark_notification_read(
    &self,
    citizen_id: Uuid,
    notification_id: Uuid,
  ) -> Result<Option<Notification>> {
    let citizen_str = encode_uuid(citizen_id);
    let id_str = encode_uuid(notification_id);
    let read = NotificationStatus::Read.as_ref().to_owned();
    let raw = self
      .conn
      .call(move |conn| {
        let n = conn.execute(
          "UPDATE notifications SET status = ?3
            WHERE notification_id = ?1 AND citizen_id = ?2",
          params![id_str, citizen_str, read],
        )?;
        if n == 0 {
          return Ok(None);
        }
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE notification_id = ?1"
              ),
              params![id_str],
              RawNotification::from_row,
            )
            .optional()?,
        )
      })
      .await?;
    raw.map(RawNotification::into_notification).transpose()
  }

  async fn mark_all_notifications_read(&self, citizen_id: Uuid) -> Result<u64> {
    let id_str = encode_uuid(citizen_id);
    let read = NotificationStatus::Read.as_ref().to_owned();
    let unread = NotificationStatus::Unread.as_ref().to_owned();
    let n = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE notifications SET status = ?2 WHERE citizen_id = ?1 AND status = ?3",
          params![id_str, read, unread],
        )?)
      })
      .await?;
    Ok(n as u64)
  }

  async fn unread_count(&self, citizen_id: Uuid) -> Result<u64> {
    let id_str = encode_uuid(citizen_id);
    let unread = NotificationStatus::Unread.as_ref().to_owned();
    let n = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          "SELECT COUNT(*) FROM notifications WHERE citizen_id = ?1 AND status = ?2",
          params![id_str, unread],
          |row| row.get::<_, i64>(0),
        )?)
      })
      .await?;
    count(n, "unread count")
  }
}
