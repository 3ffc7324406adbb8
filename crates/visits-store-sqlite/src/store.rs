//! [`SqliteStore`]: the SQLite implementation of [`VisitStore`] and
//! [`SupportTypeCatalog`].

use std::path::Path;

use chrono::Utc;
use rusqlite::{OptionalExtension as _, TransactionBehavior, types::Value};
use visits_core::{
  Error as DomainError,
  reference::ReferenceCodec,
  store::{SupportTypeCatalog, VisitFilter, VisitStore},
  visit::{NewVisit, SupportType, Visit},
};

use crate::{
  Error, Result,
  encode::{EncodedVisit, RawSupportType, RawVisit, encode_dt, encode_enum, encode_wall_clock},
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A visit store backed by a single SQLite file.
///
/// Cloning is cheap: the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store: useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  pub(crate) async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── Synchronous helpers (run inside `Connection::call`) ─────────────────────

const VISIT_COLUMNS: &str = "id, reference, prisoner_id, prison_id, visit_room, visit_type,
   visit_status, visit_restriction, visit_start, visit_end, outcome_status,
   create_timestamp, modify_timestamp";

fn read_visit_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawVisit> {
  Ok(RawVisit {
    id:                row.get(0)?,
    reference:         row.get(1)?,
    prisoner_id:       row.get(2)?,
    prison_id:         row.get(3)?,
    visit_room:        row.get(4)?,
    visit_type:        row.get(5)?,
    visit_status:      row.get(6)?,
    visit_restriction: row.get(7)?,
    visit_start:       row.get(8)?,
    visit_end:         row.get(9)?,
    outcome_status:    row.get(10)?,
    create_timestamp:  row.get(11)?,
    modify_timestamp:  row.get(12)?,
    contact:           None,
    visitors:          Vec::new(),
    support:           Vec::new(),
    notes:             Vec::new(),
    lead_person_id:    None,
  })
}

/// Fill in the owned children of a visit row.
fn load_children(conn: &rusqlite::Connection, raw: &mut RawVisit) -> rusqlite::Result<()> {
  let id = raw.id;

  raw.contact = conn
    .query_row(
      "SELECT contact_name, contact_phone FROM visit_contact WHERE visit_id = ?1",
      [id],
      |r| Ok((r.get(0)?, r.get(1)?)),
    )
    .optional()?;

  raw.visitors = conn
    .prepare(
      "SELECT nomis_person_id FROM visit_visitor WHERE visit_id = ?1 ORDER BY position",
    )?
    .query_map([id], |r| r.get(0))?
    .collect::<rusqlite::Result<_>>()?;

  raw.support = conn
    .prepare("SELECT type, text FROM visit_support WHERE visit_id = ?1 ORDER BY position")?
    .query_map([id], |r| Ok((r.get(0)?, r.get(1)?)))?
    .collect::<rusqlite::Result<_>>()?;

  raw.notes = conn
    .prepare("SELECT type, text FROM visit_notes WHERE visit_id = ?1 ORDER BY id")?
    .query_map([id], |r| Ok((r.get(0)?, r.get(1)?)))?
    .collect::<rusqlite::Result<_>>()?;

  raw.lead_person_id = conn
    .query_row(
      "SELECT lead_person_id FROM legacy_data WHERE visit_id = ?1",
      [id],
      |r| r.get(0),
    )
    .optional()?;

  Ok(())
}

/// Load one aggregate by an arbitrary single-value predicate on `visit`.
fn load_visit(
  conn: &rusqlite::Connection,
  predicate: &str,
  value: Value,
) -> rusqlite::Result<Option<RawVisit>> {
  let sql = format!("SELECT {VISIT_COLUMNS} FROM visit WHERE {predicate} = ?1");
  let raw = conn.query_row(&sql, [value], read_visit_row).optional()?;
  match raw {
    Some(mut raw) => {
      load_children(conn, &mut raw)?;
      Ok(Some(raw))
    }
    None => Ok(None),
  }
}

/// Overwrite the scalar columns of visit `id`. With `expected_modified`
/// set, the row is only touched if its `modify_timestamp` still matches.
/// Returns the number of rows updated.
fn write_visit_row(
  conn: &rusqlite::Connection,
  id: i64,
  v: &EncodedVisit,
  modified: &str,
  expected_modified: Option<&str>,
) -> rusqlite::Result<usize> {
  conn.execute(
    "UPDATE visit SET
       prisoner_id = ?1, prison_id = ?2, visit_room = ?3, visit_type = ?4,
       visit_status = ?5, visit_restriction = ?6, visit_start = ?7,
       visit_end = ?8, outcome_status = ?9, modify_timestamp = ?10
     WHERE id = ?11 AND (?12 IS NULL OR modify_timestamp = ?12)",
    rusqlite::params![
      v.prisoner_id,
      v.prison_id,
      v.visit_room,
      v.visit_type,
      v.visit_status,
      v.visit_restriction,
      v.visit_start,
      v.visit_end,
      v.outcome_status,
      modified,
      id,
      expected_modified,
    ],
  )
}

/// Replace every owned child row of `visit_id` with those in `v`.
fn write_children(
  conn: &rusqlite::Connection,
  visit_id: i64,
  v: &EncodedVisit,
) -> rusqlite::Result<()> {
  for table in ["visit_contact", "visit_visitor", "visit_support", "visit_notes", "legacy_data"] {
    conn.execute(&format!("DELETE FROM {table} WHERE visit_id = ?1"), [visit_id])?;
  }

  if let Some((name, phone)) = &v.contact {
    conn.execute(
      "INSERT INTO visit_contact (visit_id, contact_name, contact_phone) VALUES (?1, ?2, ?3)",
      rusqlite::params![visit_id, name, phone],
    )?;
  }

  for (position, person_id) in v.visitors.iter().enumerate() {
    conn.execute(
      "INSERT INTO visit_visitor (visit_id, nomis_person_id, position) VALUES (?1, ?2, ?3)",
      rusqlite::params![visit_id, person_id, position as i64],
    )?;
  }

  for (position, (support_type, text)) in v.support.iter().enumerate() {
    conn.execute(
      "INSERT INTO visit_support (visit_id, type, text, position) VALUES (?1, ?2, ?3, ?4)",
      rusqlite::params![visit_id, support_type, text, position as i64],
    )?;
  }

  for (note_type, text) in &v.notes {
    conn.execute(
      "INSERT INTO visit_notes (visit_id, type, text) VALUES (?1, ?2, ?3)",
      rusqlite::params![visit_id, note_type, text],
    )?;
  }

  if let Some(lead) = v.lead_person_id {
    conn.execute(
      "INSERT INTO legacy_data (visit_id, lead_person_id) VALUES (?1, ?2)",
      rusqlite::params![visit_id, lead],
    )?;
  }

  Ok(())
}

// ─── VisitStore impl ─────────────────────────────────────────────────────────

impl VisitStore for SqliteStore {
  type Error = Error;

  async fn insert(&self, visit: NewVisit, codec: &ReferenceCodec) -> Result<Visit> {
    let encoded = EncodedVisit::from(&visit);
    let now_str = encode_dt(Utc::now());
    let codec = codec.clone();

    let (id, raw): (i64, Option<RawVisit>) = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        tx.execute(
          "INSERT INTO visit (
             prisoner_id, prison_id, visit_room, visit_type, visit_status,
             visit_restriction, visit_start, visit_end, outcome_status,
             create_timestamp, modify_timestamp
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
          rusqlite::params![
            encoded.prisoner_id,
            encoded.prison_id,
            encoded.visit_room,
            encoded.visit_type,
            encoded.visit_status,
            encoded.visit_restriction,
            encoded.visit_start,
            encoded.visit_end,
            encoded.outcome_status,
            now_str,
          ],
        )?;
        let id = tx.last_insert_rowid();

        let reference = codec.encode(
          u64::try_from(id).map_err(|e| tokio_rusqlite::Error::Other(Box::new(e)))?,
        );
        tx.execute(
          "UPDATE visit SET reference = ?1 WHERE id = ?2",
          rusqlite::params![reference, id],
        )?;

        write_children(&tx, id, &encoded)?;
        let raw = load_visit(&tx, "id", Value::Integer(id))?;
        tx.commit()?;
        Ok((id, raw))
      })
      .await?;

    let visit = raw.ok_or(Error::VisitNotFound(id))?.into_visit()?;
    tracing::debug!(visit_id = id, reference = %visit.reference, "inserted visit");
    Ok(visit)
  }

  async fn save(&self, visit: &Visit) -> Result<Visit> {
    let id = visit.id;
    let encoded = EncodedVisit::from(visit);
    let expected = encode_dt(visit.modified_timestamp);
    let now_str = encode_dt(Utc::now());

    let (exists, raw): (bool, Option<RawVisit>) = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if write_visit_row(&tx, id, &encoded, &now_str, Some(expected.as_str()))? == 0 {
          let exists = tx
            .query_row("SELECT 1 FROM visit WHERE id = ?1", [id], |_| Ok(()))
            .optional()?
            .is_some();
          return Ok((exists, None));
        }

        write_children(&tx, id, &encoded)?;
        let raw = load_visit(&tx, "id", Value::Integer(id))?;
        tx.commit()?;
        Ok((true, raw))
      })
      .await?;

    match raw {
      Some(raw) => raw.into_visit(),
      None if exists => Err(Error::Conflict(id)),
      None => Err(Error::VisitNotFound(id)),
    }
  }

  async fn update_by_reference<F>(
    &self,
    reference: &str,
    mutate: F,
  ) -> Result<visits_core::Result<Visit>>
  where
    F: FnOnce(&mut Visit) -> visits_core::Result<()> + Send + 'static,
  {
    let reference = reference.to_owned();
    let now_str = encode_dt(Utc::now());

    let outcome: visits_core::Result<RawVisit> = self
      .conn
      .call(move |conn| {
        // Write lock is held from the load onwards.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let Some(raw) = load_visit(&tx, "reference", Value::Text(reference.clone()))? else {
          return Ok(Err(DomainError::VisitNotFound(reference)));
        };
        let mut visit =
          raw.into_visit().map_err(|e| tokio_rusqlite::Error::Other(Box::new(e)))?;

        // Dropping `tx` on rejection rolls back.
        if let Err(rejected) = mutate(&mut visit) {
          return Ok(Err(rejected));
        }

        let encoded = EncodedVisit::from(&visit);
        write_visit_row(&tx, visit.id, &encoded, &now_str, None)?;
        write_children(&tx, visit.id, &encoded)?;
        let Some(raw) = load_visit(&tx, "id", Value::Integer(visit.id))? else {
          return Ok(Err(DomainError::VisitNotFound(reference)));
        };
        tx.commit()?;
        Ok(Ok(raw))
      })
      .await?;

    match outcome {
      Ok(raw) => {
        let visit = raw.into_visit()?;
        tracing::debug!(visit_id = visit.id, reference = %visit.reference, "updated visit");
        Ok(Ok(visit))
      }
      Err(rejected) => Ok(Err(rejected)),
    }
  }

  async fn find_by_reference(&self, reference: &str) -> Result<Option<Visit>> {
    let reference = reference.to_owned();
    let raw = self
      .conn
      .call(move |conn| Ok(load_visit(conn, "reference", Value::Text(reference))?))
      .await?;
    raw.map(RawVisit::into_visit).transpose()
  }

  async fn find_by_id(&self, id: i64) -> Result<Option<Visit>> {
    let raw = self
      .conn
      .call(move |conn| Ok(load_visit(conn, "id", Value::Integer(id))?))
      .await?;
    raw.map(RawVisit::into_visit).transpose()
  }

  async fn find_all(&self, filter: &VisitFilter) -> Result<Vec<Visit>> {
    // Build WHERE clause and positional parameters together.
    let mut conds: Vec<&'static str> = vec![];
    let mut params: Vec<Value> = vec![];

    if let Some(p) = &filter.prisoner_id {
      conds.push("v.prisoner_id = ?");
      params.push(Value::Text(p.clone()));
    }
    if let Some(p) = &filter.prison_id {
      conds.push("v.prison_id = ?");
      params.push(Value::Text(p.clone()));
    }
    if let Some(r) = &filter.visit_room {
      conds.push("v.visit_room = ?");
      params.push(Value::Text(r.clone()));
    }
    if let Some(start) = filter.start_timestamp {
      conds.push("v.visit_start >= ?");
      params.push(Value::Text(encode_wall_clock(start)));
    }
    if let Some(end) = filter.end_timestamp {
      conds.push("v.visit_start <= ?");
      params.push(Value::Text(encode_wall_clock(end)));
    }
    if let Some(status) = filter.visit_status {
      conds.push("v.visit_status = ?");
      params.push(Value::Text(encode_enum(status)));
    }
    if let Some(person) = filter.nomis_person_id {
      conds.push(
        "EXISTS (SELECT 1 FROM visit_visitor vv
                 WHERE vv.visit_id = v.id AND vv.nomis_person_id = ?)",
      );
      params.push(Value::Integer(person));
    }

    let where_clause = if conds.is_empty() {
      String::new()
    } else {
      format!("WHERE {}", conds.join(" AND "))
    };

    let raws: Vec<RawVisit> = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {VISIT_COLUMNS} FROM visit v {where_clause}
           ORDER BY v.visit_start ASC, v.id ASC"
        );
        let mut raws = conn
          .prepare(&sql)?
          .query_map(rusqlite::params_from_iter(params), read_visit_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        for raw in &mut raws {
          load_children(conn, raw)?;
        }
        Ok(raws)
      })
      .await?;

    raws.into_iter().map(RawVisit::into_visit).collect()
  }

  async fn delete(&self, reference: &str) -> Result<bool> {
    let reference = reference.to_owned();
    let deleted = self
      .conn
      .call(move |conn| Ok(conn.execute("DELETE FROM visit WHERE reference = ?1", [reference])?))
      .await?;
    tracing::debug!(deleted, "deleted visit by reference");
    Ok(deleted > 0)
  }

  async fn delete_all_by_reference_in(&self, references: &[String]) -> Result<u64> {
    let references = references.to_vec();
    let deleted = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let mut deleted = 0u64;
        for reference in &references {
          deleted += tx.execute("DELETE FROM visit WHERE reference = ?1", [reference])? as u64;
        }
        tx.commit()?;
        Ok(deleted)
      })
      .await?;
    Ok(deleted)
  }
}

// ─── SupportTypeCatalog impl ─────────────────────────────────────────────────

impl SupportTypeCatalog for SqliteStore {
  type Error = Error;

  async fn find_support_type(&self, name: &str) -> Result<Option<SupportType>> {
    let name = name.to_owned();
    let raw = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT code, name, description FROM support_type WHERE name = ?1",
              [name],
              |r| {
                Ok(RawSupportType {
                  code:        r.get(0)?,
                  name:        r.get(1)?,
                  description: r.get(2)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await?;
    Ok(raw.map(SupportType::from))
  }

  async fn list_support_types(&self) -> Result<Vec<SupportType>> {
    let raws: Vec<RawSupportType> = self
      .conn
      .call(|conn| {
        let mut stmt =
          conn.prepare("SELECT code, name, description FROM support_type ORDER BY code")?;
        let rows = stmt
          .query_map([], |r| {
            Ok(RawSupportType {
              code:        r.get(0)?,
              name:        r.get(1)?,
              description: r.get(2)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(raws.into_iter().map(SupportType::from).collect())
  }
}
