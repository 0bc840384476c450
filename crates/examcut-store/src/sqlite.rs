// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// SQLite question repository.
//
// Documents, questions and corrections live in three tables tied together by
// foreign keys with ON DELETE CASCADE, so deleting a document removes
// everything derived from it. Enum, option and box columns are stored as JSON
// text; timestamps as RFC 3339.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use examcut_core::error::{ExamcutError, Result};
use examcut_core::traits::QuestionRepository;
use examcut_core::types::{
    Document, DocumentHints, DocumentId, Question, QuestionId, UserCorrection,
};

const SCHEMA_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS documents (
        id TEXT PRIMARY KEY,
        source_path TEXT NOT NULL,
        page_count INTEGER NOT NULL,
        byte_size INTEGER NOT NULL,
        content_hash TEXT NOT NULL,
        hints TEXT NOT NULL DEFAULT '{}',
        created_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS documents_by_hash ON documents (content_hash);

    CREATE TABLE IF NOT EXISTS questions (
        id TEXT PRIMARY KEY,
        document_id TEXT NOT NULL REFERENCES documents (id) ON DELETE CASCADE,
        page_number INTEGER NOT NULL,
        question_number INTEGER NOT NULL,
        text TEXT NOT NULL,
        options TEXT NOT NULL DEFAULT '[]',
        bounding_box TEXT NOT NULL,
        crop_image_path TEXT,
        subject TEXT NOT NULL,
        confidence REAL NOT NULL,
        verified INTEGER NOT NULL DEFAULT 0,
        flags TEXT NOT NULL,
        column_index INTEGER NOT NULL DEFAULT 0,
        publisher_format TEXT NOT NULL,
        created_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS questions_by_position
        ON questions (document_id, page_number, question_number);

    CREATE TABLE IF NOT EXISTS corrections (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        question_id TEXT NOT NULL REFERENCES questions (id) ON DELETE CASCADE,
        document_id TEXT NOT NULL REFERENCES documents (id) ON DELETE CASCADE,
        original_box TEXT NOT NULL,
        corrected_box TEXT NOT NULL,
        timestamp TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS corrections_by_document ON corrections (document_id);
"#;

const DOCUMENT_COLUMNS: &str =
    "id, source_path, page_count, byte_size, content_hash, hints, created_at";

const QUESTION_COLUMNS: &str = "id, document_id, page_number, question_number, text, options, \
     bounding_box, crop_image_path, subject, confidence, verified, flags, column_index, \
     publisher_format, created_at";

const UPSERT_QUESTION_SQL: &str = r#"
    INSERT INTO questions (id, document_id, page_number, question_number, text, options,
        bounding_box, crop_image_path, subject, confidence, verified, flags, column_index,
        publisher_format, created_at)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
    ON CONFLICT (id) DO UPDATE SET
        document_id = excluded.document_id,
        page_number = excluded.page_number,
        question_number = excluded.question_number,
        text = excluded.text,
        options = excluded.options,
        bounding_box = excluded.bounding_box,
        crop_image_path = excluded.crop_image_path,
        subject = excluded.subject,
        confidence = excluded.confidence,
        verified = excluded.verified,
        flags = excluded.flags,
        column_index = excluded.column_index,
        publisher_format = excluded.publisher_format,
        created_at = excluded.created_at
"#;

/// `QuestionRepository` backed by one SQLite connection.
///
/// `rusqlite` is synchronous; the connection sits behind a mutex so at most
/// one statement runs at a time. Async callers wrap calls in
/// `tokio::task::spawn_blocking` when the work is large.
pub struct SqliteRepository {
    conn: Mutex<Connection>,
}

impl SqliteRepository {
    /// Open (or create) the database at `path`.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path.as_ref())
            .map_err(|e| ExamcutError::Database(format!("open: {e}")))?;

        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| ExamcutError::Database(format!("WAL pragma: {e}")))?;

        let repo = Self::with_connection(conn)?;
        info!("question database opened");
        Ok(repo)
    }

    /// Open an in-memory database (useful for tests).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| ExamcutError::Database(format!("open in-memory: {e}")))?;
        let repo = Self::with_connection(conn)?;
        debug!("in-memory question database opened");
        Ok(repo)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", true)
            .map_err(|e| ExamcutError::Database(format!("foreign_keys pragma: {e}")))?;
        conn.execute_batch(SCHEMA_SQL)
            .map_err(|e| ExamcutError::Database(format!("create schema: {e}")))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| ExamcutError::Database("connection mutex poisoned".into()))
    }

    /// A previously imported document with the same content, if any.
    pub fn find_document_by_hash(&self, content_hash: &str) -> Result<Option<Document>> {
        let conn = self.conn()?;
        conn.query_row(
            &format!(
                "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE content_hash = ?1
                 ORDER BY created_at ASC LIMIT 1"
            ),
            params![content_hash],
            row_to_document,
        )
        .optional()
        .map_err(|e| ExamcutError::Database(format!("find by hash: {e}")))
    }

    fn count(&self, sql: &str, document_id: Option<&DocumentId>) -> Result<u64> {
        let conn = self.conn()?;
        let n: i64 = conn
            .query_row(sql, params![document_id.map(|d| d.to_string())], |row| row.get(0))
            .map_err(|e| ExamcutError::Database(format!("count: {e}")))?;
        Ok(n.max(0) as u64)
    }
}

impl QuestionRepository for SqliteRepository {
    // -- Documents ----------------------------------------------------------

    #[instrument(skip_all, fields(document = %document.id))]
    fn upsert_document(&self, document: &Document) -> Result<()> {
        let hints = to_json(&document.hints, "hints")?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO documents (id, source_path, page_count, byte_size, content_hash,
                 hints, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT (id) DO UPDATE SET
                 source_path = excluded.source_path,
                 page_count = excluded.page_count,
                 byte_size = excluded.byte_size,
                 content_hash = excluded.content_hash,
                 hints = excluded.hints,
                 created_at = excluded.created_at",
            params![
                document.id.to_string(),
                document.source_path.to_string_lossy().into_owned(),
                document.page_count,
                document.byte_size as i64,
                document.content_hash,
                hints,
                document.created_at.to_rfc3339(),
            ],
        )
        .map_err(|e| ExamcutError::Database(format!("upsert document: {e}")))?;
        debug!("document stored");
        Ok(())
    }

    fn get_document(&self, id: &DocumentId) -> Result<Option<Document>> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = ?1"),
            params![id.to_string()],
            row_to_document,
        )
        .optional()
        .map_err(|e| ExamcutError::Database(format!("get document: {e}")))
    }

    fn list_documents(&self) -> Result<Vec<Document>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {DOCUMENT_COLUMNS} FROM documents ORDER BY created_at DESC"
            ))
            .map_err(|e| ExamcutError::Database(format!("prepare list_documents: {e}")))?;
        let documents = stmt
            .query_map([], row_to_document)
            .map_err(|e| ExamcutError::Database(format!("query list_documents: {e}")))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| ExamcutError::Database(format!("collect rows: {e}")))?;
        Ok(documents)
    }

    fn update_document_hints(&self, id: &DocumentId, hints: &DocumentHints) -> Result<()> {
        let hints = to_json(hints, "hints")?;
        let conn = self.conn()?;
        let rows = conn
            .execute(
                "UPDATE documents SET hints = ?1 WHERE id = ?2",
                params![hints, id.to_string()],
            )
            .map_err(|e| ExamcutError::Database(format!("update hints: {e}")))?;
        if rows == 0 {
            return Err(ExamcutError::not_found("document", id));
        }
        Ok(())
    }

    /// Idempotent: deleting an unknown document succeeds.
    #[instrument(skip_all, fields(document = %id))]
    fn delete_document(&self, id: &DocumentId) -> Result<()> {
        let conn = self.conn()?;
        let rows = conn
            .execute("DELETE FROM documents WHERE id = ?1", params![id.to_string()])
            .map_err(|e| ExamcutError::Database(format!("delete document: {e}")))?;
        info!(removed = rows, "document deleted");
        Ok(())
    }

    // -- Questions ----------------------------------------------------------

    fn upsert_question(&self, question: &Question) -> Result<()> {
        let conn = self.conn()?;
        write_question(&conn, question)
    }

    #[instrument(skip_all, fields(count = questions.len()))]
    fn insert_questions(&self, questions: &[Question]) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction()
            .map_err(|e| ExamcutError::Database(format!("begin: {e}")))?;
        for question in questions {
            write_question(&tx, question)?;
        }
        tx.commit()
            .map_err(|e| ExamcutError::Database(format!("commit: {e}")))?;
        debug!("question batch stored");
        Ok(())
    }

    fn get_question(&self, id: &QuestionId) -> Result<Option<Question>> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {QUESTION_COLUMNS} FROM questions WHERE id = ?1"),
            params![id.to_string()],
            row_to_question,
        )
        .optional()
        .map_err(|e| ExamcutError::Database(format!("get question: {e}")))
    }

    /// Rows are decoded one at a time. The connection stays locked while
    /// `visit` runs, so the visitor must not call back into the repository.
    fn for_each_question(
        &self,
        document_id: &DocumentId,
        visit: &mut dyn FnMut(Question) -> Result<()>,
    ) -> Result<()> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {QUESTION_COLUMNS} FROM questions WHERE document_id = ?1
                 ORDER BY page_number ASC, question_number ASC, rowid ASC"
            ))
            .map_err(|e| ExamcutError::Database(format!("prepare questions: {e}")))?;
        let mut rows = stmt
            .query(params![document_id.to_string()])
            .map_err(|e| ExamcutError::Database(format!("query questions: {e}")))?;
        while let Some(row) = rows
            .next()
            .map_err(|e| ExamcutError::Database(format!("next row: {e}")))?
        {
            let question = row_to_question(row)
                .map_err(|e| ExamcutError::Database(format!("row parse: {e}")))?;
            visit(question)?;
        }
        Ok(())
    }

    fn set_verified(&self, id: &QuestionId, verified: bool) -> Result<()> {
        let conn = self.conn()?;
        let rows = conn
            .execute(
                "UPDATE questions SET verified = ?1 WHERE id = ?2",
                params![verified, id.to_string()],
            )
            .map_err(|e| ExamcutError::Database(format!("set verified: {e}")))?;
        if rows == 0 {
            return Err(ExamcutError::not_found("question", id));
        }
        Ok(())
    }

    fn set_crop_path(&self, id: &QuestionId, path: Option<&Path>) -> Result<()> {
        let conn = self.conn()?;
        let rows = conn
            .execute(
                "UPDATE questions SET crop_image_path = ?1 WHERE id = ?2",
                params![path.map(|p| p.to_string_lossy().into_owned()), id.to_string()],
            )
            .map_err(|e| ExamcutError::Database(format!("set crop path: {e}")))?;
        if rows == 0 {
            return Err(ExamcutError::not_found("question", id));
        }
        Ok(())
    }

    // -- Corrections --------------------------------------------------------

    #[instrument(skip_all, fields(question = %correction.question_id))]
    fn record_correction(&self, correction: &UserCorrection) -> Result<()> {
        let original = to_json(&correction.original_box, "original_box")?;
        let corrected = to_json(&correction.corrected_box, "corrected_box")?;

        let mut conn = self.conn()?;
        let tx = conn
            .transaction()
            .map_err(|e| ExamcutError::Database(format!("begin: {e}")))?;

        let rows = tx
            .execute(
                "UPDATE questions SET bounding_box = ?1 WHERE id = ?2",
                params![corrected, correction.question_id.to_string()],
            )
            .map_err(|e| ExamcutError::Database(format!("move box: {e}")))?;
        if rows == 0 {
            return Err(ExamcutError::not_found("question", correction.question_id));
        }

        tx.execute(
            "INSERT INTO corrections (question_id, document_id, original_box, corrected_box,
                 timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                correction.question_id.to_string(),
                correction.document_id.to_string(),
                original,
                corrected,
                correction.timestamp.to_rfc3339(),
            ],
        )
        .map_err(|e| ExamcutError::Database(format!("insert correction: {e}")))?;

        tx.commit()
            .map_err(|e| ExamcutError::Database(format!("commit: {e}")))?;
        info!("correction recorded");
        Ok(())
    }

    fn corrections_for_document(&self, document_id: &DocumentId) -> Result<Vec<UserCorrection>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT question_id, document_id, original_box, corrected_box, timestamp
                 FROM corrections WHERE document_id = ?1 ORDER BY id ASC",
            )
            .map_err(|e| ExamcutError::Database(format!("prepare corrections: {e}")))?;
        let corrections = stmt
            .query_map(params![document_id.to_string()], row_to_correction)
            .map_err(|e| ExamcutError::Database(format!("query corrections: {e}")))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| ExamcutError::Database(format!("collect rows: {e}")))?;
        Ok(corrections)
    }

    fn all_corrections(&self) -> Result<Vec<UserCorrection>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT question_id, document_id, original_box, corrected_box, timestamp
                 FROM corrections ORDER BY id ASC",
            )
            .map_err(|e| ExamcutError::Database(format!("prepare corrections: {e}")))?;
        let corrections = stmt
            .query_map([], row_to_correction)
            .map_err(|e| ExamcutError::Database(format!("query corrections: {e}")))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| ExamcutError::Database(format!("collect rows: {e}")))?;
        Ok(corrections)
    }

    // -- Counts -------------------------------------------------------------

    fn count_questions(&self, document_id: Option<&DocumentId>) -> Result<u64> {
        self.count(
            "SELECT COUNT(*) FROM questions WHERE (?1 IS NULL OR document_id = ?1)",
            document_id,
        )
    }

    fn count_verified(&self, document_id: Option<&DocumentId>) -> Result<u64> {
        self.count(
            "SELECT COUNT(*) FROM questions
             WHERE verified = 1 AND (?1 IS NULL OR document_id = ?1)",
            document_id,
        )
    }

    fn count_corrected(&self, document_id: Option<&DocumentId>) -> Result<u64> {
        self.count(
            "SELECT COUNT(DISTINCT question_id) FROM corrections
             WHERE (?1 IS NULL OR document_id = ?1)",
            document_id,
        )
    }
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

fn to_json<T: Serialize>(value: &T, what: &str) -> Result<String> {
    serde_json::to_string(value)
        .map_err(|e| ExamcutError::Database(format!("serialize {what}: {e}")))
}

fn write_question(conn: &Connection, q: &Question) -> Result<()> {
    conn.execute(
        UPSERT_QUESTION_SQL,
        params![
            q.id.to_string(),
            q.document_id.to_string(),
            q.page_number,
            q.question_number,
            q.text,
            to_json(&q.options, "options")?,
            to_json(&q.bounding_box, "bounding_box")?,
            q.crop_image_path
                .as_ref()
                .map(|p| p.to_string_lossy().into_owned()),
            to_json(&q.subject, "subject")?,
            q.confidence as f64,
            q.verified,
            to_json(&q.flags, "flags")?,
            q.column_index,
            to_json(&q.publisher_format, "publisher_format")?,
            q.created_at.to_rfc3339(),
        ],
    )
    .map_err(|e| ExamcutError::Database(format!("upsert question {}: {e}", q.id)))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn conversion_error<E>(index: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(err))
}

fn json_column<T: DeserializeOwned>(row: &Row<'_>, index: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(index)?;
    serde_json::from_str(&raw).map_err(|e| conversion_error(index, e))
}

fn uuid_column(row: &Row<'_>, index: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(index)?;
    Uuid::parse_str(&raw).map_err(|e| conversion_error(index, e))
}

fn time_column(row: &Row<'_>, index: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(index)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(index, e))
}

/// Column order must match `DOCUMENT_COLUMNS`.
fn row_to_document(row: &Row<'_>) -> rusqlite::Result<Document> {
    let source_path: String = row.get(1)?;
    Ok(Document {
        id: DocumentId(uuid_column(row, 0)?),
        source_path: source_path.into(),
        page_count: row.get(2)?,
        byte_size: row.get::<_, i64>(3)?.max(0) as u64,
        content_hash: row.get(4)?,
        hints: json_column(row, 5)?,
        created_at: time_column(row, 6)?,
    })
}

/// Column order must match `QUESTION_COLUMNS`.
fn row_to_question(row: &Row<'_>) -> rusqlite::Result<Question> {
    let crop: Option<String> = row.get(7)?;
    Ok(Question {
        id: QuestionId(uuid_column(row, 0)?),
        document_id: DocumentId(uuid_column(row, 1)?),
        page_number: row.get(2)?,
        question_number: row.get(3)?,
        text: row.get(4)?,
        options: json_column(row, 5)?,
        bounding_box: json_column(row, 6)?,
        crop_image_path: crop.map(Into::into),
        subject: json_column(row, 8)?,
        confidence: row.get::<_, f64>(9)? as f32,
        verified: row.get(10)?,
        flags: json_column(row, 11)?,
        column_index: row.get(12)?,
        publisher_format: json_column(row, 13)?,
        created_at: time_column(row, 14)?,
    })
}

fn row_to_correction(row: &Row<'_>) -> rusqlite::Result<UserCorrection> {
    Ok(UserCorrection {
        question_id: QuestionId(uuid_column(row, 0)?),
        document_id: DocumentId(uuid_column(row, 1)?),
        original_box: json_column(row, 2)?,
        corrected_box: json_column(row, 3)?,
        timestamp: time_column(row, 4)?,
    })
}
