use crate::archive::{
    AdminEventRecord, Archive, EntityRecord, MediaRecord, MessageRecord, ParticipantDelta,
};
use crate::error::TgErrorContext;
use crate::model::{ForwardHeader, PeerId, ResumeCursor};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::Path;
use turso::{Builder, Connection, Database, Row, Value};

pub const DB_FILE: &str = "tgexport.db";

pub struct Store {
    conn: Connection,
    in_tx: bool,
}

/// Per-conversation summary for the `status` command.
#[derive(Debug, Clone, Serialize)]
pub struct ContextStatus {
    pub context_id: i64,
    pub kind: Option<String>,
    pub name: Option<String>,
    pub messages: u64,
    pub oldest_id: Option<i32>,
    pub newest_id: Option<i32>,
    pub media: u64,
    pub media_downloaded: u64,
    pub admin_events: u64,
    pub offset_id: Option<i32>,
    pub stop_at: Option<i32>,
}

const TABLES: &[(&str, &str)] = &[
    (
        "entities",
        "CREATE TABLE IF NOT EXISTS entities (
            peer_id INTEGER PRIMARY KEY,
            kind TEXT NOT NULL,
            name TEXT NOT NULL DEFAULT '',
            username TEXT,
            about TEXT,
            phone TEXT,
            bot INTEGER NOT NULL DEFAULT 0,
            megagroup INTEGER NOT NULL DEFAULT 0,
            participants_count INTEGER,
            photo_media_id INTEGER,
            updated_at TEXT NOT NULL
        )",
    ),
    (
        "messages",
        "CREATE TABLE IF NOT EXISTS messages (
            context_id INTEGER NOT NULL,
            id INTEGER NOT NULL,
            date TEXT NOT NULL,
            edit_date TEXT,
            sender_id INTEGER,
            outgoing INTEGER NOT NULL DEFAULT 0,
            text TEXT NOT NULL DEFAULT '',
            formatting TEXT,
            reply_to INTEGER,
            forward_id INTEGER,
            media_id INTEGER,
            views INTEGER,
            post_author TEXT,
            service_action TEXT,
            service_payload TEXT,
            PRIMARY KEY (context_id, id)
        )",
    ),
    (
        "media",
        "CREATE TABLE IF NOT EXISTS media (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            remote_id INTEGER NOT NULL,
            kind TEXT NOT NULL,
            mime_type TEXT,
            name TEXT,
            size INTEGER,
            date TEXT,
            local_path TEXT,
            UNIQUE (remote_id, kind)
        )",
    ),
    (
        "forwards",
        "CREATE TABLE IF NOT EXISTS forwards (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            context_id INTEGER NOT NULL,
            message_id INTEGER NOT NULL,
            from_id INTEGER,
            from_name TEXT,
            date TEXT NOT NULL,
            channel_post INTEGER,
            post_author TEXT,
            UNIQUE (context_id, message_id)
        )",
    ),
    (
        "admin_log",
        "CREATE TABLE IF NOT EXISTS admin_log (
            context_id INTEGER NOT NULL,
            id INTEGER NOT NULL,
            date TEXT NOT NULL,
            user_id INTEGER NOT NULL,
            action TEXT NOT NULL,
            payload TEXT NOT NULL DEFAULT '',
            media_id1 INTEGER,
            media_id2 INTEGER,
            PRIMARY KEY (context_id, id)
        )",
    ),
    (
        "resume",
        "CREATE TABLE IF NOT EXISTS resume (
            context_id INTEGER PRIMARY KEY,
            offset_id INTEGER NOT NULL DEFAULT 0,
            offset_date TEXT,
            stop_at INTEGER NOT NULL DEFAULT 0
        )",
    ),
    (
        "participants",
        "CREATE TABLE IF NOT EXISTS participants (
            context_id INTEGER NOT NULL,
            user_id INTEGER NOT NULL,
            added_at TEXT NOT NULL,
            PRIMARY KEY (context_id, user_id)
        )",
    ),
];

impl Store {
    pub async fn open(store_dir: &str) -> Result<Self> {
        std::fs::create_dir_all(store_dir)
            .with_context(|| format!("Failed to create store directory {}", store_dir))?;
        let db_path = Path::new(store_dir).join(DB_FILE);
        let db_path_str = db_path.to_string_lossy();
        let db: Database = Builder::new_local(&db_path_str)
            .build()
            .await
            .context_store(&db_path_str)?;
        let conn = db.connect().context("Failed to connect to database")?;

        // PRAGMAs that set values return the new value, so use query and ignore results
        let _ = conn.query("PRAGMA journal_mode=WAL", ()).await;
        let _ = conn.query("PRAGMA busy_timeout=5000", ()).await;

        let mut store = Store { conn, in_tx: false };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&mut self) -> Result<()> {
        // One statement per execute
        for (name, ddl) in TABLES {
            self.conn
                .execute(ddl, ())
                .await
                .with_context(|| format!("Failed to create {} table", name))?;
        }
        // Archives created before formatting was stored lack the column.
        let _ = self
            .conn
            .execute("ALTER TABLE messages ADD COLUMN formatting TEXT", ())
            .await;
        self.conn
            .execute(
                "CREATE INDEX IF NOT EXISTS idx_messages_sender ON messages(sender_id)",
                (),
            )
            .await?;
        self.conn
            .execute(
                "CREATE INDEX IF NOT EXISTS idx_messages_media ON messages(media_id)",
                (),
            )
            .await?;
        Ok(())
    }

    /// Open a transaction before the first write after a commit.
    async fn begin(&mut self) -> Result<()> {
        if !self.in_tx {
            self.conn.execute("BEGIN", ()).await?;
            self.in_tx = true;
        }
        Ok(())
    }

    async fn query_i64(&self, sql: &str, params: Vec<Value>) -> Result<Option<i64>> {
        let mut rows = self
            .conn
            .query(sql, turso::params_from_iter(params))
            .await?;
        match rows.next().await? {
            Some(row) => Ok(row.get::<Option<i64>>(0)?),
            None => Ok(None),
        }
    }

    async fn count(&self, sql: &str, context_id: i64) -> Result<u64> {
        Ok(self
            .query_i64(sql, vec![Value::Integer(context_id)])
            .await?
            .unwrap_or(0)
            .max(0) as u64)
    }

    // --- Status ---

    /// Summaries for every archived conversation, or just `chat`.
    pub async fn status(&self, chat: Option<PeerId>) -> Result<Vec<ContextStatus>> {
        let mut ids = BTreeSet::new();
        for sql in [
            "SELECT DISTINCT context_id FROM messages",
            "SELECT context_id FROM resume",
            "SELECT DISTINCT context_id FROM admin_log",
        ] {
            let mut rows = self.conn.query(sql, ()).await?;
            while let Some(row) = rows.next().await? {
                ids.insert(row.get::<i64>(0)?);
            }
        }
        if let Some(chat) = chat {
            ids.retain(|id| *id == chat.marked());
        }

        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            out.push(self.context_status(id).await?);
        }
        Ok(out)
    }

    async fn context_status(&self, context_id: i64) -> Result<ContextStatus> {
        let (kind, name) = {
            let mut rows = self
                .conn
                .query("SELECT kind, name FROM entities WHERE peer_id = ?1", [context_id])
                .await?;
            match rows.next().await? {
                Some(row) => (
                    row.get::<Option<String>>(0)?,
                    row.get::<Option<String>>(1)?,
                ),
                None => (None, None),
            }
        };

        let (oldest_id, newest_id) = {
            let mut rows = self
                .conn
                .query(
                    "SELECT MIN(id), MAX(id) FROM messages WHERE context_id = ?1",
                    [context_id],
                )
                .await?;
            match rows.next().await? {
                Some(row) => (row.get::<Option<i32>>(0)?, row.get::<Option<i32>>(1)?),
                None => (None, None),
            }
        };

        let (offset_id, stop_at) = {
            let mut rows = self
                .conn
                .query(
                    "SELECT offset_id, stop_at FROM resume WHERE context_id = ?1",
                    [context_id],
                )
                .await?;
            match rows.next().await? {
                Some(row) => (Some(row.get::<i32>(0)?), Some(row.get::<i32>(1)?)),
                None => (None, None),
            }
        };

        Ok(ContextStatus {
            context_id,
            kind,
            name,
            messages: self
                .count("SELECT COUNT(*) FROM messages WHERE context_id = ?1", context_id)
                .await?,
            oldest_id,
            newest_id,
            media: self
                .count(
                    "SELECT COUNT(*) FROM messages m JOIN media md ON md.id = m.media_id
                     WHERE m.context_id = ?1",
                    context_id,
                )
                .await?,
            media_downloaded: self
                .count(
                    "SELECT COUNT(md.local_path) FROM messages m JOIN media md ON md.id = m.media_id
                     WHERE m.context_id = ?1",
                    context_id,
                )
                .await?,
            admin_events: self
                .count("SELECT COUNT(*) FROM admin_log WHERE context_id = ?1", context_id)
                .await?,
            offset_id,
            stop_at,
        })
    }

    #[cfg(test)]
    async fn media_local_path(&self, media_id: i64) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query("SELECT local_path FROM media WHERE id = ?1", [media_id])
            .await?;
        match rows.next().await? {
            Some(row) => Ok(row.get::<Option<String>>(0)?),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl Archive for Store {
    async fn upsert_entity(&mut self, record: &EntityRecord) -> Result<()> {
        self.begin().await?;
        let params = vec![
            Value::Integer(record.peer_id.marked()),
            Value::Text(record.kind.as_str().to_string()),
            Value::Text(record.name.clone()),
            text(record.username.as_deref()),
            text(record.about.as_deref()),
            text(record.phone.as_deref()),
            Value::Integer(record.bot as i64),
            Value::Integer(record.megagroup as i64),
            int(record.participants_count.map(i64::from)),
            int(record.photo_media_id),
            Value::Text(Utc::now().to_rfc3339()),
        ];
        self.conn
            .execute(
                "INSERT INTO entities (peer_id, kind, name, username, about, phone, bot, megagroup, participants_count, photo_media_id, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                 ON CONFLICT(peer_id) DO UPDATE SET
                    kind = excluded.kind,
                    name = CASE WHEN excluded.name != '' THEN excluded.name ELSE name END,
                    username = excluded.username,
                    about = COALESCE(excluded.about, about),
                    phone = COALESCE(excluded.phone, phone),
                    bot = excluded.bot,
                    megagroup = excluded.megagroup,
                    participants_count = COALESCE(excluded.participants_count, participants_count),
                    photo_media_id = COALESCE(excluded.photo_media_id, photo_media_id),
                    updated_at = excluded.updated_at",
                turso::params_from_iter(params),
            )
            .await
            .with_context(|| format!("Failed to store entity {}", record.peer_id))?;
        Ok(())
    }

    async fn upsert_message(&mut self, record: &MessageRecord) -> Result<()> {
        self.begin().await?;
        let params = vec![
            Value::Integer(record.context_id.marked()),
            Value::Integer(record.id as i64),
            Value::Text(record.date.to_rfc3339()),
            date(record.edit_date),
            int(record.sender_id.map(PeerId::marked)),
            Value::Integer(record.outgoing as i64),
            Value::Text(record.text.clone()),
            text(record.formatting.as_deref()),
            int(record.reply_to.map(i64::from)),
            int(record.forward_id),
            int(record.media_id),
            int(record.views.map(i64::from)),
            text(record.post_author.as_deref()),
            text(record.service_action.as_deref()),
            text(record.service_payload.as_deref()),
        ];
        self.conn
            .execute(
                "INSERT INTO messages (context_id, id, date, edit_date, sender_id, outgoing, text, formatting, reply_to, forward_id, media_id, views, post_author, service_action, service_payload)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
                 ON CONFLICT(context_id, id) DO UPDATE SET
                    date = excluded.date,
                    edit_date = COALESCE(excluded.edit_date, edit_date),
                    sender_id = excluded.sender_id,
                    outgoing = excluded.outgoing,
                    text = excluded.text,
                    formatting = excluded.formatting,
                    reply_to = excluded.reply_to,
                    forward_id = COALESCE(excluded.forward_id, forward_id),
                    media_id = COALESCE(excluded.media_id, media_id),
                    views = COALESCE(excluded.views, views),
                    post_author = excluded.post_author,
                    service_action = excluded.service_action,
                    service_payload = excluded.service_payload",
                turso::params_from_iter(params),
            )
            .await
            .with_context(|| {
                format!("Failed to store message {} of {}", record.id, record.context_id)
            })?;
        Ok(())
    }

    async fn upsert_media(&mut self, record: &MediaRecord) -> Result<i64> {
        self.begin().await?;
        let params = vec![
            Value::Integer(record.remote_id),
            Value::Text(record.kind.as_str().to_string()),
            text(record.mime_type.as_deref()),
            text(record.name.as_deref()),
            int(record.size),
            date(record.date),
            text(record.local_path.as_deref()),
        ];
        // A download that failed this time never erases an earlier path.
        self.conn
            .execute(
                "INSERT INTO media (remote_id, kind, mime_type, name, size, date, local_path)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(remote_id, kind) DO UPDATE SET
                    mime_type = COALESCE(excluded.mime_type, mime_type),
                    name = COALESCE(excluded.name, name),
                    size = COALESCE(excluded.size, size),
                    date = COALESCE(excluded.date, date),
                    local_path = COALESCE(excluded.local_path, local_path)",
                turso::params_from_iter(params),
            )
            .await
            .with_context(|| format!("Failed to store media {}", record.remote_id))?;

        self.query_i64(
            "SELECT id FROM media WHERE remote_id = ?1 AND kind = ?2",
            vec![
                Value::Integer(record.remote_id),
                Value::Text(record.kind.as_str().to_string()),
            ],
        )
        .await?
        .with_context(|| format!("Media {} vanished after insert", record.remote_id))
    }

    async fn upsert_forward(
        &mut self,
        context_id: PeerId,
        message_id: i32,
        header: &ForwardHeader,
    ) -> Result<i64> {
        self.begin().await?;
        let params = vec![
            Value::Integer(context_id.marked()),
            Value::Integer(message_id as i64),
            int(header.from_id.map(PeerId::marked)),
            text(header.from_name.as_deref()),
            Value::Text(header.date.to_rfc3339()),
            int(header.channel_post.map(i64::from)),
            text(header.post_author.as_deref()),
        ];
        self.conn
            .execute(
                "INSERT INTO forwards (context_id, message_id, from_id, from_name, date, channel_post, post_author)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(context_id, message_id) DO UPDATE SET
                    from_id = excluded.from_id,
                    from_name = excluded.from_name,
                    date = excluded.date,
                    channel_post = excluded.channel_post,
                    post_author = excluded.post_author",
                turso::params_from_iter(params),
            )
            .await
            .context("Failed to store forward header")?;

        self.query_i64(
            "SELECT id FROM forwards WHERE context_id = ?1 AND message_id = ?2",
            vec![
                Value::Integer(context_id.marked()),
                Value::Integer(message_id as i64),
            ],
        )
        .await?
        .with_context(|| format!("Forward of {}/{} vanished after insert", context_id, message_id))
    }

    async fn upsert_admin_event(&mut self, record: &AdminEventRecord) -> Result<()> {
        self.begin().await?;
        let params = vec![
            Value::Integer(record.context_id.marked()),
            Value::Integer(record.id),
            Value::Text(record.date.to_rfc3339()),
            Value::Integer(record.user_id),
            Value::Text(record.action.clone()),
            Value::Text(record.payload.clone()),
            int(record.media_id1),
            int(record.media_id2),
        ];
        self.conn
            .execute(
                "INSERT INTO admin_log (context_id, id, date, user_id, action, payload, media_id1, media_id2)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(context_id, id) DO UPDATE SET
                    date = excluded.date,
                    user_id = excluded.user_id,
                    action = excluded.action,
                    payload = excluded.payload,
                    media_id1 = COALESCE(excluded.media_id1, media_id1),
                    media_id2 = COALESCE(excluded.media_id2, media_id2)",
                turso::params_from_iter(params),
            )
            .await
            .with_context(|| format!("Failed to store admin log event {}", record.id))?;
        Ok(())
    }

    async fn resume_cursor(&mut self, context_id: PeerId) -> Result<ResumeCursor> {
        let mut rows = self
            .conn
            .query(
                "SELECT offset_id, offset_date, stop_at FROM resume WHERE context_id = ?1",
                [context_id.marked()],
            )
            .await?;
        match rows.next().await? {
            Some(row) => row_to_cursor(&row),
            None => Ok(ResumeCursor::default()),
        }
    }

    async fn save_resume_cursor(&mut self, context_id: PeerId, cursor: &ResumeCursor) -> Result<()> {
        self.begin().await?;
        let params = vec![
            Value::Integer(context_id.marked()),
            Value::Integer(cursor.offset_id as i64),
            date(cursor.offset_date),
            Value::Integer(cursor.stop_at as i64),
        ];
        self.conn
            .execute(
                "INSERT INTO resume (context_id, offset_id, offset_date, stop_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(context_id) DO UPDATE SET
                    offset_id = excluded.offset_id,
                    offset_date = excluded.offset_date,
                    stop_at = excluded.stop_at",
                turso::params_from_iter(params),
            )
            .await
            .with_context(|| format!("Failed to save resume cursor for {}", context_id))?;
        Ok(())
    }

    async fn message_count(&mut self, context_id: PeerId) -> Result<u64> {
        self.count(
            "SELECT COUNT(*) FROM messages WHERE context_id = ?1",
            context_id.marked(),
        )
        .await
    }

    async fn max_message_id(&mut self, context_id: PeerId) -> Result<Option<i32>> {
        Ok(self
            .query_i64(
                "SELECT MAX(id) FROM messages WHERE context_id = ?1",
                vec![Value::Integer(context_id.marked())],
            )
            .await?
            .map(|id| id as i32))
    }

    async fn participant_delta(
        &mut self,
        context_id: PeerId,
        current: &[PeerId],
    ) -> Result<ParticipantDelta> {
        let ctx = context_id.marked();
        let mut previous = BTreeSet::new();
        {
            let mut rows = self
                .conn
                .query("SELECT user_id FROM participants WHERE context_id = ?1", [ctx])
                .await?;
            while let Some(row) = rows.next().await? {
                previous.insert(PeerId::from_marked(row.get::<i64>(0)?));
            }
        }
        let current: BTreeSet<PeerId> = current.iter().copied().collect();
        let delta = ParticipantDelta {
            added: current.difference(&previous).copied().collect(),
            removed: previous.difference(&current).copied().collect(),
        };

        self.begin().await?;
        let now = Utc::now().to_rfc3339();
        for id in &delta.added {
            self.conn
                .execute(
                    "INSERT INTO participants (context_id, user_id, added_at) VALUES (?1, ?2, ?3)
                     ON CONFLICT(context_id, user_id) DO NOTHING",
                    (ctx, id.marked(), now.as_str()),
                )
                .await?;
        }
        for id in &delta.removed {
            self.conn
                .execute(
                    "DELETE FROM participants WHERE context_id = ?1 AND user_id = ?2",
                    (ctx, id.marked()),
                )
                .await?;
        }
        Ok(delta)
    }

    async fn commit(&mut self) -> Result<()> {
        if self.in_tx {
            self.conn
                .execute("COMMIT", ())
                .await
                .context("Failed to commit archive transaction")?;
            self.in_tx = false;
        }
        Ok(())
    }
}

fn int(v: Option<i64>) -> Value {
    v.map(Value::Integer).unwrap_or(Value::Null)
}

fn text(v: Option<&str>) -> Value {
    v.map(|s| Value::Text(s.to_string())).unwrap_or(Value::Null)
}

fn date(v: Option<DateTime<Utc>>) -> Value {
    v.map(|d| Value::Text(d.to_rfc3339())).unwrap_or(Value::Null)
}

fn parse_ts(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .ok()
}

fn row_to_cursor(row: &Row) -> Result<ResumeCursor> {
    Ok(ResumeCursor {
        offset_id: row.get(0)?,
        offset_date: row
            .get::<Option<String>>(1)?
            .and_then(|s| parse_ts(&s)),
        stop_at: row.get(2)?,
    })
}
