use crate::analytics::filters::{LinkFilter, QrCodeFilter, Sort, SortDir, SortKey};
use crate::models::{
    generate_code, now_millis, ClickEvent, ClickTarget, Link, NewClickEvent, NewLink, NewQrCode,
    QrCode, RateLimitRecord, Tag, TagRef,
};
use crate::ratelimit::RateLimitPolicy;
use crate::storage::{Store, StorageError, StorageResult};
use anyhow::Result;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Retries for generated short codes before giving up on a collision streak
const GENERATE_ATTEMPTS: u32 = 4;

pub struct SqliteStore {
    pool: Arc<SqlitePool>,
}

impl SqliteStore {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    async fn load_link_tags(&self, links: &mut [Link]) -> Result<()> {
        if links.is_empty() {
            return Ok(());
        }

        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT link_code, tag_id, tag_name FROM link_tags WHERE link_code IN (",
        );
        {
            let mut sep = qb.separated(", ");
            for link in links.iter() {
                sep.push_bind(link.code.clone());
            }
        }
        qb.push(")");

        let rows: Vec<(String, i64, String)> =
            qb.build_query_as().fetch_all(self.pool.as_ref()).await?;

        let mut by_code: HashMap<String, Vec<TagRef>> = HashMap::new();
        for (code, tag_id, tag_name) in rows {
            by_code.entry(code).or_default().push(TagRef { tag_id, tag_name });
        }
        for link in links {
            if let Some(tags) = by_code.remove(&link.code) {
                link.tags = tags;
            }
        }

        Ok(())
    }

    async fn load_qr_tags(&self, qrs: &mut [QrCode]) -> Result<()> {
        if qrs.is_empty() {
            return Ok(());
        }

        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT qr_code, tag_id, tag_name FROM qr_tags WHERE qr_code IN (",
        );
        {
            let mut sep = qb.separated(", ");
            for qr in qrs.iter() {
                sep.push_bind(qr.code.clone());
            }
        }
        qb.push(")");

        let rows: Vec<(String, i64, String)> =
            qb.build_query_as().fetch_all(self.pool.as_ref()).await?;

        let mut by_code: HashMap<String, Vec<TagRef>> = HashMap::new();
        for (code, tag_id, tag_name) in rows {
            by_code.entry(code).or_default().push(TagRef { tag_id, tag_name });
        }
        for qr in qrs {
            if let Some(tags) = by_code.remove(&qr.code) {
                qr.tags = tags;
            }
        }

        Ok(())
    }
}

/// Map a driver error to `Conflict` when it is a unique-constraint violation
/// (used for the pairing index, which is not the INSERT's conflict target)
fn map_unique(e: sqlx::Error) -> StorageError {
    match e.as_database_error() {
        Some(db) if db.is_unique_violation() => StorageError::Conflict,
        _ => StorageError::Other(e.into()),
    }
}

/// Append the WHERE clause for a link filter. The same predicate is shared
/// by listing and counting so a page and its total always agree.
fn push_link_filter(qb: &mut QueryBuilder<'_, Sqlite>, filter: &LinkFilter) {
    qb.push(" WHERE owner_id = ").push_bind(filter.owner_id.clone());

    if let Some(search) = filter.search.as_deref().filter(|s| !s.is_empty()) {
        let pattern = format!("%{}%", search);
        qb.push(" AND (title LIKE ")
            .push_bind(pattern.clone())
            .push(" OR destination LIKE ")
            .push_bind(pattern.clone())
            .push(" OR EXISTS (SELECT 1 FROM link_tags lt WHERE lt.link_code = links.code AND lt.tag_name LIKE ")
            .push_bind(pattern)
            .push("))");
    }

    if !filter.tag_ids.is_empty() {
        qb.push(
            " AND EXISTS (SELECT 1 FROM link_tags lt WHERE lt.link_code = links.code AND lt.tag_id IN (",
        );
        {
            let mut sep = qb.separated(", ");
            for id in &filter.tag_ids {
                sep.push_bind(*id);
            }
        }
        qb.push("))");
    }

    if let Some(custom) = filter.custom_code {
        qb.push(" AND is_custom_code = ").push_bind(custom);
    }

    if let Some(attached) = filter.attached_qr {
        qb.push(if attached {
            " AND qr_code_ref IS NOT NULL"
        } else {
            " AND qr_code_ref IS NULL"
        });
    }

    if let Some(start) = filter.created.start_millis() {
        qb.push(" AND created_at >= ").push_bind(start);
    }
    if let Some(end) = filter.created.end_millis() {
        qb.push(" AND created_at <= ").push_bind(end);
    }
}

fn push_qr_filter(qb: &mut QueryBuilder<'_, Sqlite>, filter: &QrCodeFilter) {
    qb.push(" WHERE owner_id = ").push_bind(filter.owner_id.clone());

    if let Some(search) = filter.search.as_deref().filter(|s| !s.is_empty()) {
        let pattern = format!("%{}%", search);
        qb.push(" AND (title LIKE ")
            .push_bind(pattern.clone())
            .push(" OR destination LIKE ")
            .push_bind(pattern.clone())
            .push(" OR EXISTS (SELECT 1 FROM qr_tags qt WHERE qt.qr_code = qr_codes.code AND qt.tag_name LIKE ")
            .push_bind(pattern)
            .push("))");
    }

    if !filter.tag_ids.is_empty() {
        qb.push(
            " AND EXISTS (SELECT 1 FROM qr_tags qt WHERE qt.qr_code = qr_codes.code AND qt.tag_id IN (",
        );
        {
            let mut sep = qb.separated(", ");
            for id in &filter.tag_ids {
                sep.push_bind(*id);
            }
        }
        qb.push("))");
    }

    if let Some(attached) = filter.attached_link {
        qb.push(if attached {
            " AND attached_link_code IS NOT NULL"
        } else {
            " AND attached_link_code IS NULL"
        });
    }

    if let Some(start) = filter.created.start_millis() {
        qb.push(" AND created_at >= ").push_bind(start);
    }
    if let Some(end) = filter.created.end_millis() {
        qb.push(" AND created_at <= ").push_bind(end);
    }
}

/// ORDER BY clause; `id` is the tie-break so pages are stable within a query
fn order_clause(sort: Sort, count_column: &str) -> String {
    let column = match sort.key {
        SortKey::CreatedAt => "created_at",
        SortKey::Clicks => count_column,
    };
    let dir = match sort.dir {
        SortDir::Asc => "ASC",
        SortDir::Desc => "DESC",
    };
    format!(" ORDER BY {column} {dir}, id ASC")
}

const LINK_COLUMNS: &str = "id, owner_id, code, is_custom_code, destination, title, qr_code_ref, is_qr_hosting, clicks, created_at";
const QR_COLUMNS: &str = "id, owner_id, code, destination, title, attached_link_code, styling, scans, created_at";
const EVENT_COLUMNS: &str = "id, address, browser, os, device, referrer, language, timezone, country, region, city, path, query_params, created_at";

#[async_trait]
impl Store for SqliteStore {
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS links (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                owner_id TEXT NOT NULL,
                code TEXT NOT NULL UNIQUE,
                is_custom_code INTEGER NOT NULL DEFAULT 0,
                destination TEXT NOT NULL,
                title TEXT NOT NULL DEFAULT '',
                qr_code_ref TEXT,
                is_qr_hosting INTEGER NOT NULL DEFAULT 0,
                clicks INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        // At most one link may reference a given QR code
        sqlx::query(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_links_qr_ref ON links(qr_code_ref) WHERE qr_code_ref IS NOT NULL",
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_links_owner ON links(owner_id)")
            .execute(self.pool.as_ref())
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS qr_codes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                owner_id TEXT NOT NULL,
                code TEXT NOT NULL UNIQUE,
                destination TEXT NOT NULL,
                title TEXT NOT NULL DEFAULT '',
                attached_link_code TEXT,
                styling TEXT,
                scans INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_qr_attached_link ON qr_codes(attached_link_code) WHERE attached_link_code IS NOT NULL",
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_qr_owner ON qr_codes(owner_id)")
            .execute(self.pool.as_ref())
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tags (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                owner_id TEXT NOT NULL,
                name TEXT NOT NULL,
                UNIQUE (owner_id, name)
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS link_tags (
                link_code TEXT NOT NULL,
                tag_id INTEGER NOT NULL,
                tag_name TEXT NOT NULL,
                PRIMARY KEY (link_code, tag_id)
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS qr_tags (
                qr_code TEXT NOT NULL,
                tag_id INTEGER NOT NULL,
                tag_name TEXT NOT NULL,
                PRIMARY KEY (qr_code, tag_id)
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS click_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                entity_kind TEXT NOT NULL CHECK (entity_kind IN ('link', 'qr')),
                entity_code TEXT NOT NULL,
                address TEXT NOT NULL,
                browser TEXT,
                os TEXT,
                device TEXT,
                referrer TEXT,
                language TEXT,
                timezone TEXT,
                country TEXT,
                region TEXT,
                city TEXT,
                path TEXT,
                query_params TEXT NOT NULL DEFAULT '{}',
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_events_entity ON click_events(entity_kind, entity_code, created_at)",
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS rate_limits (
                identifier TEXT PRIMARY KEY,
                attempts INTEGER NOT NULL,
                last_attempt_at INTEGER NOT NULL,
                blocked_until INTEGER
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    async fn create_link(&self, link: &NewLink) -> StorageResult<Link> {
        let created_at = now_millis();
        let is_custom = link.custom_code.is_some();
        let mut attempts_left = if is_custom { 1 } else { GENERATE_ATTEMPTS };

        loop {
            let code = link
                .custom_code
                .clone()
                .unwrap_or_else(generate_code);

            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(|e| StorageError::Other(e.into()))?;

            let inserted = sqlx::query(
                r#"
                INSERT INTO links (owner_id, code, is_custom_code, destination, title, qr_code_ref, is_qr_hosting, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(code) DO NOTHING
                "#,
            )
            .bind(&link.owner_id)
            .bind(&code)
            .bind(is_custom)
            .bind(&link.destination)
            .bind(&link.title)
            .bind(&link.qr_code_ref)
            .bind(link.is_qr_hosting)
            .bind(created_at)
            .execute(&mut *tx)
            .await
            .map_err(map_unique)?;

            if inserted.rows_affected() == 0 {
                attempts_left -= 1;
                if attempts_left == 0 {
                    return Err(StorageError::Conflict);
                }
                continue;
            }

            for tag in &link.tags {
                sqlx::query(
                    "INSERT INTO link_tags (link_code, tag_id, tag_name) VALUES (?, ?, ?) ON CONFLICT DO NOTHING",
                )
                .bind(&code)
                .bind(tag.tag_id)
                .bind(&tag.tag_name)
                .execute(&mut *tx)
                .await
                .map_err(|e| StorageError::Other(e.into()))?;
            }

            // Set the reverse side of the pairing in the same transaction
            if let Some(qr_ref) = &link.qr_code_ref {
                let updated = sqlx::query(
                    "UPDATE qr_codes SET attached_link_code = ? WHERE code = ? AND attached_link_code IS NULL",
                )
                .bind(&code)
                .bind(qr_ref)
                .execute(&mut *tx)
                .await
                .map_err(map_unique)?;

                if updated.rows_affected() == 0 {
                    return Err(StorageError::Conflict);
                }
            }

            tx.commit()
                .await
                .map_err(|e| StorageError::Other(e.into()))?;

            let created = self.get_link(&code).await?.ok_or_else(|| {
                StorageError::Other(anyhow::anyhow!("created link {code} not readable"))
            })?;
            return Ok(created);
        }
    }

    async fn create_qr_code(&self, qr: &NewQrCode) -> StorageResult<QrCode> {
        let created_at = now_millis();
        let mut attempts_left = if qr.custom_code.is_some() {
            1
        } else {
            GENERATE_ATTEMPTS
        };

        loop {
            let code = qr.custom_code.clone().unwrap_or_else(generate_code);

            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(|e| StorageError::Other(e.into()))?;

            let inserted = sqlx::query(
                r#"
                INSERT INTO qr_codes (owner_id, code, destination, title, attached_link_code, styling, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(code) DO NOTHING
                "#,
            )
            .bind(&qr.owner_id)
            .bind(&code)
            .bind(&qr.destination)
            .bind(&qr.title)
            .bind(&qr.attached_link_code)
            .bind(&qr.styling)
            .bind(created_at)
            .execute(&mut *tx)
            .await
            .map_err(map_unique)?;

            if inserted.rows_affected() == 0 {
                attempts_left -= 1;
                if attempts_left == 0 {
                    return Err(StorageError::Conflict);
                }
                continue;
            }

            for tag in &qr.tags {
                sqlx::query(
                    "INSERT INTO qr_tags (qr_code, tag_id, tag_name) VALUES (?, ?, ?) ON CONFLICT DO NOTHING",
                )
                .bind(&code)
                .bind(tag.tag_id)
                .bind(&tag.tag_name)
                .execute(&mut *tx)
                .await
                .map_err(|e| StorageError::Other(e.into()))?;
            }

            if let Some(link_code) = &qr.attached_link_code {
                let updated = sqlx::query(
                    "UPDATE links SET qr_code_ref = ?, is_qr_hosting = 1 WHERE code = ? AND qr_code_ref IS NULL",
                )
                .bind(&code)
                .bind(link_code)
                .execute(&mut *tx)
                .await
                .map_err(map_unique)?;

                if updated.rows_affected() == 0 {
                    return Err(StorageError::Conflict);
                }
            }

            tx.commit()
                .await
                .map_err(|e| StorageError::Other(e.into()))?;

            let created = self.get_qr_code(&code).await?.ok_or_else(|| {
                StorageError::Other(anyhow::anyhow!("created QR code {code} not readable"))
            })?;
            return Ok(created);
        }
    }

    async fn get_link(&self, code: &str) -> Result<Option<Link>> {
        let link = sqlx::query_as::<_, Link>(&format!(
            "SELECT {LINK_COLUMNS} FROM links WHERE code = ?"
        ))
        .bind(code)
        .fetch_optional(self.pool.as_ref())
        .await?;

        match link {
            Some(link) => {
                let mut links = [link];
                self.load_link_tags(&mut links).await?;
                let [link] = links;
                Ok(Some(link))
            }
            None => Ok(None),
        }
    }

    async fn get_qr_code(&self, code: &str) -> Result<Option<QrCode>> {
        let qr = sqlx::query_as::<_, QrCode>(&format!(
            "SELECT {QR_COLUMNS} FROM qr_codes WHERE code = ?"
        ))
        .bind(code)
        .fetch_optional(self.pool.as_ref())
        .await?;

        match qr {
            Some(qr) => {
                let mut qrs = [qr];
                self.load_qr_tags(&mut qrs).await?;
                let [qr] = qrs;
                Ok(Some(qr))
            }
            None => Ok(None),
        }
    }

    async fn delete_link(&self, code: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        // Clear the reverse reference before the row goes away
        sqlx::query("UPDATE qr_codes SET attached_link_code = NULL WHERE attached_link_code = ?")
            .bind(code)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM link_tags WHERE link_code = ?")
            .bind(code)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM click_events WHERE entity_kind = 'link' AND entity_code = ?")
            .bind(code)
            .execute(&mut *tx)
            .await?;

        let deleted = sqlx::query("DELETE FROM links WHERE code = ?")
            .bind(code)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(deleted.rows_affected() > 0)
    }

    async fn delete_qr_code(&self, code: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE links SET qr_code_ref = NULL, is_qr_hosting = 0 WHERE qr_code_ref = ?")
            .bind(code)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM qr_tags WHERE qr_code = ?")
            .bind(code)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM click_events WHERE entity_kind = 'qr' AND entity_code = ?")
            .bind(code)
            .execute(&mut *tx)
            .await?;

        let deleted = sqlx::query("DELETE FROM qr_codes WHERE code = ?")
            .bind(code)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(deleted.rows_affected() > 0)
    }

    async fn create_tag(&self, owner_id: &str, name: &str) -> StorageResult<Tag> {
        let inserted = sqlx::query(
            "INSERT INTO tags (owner_id, name) VALUES (?, ?) ON CONFLICT(owner_id, name) DO NOTHING",
        )
        .bind(owner_id)
        .bind(name)
        .execute(self.pool.as_ref())
        .await
        .map_err(|e| StorageError::Other(e.into()))?;

        if inserted.rows_affected() == 0 {
            return Err(StorageError::Conflict);
        }

        let tag = sqlx::query_as::<_, Tag>(
            "SELECT id, owner_id, name FROM tags WHERE owner_id = ? AND name = ?",
        )
        .bind(owner_id)
        .bind(name)
        .fetch_one(self.pool.as_ref())
        .await
        .map_err(|e| StorageError::Other(e.into()))?;

        Ok(tag)
    }

    async fn record_click(&self, target: &ClickTarget, event: &NewClickEvent) -> Result<()> {
        let (kind, update_sql) = match target {
            ClickTarget::Link(_) => ("link", "UPDATE links SET clicks = clicks + 1 WHERE code = ?"),
            ClickTarget::QrCode(_) => ("qr", "UPDATE qr_codes SET scans = scans + 1 WHERE code = ?"),
        };

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO click_events
                (entity_kind, entity_code, address, browser, os, device, referrer,
                 language, timezone, country, region, city, path, query_params, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(kind)
        .bind(target.code())
        .bind(&event.address)
        .bind(&event.browser)
        .bind(&event.os)
        .bind(&event.device)
        .bind(&event.referrer)
        .bind(&event.language)
        .bind(&event.timezone)
        .bind(&event.country)
        .bind(&event.region)
        .bind(&event.city)
        .bind(&event.path)
        .bind(sqlx::types::Json(&event.query_params))
        .bind(event.created_at)
        .execute(&mut *tx)
        .await?;

        let updated = sqlx::query(update_sql)
            .bind(target.code())
            .execute(&mut *tx)
            .await?;

        if updated.rows_affected() == 0 {
            anyhow::bail!("cannot record click for missing {kind} {}", target.code());
        }

        tx.commit().await?;

        Ok(())
    }

    async fn click_events(&self, target: &ClickTarget, limit: i64) -> Result<Vec<ClickEvent>> {
        let kind = match target {
            ClickTarget::Link(_) => "link",
            ClickTarget::QrCode(_) => "qr",
        };

        let events = sqlx::query_as::<_, ClickEvent>(&format!(
            r#"
            SELECT {EVENT_COLUMNS} FROM click_events
            WHERE entity_kind = ? AND entity_code = ?
            ORDER BY created_at DESC, id DESC
            LIMIT ?
            "#
        ))
        .bind(kind)
        .bind(target.code())
        .bind(limit)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(events)
    }

    async fn list_links(
        &self,
        filter: &LinkFilter,
        sort: Sort,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Link>> {
        let mut qb =
            QueryBuilder::<Sqlite>::new(format!("SELECT {LINK_COLUMNS} FROM links"));
        push_link_filter(&mut qb, filter);
        qb.push(order_clause(sort, "clicks"));
        qb.push(" LIMIT ").push_bind(limit);
        qb.push(" OFFSET ").push_bind(offset);

        let mut links: Vec<Link> = qb.build_query_as().fetch_all(self.pool.as_ref()).await?;
        self.load_link_tags(&mut links).await?;

        Ok(links)
    }

    async fn count_links(&self, filter: &LinkFilter) -> Result<i64> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM links");
        push_link_filter(&mut qb, filter);

        let (count,): (i64,) = qb.build_query_as().fetch_one(self.pool.as_ref()).await?;

        Ok(count)
    }

    async fn list_qr_codes(
        &self,
        filter: &QrCodeFilter,
        sort: Sort,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<QrCode>> {
        let mut qb =
            QueryBuilder::<Sqlite>::new(format!("SELECT {QR_COLUMNS} FROM qr_codes"));
        push_qr_filter(&mut qb, filter);
        qb.push(order_clause(sort, "scans"));
        qb.push(" LIMIT ").push_bind(limit);
        qb.push(" OFFSET ").push_bind(offset);

        let mut qrs: Vec<QrCode> = qb.build_query_as().fetch_all(self.pool.as_ref()).await?;
        self.load_qr_tags(&mut qrs).await?;

        Ok(qrs)
    }

    async fn count_qr_codes(&self, filter: &QrCodeFilter) -> Result<i64> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM qr_codes");
        push_qr_filter(&mut qb, filter);

        let (count,): (i64,) = qb.build_query_as().fetch_one(self.pool.as_ref()).await?;

        Ok(count)
    }

    async fn rate_limit_attempt(
        &self,
        identifier: &str,
        policy: &RateLimitPolicy,
        now: i64,
    ) -> Result<RateLimitRecord> {
        // The whole Unseen -> Active -> Blocked transition is one UPSERT so
        // two concurrent attempts can never both consume the last slot. All
        // CASE arms read the pre-update row, in this order: an active block
        // wins, then window expiry resets, then the attempt counts.
        let record = sqlx::query_as::<_, RateLimitRecord>(
            r#"
            INSERT INTO rate_limits (identifier, attempts, last_attempt_at, blocked_until)
            VALUES (?1, 1, ?2, NULL)
            ON CONFLICT(identifier) DO UPDATE SET
                attempts = CASE
                    WHEN rate_limits.blocked_until IS NOT NULL AND rate_limits.blocked_until > ?2
                        THEN rate_limits.attempts
                    WHEN ?2 - rate_limits.last_attempt_at > ?3
                        THEN 1
                    ELSE rate_limits.attempts + 1
                END,
                blocked_until = CASE
                    WHEN rate_limits.blocked_until IS NOT NULL AND rate_limits.blocked_until > ?2
                        THEN rate_limits.blocked_until
                    WHEN ?2 - rate_limits.last_attempt_at > ?3
                        THEN NULL
                    WHEN rate_limits.attempts + 1 > ?4
                        THEN ?2 + ?5
                    ELSE NULL
                END,
                last_attempt_at = CASE
                    WHEN rate_limits.blocked_until IS NOT NULL AND rate_limits.blocked_until > ?2
                        THEN rate_limits.last_attempt_at
                    ELSE ?2
                END
            RETURNING identifier, attempts, last_attempt_at, blocked_until
            "#,
        )
        .bind(identifier)
        .bind(now)
        .bind(policy.window_ms)
        .bind(policy.max_attempts as i64)
        .bind(policy.block_duration_ms)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(record)
    }

    async fn reset_rate_limit(&self, identifier: &str) -> Result<()> {
        sqlx::query("DELETE FROM rate_limits WHERE identifier = ?")
            .bind(identifier)
            .execute(self.pool.as_ref())
            .await?;

        Ok(())
    }
}
