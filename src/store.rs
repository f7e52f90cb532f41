//! `SQLite` persistence for bot state.
//!
//! Single source of truth for processed tweets, alt-text scoring history,
//! the follower/friend/allowed-to-DM mirrors, and the mention cursor.
//! There is deliberately no in-memory cache in front of it: every probe
//! hits the database so state survives restarts without divergence.

use std::collections::HashSet;
use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{info, warn};

use crate::error::{map_constraint, Result};
use crate::model::{Account, AltTextRecord, TopUser, TopUsersReport, UsageStats, MAX_IMAGES_PER_TWEET};

const SCHEMA_VERSION: i32 = 1;

/// Key of the mention cursor in `bot_settings`.
const LAST_MENTION_KEY: &str = "last_mention_id";

/// `SQLite` state store.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open or create the database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(db_path.as_ref())?;

        // Set pragmas for performance
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
            ",
        )?;

        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    /// Open an in-memory database (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be initialized.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
            ",
        )?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<()> {
        let current_version = self.schema_version();

        if current_version < SCHEMA_VERSION {
            info!(
                "Migrating database from version {} to {}",
                current_version, SCHEMA_VERSION
            );
            self.create_schema()?;
            self.conn.execute(
                "INSERT OR REPLACE INTO bot_settings (setting_key, setting_value) \
                 VALUES ('schema_version', ?)",
                params![SCHEMA_VERSION.to_string()],
            )?;
        }

        Ok(())
    }

    fn schema_version(&self) -> i32 {
        let result: std::result::Result<i32, _> = self.conn.query_row(
            "SELECT setting_value FROM bot_settings WHERE setting_key = 'schema_version'",
            [],
            |row| {
                let value: String = row.get(0)?;
                Ok(value.parse().unwrap_or(0))
            },
        );

        // Treat a missing settings table as version 0.
        result.unwrap_or_default()
    }

    fn create_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r"
            -- Generic key/value settings, also holds the mention cursor
            CREATE TABLE IF NOT EXISTS bot_settings (
                setting_key TEXT PRIMARY KEY,
                setting_value TEXT NOT NULL
            );

            -- Every tweet the bot has handled, media or not
            CREATE TABLE IF NOT EXISTS processed_tweets (
                tweet_id TEXT PRIMARY KEY
            );

            -- Scoring history for tweets that carried photos
            CREATE TABLE IF NOT EXISTS processed_tweets_alt_text_info (
                tweet_id TEXT PRIMARY KEY,
                screen_name TEXT NOT NULL,
                user_id INTEGER NOT NULL,
                n_images INTEGER NOT NULL,
                alt_score REAL NOT NULL,
                processed_at TEXT NOT NULL,
                friend INTEGER NOT NULL DEFAULT 0,
                follower INTEGER NOT NULL DEFAULT 0,
                user_alt_text_1 TEXT,
                user_alt_text_2 TEXT,
                user_alt_text_3 TEXT,
                user_alt_text_4 TEXT,
                bot_alt_text_1 TEXT,
                bot_alt_text_2 TEXT,
                bot_alt_text_3 TEXT,
                bot_alt_text_4 TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_alt_text_info_user
                ON processed_tweets_alt_text_info(user_id);

            -- Local mirrors of the remote social graph
            CREATE TABLE IF NOT EXISTS followers (
                user_id INTEGER PRIMARY KEY,
                screen_name TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS friends (
                user_id INTEGER PRIMARY KEY,
                screen_name TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS allowed_to_dm (
                user_id INTEGER PRIMARY KEY
            );
            ",
        )?;

        Ok(())
    }

    // =========================================================================
    // Processed tweets
    // =========================================================================

    /// Whether a tweet has already been handled.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn is_processed(&self, tweet_id: &str) -> Result<bool> {
        let exists: i64 = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM processed_tweets WHERE tweet_id = ?)",
            params![tweet_id],
            |row| row.get(0),
        )?;
        Ok(exists != 0)
    }

    /// Mark a tweet as handled.
    ///
    /// # Errors
    ///
    /// With `allow_duplicate` false, fails with `Conflict` if the tweet is
    /// already marked. With it true, re-marking succeeds silently; use this
    /// on paths where a tweet may legitimately be revisited by a different
    /// use case.
    pub fn mark_processed(&self, tweet_id: &str, allow_duplicate: bool) -> Result<()> {
        let sql = if allow_duplicate {
            "INSERT OR IGNORE INTO processed_tweets (tweet_id) VALUES (?)"
        } else {
            "INSERT INTO processed_tweets (tweet_id) VALUES (?)"
        };

        self.conn
            .execute(sql, params![tweet_id])
            .map_err(|e| map_constraint(e, "processed tweet", tweet_id))?;
        Ok(())
    }

    /// Record the alt-text scoring of a tweet that carried photos.
    ///
    /// Writes the `processed_tweets` row in the same transaction, so a
    /// recorded tweet is always also a processed tweet and report queries
    /// can never observe one without the other.
    ///
    /// # Errors
    ///
    /// Fails with `Conflict` on a duplicate tweet id: one record per tweet.
    pub fn record_alt_text_info(&mut self, record: &AltTextRecord) -> Result<()> {
        let tx = self.conn.transaction()?;

        tx.execute(
            "INSERT OR IGNORE INTO processed_tweets (tweet_id) VALUES (?)",
            params![record.tweet_id],
        )?;

        tx.execute(
            r"
            INSERT INTO processed_tweets_alt_text_info
            (tweet_id, screen_name, user_id, n_images, alt_score, processed_at,
             friend, follower,
             user_alt_text_1, user_alt_text_2, user_alt_text_3, user_alt_text_4,
             bot_alt_text_1, bot_alt_text_2, bot_alt_text_3, bot_alt_text_4)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
            params![
                record.tweet_id,
                record.screen_name,
                record.user_id,
                record.n_images,
                record.alt_score,
                record.processed_at.to_rfc3339(),
                i32::from(record.is_friend),
                i32::from(record.is_follower),
                slot(&record.user_alt_texts, 0),
                slot(&record.user_alt_texts, 1),
                slot(&record.user_alt_texts, 2),
                slot(&record.user_alt_texts, 3),
                slot(&record.bot_captions, 0),
                slot(&record.bot_captions, 1),
                slot(&record.bot_captions, 2),
                slot(&record.bot_captions, 3),
            ],
        )
        .map_err(|e| map_constraint(e, "alt-text record", &record.tweet_id))?;

        tx.commit()?;
        Ok(())
    }

    /// Back-fill bot-generated caption suggestions on an existing record.
    /// The only permitted mutation of an alt-text record.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn backfill_bot_captions(
        &self,
        tweet_id: &str,
        captions: &[Option<String>],
    ) -> Result<()> {
        self.conn.execute(
            "UPDATE processed_tweets_alt_text_info
             SET bot_alt_text_1 = ?, bot_alt_text_2 = ?, bot_alt_text_3 = ?, bot_alt_text_4 = ?
             WHERE tweet_id = ?",
            params![
                slot(captions, 0),
                slot(captions, 1),
                slot(captions, 2),
                slot(captions, 3),
                tweet_id
            ],
        )?;
        Ok(())
    }

    /// Stored alt score for a processed tweet, `None` when the tweet was
    /// processed without any photo attachments.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn alt_score_for_tweet(&self, tweet_id: &str) -> Result<Option<f64>> {
        let score = self
            .conn
            .query_row(
                "SELECT alt_score FROM processed_tweets_alt_text_info WHERE tweet_id = ?",
                params![tweet_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(score)
    }

    /// Full alt-text record for a tweet, if one exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn alt_text_record(&self, tweet_id: &str) -> Result<Option<AltTextRecord>> {
        let record = self
            .conn
            .query_row(
                r"
                SELECT tweet_id, screen_name, user_id, n_images, alt_score, processed_at,
                       friend, follower,
                       user_alt_text_1, user_alt_text_2, user_alt_text_3, user_alt_text_4,
                       bot_alt_text_1, bot_alt_text_2, bot_alt_text_3, bot_alt_text_4
                FROM processed_tweets_alt_text_info WHERE tweet_id = ?
                ",
                params![tweet_id],
                |row| {
                    let processed_at_str: String = row.get(5)?;
                    Ok(AltTextRecord {
                        tweet_id: row.get(0)?,
                        screen_name: row.get(1)?,
                        user_id: row.get(2)?,
                        n_images: row.get(3)?,
                        alt_score: row.get(4)?,
                        processed_at: parse_rfc3339_or_epoch(&processed_at_str),
                        is_friend: row.get::<_, i32>(6)? != 0,
                        is_follower: row.get::<_, i32>(7)? != 0,
                        user_alt_texts: collect_slots(row, 8)?,
                        bot_captions: collect_slots(row, 12)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    /// When an account's most recent alt-text record was written, `None`
    /// if it has none. Drives the mention-report freshness window.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn last_alt_record_date(&self, user_id: i64) -> Result<Option<DateTime<Utc>>> {
        let date: Option<String> = self
            .conn
            .query_row(
                "SELECT MAX(processed_at) FROM processed_tweets_alt_text_info WHERE user_id = ?",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?
            .flatten();
        Ok(date.as_deref().map(parse_rfc3339_or_epoch))
    }

    // =========================================================================
    // Graph mirrors
    // =========================================================================

    /// Full local follower snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn followers(&self) -> Result<HashSet<Account>> {
        self.account_set("SELECT screen_name, user_id FROM followers")
    }

    /// Full local friend snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn friends(&self) -> Result<HashSet<Account>> {
        self.account_set("SELECT screen_name, user_id FROM friends")
    }

    fn account_set(&self, sql: &str) -> Result<HashSet<Account>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map([], |row| {
            Ok(Account {
                screen_name: row.get(0)?,
                user_id: row.get(1)?,
            })
        })?;

        let mut result = HashSet::new();
        for row in rows {
            result.insert(row?);
        }
        Ok(result)
    }

    /// Full local allowed-to-DM snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn allowed_to_dm(&self) -> Result<HashSet<i64>> {
        let mut stmt = self.conn.prepare("SELECT user_id FROM allowed_to_dm")?;
        let rows = stmt.query_map([], |row| row.get(0))?;

        let mut result = HashSet::new();
        for row in rows {
            result.insert(row?);
        }
        Ok(result)
    }

    pub fn count_followers(&self) -> Result<i64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM followers", [], |row| row.get(0))?)
    }

    pub fn count_friends(&self) -> Result<i64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM friends", [], |row| row.get(0))?)
    }

    pub fn count_allowed_to_dm(&self) -> Result<i64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM allowed_to_dm", [], |row| row.get(0))?)
    }

    pub fn is_follower(&self, user_id: i64) -> Result<bool> {
        self.id_exists("SELECT EXISTS(SELECT 1 FROM followers WHERE user_id = ?)", user_id)
    }

    pub fn is_friend(&self, user_id: i64) -> Result<bool> {
        self.id_exists("SELECT EXISTS(SELECT 1 FROM friends WHERE user_id = ?)", user_id)
    }

    pub fn is_allowed_to_dm(&self, user_id: i64) -> Result<bool> {
        self.id_exists(
            "SELECT EXISTS(SELECT 1 FROM allowed_to_dm WHERE user_id = ?)",
            user_id,
        )
    }

    fn id_exists(&self, sql: &str, user_id: i64) -> Result<bool> {
        let exists: i64 = self.conn.query_row(sql, params![user_id], |row| row.get(0))?;
        Ok(exists != 0)
    }

    /// Apply a reconciliation delta to the follower mirror. Each row is
    /// applied independently: a failure on one account is logged and does
    /// not abort the rest of the batch.
    ///
    /// # Errors
    ///
    /// Returns an error only if a statement cannot be prepared at all.
    pub fn apply_follower_delta(
        &self,
        added: &HashSet<Account>,
        removed: &HashSet<Account>,
    ) -> Result<()> {
        self.apply_account_delta("followers", added, removed)
    }

    /// Apply a reconciliation delta to the friend mirror.
    ///
    /// # Errors
    ///
    /// Returns an error only if a statement cannot be prepared at all.
    pub fn apply_friend_delta(
        &self,
        added: &HashSet<Account>,
        removed: &HashSet<Account>,
    ) -> Result<()> {
        self.apply_account_delta("friends", added, removed)
    }

    fn apply_account_delta(
        &self,
        table: &str,
        added: &HashSet<Account>,
        removed: &HashSet<Account>,
    ) -> Result<()> {
        let delete_sql = format!("DELETE FROM {table} WHERE user_id = ?");
        let insert_sql = format!("INSERT INTO {table} (user_id, screen_name) VALUES (?, ?)");

        for account in removed {
            if let Err(e) = self.conn.execute(&delete_sql, params![account.user_id]) {
                warn!("Cannot remove @{} from {table}: {e}", account.screen_name);
            }
        }

        for account in added {
            if let Err(e) = self
                .conn
                .execute(&insert_sql, params![account.user_id, account.screen_name])
            {
                warn!("Cannot add @{} to {table}: {e}", account.screen_name);
            }
        }

        Ok(())
    }

    /// Apply a reconciliation delta to the allowed-to-DM mirror, with the
    /// same per-row tolerance as the account mirrors.
    ///
    /// # Errors
    ///
    /// Returns an error only if a statement cannot be prepared at all.
    pub fn apply_allowed_to_dm_delta(
        &self,
        added: &HashSet<i64>,
        removed: &HashSet<i64>,
    ) -> Result<()> {
        for user_id in removed {
            if let Err(e) = self
                .conn
                .execute("DELETE FROM allowed_to_dm WHERE user_id = ?", params![user_id])
            {
                warn!("Cannot remove {user_id} from allowed_to_dm: {e}");
            }
        }

        for user_id in added {
            if let Err(e) = self
                .conn
                .execute("INSERT INTO allowed_to_dm (user_id) VALUES (?)", params![user_id])
            {
                warn!("Cannot add {user_id} to allowed_to_dm: {e}");
            }
        }

        Ok(())
    }

    // =========================================================================
    // Aggregates
    // =========================================================================

    /// Alt-text usage for one account: percentage of images with alt text,
    /// weighted by each tweet's image count, and the images considered.
    /// Returns the `(-1, -1)` sentinel when the account has no history.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn usage_percentage(&self, user_id: i64) -> Result<UsageStats> {
        let (total, weighted): (Option<i64>, Option<f64>) = self.conn.query_row(
            "SELECT SUM(n_images), SUM(n_images * alt_score)
             FROM processed_tweets_alt_text_info WHERE user_id = ?",
            params![user_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        match (total, weighted) {
            (Some(n_images), Some(with_alt)) if n_images > 0 => Ok(UsageStats {
                percentage: with_alt / n_images as f64 * 100.0,
                n_images,
            }),
            _ => Ok(UsageStats::NO_DATA),
        }
    }

    /// Rank accounts by alt-text image count descending, then total image
    /// count descending. An empty ranking is a valid result, not an error.
    ///
    /// `want_friends` / `want_followers` restrict the ranking to accounts
    /// recorded with that relationship; with both unset no restriction
    /// applies.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn top_users(
        &self,
        want_friends: bool,
        want_followers: bool,
        since: DateTime<Utc>,
        top_n: usize,
    ) -> Result<TopUsersReport> {
        let relationship = match (want_friends, want_followers) {
            (true, true) => "AND (friend = 1 OR follower = 1)",
            (true, false) => "AND friend = 1",
            (false, true) => "AND follower = 1",
            (false, false) => "",
        };

        let ranking_sql = format!(
            r"
            SELECT (SELECT screen_name FROM processed_tweets_alt_text_info p2
                    WHERE p2.user_id = p.user_id ORDER BY processed_at DESC LIMIT 1),
                   user_id,
                   CAST(ROUND(SUM(n_images * alt_score)) AS INTEGER) AS images_with_alt,
                   SUM(n_images) AS total_images
            FROM processed_tweets_alt_text_info p
            WHERE processed_at >= ? {relationship}
            GROUP BY user_id
            ORDER BY images_with_alt DESC, total_images DESC
            LIMIT ?
            "
        );

        let since_str = since.to_rfc3339();
        let mut stmt = self.conn.prepare(&ranking_sql)?;
        let rows = stmt.query_map(params![since_str, top_n], |row| {
            Ok(TopUser {
                screen_name: row.get(0)?,
                user_id: row.get(1)?,
                images_with_alt: row.get(2)?,
                total_images: row.get(3)?,
            })
        })?;

        let mut ranking = Vec::new();
        for row in rows {
            ranking.push(row?);
        }

        let totals_sql = format!(
            "SELECT COUNT(DISTINCT user_id),
                    COUNT(DISTINCT CASE WHEN alt_score > 0 THEN user_id END)
             FROM processed_tweets_alt_text_info
             WHERE processed_at >= ? {relationship}"
        );
        let (total_accounts, accounts_with_alt_text) =
            self.conn
                .query_row(&totals_sql, params![since_str], |row| {
                    Ok((row.get(0)?, row.get(1)?))
                })?;

        Ok(TopUsersReport {
            ranking,
            total_accounts,
            accounts_with_alt_text,
        })
    }

    // =========================================================================
    // Settings
    // =========================================================================

    /// Last-processed-mention cursor, bootstrapped to `seed` on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn last_mention_cursor(&self, seed: i64) -> Result<i64> {
        self.conn.execute(
            "INSERT OR IGNORE INTO bot_settings (setting_key, setting_value) VALUES (?, ?)",
            params![LAST_MENTION_KEY, seed.to_string()],
        )?;

        let value: String = self.conn.query_row(
            "SELECT setting_value FROM bot_settings WHERE setting_key = ?",
            params![LAST_MENTION_KEY],
            |row| row.get(0),
        )?;
        Ok(value.parse().unwrap_or(seed))
    }

    /// Advance the mention cursor.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn set_last_mention_cursor(&self, id: i64) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO bot_settings (setting_key, setting_value) VALUES (?, ?)",
            params![LAST_MENTION_KEY, id.to_string()],
        )?;
        Ok(())
    }
}

/// Pad-or-truncate access into the 4 per-image column slots.
fn slot(values: &[Option<String>], index: usize) -> Option<&str> {
    if index >= MAX_IMAGES_PER_TWEET {
        return None;
    }
    values.get(index).and_then(|v| v.as_deref())
}

fn collect_slots(
    row: &rusqlite::Row<'_>,
    first: usize,
) -> std::result::Result<Vec<Option<String>>, rusqlite::Error> {
    (first..first + MAX_IMAGES_PER_TWEET)
        .map(|idx| row.get(idx))
        .collect()
}

fn parse_rfc3339_or_epoch(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value).map_or_else(
        |_| DateTime::<Utc>::from_timestamp(0, 0).unwrap_or_default(),
        |dt| dt.with_timezone(&Utc),
    )
}
