use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row};
use tracing::debug;

use crate::models::{ChannelRow, GroupRow, MessageRow, ReadPositionRow};
use crate::timestamp;
use crate::Database;

impl Database {
    // -- Groups & channels --

    pub fn create_group(&self, id: &str, name: &str, created_at: DateTime<Utc>) -> Result<()> {
        let created_at = timestamp::encode(created_at)?;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO groups (id, name, created_at) VALUES (?1, ?2, ?3)",
                (id, name, created_at),
            )?;
            Ok(())
        })
    }

    pub fn get_group(&self, id: &str) -> Result<Option<GroupRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, name, created_at FROM groups WHERE id = ?1",
                    [id],
                    |row| {
                        Ok(GroupRow {
                            id: row.get(0)?,
                            name: row.get(1)?,
                            created_at: row.get(2)?,
                        })
                    },
                )
                .optional()?;
            Ok(row)
        })
    }

    pub fn create_channel(
        &self,
        id: &str,
        group_id: &str,
        name: &str,
        created_at: DateTime<Utc>,
    ) -> Result<()> {
        let created_at = timestamp::encode(created_at)?;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO channels (id, group_id, name, created_at) VALUES (?1, ?2, ?3, ?4)",
                (id, group_id, name, created_at),
            )?;
            Ok(())
        })
    }

    pub fn get_channel(&self, id: &str) -> Result<Option<ChannelRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, group_id, name, created_at FROM channels WHERE id = ?1",
                    [id],
                    channel_from_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    pub fn find_channel_by_name(&self, group_id: &str, name: &str) -> Result<Option<ChannelRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, group_id, name, created_at FROM channels
                     WHERE group_id = ?1 AND name = ?2",
                    [group_id, name],
                    channel_from_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    // -- Membership --

    /// Adds a member. Re-adding an existing member is a no-op.
    pub fn add_member(&self, group_id: &str, user_id: &str, joined_at: DateTime<Utc>) -> Result<()> {
        let joined_at = timestamp::encode(joined_at)?;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO group_members (group_id, user_id, joined_at) VALUES (?1, ?2, ?3)",
                (group_id, user_id, joined_at),
            )?;
            Ok(())
        })
    }

    pub fn is_member(&self, group_id: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let found = conn
                .query_row(
                    "SELECT 1 FROM group_members WHERE group_id = ?1 AND user_id = ?2",
                    [group_id, user_id],
                    |_| Ok(()),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    /// Removes a member and drops their read positions for every channel of
    /// the group, so a later re-join starts from scratch.
    /// Returns false if the user was not a member.
    pub fn remove_member(&self, group_id: &str, user_id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let cleared = tx.execute(
                "DELETE FROM read_positions
                 WHERE user_id = ?1
                   AND channel_id IN (SELECT id FROM channels WHERE group_id = ?2)",
                [user_id, group_id],
            )?;
            let removed = tx.execute(
                "DELETE FROM group_members WHERE group_id = ?1 AND user_id = ?2",
                [group_id, user_id],
            )?;

            tx.commit()?;
            debug!(
                "Removed member {} from group {} ({} read positions cleared)",
                user_id, group_id, cleared
            );
            Ok(removed > 0)
        })
    }

    // -- Messages --

    pub fn insert_message(
        &self,
        id: &str,
        channel_id: &str,
        author_id: &str,
        body: &str,
        created_at: DateTime<Utc>,
    ) -> Result<()> {
        let created_at = timestamp::encode(created_at)?;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (id, channel_id, author_id, body, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                (id, channel_id, author_id, body, created_at),
            )?;
            Ok(())
        })
    }

    pub fn get_message(&self, id: &str) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, channel_id, author_id, body, created_at, deleted_at
                     FROM messages WHERE id = ?1",
                    [id],
                    message_from_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    /// Newest-first page of live messages.
    ///
    /// `before` and `before_id` are the `created_at` and `id` of the oldest
    /// message on the previous page; the page continues strictly after that
    /// row in `(created_at, id)` order, so messages sharing a timestamp are
    /// not skipped. Without `before_id`, every message at `before` is skipped.
    pub fn get_messages(
        &self,
        channel_id: &str,
        limit: u32,
        before: Option<DateTime<Utc>>,
        before_id: Option<&str>,
    ) -> Result<Vec<MessageRow>> {
        let before = before.map(timestamp::encode).transpose()?;
        self.with_conn(|conn| query_messages(conn, channel_id, limit, before.as_deref(), before_id))
    }

    /// Soft-deletes a message. Returns false if it was missing or already deleted.
    pub fn soft_delete_message(&self, id: &str, deleted_at: DateTime<Utc>) -> Result<bool> {
        let deleted_at = timestamp::encode(deleted_at)?;
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE messages SET deleted_at = ?2 WHERE id = ?1 AND deleted_at IS NULL",
                (id, deleted_at),
            )?;
            Ok(changed > 0)
        })
    }

    // -- Read positions --

    /// Records that `user_id` has read `channel_id` up to `read_at`.
    ///
    /// One statement: inserts the row on first read, otherwise keeps the later
    /// of the stored and proposed `last_read_at`. `created_at` is only ever
    /// written by the insert. The write only happens while the user is a
    /// member of the channel's group, so it cannot outlive a concurrent
    /// `remove_member`. Returns the row as stored, or `None` for a non-member.
    pub fn upsert_read_position(
        &self,
        user_id: &str,
        channel_id: &str,
        read_at: DateTime<Utc>,
    ) -> Result<Option<ReadPositionRow>> {
        let read_at = timestamp::encode(read_at)?;
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "INSERT INTO read_positions (user_id, channel_id, last_read_at, created_at, updated_at)
                     SELECT ?1, ?2, ?3, ?3, ?3
                     WHERE EXISTS (
                         SELECT 1 FROM group_members gm
                         JOIN channels c ON c.group_id = gm.group_id
                         WHERE c.id = ?2 AND gm.user_id = ?1
                     )
                     ON CONFLICT (user_id, channel_id) DO UPDATE SET
                         last_read_at = MAX(read_positions.last_read_at, excluded.last_read_at),
                         updated_at = excluded.updated_at
                     RETURNING user_id, channel_id, last_read_at, created_at, updated_at",
                    [user_id, channel_id, read_at.as_str()],
                    read_position_from_row,
                )
                .optional()?;

            match &row {
                Some(row) => debug!(
                    "Read position for user {} in channel {} is now {}",
                    user_id, channel_id, row.last_read_at
                ),
                None => debug!(
                    "Skipped read position for user {} in channel {}: not a member",
                    user_id, channel_id
                ),
            }
            Ok(row)
        })
    }

    pub fn get_read_position(&self, user_id: &str, channel_id: &str) -> Result<Option<ReadPositionRow>> {
        self.with_conn(|conn| query_read_position(conn, user_id, channel_id))
    }

    /// Live messages in the channel newer than the user's read position, or
    /// every live message if the user has never read the channel.
    pub fn count_unread(&self, user_id: &str, channel_id: &str) -> Result<u64> {
        self.with_conn(|conn| query_unread(conn, user_id, channel_id))
    }

    /// [`Database::count_unread`] together with the position it was counted
    /// against, read under one lock so the two agree.
    pub fn unread_with_position(
        &self,
        user_id: &str,
        channel_id: &str,
    ) -> Result<(u64, Option<ReadPositionRow>)> {
        self.with_conn(|conn| {
            let count = query_unread(conn, user_id, channel_id)?;
            let position = query_read_position(conn, user_id, channel_id)?;
            Ok((count, position))
        })
    }

    /// Every channel of the group paired with the user's unread count, in
    /// channel creation order.
    pub fn count_unread_by_channel(
        &self,
        user_id: &str,
        group_id: &str,
    ) -> Result<Vec<(ChannelRow, u64)>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT c.id, c.group_id, c.name, c.created_at, COUNT(m.id)
                 FROM channels c
                 LEFT JOIN read_positions rp
                     ON rp.channel_id = c.id AND rp.user_id = ?2
                 LEFT JOIN messages m
                     ON m.channel_id = c.id
                    AND m.deleted_at IS NULL
                    AND (rp.last_read_at IS NULL OR m.created_at > rp.last_read_at)
                 WHERE c.group_id = ?1
                 GROUP BY c.id
                 ORDER BY c.created_at, c.name",
            )?;

            let rows = stmt
                .query_map([group_id, user_id], |row| {
                    let count: i64 = row.get(4)?;
                    Ok((channel_from_row(row)?, count as u64))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }
}

fn query_messages(
    conn: &Connection,
    channel_id: &str,
    limit: u32,
    before: Option<&str>,
    before_id: Option<&str>,
) -> Result<Vec<MessageRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, channel_id, author_id, body, created_at, deleted_at
         FROM messages
         WHERE channel_id = ?1
           AND deleted_at IS NULL
           AND (?3 IS NULL OR created_at < ?3 OR (created_at = ?3 AND id < ?4))
         ORDER BY created_at DESC, id DESC
         LIMIT ?2",
    )?;

    let rows = stmt
        .query_map(rusqlite::params![channel_id, limit, before, before_id], message_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

fn query_read_position(
    conn: &Connection,
    user_id: &str,
    channel_id: &str,
) -> Result<Option<ReadPositionRow>> {
    let row = conn
        .query_row(
            "SELECT user_id, channel_id, last_read_at, created_at, updated_at
             FROM read_positions WHERE user_id = ?1 AND channel_id = ?2",
            [user_id, channel_id],
            read_position_from_row,
        )
        .optional()?;
    Ok(row)
}

fn query_unread(conn: &Connection, user_id: &str, channel_id: &str) -> Result<u64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(m.id)
         FROM messages m
         LEFT JOIN read_positions rp
             ON rp.channel_id = m.channel_id AND rp.user_id = ?2
         WHERE m.channel_id = ?1
           AND m.deleted_at IS NULL
           AND (rp.last_read_at IS NULL OR m.created_at > rp.last_read_at)",
        [channel_id, user_id],
        |row| row.get(0),
    )?;
    Ok(count as u64)
}

fn channel_from_row(row: &Row<'_>) -> rusqlite::Result<ChannelRow> {
    Ok(ChannelRow {
        id: row.get(0)?,
        group_id: row.get(1)?,
        name: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        channel_id: row.get(1)?,
        author_id: row.get(2)?,
        body: row.get(3)?,
        created_at: row.get(4)?,
        deleted_at: row.get(5)?,
    })
}

fn read_position_from_row(row: &Row<'_>) -> rusqlite::Result<ReadPositionRow> {
    Ok(ReadPositionRow {
        user_id: row.get(0)?,
        channel_id: row.get(1)?,
        last_read_at: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
    })
}
