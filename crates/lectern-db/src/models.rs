//! Database row types — these map directly to SQLite rows.
//! Conversion into the shared models parses ids and timestamps and fails
//! loudly on corrupt rows.

use anyhow::{Context, Result};
use uuid::Uuid;

use lectern_types::models::{Channel, Group, Message, ReadPosition};

use crate::timestamp;

pub struct GroupRow {
    pub id: String,
    pub name: String,
    pub created_at: String,
}

pub struct ChannelRow {
    pub id: String,
    pub group_id: String,
    pub name: String,
    pub created_at: String,
}

pub struct MessageRow {
    pub id: String,
    pub channel_id: String,
    pub author_id: String,
    pub body: String,
    pub created_at: String,
    pub deleted_at: Option<String>,
}

pub struct ReadPositionRow {
    pub user_id: String,
    pub channel_id: String,
    pub last_read_at: String,
    pub created_at: String,
    pub updated_at: String,
}

fn parse_id(raw: &str, what: &str) -> Result<Uuid> {
    raw.parse().with_context(|| format!("corrupt {} '{}'", what, raw))
}

impl TryFrom<GroupRow> for Group {
    type Error = anyhow::Error;

    fn try_from(row: GroupRow) -> Result<Self> {
        Ok(Group {
            id: parse_id(&row.id, "group id")?,
            name: row.name,
            created_at: timestamp::decode(&row.created_at)?,
        })
    }
}

impl TryFrom<ChannelRow> for Channel {
    type Error = anyhow::Error;

    fn try_from(row: ChannelRow) -> Result<Self> {
        Ok(Channel {
            id: parse_id(&row.id, "channel id")?,
            group_id: parse_id(&row.group_id, "group id")?,
            name: row.name,
            created_at: timestamp::decode(&row.created_at)?,
        })
    }
}

impl TryFrom<MessageRow> for Message {
    type Error = anyhow::Error;

    fn try_from(row: MessageRow) -> Result<Self> {
        Ok(Message {
            id: parse_id(&row.id, "message id")?,
            channel_id: parse_id(&row.channel_id, "channel id")?,
            author_id: parse_id(&row.author_id, "author id")?,
            body: row.body,
            created_at: timestamp::decode(&row.created_at)?,
            deleted_at: row.deleted_at.as_deref().map(timestamp::decode).transpose()?,
        })
    }
}

impl TryFrom<ReadPositionRow> for ReadPosition {
    type Error = anyhow::Error;

    fn try_from(row: ReadPositionRow) -> Result<Self> {
        Ok(ReadPosition {
            user_id: parse_id(&row.user_id, "user id")?,
            channel_id: parse_id(&row.channel_id, "channel id")?,
            last_read_at: timestamp::decode(&row.last_read_at)?,
            created_at: timestamp::decode(&row.created_at)?,
            updated_at: timestamp::decode(&row.updated_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_group_row() {
        let row = GroupRow {
            id: "00000000-0000-0000-0000-00000000000a".into(),
            name: "book club".into(),
            created_at: "2024-06-01T12:00:00.000000Z".into(),
        };
        let group = Group::try_from(row).unwrap();
        assert_eq!(group.name, "book club");
        assert_eq!(group.created_at.to_rfc3339(), "2024-06-01T12:00:00+00:00");
    }

    #[test]
    fn corrupt_ids_fail_loudly() {
        let row = ReadPositionRow {
            user_id: "not-a-uuid".into(),
            channel_id: "00000000-0000-0000-0000-0000000000c1".into(),
            last_read_at: "2024-06-01T12:00:00.000000Z".into(),
            created_at: "2024-06-01T12:00:00.000000Z".into(),
            updated_at: "2024-06-01T12:00:00.000000Z".into(),
        };
        let err = ReadPosition::try_from(row).unwrap_err();
        assert!(err.to_string().contains("not-a-uuid"));
    }

    #[test]
    fn deleted_at_is_optional() {
        let row = MessageRow {
            id: "00000000-0000-0000-0000-0000000000e1".into(),
            channel_id: "00000000-0000-0000-0000-0000000000c1".into(),
            author_id: "00000000-0000-0000-0000-000000000002".into(),
            body: "hi".into(),
            created_at: "2024-06-01T12:00:00.000000Z".into(),
            deleted_at: None,
        };
        assert!(Message::try_from(row).unwrap().deleted_at.is_none());
    }
}
