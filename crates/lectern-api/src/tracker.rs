//! Per-user read positions and the unread counts derived from them.
//!
//! A user's position in a channel is a single timestamp. Everything newer
//! than it (and not soft-deleted) is unread; with no position at all, every
//! live message is unread. Positions only move forward.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use lectern_db::Database;
use lectern_types::models::{Channel, ReadPosition};

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("user {user_id} is not a member of group {group_id}")]
    NotAMember { user_id: Uuid, group_id: Uuid },

    #[error(transparent)]
    StoreUnavailable(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, TrackerError>;

#[derive(Clone)]
pub struct ReadTracker {
    db: Arc<Database>,
}

impl ReadTracker {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Resolves a channel the user may access: it must exist and the user
    /// must belong to its group.
    pub fn member_channel(&self, user_id: Uuid, channel_id: Uuid) -> Result<Channel> {
        self.resolve(user_id, None, channel_id)
    }

    /// Like [`ReadTracker::member_channel`], but a channel that lives in a
    /// different group than `group_id` is reported as not found.
    pub fn member_channel_in(&self, user_id: Uuid, group_id: Uuid, channel_id: Uuid) -> Result<Channel> {
        self.resolve(user_id, Some(group_id), channel_id)
    }

    fn resolve(&self, user_id: Uuid, group_id: Option<Uuid>, channel_id: Uuid) -> Result<Channel> {
        let channel: Channel = self
            .db
            .get_channel(&channel_id.to_string())?
            .ok_or_else(|| TrackerError::NotFound(format!("channel {}", channel_id)))?
            .try_into()?;

        if group_id.is_some_and(|g| g != channel.group_id) {
            return Err(TrackerError::NotFound(format!("channel {}", channel_id)));
        }

        self.require_member(user_id, channel.group_id)?;
        Ok(channel)
    }

    fn require_member(&self, user_id: Uuid, group_id: Uuid) -> Result<()> {
        if self.db.is_member(&group_id.to_string(), &user_id.to_string())? {
            Ok(())
        } else {
            Err(TrackerError::NotAMember { user_id, group_id })
        }
    }

    /// Marks everything in the channel up to now as read.
    pub fn mark_read(&self, user_id: Uuid, channel_id: Uuid) -> Result<ReadPosition> {
        self.mark_read_at(user_id, channel_id, Utc::now())
    }

    /// Marks the channel read up to `at`. A stored position later than `at`
    /// is kept as is.
    pub fn mark_read_at(&self, user_id: Uuid, channel_id: Uuid, at: DateTime<Utc>) -> Result<ReadPosition> {
        let channel = self.member_channel(user_id, channel_id)?;
        self.record_read(user_id, &channel, at)
    }

    /// [`ReadTracker::mark_read`] for a channel addressed through its group.
    pub fn mark_read_in(&self, user_id: Uuid, group_id: Uuid, channel_id: Uuid) -> Result<ReadPosition> {
        let channel = self.member_channel_in(user_id, group_id, channel_id)?;
        self.record_read(user_id, &channel, Utc::now())
    }

    // The upsert re-checks membership itself: a leave that commits after
    // `resolve` must not be followed by a fresh position.
    fn record_read(&self, user_id: Uuid, channel: &Channel, at: DateTime<Utc>) -> Result<ReadPosition> {
        let row = self
            .db
            .upsert_read_position(&user_id.to_string(), &channel.id.to_string(), at)?
            .ok_or(TrackerError::NotAMember {
                user_id,
                group_id: channel.group_id,
            })?;
        Ok(ReadPosition::try_from(row)?)
    }

    pub fn read_position(&self, user_id: Uuid, channel_id: Uuid) -> Result<Option<ReadPosition>> {
        self.member_channel(user_id, channel_id)?;

        let row = self
            .db
            .get_read_position(&user_id.to_string(), &channel_id.to_string())?;
        Ok(row.map(ReadPosition::try_from).transpose()?)
    }

    pub fn unread_count(&self, user_id: Uuid, channel_id: Uuid) -> Result<u64> {
        self.member_channel(user_id, channel_id)?;

        Ok(self
            .db
            .count_unread(&user_id.to_string(), &channel_id.to_string())?)
    }

    /// Unread count for a channel addressed through its group, together with
    /// the position it was counted from. Both come from the same snapshot.
    pub fn unread_in(
        &self,
        user_id: Uuid,
        group_id: Uuid,
        channel_id: Uuid,
    ) -> Result<(u64, Option<ReadPosition>)> {
        self.member_channel_in(user_id, group_id, channel_id)?;

        let (count, row) = self
            .db
            .unread_with_position(&user_id.to_string(), &channel_id.to_string())?;
        Ok((count, row.map(ReadPosition::try_from).transpose()?))
    }

    /// Unread count for every channel of a group, in channel creation order.
    pub fn unread_counts(&self, user_id: Uuid, group_id: Uuid) -> Result<Vec<(Channel, u64)>> {
        if self.db.get_group(&group_id.to_string())?.is_none() {
            return Err(TrackerError::NotFound(format!("group {}", group_id)));
        }
        self.require_member(user_id, group_id)?;

        self.db
            .count_unread_by_channel(&user_id.to_string(), &group_id.to_string())?
            .into_iter()
            .map(|(row, count)| -> Result<(Channel, u64)> { Ok((Channel::try_from(row)?, count)) })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    struct Fixture {
        db: Arc<Database>,
        tracker: ReadTracker,
        group: Uuid,
        channel: Uuid,
        reader: Uuid,
        author: Uuid,
    }

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap() + Duration::seconds(secs)
    }

    fn fixture() -> Fixture {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let group = Uuid::new_v4();
        let channel = Uuid::new_v4();
        let reader = Uuid::new_v4();
        let author = Uuid::new_v4();

        db.create_group(&group.to_string(), "readers", t(0)).unwrap();
        db.create_channel(&channel.to_string(), &group.to_string(), "general", t(0)).unwrap();
        db.add_member(&group.to_string(), &reader.to_string(), t(0)).unwrap();
        db.add_member(&group.to_string(), &author.to_string(), t(0)).unwrap();

        Fixture {
            tracker: ReadTracker::new(db.clone()),
            db,
            group,
            channel,
            reader,
            author,
        }
    }

    impl Fixture {
        fn post(&self, at: DateTime<Utc>) -> Uuid {
            let id = Uuid::new_v4();
            self.db
                .insert_message(&id.to_string(), &self.channel.to_string(), &self.author.to_string(), "hi", at)
                .unwrap();
            id
        }

        fn unread(&self) -> u64 {
            self.tracker.unread_count(self.reader, self.channel).unwrap()
        }
    }

    #[test]
    fn unseen_channel_counts_all_live_messages() {
        let f = fixture();
        f.post(t(1));
        f.post(t(2));
        assert_eq!(f.unread(), 2);
        assert!(f.tracker.read_position(f.reader, f.channel).unwrap().is_none());
    }

    #[test]
    fn read_then_new_message() {
        let f = fixture();
        f.post(t(10));
        f.post(t(20));
        f.post(t(30));

        f.tracker.mark_read_at(f.reader, f.channel, t(25)).unwrap();
        assert_eq!(f.unread(), 1);

        f.post(t(40));
        assert_eq!(f.unread(), 2);
    }

    #[test]
    fn deleted_message_after_position_is_excluded() {
        let f = fixture();
        f.tracker.mark_read_at(f.reader, f.channel, t(5)).unwrap();
        f.post(t(10));
        let doomed = f.post(t(20));
        f.post(t(30));
        f.db.soft_delete_message(&doomed.to_string(), t(35)).unwrap();

        assert_eq!(f.unread(), 2);
    }

    #[test]
    fn mark_read_twice_keeps_latest() {
        let f = fixture();
        let first = f.tracker.mark_read(f.reader, f.channel).unwrap();
        let second = f.tracker.mark_read(f.reader, f.channel).unwrap();

        assert!(second.last_read_at >= first.last_read_at);
        assert_eq!(second.created_at, first.created_at);
        let stored = f.tracker.read_position(f.reader, f.channel).unwrap().unwrap();
        assert_eq!(stored, second);
    }

    #[test]
    fn earlier_timestamp_does_not_rewind() {
        let f = fixture();
        f.tracker.mark_read_at(f.reader, f.channel, t(60)).unwrap();
        let pos = f.tracker.mark_read_at(f.reader, f.channel, t(30)).unwrap();
        assert_eq!(pos.last_read_at, t(60));
    }

    #[test]
    fn concurrent_mark_reads_settle_on_latest() {
        let f = fixture();
        let handles: Vec<_> = [t(5), t(6)]
            .into_iter()
            .map(|at| {
                let tracker = f.tracker.clone();
                let (user, channel) = (f.reader, f.channel);
                std::thread::spawn(move || tracker.mark_read_at(user, channel, at).unwrap())
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let stored = f.tracker.read_position(f.reader, f.channel).unwrap().unwrap();
        assert_eq!(stored.last_read_at, t(6));
    }

    #[test]
    fn unknown_channel_is_not_found() {
        let f = fixture();
        let err = f.tracker.mark_read(f.reader, Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, TrackerError::NotFound(_)));

        let err = f.tracker.unread_count(f.reader, Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, TrackerError::NotFound(_)));
    }

    #[test]
    fn outsider_is_not_a_member() {
        let f = fixture();
        let outsider = Uuid::new_v4();

        let err = f.tracker.mark_read(outsider, f.channel).unwrap_err();
        assert!(matches!(err, TrackerError::NotAMember { user_id, .. } if user_id == outsider));

        let err = f.tracker.unread_counts(outsider, f.group).unwrap_err();
        assert!(matches!(err, TrackerError::NotAMember { .. }));

        assert!(f.db.get_read_position(&outsider.to_string(), &f.channel.to_string()).unwrap().is_none());
    }

    #[test]
    fn channel_in_other_group_is_not_found() {
        let f = fixture();
        let err = f
            .tracker
            .member_channel_in(f.reader, Uuid::new_v4(), f.channel)
            .unwrap_err();
        assert!(matches!(err, TrackerError::NotFound(_)));

        let channel = f.tracker.member_channel_in(f.reader, f.group, f.channel).unwrap();
        assert_eq!(channel.name, "general");
    }

    #[test]
    fn unread_counts_cover_every_channel() {
        let f = fixture();
        let quiet = Uuid::new_v4();
        f.db.create_channel(&quiet.to_string(), &f.group.to_string(), "quiet", t(1)).unwrap();
        f.post(t(10));

        let counts = f.tracker.unread_counts(f.reader, f.group).unwrap();
        assert_eq!(counts.len(), 2);
        assert_eq!((counts[0].0.id, counts[0].1), (f.channel, 1));
        assert_eq!((counts[1].0.id, counts[1].1), (quiet, 0));

        let err = f.tracker.unread_counts(f.reader, Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, TrackerError::NotFound(_)));
    }

    #[test]
    fn group_scoped_reads_match_plain_ones() {
        let f = fixture();
        f.post(t(10));
        f.post(t(20));

        let (count, position) = f.tracker.unread_in(f.reader, f.group, f.channel).unwrap();
        assert_eq!(count, 2);
        assert!(position.is_none());

        let stored = f.tracker.mark_read_in(f.reader, f.group, f.channel).unwrap();
        let (count, position) = f.tracker.unread_in(f.reader, f.group, f.channel).unwrap();
        assert_eq!(count, 0);
        assert_eq!(position, Some(stored));

        let err = f.tracker.mark_read_in(f.reader, Uuid::new_v4(), f.channel).unwrap_err();
        assert!(matches!(err, TrackerError::NotFound(_)));
        let err = f.tracker.unread_in(Uuid::new_v4(), f.group, f.channel).unwrap_err();
        assert!(matches!(err, TrackerError::NotAMember { .. }));
    }

    #[test]
    fn leave_racing_mark_read_leaves_no_position() {
        let f = fixture();
        f.post(t(10));
        let channel = f.tracker.member_channel(f.reader, f.channel).unwrap();

        // The leave commits after the membership check but before the write.
        f.db.remove_member(&f.group.to_string(), &f.reader.to_string()).unwrap();
        let err = f.tracker.record_read(f.reader, &channel, t(20)).unwrap_err();
        assert!(matches!(err, TrackerError::NotAMember { group_id, .. } if group_id == f.group));

        f.db.add_member(&f.group.to_string(), &f.reader.to_string(), t(30)).unwrap();
        assert_eq!(f.unread(), 1);
        assert!(f.tracker.read_position(f.reader, f.channel).unwrap().is_none());
    }

    #[test]
    fn rejoining_starts_unseen() {
        let f = fixture();
        f.post(t(10));
        f.tracker.mark_read_at(f.reader, f.channel, t(20)).unwrap();
        assert_eq!(f.unread(), 0);

        f.db.remove_member(&f.group.to_string(), &f.reader.to_string()).unwrap();
        f.db.add_member(&f.group.to_string(), &f.reader.to_string(), t(30)).unwrap();

        assert_eq!(f.unread(), 1);
    }
}
