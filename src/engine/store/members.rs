use super::{sql_id, RankStore};
use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::types::{MemberId, MemberStats};
use rusqlite::{params, OptionalExtension, Row};

const SELECT_MEMBER: &str =
    "SELECT member_id, experience, level, referral_count, message_count FROM members WHERE member_id = ?1";

fn row_to_stats(row: &Row) -> rusqlite::Result<MemberStats> {
    Ok(MemberStats {
        member_id: row.get::<_, i64>(0)? as u64,
        experience: row.get::<_, i64>(1)?.max(0) as u64,
        level: row.get::<_, i64>(2)?.max(0) as u32,
        referral_count: row.get::<_, i64>(3)?.max(0) as u64,
        message_count: row.get::<_, i64>(4)?.max(0) as u64,
    })
}

impl RankStore {
    // ── Member stats ───────────────────────────────────────────────────

    pub fn get_member(&self, member_id: MemberId) -> EngineResult<Option<MemberStats>> {
        let conn = self.conn.lock();
        let stats = conn
            .query_row(SELECT_MEMBER, params![sql_id(member_id)], row_to_stats)
            .optional()?;
        Ok(stats)
    }

    /// Members are created lazily on first observation with zeroed counters.
    pub fn get_or_create_member(&self, member_id: MemberId) -> EngineResult<MemberStats> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR IGNORE INTO members (member_id) VALUES (?1)",
            params![sql_id(member_id)],
        )?;
        let stats = conn.query_row(SELECT_MEMBER, params![sql_id(member_id)], row_to_stats)?;
        Ok(stats)
    }

    /// Atomic read-modify-write of one member row.
    ///
    /// The row is created if missing, `f` computes the replacement from the
    /// current stats, and both happen inside one transaction under the
    /// connection lock, so concurrent credits to the same member never lose
    /// an update. If `f` fails nothing is written.
    /// Returns `(before, after)`.
    pub fn modify_member<F>(&self, member_id: MemberId, f: F) -> EngineResult<(MemberStats, MemberStats)>
    where
        F: FnOnce(&MemberStats) -> EngineResult<MemberStats>,
    {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT OR IGNORE INTO members (member_id) VALUES (?1)",
            params![sql_id(member_id)],
        )?;
        let before = tx.query_row(SELECT_MEMBER, params![sql_id(member_id)], row_to_stats)?;
        let after = f(&before)?;
        let experience =
            i64::try_from(after.experience).map_err(|_| EngineError::ExperienceOutOfRange(after.experience))?;
        tx.execute(
            "UPDATE members
             SET experience = ?2, level = ?3, referral_count = ?4, message_count = ?5
             WHERE member_id = ?1",
            params![
                sql_id(member_id),
                experience,
                after.level as i64,
                after.referral_count as i64,
                after.message_count as i64,
            ],
        )?;
        tx.commit()?;
        Ok((before, after))
    }

    /// Top members by experience; ties broken by member id for a stable order.
    pub fn leaderboard(&self, limit: usize) -> EngineResult<Vec<MemberStats>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT member_id, experience, level, referral_count, message_count
             FROM members ORDER BY experience DESC, member_id ASC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], row_to_stats)?;
        let mut members = Vec::new();
        for row in rows {
            members.push(row?);
        }
        Ok(members)
    }
}
