use super::{sql_id, RankStore};
use crate::atoms::error::EngineResult;
use crate::atoms::types::{MemberId, ReferralEdge, ReferralInsert};
use rusqlite::{params, OptionalExtension, Row};

fn row_to_edge(row: &Row) -> rusqlite::Result<ReferralEdge> {
    Ok(ReferralEdge {
        referrer_id: row.get::<_, i64>(0)? as u64,
        referred_id: row.get::<_, i64>(1)? as u64,
        created_at: row.get(2)?,
    })
}

impl RankStore {
    // ── Referral edges ─────────────────────────────────────────────────

    /// Record that `referred_id` was brought in by `referrer_id`.
    ///
    /// The UNIQUE constraint on `referred_id` decides: a second edge for the
    /// same referred member is never written and reports `AlreadyExists`.
    pub fn insert_referral(
        &self,
        referrer_id: MemberId,
        referred_id: MemberId,
        created_at: i64,
    ) -> EngineResult<ReferralInsert> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "INSERT INTO referrals (referrer_id, referred_id, created_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(referred_id) DO NOTHING",
            params![sql_id(referrer_id), sql_id(referred_id), created_at],
        )?;
        Ok(if changed == 0 { ReferralInsert::AlreadyExists } else { ReferralInsert::Inserted })
    }

    /// The edge that credited `referred_id`, if any.
    pub fn referral_for(&self, referred_id: MemberId) -> EngineResult<Option<ReferralEdge>> {
        let conn = self.conn.lock();
        let edge = conn
            .query_row(
                "SELECT referrer_id, referred_id, created_at FROM referrals WHERE referred_id = ?1",
                params![sql_id(referred_id)],
                row_to_edge,
            )
            .optional()?;
        Ok(edge)
    }

    /// Most recent referrals made by `referrer_id`.
    pub fn referrals_by(&self, referrer_id: MemberId, limit: usize) -> EngineResult<Vec<ReferralEdge>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT referrer_id, referred_id, created_at FROM referrals
             WHERE referrer_id = ?1 ORDER BY created_at DESC, id DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![sql_id(referrer_id), limit as i64], row_to_edge)?;
        let mut edges = Vec::new();
        for row in rows {
            edges.push(row?);
        }
        Ok(edges)
    }

    pub fn count_referrals_by(&self, referrer_id: MemberId) -> EngineResult<u64> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM referrals WHERE referrer_id = ?1",
            params![sql_id(referrer_id)],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}
