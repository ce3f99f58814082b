use super::{sql_id, RankStore};
use crate::atoms::error::EngineResult;
use crate::atoms::types::{GuildId, MemberId};
use rusqlite::{params, OptionalExtension};

impl RankStore {
    // ── Invite ownership ───────────────────────────────────────────────

    /// Register `owner_id` as the owner of `code` in `guild_id`. Re-registration overwrites.
    pub fn save_invite_owner(
        &self,
        code: &str,
        owner_id: MemberId,
        guild_id: GuildId,
        created_at: i64,
    ) -> EngineResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO invite_owners (code, owner_id, guild_id, created_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(code) DO UPDATE SET
                owner_id = excluded.owner_id,
                guild_id = excluded.guild_id,
                created_at = excluded.created_at",
            params![code, sql_id(owner_id), sql_id(guild_id), created_at],
        )?;
        Ok(())
    }

    pub fn invite_owner(&self, code: &str) -> EngineResult<Option<MemberId>> {
        let conn = self.conn.lock();
        let owner = conn
            .query_row(
                "SELECT owner_id FROM invite_owners WHERE code = ?1",
                params![code],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        Ok(owner.map(|id| id as u64))
    }

    /// The most recently registered code owned by `owner_id` in `guild_id`.
    pub fn invite_code_for(&self, owner_id: MemberId, guild_id: GuildId) -> EngineResult<Option<String>> {
        let conn = self.conn.lock();
        let code = conn
            .query_row(
                "SELECT code FROM invite_owners WHERE owner_id = ?1 AND guild_id = ?2
                 ORDER BY created_at DESC, rowid DESC LIMIT 1",
                params![sql_id(owner_id), sql_id(guild_id)],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_lookup_both_ways() {
        let store = RankStore::open_in_memory().unwrap();
        assert!(store.invite_owner("abc").unwrap().is_none());
        assert!(store.invite_code_for(5, 1).unwrap().is_none());

        store.save_invite_owner("abc", 5, 1, 10).unwrap();
        assert_eq!(store.invite_owner("abc").unwrap(), Some(5));
        assert_eq!(store.invite_code_for(5, 1).unwrap().as_deref(), Some("abc"));
    }

    #[test]
    fn reregistration_overwrites_owner() {
        let store = RankStore::open_in_memory().unwrap();
        store.save_invite_owner("abc", 5, 1, 10).unwrap();
        store.save_invite_owner("abc", 6, 1, 11).unwrap();
        assert_eq!(store.invite_owner("abc").unwrap(), Some(6));
        assert!(store.invite_code_for(5, 1).unwrap().is_none());
    }

    #[test]
    fn newest_code_wins() {
        let store = RankStore::open_in_memory().unwrap();
        store.save_invite_owner("old", 5, 1, 10).unwrap();
        store.save_invite_owner("new", 5, 1, 20).unwrap();
        assert_eq!(store.invite_code_for(5, 1).unwrap().as_deref(), Some("new"));
    }

    #[test]
    fn codes_are_looked_up_per_guild() {
        let store = RankStore::open_in_memory().unwrap();
        store.save_invite_owner("first", 5, 1, 10).unwrap();
        store.save_invite_owner("second", 5, 2, 20).unwrap();
        assert_eq!(store.invite_code_for(5, 1).unwrap().as_deref(), Some("first"));
        assert_eq!(store.invite_code_for(5, 2).unwrap().as_deref(), Some("second"));
        assert!(store.invite_code_for(5, 3).unwrap().is_none());
        // Ownership lookup by code ignores the guild.
        assert_eq!(store.invite_owner("second").unwrap(), Some(5));
    }
}
