// Database schema for the rank store.
// Called once by RankStore::open() after WAL is enabled.
// Adding a new table or column: append an idempotent CREATE TABLE IF NOT EXISTS
// or ALTER TABLE … ADD COLUMN at the end of run_migrations(). Never modify
// existing SQL to keep upgrade paths clean.

use crate::atoms::error::EngineResult;
use rusqlite::Connection;

pub(crate) fn run_migrations(conn: &Connection) -> EngineResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS members (
            member_id INTEGER PRIMARY KEY,
            experience INTEGER NOT NULL DEFAULT 0,
            level INTEGER NOT NULL DEFAULT 0,
            referral_count INTEGER NOT NULL DEFAULT 0,
            message_count INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_members_experience
            ON members(experience DESC);

        -- referred_id UNIQUE is what makes referral credit at-most-once.
        CREATE TABLE IF NOT EXISTS referrals (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            referrer_id INTEGER NOT NULL,
            referred_id INTEGER NOT NULL UNIQUE,
            created_at INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_referrals_referrer
            ON referrals(referrer_id, created_at DESC);

        CREATE TABLE IF NOT EXISTS invite_owners (
            code TEXT PRIMARY KEY,
            owner_id INTEGER NOT NULL,
            created_at INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_invite_owners_owner
            ON invite_owners(owner_id, created_at DESC);
        ",
    )?;

    // Personal links are per guild. Rows from before the column existed get
    // guild 0, which no real guild matches, so those members get a fresh link.
    let _ = conn.execute(
        "ALTER TABLE invite_owners ADD COLUMN guild_id INTEGER NOT NULL DEFAULT 0",
        [],
    );
    conn.execute_batch(
        "CREATE INDEX IF NOT EXISTS idx_invite_owners_owner_guild
            ON invite_owners(owner_id, guild_id, created_at DESC);",
    )?;
    Ok(())
}
