// Jamrank Engine — referral attribution and leveling runtime.
// Everything between the Discord adapter and the SQLite store lives here;
// the pure data types and the `Platform` seam live in `atoms`.

pub mod config;
pub mod discord;
pub mod handlers;
pub mod http;
pub mod invite_cache;
pub mod leveling;
pub mod referrals;
pub mod roles;
pub mod state;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;
