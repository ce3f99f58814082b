//! Jamrank CLI - offline administration of the rank database
//!
//! Reads the same config file and database as the bot. Safe to run while the
//! bot is up: every write goes through the store's transaction path.

use chrono::{TimeZone, Utc};
use clap::{Parser, Subcommand};
use jamrank::atoms::constants::DEFAULT_LEADERBOARD_LIMIT;
use jamrank::atoms::error::EngineResult;
use jamrank::atoms::types::MemberId;
use jamrank::engine::config::Args as BotArgs;
use jamrank::engine::leveling::Leveling;
use jamrank::engine::store::RankStore;
use serde_json::json;
use std::sync::Arc;

#[derive(Debug, Parser)]
#[command(name = "jamrank-cli", version, about = "Inspect and adjust Jamrank data")]
struct Cli {
    #[command(flatten)]
    bot: BotArgs,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Show a member's experience, level and progress
    Rank {
        /// Discord user id
        member: MemberId,
    },

    /// Top members by experience
    Leaderboard {
        /// Number of members to show
        #[arg(short, long, default_value_t = DEFAULT_LEADERBOARD_LIMIT)]
        limit: usize,
    },

    /// Members brought in by a referrer, newest first
    Referrals {
        /// Discord user id of the referrer
        member: MemberId,
        /// Number of referrals to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Set a member's experience outright (the only way to lower it)
    SetXp {
        /// Discord user id
        member: MemberId,
        /// New experience total
        experience: u64,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> EngineResult<()> {
    let config = cli.bot.load()?;
    let store = Arc::new(RankStore::open(&config.database_path())?);
    let leveling = Leveling::new(store.clone(), Arc::new(config.level_table()?));

    match cli.command {
        Commands::Rank { member } => {
            let stats = store.get_member(member)?.unwrap_or_default();
            let progress = leveling.table().progress(stats.experience);
            let role = leveling.table().role_for(progress.level);
            if cli.json {
                println!(
                    "{}",
                    json!({
                        "member_id": member,
                        "experience": stats.experience,
                        "level": progress.level,
                        "role": role,
                        "next_threshold": progress.next_threshold,
                        "referrals": stats.referral_count,
                        "messages": stats.message_count,
                    })
                );
            } else {
                println!("member {}", member);
                println!("  level       {} ({})", progress.level, role.unwrap_or("no role"));
                match progress.next_threshold {
                    Some(next) => println!("  experience  {} / {}", stats.experience, next),
                    None => println!("  experience  {} (max level)", stats.experience),
                }
                println!("  referrals   {}", stats.referral_count);
                println!("  messages    {}", stats.message_count);
            }
        }

        Commands::Leaderboard { limit } => {
            let rows = store.leaderboard(limit)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else if rows.is_empty() {
                println!("No ranked members yet.");
            } else {
                for (i, s) in rows.iter().enumerate() {
                    println!(
                        "{:>3}. {:<20} level {:<2} {:>7} xp  {:>3} referrals",
                        i + 1,
                        s.member_id,
                        s.level,
                        s.experience,
                        s.referral_count
                    );
                }
            }
        }

        Commands::Referrals { member, limit } => {
            let edges = store.referrals_by(member, limit)?;
            let total = store.count_referrals_by(member)?;
            if cli.json {
                println!("{}", json!({ "referrer_id": member, "total": total, "recent": edges }));
            } else {
                println!("member {} referred {} member(s)", member, total);
                for e in &edges {
                    let when = Utc
                        .timestamp_opt(e.created_at, 0)
                        .single()
                        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                        .unwrap_or_else(|| e.created_at.to_string());
                    println!("  {}  {}", when, e.referred_id);
                }
            }
        }

        Commands::SetXp { member, experience } => {
            let change = leveling.set_experience(member, experience)?;
            if cli.json {
                println!(
                    "{}",
                    json!({
                        "member_id": member,
                        "experience": change.experience,
                        "previous_level": change.previous_level,
                        "level": change.new_level,
                    })
                );
            } else {
                println!(
                    "member {} now has {} xp (level {} → {})",
                    member, change.experience, change.previous_level, change.new_level
                );
                if change.previous_level != change.new_level {
                    println!("Discord level roles are left as they are; the bot resyncs them on the next level-up.");
                }
            }
        }
    }
    Ok(())
}
