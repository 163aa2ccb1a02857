//! crosspost-history - Query posting history and account state

use anyhow::Result;
use chrono::DateTime;
use clap::Parser;
use libcrosspost::{Config, Database};

#[derive(Parser, Debug)]
#[command(name = "crosspost-history")]
#[command(version, about = "Query posting history and account state")]
#[command(long_about = r#"Query a user's posting history and platform account state.

EXAMPLES:
    # Delivery records for a user, newest first
    crosspost-history --user alice

    # Aggregate posting counts only
    crosspost-history --user alice --stats

    # Per-platform account state (auth flags, token expiry)
    crosspost-history --user alice --accounts

    # JSON output for scripting
    crosspost-history --user alice --format json
    crosspost-history --user alice --format json | jq '.[] | select(.is_posted == false)'

OUTPUT FORMATS:
    text - Human-readable text (default)
    json - JSON (scripting-friendly)

EXIT CODES:
    0 - Success (including empty results)
    1 - Error (database not found, query failed, etc.)
"#)]
struct Args {
    /// User to report on
    #[arg(short, long, value_name = "USER")]
    user: String,

    /// Show aggregate posting counts instead of individual records
    #[arg(short, long)]
    stats: bool,

    /// Show per-platform account state instead of records
    #[arg(short, long, conflicts_with = "stats")]
    accounts: bool,

    /// Output format
    #[arg(short, long, default_value = "text", value_name = "FORMAT")]
    #[arg(value_parser = ["text", "json"])]
    format: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let config = Config::load()?;
    let db = Database::new(&config.database.path).await?;

    if args.accounts {
        print_accounts(&db, &args).await
    } else if args.stats {
        print_stats(&db, &args).await
    } else {
        print_records(&db, &args).await
    }
}

async fn print_records(db: &Database, args: &Args) -> Result<()> {
    let records = db.list_post_records(&args.user).await?;

    match args.format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&records)?),
        _ => {
            if records.is_empty() {
                println!("No records for user '{}'", args.user);
                return Ok(());
            }
            for record in records {
                let when = DateTime::from_timestamp(record.created_at, 0)
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| record.created_at.to_string());
                print!(
                    "{}  {:8}  {:6}  {:9}  {}",
                    when, record.platform, record.post_type, record.status, record.post_id
                );
                if let Some(reason) = &record.error_reason {
                    print!("  ({})", reason);
                }
                println!();
            }
        }
    }
    Ok(())
}

async fn print_stats(db: &Database, args: &Args) -> Result<()> {
    let stats = db.user_stats(&args.user).await?;

    match args.format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&stats)?),
        _ => {
            println!("User: {}", stats.user);
            println!("  total:   {}", stats.total);
            println!("  posted:  {}", stats.posted);
            println!("  errored: {}", stats.errored);
            println!("  pending: {}", stats.pending);
        }
    }
    Ok(())
}

async fn print_accounts(db: &Database, args: &Args) -> Result<()> {
    let summaries = db.account_summaries(&args.user).await?;

    match args.format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&summaries)?),
        _ => {
            if summaries.is_empty() {
                println!("No accounts for user '{}'", args.user);
                return Ok(());
            }
            for account in summaries {
                let state = if account.is_authenticated {
                    "authenticated"
                } else if account.requires_auth {
                    "needs re-authorization"
                } else {
                    "inactive"
                };
                let expiry = account
                    .token_expires_on
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "-".to_string());
                let profile = account.profile_id.as_deref().unwrap_or("-");
                let token = account.access_token.as_deref().unwrap_or("-");
                println!(
                    "{:10} {:24} profile {:20} token {:28} expires {}",
                    account.platform, state, profile, token, expiry
                );
            }
        }
    }
    Ok(())
}
