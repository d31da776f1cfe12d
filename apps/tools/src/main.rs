use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use server_api::ApiContext;
use shared::{domain::TeamId, error::ApiError, protocol::RegisterTeamRequest};
use storage::Storage;

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://./data/checkin.db")]
    database_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Registers a team and prints the text its QR badge should encode.
    Register {
        team_name: String,
        #[arg(required = true)]
        members: Vec<String>,
    },
    List {
        #[arg(long)]
        json: bool,
    },
    Stats,
    Payload {
        team_id: String,
    },
    /// Writes every team's badge PNG into a zip archive.
    ExportBadges {
        #[arg(long, default_value = server_api::badge::EXPORT_FILE_NAME)]
        out: PathBuf,
    },
    DeleteTeam {
        team_id: String,
    },
    DeleteAll {
        #[arg(long)]
        yes: bool,
    },
}

fn api_failure(err: ApiError) -> anyhow::Error {
    anyhow!("{:?}: {}", err.code, err.message)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("warn").init();
    let cli = Cli::parse();
    let ctx = ApiContext {
        storage: Storage::new(&cli.database_url).await?,
    };

    match cli.command {
        Command::Register { team_name, members } => {
            let registered =
                server_api::register_team(&ctx, RegisterTeamRequest { team_name, members })
                    .await
                    .map_err(api_failure)?;
            println!("created team_id={}", registered.team_id);
            println!("{}", registered.payload);
        }
        Command::List { json } => {
            let teams = server_api::list_teams(&ctx).await.map_err(api_failure)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&teams)?);
            } else {
                for roster in teams {
                    println!(
                        "{}  {}  (updated {})",
                        roster.team.team_id,
                        roster.team.team_name,
                        roster.team.last_updated.as_deref().unwrap_or("never")
                    );
                    for member in roster.members {
                        let flags = member.flags();
                        println!(
                            "    #{:<4} {:<24} in={} snacks={} dinner={} out={}",
                            member.member_id,
                            member.member_name,
                            u8::from(flags.check_in),
                            u8::from(flags.snacks),
                            u8::from(flags.dinner),
                            u8::from(flags.check_out)
                        );
                    }
                }
            }
        }
        Command::Stats => {
            let stats = server_api::attendance_stats(&ctx)
                .await
                .map_err(api_failure)?;
            println!(
                "check_in={} snacks={} dinner={} check_out={}",
                stats.check_in, stats.snacks, stats.dinner, stats.check_out
            );
        }
        Command::Payload { team_id } => {
            let payload = server_api::team_payload(&ctx, &TeamId::new(team_id))
                .await
                .map_err(api_failure)?;
            println!("{payload}");
        }
        Command::ExportBadges { out } => {
            let archive = server_api::export_badges(&ctx)
                .await
                .map_err(api_failure)?;
            std::fs::write(&out, archive)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("wrote {}", out.display());
        }
        Command::DeleteTeam { team_id } => {
            let team_id = TeamId::new(team_id);
            if server_api::delete_team(&ctx, &team_id)
                .await
                .map_err(api_failure)?
            {
                println!("deleted team_id={team_id}");
            } else {
                println!("no team with team_id={team_id}");
            }
        }
        Command::DeleteAll { yes } => {
            if !yes {
                return Err(anyhow!("refusing to delete every team without --yes"));
            }
            server_api::delete_all(&ctx).await.map_err(api_failure)?;
            println!("deleted all teams");
        }
    }

    Ok(())
}
