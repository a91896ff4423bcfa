use anyhow::{Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use ledger::{Direction, TrendingTopic};
use reqwest::Client;
use serde_json::{Value, json};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    #[arg(long, env = "SERVER_URL", default_value = "http://localhost:1111")]
    server: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Toggle a vote as the given user
    Vote {
        submission: String,

        user: String,

        #[arg(value_enum)]
        side: Side,
    },

    /// Print the current trending topics
    Trending {
        #[arg(long, allow_negative_numbers = true)]
        limit: Option<i64>,
    },

    /// Score a piece of news text
    Analyze { text: String },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq)]
enum Side {
    Up,
    Down,
}

impl From<Side> for Direction {
    fn from(side: Side) -> Self {
        match side {
            Side::Up => Direction::Up,
            Side::Down => Direction::Down,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let client = Client::new();
    let server = args.server.trim_end_matches('/');

    match args.command {
        Command::Vote {
            submission,
            user,
            side,
        } => {
            let response = client
                .post(format!("{server}/submissions/{submission}/vote"))
                .header("x-user-id", user)
                .json(&json!({ "direction": Direction::from(side) }))
                .send()
                .await?;

            let status = response.status();
            let body: Value = response.json().await?;
            if !status.is_success() {
                bail!("{status}: {}", body["error"]);
            }

            let submission = &body["submission"];
            println!("Upvotes: {}", submission["upvotes"]);
            println!("Downvotes: {}", submission["downvotes"]);
            println!("Verified: {}%", body["votes"]["upvotePercentage"]);
        }
        Command::Trending { limit } => {
            let mut request = client.get(format!("{server}/trending"));
            if let Some(limit) = limit {
                request = request.query(&[("limit", limit)]);
            }

            let body: Value = request.send().await?.error_for_status()?.json().await?;
            let topics: Vec<TrendingTopic> = serde_json::from_value(body["topics"].clone())?;

            if topics.is_empty() {
                println!("No trending topics yet.");
            }
            for (rank, topic) in topics.iter().enumerate() {
                println!(
                    "{:>2}. {} ({} analyses, {}% avg)",
                    rank + 1,
                    topic.summary,
                    topic.count,
                    topic.average_score
                );
            }
        }
        Command::Analyze { text } => {
            let response = client
                .post(format!("{server}/analyze/text"))
                .json(&json!({ "newsText": text }))
                .send()
                .await?;

            let status = response.status();
            let body: Value = response.json().await?;
            if !status.is_success() {
                bail!("{status}: {}", body["error"]);
            }

            println!("{}", serde_json::to_string_pretty(&body)?);
        }
    }

    Ok(())
}
