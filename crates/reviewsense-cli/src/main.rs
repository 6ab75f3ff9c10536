use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use reviewsense_core::ReviewSubmission;
use reviewsense_store::Page;
use reviewsense_sync::{ChangeEvent, PredictClient};

mod display;
mod import;
mod serve;

#[derive(Parser, Debug)]
#[command(name = "reviewsense")]
#[command(about = "Movie review sentiment analysis service", version)]
struct Cli {
    /// Base URL of a running server (client subcommands).
    #[arg(
        long,
        global = true,
        env = "REVIEWSENSE_API_URL",
        default_value = "http://localhost:8001"
    )]
    api_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API and webhook routes.
    Serve(serve::ServeArgs),
    /// Classify one review through a running server.
    Predict {
        #[command(flatten)]
        review: ReviewArgs,
        /// Print the raw JSON response.
        #[arg(long)]
        json: bool,
    },
    /// Insert into the incoming collection and let the trigger process it.
    Submit {
        #[command(flatten)]
        review: ReviewArgs,
    },
    /// Deliver a change event (EventBridge JSON) to the webhook.
    Trigger {
        /// Event file, or `-` for stdin.
        #[arg(long)]
        event: PathBuf,
    },
    /// Most recent stored results.
    Reviews {
        #[command(flatten)]
        page: PageArgs,
    },
    /// Classify a JSON Lines review set through a running server, then print stats.
    Import(import::ImportArgs),
    /// Aggregate sentiment counts.
    Stats,
    /// Incoming records and their processing status.
    Status {
        #[command(flatten)]
        page: PageArgs,
    },
}

#[derive(Args, Debug)]
struct ReviewArgs {
    /// Review text.
    review: String,
    #[arg(long)]
    movie_title: Option<String>,
    #[arg(long)]
    user_id: Option<String>,
}

impl ReviewArgs {
    fn submission(self) -> ReviewSubmission {
        ReviewSubmission {
            review: self.review,
            movie_title: self.movie_title,
            user_id: self.user_id,
        }
    }
}

#[derive(Args, Debug)]
struct PageArgs {
    #[arg(long, default_value_t = Page::DEFAULT_LIMIT)]
    limit: u32,
    #[arg(long, default_value_t = 0)]
    skip: u32,
}

impl PageArgs {
    fn page(&self) -> Page {
        Page::new(self.limit, self.skip)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let client = PredictClient::new(&cli.api_url)?;

    match cli.command {
        Command::Serve(args) => serve::run(args).await,
        Command::Predict { review, json } => {
            let result = client.predict(&review.submission()).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                display::print_result(&result);
            }
            Ok(())
        }
        Command::Submit { review } => {
            let record = client.submit_incoming(&review.submission()).await?;
            display::print_incoming(std::slice::from_ref(&record));
            Ok(())
        }
        Command::Trigger { event } => {
            let event = read_event(&event)?;
            let outcome = client.deliver_event(&event).await?;
            display::print_outcome(&outcome);
            Ok(())
        }
        Command::Reviews { page } => {
            let reviews = client.reviews(page.page()).await?;
            display::print_reviews(&reviews);
            Ok(())
        }
        Command::Import(args) => {
            let input = import::read_input(&args.file)?;
            let summary = import::import_lines(&client, &input, args.limit).await;
            display::print_import(&summary);
            let stats = client.stats().await?;
            display::print_stats(&stats);
            Ok(())
        }
        Command::Stats => {
            let stats = client.stats().await?;
            display::print_stats(&stats);
            Ok(())
        }
        Command::Status { page } => {
            let records = client.list_incoming(page.page()).await?;
            display::print_incoming(&records);
            Ok(())
        }
    }
}

fn read_event(path: &Path) -> anyhow::Result<ChangeEvent> {
    let text = if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("reading event from stdin")?;
        buf
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("reading event file {}", path.display()))?
    };
    serde_json::from_str(&text).context("parsing change event")
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn predict_args_parse() {
        let cli = Cli::try_parse_from([
            "reviewsense",
            "--api-url",
            "http://api:9000",
            "predict",
            "Loved it",
            "--movie-title",
            "Up",
        ])
        .unwrap();
        assert_eq!(cli.api_url, "http://api:9000");
        let Command::Predict { review, json } = cli.command else {
            panic!("expected predict");
        };
        assert!(!json);
        let submission = review.submission();
        assert_eq!(submission.review, "Loved it");
        assert_eq!(submission.movie_title.as_deref(), Some("Up"));
        assert!(submission.user_id.is_none());
    }

    #[test]
    fn page_args_cap_limit() {
        let cli = Cli::try_parse_from(["reviewsense", "reviews", "--limit", "1000"]).unwrap();
        let Command::Reviews { page } = cli.command else {
            panic!("expected reviews");
        };
        assert_eq!(page.page(), Page::new(100, 0));
    }

    #[test]
    fn import_args_parse() {
        let cli =
            Cli::try_parse_from(["reviewsense", "import", "imdb_test.jsonl", "--limit", "100"])
                .unwrap();
        let Command::Import(args) = cli.command else {
            panic!("expected import");
        };
        assert_eq!(args.file, PathBuf::from("imdb_test.jsonl"));
        assert_eq!(args.limit, Some(100));
    }

    #[test]
    fn read_event_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("event.json");
        std::fs::write(
            &path,
            r#"{"detail": {"fullDocument": {"_id": 4, "review": "Great"}}}"#,
        )
        .unwrap();
        let event = read_event(&path).unwrap();
        assert_eq!(event.document().unwrap().review.as_deref(), Some("Great"));
    }
}
