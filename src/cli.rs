//! Command-line interface definitions for the job scraper.
//!
//! Global flags override the matching settings from the YAML config file.
//!
//! # Examples
//!
//! ```sh
//! # One scrape cycle with the built-in source list
//! pak_jobs scrape
//!
//! # Keep the cache fresh, re-scraping once it is older than the threshold
//! pak_jobs --config config.yaml watch
//!
//! # Search the cached listings
//! pak_jobs search engineer --location Lahore --limit 20
//! ```

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Optional path to config.yaml file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Source list location (file path or http(s) URL), one URL per line
    #[arg(short, long, global = true, env = "PAK_JOBS_SOURCES")]
    pub sources: Option<String>,

    /// Cache file path
    #[arg(long, global = true)]
    pub cache: Option<String>,

    /// Number of sources scraped concurrently
    #[arg(long, global = true)]
    pub concurrency: Option<usize>,

    /// Enable the headless-browser fallback for client-rendered sites
    #[arg(long, global = true)]
    pub render: bool,

    /// API key for the chat endpoint used by `ask`
    #[arg(long, env = "LLM_API_KEY", hide_env_values = true)]
    pub llm_api_key: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Run one scrape cycle and write the cache file
    Scrape,
    /// Serve the cache and refresh it whenever it goes stale
    Watch,
    /// Search the cached listings
    Search {
        /// Text matched against title, organization and description
        query: Option<String>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        location: Option<String>,
        #[arg(short, long, default_value_t = 50)]
        limit: usize,
    },
    /// Ask the assistant a question about the cached listings
    Ask {
        prompt: String,
    },
    /// Print the resolved source list
    Sources,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::parse_from([
            "pak_jobs",
            "--config",
            "./config.yaml",
            "--cache",
            "/tmp/jobs.csv",
            "scrape",
        ]);

        assert_eq!(cli.config.as_deref(), Some("./config.yaml"));
        assert_eq!(cli.cache.as_deref(), Some("/tmp/jobs.csv"));
        assert_eq!(cli.command, Command::Scrape);
        assert!(!cli.render);
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["pak_jobs", "watch", "--concurrency", "4", "--render", "-s", "sites.txt"]);

        assert_eq!(cli.command, Command::Watch);
        assert_eq!(cli.concurrency, Some(4));
        assert!(cli.render);
        assert_eq!(cli.sources.as_deref(), Some("sites.txt"));
    }

    #[test]
    fn test_search_arguments() {
        let cli = Cli::parse_from([
            "pak_jobs",
            "search",
            "nurse",
            "--location",
            "Karachi",
            "-l",
            "5",
        ]);

        assert_eq!(
            cli.command,
            Command::Search {
                query: Some("nurse".to_string()),
                category: None,
                location: Some("Karachi".to_string()),
                limit: 5,
            }
        );
    }

    #[test]
    fn test_search_defaults() {
        let cli = Cli::parse_from(["pak_jobs", "search"]);
        assert_eq!(
            cli.command,
            Command::Search {
                query: None,
                category: None,
                location: None,
                limit: 50,
            }
        );
    }

    #[test]
    fn test_ask_requires_prompt() {
        assert!(Cli::try_parse_from(["pak_jobs", "ask"]).is_err());
        let cli = Cli::parse_from(["pak_jobs", "ask", "Which banks are hiring?"]);
        assert_eq!(
            cli.command,
            Command::Ask {
                prompt: "Which banks are hiring?".to_string()
            }
        );
    }
}
