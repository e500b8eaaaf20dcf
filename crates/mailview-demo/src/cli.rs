use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use mailview_core::{ListFilter, WindowConfig};
use mailview_runtime::Routes;
use mailview_runtime::logging::{self, LogFormat};

use crate::error::{DemoError, Result};
use crate::watch::{WatchArgs, run_watch};

#[derive(Debug, Parser)]
#[command(
    name = "mailview-demo",
    about = "Drive a windowed mail list against a live MailView server",
    version
)]
pub struct Cli {
    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Mount a list, scroll it, and print pages and sync activity.
    Watch(WatchArgs),

    /// Print the stream endpoints a list would use.
    Routes(TargetArgs),

    /// Print the effective window configuration.
    Config(ConfigArgs),
}

/// Which list on which server.
#[derive(Debug, Clone, Args)]
pub struct TargetArgs {
    /// Server base URL (http or ws).
    #[arg(long, default_value = "http://localhost:8080")]
    pub base_url: String,

    /// Account whose mail is listed.
    #[arg(long)]
    pub account: String,

    /// Mailbox to list. Without it, all mail is listed.
    #[arg(long)]
    pub mailbox: Option<String>,

    /// Full-text search keyword.
    #[arg(long)]
    pub search: Option<String>,
}

impl TargetArgs {
    pub fn routes(&self) -> Result<Routes> {
        Ok(Routes::new(&self.base_url, self.account.as_str())?)
    }

    #[must_use]
    pub fn filter(&self) -> ListFilter {
        let mut filter = match &self.mailbox {
            Some(mailbox) => ListFilter::mailbox(mailbox.as_str()),
            None => ListFilter::default(),
        };
        if let Some(keyword) = &self.search {
            filter = filter.with_search(keyword.as_str());
        }
        filter
    }
}

#[derive(Debug, Clone, Args)]
pub struct ConfigArgs {
    /// JSON or TOML config file. Defaults apply when omitted.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override the page size.
    #[arg(long)]
    pub page_size: Option<usize>,
}

impl ConfigArgs {
    /// Load, apply overrides, and validate.
    pub fn load(&self) -> Result<WindowConfig> {
        let mut config = match &self.config {
            Some(path) => WindowConfig::from_file(path).map_err(|source| DemoError::Config {
                path: path.clone(),
                source,
            })?,
            None => WindowConfig::default(),
        };
        if let Some(page_size) = self.page_size {
            config.page_size = page_size;
        }
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(DemoError::InvalidConfig(errors))
        }
    }
}

pub fn run_from_env() -> Result<()> {
    let cli = Cli::parse();
    let format = if cli.log_json {
        LogFormat::Json
    } else {
        LogFormat::Pretty
    };
    logging::init(format, "warn,mailview=info")?;
    run(cli)
}

pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Watch(args) => run_watch(&args),
        Commands::Routes(target) => {
            let routes = target.routes()?;
            let page = mailview_core::PageQuery::for_page(0, 50, &target.filter());
            println!("page 0:    {}", routes.page_endpoint(&page));
            println!("sync:      {}", routes.sync_endpoint());
            println!("mailboxes: {}", routes.mailboxes_endpoint());
            Ok(())
        }
        Commands::Config(args) => {
            let config = args.load()?;
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}
