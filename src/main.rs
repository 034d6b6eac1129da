use anyhow::Result;
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use tweetmarks::auth::ManualStepWindows;
use tweetmarks::commands::authorize::{self, AuthorizeOptions};
use tweetmarks::commands::fetch_bookmarks;
use tweetmarks::config_store::ConfigStore;

#[derive(Parser, Debug)]
#[command(
    name = "tweetmarks",
    version,
    about = "Save your Twitter bookmarks as JSON snapshots",
    long_about = "Authorizes against Twitter with OAuth2 PKCE in a browser window, then \
                  downloads your bookmarks together with their authors and media"
)]
struct Cli {
    /// Key-value file holding client-id, client-secret and the stored access token
    #[arg(long, env = "TWEETMARKS_CONFIG", default_value = ".env", global = true)]
    config: PathBuf,

    /// Directory to write the snapshot files to
    #[arg(short, long, env = "TWEETMARKS_OUTPUT_DIR", default_value = ".", global = true)]
    output_dir: PathBuf,

    /// Twitter app client id (overrides the config file)
    #[arg(long, env = "TWITTER_CLIENT_ID", global = true)]
    client_id: Option<String>,

    /// Twitter app client secret (overrides the config file)
    #[arg(long, env = "TWITTER_CLIENT_SECRET", global = true, hide_env_values = true)]
    client_secret: Option<String>,

    /// Redirect URI registered for the app
    #[arg(long, global = true)]
    redirect_uri: Option<String>,

    /// Seconds to wait for the user to log in
    #[arg(long, default_value = "60", global = true)]
    login_wait: u64,

    /// Seconds to wait for the user to authorize the app
    #[arg(long, default_value = "5", global = true)]
    authorize_wait: u64,

    /// Use the stored access token instead of opening a browser when one exists
    #[arg(long, global = true)]
    reuse_token: bool,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Log in through a browser and store a fresh access token
    Authorize,

    /// Fetch bookmarks with the stored access token
    Bookmarks,
}

impl Cli {
    fn authorize_options(&self) -> AuthorizeOptions {
        AuthorizeOptions {
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            redirect_uri: self.redirect_uri.clone(),
            windows: ManualStepWindows {
                login: Duration::from_secs(self.login_wait),
                authorize: Duration::from_secs(self.authorize_wait),
                ..ManualStepWindows::default()
            },
            reuse_token: self.reuse_token,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv().ok();
    // dotenv gives up at the first hyphenated key, pick up the variables after it
    if let Ok(store) = ConfigStore::load(Path::new(".env")) {
        store.export_env_vars();
    }

    let args = Cli::parse();

    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if args.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    debug!(
        "Using config {config} and output directory {output}",
        config = args.config.display(),
        output = args.output_dir.display()
    );

    match args.command {
        Some(Commands::Authorize) => {
            authorize::execute(&args.config, &args.authorize_options()).await?;
        }
        Some(Commands::Bookmarks) => {
            let token = fetch_bookmarks::stored_token(&args.config).await?;
            fetch_bookmarks::execute(token, &args.output_dir).await?;
        }
        None => {
            let token = authorize::execute(&args.config, &args.authorize_options()).await?;
            let paths = fetch_bookmarks::execute(token, &args.output_dir).await?;
            info!(
                "Wrote {users}, {media} and {bookmarks}",
                users = paths.users.display(),
                media = paths.media.display(),
                bookmarks = paths.bookmarks.display()
            );
        }
    }

    Ok(())
}
