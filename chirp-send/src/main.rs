//! chirp-send - Long-running persona posting service
//!
//! Loads configuration, makes sure usable credentials exist, then runs the
//! posting loop until the process is terminated.

use std::process;
use std::time::Duration;

use clap::Parser;
use libchirp::config::AuthMode;
use libchirp::error::{AuthError, ConfigError};
use libchirp::generation::GenerationClient;
use libchirp::logging::{LogFormat, LoggingConfig};
use libchirp::oauth::{prompt_for, AuthorizationRequest};
use libchirp::{health, ChirpError, Config, Result, Runtime, TwitterClient};
use secrecy::ExposeSecret;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "chirp-send")]
#[command(version)]
#[command(about = "Long-running persona posting service")]
#[command(long_about = "\
chirp-send - Long-running persona posting service

DESCRIPTION:
    chirp-send generates short posts in a fixed persona with a language
    model and publishes them on Twitter/X at fixed intervals: an hourly
    post, a reply to a trending post, and replies to new mentions.

    Failed actions are logged and retried at their next interval. The
    service only exits on startup errors.

USAGE:
    # Run in foreground (logs to stderr)
    chirp-send

    # Poll every 30 seconds with JSON logs
    chirp-send --poll-interval 30 --log-format json

    # Paste the authorization code instead of using the local callback
    chirp-send --manual-auth

CONFIGURATION:
    Read from the environment, optionally seeded from ./.env

    Required:
      TWITTER_CLIENT_ID, TWITTER_CLIENT_SECRET, GROQ_API_KEY
      TWITTER_REDIRECT_URI  (only without TWITTER_REFRESH_TOKEN)

    Optional:
      TWITTER_ACCESS_TOKEN, TWITTER_REFRESH_TOKEN
      CHIRP_POLL_INTERVAL, CHIRP_POST_INTERVAL, CHIRP_TRENDING_INTERVAL,
      CHIRP_MENTIONS_INTERVAL, CHIRP_TRENDING_QUERY, CHIRP_HEALTH_ADDR, PORT,
      GENERATION_BASE_URL, GENERATION_MODEL, CHIRP_LOG_FORMAT, CHIRP_LOG_LEVEL

EXIT CODES:
    1 - Runtime error
    2 - Configuration error
    3 - Authentication error
")]
struct Cli {
    /// Poll interval in seconds (overrides CHIRP_POLL_INTERVAL)
    #[arg(long, value_name = "SECONDS")]
    poll_interval: Option<u64>,

    /// Enable verbose logging to stderr
    #[arg(short, long)]
    verbose: bool,

    /// Log output format: text, json or pretty
    #[arg(long, value_name = "FORMAT")]
    log_format: Option<LogFormat>,

    /// Read the authorization code from stdin instead of the local callback
    #[arg(long)]
    manual_auth: bool,

    /// Run once and exit (for testing)
    #[arg(long, hide = true)]
    once: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_logging(&cli);

    if let Err(e) = run(cli).await {
        error!("{}", e);
        eprintln!("Error: {}", e);
        process::exit(e.exit_code());
    }
}

fn init_logging(cli: &Cli) {
    let mut logging =
        LoggingConfig::from_lookup(|key| std::env::var(key).ok()).verbose(cli.verbose);
    if let Some(format) = cli.log_format {
        logging.format = format;
    }
    logging.init();
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = Config::from_env()?;
    apply_overrides(&mut config, &cli)?;

    info!("chirp-send starting");

    let twitter = authorize(&config).await?;

    if let Some(addr) = config.health_addr {
        health::spawn(addr).await?;
    }

    let generator = GenerationClient::from_config(&config.generation);
    info!(
        "Generating with {} via {}",
        config.generation.model, config.generation.base_url
    );

    let mut runtime = Runtime::new(
        Box::new(twitter),
        Box::new(generator),
        &config.schedule,
        config.behavior,
    );

    if cli.once {
        let reports = runtime.tick().await;
        info!("chirp-send: ran {} action(s) once, exiting", reports.len());
        return Ok(());
    }

    runtime.run_forever().await;
    Ok(())
}

fn apply_overrides(config: &mut Config, cli: &Cli) -> Result<()> {
    if let Some(secs) = cli.poll_interval {
        if secs == 0 {
            return Err(ConfigError::Invalid {
                key: "--poll-interval".to_string(),
                reason: "must be greater than zero".to_string(),
            }
            .into());
        }
        config.schedule.poll_interval = Duration::from_secs(secs);
    }
    if cli.manual_auth {
        config.twitter.auth_mode = AuthMode::Manual;
    }
    Ok(())
}

/// Build the platform client and prove its credentials work.
///
/// Runs the interactive flow when no refresh token is configured. Failures
/// are fatal except an unreachable token endpoint with a configured refresh
/// token, which the first platform call retries.
async fn authorize(config: &Config) -> Result<TwitterClient> {
    let request = match &config.twitter.refresh_token {
        Some(_) => None,
        None => Some(AuthorizationRequest::from_config(&config.twitter)?),
    };

    let mut twitter = TwitterClient::from_config(&config.twitter);
    let credentials = twitter.credentials_mut();
    let bootstrapped = request.is_some();

    if let Some(request) = request {
        warn!("No TWITTER_REFRESH_TOKEN configured, starting the authorization flow");
        let prompt = prompt_for(config.twitter.auth_mode);
        credentials.bootstrap(&request, prompt.as_ref()).await?;
        if let Some(token) = credentials.refresh_token() {
            println!("TWITTER_REFRESH_TOKEN={}", token.expose_secret());
            eprintln!("Persist the refresh token above; it is not stored anywhere else.");
        }
    }

    match credentials.current_access_token().await {
        Ok(_) => info!("Credentials ready"),
        Err(e) if startup_failure_is_fatal(&e, bootstrapped) => return Err(ChirpError::Auth(e)),
        Err(e) => warn!(
            "Could not refresh the access token yet ({}); the first action will retry",
            e
        ),
    }
    Ok(twitter)
}

/// A configured refresh token survives a token endpoint outage; a rejected
/// or malformed refresh, or a failed first authorization, does not
fn startup_failure_is_fatal(error: &AuthError, bootstrapped: bool) -> bool {
    bootstrapped || !matches!(error, AuthError::Transport(_))
}
