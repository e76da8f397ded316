use anyhow::{Context, Result};
use clap::Parser;
use libchirp::config::{AuthMode, TwitterConfig};
use libchirp::credentials::{CredentialStore, OAuthClient};
use libchirp::logging::LoggingConfig;
use libchirp::oauth::{prompt_for, AuthorizationRequest};
use secrecy::{ExposeSecret, SecretString};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "chirp-auth")]
#[command(version)]
#[command(about = "Run the one-time Twitter/X authorization and print the tokens")]
#[command(long_about = "\
chirp-auth - One-time Twitter/X authorization

Opens the OAuth 2.0 consent flow (PKCE) for the app configured in
TWITTER_CLIENT_ID / TWITTER_CLIENT_SECRET and prints the resulting tokens
on stdout, ready to paste into the deployment's environment:

    TWITTER_ACCESS_TOKEN=...
    TWITTER_REFRESH_TOKEN=...

TWITTER_REDIRECT_URI must match the callback registered for the app.
By default a local listener on that URI receives the code; with --manual
the code (or the whole redirected URL) is pasted on stdin instead.
")]
struct Cli {
    /// Paste the authorization code instead of listening for the callback
    #[arg(long)]
    manual: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    LoggingConfig::from_lookup(|key| std::env::var(key).ok())
        .verbose(cli.verbose)
        .init();

    if let Err(e) = run_authorization(&cli).await {
        error!("Authorization failed: {:#}", e);
        eprintln!("\nAuthorization failed: {:#}", e);
        let code = e
            .downcast_ref::<libchirp::ChirpError>()
            .map_or(1, |e| e.exit_code());
        std::process::exit(code);
    }

    Ok(())
}

async fn run_authorization(cli: &Cli) -> Result<()> {
    let mut config = TwitterConfig::from_env()?;
    if cli.manual {
        config.auth_mode = AuthMode::Manual;
    }

    let request = AuthorizationRequest::from_config(&config)
        .map_err(libchirp::ChirpError::from)
        .context("could not build the authorization URL")?;

    let endpoint = OAuthClient::new(
        &config.api_base,
        &config.client_id,
        SecretString::from(config.client_secret.expose_secret().to_string()),
    );
    // Start empty so the flow runs even if old tokens are still configured
    let mut store = CredentialStore::new(Box::new(endpoint), None, None);

    info!("Starting {:?} authorization flow", config.auth_mode);
    let prompt = prompt_for(config.auth_mode);
    store
        .bootstrap(&request, prompt.as_ref())
        .await
        .map_err(libchirp::ChirpError::from)?;

    let access = store
        .current_access_token()
        .await
        .map_err(libchirp::ChirpError::from)?;
    println!("TWITTER_ACCESS_TOKEN={}", access);
    if let Some(refresh) = store.refresh_token() {
        println!("TWITTER_REFRESH_TOKEN={}", refresh.expose_secret());
    }
    eprintln!("\nStore these values in the deployment's environment. The access token expires in about two hours; the refresh token keeps chirp-send authorized.");

    Ok(())
}
