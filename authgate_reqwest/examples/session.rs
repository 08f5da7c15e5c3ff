use std::time::Duration;

use authgate_reqwest::{ApiClient, AuthConfig, TracingNotifier};
use authgate_tokens::store::CredentialStore;
use clap::Parser;
use tokio::time;

#[derive(Debug, Parser)]
struct Opts {
    /// The URL every API path is relative to
    #[arg(short, long, env = "API_BASE_URL")]
    base_url: url::Url,

    /// The user to sign in as
    #[arg(short, long, env = "API_USERNAME")]
    username: String,

    /// The user's password
    #[arg(short, long, env = "API_PASSWORD", hide_env_values = true)]
    password: String,

    /// The local file used to persist credentials
    #[arg(
        short = 'f',
        long,
        env,
        value_name = "FILE",
        default_value = ".credentials.json"
    )]
    credentials_file: std::path::PathBuf,

    /// How often to fetch the user profile
    #[arg(short, long, default_value_t = 30)]
    interval_secs: u64,
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    dotenvy::dotenv().ok();
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .pretty()
        .with_env_filter(tracing_subscriber::filter::EnvFilter::from_default_env())
        .init();

    let opts = Opts::parse();

    let config = AuthConfig::new(opts.base_url).with_credentials_file(opts.credentials_file);
    let client = ApiClient::builder(config)
        .notifier(TracingNotifier)
        .on_session_end(|| tracing::warn!("session ended, sign in again"))
        .build()?;

    if client.store().refresh_token().is_none() {
        client.login(&opts.username, &opts.password).await?;
    }

    let mut interval = time::interval(Duration::from_secs(opts.interval_secs));
    for _ in 0..10 {
        interval.tick().await;
        match client
            .send::<serde_json::Value>(client.get("/base/userinfo"))
            .await
        {
            Ok(profile) => tracing::info!(%profile, "fetched profile"),
            Err(error) if error.is_session_expired() => break,
            Err(error) => tracing::warn!(code = %error.code(), %error, "unable to fetch profile"),
        }
    }

    client.logout().await?;

    Ok(())
}
