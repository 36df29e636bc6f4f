use crate::{
    api,
    auth::{GoogleProvider, OAuthRegistry},
    cli::{
        commands::{
            database::{self, Connection},
            email, jwt, oauth, seed, sweep,
        },
        telemetry,
    },
    clock::{Clock, SystemClock},
    mailer::{LogEmailSender, MailAccounts, MailQueue, MailerConfig},
    services::{Services, ServicesConfig},
    store::{PgStore, Stores},
    token::TokenConfig,
};
use anyhow::{Context, Result};
use secrecy::ExposeSecret;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub jwt: jwt::Options,
    pub database: database::Options,
    pub seed: seed::Options,
    pub email: email::Options,
    pub oauth: oauth::Options,
    pub sweep: sweep::Options,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the store is unreachable, seeding fails, or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let stores = connect_stores(&args.database.connection).await?;

    let token_config = TokenConfig::new(args.jwt.secret)
        .with_access_ttl_hours(args.jwt.access_ttl_hours)
        .with_refresh_ttl_hours(args.jwt.refresh_ttl_hours);

    let config = ServicesConfig::new(token_config)
        .with_default_role(args.seed.role_name, args.seed.role_tag, args.seed.role_info)
        .with_default_user(args.seed.username, args.seed.password)
        .with_feedback_destination(args.email.feedback_destination)
        .with_oauth(oauth_registry(args.oauth)?);

    let accounts = MailAccounts::from_env();
    if accounts.is_empty() {
        warn!("no EMAIL_TYPE_* accounts configured, outgoing mail will be dropped");
    }
    let mailer_config = MailerConfig::new()
        .with_capacity(args.email.queue_capacity)
        .with_max_attempts(args.email.max_attempts);
    let (mailer, _worker) = MailQueue::spawn(mailer_config, accounts, Arc::new(LogEmailSender));

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let services = Services::new(config, stores, mailer, clock)?;
    services.seed().await.context("Failed to seed roles and users")?;
    debug!("Services: {:?}", services);

    let sweepers =
        services.spawn_sweepers(args.sweep.blocker_interval, args.sweep.reset_interval);

    let result = api::new(args.port, Arc::new(services)).await;

    for sweeper in sweepers {
        sweeper.abort();
    }
    telemetry::shutdown_tracer();

    result
}

async fn connect_stores(connection: &Connection) -> Result<Stores> {
    let Some(dsn) = connection.dsn() else {
        info!("Using in-memory store, nothing will be persisted");
        return Ok(Stores::memory());
    };

    let store = PgStore::connect(dsn.expose_secret())
        .await
        .context("Failed to connect to database")?;
    store
        .migrate()
        .await
        .context("Failed to apply database schema")?;
    info!("Connected to database");
    Ok(Stores::postgres(store))
}

fn oauth_registry(options: oauth::Options) -> Result<OAuthRegistry> {
    let mut registry = OAuthRegistry::new();
    if let Some(google) = options.google {
        let provider = GoogleProvider::new(google).context("Failed to build Google provider")?;
        info!(client_id = provider.client_id(), "Google sign-in enabled");
        registry = registry.with_provider(Arc::new(provider));
    }
    Ok(registry)
}
