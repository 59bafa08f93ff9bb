mod discord;
mod discord_commands;
use fivewatch_backend::config::Config;
use fivewatch_backend::engine::{EngineConfig, PollEngine};
use fivewatch_backend::rate_limit::RateLimitConfig;
use fivewatch_backend::scheduler::{self, SchedulerHandle};
use fivewatch_backend::source::HttpStatusSource;
use fivewatch_backend::{AppState, create_app};
use fivewatch_db::Database;
use poise::{Framework, FrameworkOptions, serenity_prelude as serenity};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

type Context<'a> = poise::Context<'a, crate::Data, crate::discord_commands::Error>;

pub(crate) struct Data {
    pub(crate) db: Database,
    pub(crate) source: HttpStatusSource,
    pub(crate) scheduler: SchedulerHandle,
}

#[tokio::main]
async fn main() {
    // Initialize tracing for structured logging
    #[cfg(debug_assertions)]
    let log_level = "debug";
    #[cfg(not(debug_assertions))]
    let log_level = "info";

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
    tracing::info!("Starting fivewatch...");

    if let Err(e) = run().await {
        tracing::error!("Fatal error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), discord_commands::Error> {
    let config = Config::from_env()?;
    tracing::info!(
        "Configuration: fivem={}:{}, port={}, db_path={}, interval={}s, cooldown={}s, player_list={}",
        config.fivem_host,
        config.fivem_port,
        config.port,
        config.database_path,
        config.update_interval.as_secs(),
        config.refresh_cooldown.as_secs(),
        config.show_player_list
    );
    tracing::info!(
        "Rate limit: {} requests per {}s, block {}s",
        config.rate_limit_max_requests,
        config.rate_limit_window.as_secs(),
        config.rate_limit_block.as_secs()
    );

    let db = Database::open(&config.database_path).await?;
    let source = HttpStatusSource::new(&config.fivem_host, config.fivem_port, config.fetch_timeout)?;

    let app = create_app(
        AppState {
            db: db.clone(),
            source: source.clone(),
        },
        config.request_timeout,
        RateLimitConfig {
            window: config.rate_limit_window,
            max_requests: config.rate_limit_max_requests,
            block: config.rate_limit_block,
        },
    );
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("API listening on {}", addr);

    let intents = serenity::GatewayIntents::GUILDS;
    let token = config.discord_token.clone();

    let framework = Framework::builder()
        .options(FrameworkOptions {
            commands: vec![
                discord_commands::status(),
                discord_commands::players(),
                discord_commands::lastseen(),
            ],
            event_handler: |ctx, event, framework, data| {
                Box::pin(discord_commands::handle_event(ctx, event, framework, data))
            },
            pre_command: |ctx| {
                Box::pin(async move {
                    tracing::info!(
                        "Executing command '{}' by user '{}'",
                        ctx.command().name,
                        ctx.author().name
                    );
                })
            },
            on_error: |error| {
                Box::pin(async move {
                    if let Err(e) = poise::builtins::on_error(error).await {
                        tracing::error!("Error while handling error: {}", e);
                    }
                })
            },
            ..Default::default()
        })
        .setup(move |ctx, ready, framework| {
            Box::pin(async move {
                tracing::info!("Logged in as {}", ready.user.name);
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;
                tracing::info!("Slash commands registered");

                let engine = PollEngine::load(
                    source.clone(),
                    discord::DiscordChannel::new(ctx.http.clone(), config.channel_id),
                    discord::DiscordNotifier::new(ctx.http.clone(), config.admin_channel_id),
                    db.clone(),
                    EngineConfig {
                        page_size: config.player_page_size,
                        show_player_list: config.show_player_list,
                    },
                )
                .await?;
                let scheduler =
                    scheduler::spawn(engine, config.update_interval, config.refresh_cooldown);

                Ok(Data {
                    db,
                    source,
                    scheduler,
                })
            })
        })
        .build();

    let mut client = serenity::ClientBuilder::new(&token, intents)
        .framework(framework)
        .await?;
    tokio::select! {
        result = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()) => {
            if let Err(e) = result {
                tracing::error!("Axum server error: {}", e);
            }
        }
        result = client.start() => {
            if let Err(e) = result {
                tracing::error!("Discord client error: {:?}", e);
            }
        }
    }
    Ok(())
}
