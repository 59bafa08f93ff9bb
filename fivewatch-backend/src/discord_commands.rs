use crate::{Context, Data, discord};
use fivewatch_backend::helpers::format_timestamp;
use fivewatch_backend::history::PlayerHistory;
use fivewatch_backend::plan::{self, Button};
use fivewatch_backend::scheduler::RefreshError;
use fivewatch_backend::source::StatusSource;
use poise::CreateReply;
use poise::command;
use poise::serenity_prelude as serenity;
use serenity::{
    ComponentInteraction, CreateInteractionResponse, CreateInteractionResponseMessage,
    EditInteractionResponse,
};

pub(crate) type Error = Box<dyn std::error::Error + Send + Sync>;

/// Shows the current server status
#[command(slash_command)]
pub async fn status(ctx: Context<'_>) -> Result<(), Error> {
    let snapshot = ctx.data().source.fetch().await;
    let embed = discord::embed(&plan::status_content(&snapshot));
    ctx.send(CreateReply::default().embed(embed).ephemeral(true))
        .await?;
    Ok(())
}

/// Shows a list of players with their ping
#[command(slash_command)]
pub async fn players(ctx: Context<'_>) -> Result<(), Error> {
    let snapshot = ctx.data().source.fetch().await;
    let content = if snapshot.players.is_empty() {
        "No one is online right now.".to_string()
    } else {
        format!(
            "**Players Online:**\n{}",
            plan::player_lines(&snapshot.players)
        )
    };
    ctx.send(CreateReply::default().content(content).ephemeral(true))
        .await?;
    Ok(())
}

/// Shows the last connection time of a player
#[command(slash_command)]
pub async fn lastseen(
    ctx: Context<'_>,
    #[description = "The name of the player"] player: String,
) -> Result<(), Error> {
    let record = ctx.data().db.get_player(player.clone()).await?;
    let content = match record {
        Some(record) => format!(
            "{} was last seen online at {}.",
            player,
            format_timestamp(record.last_seen_at)
        ),
        None => format!("{} has not been seen online.", player),
    };
    ctx.send(CreateReply::default().content(content).ephemeral(true))
        .await?;
    Ok(())
}

/// Routes button presses on the status message.
pub(crate) async fn handle_event(
    ctx: &serenity::Context,
    event: &serenity::FullEvent,
    _framework: poise::FrameworkContext<'_, Data, Error>,
    data: &Data,
) -> Result<(), Error> {
    let serenity::FullEvent::InteractionCreate { interaction } = event else {
        return Ok(());
    };
    let Some(component) = interaction.as_message_component() else {
        return Ok(());
    };

    tracing::info!(
        "Button '{}' pressed by user '{}'",
        component.data.custom_id,
        component.user.name
    );
    match Button::from_custom_id(&component.data.custom_id) {
        Some(Button::RefreshStatus) => refresh_status(ctx, component, data).await,
        Some(Button::TopPlayers) => top_players(ctx, component, data).await,
        None => Ok(()),
    }
}

async fn refresh_status(
    ctx: &serenity::Context,
    component: &ComponentInteraction,
    data: &Data,
) -> Result<(), Error> {
    let pending = match data.scheduler.request_refresh().await {
        Ok(pending) => pending,
        Err(RefreshError::Cooldown(cooldown)) => {
            let text = format!(
                "You can refresh the status again in {} seconds.",
                cooldown.remaining_secs
            );
            return reply_ephemeral(ctx, component, text).await;
        }
        Err(err) => return Err(err.into()),
    };

    component.defer_ephemeral(&ctx.http).await?;
    let text = match pending.wait().await {
        Ok(_) => "Status refreshed!",
        Err(err) => {
            tracing::error!(error = %err, "manual refresh failed");
            "Status refresh failed, please try again later."
        }
    };
    component
        .edit_response(&ctx.http, EditInteractionResponse::new().content(text))
        .await?;
    Ok(())
}

async fn top_players(
    ctx: &serenity::Context,
    component: &ComponentInteraction,
    data: &Data,
) -> Result<(), Error> {
    let table = PlayerHistory::from_entries(data.db.load_player_history().await?);
    let text = format!(
        "**Top 5 Active Players:**\n{}",
        plan::top_players_text(&table.top_n(5))
    );
    reply_ephemeral(ctx, component, text).await
}

async fn reply_ephemeral(
    ctx: &serenity::Context,
    component: &ComponentInteraction,
    text: String,
) -> Result<(), Error> {
    component
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .content(text)
                    .ephemeral(true),
            ),
        )
        .await?;
    Ok(())
}
