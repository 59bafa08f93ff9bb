//! serenity transport for the status engine.

use fivewatch_backend::notifier::Notifier;
use fivewatch_backend::plan::{Button, MessageContent};
use fivewatch_backend::reconcile::{ChannelError, MessageChannel};
use fivewatch_db::MessageId;
use poise::serenity_prelude as serenity;
use serenity::{
    ButtonStyle, ChannelId, CreateActionRow, CreateButton, CreateEmbed, CreateMessage,
    EditMessage, Http, Timestamp,
};
use std::sync::Arc;

/// Embed for a planned message, stamped with the current time.
pub(crate) fn embed(content: &MessageContent) -> CreateEmbed {
    let mut embed = CreateEmbed::new()
        .title(&content.title)
        .color(content.color)
        .timestamp(Timestamp::now());
    if let Some(description) = &content.description {
        embed = embed.description(description);
    }
    for field in &content.fields {
        embed = embed.field(&field.name, &field.value, field.inline);
    }
    embed
}

fn components(content: &MessageContent) -> Vec<CreateActionRow> {
    if content.buttons.is_empty() {
        return Vec::new();
    }
    let buttons = content
        .buttons
        .iter()
        .map(|button| {
            let style = match button {
                Button::RefreshStatus => ButtonStyle::Primary,
                Button::TopPlayers => ButtonStyle::Secondary,
            };
            CreateButton::new(button.custom_id())
                .label(button.label())
                .style(style)
        })
        .collect();
    vec![CreateActionRow::Buttons(buttons)]
}

fn message_id(id: MessageId) -> Result<serenity::MessageId, ChannelError> {
    // Snowflakes are never zero; a zero id can only come from a damaged checkpoint
    if id == 0 {
        return Err(ChannelError::NotFound(id));
    }
    Ok(serenity::MessageId::new(id))
}

fn failed(err: serenity::Error) -> ChannelError {
    ChannelError::Failed(err.to_string())
}

/// The public status channel.
pub(crate) struct DiscordChannel {
    http: Arc<Http>,
    channel_id: ChannelId,
}

impl DiscordChannel {
    pub(crate) fn new(http: Arc<Http>, channel_id: u64) -> Self {
        Self {
            http,
            channel_id: ChannelId::new(channel_id),
        }
    }
}

impl MessageChannel for DiscordChannel {
    async fn create(&self, content: &MessageContent) -> Result<MessageId, ChannelError> {
        let builder = CreateMessage::new()
            .embed(embed(content))
            .components(components(content));
        let message = self
            .channel_id
            .send_message(&self.http, builder)
            .await
            .map_err(failed)?;
        Ok(message.id.get())
    }

    async fn edit(&self, id: MessageId, content: &MessageContent) -> Result<(), ChannelError> {
        let builder = EditMessage::new()
            .embed(embed(content))
            .components(components(content));
        self.channel_id
            .edit_message(&self.http, message_id(id)?, builder)
            .await
            .map_err(failed)?;
        Ok(())
    }

    async fn delete(&self, id: MessageId) -> Result<(), ChannelError> {
        self.channel_id
            .delete_message(&self.http, message_id(id)?)
            .await
            .map_err(failed)
    }
}

/// The admin channel receiving online/offline announcements.
pub(crate) struct DiscordNotifier {
    http: Arc<Http>,
    channel_id: ChannelId,
}

impl DiscordNotifier {
    pub(crate) fn new(http: Arc<Http>, channel_id: u64) -> Self {
        Self {
            http,
            channel_id: ChannelId::new(channel_id),
        }
    }
}

impl Notifier for DiscordNotifier {
    async fn send(&self, text: &str) -> Result<(), ChannelError> {
        self.channel_id
            .say(&self.http, text)
            .await
            .map_err(failed)?;
        Ok(())
    }
}
