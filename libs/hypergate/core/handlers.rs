//! Built-in dispatch handlers
//!
//! Keep the store current for the events the session itself depends on.

use crate::core::protocol::event;
use crate::core::store::{snowflake, GuildRecord};
use crate::traits::{EventHandler, Handled, HandlerContext, Rejection};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Guild member count above which a guild counts as large
pub const LARGE_THRESHOLD: u64 = 250;

/// Handlers registered by default: `(event, handler, aliases)`
pub fn default_handlers() -> Vec<(&'static str, Arc<dyn EventHandler>, Vec<String>)> {
    vec![
        (event::GUILD_CREATE, Arc::new(GuildCreate), Vec::new()),
        (event::CHANNEL_CREATE, Arc::new(ChannelCreate), Vec::new()),
        (event::MESSAGE_CREATE, Arc::new(MessageCreate), vec!["message".to_string()]),
    ]
}

fn require_id(data: &Value, what: &str) -> Result<String, Rejection> {
    snowflake(data.get("id")).ok_or_else(|| Rejection::Malformed(format!("{} without id", what)))
}

/// Index a list of objects by ID, tagging each with its guild
fn index_by_id(items: Option<&Value>, guild_id: &str) -> HashMap<String, Value> {
    let mut indexed = HashMap::new();
    for item in items.and_then(Value::as_array).into_iter().flatten() {
        if let Some(id) = snowflake(item.get("id")) {
            let mut item = item.clone();
            item["guild_id"] = json!(guild_id);
            indexed.insert(id, item);
        }
    }
    indexed
}

pub struct GuildCreate;

impl EventHandler for GuildCreate {
    fn handle(&self, ctx: &mut HandlerContext<'_>, data: &Value) -> Result<Handled, Rejection> {
        let id = require_id(data, "guild")?;
        if data.get("unavailable").and_then(Value::as_bool) == Some(true) {
            return Err(Rejection::Unavailable(id));
        }

        let member_count = data.get("member_count").and_then(Value::as_u64).unwrap_or(0);
        let large = data
            .get("large")
            .and_then(Value::as_bool)
            .unwrap_or(member_count > LARGE_THRESHOLD);

        // Presences arrive separately from members
        let presences: HashMap<String, Value> = data
            .get("presences")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(|p| Some((snowflake(p.get("user")?.get("id"))?, p.clone())))
            .collect();

        let mut members = HashMap::new();
        for member in data.get("members").and_then(Value::as_array).into_iter().flatten() {
            let Some(user) = member.get("user") else { continue };
            let Some(user_id) = snowflake(user.get("id")) else { continue };
            let presence = presences.get(&user_id);

            let mut record = member.clone();
            record["guild_id"] = json!(id);
            record["status"] = presence
                .and_then(|p| p.get("status").cloned())
                .unwrap_or_else(|| json!("offline"));
            record["game"] = presence.and_then(|p| p.get("game").cloned()).unwrap_or(Value::Null);

            ctx.store.upsert_user(user);
            members.insert(user_id, record);
        }

        let record = GuildRecord {
            id: id.clone(),
            name: data.get("name").and_then(Value::as_str).unwrap_or_default().to_string(),
            large,
            member_count,
            roles: index_by_id(data.get("roles"), &id),
            channels: index_by_id(data.get("channels"), &id),
            members,
            raw: data.clone(),
        };

        if large {
            ctx.mark_large(id.clone());
        }

        let old = ctx.store.guilds.insert(id, record).map(|old| old.raw);
        Ok(Handled::new(data.clone()).with_old(old))
    }
}

pub struct ChannelCreate;

impl EventHandler for ChannelCreate {
    fn handle(&self, ctx: &mut HandlerContext<'_>, data: &Value) -> Result<Handled, Rejection> {
        let id = require_id(data, "channel")?;

        match snowflake(data.get("guild_id")) {
            Some(guild_id) => {
                let guild = ctx
                    .store
                    .guild_mut(&guild_id)
                    .ok_or_else(|| Rejection::Malformed(format!("channel {} for unknown guild {}", id, guild_id)))?;
                let old = guild.channels.insert(id, data.clone());
                Ok(Handled::new(data.clone()).with_old(old))
            }
            None => {
                ctx.store.insert_private_channel(data);
                Ok(Handled::new(data.clone()))
            }
        }
    }
}

pub struct MessageCreate;

impl EventHandler for MessageCreate {
    fn handle(&self, ctx: &mut HandlerContext<'_>, data: &Value) -> Result<Handled, Rejection> {
        let id = require_id(data, "message")?;
        let channel_id = snowflake(data.get("channel_id"))
            .ok_or_else(|| Rejection::Malformed(format!("message {} without channel_id", id)))?;

        if let Some(author) = data.get("author") {
            ctx.store.upsert_user(author);
        }

        let channel = match snowflake(data.get("guild_id")) {
            Some(guild_id) => ctx
                .store
                .guild_mut(&guild_id)
                .and_then(|guild| guild.channels.get_mut(&channel_id)),
            None => ctx
                .store
                .private_channels
                .values_mut()
                .find(|channel| snowflake(channel.get("id")).as_deref() == Some(channel_id.as_str())),
        };
        if let Some(channel) = channel {
            channel["last_message_id"] = json!(id);
        }

        Ok(Handled::new(data.clone()))
    }
}
