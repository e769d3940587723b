//! In-memory view of the entities the gateway has told us about

use parking_lot::RwLock;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Store shared between the session task and the client handle
pub type SharedStore = Arc<RwLock<GatewayStore>>;

/// Read an ID field that may be encoded as a string or a number
pub fn snowflake(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(id) => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

#[derive(Debug, Clone, Default)]
pub struct GuildRecord {
    pub id: String,
    pub name: String,
    pub large: bool,
    /// Member count advertised by the gateway
    pub member_count: u64,
    pub roles: HashMap<String, Value>,
    pub channels: HashMap<String, Value>,
    pub members: HashMap<String, Value>,
    /// Payload the record was built from
    pub raw: Value,
}

impl GuildRecord {
    /// All advertised members are present
    pub fn is_fully_loaded(&self) -> bool {
        self.members.len() as u64 >= self.member_count
    }
}

#[derive(Debug, Default)]
pub struct GatewayStore {
    pub current_user: Option<Value>,
    pub guilds: HashMap<String, GuildRecord>,
    pub users: HashMap<String, Value>,
    /// Direct message channels keyed by recipient ID
    pub private_channels: HashMap<String, Value>,
}

impl GatewayStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedStore {
        Arc::new(RwLock::new(Self::new()))
    }

    pub fn current_user_id(&self) -> Option<String> {
        snowflake(self.current_user.as_ref()?.get("id"))
    }

    pub fn guild(&self, id: &str) -> Option<&GuildRecord> {
        self.guilds.get(id)
    }

    pub fn guild_mut(&mut self, id: &str) -> Option<&mut GuildRecord> {
        self.guilds.get_mut(id)
    }

    /// Insert or replace a user, keyed by its ID
    pub fn upsert_user(&mut self, user: &Value) {
        if let Some(id) = snowflake(user.get("id")) {
            self.users.insert(id, user.clone());
        }
    }

    /// Store a DM channel under each of its recipients
    pub fn insert_private_channel(&mut self, channel: &Value) -> usize {
        let recipients: Vec<String> = channel
            .get("recipients")
            .and_then(Value::as_array)
            .map(|list| list.iter().filter_map(|r| snowflake(r.get("id"))).collect())
            .or_else(|| snowflake(channel.get("recipient").and_then(|r| r.get("id"))).map(|id| vec![id]))
            .unwrap_or_default();

        for id in &recipients {
            self.private_channels.insert(id.clone(), channel.clone());
        }
        recipients.len()
    }

    /// Add members from a member chunk, skipping ones already known
    ///
    /// Returns the number added and whether the guild is now fully loaded,
    /// or `None` when the guild is unknown.
    pub fn add_members(&mut self, guild_id: &str, members: &[Value]) -> Option<(usize, bool)> {
        let mut new_users = Vec::new();
        let guild = self.guilds.get_mut(guild_id)?;
        let mut added = 0;

        for member in members {
            let Some(user) = member.get("user") else {
                continue;
            };
            let Some(user_id) = snowflake(user.get("id")) else {
                continue;
            };
            if guild.members.contains_key(&user_id) {
                continue;
            }

            let mut record = member.clone();
            record["guild_id"] = json!(guild_id);
            record["status"] = json!("offline");
            record["game"] = Value::Null;
            guild.members.insert(user_id, record);
            new_users.push(user.clone());
            added += 1;
        }

        let complete = guild.is_fully_loaded();
        for user in &new_users {
            self.upsert_user(user);
        }
        Some((added, complete))
    }
}
