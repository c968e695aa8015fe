//! MTProto user-session adapter (cargo feature `mtproto`).
//!
//! Uses an already-authorised `grammers` session file. Logging in is not
//! handled here; the session must be created beforehand and placed at
//! `session_file` in the data directory.

use super::{ChannelSource, HistoryCursor, SourceError};
use crate::config::Config;
use crate::models::{Channel, SourceMessage};
use grammers_client::client::messages::MessageIter;
use grammers_client::types::Chat;
use grammers_client::{Client, Config as ClientConfig, InitParams};
use grammers_session::Session;
use grammers_tl_types as tl;
use serde_json::Value;
use std::collections::HashSet;
use tracing::{info, instrument, warn};

pub struct MtprotoSource {
    client: Client,
}

impl MtprotoSource {
    /// Connect with the stored session and check it belongs to a user account.
    #[instrument(level = "info", skip_all, fields(session = %config.session_file.display()))]
    pub async fn connect(config: &Config) -> Result<Self, SourceError> {
        let unavailable = |message: String| SourceError::SessionUnavailable(message);

        if !config.session_file.exists() {
            return Err(unavailable(format!(
                "session file {} not found",
                config.session_file.display()
            )));
        }
        let api_id = config
            .api_id
            .ok_or_else(|| unavailable("TELEGRAM_API_ID is not set".to_string()))?;
        let api_hash = config
            .api_hash
            .clone()
            .ok_or_else(|| unavailable("TELEGRAM_API_HASH is not set".to_string()))?;

        let session = Session::load_file(&config.session_file)
            .map_err(|e| unavailable(format!("cannot load session: {e}")))?;
        let client = Client::connect(ClientConfig {
            session,
            api_id,
            api_hash,
            params: InitParams::default(),
        })
        .await
        .map_err(|e| unavailable(format!("cannot connect: {e}")))?;

        if !client
            .is_authorized()
            .await
            .map_err(|e| unavailable(e.to_string()))?
        {
            return Err(unavailable("session is not authorised".to_string()));
        }
        let me = client.get_me().await.map_err(|e| unavailable(e.to_string()))?;
        if me.is_bot() {
            return Err(unavailable(
                "session belongs to a bot; a user session is required".to_string(),
            ));
        }
        info!("Aggregator session connected");
        Ok(Self { client })
    }

    async fn folder_peer_ids(&self, folder: &str) -> Result<Option<HashSet<i64>>, SourceError> {
        let folder_error = |message: String| SourceError::Folder {
            folder: folder.to_string(),
            message,
        };
        let tl::enums::messages::DialogFilters::Filters(response) = self
            .client
            .invoke(&tl::functions::messages::GetDialogFilters {})
            .await
            .map_err(|e| folder_error(e.to_string()))?;

        for filter in response.filters {
            let (title, peers) = match filter {
                tl::enums::DialogFilter::Filter(f) => (f.title, f.include_peers),
                tl::enums::DialogFilter::Chatlist(f) => (f.title, f.include_peers),
                tl::enums::DialogFilter::Default => continue,
            };
            if title != folder {
                continue;
            }
            let ids = peers
                .into_iter()
                .filter_map(|peer| match peer {
                    tl::enums::InputPeer::Channel(c) => Some(c.channel_id),
                    tl::enums::InputPeer::Chat(c) => Some(c.chat_id),
                    _ => None,
                })
                .collect();
            return Ok(Some(ids));
        }
        Ok(None)
    }
}

/// Descriptive fields of the raw TL object behind `chat`, in schema order.
fn platform_fields(chat: &Chat) -> Vec<(&'static str, Value)> {
    let kind = match chat {
        Chat::Channel(_) => "channel",
        Chat::Group(_) => "group",
        Chat::User(_) => "user",
    };
    let mut fields = vec![("kind", Value::from(kind))];
    match chat {
        Chat::Channel(channel) => channel_fields(&channel.raw, &mut fields),
        Chat::Group(group) => match &group.raw {
            tl::enums::Chat::Chat(c) => fields.extend([
                ("creator", Value::from(c.creator)),
                ("deactivated", Value::from(c.deactivated)),
                ("noforwards", Value::from(c.noforwards)),
                ("participants_count", Value::from(c.participants_count)),
                ("date", Value::from(c.date)),
                ("version", Value::from(c.version)),
            ]),
            tl::enums::Chat::Channel(c) => channel_fields(c, &mut fields),
            _ => {}
        },
        Chat::User(user) => fields.extend([
            ("bot", Value::from(user.raw.bot)),
            ("verified", Value::from(user.raw.verified)),
            ("scam", Value::from(user.raw.scam)),
            ("fake", Value::from(user.raw.fake)),
        ]),
    }
    fields
}

fn channel_fields(raw: &tl::types::Channel, fields: &mut Vec<(&'static str, Value)>) {
    fields.extend([
        ("creator", Value::from(raw.creator)),
        ("left", Value::from(raw.left)),
        ("broadcast", Value::from(raw.broadcast)),
        ("verified", Value::from(raw.verified)),
        ("megagroup", Value::from(raw.megagroup)),
        ("restricted", Value::from(raw.restricted)),
        ("signatures", Value::from(raw.signatures)),
        ("min", Value::from(raw.min)),
        ("scam", Value::from(raw.scam)),
        ("has_link", Value::from(raw.has_link)),
        ("has_geo", Value::from(raw.has_geo)),
        ("slowmode_enabled", Value::from(raw.slowmode_enabled)),
        ("fake", Value::from(raw.fake)),
        ("gigagroup", Value::from(raw.gigagroup)),
        ("noforwards", Value::from(raw.noforwards)),
        ("join_to_send", Value::from(raw.join_to_send)),
        ("join_request", Value::from(raw.join_request)),
        ("forum", Value::from(raw.forum)),
        ("access_hash", Value::from(raw.access_hash)),
        ("date", Value::from(raw.date)),
        ("participants_count", Value::from(raw.participants_count)),
    ]);
}

fn channel_from_chat(chat: &Chat) -> Channel {
    Channel::from_platform(chat.id(), chat.username(), chat.name(), platform_fields(chat))
}

impl ChannelSource for MtprotoSource {
    type Cursor = MtprotoCursor;

    #[instrument(level = "info", skip(self))]
    async fn folder_channels(&self, folder: &str) -> Result<Vec<Channel>, SourceError> {
        let Some(ids) = self.folder_peer_ids(folder).await? else {
            warn!(folder, "Folder not found");
            return Ok(Vec::new());
        };

        let mut channels = Vec::new();
        let mut dialogs = self.client.iter_dialogs();
        while let Some(dialog) = dialogs.next().await.map_err(|e| SourceError::Folder {
            folder: folder.to_string(),
            message: e.to_string(),
        })? {
            let chat = dialog.chat();
            if ids.contains(&chat.id()) {
                channels.push(channel_from_chat(chat));
            }
        }
        info!(count = channels.len(), "Resolved folder channels");
        Ok(channels)
    }

    async fn open_history(&self, channel: &Channel) -> Result<MtprotoCursor, SourceError> {
        let retrieval = |message: String| SourceError::Retrieval {
            channel: channel.display_name(),
            message,
        };
        let username = channel
            .username
            .as_deref()
            .filter(|u| !u.is_empty())
            .ok_or_else(|| retrieval("only public channels with a username can be read".to_string()))?;
        let chat = self
            .client
            .resolve_username(username)
            .await
            .map_err(|e| retrieval(e.to_string()))?
            .ok_or_else(|| retrieval("username does not resolve".to_string()))?;
        Ok(MtprotoCursor {
            channel: channel.display_name(),
            messages: self.client.iter_messages(chat.pack()),
        })
    }
}

pub struct MtprotoCursor {
    channel: String,
    messages: MessageIter,
}

impl HistoryCursor for MtprotoCursor {
    async fn next_message(&mut self) -> Result<Option<SourceMessage>, SourceError> {
        let message = self
            .messages
            .next()
            .await
            .map_err(|e| SourceError::Retrieval {
                channel: self.channel.clone(),
                message: e.to_string(),
            })?;
        Ok(message.map(|m| SourceMessage {
            id: m.id(),
            date: m.date(),
            text: Some(m.text().to_string()).filter(|t| !t.is_empty()),
        }))
    }
}
