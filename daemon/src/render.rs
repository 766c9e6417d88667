/// Builds the notice embed from a status snapshot, and reads one back.
///
/// The title marker and the "Players Online" field are the only parts of the
/// embed that [`parse_notice`] relies on; everything else is cosmetic.
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::config::{NoticeConfig, ServerConfig, DEFAULT_SERVER_PORT};
use crate::status::{Availability, StatusSnapshot};
use crate::store::{Embed, EmbedField, EmbedFooter, EmbedImage};

pub const ONLINE_MARKER: &str = "Server Online";
pub const OFFLINE_MARKER: &str = "Server Offline";
pub const PLAYERS_FIELD: &str = "Players Online";
const ADDRESS_FIELD: &str = "Server IP";

const ONLINE_COLOR: u32 = 0x57F287;
const OFFLINE_COLOR: u32 = 0xED4245;
const UNKNOWN_COLOR: u32 = 0x95A5A6;

#[derive(Debug, Error, PartialEq)]
pub enum NoticeParseError {
    #[error("embed has no title")]
    MissingTitle,
    #[error("title {0:?} carries no status marker")]
    UnrecognizedTitle(String),
    #[error("title carries both status markers")]
    Ambiguous,
    #[error("online notice has no player count field")]
    MissingPlayerCount,
    #[error("player count {0:?} is not a number")]
    InvalidPlayerCount(String),
}

/// Renders notices and alert texts for one server.
#[derive(Debug, Clone)]
pub struct NoticeRenderer {
    server_address: String,
    role_id: Option<String>,
    footer: String,
    thumbnail_url: Option<String>,
}

impl NoticeRenderer {
    pub fn new(server: &ServerConfig, notice: &NoticeConfig, role_id: Option<&str>) -> Self {
        let server_address = if server.port == DEFAULT_SERVER_PORT {
            server.host.clone()
        } else {
            format!("{}:{}", server.host, server.port)
        };
        Self {
            server_address,
            role_id: role_id.map(str::to_string),
            footer: notice.footer.clone(),
            thumbnail_url: notice.thumbnail_url.clone(),
        }
    }

    pub fn role_id(&self) -> Option<&str> {
        self.role_id.as_deref()
    }

    pub fn render(&self, snapshot: &StatusSnapshot) -> Embed {
        self.render_at(snapshot, Utc::now())
    }

    pub fn render_at(&self, snapshot: &StatusSnapshot, now: DateTime<Utc>) -> Embed {
        let mut embed = Embed {
            footer: Some(EmbedFooter {
                text: self.footer.clone(),
            }),
            timestamp: Some(now.to_rfc3339()),
            ..Embed::default()
        };

        match snapshot {
            StatusSnapshot::Online { players } => {
                embed.title = Some(format!("🟢 {ONLINE_MARKER}"));
                embed.description = Some(self.greeting("the Minecraft server is **online**!"));
                embed.color = Some(ONLINE_COLOR);
                embed.fields = vec![
                    EmbedField {
                        name: PLAYERS_FIELD.to_string(),
                        value: players.to_string(),
                        inline: true,
                    },
                    EmbedField {
                        name: ADDRESS_FIELD.to_string(),
                        value: self.server_address.clone(),
                        inline: true,
                    },
                ];
                embed.thumbnail = self
                    .thumbnail_url
                    .as_ref()
                    .map(|url| EmbedImage { url: url.clone() });
            }
            StatusSnapshot::Offline => {
                embed.title = Some(format!("🔴 {OFFLINE_MARKER}"));
                embed.description = Some(self.greeting("the Minecraft server is **offline**."));
                embed.color = Some(OFFLINE_COLOR);
            }
            StatusSnapshot::Unknown => {
                embed.title = Some("⚪ Server Status Unknown".to_string());
                embed.color = Some(UNKNOWN_COLOR);
            }
        }
        embed
    }

    /// Text of the short-lived alert message sent on a transition.
    pub fn alert_text(&self, availability: Availability) -> String {
        match availability {
            Availability::Online => {
                format!("{} is now **online**!", self.server_address)
            }
            Availability::Offline => {
                format!("{} is now **offline**.", self.server_address)
            }
            Availability::Unknown => format!("{} status is unknown.", self.server_address),
        }
    }

    fn greeting(&self, text: &str) -> String {
        match &self.role_id {
            Some(role) => format!("Hey <@&{role}>, {text}"),
            None => {
                let mut chars = text.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect(),
                    None => String::new(),
                }
            }
        }
    }
}

/// Reads the status a notice embed displays.
///
/// Anything unexpected is an error rather than a best guess; callers treat
/// an error as "status unknown".
pub fn parse_notice(embed: &Embed) -> Result<StatusSnapshot, NoticeParseError> {
    let title = embed.title.as_deref().ok_or(NoticeParseError::MissingTitle)?;

    match (title.contains(ONLINE_MARKER), title.contains(OFFLINE_MARKER)) {
        (true, true) => Err(NoticeParseError::Ambiguous),
        (false, false) => Err(NoticeParseError::UnrecognizedTitle(title.to_string())),
        (false, true) => Ok(StatusSnapshot::Offline),
        (true, false) => {
            let mut counts = embed.fields.iter().filter(|f| f.name == PLAYERS_FIELD);
            let field = counts.next().ok_or(NoticeParseError::MissingPlayerCount)?;
            if counts.next().is_some() {
                return Err(NoticeParseError::Ambiguous);
            }
            let players = field
                .value
                .trim()
                .parse::<u32>()
                .map_err(|_| NoticeParseError::InvalidPlayerCount(field.value.clone()))?;
            Ok(StatusSnapshot::Online { players })
        }
    }
}
