use std::fmt::Display;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static! {
    static ref STEAM_LOGIN_RE: Regex = Regex::new(r"^[a-zA-Z0-9]+$").unwrap();
    static ref STEAM_PROFILE_RE: Regex = Regex::new(
        r"^https?://(www\.)?steamcommunity\.com/(id/[a-zA-Z0-9_-]{2,32}|profiles/\d{17})/?$"
    )
    .unwrap();
    static ref GAME_PASS_URL_RE: Regex =
        Regex::new(r"^https?://(www\.)?roblox\.com/game-pass/(?<id>\d+)(/.*)?$").unwrap();
    static ref GAME_PASS_ID_RE: Regex = Regex::new(r"^\d{1,19}$").unwrap();
    static ref USERNAME_RE: Regex =
        Regex::new(r"^(@|https?://t\.me/)?(?<name>[a-zA-Z][a-zA-Z0-9_]{4,31})$").unwrap();
}

/// How a delivery target looks for a given service.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TargetKind {
    SteamLogin,
    /// Any `http(s)` link to one of `hosts`; an empty list accepts every host.
    Link {
        #[serde(default)]
        hosts: Vec<String>,
    },
    SteamProfile,
    GamePassId,
    Username,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TargetError {
    Empty,
    Format(&'static str),
    Scheme,
    Host(String),
}

impl Display for TargetError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TargetError::Empty => write!(f, "The message is empty."),
            TargetError::Format(expected) => write!(f, "Expected {}.", expected),
            TargetError::Scheme => write!(f, "The link must start with http:// or https://."),
            TargetError::Host(host) => write!(f, "Links to {} are not accepted.", host),
        }
    }
}

impl std::error::Error for TargetError {}

impl TargetKind {
    /// Checks `text` and returns the normalized target.
    pub fn validate(&self, text: &str) -> Result<String, TargetError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(TargetError::Empty);
        }

        match self {
            TargetKind::SteamLogin => STEAM_LOGIN_RE
                .is_match(text)
                .then(|| text.to_owned())
                .ok_or(TargetError::Format("latin letters and digits only")),
            TargetKind::Link { hosts } => validate_link(text, hosts),
            TargetKind::SteamProfile => STEAM_PROFILE_RE
                .is_match(text)
                .then(|| text.to_owned())
                .ok_or(TargetError::Format(
                    "a steamcommunity.com/id/... or /profiles/... link",
                )),
            TargetKind::GamePassId => {
                if GAME_PASS_ID_RE.is_match(text) {
                    return Ok(text.to_owned());
                }
                GAME_PASS_URL_RE
                    .captures(text)
                    .and_then(|c| c.name("id"))
                    .map(|id| id.as_str().to_owned())
                    .ok_or(TargetError::Format("a numeric Game Pass id or link"))
            }
            TargetKind::Username => USERNAME_RE
                .captures(text)
                .and_then(|c| c.name("name"))
                .map(|name| format!("@{}", name.as_str()))
                .ok_or(TargetError::Format("a username like @name")),
        }
    }

    /// Human name of the target used in buyer messages.
    pub fn display_name(&self) -> &'static str {
        match self {
            TargetKind::SteamLogin => "Steam login",
            TargetKind::Link { .. } => "link",
            TargetKind::SteamProfile => "Steam profile link",
            TargetKind::GamePassId => "Game Pass id",
            TargetKind::Username => "username",
        }
    }

    /// Parses the operator notation: `steam_login`, `link:vk.com,t.me`,
    /// `steam_profile`, `game_pass`, `username`.
    pub fn from_notation(s: &str) -> Option<Self> {
        let s = s.trim();
        let (kind, args) = match s.split_once(':') {
            Some((kind, args)) => (kind.trim(), Some(args)),
            None => (s, None),
        };

        match kind.to_lowercase().as_str() {
            "steam_login" => Some(TargetKind::SteamLogin),
            "link" => Some(TargetKind::Link {
                hosts: args
                    .map(|a| {
                        a.split(',')
                            .map(|h| h.trim().to_lowercase())
                            .filter(|h| !h.is_empty())
                            .collect()
                    })
                    .unwrap_or_default(),
            }),
            "steam_profile" => Some(TargetKind::SteamProfile),
            "game_pass" | "game_pass_id" => Some(TargetKind::GamePassId),
            "username" => Some(TargetKind::Username),
            _ => None,
        }
    }
}

fn validate_link(text: &str, hosts: &[String]) -> Result<String, TargetError> {
    let rest = text
        .strip_prefix("https://")
        .or_else(|| text.strip_prefix("http://"))
        .ok_or(TargetError::Scheme)?;

    if rest.chars().any(char::is_whitespace) {
        return Err(TargetError::Format("a single link without spaces"));
    }

    let host = rest
        .split(|c| c == '/' || c == '?' || c == '#')
        .next()
        .unwrap_or_default()
        .to_lowercase();

    if host.is_empty() {
        return Err(TargetError::Format("a link with a host"));
    }

    let allowed = hosts.is_empty()
        || hosts
            .iter()
            .any(|h| host == *h || host.ends_with(&format!(".{}", h)));

    if allowed {
        Ok(text.to_owned())
    } else {
        Err(TargetError::Host(host))
    }
}
