use crate::signaling::ReconnectPolicy;
use peerlink_core::PeerId;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Адрес rendezvous/signaling сервера.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub secure: bool,
    pub path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.peerjs.com".to_owned(),
            port: 443,
            secure: true,
            path: "/".to_owned(),
        }
    }
}

impl ServerConfig {
    fn base(&self, scheme: &str) -> String {
        let path = self.path.trim_end_matches('/');
        format!("{scheme}://{}:{}{path}", self.host, self.port)
    }

    fn http_base(&self) -> String {
        self.base(if self.secure { "https" } else { "http" })
    }

    fn ws_base(&self) -> String {
        self.base(if self.secure { "wss" } else { "ws" })
    }

    /// `GET {http}/{key}/id?ts=<ts>`
    pub fn identity_url(&self, api_key: &str) -> String {
        format!("{}/{api_key}/id?ts={}", self.http_base(), timestamp_token())
    }

    /// `GET {http}/active/list/{key}`
    pub fn discovery_url(&self, api_key: &str) -> String {
        format!("{}/active/list/{api_key}", self.http_base())
    }

    /// `{ws}/peerjs?key=&id=&token=`
    pub fn channel_url(&self, api_key: &str, peer_id: &PeerId, token: &str) -> String {
        format!(
            "{}/peerjs?key={api_key}&id={peer_id}&token={token}",
            self.ws_base()
        )
    }
}

/// Cache-busting value for the identity request: unix millis plus a random suffix.
fn timestamp_token() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    let suffix = Uuid::new_v4().as_u128() % 1_000_000;
    format!("{millis}{suffix}")
}

/// 16-char token sent with the channel URL.
pub fn random_token() -> String {
    Uuid::new_v4().simple().to_string()[..16].to_owned()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub server: ServerConfig,
    pub api_key: String,
    /// Sent as `Origin` on rendezvous requests when set.
    pub origin: Option<String>,
    #[serde(with = "millis")]
    pub identity_timeout: Duration,
    #[serde(with = "millis")]
    pub open_timeout: Duration,
    #[serde(with = "millis")]
    pub send_spacing: Duration,
    pub reconnect: ReconnectPolicy,
    /// Capacity of the internal command and event queues.
    pub event_buffer: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            api_key: "peerjs".to_owned(),
            origin: None,
            identity_timeout: Duration::from_millis(25_000),
            open_timeout: Duration::from_millis(30_000),
            send_spacing: Duration::from_millis(100),
            reconnect: ReconnectPolicy::default(),
            event_buffer: 256,
        }
    }
}

impl SessionConfig {
    pub fn new(server: ServerConfig, api_key: impl Into<String>) -> Self {
        Self {
            server,
            api_key: api_key.into(),
            ..Self::default()
        }
    }
}

pub(crate) mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
