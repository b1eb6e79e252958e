use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IceServerConfig {
    pub urls: Vec<String>,
    pub username: Option<String>,
    pub credential: Option<String>,
}

impl IceServerConfig {
    pub fn stun(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            username: None,
            credential: None,
        }
    }
}

/// Тип соединения, передаётся в поле `type` полезной нагрузки OFFER/ANSWER.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionKind {
    Media,
    Data,
}

impl ConnectionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Media => "media",
            Self::Data => "data",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        if raw.eq_ignore_ascii_case("media") {
            Some(Self::Media)
        } else if raw.eq_ignore_ascii_case("data") {
            Some(Self::Data)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MediaKinds {
    pub audio: bool,
    pub video: bool,
}

impl MediaKinds {
    pub const NONE: Self = Self {
        audio: false,
        video: false,
    };

    pub fn any(&self) -> bool {
        self.audio || self.video
    }
}

/// Откуда движок берёт локальный поток.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum MediaSource {
    #[default]
    LiveCapture,
    External {
        video_uri: Option<String>,
        audio_uri: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CodecPreferences {
    pub audio: Option<String>,
    pub video: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BitrateHints {
    pub audio_kbps: Option<u32>,
    pub video_kbps: Option<u32>,
}

impl BitrateHints {
    pub fn is_empty(&self) -> bool {
        self.audio_kbps.is_none() && self.video_kbps.is_none()
    }
}

/// Параметры одного соединения. Собирается до `call`/`answer` и дальше не меняется.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConnectionConfig {
    media: MediaKinds,
    source: MediaSource,
    codecs: CodecPreferences,
    bitrate: BitrateHints,
    ice_servers: Vec<IceServerConfig>,
}

impl ConnectionConfig {
    pub fn audio_video() -> Self {
        Self::default().with_media(MediaKinds {
            audio: true,
            video: true,
        })
    }

    pub fn audio_only() -> Self {
        Self::default().with_media(MediaKinds {
            audio: true,
            video: false,
        })
    }

    pub fn data_only() -> Self {
        Self::default()
    }

    pub fn with_media(mut self, media: MediaKinds) -> Self {
        self.media = media;
        self
    }

    pub fn with_source(mut self, source: MediaSource) -> Self {
        self.source = source;
        self
    }

    pub fn with_codecs(mut self, codecs: CodecPreferences) -> Self {
        self.codecs = codecs;
        self
    }

    pub fn with_bitrate(mut self, bitrate: BitrateHints) -> Self {
        self.bitrate = bitrate;
        self
    }

    pub fn with_ice_server(mut self, server: IceServerConfig) -> Self {
        self.ice_servers.push(server);
        self
    }

    pub fn media(&self) -> MediaKinds {
        self.media
    }

    pub fn source(&self) -> &MediaSource {
        &self.source
    }

    pub fn codecs(&self) -> &CodecPreferences {
        &self.codecs
    }

    pub fn bitrate(&self) -> BitrateHints {
        self.bitrate
    }

    pub fn ice_servers(&self) -> &[IceServerConfig] {
        &self.ice_servers
    }

    pub fn kind(&self) -> ConnectionKind {
        if self.media.any() {
            ConnectionKind::Media
        } else {
            ConnectionKind::Data
        }
    }
}
