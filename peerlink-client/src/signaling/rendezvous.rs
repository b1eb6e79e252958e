use crate::config::{ServerConfig, SessionConfig};
use crate::error::RendezvousError;
use async_trait::async_trait;
use peerlink_core::PeerId;
use reqwest::header::ORIGIN;
use serde::Deserialize;
use tracing::debug;

/// Идентификатор, выданный rendezvous-сервером.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub peer_id: PeerId,
    pub credential: Option<String>,
}

/// HTTP часть rendezvous-сервиса: выдача id и список активных пиров.
#[async_trait]
pub trait RendezvousService: Send + Sync {
    async fn acquire_identity(&self) -> Result<Identity, RendezvousError>;

    async fn list_peers(&self) -> Result<Vec<PeerId>, RendezvousError>;
}

#[derive(Deserialize)]
struct IdentityBody {
    id: String,
    #[serde(default)]
    credential: Option<String>,
}

/// The identity body is either `{"id", "credential"}`, a JSON string or a bare id.
fn parse_identity(body: &str) -> Result<Identity, RendezvousError> {
    let body = body.trim();

    let (id, credential) = if body.starts_with('{') {
        let parsed: IdentityBody = serde_json::from_str(body)?;
        (parsed.id, parsed.credential)
    } else if body.starts_with('"') {
        (serde_json::from_str::<String>(body)?, None)
    } else {
        (body.to_owned(), None)
    };

    if id.trim().is_empty() {
        return Err(RendezvousError::EmptyIdentity);
    }

    Ok(Identity {
        peer_id: PeerId::from(id.trim()),
        credential: credential.filter(|c| !c.is_empty()),
    })
}

pub struct HttpRendezvous {
    client: reqwest::Client,
    server: ServerConfig,
    api_key: String,
    origin: Option<String>,
}

impl HttpRendezvous {
    pub fn new(config: &SessionConfig) -> Result<Self, RendezvousError> {
        let client = reqwest::Client::builder()
            .timeout(config.identity_timeout)
            .build()?;

        Ok(Self {
            client,
            server: config.server.clone(),
            api_key: config.api_key.clone(),
            origin: config.origin.clone(),
        })
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response, RendezvousError> {
        let mut request = self.client.get(url);
        if let Some(origin) = &self.origin {
            request = request.header(ORIGIN, origin);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(RendezvousError::Status(status.as_u16()));
        }
        Ok(response)
    }
}

#[async_trait]
impl RendezvousService for HttpRendezvous {
    async fn acquire_identity(&self) -> Result<Identity, RendezvousError> {
        let url = self.server.identity_url(&self.api_key);
        debug!("Requesting identity from {}", url);

        let body = self.get(&url).await?.text().await?;
        parse_identity(&body)
    }

    async fn list_peers(&self) -> Result<Vec<PeerId>, RendezvousError> {
        let url = self.server.discovery_url(&self.api_key);
        debug!("Requesting peer list from {}", url);

        let ids: Vec<String> = self.get(&url).await?.json().await?;
        Ok(ids.into_iter().map(PeerId::from).collect())
    }
}
