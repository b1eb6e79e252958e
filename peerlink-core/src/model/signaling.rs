use crate::error::DecodeError;
use crate::model::connection::ConnectionKind;
use crate::model::peer::{ConnectionId, PeerId};
use crate::model::session_description::{IceCandidate, SdpType, SessionDescription};
use serde::Deserialize;
use serde_json::{Map, Value, json};

/// OFFER: удалённый пир предлагает новое соединение.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfferMessage {
    pub src: PeerId,
    pub dst: Option<PeerId>,
    pub connection_id: ConnectionId,
    pub kind: ConnectionKind,
    pub sdp: SessionDescription,
}

/// ANSWER на наш OFFER. `kind` старые клиенты не присылают.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerMessage {
    pub src: PeerId,
    pub dst: Option<PeerId>,
    pub connection_id: ConnectionId,
    pub kind: Option<ConnectionKind>,
    pub sdp: SessionDescription,
}

/// Один ICE-кандидат для уже известного соединения.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateMessage {
    pub src: PeerId,
    pub dst: Option<PeerId>,
    pub connection_id: ConnectionId,
    pub kind: Option<ConnectionKind>,
    pub candidate: IceCandidate,
}

/// Все сообщения, которыми клиент обменивается с сигнальным сервером.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalingMessage {
    Open { peer_id: Option<PeerId> },
    Close { src: Option<PeerId> },
    Error { reason: String },
    IdTaken,
    InvalidKey,
    Ping,
    Pong,
    Leave { src: Option<PeerId> },
    Expire { src: Option<PeerId> },
    Offer(OfferMessage),
    Answer(AnswerMessage),
    Candidate(CandidateMessage),
}

#[derive(Deserialize)]
struct Frame {
    #[serde(rename = "type")]
    tag: String,
    #[serde(default)]
    src: Option<String>,
    #[serde(default)]
    dst: Option<String>,
    #[serde(default)]
    payload: Option<Value>,
}

#[derive(Deserialize)]
struct RawDescription {
    #[serde(rename = "type", default)]
    sdp_type: Option<SdpType>,
    sdp: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DescriptionPayload {
    connection_id: String,
    #[serde(rename = "type", default)]
    kind: Option<String>,
    sdp: RawDescription,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CandidatePayload {
    connection_id: String,
    #[serde(rename = "type", default)]
    kind: Option<String>,
    candidate: IceCandidate,
}

#[derive(Deserialize)]
struct ErrorPayload {
    #[serde(default)]
    msg: Option<String>,
}

fn peer(raw: Option<String>) -> Option<PeerId> {
    raw.filter(|s| !s.is_empty()).map(PeerId::from)
}

fn put_peer(frame: &mut Map<String, Value>, key: &str, id: Option<&PeerId>) {
    if let Some(id) = id {
        frame.insert(key.to_owned(), Value::from(id.as_str()));
    }
}

impl SignalingMessage {
    pub const OPEN: &'static str = "OPEN";
    pub const CLOSE: &'static str = "CLOSE";
    pub const ERROR: &'static str = "ERROR";
    pub const ID_TAKEN: &'static str = "ID-TAKEN";
    pub const INVALID_KEY: &'static str = "INVALID-KEY";
    pub const PING: &'static str = "PING";
    pub const PONG: &'static str = "PONG";
    pub const LEAVE: &'static str = "LEAVE";
    pub const EXPIRE: &'static str = "EXPIRE";
    pub const OFFER: &'static str = "OFFER";
    pub const ANSWER: &'static str = "ANSWER";
    pub const CANDIDATE: &'static str = "CANDIDATE";

    pub fn tag(&self) -> &'static str {
        match self {
            Self::Open { .. } => Self::OPEN,
            Self::Close { .. } => Self::CLOSE,
            Self::Error { .. } => Self::ERROR,
            Self::IdTaken => Self::ID_TAKEN,
            Self::InvalidKey => Self::INVALID_KEY,
            Self::Ping => Self::PING,
            Self::Pong => Self::PONG,
            Self::Leave { .. } => Self::LEAVE,
            Self::Expire { .. } => Self::EXPIRE,
            Self::Offer(_) => Self::OFFER,
            Self::Answer(_) => Self::ANSWER,
            Self::Candidate(_) => Self::CANDIDATE,
        }
    }

    /// Remote peer a routed message came from, if the frame names one.
    pub fn source(&self) -> Option<&PeerId> {
        match self {
            Self::Offer(m) => Some(&m.src),
            Self::Answer(m) => Some(&m.src),
            Self::Candidate(m) => Some(&m.src),
            Self::Close { src } | Self::Leave { src } | Self::Expire { src } => src.as_ref(),
            _ => None,
        }
    }

    pub fn decode(raw: &str) -> Result<Self, DecodeError> {
        let frame: Frame = serde_json::from_str(raw)?;
        let tag = frame.tag.to_ascii_uppercase();

        let message = match tag.as_str() {
            Self::OPEN => Self::Open {
                peer_id: peer(frame.dst),
            },
            Self::CLOSE => Self::Close {
                src: peer(frame.src),
            },
            Self::ERROR => {
                let reason = match frame.payload {
                    Some(payload) => serde_json::from_value::<ErrorPayload>(payload)
                        .ok()
                        .and_then(|p| p.msg),
                    None => None,
                };
                Self::Error {
                    reason: reason.unwrap_or_default(),
                }
            }
            Self::ID_TAKEN => Self::IdTaken,
            Self::INVALID_KEY => Self::InvalidKey,
            Self::PING => Self::Ping,
            Self::PONG => Self::Pong,
            Self::LEAVE => Self::Leave {
                src: peer(frame.src),
            },
            Self::EXPIRE => Self::Expire {
                src: peer(frame.src),
            },
            Self::OFFER => {
                let src = peer(frame.src).ok_or(DecodeError::MissingSource(Self::OFFER))?;
                let payload = frame
                    .payload
                    .ok_or(DecodeError::MissingPayload(Self::OFFER))?;
                let payload: DescriptionPayload = serde_json::from_value(payload)?;
                Self::Offer(OfferMessage {
                    src,
                    dst: peer(frame.dst),
                    connection_id: ConnectionId::from(payload.connection_id),
                    kind: payload
                        .kind
                        .as_deref()
                        .and_then(ConnectionKind::parse)
                        .unwrap_or(ConnectionKind::Media),
                    sdp: SessionDescription {
                        sdp_type: payload.sdp.sdp_type.unwrap_or(SdpType::Offer),
                        sdp: payload.sdp.sdp,
                    },
                })
            }
            Self::ANSWER => {
                let src = peer(frame.src).ok_or(DecodeError::MissingSource(Self::ANSWER))?;
                let payload = frame
                    .payload
                    .ok_or(DecodeError::MissingPayload(Self::ANSWER))?;
                let payload: DescriptionPayload = serde_json::from_value(payload)?;
                Self::Answer(AnswerMessage {
                    src,
                    dst: peer(frame.dst),
                    connection_id: ConnectionId::from(payload.connection_id),
                    kind: payload.kind.as_deref().and_then(ConnectionKind::parse),
                    sdp: SessionDescription {
                        sdp_type: payload.sdp.sdp_type.unwrap_or(SdpType::Answer),
                        sdp: payload.sdp.sdp,
                    },
                })
            }
            Self::CANDIDATE => {
                let src = peer(frame.src).ok_or(DecodeError::MissingSource(Self::CANDIDATE))?;
                let payload = frame
                    .payload
                    .ok_or(DecodeError::MissingPayload(Self::CANDIDATE))?;
                let payload: CandidatePayload = serde_json::from_value(payload)?;
                Self::Candidate(CandidateMessage {
                    src,
                    dst: peer(frame.dst),
                    connection_id: ConnectionId::from(payload.connection_id),
                    kind: payload.kind.as_deref().and_then(ConnectionKind::parse),
                    candidate: payload.candidate,
                })
            }
            _ => return Err(DecodeError::UnknownType(frame.tag)),
        };

        Ok(message)
    }

    pub fn encode(&self) -> String {
        let mut frame = Map::new();
        frame.insert("type".into(), Value::from(self.tag()));

        match self {
            Self::Open { peer_id } => put_peer(&mut frame, "dst", peer_id.as_ref()),
            Self::Close { src } | Self::Leave { src } | Self::Expire { src } => {
                put_peer(&mut frame, "src", src.as_ref())
            }
            Self::Error { reason } => {
                frame.insert("payload".into(), json!({ "msg": reason }));
            }
            Self::IdTaken | Self::InvalidKey | Self::Ping | Self::Pong => {}
            Self::Offer(m) => {
                put_peer(&mut frame, "src", Some(&m.src));
                put_peer(&mut frame, "dst", m.dst.as_ref());
                frame.insert(
                    "payload".into(),
                    json!({
                        "connectionId": m.connection_id.as_str(),
                        "type": m.kind.as_str(),
                        "sdp": { "type": m.sdp.sdp_type.as_str(), "sdp": m.sdp.sdp },
                    }),
                );
            }
            Self::Answer(m) => {
                put_peer(&mut frame, "src", Some(&m.src));
                put_peer(&mut frame, "dst", m.dst.as_ref());
                let mut payload = json!({
                    "connectionId": m.connection_id.as_str(),
                    "sdp": { "type": m.sdp.sdp_type.as_str(), "sdp": m.sdp.sdp },
                });
                if let (Some(kind), Some(obj)) = (m.kind, payload.as_object_mut()) {
                    obj.insert("type".into(), Value::from(kind.as_str()));
                }
                frame.insert("payload".into(), payload);
            }
            Self::Candidate(m) => {
                put_peer(&mut frame, "src", Some(&m.src));
                put_peer(&mut frame, "dst", m.dst.as_ref());
                let mut candidate = json!({ "candidate": m.candidate.candidate });
                if let Some(obj) = candidate.as_object_mut() {
                    if let Some(mid) = &m.candidate.sdp_mid {
                        obj.insert("sdpMid".into(), Value::from(mid.as_str()));
                    }
                    if let Some(index) = m.candidate.sdp_m_line_index {
                        obj.insert("sdpMLineIndex".into(), Value::from(index));
                    }
                }
                let mut payload = json!({
                    "connectionId": m.connection_id.as_str(),
                    "candidate": candidate,
                });
                if let (Some(kind), Some(obj)) = (m.kind, payload.as_object_mut()) {
                    obj.insert("type".into(), Value::from(kind.as_str()));
                }
                frame.insert("payload".into(), payload);
            }
        }

        Value::Object(frame).to_string()
    }
}
