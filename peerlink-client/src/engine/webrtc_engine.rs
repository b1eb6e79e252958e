use crate::connection::{ConnectivityState, Direction};
use crate::engine::engine_config::EngineConfig;
use crate::engine::engine_event::{EngineEvent, EngineEventSink, StreamHandle};
use crate::engine::media_engine::{MediaConstraints, MediaEngine, MediaSession, SessionSpec};
use crate::error::EngineError;
use async_trait::async_trait;
use peerlink_core::{ConnectionConfig, ConnectionKind, IceCandidate, SdpType, SessionDescription};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use webrtc::api::APIBuilder;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{
    MIME_TYPE_H264, MIME_TYPE_OPUS, MIME_TYPE_VP8, MediaEngine as RtcMediaEngine,
};
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::rtp_transceiver::RTCRtpTransceiver;
use webrtc::rtp_transceiver::RTCRtpTransceiverInit;
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTPCodecType};
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::rtp_sender::RTCRtpSender;
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_remote::TrackRemote;

/// `MediaEngine` поверх крейта `webrtc`: одна `RTCPeerConnection` на соединение.
#[derive(Clone, Default)]
pub struct WebRtcEngine {
    config: EngineConfig,
}

impl WebRtcEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    fn ice_servers(&self, connection: &ConnectionConfig) -> Vec<RTCIceServer> {
        let servers = if connection.ice_servers().is_empty() {
            self.config.ice_servers.as_slice()
        } else {
            connection.ice_servers()
        };

        servers
            .iter()
            .map(|s| RTCIceServer {
                urls: s.urls.clone(),
                username: s.username.clone().unwrap_or_default(),
                credential: s.credential.clone().unwrap_or_default(),
            })
            .collect()
    }
}

#[async_trait]
impl MediaEngine for WebRtcEngine {
    async fn create_session(
        &self,
        spec: &SessionSpec,
        sink: EngineEventSink,
    ) -> Result<Box<dyn MediaSession>, EngineError> {
        // Кодеки регистрируются всегда, даже для data соединений
        let mut m = RtcMediaEngine::default();
        m.register_default_codecs()?;
        let registry = register_default_interceptors(Registry::new(), &mut m)?;

        let api = APIBuilder::new()
            .with_media_engine(m)
            .with_interceptor_registry(registry)
            .build();

        let rtc_config = RTCConfiguration {
            ice_servers: self.ice_servers(&spec.config),
            ..Default::default()
        };

        let peer_connection = Arc::new(api.new_peer_connection(rtc_config).await?);

        // A. Состояние ICE
        let state_sink = sink.clone();
        peer_connection.on_ice_connection_state_change(Box::new(
            move |s: RTCIceConnectionState| {
                let sink = state_sink.clone();

                Box::pin(async move {
                    info!("ICE state changed for {}: {:?}", sink.peer_id(), s);
                    let state = match s {
                        RTCIceConnectionState::New => ConnectivityState::New,
                        RTCIceConnectionState::Checking => ConnectivityState::Checking,
                        RTCIceConnectionState::Connected => ConnectivityState::Connected,
                        RTCIceConnectionState::Completed => ConnectivityState::Completed,
                        RTCIceConnectionState::Disconnected => ConnectivityState::Disconnected,
                        RTCIceConnectionState::Failed => ConnectivityState::Failed,
                        RTCIceConnectionState::Closed => ConnectivityState::Closed,
                        _ => return,
                    };
                    sink.emit(EngineEvent::ConnectivityChanged(state)).await;
                })
            },
        ));

        // B. Trickle ICE: локальные кандидаты уходят удалённому пиру
        let ice_sink = sink.clone();
        peer_connection.on_ice_candidate(Box::new(move |c: Option<RTCIceCandidate>| {
            let sink = ice_sink.clone();

            Box::pin(async move {
                let Some(candidate) = c else { return };
                let Ok(init) = candidate.to_json() else {
                    return;
                };
                sink.emit(EngineEvent::LocalCandidate(IceCandidate {
                    candidate: init.candidate,
                    sdp_mid: init.sdp_mid,
                    sdp_m_line_index: init.sdp_mline_index,
                }))
                .await;
            })
        }));

        // C. Удалённые треки; поток считается снятым, когда трек перестаёт читаться
        let track_sink = sink.clone();
        peer_connection.on_track(Box::new(
            move |track: Arc<TrackRemote>,
                  _receiver: Arc<RTCRtpReceiver>,
                  _transceiver: Arc<RTCRtpTransceiver>| {
                let sink = track_sink.clone();

                Box::pin(async move {
                    let handle = StreamHandle {
                        id: track.stream_id(),
                        local: false,
                    };
                    debug!("Remote track {} on stream {}", track.id(), handle.id);
                    sink.emit(EngineEvent::StreamAdded(handle.clone())).await;

                    tokio::spawn(async move {
                        while track.read_rtp().await.is_ok() {}
                        sink.emit(EngineEvent::StreamRemoved(handle)).await;
                    });
                })
            },
        ));

        if spec.config.kind() == ConnectionKind::Data && spec.direction == Direction::Outbound {
            peer_connection.create_data_channel("data", None).await?;
        }

        Ok(Box::new(WebRtcSession {
            peer_connection,
            local: Mutex::new(LocalTracks::default()),
            stream_id: format!("peerlink-{}", spec.connection_id),
        }))
    }
}

#[derive(Default)]
struct LocalTracks {
    senders: Vec<Arc<RTCRtpSender>>,
    audio: bool,
    video: bool,
}

pub struct WebRtcSession {
    peer_connection: Arc<RTCPeerConnection>,
    local: Mutex<LocalTracks>,
    stream_id: String,
}

impl WebRtcSession {
    fn to_rtc(desc: &SessionDescription) -> Result<RTCSessionDescription, EngineError> {
        let rtc = match desc.sdp_type {
            SdpType::Offer => RTCSessionDescription::offer(desc.sdp.clone())?,
            SdpType::Answer => RTCSessionDescription::answer(desc.sdp.clone())?,
            SdpType::Pranswer => RTCSessionDescription::pranswer(desc.sdp.clone())?,
            SdpType::Rollback => {
                return Err(EngineError::Other("rollback is not supported".to_owned()));
            }
        };
        Ok(rtc)
    }

    async fn add_receiver(&self, kind: RTPCodecType) -> Result<(), EngineError> {
        self.peer_connection
            .add_transceiver_from_kind(
                kind,
                Some(RTCRtpTransceiverInit {
                    direction: RTCRtpTransceiverDirection::Recvonly,
                    send_encodings: vec![],
                }),
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl MediaSession for WebRtcSession {
    async fn create_local_description(
        &self,
        sdp_type: SdpType,
        constraints: &MediaConstraints,
    ) -> Result<SessionDescription, EngineError> {
        let desc = match sdp_type {
            SdpType::Offer => {
                let (audio, video) = {
                    let local = self.local.lock().await;
                    (local.audio, local.video)
                };
                if constraints.receive_audio && !audio {
                    self.add_receiver(RTPCodecType::Audio).await?;
                }
                if constraints.receive_video && !video {
                    self.add_receiver(RTPCodecType::Video).await?;
                }
                self.peer_connection.create_offer(None).await?
            }
            SdpType::Answer => self.peer_connection.create_answer(None).await?,
            other => {
                return Err(EngineError::Other(format!(
                    "cannot create a local {} description",
                    other.as_str()
                )));
            }
        };

        Ok(SessionDescription {
            sdp_type,
            sdp: desc.sdp,
        })
    }

    async fn set_local_description(&self, desc: &SessionDescription) -> Result<(), EngineError> {
        self.peer_connection
            .set_local_description(Self::to_rtc(desc)?)
            .await?;
        Ok(())
    }

    async fn set_remote_description(
        &self,
        desc: &SessionDescription,
    ) -> Result<(), EngineError> {
        self.peer_connection
            .set_remote_description(Self::to_rtc(desc)?)
            .await?;
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: &IceCandidate) -> Result<(), EngineError> {
        let init = RTCIceCandidateInit {
            candidate: candidate.candidate.clone(),
            sdp_mid: candidate.sdp_mid.clone(),
            sdp_mline_index: candidate.sdp_m_line_index,
            ..Default::default()
        };
        self.peer_connection.add_ice_candidate(init).await?;
        Ok(())
    }

    async fn attach_local_stream(
        &self,
        config: &ConnectionConfig,
    ) -> Result<Option<StreamHandle>, EngineError> {
        let media = config.media();
        if !media.any() {
            return Ok(None);
        }

        let mut local = self.local.lock().await;

        if media.audio && !local.audio {
            let track = Arc::new(TrackLocalStaticSample::new(
                RTCRtpCodecCapability {
                    mime_type: MIME_TYPE_OPUS.to_owned(),
                    ..Default::default()
                },
                "audio".to_owned(),
                self.stream_id.clone(),
            ));
            let sender = self
                .peer_connection
                .add_track(track as Arc<dyn TrackLocal + Send + Sync>)
                .await?;
            local.senders.push(sender);
            local.audio = true;
        }

        if media.video && !local.video {
            let mime = match config.codecs().video.as_deref() {
                Some(codec) if codec.eq_ignore_ascii_case("VP8") => MIME_TYPE_VP8,
                _ => MIME_TYPE_H264,
            };
            let track = Arc::new(TrackLocalStaticSample::new(
                RTCRtpCodecCapability {
                    mime_type: mime.to_owned(),
                    ..Default::default()
                },
                "video".to_owned(),
                self.stream_id.clone(),
            ));
            let sender = self
                .peer_connection
                .add_track(track as Arc<dyn TrackLocal + Send + Sync>)
                .await?;
            local.senders.push(sender);
            local.video = true;
        }

        Ok(Some(StreamHandle {
            id: self.stream_id.clone(),
            local: true,
        }))
    }

    async fn release_stream(&self, stream: &StreamHandle) {
        if !stream.local {
            return;
        }

        let senders = std::mem::take(&mut self.local.lock().await.senders);
        for sender in senders {
            if let Err(e) = self.peer_connection.remove_track(&sender).await {
                warn!("Failed to remove local track: {}", e);
            }
        }
    }

    async fn dispose(&self) {
        if let Err(e) = self.peer_connection.close().await {
            warn!("Failed to close peer connection: {}", e);
        }
    }
}
