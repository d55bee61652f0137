use std::sync::Arc;

use async_trait::async_trait;
use ffmpeg_ivf::MediaSample;
use futures::future::BoxFuture;
use tokio::task::JoinHandle;
use webrtc::api::APIBuilder;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MIME_TYPE_VP8, MediaEngine};
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::media::Sample;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

use super::{
    IceCandidate, IceCandidateHandler, Negotiator, NegotiatorFactory, SampleSink, SdpType,
    SessionDescription,
};

/// Creates one `RTCPeerConnection` with a single VP8 video track per offer.
pub struct WebRtcFactory {
    ice_servers: Vec<String>,
}

impl WebRtcFactory {
    pub fn new(ice_servers: Vec<String>) -> Self {
        Self { ice_servers }
    }
}

#[async_trait]
impl NegotiatorFactory for WebRtcFactory {
    async fn create(&self) -> anyhow::Result<Box<dyn Negotiator>> {
        Ok(Box::new(WebRtcPeer::new(&self.ice_servers).await?))
    }
}

pub struct WebRtcPeer {
    pc: Arc<RTCPeerConnection>,
    track: Arc<TrackLocalStaticSample>,
    rtcp_task: JoinHandle<()>,
}

impl WebRtcPeer {
    pub async fn new(ice_servers: &[String]) -> anyhow::Result<Self> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs()?;
        let registry = register_default_interceptors(Registry::new(), &mut media_engine)?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let mut config = RTCConfiguration::default();
        if !ice_servers.is_empty() {
            config.ice_servers = vec![RTCIceServer {
                urls: ice_servers.to_vec(),
                ..Default::default()
            }];
        }
        let pc = Arc::new(api.new_peer_connection(config).await?);

        let track = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_VP8.to_owned(),
                ..Default::default()
            },
            "video".to_owned(),
            "lite-rtc".to_owned(),
        ));
        let rtp_sender = pc
            .add_track(Arc::clone(&track) as Arc<dyn TrackLocal + Send + Sync>)
            .await?;

        // RTCP has to be read for the interceptors (NACK, reports) to run.
        let rtcp_task = tokio::spawn(async move {
            let mut buf = vec![0u8; 1500];
            while let Ok((_, _)) = rtp_sender.read(&mut buf).await {}
        });

        pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
            log::info!("Peer: connection state {}", state);
            Box::pin(async {})
        }));

        Ok(Self {
            pc,
            track,
            rtcp_task,
        })
    }
}

impl Drop for WebRtcPeer {
    fn drop(&mut self) {
        self.rtcp_task.abort();
    }
}

#[async_trait]
impl Negotiator for WebRtcPeer {
    async fn set_remote_description(&self, desc: SessionDescription) -> anyhow::Result<()> {
        self.pc.set_remote_description(to_rtc(desc)?).await?;
        Ok(())
    }

    async fn create_answer(&self) -> anyhow::Result<SessionDescription> {
        let answer = self.pc.create_answer(None).await?;
        from_rtc(&answer)
    }

    async fn set_local_description(&self, desc: SessionDescription) -> anyhow::Result<()> {
        self.pc.set_local_description(to_rtc(desc)?).await?;
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> anyhow::Result<()> {
        self.pc
            .add_ice_candidate(RTCIceCandidateInit {
                candidate: candidate.candidate,
                sdp_mid: candidate.sdp_mid,
                sdp_mline_index: candidate.sdp_mline_index,
                username_fragment: candidate.username_fragment,
            })
            .await?;
        Ok(())
    }

    fn on_ice_candidate(&self, handler: IceCandidateHandler) {
        let handler: Arc<dyn Fn(IceCandidate) -> BoxFuture<'static, ()> + Send + Sync> =
            Arc::from(handler);
        self.pc
            .on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
                let handler = Arc::clone(&handler);
                Box::pin(async move {
                    // None marks the end of gathering
                    let Some(candidate) = candidate else {
                        log::debug!("Peer: ice gathering complete");
                        return;
                    };
                    match candidate.to_json() {
                        Ok(init) => {
                            let candidate = IceCandidate {
                                candidate: init.candidate,
                                sdp_mid: init.sdp_mid,
                                sdp_mline_index: init.sdp_mline_index,
                                username_fragment: init.username_fragment,
                            };
                            handler.as_ref()(candidate).await;
                        }
                        Err(e) => log::warn!("Peer: candidate to_json failed: {}", e),
                    }
                })
            }));
    }

    fn video_sink(&self) -> Arc<dyn SampleSink> {
        Arc::new(TrackSink(Arc::clone(&self.track)))
    }

    async fn close(&self) -> anyhow::Result<()> {
        self.pc.close().await?;
        Ok(())
    }
}

struct TrackSink(Arc<TrackLocalStaticSample>);

#[async_trait]
impl SampleSink for TrackSink {
    async fn write_sample(&self, sample: MediaSample) -> anyhow::Result<()> {
        self.0
            .write_sample(&Sample {
                data: sample.data,
                duration: sample.duration,
                ..Default::default()
            })
            .await?;
        Ok(())
    }
}

fn to_rtc(desc: SessionDescription) -> anyhow::Result<RTCSessionDescription> {
    let desc = match desc.kind {
        SdpType::Offer => RTCSessionDescription::offer(desc.sdp)?,
        SdpType::Answer => RTCSessionDescription::answer(desc.sdp)?,
        SdpType::Pranswer => RTCSessionDescription::pranswer(desc.sdp)?,
        SdpType::Rollback => anyhow::bail!("rollback descriptions are not supported"),
    };
    Ok(desc)
}

fn from_rtc(desc: &RTCSessionDescription) -> anyhow::Result<SessionDescription> {
    let kind = match desc.sdp_type {
        RTCSdpType::Offer => SdpType::Offer,
        RTCSdpType::Answer => SdpType::Answer,
        RTCSdpType::Pranswer => SdpType::Pranswer,
        RTCSdpType::Rollback => SdpType::Rollback,
        RTCSdpType::Unspecified => anyhow::bail!("unspecified sdp type"),
    };
    Ok(SessionDescription {
        kind,
        sdp: desc.sdp.clone(),
    })
}
