// author: kodeholic (powered by Claude)
// ICE-Lite answerer — 기본 MediaEngine 구현
//
// 브라우저 offer를 파싱해서 필요한 라인만 추출 후 서버 answer를 조립한다.
// webrtc-sdp 크레이트 대신 직접 조립 — 버전 호환성 문제 방지.
//
// 이 어댑터는 시그널링 플레인만 담당한다:
//   - 자체서명 인증서 fingerprint + 서버 ICE 자격으로 answer 생성
//   - a=setup:passive, ICE-Lite host candidate 1개 (co-located 미디어 포트)
// DTLS/SRTP 종단과 디코딩은 외부 미디어 플레인 몫이므로
// 트랙/Connected 이벤트는 이 구현에서 발생하지 않는다.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, trace};

use crate::config;
use crate::error::{ProctorError, ProctorResult};
use crate::media::engine::{
    EngineConnState, EngineEvent, IceConfig, MediaConnection, MediaEngine, SessionDescription,
    VideoTap,
};
use crate::protocol::candidate::CandidateParams;
use crate::utils::current_timestamp;

// ----------------------------------------------------------------------------
// [ServerCert] — 자체서명 인증서, 프로세스 시작 시 1회 생성
// ----------------------------------------------------------------------------

pub struct ServerCert {
    /// 외부 미디어 플레인이 DTLS 종단에 쓰는 인증서
    pub dtls_cert:   dtls::crypto::Certificate,
    /// SDP a=fingerprint 값 ("sha-256 AA:BB:...")
    pub fingerprint: String,
}

impl ServerCert {
    pub fn generate() -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let dtls_cert = dtls::crypto::Certificate::generate_self_signed(
            vec!["mini-proctor".to_string()]
        )?;

        let cert_der: Vec<u8> = dtls_cert.certificate
            .first()
            .map(|c| c.to_vec())
            .unwrap_or_default();

        let fingerprint = sha256_fingerprint(&cert_der);
        info!("[answerer] Server cert generated. fingerprint={:.47}...", fingerprint);

        Ok(Self { dtls_cert, fingerprint })
    }
}

fn sha256_fingerprint(der: &[u8]) -> String {
    let digest = Sha256::digest(der);
    let hex: Vec<String> = digest.iter().map(|b| format!("{:02X}", b)).collect();
    format!("sha-256 {}", hex.join(":"))
}

/// ICE ufrag/pwd용 랜덤 문자열 생성 (alphanumeric)
/// - ufrag: 16자 (RFC 8445 범위 4~256)
/// - pwd:   22자 (RFC 최솟값 준수)
pub fn random_ice_string(len: usize) -> String {
    use rand::Rng;
    let charset: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| charset[rng.gen_range(0..charset.len())] as char)
        .collect()
}

/// 라우팅 테이블 기반 로컬 IP 자동 감지
/// UDP 소켓으로 8.8.8.8:80 connect (실제 패킷 없음) → local_addr() 조회
pub fn detect_local_ip() -> String {
    use std::net::UdpSocket;
    UdpSocket::bind("0.0.0.0:0")
        .and_then(|s| { s.connect("8.8.8.8:80")?; s.local_addr() })
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|_| {
            tracing::warn!("로컬 IP 감지 실패 — 127.0.0.1 폴백");
            "127.0.0.1".to_string()
        })
}

// ----------------------------------------------------------------------------
// [answer 조립]
// ----------------------------------------------------------------------------

/// offer의 미디어 섹션을 미러링해 ICE-Lite answer를 조립한다.
/// 반환: (sdp, server_ufrag, server_pwd)
///
/// BUNDLE 구조이므로 모든 미디어 섹션이 같은 ICE/DTLS/포트를 공유한다.
fn assemble_answer(
    offer:       &str,
    fingerprint: &str,
    local_ip:    &str,
    media_port:  u16,
) -> (String, String, String) {
    let server_ufrag = random_ice_string(16);
    let server_pwd   = random_ice_string(22);
    let session_id   = current_timestamp();

    // ICE/DTLS/방향/연결 라인은 서버 값으로 교체 — offer에서 제외
    const SKIP_PREFIXES: &[&str] = &[
        "a=ice-", "a=fingerprint", "a=setup", "a=candidate",
        "a=sendrecv", "a=sendonly", "a=recvonly", "a=inactive",
        "a=rtcp-mux", "a=rtcp-rsize", "c=",
    ];

    struct MediaSection {
        m_line: String,       // 포트 교체 완료된 m= 라인
        attrs:  Vec<String>,  // ICE/DTLS 제외한 나머지 a= 라인
        mid:    String,       // BUNDLE 그룹용
    }

    let mut sections: Vec<MediaSection> = Vec::new();
    for line in offer.lines() {
        if let Some(rest) = line.strip_prefix("m=") {
            // 새 섹션 시작 — 포트만 서버 포트로 교체
            let mut parts = rest.splitn(3, ' ');
            let media = parts.next().unwrap_or_default();
            let _port = parts.next();
            let tail  = parts.next().unwrap_or_default();
            sections.push(MediaSection {
                m_line: format!("m={} {} {}", media, media_port, tail),
                attrs:  Vec::new(),
                mid:    String::new(),
            });
            continue;
        }

        let section = match sections.last_mut() {
            Some(s) => s,
            None    => continue, // 세션 헤더 영역 — 스킵
        };
        if SKIP_PREFIXES.iter().any(|p| line.starts_with(p)) {
            continue;
        }
        if let Some(mid) = line.strip_prefix("a=mid:") {
            section.mid = mid.trim().to_string();
        }
        section.attrs.push(line.to_string());
    }

    let bundle_mids: Vec<&str> = sections.iter().map(|s| s.mid.as_str()).collect();

    let mut sdp = String::new();
    sdp.push_str("v=0\r\n");
    sdp.push_str(&format!("o=mini-proctor {0} {0} IN IP4 {1}\r\n", session_id, local_ip));
    sdp.push_str("s=-\r\n");
    sdp.push_str("t=0 0\r\n");
    sdp.push_str(&format!("a=group:BUNDLE {}\r\n", bundle_mids.join(" ")));
    sdp.push_str("a=ice-lite\r\n");

    for section in &sections {
        sdp.push_str(&section.m_line);
        sdp.push_str("\r\n");
        sdp.push_str(&format!("c=IN IP4 {}\r\n", local_ip));
        sdp.push_str(&format!("a=ice-ufrag:{}\r\n", server_ufrag));
        sdp.push_str(&format!("a=ice-pwd:{}\r\n", server_pwd));
        sdp.push_str(&format!("a=fingerprint:{}\r\n", fingerprint));
        sdp.push_str("a=setup:passive\r\n");
        sdp.push_str("a=rtcp-mux\r\n");
        sdp.push_str("a=rtcp-rsize\r\n");
        // sendrecv: recvonly 시 일부 브라우저가 DTLS를 시작하지 않는 문제 방지
        sdp.push_str("a=sendrecv\r\n");
        for attr in &section.attrs {
            sdp.push_str(attr);
            sdp.push_str("\r\n");
        }
        // ICE Lite — host candidate 1개
        sdp.push_str(&format!(
            "a=candidate:1 1 udp 2113937151 {} {} typ host generation 0\r\n",
            local_ip, media_port
        ));
        sdp.push_str("a=end-of-candidates\r\n");
    }

    (sdp, server_ufrag, server_pwd)
}

// ----------------------------------------------------------------------------
// [IceLiteEngine]
// ----------------------------------------------------------------------------

pub struct IceLiteEngine {
    cert:         Arc<ServerCert>,
    advertise_ip: String,
    media_port:   u16,
}

impl IceLiteEngine {
    pub fn new(cert: Arc<ServerCert>, advertise_ip: Option<String>, media_port: u16) -> Self {
        let advertise_ip = advertise_ip.unwrap_or_else(detect_local_ip);
        info!("[answerer] IceLiteEngine ip={} media_port={}", advertise_ip, media_port);
        Self { cert, advertise_ip, media_port }
    }
}

impl MediaEngine for IceLiteEngine {
    fn create_connection(&self, ice: &IceConfig) -> ProctorResult<Arc<dyn MediaConnection>> {
        // ICE-Lite는 connectivity check를 하지 않으므로 STUN 목록은 참고용
        trace!("[answerer] create_connection stun={:?}", ice.stun_servers);
        let (events_tx, events_rx) = mpsc::channel(config::ENGINE_EVENT_QUEUE_SIZE);
        let (tap, _) = broadcast::channel(config::VIDEO_TAP_BUFFER);
        Ok(Arc::new(IceLiteConnection {
            fingerprint:  self.cert.fingerprint.clone(),
            advertise_ip: self.advertise_ip.clone(),
            media_port:   self.media_port,
            remote:       Mutex::new(None),
            local:        Mutex::new(None),
            credentials:  Mutex::new(None),
            candidates:   Mutex::new(Vec::new()),
            attached:     Mutex::new(None),
            events_tx:    Mutex::new(Some(events_tx)),
            events_rx:    Mutex::new(Some(events_rx)),
            tap,
        }))
    }
}

pub struct IceLiteConnection {
    fingerprint:  String,
    advertise_ip: String,
    media_port:   u16,
    remote:       Mutex<Option<SessionDescription>>,
    local:        Mutex<Option<SessionDescription>>,
    /// answer 조립 시 확정되는 (ufrag, pwd)
    credentials:  Mutex<Option<(String, String)>>,
    candidates:   Mutex<Vec<CandidateParams>>,
    /// 감독관 릴레이용으로 부착된 송신 탭 — 외부 미디어 플레인이 소비
    attached:     Mutex<Option<VideoTap>>,
    events_tx:    Mutex<Option<mpsc::Sender<EngineEvent>>>,
    events_rx:    Mutex<Option<mpsc::Receiver<EngineEvent>>>,
    tap:          VideoTap,
}

impl IceLiteConnection {
    pub fn remote_candidates(&self) -> usize {
        self.candidates.lock().unwrap().len()
    }

    async fn emit(&self, event: EngineEvent) {
        let tx = self.events_tx.lock().unwrap().clone();
        if let Some(tx) = tx {
            let _ = tx.send(event).await;
        }
    }
}

#[async_trait]
impl MediaConnection for IceLiteConnection {
    async fn set_remote_description(&self, desc: SessionDescription) -> ProctorResult<()> {
        if desc.kind != "offer" {
            return Err(ProctorError::EngineFailure(format!(
                "ICE-Lite answerer expects an offer, got '{}'", desc.kind
            )));
        }
        *self.remote.lock().unwrap() = Some(desc);
        Ok(())
    }

    async fn create_answer(&self) -> ProctorResult<SessionDescription> {
        let offer = self
            .remote
            .lock()
            .unwrap()
            .as_ref()
            .map(|d| d.sdp.clone())
            .ok_or_else(|| {
                ProctorError::EngineFailure("create_answer before remote description".to_string())
            })?;

        let (sdp, ufrag, pwd) =
            assemble_answer(&offer, &self.fingerprint, &self.advertise_ip, self.media_port);
        debug!("[answerer] answer assembled ufrag={}", ufrag);
        *self.credentials.lock().unwrap() = Some((ufrag, pwd));
        Ok(SessionDescription::answer(sdp))
    }

    async fn set_local_description(&self, desc: SessionDescription) -> ProctorResult<()> {
        *self.local.lock().unwrap() = Some(desc);
        // passive 측은 이후 클라이언트 주도 핸드셰이크를 기다린다
        self.emit(EngineEvent::ConnectionState(EngineConnState::Connecting)).await;
        Ok(())
    }

    fn local_description(&self) -> Option<SessionDescription> {
        self.local.lock().unwrap().clone()
    }

    async fn add_ice_candidate(&self, candidate: CandidateParams) -> ProctorResult<()> {
        if self.remote.lock().unwrap().is_none() {
            return Err(ProctorError::EngineFailure(
                "add_ice_candidate before remote description".to_string(),
            ));
        }
        trace!("[answerer] candidate {}:{} typ {}", candidate.ip, candidate.port, candidate.kind);
        self.candidates.lock().unwrap().push(candidate);
        Ok(())
    }

    fn take_events(&self) -> Option<mpsc::Receiver<EngineEvent>> {
        self.events_rx.lock().unwrap().take()
    }

    fn video_tap(&self) -> VideoTap {
        self.tap.clone()
    }

    async fn attach_video(&self, tap: VideoTap) -> ProctorResult<()> {
        *self.attached.lock().unwrap() = Some(tap);
        Ok(())
    }

    async fn stop_transceivers(&self) {
        // 시그널링 플레인 전용 — 정지할 트랜시버 없음
    }

    async fn close(&self) -> ProctorResult<()> {
        self.emit(EngineEvent::ConnectionState(EngineConnState::Closed)).await;
        // tx를 버려 이벤트 채널을 닫는다 — 세션 watcher 태스크 종료 신호
        self.events_tx.lock().unwrap().take();
        self.attached.lock().unwrap().take();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ----- random_ice_string -----

    #[test]
    fn ice_string_length_and_charset() {
        assert_eq!(random_ice_string(16).len(), 16);
        assert_eq!(random_ice_string(22).len(), 22);
        assert!(random_ice_string(100).chars().all(|c| c.is_ascii_alphanumeric()));
    }

    // ----- assemble_answer -----

    fn make_video_offer(ufrag: &str) -> String {
        format!(
            "v=0\r\n\
             o=- 123 2 IN IP4 0.0.0.0\r\n\
             s=-\r\n\
             t=0 0\r\n\
             a=group:BUNDLE 0\r\n\
             m=video 9 UDP/TLS/RTP/SAVPF 96\r\n\
             c=IN IP4 0.0.0.0\r\n\
             a=mid:0\r\n\
             a=ice-ufrag:{}\r\n\
             a=ice-pwd:clientpwd\r\n\
             a=fingerprint:sha-256 AA:BB\r\n\
             a=setup:actpass\r\n\
             a=sendrecv\r\n\
             a=rtcp-mux\r\n\
             a=rtpmap:96 VP8/90000\r\n",
            ufrag
        )
    }

    fn make_bundle_offer() -> String {
        "v=0\r\n\
         o=- 123 2 IN IP4 0.0.0.0\r\n\
         s=-\r\n\
         t=0 0\r\n\
         a=group:BUNDLE 0 1\r\n\
         m=audio 9 UDP/TLS/RTP/SAVPF 111\r\n\
         c=IN IP4 0.0.0.0\r\n\
         a=mid:0\r\n\
         a=ice-ufrag:cufrag\r\n\
         a=ice-pwd:cpwd\r\n\
         a=setup:actpass\r\n\
         a=rtpmap:111 opus/48000/2\r\n\
         m=video 9 UDP/TLS/RTP/SAVPF 96\r\n\
         c=IN IP4 0.0.0.0\r\n\
         a=mid:1\r\n\
         a=ice-ufrag:cufrag\r\n\
         a=ice-pwd:cpwd\r\n\
         a=setup:actpass\r\n\
         a=rtpmap:96 VP8/90000\r\n"
            .to_string()
    }

    #[test]
    fn answer_contains_server_credentials() {
        let (sdp, ufrag, pwd) =
            assemble_answer(&make_video_offer("cu"), "sha-256 FF:00", "10.0.0.5", 40000);
        assert!(sdp.contains(&format!("a=ice-ufrag:{}", ufrag)));
        assert!(sdp.contains(&format!("a=ice-pwd:{}", pwd)));
    }

    #[test]
    fn answer_is_passive_and_strips_client_lines() {
        let (sdp, _, _) =
            assemble_answer(&make_video_offer("clientufrag"), "sha-256 FF:00", "10.0.0.5", 40000);
        assert!(sdp.contains("a=setup:passive"));
        assert!(!sdp.contains("actpass"));
        assert!(!sdp.contains("clientufrag"));
        assert!(!sdp.contains("clientpwd"));
        assert!(!sdp.contains("AA:BB"));
    }

    #[test]
    fn answer_replaces_port_and_mirrors_codecs() {
        let (sdp, _, _) =
            assemble_answer(&make_video_offer("cu"), "sha-256 FF:00", "10.0.0.5", 41234);
        assert!(sdp.contains("m=video 41234 "));
        assert!(sdp.contains("a=rtpmap:96 VP8/90000"));
    }

    #[test]
    fn answer_is_ice_lite_with_host_candidate() {
        let (sdp, _, _) =
            assemble_answer(&make_video_offer("cu"), "sha-256 FF:00", "10.0.0.5", 40000);
        assert!(sdp.contains("a=ice-lite"));
        assert!(sdp.contains("typ host"));
        assert!(sdp.contains("a=end-of-candidates"));
    }

    #[test]
    fn bundle_offer_produces_two_sections_with_shared_credentials() {
        let (sdp, ufrag, _) =
            assemble_answer(&make_bundle_offer(), "sha-256 FF:00", "10.0.0.5", 40000);
        assert_eq!(sdp.matches("m=audio").count(), 1);
        assert_eq!(sdp.matches("m=video").count(), 1);
        assert!(sdp.contains("a=group:BUNDLE 0 1"));
        assert_eq!(sdp.matches(&format!("a=ice-ufrag:{}", ufrag)).count(), 2);
    }

    // ----- IceLiteConnection -----

    fn make_engine() -> IceLiteEngine {
        let cert = Arc::new(ServerCert::generate().expect("cert"));
        IceLiteEngine::new(cert, Some("10.0.0.5".to_string()), 40000)
    }

    #[tokio::test]
    async fn answer_requires_remote_description() {
        let conn = make_engine().create_connection(&IceConfig::default()).unwrap();
        assert!(conn.create_answer().await.is_err());
    }

    #[tokio::test]
    async fn offer_answer_roundtrip() {
        let conn = make_engine().create_connection(&IceConfig::default()).unwrap();
        conn.set_remote_description(SessionDescription::offer(make_video_offer("cu")))
            .await
            .unwrap();
        let answer = conn.create_answer().await.unwrap();
        assert_eq!(answer.kind, "answer");
        assert!(answer.sdp.contains("a=ice-lite"));
        conn.set_local_description(answer.clone()).await.unwrap();
        assert_eq!(conn.local_description().unwrap().sdp, answer.sdp);
    }

    #[tokio::test]
    async fn rejects_answer_as_remote() {
        let conn = make_engine().create_connection(&IceConfig::default()).unwrap();
        let result = conn
            .set_remote_description(SessionDescription::answer("v=0"))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn candidate_requires_remote_description() {
        let conn = make_engine().create_connection(&IceConfig::default()).unwrap();
        let cand = crate::protocol::candidate::parse(
            "candidate:1 1 udp 100 10.0.0.1 9 typ host",
        )
        .unwrap();
        assert!(conn.add_ice_candidate(cand.clone()).await.is_err());

        conn.set_remote_description(SessionDescription::offer(make_video_offer("cu")))
            .await
            .unwrap();
        conn.add_ice_candidate(cand).await.unwrap();
    }

    #[tokio::test]
    async fn close_emits_closed_and_ends_events() {
        let conn = make_engine().create_connection(&IceConfig::default()).unwrap();
        let mut events = conn.take_events().unwrap();
        assert!(conn.take_events().is_none(), "이벤트 채널은 1회만 take 가능");

        conn.close().await.unwrap();
        match events.recv().await {
            Some(EngineEvent::ConnectionState(state)) => assert!(state.is_dead()),
            _ => panic!("Closed 상태 이벤트가 와야 합니다."),
        }
        assert!(events.recv().await.is_none(), "close 후 채널은 닫혀야 합니다.");
    }
}
