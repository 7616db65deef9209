// author: kodeholic (powered by Claude)

use axum::{
    extract::{ws::{Message, WebSocket, WebSocketUpgrade}, State},
    response::Response,
};
use futures_util::{sink::SinkExt, stream::StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

use crate::analysis::{pipeline, ActivityDetected, ActivityTx, FaceDetector, PipelineContext};
use crate::auth::{AuthClaims, Role, TokenVerifier};
use crate::config;
use crate::core::{PeerHub, Session, SessionRegistry, SessionState};
use crate::error::{ProctorError, ProctorResult};
use crate::media::{EngineEvent, IceConfig, MediaEngine, SessionDescription};
use crate::protocol::{
    candidate,
    error_code::to_error_code,
    message::{
        AdminAnswerPayload, AdminOfferPayload, AnswerOutPayload, AnswerPayload,
        CandidatePayload, CandidateRelayPayload, ErrorPayload, GatewayPacket, HelloPayload,
        IdentifyPayload, OfferPayload, OfferRelayPayload, ReadyPayload,
        SuspiciousActivityPayload,
    },
    opcode::{client, server},
};
use crate::sink::ActivitySink;
use crate::utils::generate_sid;

// ----------------------------------------------------------------------------
// [공유 상태]
// ----------------------------------------------------------------------------

#[derive(Clone)]
pub struct AppState {
    pub peer_hub:    Arc<PeerHub>,
    pub registry:    Arc<SessionRegistry>,
    pub engine:      Arc<dyn MediaEngine>,
    pub detector:    Arc<dyn FaceDetector>,
    pub sink:        Arc<dyn ActivitySink>,
    pub verifier:    Arc<dyn TokenVerifier>,
    pub activity_tx: ActivityTx,
}

fn ice_config() -> IceConfig {
    IceConfig {
        stun_servers: config::STUN_SERVERS.iter().map(|s| s.to_string()).collect(),
    }
}

// ----------------------------------------------------------------------------
// [WS 진입점]
// ----------------------------------------------------------------------------

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

// ----------------------------------------------------------------------------
// [소켓 상태] — 개별 WS 연결마다 보유
// ----------------------------------------------------------------------------

struct SocketSession {
    sid:    String,
    claims: Option<AuthClaims>,
}

impl SocketSession {
    fn new(sid: String) -> Self {
        Self { sid, claims: None }
    }

    fn is_authenticated(&self) -> bool {
        self.claims.is_some()
    }

    fn is_admin(&self) -> bool {
        matches!(self.claims, Some(AuthClaims { role: Role::Admin, .. }))
    }
}

// ----------------------------------------------------------------------------
// [핵심] 개별 클라이언트 WS 생명주기
// ----------------------------------------------------------------------------

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (egress_tx, mut egress_rx) = mpsc::channel::<String>(config::EGRESS_QUEUE_SIZE);

    let sid = generate_sid();
    let mut session = SocketSession::new(sid.clone());

    // "connect" — 로그만, 시그널링 세션은 만들지 않는다
    info!("[ws] client connected: {}", sid);

    // HELLO 전송 (할당된 sid 통지)
    let hello = make_packet(server::HELLO, HelloPayload {
        sid:                sid.clone(),
        heartbeat_interval: config::HEARTBEAT_INTERVAL_MS,
    });
    if ws_tx.send(Message::Text(hello.into())).await.is_err() {
        return;
    }

    // 릴레이/알림 수신을 위해 connect 시점에 라우팅 테이블 등록
    let peer = state.peer_hub.register(&sid, egress_tx.clone());

    // [rx_loop] egress_rx → WS 송신
    let rx_loop = tokio::spawn(async move {
        while let Some(json) = egress_rx.recv().await {
            if ws_tx.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    // [tx_loop] WS 수신 → 핸들러 dispatch (sid 단위 도착순 처리)
    while let Some(msg) = ws_rx.next().await {
        let text = match msg {
            Ok(Message::Text(t))  => t,
            Ok(Message::Close(_)) => break,
            Err(e) => { warn!("[ws] error sid={}: {}", sid, e); break; }
            _ => continue,
        };

        let packet: GatewayPacket = match serde_json::from_str(&text) {
            Ok(p)  => p,
            Err(e) => {
                warn!("[ws] malformed packet sid={}: {}", sid, e);
                let _ = send(&egress_tx, error_packet(ProctorError::InvalidPayload(e.to_string()))).await;
                continue;
            }
        };

        // IDENTIFY / HEARTBEAT 외에는 인증 필요
        if packet.op != client::IDENTIFY && packet.op != client::HEARTBEAT {
            if !session.is_authenticated() {
                let _ = send(&egress_tx, error_packet(ProctorError::NotAuthenticated)).await;
                continue;
            }
        }

        peer.touch();

        let result = match packet.op {
            client::HEARTBEAT   => handle_heartbeat(&egress_tx).await,
            client::IDENTIFY    => handle_identify(&egress_tx, &mut session, &state, packet).await,
            client::OFFER       => handle_offer(&session, &state, packet).await,
            client::ADMIN_OFFER => handle_admin_offer(&egress_tx, &session, &state, packet).await,
            client::ANSWER      => handle_answer(&session, &state, packet).await,
            client::CANDIDATE   => handle_candidate(&session, &state, packet).await,
            unknown => {
                warn!("[ws] unknown opcode {} sid={}", unknown, sid);
                send(&egress_tx, error_packet(ProctorError::InvalidOpcode(unknown))).await
            }
        };

        // 핸들러 경계 — 에러는 여기서 멈춘다 (소켓 루프 유지)
        if let Err(e) = result {
            error!("[ws] handler error sid={}: {}", sid, e);
        }
    }

    // "disconnect" — 이 sid의 모든 세션 teardown + 매핑 제거
    info!("[ws] client disconnected: {}", sid);
    disconnect_cleanup(&state.registry, &sid).await;
    state.peer_hub.unregister(&sid);
    rx_loop.abort();
}

// ----------------------------------------------------------------------------
// [op 핸들러들]
// ----------------------------------------------------------------------------

async fn handle_heartbeat(tx: &mpsc::Sender<String>) -> ProctorResult<()> {
    trace!("HEARTBEAT");
    send(tx, make_no_data(server::HEARTBEAT_ACK)).await
}

async fn handle_identify(
    tx:      &mpsc::Sender<String>,
    session: &mut SocketSession,
    state:   &AppState,
    packet:  GatewayPacket,
) -> ProctorResult<()> {
    let payload = parse_payload::<IdentifyPayload>(packet.d)?;
    trace!("IDENTIFY - user_id: {}", payload.user_id);

    let claims = match state.verifier.verify(&payload.token) {
        Some(claims) if claims.identity == payload.user_id => claims,
        _ => {
            warn!("IDENTIFY rejected - user_id: {}", payload.user_id);
            return send(tx, error_packet(ProctorError::InvalidToken)).await;
        }
    };

    let ready = ReadyPayload {
        sid:     session.sid.clone(),
        user_id: claims.identity.clone(),
        role:    claims.role,
    };
    session.claims = Some(claims);

    send(tx, make_packet(server::READY, ready)).await
}

/// 학생 offer — 분석용 서버 연결 협상
///
/// last-offer-wins: 같은 student_id의 라이브 세션이 있으면 먼저 teardown.
/// 협상 중 엔진 실패 시 이 핸들러에서 만든 연결은 모두 정리된다.
async fn handle_offer(
    session: &SocketSession,
    state:   &AppState,
    packet:  GatewayPacket,
) -> ProctorResult<()> {
    let payload = parse_payload::<OfferPayload>(packet.d)?;
    // studentId 누락은 세션 변이 없이 버린다 (경계에서 로그만)
    let student_id = match payload.student_id {
        Some(ref id) if !id.is_empty() => id.clone(),
        _ => return Err(ProctorError::MissingStudentId),
    };
    info!("Received offer from student {} (sid: {})", student_id, session.sid);

    // 같은 학생의 기존 라이브 세션 — 새 offer가 항상 이긴다
    if let Some(prev) = state.registry.find_student_session(&student_id) {
        info!("Superseding live session {} for student {}", prev.id, student_id);
        teardown_session(&state.registry, &prev).await;
    }
    // 같은 소켓이 들고 있던 다른 세션도 정리 (sid당 세션 1개)
    if let Some(prev) = state.registry.get(&session.sid) {
        teardown_session(&state.registry, &prev).await;
    }

    let conn = state.engine.create_connection(&ice_config())?;
    let live = Arc::new(Session::new(
        session.sid.clone(),
        Role::Student,
        student_id.clone(),
        Arc::clone(&conn),
    ));
    state.registry.insert_student(Arc::clone(&live));

    // 엔진 이벤트 watcher — 트랙 수신 / 상태 변화 감시
    if let Some(events) = conn.take_events() {
        let handle = tokio::spawn(watch_engine(state.clone(), Arc::clone(&live), events));
        live.track_task(handle);
    }

    // SDP 교환 — 실패하면 만든 세션째 정리하고 에러 전파
    let negotiated: ProctorResult<SessionDescription> = async {
        conn.set_remote_description(SessionDescription {
            sdp:  payload.sdp.clone(),
            kind: payload.kind.clone(),
        })
        .await?;
        live.set_state(SessionState::Negotiating);
        let answer = conn.create_answer().await?;
        conn.set_local_description(answer.clone()).await?;
        Ok(answer)
    }
    .await;

    let answer = match negotiated {
        Ok(answer) => answer,
        Err(e) => {
            error!("Error handling offer for student {}: {}", student_id, e);
            teardown_session(&state.registry, &live).await;
            return Err(e);
        }
    };

    // 분석용 answer는 발신 학생에게만
    let answer_json = make_packet(server::ANSWER, AnswerOutPayload {
        sdp:         answer.sdp,
        kind:        answer.kind,
        student_id:  student_id.clone(),
        admin_id:    None,
        from_admin:  false,
        is_analysis: true,
    });
    state.peer_hub.send_to(&session.sid, &answer_json).await;

    // 원본 offer는 다른 피어에 릴레이 (브라우저 간 직접 연결 경로)
    let relay_json = make_packet(server::OFFER, OfferRelayPayload {
        sdp:            payload.sdp,
        kind:           payload.kind,
        student_id,
        is_admin_offer: false,
        admin_id:       None,
        from_admin:     false,
    });
    state.peer_hub.broadcast_except(&relay_json, &session.sid).await;

    Ok(())
}

/// 감독관 offer — 뷰어 세션 생성 + 매핑 + 학생 탭 부착
async fn handle_admin_offer(
    tx:      &mpsc::Sender<String>,
    session: &SocketSession,
    state:   &AppState,
    packet:  GatewayPacket,
) -> ProctorResult<()> {
    if !session.is_admin() {
        warn!("admin_offer from non-admin sid={}", session.sid);
        return send(tx, error_packet(ProctorError::AdminRoleRequired)).await;
    }

    let payload = parse_payload::<AdminOfferPayload>(packet.d)?;
    let student_id = match payload.student_id {
        Some(ref id) if !id.is_empty() => id.clone(),
        _ => return Err(ProctorError::MissingStudentId),
    };
    info!("Admin {} requesting video from student {}", session.sid, student_id);

    // 대상 학생의 라이브 세션이 없으면 아무것도 만들지 않는다
    let student_session = match state.registry.find_student_session(&student_id) {
        Some(s) => s,
        None => return Err(ProctorError::StudentNotFound(student_id)),
    };

    // 같은 감독관 소켓의 기존 뷰어 세션 교체
    if let Some(prev) = state.registry.get(&session.sid) {
        teardown_session(&state.registry, &prev).await;
    }

    let conn = state.engine.create_connection(&ice_config())?;
    let viewer = Arc::new(Session::new(
        session.sid.clone(),
        Role::Admin,
        student_id.clone(),
        Arc::clone(&conn),
    ));
    state.registry.insert_admin(Arc::clone(&viewer));
    // 단일 감독관 매핑 — 마지막 admin_offer가 이긴다
    state.registry.map_viewer(&student_id, &session.sid);

    if let Some(events) = conn.take_events() {
        let handle = tokio::spawn(watch_engine(state.clone(), Arc::clone(&viewer), events));
        viewer.track_task(handle);
    }

    let negotiated: ProctorResult<SessionDescription> = async {
        conn.set_remote_description(SessionDescription {
            sdp:  payload.sdp.sdp.clone(),
            kind: payload.sdp.kind.clone(),
        })
        .await?;
        viewer.set_state(SessionState::Negotiating);
        let answer = conn.create_answer().await?;
        conn.set_local_description(answer.clone()).await?;
        Ok(answer)
    }
    .await;

    let answer = match negotiated {
        Ok(answer) => answer,
        Err(e) => {
            error!("Error handling admin offer: {}", e);
            teardown_session(&state.registry, &viewer).await;
            return Err(e);
        }
    };

    send(tx, make_packet(server::ADMIN_ANSWER, AdminAnswerPayload {
        sdp:        answer.sdp,
        kind:       answer.kind,
        student_id: student_id.clone(),
    })).await?;

    // 학생에게 감독관 offer 전달 (직접 연결 경로)
    let forward_json = make_packet(server::OFFER, OfferRelayPayload {
        sdp:            payload.sdp.sdp,
        kind:           payload.sdp.kind,
        student_id:     student_id.clone(),
        is_admin_offer: true,
        admin_id:       Some(session.sid.clone()),
        from_admin:     true,
    });
    state.peer_hub.send_to(&student_session.id, &forward_json).await;

    // 학생 세션의 수신 비디오 탭을 뷰어 연결의 송신 트랙으로 부착
    if let Some(student_conn) = student_session.media() {
        if let Err(e) = conn.attach_video(student_conn.video_tap()).await {
            error!("Error attaching video tap for admin {}: {}", session.sid, e);
            teardown_session(&state.registry, &viewer).await;
            return Err(e);
        }
        debug!("Attached video tap of student {} to admin {}", student_id, session.sid);
    }

    Ok(())
}

/// answer 라우팅 — 감독관 타깃 > 분석 소비 > 브로드캐스트
async fn handle_answer(
    session: &SocketSession,
    state:   &AppState,
    packet:  GatewayPacket,
) -> ProctorResult<()> {
    let payload = parse_payload::<AnswerPayload>(packet.d)?;
    let student_id = match payload.student_id {
        Some(ref id) if !id.is_empty() => id.clone(),
        _ => return Err(ProctorError::MissingStudentId),
    };

    if let Some(admin_id) = payload.admin_id {
        // 감독관 offer에 대한 학생의 직접 answer — 해당 감독관에게만
        debug!("Forwarding answer to admin {}", admin_id);
        let json = make_packet(server::ANSWER, AnswerOutPayload {
            sdp:         payload.sdp,
            kind:        payload.kind,
            student_id,
            admin_id:    Some(admin_id.clone()),
            from_admin:  payload.from_admin,
            is_analysis: false,
        });
        state.peer_hub.send_to(&admin_id, &json).await;
    } else if payload.is_analysis {
        // 내부 분석 핸드셰이크 — 다른 피어로 새지 않는다
        debug!("Consumed analysis answer from {}", session.sid);
    } else {
        let json = make_packet(server::ANSWER, AnswerOutPayload {
            sdp:         payload.sdp,
            kind:        payload.kind,
            student_id,
            admin_id:    None,
            from_admin:  false,
            is_analysis: false,
        });
        state.peer_hub.broadcast_except(&json, &session.sid).await;
    }
    Ok(())
}

/// candidate 라우팅 — 파싱 실패는 조용히 버린다 (세션은 유지)
async fn handle_candidate(
    session: &SocketSession,
    state:   &AppState,
    packet:  GatewayPacket,
) -> ProctorResult<()> {
    let payload = parse_payload::<CandidatePayload>(packet.d)?;

    if payload.from_admin && !session.is_admin() {
        warn!("admin candidate from non-admin sid={}", session.sid);
        return Ok(());
    }

    let params = match candidate::parse(&payload.candidate) {
        Ok(p) => p,
        Err(e) => {
            warn!("Error parsing candidate from {}: {}", session.sid, e);
            return Ok(());
        }
    };

    if payload.is_analysis {
        // 발신자의 서버측 연결에 추가 (sid 우선, student_id 폴백)
        let target = state.registry.get(&session.sid).or_else(|| {
            payload
                .student_id
                .as_deref()
                .and_then(|id| state.registry.find_student_session(id))
        });
        let conn = match target.and_then(|s| s.media()) {
            Some(conn) => conn,
            None => return Err(ProctorError::SessionNotFound(session.sid.clone())),
        };
        if let Err(e) = conn.add_ice_candidate(params).await {
            // 개별 candidate 실패는 연결 치명상이 아니다
            warn!("add_ice_candidate failed sid={}: {}", session.sid, e);
        }
        return Ok(());
    }

    let relay = CandidateRelayPayload {
        candidate:       payload.candidate,
        sdp_mid:         payload.sdp_mid,
        sdp_mline_index: payload.sdp_mline_index,
        student_id:      payload.student_id,
        admin_id:        payload.admin_id.clone(),
        from_admin:      payload.from_admin,
    };
    let json = make_packet(server::CANDIDATE, relay);

    if let Some(admin_id) = payload.admin_id {
        state.peer_hub.send_to(&admin_id, &json).await;
    } else {
        state.peer_hub.broadcast_except(&json, &session.sid).await;
    }
    Ok(())
}

// ----------------------------------------------------------------------------
// [엔진 이벤트 watcher] — 세션당 1태스크
// ----------------------------------------------------------------------------

async fn watch_engine(
    state:      AppState,
    session:    Arc<Session>,
    mut events: mpsc::Receiver<EngineEvent>,
) {
    while let Some(event) = events.recv().await {
        match event {
            EngineEvent::VideoTrack(source) => {
                if session.role != Role::Student {
                    debug!("Ignoring track on non-student session {}", session.id);
                    continue;
                }
                info!("Received video track from student {}", session.student_id);
                let tap = match session.media() {
                    Some(conn) => conn.video_tap(),
                    None => continue, // teardown과 경합 — 이미 핸들이 떠났다
                };
                let ctx = PipelineContext {
                    student_id:  session.student_id.clone(),
                    detector:    Arc::clone(&state.detector),
                    sink:        Arc::clone(&state.sink),
                    activity_tx: state.activity_tx.clone(),
                };
                session.track_task(pipeline::spawn(source, tap, ctx));
            }
            EngineEvent::ConnectionState(conn_state) => {
                info!(
                    "Session {} connection state changed to {:?}",
                    session.id, conn_state
                );
                if conn_state.is_dead() {
                    spawn_teardown(&state, &session, SessionState::Failed);
                    return; // 자기 자신이 abort 대상 — 더 읽지 않는다
                }
                if conn_state == crate::media::EngineConnState::Connected {
                    session.set_state(SessionState::Connected);
                }
            }
            EngineEvent::IceState(ice_state) => {
                info!("Session {} ICE state changed to {:?}", session.id, ice_state);
                if ice_state == crate::media::engine::EngineIceState::Failed {
                    spawn_teardown(&state, &session, SessionState::Failed);
                    return;
                }
            }
        }
    }
}

/// watcher 내부에서의 teardown은 분리 태스크로 —
/// teardown이 watcher 자신을 abort하므로 인라인 실행 금지.
fn spawn_teardown(state: &AppState, session: &Arc<Session>, cause: SessionState) {
    if session.is_live() {
        session.set_state(cause);
    }
    let registry = Arc::clone(&state.registry);
    let session = Arc::clone(session);
    tokio::spawn(async move {
        teardown_session(&registry, &session).await;
    });
}

// ----------------------------------------------------------------------------
// [teardown] — 모든 트리거(disconnect / 엔진 실패 / reaper)의 단일 경로
// ----------------------------------------------------------------------------

/// begin_cleanup 게이트를 통과한 호출자만 핸들을 해제한다.
/// 동시 트리거는 티켓을 보고 no-op — 핸들 close는 세션당 정확히 1회.
pub async fn teardown_session(registry: &Arc<SessionRegistry>, session: &Arc<Session>) {
    if !registry.begin_cleanup(&session.id) {
        trace!("teardown already in-flight sid={}", session.id);
        return;
    }

    // 파이프라인/watcher 취소 — 진행 중 탐지 결과는 버려진다
    session.abort_tasks();

    if let Some(conn) = session.take_media() {
        // 트랜시버 정지는 best-effort, close 실패는 삼킨다
        conn.stop_transceivers().await;
        if let Err(e) = conn.close().await {
            error!("Error closing peer connection sid={}: {}", session.id, e);
        }
    }
    session.set_state(SessionState::Closed);

    registry.complete_cleanup(&session.id);
    info!(
        "Removed peer connection for student {} (sid={})",
        session.student_id, session.id
    );
}

/// 전송 연결 종료 시 이 sid가 들고 있던 세션/매핑 정리.
/// WS close 외에 reaper의 좀비 수거도 같은 경로를 탄다.
pub async fn disconnect_cleanup(registry: &Arc<SessionRegistry>, sid: &str) {
    if let Some(session) = registry.get(sid) {
        if session.is_live() {
            session.set_state(SessionState::Disconnected);
        }
        teardown_session(registry, &session).await;
    }
    // 세션 없이 매핑만 남은 감독관 케이스
    registry.remove_viewer_by_admin(sid);
}

// ----------------------------------------------------------------------------
// [activity dispatcher] — 파이프라인 → 감독관 알림
// ----------------------------------------------------------------------------

/// ActivityDetected를 소비해 뷰어 매핑을 조회하고 감독관에게 전송.
/// 파이프라인은 전송 주소를 모른다 — 주소 결정은 전부 여기서.
pub async fn run_activity_dispatcher(
    registry: Arc<SessionRegistry>,
    peer_hub: Arc<PeerHub>,
    mut rx:   mpsc::Receiver<ActivityDetected>,
) {
    while let Some(detected) = rx.recv().await {
        info!(
            "Suspicious activity detected for student {}: {}",
            detected.student_id, detected.activity
        );
        let admin_sid = match registry.resolve_viewer(&detected.student_id) {
            Some(sid) => sid,
            None => {
                warn!("No admin found for student {}", detected.student_id);
                continue;
            }
        };
        debug!("Sending suspicious activity notification to admin {}", admin_sid);
        let json = make_packet(server::SUSPICIOUS_ACTIVITY, SuspiciousActivityPayload {
            student_id: detected.student_id.clone(),
            activity:   detected.activity,
            timestamp:  detected.timestamp.clone(),
            id:         detected.id,
        });
        if !peer_hub.send_to(&admin_sid, &json).await {
            warn!("Notification undeliverable to admin {}", admin_sid);
        }
    }
}

// ----------------------------------------------------------------------------
// [내부 유틸]
// ----------------------------------------------------------------------------

fn parse_payload<T: serde::de::DeserializeOwned>(
    d: Option<serde_json::Value>,
) -> ProctorResult<T> {
    let value = d.ok_or_else(|| ProctorError::InvalidPayload("missing payload".to_string()))?;
    serde_json::from_value(value).map_err(|e| ProctorError::InvalidPayload(e.to_string()))
}

fn make_packet(op: u8, payload: impl serde::Serialize) -> String {
    let packet = GatewayPacket::new(op, payload);
    serde_json::to_string(&packet).unwrap_or_default()
}

fn make_no_data(op: u8) -> String {
    serde_json::to_string(&GatewayPacket::no_data(op)).unwrap_or_default()
}

fn error_packet(err: ProctorError) -> String {
    make_packet(server::ERROR, ErrorPayload {
        code:   to_error_code(&err),
        reason: err.to_string(),
    })
}

async fn send(tx: &mpsc::Sender<String>, json: String) -> ProctorResult<()> {
    tx.send(json).await.map_err(|e| ProctorError::InternalError(e.to_string()))
}
