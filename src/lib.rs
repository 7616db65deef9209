// author: kodeholic (powered by Claude)

pub mod analysis;
pub mod auth;
pub mod config;
pub mod core;
pub mod error;
pub mod media;
pub mod protocol;
pub mod reaper;
pub mod sink;
pub mod utils;

use axum::{routing::get, Router};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::analysis::FaceDetector;
use crate::auth::TokenVerifier;
use crate::core::{PeerHub, SessionRegistry};
use crate::media::MediaEngine;
use crate::protocol::{run_activity_dispatcher, ws_handler, AppState};
use crate::sink::ActivitySink;

/// CLI에서 주입되는 런타임 설정
/// - 기본값은 config.rs 상수
/// - 비밀값(SECRET)은 환경변수로 별도 관리
pub struct ServerArgs {
    pub port:         u16,
    pub media_port:   u16,
    pub advertise_ip: Option<String>, // None이면 detect_local_ip() 자동 감지
}

/// 외부 협력자 주입 묶음 — 엔진/탐지기/싱크/토큰 검증기.
/// 라우터와 파이프라인은 이 계약들만 소비한다.
pub struct ProctorDeps {
    pub engine:   Arc<dyn MediaEngine>,
    pub detector: Arc<dyn FaceDetector>,
    pub sink:     Arc<dyn ActivitySink>,
    pub verifier: Arc<dyn TokenVerifier>,
}

pub async fn run_server(args: ServerArgs, deps: ProctorDeps) {
    let peer_hub = Arc::new(PeerHub::new());
    let registry = Arc::new(SessionRegistry::new());

    // 파이프라인 → 디스패처 채널 (세대별 의심 행동 이벤트)
    let (activity_tx, activity_rx) = mpsc::channel(config::ACTIVITY_QUEUE_SIZE);

    let app_state = AppState {
        peer_hub:    Arc::clone(&peer_hub),
        registry:    Arc::clone(&registry),
        engine:      deps.engine,
        detector:    deps.detector,
        sink:        deps.sink,
        verifier:    deps.verifier,
        activity_tx,
    };

    // 의심 행동 알림 디스패처 태스크
    tokio::spawn(run_activity_dispatcher(
        Arc::clone(&registry),
        Arc::clone(&peer_hub),
        activity_rx,
    ));

    // 좀비 세션 자동 종료 태스크
    tokio::spawn(reaper::run_zombie_reaper(
        Arc::clone(&peer_hub),
        Arc::clone(&registry),
    ));

    // CORS — 브라우저 클라이언트 로컬 접속 허용
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/ws", get(ws_handler))
        .with_state(app_state)
        .layer(cors);

    let addr     = format!("0.0.0.0:{}", args.port);
    let listener = TcpListener::bind(&addr).await.unwrap();

    info!("[mini-proctor] Signaling Server on ws://{}", addr);
    info!("[mini-proctor] Media plane advertised on UDP port {}", args.media_port);
    if let Some(ref ip) = args.advertise_ip {
        info!("[mini-proctor] Advertise IP: {} (manual)", ip);
    } else {
        info!("[mini-proctor] Advertise IP: auto detect");
    }

    axum::serve(listener, app).await.unwrap();
}
