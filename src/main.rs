// author: kodeholic (powered by Gemini)

use std::sync::Arc;

use async_trait::async_trait;
use clap::Parser;
use tracing::error;

use mini_proctor::analysis::detector::{FaceDetector, FaceRegion, HeadPose};
use mini_proctor::auth::SharedSecretVerifier;
use mini_proctor::config;
use mini_proctor::error::{ProctorError, ProctorResult};
use mini_proctor::media::{IceLiteEngine, ServerCert, VideoFrame};
use mini_proctor::sink::MemoryActivitySink;
use mini_proctor::{run_server, ProctorDeps, ServerArgs};

#[derive(Parser)]
#[command(name = "mpserver", about = "mini-proctor 시그널링/분석 서버")]
struct Cli {
    /// 웹소켓 시그널링 포트
    #[arg(long, default_value_t = config::SIGNALING_PORT)]
    port: u16,

    /// answer에 광고할 미디어 플레인 UDP 포트
    #[arg(long, default_value_t = config::MEDIA_UDP_PORT)]
    media_port: u16,

    /// 광고 IP (생략 시 자동 감지)
    #[arg(long)]
    advertise_ip: Option<String>,
}

/// 추론 모델이 별도 배포되는 환경용 탐지기 —
/// 모델이 탑재되지 않았으므로 모든 샘플은 "활동 없음"으로 처리된다.
struct NoModelDetector;

#[async_trait]
impl FaceDetector for NoModelDetector {
    async fn detect_faces(&self, _frame: &VideoFrame) -> ProctorResult<Vec<FaceRegion>> {
        Err(ProctorError::DetectorFailure("no face model loaded".to_string()))
    }

    async fn estimate_head_pose(
        &self,
        _faces: &[FaceRegion],
        _frame: &VideoFrame,
    ) -> ProctorResult<Option<HeadPose>> {
        Ok(None)
    }
}

#[tokio::main]
async fn main() {
    // 환경 변수 기반 로깅 초기화 (기본값: info)
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let cert = match ServerCert::generate() {
        Ok(c)  => Arc::new(c),
        Err(e) => {
            error!("[mpserver] Failed to generate server certificate: {}", e);
            return;
        }
    };

    let deps = ProctorDeps {
        engine:   Arc::new(IceLiteEngine::new(cert, cli.advertise_ip.clone(), cli.media_port)),
        detector: Arc::new(NoModelDetector),
        sink:     Arc::new(MemoryActivitySink::new()),
        verifier: Arc::new(SharedSecretVerifier::from_env()),
    };

    run_server(
        ServerArgs {
            port:         cli.port,
            media_port:   cli.media_port,
            advertise_ip: cli.advertise_ip,
        },
        deps,
    )
    .await;
}
