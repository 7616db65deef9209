// author: kodeholic (powered by Claude)
// Frame Analysis Pipeline — Student 세션당 1태스크
//
// 트랙의 프레임 시퀀스를 소비하면서:
//   1. 모든 프레임을 세션 비디오 탭으로 즉시 중계 (미디어 경로 비차단)
//   2. FRAME_SAMPLE_INTERVAL 프레임당 1회만 분석
//   3. 탐지 결과를 디바운스해 ActivityDetected 메시지로 방출
//
// 탐지/영속화 실패는 해당 샘플에서 "활동 없음"으로 취급하고 루프는
// 계속 돈다. 태스크 취소(teardown)는 세션 쪽 abort가 담당.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, trace, warn};

use crate::analysis::detector::{FaceDetector, HeadPose};
use crate::config;
use crate::error::ProctorResult;
use crate::media::engine::{FrameSource, VideoFrame, VideoTap};
use crate::sink::{ActivityKind, ActivitySink};
use crate::utils::{current_timestamp, iso_timestamp};

// ----------------------------------------------------------------------------
// [ActivityDetected] — 파이프라인 → 디스패처 메시지
// ----------------------------------------------------------------------------

/// 파이프라인은 전송 주소를 모른다 — 뷰어 조회와 알림 전송은
/// 이 메시지를 소비하는 디스패처 몫이다.
#[derive(Debug, Clone)]
pub struct ActivityDetected {
    pub student_id: String,
    pub activity:   ActivityKind,
    pub timestamp:  String,
    pub id:         u64,
}

pub type ActivityTx = mpsc::Sender<ActivityDetected>;

// ----------------------------------------------------------------------------
// [파이프라인]
// ----------------------------------------------------------------------------

/// 파이프라인 의존성 묶음 — 세션 teardown 시 태스크째 abort된다
pub struct PipelineContext {
    pub student_id:  String,
    pub detector:    Arc<dyn FaceDetector>,
    pub sink:        Arc<dyn ActivitySink>,
    pub activity_tx: ActivityTx,
}

/// 파이프라인 태스크 전용 상태 — 다른 태스크와 공유하지 않는다
#[derive(Default)]
struct PipelineState {
    frame_count:   u64,
    last_reported: Option<ActivityKind>,
}

pub fn spawn(source: Box<dyn FrameSource>, tap: VideoTap, ctx: PipelineContext) -> JoinHandle<()> {
    tokio::spawn(run(source, tap, ctx))
}

pub async fn run(mut source: Box<dyn FrameSource>, tap: VideoTap, ctx: PipelineContext) {
    debug!("[pipeline] started student={}", ctx.student_id);
    let mut state = PipelineState::default();

    while let Some(frame) = source.next_frame().await {
        // 분석 결과와 무관하게 프레임은 먼저 탭으로 흘려보낸다.
        // 구독자(감독관 릴레이)가 없으면 send 에러 — 무시.
        let _ = tap.send(frame.clone());

        state.frame_count += 1;
        if state.frame_count % config::FRAME_SAMPLE_INTERVAL != 0 {
            continue;
        }

        let activity = match analyze_sample(&frame, &ctx).await {
            Ok(activity) => activity,
            Err(e) => {
                warn!("[pipeline] sample failed student={}: {}", ctx.student_id, e);
                continue; // 이 샘플은 활동 없음으로 취급
            }
        };
        debounce_and_emit(activity, &mut state, &ctx).await;
    }

    debug!("[pipeline] track ended student={}", ctx.student_id);
}

/// 샘플 1회 분석: 무결성 검증 → 얼굴 수 분기 → 활동 분류
async fn analyze_sample(
    frame: &VideoFrame,
    ctx:   &PipelineContext,
) -> ProctorResult<Option<ActivityKind>> {
    // 빈 버퍼 / 채널 수 / 치수 불량은 탐지기까지 가지 않는다
    let packed = match frame.contiguous() {
        Some(buf) => buf,
        None => {
            warn!("[pipeline] invalid frame dropped student={}", ctx.student_id);
            return Ok(None);
        }
    };
    let packed = VideoFrame::packed(frame.width, frame.height, packed);

    let faces = ctx.detector.detect_faces(&packed).await?;
    trace!("[pipeline] faces={} student={}", faces.len(), ctx.student_id);

    match faces.len() {
        0 => Ok(Some(ActivityKind::NoFace)),
        1 => match ctx.detector.estimate_head_pose(&faces, &packed).await? {
            Some(pose) if pose != HeadPose::Center => Ok(Some(ActivityKind::LookingAway)),
            _ => Ok(None),
        },
        _ => Ok(Some(ActivityKind::MultipleFaces)),
    }
}

/// 디바운스: 직전 보고와 같은 활동은 재방출하지 않는다.
/// None(정면 복귀)은 last_reported를 리셋해 같은 활동의 재보고를 허용.
async fn debounce_and_emit(
    activity: Option<ActivityKind>,
    state:    &mut PipelineState,
    ctx:      &PipelineContext,
) {
    let kind = match activity {
        None => {
            state.last_reported = None;
            return;
        }
        Some(kind) => kind,
    };
    if state.last_reported == Some(kind) {
        return;
    }

    let timestamp = iso_timestamp();
    let id = current_timestamp();

    // 영속화 실패 시 last_reported를 갱신하지 않는다 — 다음 샘플에서 재시도
    if let Err(e) = ctx.sink.append(&ctx.student_id, kind, &timestamp).await {
        error!("[pipeline] sink append failed student={}: {}", ctx.student_id, e);
        return;
    }
    state.last_reported = Some(kind);

    let detected = ActivityDetected {
        student_id: ctx.student_id.clone(),
        activity:   kind,
        timestamp,
        id,
    };
    if ctx.activity_tx.send(detected).await.is_err() {
        warn!("[pipeline] dispatcher closed student={}", ctx.student_id);
    }
}
