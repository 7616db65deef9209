// author: kodeholic (powered by Claude)
// 좀비 세션 자동 종료 태스크
//
// 주기마다 수행:
//   1. 좀비 전송 (WS 하트비트 없음) 식별
//   2. 해당 sid의 세션을 cleanup 게이트 경유로 teardown — 명시적
//      disconnect와 동시에 걸려도 티켓 덕에 close는 정확히 1회
//   3. 라우팅 테이블에서 제거

use std::sync::Arc;

use tracing::info;

use crate::config;
use crate::core::{PeerHub, SessionRegistry};
use crate::protocol::disconnect_cleanup;

pub async fn run_zombie_reaper(peer_hub: Arc<PeerHub>, registry: Arc<SessionRegistry>) {
    let interval  = tokio::time::Duration::from_millis(config::REAPER_INTERVAL_MS);
    let mut timer = tokio::time::interval(interval);
    timer.tick().await; // 첫 틱 skip (startup 시 즉시 실행 방지)

    info!("[zombie-reaper] Started (interval={}ms, timeout={}ms)",
        config::REAPER_INTERVAL_MS, config::ZOMBIE_TIMEOUT_MS);

    loop {
        timer.tick().await;

        let dead = peer_hub.find_zombies(config::ZOMBIE_TIMEOUT_MS);
        for sid in &dead {
            disconnect_cleanup(&registry, sid).await;
            peer_hub.unregister(sid);
            info!("[zombie-reaper] sid={} removed (no heartbeat)", sid);
        }

        if !dead.is_empty() {
            info!("[zombie-reaper] Cleaned {} transport(s)", dead.len());
        }
    }
}
