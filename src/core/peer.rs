// author: kodeholic (powered by Claude)
// PeerHub — 전송 연결(sid) 라우팅 테이블
//
// sid 단위 주소 지정(send_to)과 발신자 제외 브로드캐스트를 제공한다.
// socket.io의 to= / skip_sid= 의미론과 동일.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tokio::sync::mpsc;
use tracing::{trace, warn};

use crate::utils::current_timestamp;

/// 송신자 타입 (직렬화된 GatewayPacket JSON)
pub type EgressTx = mpsc::Sender<String>;

// ----------------------------------------------------------------------------
// [Peer] — WS 수락 시 등록, WS 종료 시 제거
// ----------------------------------------------------------------------------

pub struct Peer {
    pub tx:        EgressTx,
    pub last_seen: AtomicU64, // 마지막 메시지 수신 시간 (좀비 세션 감지용)
}

impl Peer {
    pub fn new(tx: EgressTx) -> Self {
        Self { tx, last_seen: AtomicU64::new(current_timestamp()) }
    }

    pub fn touch(&self) {
        self.last_seen.store(current_timestamp(), Ordering::Relaxed);
    }
}

// ----------------------------------------------------------------------------
// [PeerHub] — 전역 라우팅 테이블
// ----------------------------------------------------------------------------

pub struct PeerHub {
    peers: RwLock<HashMap<String, Arc<Peer>>>,
}

impl PeerHub {
    pub fn new() -> Self {
        trace!("Initializing PeerHub");
        Self { peers: RwLock::new(HashMap::new()) }
    }

    pub fn register(&self, sid: &str, tx: EgressTx) -> Arc<Peer> {
        let peer = Arc::new(Peer::new(tx));
        self.peers.write().unwrap().insert(sid.to_string(), Arc::clone(&peer));
        trace!("Peer registered: {}", sid);
        peer
    }

    pub fn unregister(&self, sid: &str) {
        self.peers.write().unwrap().remove(sid);
        trace!("Peer unregistered: {}", sid);
    }

    pub fn get(&self, sid: &str) -> Option<Arc<Peer>> {
        self.peers.read().unwrap().get(sid).cloned()
    }

    /// 특정 sid로 패킷 전송. 수신자가 없으면 false.
    pub async fn send_to(&self, sid: &str, packet_json: &str) -> bool {
        let peer = match self.get(sid) {
            Some(p) => p,
            None => {
                warn!("send_to: unknown sid {}", sid);
                return false;
            }
        };
        if peer.tx.send(packet_json.to_string()).await.is_err() {
            warn!("send_to: rx closed sid={}", sid);
            return false;
        }
        true
    }

    /// 발신자를 제외한 전체 피어에 패킷 전송 (socket.io skip_sid)
    pub async fn broadcast_except(&self, packet_json: &str, exclude_sid: &str) {
        let targets: Vec<Arc<Peer>> = {
            let peers = self.peers.read().unwrap();
            peers
                .iter()
                .filter(|(sid, _)| sid.as_str() != exclude_sid)
                .map(|(_, p)| Arc::clone(p))
                .collect()
        };
        for peer in targets {
            if peer.tx.send(packet_json.to_string()).await.is_err() {
                warn!("Broadcast failed: rx closed");
            }
        }
    }

    /// 현재 접속 피어 수
    pub fn count(&self) -> usize {
        self.peers.read().unwrap().len()
    }

    /// 좀비 전송 목록 반환 (last_seen 기준)
    pub fn find_zombies(&self, timeout_ms: u64) -> Vec<String> {
        let now = current_timestamp();
        self.peers.read().unwrap()
            .iter()
            .filter(|(_, p)| now.saturating_sub(p.last_seen.load(Ordering::Relaxed)) >= timeout_ms)
            .map(|(sid, _)| sid.clone())
            .collect()
    }
}

impl Default for PeerHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_tx() -> (EgressTx, mpsc::Receiver<String>) {
        mpsc::channel(16)
    }

    #[test]
    fn register_and_get() {
        let hub = PeerHub::new();
        let (tx, _rx) = make_tx();
        hub.register("sid1", tx);
        assert!(hub.get("sid1").is_some());
        assert!(hub.get("sid2").is_none());
    }

    #[test]
    fn unregister_removes_peer() {
        let hub = PeerHub::new();
        let (tx, _rx) = make_tx();
        hub.register("sid1", tx);
        hub.unregister("sid1");
        assert!(hub.get("sid1").is_none());
        assert_eq!(hub.count(), 0);
    }

    #[tokio::test]
    async fn send_to_reaches_target_only() {
        let hub = PeerHub::new();
        let (tx1, mut rx1) = make_tx();
        let (tx2, mut rx2) = make_tx();
        hub.register("sid1", tx1);
        hub.register("sid2", tx2);

        assert!(hub.send_to("sid1", "hello").await);
        assert_eq!(rx1.recv().await.unwrap(), "hello");
        assert!(rx2.try_recv().is_err());
    }

    #[tokio::test]
    async fn send_to_unknown_sid_returns_false() {
        let hub = PeerHub::new();
        assert!(!hub.send_to("ghost", "hello").await);
    }

    #[tokio::test]
    async fn broadcast_skips_sender() {
        let hub = PeerHub::new();
        let (tx1, mut rx1) = make_tx();
        let (tx2, mut rx2) = make_tx();
        let (tx3, mut rx3) = make_tx();
        hub.register("sid1", tx1);
        hub.register("sid2", tx2);
        hub.register("sid3", tx3);

        hub.broadcast_except("ping", "sid2").await;
        assert_eq!(rx1.recv().await.unwrap(), "ping");
        assert_eq!(rx3.recv().await.unwrap(), "ping");
        assert!(rx2.try_recv().is_err(), "발신자는 브로드캐스트에서 제외");
    }

    #[test]
    fn find_zombies_fresh_peers_empty() {
        let hub = PeerHub::new();
        let (tx, _rx) = make_tx();
        hub.register("sid1", tx);
        assert!(hub.find_zombies(60_000).is_empty());
    }
}
