// author: kodeholic (powered by Claude)
// 네트워크 로직과 철저히 분리된, 순수 비즈니스 상태 관리 모듈입니다.

pub mod peer;
pub mod registry;
pub mod session;

pub use peer::{EgressTx, Peer, PeerHub};
pub use registry::SessionRegistry;
pub use session::{Session, SessionState};
