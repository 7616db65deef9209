// author: kodeholic (powered by Claude)

pub mod candidate;
pub mod error_code;
pub mod message;
pub mod opcode;
pub mod protocol;

pub use protocol::{
    disconnect_cleanup, run_activity_dispatcher, teardown_session, ws_handler, AppState,
};
