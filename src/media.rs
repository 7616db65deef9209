// author: kodeholic (powered by Claude)

pub mod answerer;
pub mod engine;

pub use answerer::{IceLiteEngine, ServerCert};
pub use engine::{
    EngineConnState, EngineEvent, FrameSource, IceConfig, MediaConnection, MediaEngine,
    SessionDescription, VideoFrame, VideoTap,
};
