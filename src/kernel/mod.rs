pub mod batch;
pub mod coordinator;
pub mod event;
pub mod playback;
pub mod segmenter;
pub mod session;
pub mod time;
pub mod upload;
