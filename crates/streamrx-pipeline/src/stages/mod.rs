//! Built-in stages and terminal renderers.

mod decode;
mod depacketize;
mod renderer;
mod track_generate;

pub use decode::Decode;
pub use depacketize::Depacketize;
pub use renderer::{frame_renderer, track_renderer, FrameRenderer, FrameSink, TrackRenderer};
pub use track_generate::TrackGenerate;
