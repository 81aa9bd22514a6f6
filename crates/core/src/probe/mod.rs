//! Media probing: reads codec, size and stream facts from a media file.

mod error;
mod ffprobe;
mod traits;

pub use error::ProbeError;
pub use ffprobe::FfprobeProbe;
pub use traits::MediaProbe;
