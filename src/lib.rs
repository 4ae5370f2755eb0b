//! Shard Compositor Library
//!
//! Sort-last image compositing for parallel volume rendering: every rank
//! renders its own shard of the data into a full-size RGBA frame, and the
//! coordinator blends the frames back to front into one final image.

pub mod compositor;
pub mod dataset;
pub mod frame;
pub mod launcher;
pub mod output;
pub mod partition;
pub mod pipeline;
pub mod render;
pub mod settings;
pub mod telemetry;
pub mod transport;
pub mod visibility;

pub use compositor::{composite_in_order, CompositeAccumulator, CompositeError};
pub use frame::{FrameError, RgbaFrame};
pub use partition::{Bounds, Shard};
pub use pipeline::{run_rank, PipelineError, RankOutcome};
pub use render::{Camera, RenderedFrame, Renderer, SplatRenderer};
pub use settings::{RunSettings, SettingsError};
pub use transport::{Communicator, LocalGroup, TcpCommunicator, TransportError};
pub use visibility::{ProcessRecord, VisibilityOrder};
