pub mod cache;
pub mod options;
pub mod overlay;
pub mod skeleton;
pub mod surface;
#[cfg(feature = "desktop")]
pub mod window;

pub use cache::RenderCache;
pub use options::{Color, OptionChange, VisualizationOptions};
pub use overlay::{OverlayRenderer, RenderOutcome, RenderStats};
pub use skeleton::{draw_pose, draw_record};
pub use surface::{Canvas, Snapshot, Surface};
#[cfg(feature = "desktop")]
pub use minifb::Key;
#[cfg(feature = "desktop")]
pub use window::OverlayWindow;
