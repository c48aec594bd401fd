pub mod store;
pub mod surface;
pub mod types;

pub use store::TaskStore;
pub use surface::{ImageSource, SurfaceState, ToolInput, ToolSurface};
pub use types::{GenerationTask, TaskStatus};
