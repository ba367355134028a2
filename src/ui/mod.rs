pub mod icons;
pub mod progress;

pub use progress::{PipelineUI, format_elapsed};
