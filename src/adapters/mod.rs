//! Adapters implementing the domain ports.

pub mod events;
pub mod mock;
pub mod process;
pub mod tool_preview;

pub use mock::{MockResponse, MockRunner};
pub use process::PiProcessRunner;
pub use tool_preview::format_tool_preview;
