pub mod config;
pub mod error;
pub mod locate;
pub mod resolve;
pub mod rewrite;
pub mod syntax;
pub mod toggle;

pub use error::Error;
pub use toggle::{Inspection, ToggleOptions, Toggled, inspect, toggle, toggle_source};
