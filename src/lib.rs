#![allow(clippy::uninlined_format_args)]

pub mod app;
pub mod binder;
pub mod config;
pub mod data;
pub mod format;
pub mod handle;
pub mod markup;
pub mod media;
pub mod model;
pub mod state;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use app::run;
pub use binder::{CellBinder, Options, Services};
pub use handle::Handle;
pub use model::{Post, PostCell, Profile};
