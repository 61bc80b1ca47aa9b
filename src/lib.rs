//! Draws a single flat-colored shape in a fixed-size window.
//!
//! The `triangle` and `sierpinski` binaries share everything here and only
//! differ in the [`Shape`] they hand to [`run`].

use gfx_hal::window;

pub mod app;
pub mod renderer;

pub use app::{exit_code, run, AppError};
pub use renderer::{Mesh, Shape, Vertex};

pub const TITLE: &str = "Title";

pub const DIMS: window::Extent2D = window::Extent2D {
    width: 800,
    height: 800,
};

pub const CLEAR_COLOR: [f32; 4] = [0.07, 0.13, 0.17, 1.0];

/// RGB of every fragment. Alpha is always 1.
pub const FILL_COLOR: [f32; 3] = [0.8, 0.3, 0.02];

pub const FRAMES_IN_FLIGHT: usize = 2;

/// Status reported when setup fails, window creation included.
pub const FAILURE_EXIT_CODE: i32 = -1;

/// Installs the `env_logger` backend, defaulting to `info` unless `RUST_LOG` says otherwise.
pub fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}
