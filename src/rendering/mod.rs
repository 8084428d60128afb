pub mod blend;
pub mod canvas;

pub use blend::*;
pub use canvas::{canvas_for, Canvas};
