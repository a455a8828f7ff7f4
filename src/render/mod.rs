mod gpu;
mod shared;

pub use gpu::{RenderError, Renderer};
