//! The render-time machinery: variable scopes, render-scoped state and the
//! state threaded through node rendering.
mod context;
mod render_context;
mod state;

pub use self::context::Context;
pub use self::render_context::{BlockContext, RenderContext};
pub use self::state::State;
