//! Guild music playback engine.
//!
//! Every guild gets a session task (`session`) that owns its queue and reacts
//! to commands, sink completions and progress ticks. `Jukebox` is the surface
//! the chat front-end talks to.

mod looping;
mod player;
mod progress;
mod queue;
mod registry;
mod session;
mod sink;
mod thread;
mod types;

pub use progress::render;
pub use registry::{EngineSettings, Jukebox};
pub use sink::RodioSinkFactory;
pub use types::*;

#[cfg(test)]
mod tests;
