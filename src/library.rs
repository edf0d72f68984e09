//! Track model and the resolvers that turn links into tracks.

mod display;
mod model;
mod resolve;
mod scan;
mod spotify;
mod ytdlp;

pub use model::*;
pub use resolve::{LocalResolver, PlatformResolver, TrackResolver};
