//! Console front-end: command-line parsing and the text rendering of engine
//! replies. The runtime feeds stdin lines through `parse_command` and prints
//! what `view` produces.

mod command;
mod view;

pub use command::*;
pub use view::*;
