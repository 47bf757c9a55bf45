pub mod cli;

pub use cli::{BatchArgs, Cli, Commands, LogFormat, MapArgs, MappingInputs, PolicyArg};
