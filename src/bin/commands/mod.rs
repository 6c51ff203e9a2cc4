pub mod info_cmd;
pub mod lookup_cmd;

pub use info_cmd::cmd_info;
pub use lookup_cmd::{cmd_lookup, LookupFormat};
