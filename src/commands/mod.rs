mod discover;
mod init;
mod run;
mod status;

pub use discover::list_pending;
pub use init::init_config;
pub use run::{run_harvest, RunOverrides};
pub use status::show_status;
