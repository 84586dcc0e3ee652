mod init;
mod repair;
mod runs;
mod serve;
mod sync;

pub use init::cmd_init_config;
pub use repair::cmd_repair;
pub use runs::cmd_runs;
pub use serve::cmd_serve;
pub use sync::cmd_sync;
