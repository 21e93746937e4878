pub mod change_log;
pub mod registry;

pub use change_log::{ChangeKey, ChangeLog};
pub use registry::{ClassRef, Registry, SETTINGS_TABLE};
