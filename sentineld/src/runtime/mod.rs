pub mod poller;
pub mod supervisor;

pub use supervisor::Supervisor;
