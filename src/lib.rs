pub mod config;
pub mod error;
pub mod logging;
pub mod providers;
pub mod remote;
pub mod server;
pub mod sink;
pub mod translate;

pub use config::BridgeConfig;
pub use error::{BridgeError, Result};
pub use logging::SharedJournal;
pub use remote::{RemoteClient, RemoteTarget};
pub use server::{build_router, AppState};
pub use sink::ResponseSink;
