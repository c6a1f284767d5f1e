mod config;
pub use config::*;

mod jobs;
pub use jobs::*;

mod registry;
pub use registry::*;

mod state;
pub use state::*;

mod system;
pub use system::*;

mod wifi;
pub use wifi::*;

mod zigbee;
pub use zigbee::*;
