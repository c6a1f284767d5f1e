mod kv;
pub use kv::*;

mod schema;
pub use schema::*;

mod config;
pub use config::*;

mod devices;
pub use devices::*;
