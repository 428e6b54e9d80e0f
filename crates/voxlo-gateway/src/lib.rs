pub mod broadcaster;
pub mod clock;
pub mod connection;
pub mod conversations;
pub mod directory;
pub mod error;
pub mod hub;
pub mod pairing;
pub mod reconcile;
pub mod registry;

pub use clock::{Clock, SystemClock};
pub use error::GatewayError;
pub use hub::Hub;
pub use registry::ConnId;
