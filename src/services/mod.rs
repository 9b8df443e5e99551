pub mod feed;
pub mod gate;
pub mod ical;
pub mod projector;
pub mod share;
pub mod throttle;
pub mod token;

pub use feed::FeedService;
pub use gate::{AccessGate, GateResult};
pub use ical::FeedEncoder;
pub use projector::RecordProjector;
pub use share::ShareService;
pub use throttle::PinAttemptLimiter;
pub use token::{FeedToken, ShareToken};
