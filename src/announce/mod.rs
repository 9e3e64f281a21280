mod accessor;
mod announcer;
mod delay_queue;
mod executor;
mod handlers;
mod request;

pub use accessor::AnnounceDataAccessor;
pub use announcer::{Announcer, AnnouncerState};
pub use delay_queue::DelayQueue;
pub use executor::{AnnounceExecutor, AnnounceOutcomeSink};
pub use handlers::{AnnounceDomainEvent, OrchestratorNotifications, ResponseHandlerChain};
pub use request::{AnnounceEvent, AnnounceRequest};
