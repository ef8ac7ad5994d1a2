//! Feed Session Adapters
//!
//! Concrete [`FeedSession`](crate::application::ports::FeedSession)
//! implementations.

mod replay;

pub use replay::ReplaySession;
