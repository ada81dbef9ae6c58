//! Client side of the jibe generation service.
//!
//! [`ApiClient`] speaks the HTTP API, [`Poller`] turns an accepted task id
//! into a final [`PollOutcome`], and [`PollSlot`] keeps at most one poll
//! running for a given view.

pub mod api;
pub mod error;
pub mod poller;

pub use api::ApiClient;
pub use error::ClientError;
pub use poller::{PollOutcome, PollSlot, Poller, StatusSource};
