//! Client side of the job progress protocol.
//!
//! [`http::ProgressClient`] talks to a running server; [`poller::ProgressPoller`]
//! drives the fixed-interval status loop until the job reaches a terminal state.

pub mod http;
pub mod poller;
