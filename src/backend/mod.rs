//! Concrete realizations of the [`crate::ports`] contracts (C7).
//!
//! `aws` is the production adapter set; [`crate::testing`] is the
//! in-memory equivalent used by tests. Either can be handed to
//! [`crate::worker::run`] or [`crate::dispatcher::dispatch`] interchangeably
//! because both only ever see the `ports` traits.

pub mod aws;
