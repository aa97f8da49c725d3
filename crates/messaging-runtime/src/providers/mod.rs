//! Broker provider implementations.
//!
//! This module contains concrete implementations of the `MessageSender`,
//! `MessageReceiver` and `MessagingClient` traits. Network adapters live in
//! their own crates and plug in through the same traits.

pub mod memory;

pub use memory::{InMemoryBroker, InMemoryReceiver, InMemorySender};
