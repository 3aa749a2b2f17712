//! Command bus between the HTTP gateway and the worker.
//!
//! Producers wrap a task request in an [`Envelope`], enqueue it together with
//! a fresh [`ResponseSlot`], and wait on the matching [`SlotReceiver`]. The
//! [`Worker`] drains the queue one job at a time, checks access, runs the
//! handler, and resolves the slot. Chat replies travel the same queue so the
//! session is only ever used from the worker loop.

pub mod envelope;
pub mod queue;
pub mod worker;

pub use {
    envelope::{Envelope, ResponseSlot, SlotReceiver, response_slot},
    queue::{BusReceiver, BusSender, Job, Reply, channel},
    worker::Worker,
};
