// AtomSim - Cycle-Accurate SoC Simulation Backend
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Sinks receiving the bytes a UART transmits.
//!
//! Sinks sit on the simulation hot path, so `offer` must never block: a sink
//! that cannot take a byte right now rejects it and the UART only counts the
//! drop.

use crossbeam_channel::{Receiver, Sender, TrySendError};
use std::sync::{Arc, Mutex, TryLockError};

pub trait TranscriptSink: std::fmt::Debug + Send {
    /// Offers one byte. Returns `false` if the byte was dropped.
    fn offer(&mut self, byte: u8) -> bool;
}

/// In-memory capture shared with the embedding harness.
#[derive(Debug, Clone)]
pub struct SharedBuffer {
    buf: Arc<Mutex<Vec<u8>>>,
    limit: usize,
}

impl SharedBuffer {
    pub fn new(limit: usize) -> Self {
        Self {
            buf: Arc::new(Mutex::new(Vec::new())),
            limit,
        }
    }

    pub fn unbounded() -> Self {
        Self::new(usize::MAX)
    }

    pub fn contents(&self) -> Vec<u8> {
        match self.buf.lock() {
            Ok(buf) => buf.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn contents_lossy(&self) -> String {
        String::from_utf8_lossy(&self.contents()).into_owned()
    }
}

impl TranscriptSink for SharedBuffer {
    fn offer(&mut self, byte: u8) -> bool {
        let mut buf = match self.buf.try_lock() {
            Ok(buf) => buf,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            // Reader holds the lock; don't wait for it.
            Err(TryLockError::WouldBlock) => return false,
        };
        if buf.len() >= self.limit {
            return false;
        }
        buf.push(byte);
        true
    }
}

/// Forwards bytes over a bounded channel to a consumer thread.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: Sender<u8>,
}

impl ChannelSink {
    pub fn new(tx: Sender<u8>) -> Self {
        Self { tx }
    }

    /// Creates a sink and the receiving end of its channel.
    pub fn bounded(capacity: usize) -> (Self, Receiver<u8>) {
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        (Self::new(tx), rx)
    }
}

impl TranscriptSink for ChannelSink {
    fn offer(&mut self, byte: u8) -> bool {
        match self.tx.try_send(byte) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => false,
        }
    }
}
