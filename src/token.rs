// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The hand-off chain that keeps sibling workers in order.
//!
//! There is exactly one OrderToken.  Worker 0 starts out holding it;
//! worker k+1 can only get it from worker k.  Between each adjacent
//! pair sits a channel that carries the token and, before it, any
//! number of heartbeats.  A worker sends a heartbeat whenever it
//! finishes a frame, and a worker that is waiting relays the
//! heartbeats it hears, so everyone further down the chain knows the
//! chain ahead of it is still moving.  A timeout therefore measures
//! silence, not the length of the queue.
//!
//! A link that holds the token is a guard: dropping it, whether the
//! holder finished, returned an error, or unwound from a panic, sends
//! the token on.  A link dropped without the token disconnects the
//! channel instead, which the successor sees at once.  Nobody waits
//! on a worker that is gone.

use crate::errors::{RenderError, Result};
use crossbeam::channel::{unbounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use log::{debug, warn};
use std::time::Duration;

/// Permission to proceed, as passed from one worker to the next.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct OrderToken {
    /// The worker that released it.
    pub from: u32,
    /// Whether that worker finished without error.
    pub clean: bool,
}

/// What travels down the chain.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Signal {
    /// Worker `from` just finished a frame.
    Alive {
        /// The worker that made progress.
        from: u32,
    },
    /// The token itself.
    Token(OrderToken),
}

/// One worker's place in the chain: where its token comes from, where
/// it goes next, and whether the worker has it right now.
#[derive(Debug)]
pub struct Handoff {
    process_id: u32,
    upstream: Option<Receiver<Signal>>,
    downstream: Option<Sender<Signal>>,
    holding: bool,
    clean: bool,
}

/// Build the chain for `workers` workers.  Element k belongs to
/// worker k; the first has no upstream and the last no downstream.
pub fn token_chain(workers: u32) -> Vec<Handoff> {
    let mut links: Vec<Handoff> = (0..workers)
        .map(|process_id| Handoff {
            process_id,
            upstream: None,
            downstream: None,
            holding: process_id == 0,
            clean: false,
        })
        .collect();
    for k in 1..links.len() {
        let (sender, receiver) = unbounded();
        links[k - 1].downstream = Some(sender);
        links[k].upstream = Some(receiver);
    }
    links
}

impl Handoff {
    /// The worker this link belongs to.
    pub fn process_id(&self) -> u32 {
        self.process_id
    }

    /// True once the worker has the token; from the start for
    /// worker 0.
    pub fn holds_token(&self) -> bool {
        self.holding
    }

    /// Tell the workers further down that this one is still making
    /// progress.  Never blocks.
    pub fn heartbeat(&self) {
        self.forward(Signal::Alive {
            from: self.process_id,
        });
    }

    fn forward(&self, signal: Signal) {
        if let Some(downstream) = &self.downstream {
            // A successor that already gave up has nothing to hear.
            let _ = downstream.send(signal);
        }
    }

    fn accept(&mut self, signal: Signal) {
        match signal {
            Signal::Alive { .. } => self.forward(signal),
            Signal::Token(token) => {
                if !token.clean {
                    warn!(
                        "worker {} took over from worker {}, which did not finish cleanly",
                        self.process_id, token.from
                    );
                }
                debug!(
                    "worker {} received the token from worker {}",
                    self.process_id, token.from
                );
                self.holding = true;
            }
        }
    }

    /// Check, without blocking, whether the token has arrived.
    /// Heartbeats that came in meanwhile are relayed downstream.
    pub fn try_acquire(&mut self) -> Result<bool> {
        while !self.holding {
            let signal = match &self.upstream {
                Some(upstream) => match upstream.try_recv() {
                    Ok(signal) => signal,
                    Err(TryRecvError::Empty) => return Ok(false),
                    Err(TryRecvError::Disconnected) => return Err(self.lost()),
                },
                None => return Err(self.lost()),
            };
            self.accept(signal);
        }
        Ok(true)
    }

    /// Block until the token arrives.  With a `timeout`, give up once
    /// nothing at all, neither token nor heartbeat, has come from
    /// upstream for that long.
    pub fn acquire(&mut self, timeout: Option<Duration>) -> Result<()> {
        let process_id = self.process_id;
        while !self.holding {
            let signal = match (&self.upstream, timeout) {
                (Some(upstream), Some(waited)) => upstream.recv_timeout(waited).map_err(|e| match e {
                    RecvTimeoutError::Timeout => RenderError::HandoffTimeout { process_id, waited },
                    RecvTimeoutError::Disconnected => RenderError::HandoffLost { process_id },
                }),
                (Some(upstream), None) => upstream
                    .recv()
                    .map_err(|_| RenderError::HandoffLost { process_id }),
                (None, _) => Err(self.lost()),
            }?;
            self.accept(signal);
        }
        Ok(())
    }

    /// Pass the token on, recording that this worker finished cleanly.
    pub fn release(mut self) {
        self.clean = true;
    }

    fn lost(&self) -> RenderError {
        RenderError::HandoffLost {
            process_id: self.process_id,
        }
    }
}

impl Drop for Handoff {
    fn drop(&mut self) {
        if !self.holding {
            return;
        }
        if let Some(downstream) = self.downstream.take() {
            let token = OrderToken {
                from: self.process_id,
                clean: self.clean,
            };
            if downstream.send(Signal::Token(token)).is_err() {
                debug!(
                    "worker {} has no successor left to take the token",
                    self.process_id
                );
            }
        }
    }
}
