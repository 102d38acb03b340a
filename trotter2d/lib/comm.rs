//! Process-group communication.
//!
//! The engine assumes it runs inside an already-formed group of workers with
//! known size and rank; it only needs blocking point-to-point messages between
//! fixed neighbours, a sum reduction, and a way to tear the group down when
//! something goes wrong. [`Communicator`] captures exactly that.
//!
//! Two groups are provided:
//! - [`Solo`]: a single worker, where every neighbour is the worker itself.
//! - [`ThreadGroup`]: `N` workers on scoped threads, wired together by
//!   [`crossbeam_channel`] mailboxes.

use std::{ cell::RefCell, thread, time::Duration };
use crossbeam_channel::{ self as channel, Receiver, RecvTimeoutError, Sender };
use num_complex::Complex64 as C64;
use tracing::{ debug, error, warn };
use crate::{ error::CommError, lattice::Direction };

pub type CommResult<T> = Result<T, CommError>;

/// Default time a receive waits for a peer before giving up.
pub const DEF_TIMEOUT: Duration = Duration::from_secs(60);

/// Label attached to every message so that a receiver can match it against
/// what it expects.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Tag {
    /// Halo strip travelling in the given direction.
    Halo(Direction),
    /// Contribution to a sum reduction.
    Reduce,
    /// Interior block sent to the root of a gather.
    Gather,
}

/// Message contents.
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    Amplitudes(Vec<C64>),
    Reals(Vec<f64>),
}

impl Payload {
    pub(crate) fn into_amplitudes(self, peer: usize, tag: Tag)
        -> CommResult<Vec<C64>>
    {
        match self {
            Self::Amplitudes(data) => Ok(data),
            Self::Reals(_) => Err(CommError::UnexpectedPayload { peer, tag }),
        }
    }

    pub(crate) fn into_reals(self, peer: usize, tag: Tag)
        -> CommResult<Vec<f64>>
    {
        match self {
            Self::Reals(data) => Ok(data),
            Self::Amplitudes(_) => Err(CommError::UnexpectedPayload { peer, tag }),
        }
    }
}

/// Handle on a group of cooperating workers.
///
/// Sends never block. Receives block until the matching message from the
/// given peer arrives, and fail if the group was aborted.
pub trait Communicator {
    /// This worker's rank.
    fn rank(&self) -> usize;

    /// Number of workers in the group.
    fn size(&self) -> usize;

    /// Send a message to `dest`.
    fn send(&self, dest: usize, tag: Tag, payload: Payload) -> CommResult<()>;

    /// Block until the next message with `tag` from `src` arrives.
    fn recv(&self, src: usize, tag: Tag) -> CommResult<Payload>;

    /// Tear down the group: every other worker fails at its next receive.
    fn abort(&self, reason: &str);

    /// Element-wise sum of `values` over the whole group, returned to every
    /// worker.
    ///
    /// Contributions are added in rank order on every worker, so all workers
    /// obtain bit-identical totals.
    fn all_reduce(&self, values: &[f64]) -> CommResult<Vec<f64>> {
        let (rank, size) = (self.rank(), self.size());
        if size == 1 { return Ok(values.to_vec()); }
        for peer in (0..size).filter(|&p| p != rank) {
            self.send(peer, Tag::Reduce, Payload::Reals(values.to_vec()))?;
        }
        let mut total = vec![0.0; values.len()];
        for peer in 0..size {
            let part
                = if peer == rank {
                    values.to_vec()
                } else {
                    self.recv(peer, Tag::Reduce)?
                        .into_reals(peer, Tag::Reduce)?
                };
            if part.len() != values.len() {
                return Err(CommError::BadLength {
                    peer,
                    tag: Tag::Reduce,
                    expected: values.len(),
                    got: part.len(),
                });
            }
            total.iter_mut().zip(part)
                .for_each(|(tk, pk)| { *tk += pk; });
        }
        Ok(total)
    }

    /// Sum of a single value over the whole group.
    fn all_reduce_sum(&self, value: f64) -> CommResult<f64> {
        Ok(self.all_reduce(&[value])?[0])
    }
}

/// A group of one.
#[derive(Copy, Clone, Debug, Default)]
pub struct Solo;

impl Communicator for Solo {
    fn rank(&self) -> usize { 0 }

    fn size(&self) -> usize { 1 }

    fn send(&self, dest: usize, _tag: Tag, _payload: Payload) -> CommResult<()> {
        Err(CommError::NoSuchPeer { peer: dest, size: 1 })
    }

    fn recv(&self, src: usize, _tag: Tag) -> CommResult<Payload> {
        Err(CommError::NoSuchPeer { peer: src, size: 1 })
    }

    fn abort(&self, reason: &str) {
        error!(reason, "single-worker run aborted");
    }
}

#[derive(Debug)]
enum Body {
    Data(Tag, Payload),
    Abort(String),
}

#[derive(Debug)]
struct Envelope {
    src: usize,
    body: Body,
}

/// One worker's endpoint in a [`ThreadGroup`].
///
/// Messages that arrive before they are asked for are parked until a matching
/// receive; messages from one sender with one tag are delivered in order.
pub struct ThreadComm {
    rank: usize,
    outboxes: Vec<Sender<Envelope>>,
    inbox: Receiver<Envelope>,
    parked: RefCell<Vec<(usize, Tag, Payload)>>,
    aborted: RefCell<Option<(usize, String)>>,
    timeout: Duration,
}

impl ThreadComm {
    fn check_peer(&self, peer: usize) -> CommResult<()> {
        (peer < self.outboxes.len()).then_some(())
            .ok_or(CommError::NoSuchPeer { peer, size: self.outboxes.len() })
    }

    fn check_aborted(&self) -> CommResult<()> {
        match self.aborted.borrow().as_ref() {
            Some((origin, reason))
                => Err(CommError::Aborted { origin: *origin, reason: reason.clone() }),
            None => Ok(()),
        }
    }

    // Drain whatever is already in the inbox, parking data, and report an
    // abort if one is waiting. A dropped peer mailbox usually means that peer
    // aborted before it went away.
    fn pending_abort(&self) -> Option<CommError> {
        for Envelope { src, body } in self.inbox.try_iter() {
            match body {
                Body::Abort(reason) => {
                    *self.aborted.borrow_mut() = Some((src, reason.clone()));
                    return Some(CommError::Aborted { origin: src, reason });
                },
                Body::Data(tag, payload) => {
                    self.parked.borrow_mut().push((src, tag, payload));
                },
            }
        }
        None
    }
}

impl Communicator for ThreadComm {
    fn rank(&self) -> usize { self.rank }

    fn size(&self) -> usize { self.outboxes.len() }

    fn send(&self, dest: usize, tag: Tag, payload: Payload) -> CommResult<()> {
        self.check_peer(dest)?;
        self.check_aborted()?;
        let envelope = Envelope { src: self.rank, body: Body::Data(tag, payload) };
        self.outboxes[dest].send(envelope)
            .map_err(|_| {
                self.pending_abort()
                    .unwrap_or(CommError::Disconnected { peer: dest })
            })
    }

    fn recv(&self, src: usize, tag: Tag) -> CommResult<Payload> {
        self.check_peer(src)?;
        self.check_aborted()?;
        {
            let mut parked = self.parked.borrow_mut();
            if let Some(k)
                = parked.iter().position(|(s, t, _)| *s == src && *t == tag)
            {
                return Ok(parked.remove(k).2);
            }
        }
        loop {
            match self.inbox.recv_timeout(self.timeout) {
                Ok(Envelope { src: origin, body: Body::Abort(reason) }) => {
                    *self.aborted.borrow_mut() = Some((origin, reason.clone()));
                    return Err(CommError::Aborted { origin, reason });
                },
                Ok(Envelope { src: s, body: Body::Data(t, payload) }) => {
                    if s == src && t == tag { return Ok(payload); }
                    self.parked.borrow_mut().push((s, t, payload));
                },
                Err(RecvTimeoutError::Timeout) => {
                    warn!(rank = self.rank, peer = src, ?tag, "receive timed out");
                    return Err(CommError::Timeout { rank: self.rank, peer: src, tag });
                },
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(
                        self.pending_abort()
                            .unwrap_or(CommError::Disconnected { peer: src })
                    );
                },
            }
        }
    }

    fn abort(&self, reason: &str) {
        error!(rank = self.rank, reason, "aborting process group");
        *self.aborted.borrow_mut() = Some((self.rank, reason.to_string()));
        self.outboxes.iter().enumerate()
            .filter(|(peer, _)| *peer != self.rank)
            .for_each(|(_, outbox)| {
                let envelope = Envelope {
                    src: self.rank,
                    body: Body::Abort(reason.to_string()),
                };
                // a peer that already finished has nothing left to abort
                let _ = outbox.send(envelope);
            });
    }
}

/// A process group of `size` workers running on scoped threads.
#[derive(Copy, Clone, Debug)]
pub struct ThreadGroup {
    size: usize,
    timeout: Duration,
}

impl ThreadGroup {
    /// *Panics if `size` is zero*.
    pub fn new(size: usize) -> Self {
        assert!(size > 0, "thread group must have at least one worker");
        Self { size, timeout: DEF_TIMEOUT }
    }

    /// Set how long a receive waits for a peer.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn size(&self) -> usize { self.size }

    /// Run `worker` once per rank, each on its own thread with its own
    /// [`ThreadComm`], and collect the results in rank order.
    ///
    /// A worker that panics aborts the rest of the group before the panic is
    /// propagated.
    pub fn run<F, R>(&self, worker: F) -> Vec<R>
    where
        F: Fn(ThreadComm) -> R + Sync,
        R: Send,
    {
        let (outboxes, inboxes): (Vec<_>, Vec<_>)
            = (0..self.size).map(|_| channel::unbounded::<Envelope>()).unzip();
        debug!(size = self.size, "starting thread group");
        let worker = &worker;
        thread::scope(|scope| {
            let handles: Vec<_>
                = inboxes.into_iter().enumerate()
                .map(|(rank, inbox)| {
                    let comm = ThreadComm {
                        rank,
                        outboxes: outboxes.clone(),
                        inbox,
                        parked: RefCell::new(Vec::new()),
                        aborted: RefCell::new(None),
                        timeout: self.timeout,
                    };
                    let panic_outboxes = outboxes.clone();
                    scope.spawn(move || {
                        let _guard = PanicGuard { rank, outboxes: panic_outboxes };
                        worker(comm)
                    })
                })
                .collect();
            handles.into_iter()
                .map(|h| match h.join() {
                    Ok(out) => out,
                    Err(payload) => std::panic::resume_unwind(payload),
                })
                .collect()
        })
    }
}

// broadcasts an abort if a worker unwinds
struct PanicGuard {
    rank: usize,
    outboxes: Vec<Sender<Envelope>>,
}

impl Drop for PanicGuard {
    fn drop(&mut self) {
        if !thread::panicking() { return; }
        error!(rank = self.rank, "worker panicked; aborting process group");
        self.outboxes.iter().enumerate()
            .filter(|(peer, _)| *peer != self.rank)
            .for_each(|(_, outbox)| {
                let _ = outbox.send(Envelope {
                    src: self.rank,
                    body: Body::Abort("worker panicked".to_string()),
                });
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parked_messages_are_matched_by_tag() {
        let out = ThreadGroup::new(2).run(|comm| {
            if comm.rank() == 0 {
                comm.send(1, Tag::Gather, Payload::Reals(vec![2.0])).unwrap();
                comm.send(1, Tag::Reduce, Payload::Reals(vec![1.0])).unwrap();
                0.0
            } else {
                let a = comm.recv(0, Tag::Reduce).unwrap()
                    .into_reals(0, Tag::Reduce).unwrap();
                let b = comm.recv(0, Tag::Gather).unwrap()
                    .into_reals(0, Tag::Gather).unwrap();
                a[0] * 10.0 + b[0]
            }
        });
        assert_eq!(out, vec![0.0, 12.0]);
    }

    #[test]
    fn solo_reduce_is_identity() {
        assert_eq!(Solo.all_reduce(&[1.5, -2.0]).unwrap(), vec![1.5, -2.0]);
        assert!(Solo.send(1, Tag::Reduce, Payload::Reals(vec![])).is_err());
    }
}
