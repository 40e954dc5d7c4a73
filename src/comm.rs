//! Point-to-point message passing between cooperating processes.
//!
//! [`Communicator`] is the small slice of an MPI-style runtime the algorithm
//! needs: an atomic send-receive-replace, non-blocking send and receive
//! returning [`Request`] handles, and waiting on those handles.
//!
//! [`ChannelComm`] implements it in-process. Each logical process owns one
//! endpoint and runs on its own thread. There is one FIFO channel per ordered
//! `(source, dest)` pair, and receives are matched on `(source, tag)`, so two
//! messages between the same pair never overtake each other.
//!
//! With the `mpi` feature, `comm_mpi::MpiComm` implements the same trait over
//! an MPI cartesian communicator.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, Sender};

use log::trace;

use crate::error::{communication_error, shape_mismatch, Result};
use crate::tile::Element;

/// Message tag used to match sends with receives.
pub type Tag = u32;

/// An outstanding non-blocking operation.
///
/// The request borrows the buffer it was issued on until it is waited on, so
/// the buffer of a pending receive cannot be read and the buffer of a pending
/// send cannot be modified in the meantime.
#[must_use = "a request must be waited on before its buffer is reused"]
#[derive(Debug)]
pub enum Request<'a, T> {
    Send {
        buf: &'a [T],
        dest: usize,
        tag: Tag,
    },
    Recv {
        buf: &'a mut [T],
        source: usize,
        tag: Tag,
    },
}

/// The message-passing capabilities Cannon's algorithm consumes.
pub trait Communicator<T: Element> {
    /// Rank of the calling process.
    fn rank(&self) -> usize;

    /// Number of processes in the communicator.
    fn size(&self) -> usize;

    /// Sends `buf` to `dest` and overwrites it with the message from `source`.
    ///
    /// Blocks until the replacement has arrived.
    fn sendrecv_replace(&self, buf: &mut [T], dest: usize, source: usize, tag: Tag)
        -> Result<()>;

    /// Starts sending `buf` to `dest` without blocking.
    fn isend<'a>(&self, buf: &'a [T], dest: usize, tag: Tag) -> Result<Request<'a, T>>;

    /// Posts a receive into `buf` from `source` without blocking.
    fn irecv<'a>(&self, buf: &'a mut [T], source: usize, tag: Tag) -> Result<Request<'a, T>>;

    /// Blocks until `request` has completed. There is no timeout.
    fn wait(&self, request: Request<'_, T>) -> Result<()>;

    /// Blocks until every request has completed, in order.
    fn wait_all<'a, I>(&self, requests: I) -> Result<()>
    where
        I: IntoIterator<Item = Request<'a, T>>,
        T: 'a,
    {
        for request in requests {
            self.wait(request)?;
        }
        Ok(())
    }

    /// Runs `work` while `requests` are in flight, then waits for all of them.
    ///
    /// The default suits backends that start a transfer as soon as its request
    /// is created. Backends whose transfers can only be live inside a scope
    /// override this to open the scope around `work`.
    fn overlap<'a, I, R, F>(&self, requests: I, work: F) -> Result<R>
    where
        I: IntoIterator<Item = Request<'a, T>>,
        T: 'a,
        F: FnOnce() -> R,
    {
        let out = work();
        self.wait_all(requests)?;
        Ok(out)
    }
}

struct Envelope<T> {
    tag: Tag,
    payload: Vec<T>,
}

/// In-process communicator endpoint for one rank.
pub struct ChannelComm<T> {
    rank: usize,
    outboxes: Vec<Sender<Envelope<T>>>,
    inboxes: Vec<Receiver<Envelope<T>>>,
    // Messages pulled off an inbox while looking for a different tag.
    stash: RefCell<Vec<VecDeque<Envelope<T>>>>,
}

impl<T: Element> ChannelComm<T> {
    /// Creates `size` fully connected endpoints, indexed by rank.
    pub fn world(size: usize) -> Vec<Self> {
        let mut outboxes: Vec<Vec<Sender<Envelope<T>>>> =
            (0..size).map(|_| Vec::with_capacity(size)).collect();
        let mut inboxes: Vec<Vec<Receiver<Envelope<T>>>> =
            (0..size).map(|_| Vec::with_capacity(size)).collect();

        for source in 0..size {
            for dest in 0..size {
                let (tx, rx) = mpsc::channel();
                outboxes[source].push(tx);
                inboxes[dest].push(rx);
            }
        }

        outboxes
            .into_iter()
            .zip(inboxes)
            .enumerate()
            .map(|(rank, (outboxes, inboxes))| ChannelComm {
                rank,
                outboxes,
                inboxes,
                stash: RefCell::new((0..size).map(|_| VecDeque::new()).collect()),
            })
            .collect()
    }

    fn post(&self, buf: &[T], dest: usize, tag: Tag) -> Result<()> {
        let outbox = self.outboxes.get(dest).ok_or_else(|| {
            communication_error(self.rank, format!("destination rank {dest} does not exist"))
        })?;
        trace!("rank {} -> {}: {} elements, tag {}", self.rank, dest, buf.len(), tag);
        outbox
            .send(Envelope {
                tag,
                payload: buf.to_vec(),
            })
            .map_err(|_| {
                communication_error(self.rank, format!("rank {dest} is no longer receiving"))
            })
    }

    fn take(&self, source: usize, tag: Tag) -> Result<Vec<T>> {
        let inbox = self.inboxes.get(source).ok_or_else(|| {
            communication_error(self.rank, format!("source rank {source} does not exist"))
        })?;

        let mut stash = self.stash.borrow_mut();
        let pending = &mut stash[source];
        if let Some(pos) = pending.iter().position(|e| e.tag == tag) {
            if let Some(envelope) = pending.remove(pos) {
                return Ok(envelope.payload);
            }
        }

        loop {
            let envelope = inbox.recv().map_err(|_| {
                communication_error(self.rank, format!("rank {source} hung up before sending"))
            })?;
            if envelope.tag == tag {
                trace!("rank {} <- {}: tag {}", self.rank, source, tag);
                return Ok(envelope.payload);
            }
            pending.push_back(envelope);
        }
    }

    fn receive_into(&self, buf: &mut [T], source: usize, tag: Tag) -> Result<()> {
        let payload = self.take(source, tag)?;
        if payload.len() != buf.len() {
            return Err(shape_mismatch(
                buf.len(),
                payload.len(),
                format!("rank {} got a message of the wrong size from rank {source}", self.rank),
            ));
        }
        buf.copy_from_slice(&payload);
        Ok(())
    }
}

impl<T: Element> Communicator<T> for ChannelComm<T> {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.outboxes.len()
    }

    fn sendrecv_replace(
        &self,
        buf: &mut [T],
        dest: usize,
        source: usize,
        tag: Tag,
    ) -> Result<()> {
        // Channels are unbounded, so posting first never blocks the exchange.
        self.post(buf, dest, tag)?;
        self.receive_into(buf, source, tag)
    }

    fn isend<'a>(&self, buf: &'a [T], dest: usize, tag: Tag) -> Result<Request<'a, T>> {
        self.post(buf, dest, tag)?;
        Ok(Request::Send { buf, dest, tag })
    }

    fn irecv<'a>(&self, buf: &'a mut [T], source: usize, tag: Tag) -> Result<Request<'a, T>> {
        if source >= self.inboxes.len() {
            return Err(communication_error(
                self.rank,
                format!("source rank {source} does not exist"),
            ));
        }
        Ok(Request::Recv { buf, source, tag })
    }

    fn wait(&self, request: Request<'_, T>) -> Result<()> {
        match request {
            // Sends are buffered when posted.
            Request::Send { .. } => Ok(()),
            Request::Recv { buf, source, tag } => self.receive_into(buf, source, tag),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CannonError;
    use std::thread;

    #[test]
    fn test_world_ranks_and_size() {
        let world = ChannelComm::<i32>::world(4);
        assert_eq!(world.len(), 4);
        for (i, ep) in world.iter().enumerate() {
            assert_eq!(ep.rank(), i);
            assert_eq!(ep.size(), 4);
        }
    }

    #[test]
    fn test_self_exchange() {
        let world = ChannelComm::<i32>::world(1);
        let mut buf = [1, 2, 3];
        world[0].sendrecv_replace(&mut buf, 0, 0, 7).unwrap();
        assert_eq!(buf, [1, 2, 3]);
    }

    #[test]
    fn test_pairwise_swap() {
        let mut world = ChannelComm::<i64>::world(2);
        let b = world.pop().unwrap();
        let a = world.pop().unwrap();

        thread::scope(|s| {
            let ha = s.spawn(move || {
                let mut buf = [1, 1];
                a.sendrecv_replace(&mut buf, 1, 1, 0).map(|_| buf)
            });
            let hb = s.spawn(move || {
                let mut buf = [2, 2];
                b.sendrecv_replace(&mut buf, 0, 0, 0).map(|_| buf)
            });
            assert_eq!(ha.join().unwrap().unwrap(), [2, 2]);
            assert_eq!(hb.join().unwrap().unwrap(), [1, 1]);
        });
    }

    #[test]
    fn test_receive_matches_tag_out_of_order() {
        let world = ChannelComm::<i32>::world(1);
        let ep = &world[0];
        ep.wait(ep.isend(&[10], 0, 1).unwrap()).unwrap();
        ep.wait(ep.isend(&[20], 0, 2).unwrap()).unwrap();

        let mut second = [0];
        let mut first = [0];
        ep.wait(ep.irecv(&mut second, 0, 2).unwrap()).unwrap();
        ep.wait(ep.irecv(&mut first, 0, 1).unwrap()).unwrap();
        assert_eq!((first, second), ([10], [20]));
    }

    #[test]
    fn test_same_tag_is_fifo() {
        let world = ChannelComm::<i32>::world(1);
        let ep = &world[0];
        let sends = vec![ep.isend(&[1], 0, 5).unwrap(), ep.isend(&[2], 0, 5).unwrap()];
        ep.wait_all(sends).unwrap();

        let mut x = [0];
        let mut y = [0];
        let recvs = vec![ep.irecv(&mut x, 0, 5).unwrap(), ep.irecv(&mut y, 0, 5).unwrap()];
        ep.wait_all(recvs).unwrap();
        assert_eq!((x, y), ([1], [2]));
    }

    #[test]
    fn test_overlap_runs_work_before_completion() {
        let world = ChannelComm::<i32>::world(1);
        let ep = &world[0];
        let out = [4, 2];
        let mut into = [0; 2];
        let requests = [
            ep.isend(&out, 0, 3).unwrap(),
            ep.irecv(&mut into, 0, 3).unwrap(),
        ];
        let sum = ep.overlap(requests, || out.iter().sum::<i32>()).unwrap();
        assert_eq!(sum, 6);
        assert_eq!(into, [4, 2]);
    }

    #[test]
    fn test_length_mismatch_is_shape_error() {
        let world = ChannelComm::<f32>::world(1);
        let ep = &world[0];
        ep.wait(ep.isend(&[1.0, 2.0, 3.0], 0, 0).unwrap()).unwrap();
        let mut buf = [0.0; 2];
        let err = ep.wait(ep.irecv(&mut buf, 0, 0).unwrap()).unwrap_err();
        assert!(matches!(
            err,
            CannonError::ShapeMismatch {
                expected: 2,
                actual: 3,
                ..
            }
        ));
    }

    #[test]
    fn test_dropped_peer_is_communication_error() {
        let mut world = ChannelComm::<i32>::world(2);
        drop(world.pop());
        let ep = world.pop().unwrap();

        let mut buf = [0];
        let err = ep.sendrecv_replace(&mut buf, 1, 1, 0).unwrap_err();
        assert!(matches!(err, CannonError::Communication { rank: 0, .. }));
    }

    #[test]
    fn test_unknown_rank_is_rejected() {
        let world = ChannelComm::<i32>::world(2);
        assert!(world[0].isend(&[1], 5, 0).is_err());
        let mut buf = [0];
        assert!(world[0].irecv(&mut buf, 9, 0).is_err());
    }
}
