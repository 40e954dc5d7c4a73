//! Cannon's algorithm on one process of an `s x s` torus.
//!
//! Every process holds one tile of A, B and C. The run has three phases:
//!
//! 1. **Align.** Row `r` of A is shifted left by `r`, column `c` of B is
//!    shifted up by `c`, so process `(r, c)` holds `A(r, r+c)` and `B(r+c, c)`.
//! 2. **Shift-multiply.** `s` steps of `C += A * B`, each followed by shifting
//!    A left by one and B up by one.
//! 3. **Restore.** The alignment shifts are undone, so A and B end where they
//!    started. C needs no restoration.
//!
//! Two loop schedules are provided. [`multiply_blocking`] exchanges tiles with
//! an atomic send-receive-replace after each local multiply.
//! [`multiply_nonblocking`] posts the next step's transfers into a second
//! buffer before multiplying, so communication overlaps the kernel.

use log::{debug, trace};

use crate::comm::{Communicator, Request, Tag};
use crate::config::Schedule;
use crate::error::Result;
use crate::grid::GridContext;
use crate::kernel::tile_mult_acc;
use crate::tile::{Element, Tile};
use crate::topology::{Axis, Coords, Neighbors};

const TAG_ALIGN_A: Tag = 10;
const TAG_ALIGN_B: Tag = 11;
const TAG_SHIFT_A: Tag = 20;
const TAG_SHIFT_B: Tag = 21;
const TAG_RESTORE_A: Tag = 30;
const TAG_RESTORE_B: Tag = 31;

/// Runs the distributed product with the chosen loop schedule.
///
/// On success `c` holds this process's tile of `A * B`, and `a` and `b` hold
/// the same tiles they held on entry.
pub fn multiply<T, C>(
    ctx: &GridContext<'_, C>,
    schedule: Schedule,
    a: &mut Tile<T>,
    b: &mut Tile<T>,
    c: &mut Tile<T>,
) -> Result<()>
where
    T: Element,
    C: Communicator<T>,
{
    match schedule {
        Schedule::Blocking => multiply_blocking(ctx, a, b, c),
        Schedule::NonBlocking => multiply_nonblocking(ctx, a, b, c),
    }
}

/// Initial skew: row `r` of A moves left by `r`, column `c` of B moves up by `c`.
pub fn align<T, C>(ctx: &GridContext<'_, C>, a: &mut Tile<T>, b: &mut Tile<T>) -> Result<()>
where
    T: Element,
    C: Communicator<T>,
{
    let Coords { row, col } = ctx.coords();
    shift_tile(ctx, a, Axis::Row, -(row as isize), TAG_ALIGN_A)?;
    shift_tile(ctx, b, Axis::Column, -(col as isize), TAG_ALIGN_B)?;
    debug!("rank {}: aligned ({}, {})", ctx.rank(), row, col);
    Ok(())
}

/// Exact inverse of [`align`].
pub fn restore<T, C>(ctx: &GridContext<'_, C>, a: &mut Tile<T>, b: &mut Tile<T>) -> Result<()>
where
    T: Element,
    C: Communicator<T>,
{
    let Coords { row, col } = ctx.coords();
    shift_tile(ctx, a, Axis::Row, row as isize, TAG_RESTORE_A)?;
    shift_tile(ctx, b, Axis::Column, col as isize, TAG_RESTORE_B)?;
    debug!("rank {}: restored ({}, {})", ctx.rank(), row, col);
    Ok(())
}

/// Cannon's algorithm with blocking send-receive-replace exchanges.
pub fn multiply_blocking<T, C>(
    ctx: &GridContext<'_, C>,
    a: &mut Tile<T>,
    b: &mut Tile<T>,
    c: &mut Tile<T>,
) -> Result<()>
where
    T: Element,
    C: Communicator<T>,
{
    check_operands(a, b, c)?;
    c.fill_zero();
    align(ctx, a, b)?;

    let comm = ctx.comm();
    let Neighbors {
        left,
        right,
        up,
        down,
    } = ctx.neighbors();

    for step in 0..ctx.side() {
        trace!("rank {}: blocking step {}", ctx.rank(), step);
        tile_mult_acc(a, b, c);
        comm.sendrecv_replace(a.as_mut_slice(), left, right, TAG_SHIFT_A)?;
        comm.sendrecv_replace(b.as_mut_slice(), up, down, TAG_SHIFT_B)?;
    }

    restore(ctx, a, b)
}

/// Cannon's algorithm with double-buffered, non-blocking shifts.
///
/// Each step posts the sends of the current tiles and the receives of the next
/// ones into the alternate buffers, multiplies the current tiles while those
/// transfers are in flight, then waits for all four before swapping buffers.
///
/// If an error is returned, `a` and `b` are left in an unspecified state.
pub fn multiply_nonblocking<T, C>(
    ctx: &GridContext<'_, C>,
    a: &mut Tile<T>,
    b: &mut Tile<T>,
    c: &mut Tile<T>,
) -> Result<()>
where
    T: Element,
    C: Communicator<T>,
{
    check_operands(a, b, c)?;
    c.fill_zero();
    align(ctx, a, b)?;

    let comm = ctx.comm();
    let neighbors = ctx.neighbors();
    let mut a_pair = BufferPair::new(std::mem::take(a));
    let mut b_pair = BufferPair::new(std::mem::take(b));

    for step in 0..ctx.side() {
        trace!(
            "rank {}: non-blocking step {} on {:?} slot",
            ctx.rank(),
            step,
            a_pair.current_slot()
        );
        let (a_cur, a_next) = a_pair.split();
        let (b_cur, b_next) = b_pair.split();

        InFlight::issue(comm, &neighbors, a_cur, b_cur, a_next, b_next)?
            .complete_during(comm, || tile_mult_acc(a_cur, b_cur, c))?;

        a_pair.advance();
        b_pair.advance();
    }

    // The live tiles sit in whichever slot the last receive filled.
    restore(ctx, a_pair.current_mut(), b_pair.current_mut())?;
    *a = a_pair.into_current();
    *b = b_pair.into_current();
    Ok(())
}

fn shift_tile<T, C>(
    ctx: &GridContext<'_, C>,
    tile: &mut Tile<T>,
    axis: Axis,
    displacement: isize,
    tag: Tag,
) -> Result<()>
where
    T: Element,
    C: Communicator<T>,
{
    let shift = ctx.shift(axis, displacement);
    ctx.comm()
        .sendrecv_replace(tile.as_mut_slice(), shift.dest, shift.source, tag)
}

fn check_operands<T: Element>(a: &Tile<T>, b: &Tile<T>, c: &Tile<T>) -> Result<()> {
    a.ensure_same_side(b, "B")?;
    a.ensure_same_side(c, "C")
}

/// One of the two storage slots of a [`BufferPair`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Front,
    Back,
}

impl Slot {
    pub fn other(self) -> Slot {
        match self {
            Slot::Front => Slot::Back,
            Slot::Back => Slot::Front,
        }
    }
}

/// Two tile-sized slots for one operand: the current tile the kernel reads,
/// and the alternate one an in-flight receive fills.
#[derive(Debug, Clone)]
pub struct BufferPair<T> {
    slots: [Tile<T>; 2],
    current: Slot,
}

impl<T: Element> BufferPair<T> {
    /// Uses `primary` as the current slot and allocates a zeroed alternate.
    pub fn new(primary: Tile<T>) -> Self {
        let side = primary.side();
        Self {
            slots: [primary, Tile::zeros(side)],
            current: Slot::Front,
        }
    }

    pub fn current_slot(&self) -> Slot {
        self.current
    }

    pub fn current(&self) -> &Tile<T> {
        &self.slots[index(self.current)]
    }

    pub fn current_mut(&mut self) -> &mut Tile<T> {
        &mut self.slots[index(self.current)]
    }

    /// Borrows the current slot for reading and the alternate for writing.
    pub fn split(&mut self) -> (&Tile<T>, &mut Tile<T>) {
        let [front, back] = &mut self.slots;
        match self.current {
            Slot::Front => (&*front, back),
            Slot::Back => (&*back, front),
        }
    }

    /// Swaps slot roles: the alternate becomes current.
    pub fn advance(&mut self) {
        self.current = self.current.other();
    }

    /// Releases the current tile, dropping the alternate.
    pub fn into_current(self) -> Tile<T> {
        let [front, back] = self.slots;
        match self.current {
            Slot::Front => front,
            Slot::Back => back,
        }
    }
}

#[inline(always)]
fn index(slot: Slot) -> usize {
    match slot {
        Slot::Front => 0,
        Slot::Back => 1,
    }
}

/// The four transfers of one non-blocking step, in the issued state.
///
/// Holding this value keeps the current tiles shared-borrowed and the
/// alternate tiles exclusively borrowed. [`InFlight::complete_during`]
/// consumes it, which is the only way to release the alternate slots.
struct InFlight<'a, T> {
    requests: [Request<'a, T>; 4],
}

impl<'a, T: Element> InFlight<'a, T> {
    fn issue<C: Communicator<T>>(
        comm: &C,
        neighbors: &Neighbors,
        a_cur: &'a Tile<T>,
        b_cur: &'a Tile<T>,
        a_next: &'a mut Tile<T>,
        b_next: &'a mut Tile<T>,
    ) -> Result<Self> {
        Ok(Self {
            requests: [
                comm.isend(a_cur.as_slice(), neighbors.left, TAG_SHIFT_A)?,
                comm.isend(b_cur.as_slice(), neighbors.up, TAG_SHIFT_B)?,
                comm.irecv(a_next.as_mut_slice(), neighbors.right, TAG_SHIFT_A)?,
                comm.irecv(b_next.as_mut_slice(), neighbors.down, TAG_SHIFT_B)?,
            ],
        })
    }

    /// Runs the local multiply while the transfers progress, then waits.
    fn complete_during<C, F>(self, comm: &C, work: F) -> Result<()>
    where
        C: Communicator<T>,
        F: FnOnce(),
    {
        comm.overlap(self.requests, work)
    }
}
