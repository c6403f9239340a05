//! MPI backend for the process-grid communicators.
//!
//! Implements `GridComm` over the MPI (Message Passing Interface) crate for
//! distributed-memory runs. `ProcessGrid::from_mpi` splits the world
//! communicator into the row, column and depth-replicate groups of a
//! `nprow x npcol x npdep` grid; all collectives are blocking, matching the
//! engine's communication model.
//!
//! # Example
//! ```no_run
//! # use sparlu::parallel::{MpiComm, ProcessGrid};
//! let universe = mpi::initialize().unwrap();
//! let grid = ProcessGrid::from_mpi(&universe, 2, 2, 1).unwrap();
//! println!("process ({}, {})", grid.myrow, grid.mycol);
//! ```

use mpi::collective::SystemOperation;
use mpi::environment::Universe;
use mpi::topology::{Color, SimpleCommunicator};
use mpi::traits::*;

use crate::error::SluError;
use crate::parallel::{GridComm, ProcessGrid};

/// MPI communicator wrapper.
pub struct MpiComm {
    comm: SimpleCommunicator,
    rank: usize,
    size: usize,
}

impl MpiComm {
    fn new(comm: SimpleCommunicator) -> Self {
        let rank = comm.rank() as usize;
        let size = comm.size() as usize;
        MpiComm { comm, rank, size }
    }
}

impl GridComm for MpiComm {
    fn rank(&self) -> usize {
        self.rank
    }
    fn size(&self) -> usize {
        self.size
    }
    fn barrier(&self) {
        self.comm.barrier();
    }
    fn broadcast_f64(&self, buf: &mut [f64], root: usize) {
        self.comm.process_at_rank(root as i32).broadcast_into(buf);
    }
    fn broadcast_usize(&self, buf: &mut [usize], root: usize) {
        self.comm.process_at_rank(root as i32).broadcast_into(buf);
    }
    fn all_reduce_min(&self, x: i32) -> i32 {
        let mut y = x;
        self.comm.all_reduce_into(&x, &mut y, &SystemOperation::min());
        y
    }
}

impl ProcessGrid<MpiComm> {
    /// Split the MPI world into a `nprow x npcol x npdep` grid.
    ///
    /// The world size must equal `nprow * npcol * npdep`; ranks are laid out
    /// depth-major, then row-major within one depth layer.
    pub fn from_mpi(
        universe: &Universe,
        nprow: usize,
        npcol: usize,
        npdep: usize,
    ) -> Result<Self, SluError> {
        let world = universe.world();
        let size = world.size() as usize;
        if size != nprow * npcol * npdep {
            return Err(SluError::GridMismatch(format!(
                "{size} processes cannot form a {nprow}x{npcol}x{npdep} grid"
            )));
        }
        let rank = world.rank() as usize;
        let layer = nprow * npcol;
        let dep = rank / layer;
        let in_layer = rank % layer;
        let myrow = in_layer / npcol;
        let mycol = in_layer % npcol;

        let split = |color: usize, key: usize| -> SimpleCommunicator {
            world
                .split_by_color_with_key(Color::with_value(color as i32), key as i32)
                .expect("nonempty color group")
        };
        // Row communicator spans columns, column communicator spans rows,
        // depth communicator spans replicas of one (row, col) position.
        let row_comm = split(dep * nprow + myrow, mycol);
        let col_comm = split(dep * npcol + mycol, myrow);
        let depth_comm = split(in_layer, dep);

        Ok(ProcessGrid {
            nprow,
            npcol,
            npdep,
            myrow,
            mycol,
            world: MpiComm::new(world),
            row_comm: MpiComm::new(row_comm),
            col_comm: MpiComm::new(col_comm),
            depth_comm: MpiComm::new(depth_comm),
        })
    }
}
