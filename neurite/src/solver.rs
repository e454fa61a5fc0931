use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, trace};

use crate::Morphology;

#[derive(Debug, Error)]
pub enum SolverError {
    #[error("solver used before pre_solve")]
    NotInitialized,
    #[error("pre_solve called twice")]
    AlreadyInitialized,
    #[error("node {node} lists neighbor {neighbor}, but the morphology has {node_count} nodes")]
    BadNeighbor {
        node: usize,
        neighbor: u32,
        node_count: usize,
    },
    #[error("input indices {rejected:?} are outside 0..{node_count}; in-range entries were applied")]
    InputOutOfRange {
        rejected: Vec<usize>,
        node_count: usize,
    },
}

/// Steps passive diffusion over a [`Morphology`], double-buffered.
///
/// The active buffer belongs to the simulation schedule alone and is mutated
/// in place by [`solve_step`](Self::solve_step) and
/// [`set_inputs`](Self::set_inputs), lock-free. The published buffer is the
/// last completed tick, guarded by a mutex so a presentation-schedule reader
/// only ever sees whole ticks. [`set_output_values`](Self::set_output_values)
/// is the sole crossing point between the two.
pub struct DiffusionSolver {
    morphology: Arc<Morphology>,
    diffusion_const: f64,
    /// In-progress tick; writer-only, never shared
    active: Vec<f64>,
    /// Last completed tick; shared with [`SnapshotReader`]s
    published: Arc<Mutex<Vec<f64>>>,
    initialized: bool,
}

impl DiffusionSolver {
    /// The diffusion constant is fixed for the life of the run.
    pub fn new(morphology: Arc<Morphology>, diffusion_const: f64) -> Self {
        Self {
            morphology,
            diffusion_const,
            active: Vec::new(),
            published: Arc::new(Mutex::new(Vec::new())),
            initialized: false,
        }
    }

    /// Validate the morphology and allocate both buffers, zeroed.
    ///
    /// Call exactly once before the first [`solve_step`](Self::solve_step).
    /// A neighbor index outside the node range is a fatal configuration
    /// error caught here, so stepping never has to bounds-check.
    pub fn pre_solve(&mut self) -> Result<(), SolverError> {
        if self.initialized {
            return Err(SolverError::AlreadyInitialized);
        }

        let n = self.morphology.node_count();
        for node in 0..n {
            for &neighbor in self.morphology.neighbors(node) {
                if neighbor as usize >= n {
                    return Err(SolverError::BadNeighbor {
                        node,
                        neighbor,
                        node_count: n,
                    });
                }
            }
        }

        *self.published.lock() = vec![0.0; n];
        self.active = vec![0.0; n];
        self.initialized = true;
        debug!(nodes = n, k = self.diffusion_const, "pre-solve done");
        Ok(())
    }

    /// Overwrite active-buffer entries directly, bypassing diffusion for this
    /// tick. Used to inject external stimulus.
    ///
    /// Every in-range entry is applied even when some are rejected; the
    /// rejects come back in [`SolverError::InputOutOfRange`].
    pub fn set_inputs(&mut self, updates: &[(usize, f64)]) -> Result<(), SolverError> {
        if !self.initialized {
            return Err(SolverError::NotInitialized);
        }

        let mut rejected = Vec::new();
        for &(index, value) in updates {
            match self.active.get_mut(index) {
                Some(slot) => *slot = value,
                None => rejected.push(index),
            }
        }

        if rejected.is_empty() {
            Ok(())
        } else {
            Err(SolverError::InputOutOfRange {
                rejected,
                node_count: self.active.len(),
            })
        }
    }

    /// Advance the active buffer by one tick.
    ///
    /// Sweep order:
    /// 1) for every node in ascending index order, move
    ///    `k * active[neighbor]` from each neighbor to the node
    /// 2) leak `k * active[node]` from every open terminal
    ///
    /// The neighbor pass reads and writes in place, so node visitation order
    /// matters; the ascending sweep is part of the contract and makes runs
    /// bit-reproducible. Values are not clamped.
    pub fn solve_step(&mut self, tick: u64) -> Result<(), SolverError> {
        if !self.initialized {
            return Err(SolverError::NotInitialized);
        }

        let k = self.diffusion_const;
        for i in 0..self.active.len() {
            for &n in self.morphology.neighbors(i) {
                let n = n as usize;
                let amount = k * self.active[n];
                self.active[i] += amount;
                self.active[n] -= amount;
            }
        }

        // Remove value from dendrite caps
        for node in self.morphology.boundary_nodes() {
            self.active[node] -= k * self.active[node];
        }

        trace!(tick, "stepped");
        Ok(())
    }

    /// Publish the active buffer, making this tick visible to readers.
    ///
    /// One logical copy under the lock; readers blocked for at most the
    /// duration of a memcpy.
    pub fn set_output_values(&mut self) -> Result<(), SolverError> {
        if !self.initialized {
            return Err(SolverError::NotInitialized);
        }
        self.published.lock().copy_from_slice(&self.active);
        Ok(())
    }

    /// Snapshot of the last published tick.
    pub fn values(&self) -> Vec<f64> {
        self.published.lock().clone()
    }

    /// A cloneable handle for the presentation schedule, valid for the life
    /// of the run even after the solver moves to the simulation thread.
    pub fn reader(&self) -> SnapshotReader {
        SnapshotReader {
            published: Arc::clone(&self.published),
        }
    }

    pub fn node_count(&self) -> usize {
        self.morphology.node_count()
    }
}

/// Read side of the published buffer. Any number of these may exist; each
/// read returns some fully published tick, never a torn mixture, though
/// slow readers may skip ticks entirely.
#[derive(Clone)]
pub struct SnapshotReader {
    published: Arc<Mutex<Vec<f64>>>,
}

impl SnapshotReader {
    pub fn read(&self) -> Vec<f64> {
        self.published.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::thread;

    fn solver(m: Morphology, k: f64) -> DiffusionSolver {
        DiffusionSolver::new(Arc::new(m), k)
    }

    #[test]
    fn step_before_pre_solve_fails() {
        let mut s = solver(Morphology::chain(3), 0.05);
        assert!(matches!(s.solve_step(0), Err(SolverError::NotInitialized)));
        assert!(matches!(
            s.set_output_values(),
            Err(SolverError::NotInitialized)
        ));
        assert!(matches!(
            s.set_inputs(&[(0, 1.0)]),
            Err(SolverError::NotInitialized)
        ));
    }

    #[test]
    fn pre_solve_twice_fails() {
        let mut s = solver(Morphology::chain(3), 0.05);
        s.pre_solve().unwrap();
        assert!(matches!(
            s.pre_solve(),
            Err(SolverError::AlreadyInitialized)
        ));
    }

    #[test]
    fn bad_neighbor_caught_at_pre_solve() {
        let m = Morphology::from_adjacency(vec![vec![7], vec![0]], vec![false, false]);
        let mut s = solver(m, 0.05);
        match s.pre_solve() {
            Err(SolverError::BadNeighbor {
                node,
                neighbor,
                node_count,
            }) => {
                assert_eq!(node, 0);
                assert_eq!(neighbor, 7);
                assert_eq!(node_count, 2);
            }
            other => panic!("expected BadNeighbor, got {other:?}"),
        }
    }

    #[test]
    fn set_inputs_applies_in_range_and_reports_rejects() {
        let mut s = solver(Morphology::chain(3), 0.05);
        s.pre_solve().unwrap();
        let err = s
            .set_inputs(&[(0, 1.0), (9, 2.0), (2, 3.0), (4, 4.0)])
            .unwrap_err();
        match err {
            SolverError::InputOutOfRange {
                rejected,
                node_count,
            } => {
                assert_eq!(rejected, vec![9, 4]);
                assert_eq!(node_count, 3);
            }
            other => panic!("expected InputOutOfRange, got {other:?}"),
        }
        // in-range entries landed despite the error
        s.set_output_values().unwrap();
        assert_eq!(s.values(), vec![1.0, 0.0, 3.0]);
    }

    #[test]
    fn publish_visibility_one_tick() {
        let m = Morphology::from_adjacency(
            vec![vec![1], vec![0]],
            vec![false, false],
        );
        let mut s = solver(m, 0.25);
        s.pre_solve().unwrap();
        s.set_inputs(&[(0, 1.0)]).unwrap();

        // readers see zeros until the first publish
        assert_eq!(s.values(), vec![0.0, 0.0]);

        s.solve_step(0).unwrap();
        s.set_output_values().unwrap();

        // one tick, by hand: i=0 pulls 0.25*0.0, i=1 pulls 0.25*1.0
        assert_eq!(s.values(), vec![0.75, 0.25]);
    }

    #[test]
    fn pairwise_transfer_conserves_sum() {
        let m = Morphology::from_adjacency(
            vec![vec![1], vec![0]],
            vec![false, false],
        );
        let mut s = solver(m, 0.25);
        s.pre_solve().unwrap();
        s.set_inputs(&[(0, 1.0), (1, 0.5)]).unwrap();
        // few enough ticks that every intermediate stays exactly
        // representable, so the invariant holds bitwise
        for t in 0..8 {
            s.solve_step(t).unwrap();
        }
        s.set_output_values().unwrap();
        let v = s.values();
        // dyadic k and initial values keep the invariant exact in f64
        assert_eq!(v[0] + v[1], 1.5);
    }

    #[test]
    fn isolated_node_is_inert() {
        let m = Morphology::from_adjacency(vec![vec![]], vec![false]);
        let mut s = solver(m, 0.9);
        s.pre_solve().unwrap();
        s.set_inputs(&[(0, 42.0)]).unwrap();
        for t in 0..10 {
            s.solve_step(t).unwrap();
        }
        s.set_output_values().unwrap();
        assert_eq!(s.values(), vec![42.0]);
    }

    #[test]
    fn boundary_decay_shrinks_magnitude() {
        let m = Morphology::from_adjacency(vec![vec![]], vec![true]);
        let k = 0.05;
        let mut s = solver(m, k);
        s.pre_solve().unwrap();
        s.set_inputs(&[(0, 1.0)]).unwrap();
        s.solve_step(0).unwrap();
        s.set_output_values().unwrap();
        let v = s.values()[0];
        assert!(v.abs() < 1.0);
        assert_eq!(v, 1.0 - k * 1.0);

        // negative values leak toward zero as well
        s.set_inputs(&[(0, -2.0)]).unwrap();
        s.solve_step(1).unwrap();
        s.set_output_values().unwrap();
        let v = s.values()[0];
        assert!(v < 0.0 && v.abs() < 2.0);
    }

    #[test]
    fn runs_are_bit_identical() {
        let run = || {
            let mut s = solver(Morphology::bifurcation(4, 3), 0.05);
            s.pre_solve().unwrap();
            s.set_inputs(&[(0, 1.0), (5, -0.25)]).unwrap();
            for t in 0..200 {
                s.solve_step(t).unwrap();
            }
            s.set_output_values().unwrap();
            s.values()
        };
        let a = run();
        let b = run();
        let bits = |v: &[f64]| v.iter().map(|x| x.to_bits()).collect::<Vec<_>>();
        assert_eq!(bits(&a), bits(&b));
    }

    #[test]
    fn zero_node_morphology() {
        let mut s = solver(Morphology::from_adjacency(Vec::new(), Vec::new()), 0.05);
        s.pre_solve().unwrap();
        s.solve_step(0).unwrap();
        s.set_output_values().unwrap();
        assert!(s.values().is_empty());
    }

    #[test]
    fn readers_never_see_torn_ticks() {
        const TICKS: u64 = 1000;

        let morphology = Arc::new(Morphology::chain(8));

        // reference run: the exact published state after each tick
        let mut reference = solver(Morphology::chain(8), 0.05);
        reference.pre_solve().unwrap();
        reference.set_inputs(&[(3, 1.0)]).unwrap();
        let mut valid: HashSet<Vec<u64>> = HashSet::new();
        let snap = |s: &DiffusionSolver| s.values().iter().map(|x| x.to_bits()).collect::<Vec<_>>();
        reference.set_output_values().unwrap();
        valid.insert(snap(&reference));
        for t in 0..TICKS {
            reference.solve_step(t).unwrap();
            reference.set_output_values().unwrap();
            valid.insert(snap(&reference));
        }
        // pre-publish state (all zeros) is also observable
        valid.insert(vec![0f64.to_bits(); 8]);

        let mut live = DiffusionSolver::new(morphology, 0.05);
        let reader = live.reader();

        let writer = thread::spawn(move || {
            live.pre_solve().unwrap();
            live.set_inputs(&[(3, 1.0)]).unwrap();
            live.set_output_values().unwrap();
            for t in 0..TICKS {
                live.solve_step(t).unwrap();
                live.set_output_values().unwrap();
            }
        });

        let mut observed = Vec::new();
        while !writer.is_finished() {
            let buf = reader.read();
            if !buf.is_empty() {
                assert_eq!(buf.len(), 8);
                observed.push(buf.iter().map(|x| x.to_bits()).collect::<Vec<_>>());
            }
        }
        writer.join().unwrap();

        for buf in &observed {
            assert!(valid.contains(buf), "observed a torn or impossible tick");
        }
    }
}
