//! The synchronization segment: every primitive one game needs.
//!
//! One segment holds the three reader/writer gates, the reader counter,
//! the observer handshake pair, and one turn gate per agent. Two backends
//! provide it:
//!
//! - [`ShmSyncSegment`] — `sem_t` array in a named shared-memory object,
//!   for the real multi-process game. Created and destroyed by the
//!   orchestrator, attached by agents and the view.
//! - [`LocalSyncSegment`] — the same shape over in-process semaphores for
//!   threaded harnesses.

use std::mem::{align_of, size_of};
use std::ptr::NonNull;
use std::sync::atomic::AtomicU32;
use std::sync::Arc;

use crate::core::config::MAX_AGENTS;
use crate::ipc::shm::{self, ResourceError, ShmRegion};

use super::coordinator::SyncAccess;
use super::local::LocalSemaphore;
use super::posix::PosixSemaphore;
use super::semaphore::SyncError;

/// Index of each fixed semaphore inside the segment.
const SEM_TURNSTILE: usize = 0;
const SEM_WRITE_GATE: usize = 1;
const SEM_COUNT_GATE: usize = 2;
const SEM_CHANGED: usize = 3;
const SEM_RENDERED: usize = 4;
const FIXED_SEMS: usize = 5;

fn align_up(offset: usize, align: usize) -> usize {
    offset.div_ceil(align) * align
}

/// Byte offsets inside the shared segment for a given agent count.
#[derive(Clone, Copy, Debug)]
struct SegmentLayout {
    gate_count: usize,
}

impl SegmentLayout {
    fn new(gate_count: usize) -> Self {
        Self { gate_count }
    }

    fn fixed_sem_offset(&self, index: usize) -> usize {
        debug_assert!(index < FIXED_SEMS);
        index * size_of::<libc::sem_t>()
    }

    fn counter_offset(&self) -> usize {
        FIXED_SEMS * size_of::<libc::sem_t>()
    }

    fn gates_offset(&self) -> usize {
        align_up(self.counter_offset() + 4, align_of::<libc::sem_t>())
    }

    fn gate_offset(&self, index: usize) -> usize {
        debug_assert!(index < self.gate_count);
        self.gates_offset() + index * size_of::<libc::sem_t>()
    }

    fn total_bytes(&self) -> usize {
        self.gates_offset() + self.gate_count * size_of::<libc::sem_t>()
    }
}

/// Process-shared synchronization segment.
pub struct ShmSyncSegment {
    // Field order keeps the mapping alive past the semaphore handles.
    turnstile: PosixSemaphore,
    write_gate: PosixSemaphore,
    count_gate: PosixSemaphore,
    changed: PosixSemaphore,
    rendered: PosixSemaphore,
    gates: Vec<PosixSemaphore>,
    counter: NonNull<AtomicU32>,
    owner: bool,
    _region: ShmRegion,
}

unsafe impl Send for ShmSyncSegment {}
unsafe impl Sync for ShmSyncSegment {}

impl ShmSyncSegment {
    /// Create the named segment and initialize every primitive.
    ///
    /// Gates start closed, the reader/writer gates open. On any failure the
    /// partially-created object is unlinked before returning.
    pub fn create(name: &str, agent_count: usize) -> Result<Self, ResourceError> {
        let layout = SegmentLayout::new(agent_count);
        let region = shm::create(name, layout.total_bytes())?;

        let result: Result<_, SyncError> = (|| {
            let base = region.as_ptr();
            let sem_at = |offset: usize| unsafe { base.add(offset).cast::<libc::sem_t>() };
            let init = |index: usize, value: u32| unsafe {
                PosixSemaphore::init_at(sem_at(layout.fixed_sem_offset(index)), value)
            };

            let turnstile = init(SEM_TURNSTILE, 1)?;
            let write_gate = init(SEM_WRITE_GATE, 1)?;
            let count_gate = init(SEM_COUNT_GATE, 1)?;
            let changed = init(SEM_CHANGED, 0)?;
            let rendered = init(SEM_RENDERED, 0)?;

            let mut gates = Vec::with_capacity(agent_count);
            for i in 0..agent_count {
                gates.push(unsafe {
                    PosixSemaphore::init_at(sem_at(layout.gate_offset(i)), 0)
                }?);
            }

            let counter =
                NonNull::new(unsafe { base.add(layout.counter_offset()) }.cast::<AtomicU32>())
                    .expect("segment base is never null");
            unsafe { counter.as_ref() }.store(0, std::sync::atomic::Ordering::Relaxed);

            Ok((turnstile, write_gate, count_gate, changed, rendered, gates, counter))
        })();

        match result {
            Ok((turnstile, write_gate, count_gate, changed, rendered, gates, counter)) => {
                Ok(Self {
                    turnstile,
                    write_gate,
                    count_gate,
                    changed,
                    rendered,
                    gates,
                    counter,
                    owner: true,
                    _region: region,
                })
            }
            Err(err) => {
                let _ = shm::unlink(name);
                Err(ResourceError::Os {
                    op: "sem_init",
                    source: std::io::Error::other(err.to_string()),
                })
            }
        }
    }

    /// Attach the named segment created by the orchestrator.
    pub fn open(name: &str, agent_count: usize) -> Result<Self, ResourceError> {
        let layout = SegmentLayout::new(agent_count);
        let region = shm::open(name, true)?;
        if region.len() != layout.total_bytes() {
            return Err(ResourceError::Corrupted {
                name: name.to_string(),
            });
        }

        let base = region.as_ptr();
        let attach = |offset: usize| unsafe {
            PosixSemaphore::attach(base.add(offset).cast::<libc::sem_t>())
        };

        let gates = (0..agent_count)
            .map(|i| attach(layout.gate_offset(i)))
            .collect();
        let counter = NonNull::new(unsafe { base.add(layout.counter_offset()) }.cast())
            .expect("segment base is never null");

        Ok(Self {
            turnstile: attach(layout.fixed_sem_offset(SEM_TURNSTILE)),
            write_gate: attach(layout.fixed_sem_offset(SEM_WRITE_GATE)),
            count_gate: attach(layout.fixed_sem_offset(SEM_COUNT_GATE)),
            changed: attach(layout.fixed_sem_offset(SEM_CHANGED)),
            rendered: attach(layout.fixed_sem_offset(SEM_RENDERED)),
            gates,
            counter,
            owner: false,
            _region: region,
        })
    }

    /// Destroy every primitive. Creator-only; attached handles are
    /// unaffected by calling this on a non-owner segment.
    pub fn destroy_primitives(&self) {
        if !self.owner {
            return;
        }
        self.turnstile.destroy();
        self.write_gate.destroy();
        self.count_gate.destroy();
        self.changed.destroy();
        self.rendered.destroy();
        for gate in &self.gates {
            gate.destroy();
        }
    }

    /// Remove the backing name. Idempotent.
    pub fn unlink(name: &str) -> Result<(), ResourceError> {
        shm::unlink(name)
    }
}

impl SyncAccess for ShmSyncSegment {
    type Sem = PosixSemaphore;

    fn turnstile(&self) -> &PosixSemaphore {
        &self.turnstile
    }

    fn write_gate(&self) -> &PosixSemaphore {
        &self.write_gate
    }

    fn count_gate(&self) -> &PosixSemaphore {
        &self.count_gate
    }

    fn reader_count(&self) -> &AtomicU32 {
        unsafe { self.counter.as_ref() }
    }

    fn state_changed(&self) -> &PosixSemaphore {
        &self.changed
    }

    fn state_rendered(&self) -> &PosixSemaphore {
        &self.rendered
    }

    fn gate_count(&self) -> usize {
        self.gates.len()
    }

    fn turn_gate(&self, agent: usize) -> &PosixSemaphore {
        &self.gates[agent]
    }
}

struct LocalInner {
    turnstile: LocalSemaphore,
    write_gate: LocalSemaphore,
    count_gate: LocalSemaphore,
    readers: AtomicU32,
    changed: LocalSemaphore,
    rendered: LocalSemaphore,
    gates: Vec<LocalSemaphore>,
}

/// In-process synchronization segment for threaded harnesses. Cloning
/// shares the primitives, standing in for "attach".
#[derive(Clone)]
pub struct LocalSyncSegment {
    inner: Arc<LocalInner>,
}

impl LocalSyncSegment {
    /// Create a segment for `agent_count` agents.
    #[must_use]
    pub fn new(agent_count: usize) -> Self {
        assert!(
            agent_count <= MAX_AGENTS,
            "agent count {agent_count} above the configured bound"
        );
        Self {
            inner: Arc::new(LocalInner {
                turnstile: LocalSemaphore::new(1),
                write_gate: LocalSemaphore::new(1),
                count_gate: LocalSemaphore::new(1),
                readers: AtomicU32::new(0),
                changed: LocalSemaphore::new(0),
                rendered: LocalSemaphore::new(0),
                gates: (0..agent_count).map(|_| LocalSemaphore::new(0)).collect(),
            }),
        }
    }
}

impl SyncAccess for LocalSyncSegment {
    type Sem = LocalSemaphore;

    fn turnstile(&self) -> &LocalSemaphore {
        &self.inner.turnstile
    }

    fn write_gate(&self) -> &LocalSemaphore {
        &self.inner.write_gate
    }

    fn count_gate(&self) -> &LocalSemaphore {
        &self.inner.count_gate
    }

    fn reader_count(&self) -> &AtomicU32 {
        &self.inner.readers
    }

    fn state_changed(&self) -> &LocalSemaphore {
        &self.inner.changed
    }

    fn state_rendered(&self) -> &LocalSemaphore {
        &self.inner.rendered
    }

    fn gate_count(&self) -> usize {
        self.inner.gates.len()
    }

    fn turn_gate(&self, agent: usize) -> &LocalSemaphore {
        &self.inner.gates[agent]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::coordinator::{enter_read, enter_write};
    use crate::sync::semaphore::Semaphore;
    use std::sync::atomic::Ordering;

    #[test]
    fn test_local_segment_read_write_cycle() {
        let segment = LocalSyncSegment::new(2);

        {
            let _read = enter_read(&segment).unwrap();
            assert_eq!(segment.reader_count().load(Ordering::Relaxed), 1);
        }
        assert_eq!(segment.reader_count().load(Ordering::Relaxed), 0);

        let _write = enter_write(&segment).unwrap();
    }

    #[test]
    fn test_turn_gates_are_independent() {
        let segment = LocalSyncSegment::new(3);
        segment.grant_turn(1).unwrap();

        assert!(!segment.turn_gate(0).try_wait().unwrap());
        assert!(segment.turn_gate(1).try_wait().unwrap());
        assert!(!segment.turn_gate(2).try_wait().unwrap());
    }

    #[test]
    fn test_shm_segment_create_open_destroy() {
        let name = format!("/champs_test_sync_{}", std::process::id());
        let _ = ShmSyncSegment::unlink(&name);

        let segment = ShmSyncSegment::create(&name, 2).unwrap();
        let attached = ShmSyncSegment::open(&name, 2).unwrap();

        segment.grant_turn(0).unwrap();
        assert!(attached.turn_gate(0).try_wait().unwrap());

        {
            let _read = enter_read(&attached).unwrap();
            assert_eq!(segment.reader_count().load(Ordering::Relaxed), 1);
        }

        drop(attached);
        segment.destroy_primitives();
        drop(segment);
        ShmSyncSegment::unlink(&name).unwrap();
    }
}
