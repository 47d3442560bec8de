//! Shared game state: typed handles over one contiguous region.
//!
//! ## Handles
//!
//! - [`StateWriter`] — the orchestrator's read-write handle. Creates the
//!   backing region (a named shared-memory object, or a heap buffer for
//!   single-process harnesses) and is the only handle with mutating
//!   accessors.
//! - [`StateReader`] — an attach-only read handle for agents and the view.
//!
//! There is no global state: every operation goes through a handle, and the
//! handle's type says what it may do.
//!
//! ## Consistency
//!
//! The region is concurrently mapped by other processes, so all accesses
//! are volatile; ordering and atomicity of multi-field updates come from
//! the reader/writer coordinator, never from this module. Callers must hold
//! the appropriate guard around any access that has to be consistent.

use std::cell::UnsafeCell;
use std::marker::PhantomData;
use std::ptr::NonNull;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use super::config::{GameConfig, MAX_AGENTS, NAME_LEN};
use super::direction::Direction;
use super::layout::StateLayout;
use crate::ipc::shm::{self, ResourceError, ShmRegion};

/// Marker for attach-only read access.
pub enum ReadOnly {}

/// Marker for the orchestrator's read-write access.
pub enum ReadWrite {}

/// One agent's record as plain owned data.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRecord {
    pub name: String,
    pub score: u32,
    pub valid_moves: u32,
    pub invalid_moves: u32,
    pub x: u16,
    pub y: u16,
    pub pid: i32,
    pub blocked: bool,
}

/// A consistent copy of the whole aggregate, taken under the reader lock.
///
/// Strategies and the renderer work exclusively on snapshots so they never
/// touch live shared memory outside a read section.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GameSnapshot {
    pub width: u16,
    pub height: u16,
    pub finished: bool,
    pub agents: SmallVec<[AgentRecord; MAX_AGENTS]>,
    pub cells: Vec<i32>,
}

impl GameSnapshot {
    /// Whether `(x, y)` is a board coordinate.
    #[must_use]
    pub fn in_bounds(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && x < i32::from(self.width) && y < i32::from(self.height)
    }

    /// Cell value at in-bounds coordinates.
    #[must_use]
    pub fn cell(&self, x: u16, y: u16) -> i32 {
        self.cells[y as usize * self.width as usize + x as usize]
    }

    /// Whether `(x, y)` is in bounds and still holds a reward.
    #[must_use]
    pub fn cell_is_free(&self, x: i32, y: i32) -> bool {
        self.in_bounds(x, y) && self.cell(x as u16, y as u16) > 0
    }

    /// Number of free destinations one step away from `(x, y)`.
    #[must_use]
    pub fn mobility(&self, x: u16, y: u16) -> u32 {
        Direction::ALL
            .iter()
            .filter(|d| {
                let (nx, ny) = d.step_from(x, y);
                self.cell_is_free(nx, ny)
            })
            .count() as u32
    }

    /// Whether any legal move exists from `(x, y)`.
    #[must_use]
    pub fn has_move_from(&self, x: u16, y: u16) -> bool {
        self.mobility(x, y) > 0
    }

    /// Number of cells still holding a reward.
    #[must_use]
    pub fn free_cells(&self) -> u32 {
        self.cells.iter().filter(|&&v| v > 0).count() as u32
    }

    /// Total number of board cells.
    #[must_use]
    pub fn total_cells(&self) -> u32 {
        u32::from(self.width) * u32::from(self.height)
    }
}

/// Heap backing for single-process harnesses. Allocated as words so the
/// 4-byte accessors stay aligned.
struct HeapRegion {
    words: UnsafeCell<Box<[u64]>>,
}

unsafe impl Sync for HeapRegion {}
unsafe impl Send for HeapRegion {}

impl HeapRegion {
    fn new(len: usize) -> Self {
        Self {
            words: UnsafeCell::new(vec![0u64; len.div_ceil(8)].into_boxed_slice()),
        }
    }

    fn as_ptr(&self) -> *mut u8 {
        unsafe { (*self.words.get()).as_mut_ptr().cast() }
    }
}

enum Backing {
    Shm(ShmRegion),
    Heap(Arc<HeapRegion>),
}

/// A typed handle over the shared aggregate. Use the [`StateReader`] and
/// [`StateWriter`] aliases; the marker decides whether mutating accessors
/// exist at all.
pub struct SharedState<M> {
    ptr: NonNull<u8>,
    layout: StateLayout,
    name: Option<String>,
    backing: Backing,
    _mode: PhantomData<fn() -> M>,
}

/// Attach-only read handle.
pub type StateReader = SharedState<ReadOnly>;

/// Creator/orchestrator read-write handle.
pub type StateWriter = SharedState<ReadWrite>;

unsafe impl<M> Send for SharedState<M> {}
unsafe impl<M> Sync for SharedState<M> {}

impl<M> SharedState<M> {
    fn from_backing(backing: Backing, layout: StateLayout, name: Option<String>) -> Self {
        let ptr = match &backing {
            Backing::Shm(region) => region.as_ptr(),
            Backing::Heap(heap) => heap.as_ptr(),
        };
        Self {
            ptr: NonNull::new(ptr).expect("mapped region pointer is never null"),
            layout,
            name,
            backing,
            _mode: PhantomData,
        }
    }

    /// Validate a mapped region's header against its size and rebuild the
    /// layout from it.
    fn layout_from_mapping(region: &ShmRegion, name: &str) -> Result<StateLayout, ResourceError> {
        let base = region.as_ptr();
        let (width, height, agents) = unsafe {
            (
                base.cast::<u32>().read_volatile(),
                base.add(4).cast::<u32>().read_volatile(),
                base.add(8).cast::<u32>().read_volatile(),
            )
        };
        let corrupted = || ResourceError::Corrupted {
            name: name.to_string(),
        };
        if width == 0 || height == 0 || agents == 0 || agents as usize > MAX_AGENTS {
            return Err(corrupted());
        }
        let layout = StateLayout::from_header(width as u16, height as u16, agents as usize);
        if layout.total_bytes() != region.len() {
            return Err(corrupted());
        }
        Ok(layout)
    }

    fn read_u32(&self, offset: usize) -> u32 {
        debug_assert!(offset + 4 <= self.layout.total_bytes());
        unsafe { self.ptr.as_ptr().add(offset).cast::<u32>().read_volatile() }
    }

    fn read_i32(&self, offset: usize) -> i32 {
        debug_assert!(offset + 4 <= self.layout.total_bytes());
        unsafe { self.ptr.as_ptr().add(offset).cast::<i32>().read_volatile() }
    }

    /// Offset map in effect for this handle.
    #[must_use]
    pub fn layout(&self) -> &StateLayout {
        &self.layout
    }

    #[must_use]
    pub fn width(&self) -> u16 {
        self.layout.width()
    }

    #[must_use]
    pub fn height(&self) -> u16 {
        self.layout.height()
    }

    #[must_use]
    pub fn agent_count(&self) -> usize {
        self.layout.agent_count()
    }

    #[must_use]
    pub fn finished(&self) -> bool {
        self.read_u32(self.layout.finished_offset()) != 0
    }

    /// Cell value at in-bounds coordinates.
    #[must_use]
    pub fn cell(&self, x: u16, y: u16) -> i32 {
        self.read_i32(self.layout.cell_offset(x, y))
    }

    /// Whether `(x, y)` is in bounds and still holds a reward.
    #[must_use]
    pub fn cell_is_free(&self, x: i32, y: i32) -> bool {
        x >= 0
            && y >= 0
            && x < i32::from(self.width())
            && y < i32::from(self.height())
            && self.cell(x as u16, y as u16) > 0
    }

    /// Read one agent record.
    #[must_use]
    pub fn agent(&self, index: usize) -> AgentRecord {
        let mut name_bytes = [0u8; NAME_LEN];
        let name_off = self.layout.agent_name_offset(index);
        for (i, byte) in name_bytes.iter_mut().enumerate() {
            *byte = unsafe { self.ptr.as_ptr().add(name_off + i).read_volatile() };
        }
        let len = name_bytes.iter().position(|&b| b == 0).unwrap_or(NAME_LEN);
        let name = String::from_utf8_lossy(&name_bytes[..len]).into_owned();

        AgentRecord {
            name,
            score: self.read_u32(self.layout.agent_score_offset(index)),
            valid_moves: self.read_u32(self.layout.agent_valid_offset(index)),
            invalid_moves: self.read_u32(self.layout.agent_invalid_offset(index)),
            x: self.read_u32(self.layout.agent_x_offset(index)) as u16,
            y: self.read_u32(self.layout.agent_y_offset(index)) as u16,
            pid: self.read_i32(self.layout.agent_pid_offset(index)),
            blocked: self.read_u32(self.layout.agent_blocked_offset(index)) != 0,
        }
    }

    /// Agent position without decoding the whole record.
    #[must_use]
    pub fn agent_position(&self, index: usize) -> (u16, u16) {
        (
            self.read_u32(self.layout.agent_x_offset(index)) as u16,
            self.read_u32(self.layout.agent_y_offset(index)) as u16,
        )
    }

    #[must_use]
    pub fn agent_blocked(&self, index: usize) -> bool {
        self.read_u32(self.layout.agent_blocked_offset(index)) != 0
    }

    #[must_use]
    pub fn agent_pid(&self, index: usize) -> i32 {
        self.read_i32(self.layout.agent_pid_offset(index))
    }

    /// Whether any legal move exists from `(x, y)`.
    #[must_use]
    pub fn has_move_from(&self, x: u16, y: u16) -> bool {
        Direction::ALL.iter().any(|d| {
            let (nx, ny) = d.step_from(x, y);
            self.cell_is_free(nx, ny)
        })
    }

    /// Whether any not-yet-blocked agent still has a legal move.
    #[must_use]
    pub fn any_agent_can_move(&self) -> bool {
        (0..self.agent_count()).any(|i| {
            if self.agent_blocked(i) {
                return false;
            }
            let (x, y) = self.agent_position(i);
            self.has_move_from(x, y)
        })
    }

    /// Number of cells still holding a reward.
    #[must_use]
    pub fn free_cells(&self) -> u32 {
        let mut free = 0;
        for y in 0..self.height() {
            for x in 0..self.width() {
                if self.cell(x, y) > 0 {
                    free += 1;
                }
            }
        }
        free
    }

    /// Copy the whole aggregate. Hold a read guard while calling this.
    #[must_use]
    pub fn snapshot(&self) -> GameSnapshot {
        let agents = (0..self.agent_count()).map(|i| self.agent(i)).collect();
        let mut cells = Vec::with_capacity(self.layout.width() as usize * self.height() as usize);
        for y in 0..self.height() {
            for x in 0..self.width() {
                cells.push(self.cell(x, y));
            }
        }
        GameSnapshot {
            width: self.width(),
            height: self.height(),
            finished: self.finished(),
            agents,
            cells,
        }
    }
}

impl SharedState<ReadOnly> {
    /// Attach an existing named aggregate read-only.
    ///
    /// Fails with [`ResourceError::NotFound`] if the object does not exist
    /// and [`ResourceError::Corrupted`] if its header and size disagree.
    pub fn open(name: &str) -> Result<StateReader, ResourceError> {
        let region = shm::open(name, false)?;
        let layout = Self::layout_from_mapping(&region, name)?;
        Ok(Self::from_backing(
            Backing::Shm(region),
            layout,
            Some(name.to_string()),
        ))
    }
}

impl SharedState<ReadWrite> {
    /// Create and zero the named aggregate.
    ///
    /// Fails with [`ResourceError::AlreadyExists`] if the backing object is
    /// already present — stale leftovers must be unlinked first.
    pub fn create(name: &str, config: &GameConfig) -> Result<StateWriter, ResourceError> {
        let layout = StateLayout::new(config);
        let region = shm::create(name, layout.total_bytes())?;
        let writer = Self::from_backing(Backing::Shm(region), layout, Some(name.to_string()));
        writer.write_header(config);
        Ok(writer)
    }

    /// Attach an existing named aggregate read-write.
    pub fn open(name: &str) -> Result<StateWriter, ResourceError> {
        let region = shm::open(name, true)?;
        let layout = Self::layout_from_mapping(&region, name)?;
        Ok(Self::from_backing(
            Backing::Shm(region),
            layout,
            Some(name.to_string()),
        ))
    }

    /// Create a heap-backed aggregate for a single-process harness.
    #[must_use]
    pub fn create_in_memory(config: &GameConfig) -> StateWriter {
        let layout = StateLayout::new(config);
        let heap = Arc::new(HeapRegion::new(layout.total_bytes()));
        let writer = Self::from_backing(Backing::Heap(heap), layout, None);
        writer.write_header(config);
        writer
    }

    /// A read handle onto the same aggregate.
    ///
    /// Heap-backed writers share their buffer; shared-memory writers attach
    /// a fresh read-only mapping of the same object.
    pub fn reader(&self) -> Result<StateReader, ResourceError> {
        match &self.backing {
            Backing::Heap(heap) => Ok(StateReader::from_backing(
                Backing::Heap(Arc::clone(heap)),
                self.layout,
                None,
            )),
            Backing::Shm(_) => {
                let name = self.name.as_deref().expect("shm backing always has a name");
                StateReader::open(name)
            }
        }
    }

    fn write_header(&self, config: &GameConfig) {
        self.write_u32(self.layout.width_offset(), u32::from(config.width()));
        self.write_u32(self.layout.height_offset(), u32::from(config.height()));
        self.write_u32(self.layout.agent_count_offset(), config.agent_count() as u32);
        self.write_u32(self.layout.finished_offset(), 0);
    }

    fn write_u32(&self, offset: usize, value: u32) {
        debug_assert!(offset + 4 <= self.layout.total_bytes());
        unsafe {
            self.ptr
                .as_ptr()
                .add(offset)
                .cast::<u32>()
                .write_volatile(value);
        }
    }

    fn write_i32(&self, offset: usize, value: i32) {
        debug_assert!(offset + 4 <= self.layout.total_bytes());
        unsafe {
            self.ptr
                .as_ptr()
                .add(offset)
                .cast::<i32>()
                .write_volatile(value);
        }
    }

    /// Set the global finished flag. Hold the write guard.
    pub fn set_finished(&self, finished: bool) {
        self.write_u32(self.layout.finished_offset(), u32::from(finished));
    }

    /// Overwrite one cell. Hold the write guard.
    pub fn set_cell(&self, x: u16, y: u16, value: i32) {
        self.write_i32(self.layout.cell_offset(x, y), value);
    }

    /// Record an agent's display name and owning pid.
    pub fn set_agent_identity(&self, index: usize, name: &str, pid: i32) {
        let name_off = self.layout.agent_name_offset(index);
        let bytes = name.as_bytes();
        for i in 0..NAME_LEN {
            // Truncate to 15 bytes, always NUL-terminated.
            let byte = if i < NAME_LEN - 1 {
                bytes.get(i).copied().unwrap_or(0)
            } else {
                0
            };
            unsafe { self.ptr.as_ptr().add(name_off + i).write_volatile(byte) };
        }
        self.write_i32(self.layout.agent_pid_offset(index), pid);
    }

    /// Place an agent on its starting cell: zero the counters, set the
    /// position, claim the cell with no reward credited.
    pub fn place_agent(&self, index: usize, x: u16, y: u16) {
        self.write_u32(self.layout.agent_score_offset(index), 0);
        self.write_u32(self.layout.agent_valid_offset(index), 0);
        self.write_u32(self.layout.agent_invalid_offset(index), 0);
        self.write_u32(self.layout.agent_x_offset(index), u32::from(x));
        self.write_u32(self.layout.agent_y_offset(index), u32::from(y));
        self.write_u32(self.layout.agent_blocked_offset(index), 0);
        self.set_cell(x, y, -(index as i32));
    }

    /// Apply a validated move: credit the reward, bump the valid counter,
    /// move the agent, claim the destination. Hold the write guard.
    pub fn record_valid_move(&self, index: usize, x: u16, y: u16, reward: u32) {
        let score = self.read_u32(self.layout.agent_score_offset(index));
        self.write_u32(self.layout.agent_score_offset(index), score + reward);
        let valid = self.read_u32(self.layout.agent_valid_offset(index));
        self.write_u32(self.layout.agent_valid_offset(index), valid + 1);
        self.write_u32(self.layout.agent_x_offset(index), u32::from(x));
        self.write_u32(self.layout.agent_y_offset(index), u32::from(y));
        self.set_cell(x, y, -(index as i32));
    }

    /// Count a rejected move. Hold the write guard.
    pub fn record_invalid_move(&self, index: usize) {
        let invalid = self.read_u32(self.layout.agent_invalid_offset(index));
        self.write_u32(self.layout.agent_invalid_offset(index), invalid + 1);
    }

    /// Mark one agent blocked. Hold the write guard.
    pub fn set_blocked(&self, index: usize) {
        self.write_u32(self.layout.agent_blocked_offset(index), 1);
    }

    /// Re-derive `blocked` for every not-yet-blocked agent from the current
    /// board. Hold the write guard.
    pub fn mark_blocked_agents(&self) {
        for i in 0..self.agent_count() {
            if self.agent_blocked(i) {
                continue;
            }
            let (x, y) = self.agent_position(i);
            if !self.has_move_from(x, y) {
                self.set_blocked(i);
            }
        }
    }
}
