//! Host doubles for the kernel collaborators.

use core::cell::Cell;

use crate::config::FRAME_BASE;
use crate::drivers::CharDevice;
use crate::mm::address::PhysAddr;
use crate::mm::frame::{Frame, FramePool};
use crate::process::Process;
use crate::sched::Scheduler;
use crate::time::Clock;

/// Heap-backed "physical memory".
pub struct TestRam {
    frames: Vec<Frame>,
}

impl TestRam {
    pub fn new(frames: usize) -> Self {
        Self {
            frames: vec![Frame::zeroed(); frames],
        }
    }

    pub fn pool(&mut self) -> FramePool<'_> {
        FramePool::new(PhysAddr::new(FRAME_BASE), &mut self.frames)
    }
}

/// Console that keeps every byte.
#[derive(Default)]
pub struct RecordingConsole {
    pub out: Vec<u8>,
}

impl CharDevice for RecordingConsole {
    fn put_byte(&mut self, byte: u8) {
        self.out.push(byte);
    }
}

/// Clock that only moves when told to.
#[derive(Default)]
pub struct ManualClock {
    now: Cell<u64>,
}

impl ManualClock {
    pub fn at(cycles: u64) -> Self {
        Self { now: Cell::new(cycles) }
    }

    pub fn advance(&self, cycles: u64) {
        self.now.set(self.now.get() + cycles);
    }
}

impl Clock for ManualClock {
    fn cycles(&self) -> u64 {
        self.now.get()
    }
}

/// Scheduler that records what it was asked to do.
#[derive(Default)]
pub struct RecordingScheduler {
    pub yields: usize,
    pub exits: Vec<(usize, i32)>,
}

impl Scheduler for RecordingScheduler {
    fn yield_now(&mut self, _current: &mut Process) {
        self.yields += 1;
    }

    fn exit(&mut self, current: &mut Process, code: i32) {
        self.exits.push((current.pid, code));
    }
}
