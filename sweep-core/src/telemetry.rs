//! Telemetry event catalog and bounded recorder.
//!
//! The controller reports progress as strongly typed events rather than
//! formatted log lines; embedders print, forward, or retain them as they
//! see fit. The ring recorder keeps the most recent events with
//! monotonically increasing ids for end-of-run reporting.

use core::fmt;

use heapless::HistoryBuf;

use crate::bus::{DeviceError, ServoId};
use crate::codec::Position;
use crate::torque::TorqueFailure;

/// Identifier assigned to recorded telemetry events.
pub type EventId = u32;

/// Total number of telemetry entries retained in memory.
pub const TELEMETRY_RING_CAPACITY: usize = 64;

/// Discriminated events emitted over the life of a sweep run.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum MotionEvent {
    /// Transport acquired and configured.
    LinkOpened { baud_rate: u32 },
    /// Transport released.
    LinkClosed,
    TorqueEnabled(ServoId),
    TorqueEnableFailed(TorqueFailure),
    TorqueDisabled(ServoId),
    TorqueDisableFailed(TorqueFailure),
    /// One servo's goal for the cycle was queued for the batched write.
    GoalCommanded { id: ServoId, goal: Position },
    /// The batched goal write failed to transmit; polling continues.
    CommitFailed(DeviceError),
    /// Per-poll status for one servo.
    ServoStatus {
        id: ServoId,
        goal: Position,
        present: Option<Position>,
        converged: bool,
    },
    /// Every servo reached its goal for the current waypoint.
    CycleConverged { waypoint: Position },
    /// A cancellation request was observed and honoured.
    CancelRequested,
    /// The run reached its terminal state.
    RunFinished { cycles: u32 },
}

impl fmt::Display for MotionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MotionEvent::LinkOpened { baud_rate } => write!(f, "link-opened baud={baud_rate}"),
            MotionEvent::LinkClosed => f.write_str("link-closed"),
            MotionEvent::TorqueEnabled(id) => write!(f, "torque-enabled id={id}"),
            MotionEvent::TorqueEnableFailed(failure) => {
                write!(f, "torque-enable-failed id={} {}", failure.id, failure.error)
            }
            MotionEvent::TorqueDisabled(id) => write!(f, "torque-disabled id={id}"),
            MotionEvent::TorqueDisableFailed(failure) => {
                write!(
                    f,
                    "torque-disable-failed id={} {}",
                    failure.id, failure.error
                )
            }
            MotionEvent::GoalCommanded { id, goal } => {
                write!(f, "goal-commanded id={id} goal={goal}")
            }
            MotionEvent::CommitFailed(error) => write!(f, "commit-failed {error}"),
            MotionEvent::ServoStatus {
                id,
                goal,
                present: Some(present),
                converged,
            } => {
                write!(
                    f,
                    "servo-status id={id} goal={goal} present={present} converged={converged}"
                )
            }
            MotionEvent::ServoStatus {
                id,
                goal,
                present: None,
                converged,
            } => {
                write!(
                    f,
                    "servo-status id={id} goal={goal} present=? converged={converged}"
                )
            }
            MotionEvent::CycleConverged { waypoint } => {
                write!(f, "cycle-converged waypoint={waypoint}")
            }
            MotionEvent::CancelRequested => f.write_str("cancel-requested"),
            MotionEvent::RunFinished { cycles } => write!(f, "run-finished cycles={cycles}"),
        }
    }
}

/// Receives telemetry events as the controller makes progress.
pub trait EventSink {
    /// Accepts one event. Sinks must not fail; a full ring drops its
    /// oldest entry instead.
    fn emit(&mut self, event: MotionEvent);
}

/// Sink that drops every event.
#[derive(Copy, Clone, Debug, Default)]
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn emit(&mut self, _: MotionEvent) {}
}

/// Telemetry record stored in the ring buffer.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct MotionRecord {
    pub id: EventId,
    pub event: MotionEvent,
}

/// Records telemetry events into a fixed-size ring buffer.
pub struct TelemetryRecorder<const CAPACITY: usize = TELEMETRY_RING_CAPACITY> {
    ring: HistoryBuf<MotionRecord, CAPACITY>,
    next_event_id: EventId,
}

impl<const CAPACITY: usize> TelemetryRecorder<CAPACITY> {
    /// Creates a recorder with an empty history.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ring: HistoryBuf::new(),
            next_event_id: 0,
        }
    }

    /// Stores an event, assigning and returning its id. The oldest entry
    /// is evicted once the ring is full.
    pub fn record(&mut self, event: MotionEvent) -> EventId {
        let id = self.next_event_id;
        self.next_event_id = self.next_event_id.wrapping_add(1);
        self.ring.write(MotionRecord { id, event });
        id
    }

    /// Most recently recorded entry, if any.
    #[must_use]
    pub fn latest(&self) -> Option<&MotionRecord> {
        self.ring.recent()
    }

    /// Number of retained entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    /// Returns `true` when nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Retained entries, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &MotionRecord> {
        self.ring.oldest_ordered()
    }
}

impl<const CAPACITY: usize> Default for TelemetryRecorder<CAPACITY> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const CAPACITY: usize> EventSink for TelemetryRecorder<CAPACITY> {
    fn emit(&mut self, event: MotionEvent) {
        self.record(event);
    }
}
