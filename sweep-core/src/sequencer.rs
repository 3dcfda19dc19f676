//! Waypoint sweep state machine.
//!
//! The control flow this replaces is a pair of nested blocking loops; here
//! every suspension point is a named state so cancellation and pacing can
//! be injected between discrete bus steps. One [`WaypointSequencer::step`]
//! call performs the work of the current state and settles the next one;
//! [`WaypointSequencer::run`] drives steps until the machine closes.

use core::fmt;

use heapless::Vec;

use crate::bus::{ConnectError, DeviceProtocol, ServoId, Transport};
use crate::codec::{self, EncodeError, Position};
use crate::config::{ConfigError, MAX_SERVOS, SweepConfig};
use crate::poll::{ConvergencePoller, Goal};
use crate::sync_write::{BatchError, SyncWriteBatch};
use crate::telemetry::{EventSink, MotionEvent};
use crate::torque::{TorqueControl, TorqueFailure};

/// Observable phases of a sweep run.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SweepState {
    /// Constructed, nothing touched yet.
    Idle,
    /// Acquiring the transport and applying the communication rate.
    Connecting,
    /// Engaging holding torque across the servo set.
    Enabling,
    /// Deriving, encoding, and committing the cycle's goals.
    CommandWaypoint,
    /// Polling present positions until every servo arrives, then waiting
    /// for the advance trigger.
    AwaitConvergence,
    /// A cancellation request was honoured; shutdown follows.
    Cancelled,
    /// Releasing holding torque, best effort.
    Disabling,
    /// Transport released. Terminal.
    Closed,
}

impl SweepState {
    /// Returns `true` once the run can make no further transitions.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, SweepState::Closed)
    }
}

/// Operator decision after a cycle converges.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AdvanceDecision {
    /// Move on to the next waypoint in the cycle.
    Advance,
    /// End the run through the shutdown path.
    Abort,
}

/// External control surface for a run: the advance trigger, cancellation,
/// and poll pacing.
///
/// Hooks are consulted only between discrete bus steps; an in-flight
/// commit or read always completes before a cancellation takes effect.
pub trait RunHooks {
    /// Blocks until the operator asks for the next waypoint or an abort.
    fn await_advance(&mut self) -> AdvanceDecision;

    /// Polled between steps; `true` routes the run to torque shutdown.
    fn cancel_requested(&mut self) -> bool {
        false
    }

    /// Invoked between convergence polls. Pacing is the embedder's choice;
    /// a small fixed sleep keeps the bus from saturating.
    fn between_polls(&mut self) {}
}

/// Fatal failure that ends a run.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RunError {
    /// The bus connection could not be established; torque was never
    /// touched.
    Connect(ConnectError),
    /// A torque-enable write failed during start-up.
    TorqueEnable(TorqueFailure),
    /// A derived goal landed outside the configured travel range.
    GoalOutOfRange { id: ServoId, goal: Position },
    /// A goal could not be encoded for the wire.
    Encode(EncodeError),
    /// The pending batch rejected a goal insertion.
    Batch(BatchError),
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunError::Connect(error) => write!(f, "connect failed: {error}"),
            RunError::TorqueEnable(failure) => write!(f, "torque enable failed: {failure}"),
            RunError::GoalOutOfRange { id, goal } => {
                write!(f, "goal {goal} for servo {id} is outside travel")
            }
            RunError::Encode(error) => write!(f, "goal encoding failed: {error}"),
            RunError::Batch(error) => write!(f, "batch rejected goal: {error}"),
        }
    }
}

impl From<EncodeError> for RunError {
    fn from(error: EncodeError) -> Self {
        RunError::Encode(error)
    }
}

impl From<BatchError> for RunError {
    fn from(error: BatchError) -> Self {
        RunError::Batch(error)
    }
}

/// Summary of a finished run.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RunReport {
    /// Cycles that reached convergence.
    pub cycles_completed: u32,
    /// Torque-disable failures collected during shutdown.
    pub disable_failures: Vec<TorqueFailure, MAX_SERVOS>,
}

/// Drives a fixed servo set through the configured waypoint cycle.
///
/// Holds the bus exclusively for the duration of the run; collaborators
/// are borrowed at construction rather than captured piecemeal.
pub struct WaypointSequencer<'a, B, E>
where
    B: Transport + DeviceProtocol,
    E: EventSink,
{
    config: &'a SweepConfig,
    bus: &'a mut B,
    events: &'a mut E,
    state: SweepState,
    waypoint_index: usize,
    cycles_completed: u32,
    goals: Vec<Goal, MAX_SERVOS>,
    batch: SyncWriteBatch,
    poller: ConvergencePoller,
    torque: TorqueControl,
    disable_failures: Vec<TorqueFailure, MAX_SERVOS>,
    fatal: Option<RunError>,
}

impl<'a, B, E> WaypointSequencer<'a, B, E>
where
    B: Transport + DeviceProtocol,
    E: EventSink,
{
    /// Creates an idle sequencer after validating the configuration.
    ///
    /// # Errors
    ///
    /// Returns the configuration defect that would make the run unsound.
    pub fn new(
        config: &'a SweepConfig,
        bus: &'a mut B,
        events: &'a mut E,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            bus,
            events,
            state: SweepState::Idle,
            waypoint_index: 0,
            cycles_completed: 0,
            goals: Vec::new(),
            batch: SyncWriteBatch::new(config.registers.goal_position),
            poller: ConvergencePoller::new(config.registers.present_position, config.tolerance),
            torque: TorqueControl::new(config.registers.torque_enable),
            disable_failures: Vec::new(),
            fatal: None,
            config,
        })
    }

    /// Current state of the machine.
    #[must_use]
    pub fn state(&self) -> SweepState {
        self.state
    }

    /// Index of the waypoint the current or next cycle targets.
    #[must_use]
    pub fn waypoint_index(&self) -> usize {
        self.waypoint_index
    }

    /// Cycles that reached convergence so far.
    #[must_use]
    pub fn cycles_completed(&self) -> u32 {
        self.cycles_completed
    }

    /// Drives the state machine to completion and reports the outcome.
    ///
    /// # Errors
    ///
    /// Returns the fatal error that ended the run, after best-effort
    /// torque shutdown and transport release have already happened.
    pub fn run<H: RunHooks>(mut self, hooks: &mut H) -> Result<RunReport, RunError> {
        while !self.state.is_terminal() {
            self.step(hooks);
        }
        self.finish()
    }

    /// Executes the current state's work and settles the next state.
    pub fn step<H: RunHooks>(&mut self, hooks: &mut H) {
        match self.state {
            SweepState::Idle => self.state = SweepState::Connecting,
            SweepState::Connecting => self.connect(),
            SweepState::Enabling => self.enable(),
            SweepState::CommandWaypoint => self.command_waypoint(hooks),
            SweepState::AwaitConvergence => self.await_convergence(hooks),
            SweepState::Cancelled => self.state = SweepState::Disabling,
            SweepState::Disabling => self.disable_and_close(),
            SweepState::Closed => {}
        }
    }

    /// Consumes a closed sequencer, yielding its report or fatal error.
    ///
    /// # Errors
    ///
    /// Returns the fatal error recorded during the run, if any.
    pub fn finish(self) -> Result<RunReport, RunError> {
        match self.fatal {
            Some(error) => Err(error),
            None => Ok(RunReport {
                cycles_completed: self.cycles_completed,
                disable_failures: self.disable_failures,
            }),
        }
    }

    fn connect(&mut self) {
        let baud_rate = self.config.baud_rate;
        let result = self
            .bus
            .open()
            .and_then(|()| self.bus.set_baud_rate(baud_rate));
        match result {
            Ok(()) => {
                self.events.emit(MotionEvent::LinkOpened { baud_rate });
                self.state = SweepState::Enabling;
            }
            Err(error) => {
                // No torque has been engaged yet; skip straight to release.
                self.fatal = Some(RunError::Connect(error));
                self.close();
            }
        }
    }

    fn enable(&mut self) {
        let ids = self.config.servo_ids();
        match self.torque.enable_all(self.bus, &ids, self.events) {
            Ok(()) => self.state = SweepState::CommandWaypoint,
            Err(failure) => {
                // Some servos may already hold torque; shut down through
                // the disable pass.
                self.fatal = Some(RunError::TorqueEnable(failure));
                self.state = SweepState::Disabling;
            }
        }
    }

    fn command_waypoint<H: RunHooks>(&mut self, hooks: &mut H) {
        if hooks.cancel_requested() {
            self.events.emit(MotionEvent::CancelRequested);
            self.state = SweepState::Cancelled;
            return;
        }

        let waypoint = self.config.waypoints[self.waypoint_index];
        if let Err(error) = self.queue_goals(waypoint) {
            self.fatal = Some(error);
            self.batch.clear();
            self.state = SweepState::Disabling;
            return;
        }

        if let Err(error) = self.batch.commit(self.bus) {
            // Surfaced, not retried: the previous goal may still converge
            // and the poll loop reports the truth either way.
            self.events.emit(MotionEvent::CommitFailed(error));
        }
        self.batch.clear();
        self.state = SweepState::AwaitConvergence;
    }

    fn queue_goals(&mut self, waypoint: Position) -> Result<(), RunError> {
        let config = self.config;
        self.goals.clear();
        for servo in &config.servos {
            let goal = servo.goal_for(waypoint);
            if !config.travel.contains(goal) {
                return Err(RunError::GoalOutOfRange { id: servo.id, goal });
            }
            let payload = codec::encode_position(goal)?;
            self.batch.add(servo.id, payload)?;
            self.goals
                .push(Goal {
                    id: servo.id,
                    position: goal,
                })
                .map_err(|_| RunError::Batch(BatchError::Capacity))?;
            self.events
                .emit(MotionEvent::GoalCommanded { id: servo.id, goal });
        }
        Ok(())
    }

    fn await_convergence<H: RunHooks>(&mut self, hooks: &mut H) {
        if hooks.cancel_requested() {
            self.events.emit(MotionEvent::CancelRequested);
            self.state = SweepState::Cancelled;
            return;
        }

        let samples = self.poller.poll(self.bus, &self.goals);
        for goal in &self.goals {
            let present = samples
                .iter()
                .find(|sample| sample.id == goal.id)
                .and_then(|sample| sample.reading.ok());
            let converged = self.poller.arrived(*goal, &samples);
            self.events.emit(MotionEvent::ServoStatus {
                id: goal.id,
                goal: goal.position,
                present,
                converged,
            });
        }

        if self.poller.converged(&self.goals, &samples) {
            let waypoint = self.config.waypoints[self.waypoint_index];
            self.cycles_completed += 1;
            self.events.emit(MotionEvent::CycleConverged { waypoint });
            match hooks.await_advance() {
                AdvanceDecision::Advance => {
                    self.waypoint_index = (self.waypoint_index + 1) % self.config.waypoints.len();
                    self.state = SweepState::CommandWaypoint;
                }
                AdvanceDecision::Abort => {
                    self.events.emit(MotionEvent::CancelRequested);
                    self.state = SweepState::Cancelled;
                }
            }
        } else {
            hooks.between_polls();
        }
    }

    fn disable_and_close(&mut self) {
        let ids = self.config.servo_ids();
        self.disable_failures = self.torque.disable_all(self.bus, &ids, self.events);
        self.close();
    }

    fn close(&mut self) {
        self.bus.close();
        self.events.emit(MotionEvent::LinkClosed);
        self.events.emit(MotionEvent::RunFinished {
            cycles: self.cycles_completed,
        });
        self.state = SweepState::Closed;
    }
}
