mod bus;

use std::env;
use std::io::{self, Write};
use std::process;
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal;

use sweep_core::bus::{DeviceProtocol, MAX_SERVO_ID, ModelNumber, ServoId, Transport};
use sweep_core::config::{RegisterMap, SweepConfig};
use sweep_core::sequencer::{AdvanceDecision, RunHooks, WaypointSequencer};
use sweep_core::telemetry::{EventSink, MotionEvent, TelemetryRecorder};

use bus::SimulatedBus;

/// Model number the simulated servos report, matching the DX-117.
const DX117_MODEL: ModelNumber = 113;

/// Servo id used by the single-servo profile.
const PRIMARY_ID: ServoId = 0;

/// Servo ids used by the trio profile.
const TRIO_IDS: [ServoId; 3] = [0, 1, 2];

/// Mid-travel start position for freshly attached servos.
const START_POSITION: i32 = 512;

/// Poll pacing; doubles as the window for catching a cancellation key.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Profile {
    Single,
    Trio,
    Scan,
}

impl Profile {
    fn from_tag(tag: &str) -> Result<Self, String> {
        if tag.eq_ignore_ascii_case("single") {
            Ok(Self::Single)
        } else if tag.eq_ignore_ascii_case("trio") {
            Ok(Self::Trio)
        } else if tag.eq_ignore_ascii_case("scan") {
            Ok(Self::Scan)
        } else {
            Err(format!("Unknown profile `{tag}`"))
        }
    }
}

fn main() -> io::Result<()> {
    let profile = parse_profile().unwrap_or_else(|err| {
        eprintln!("{err}");
        eprintln!("Usage: sweep-emulator [--profile <single|trio|scan>] | sweep-emulator <single|trio|scan>");
        process::exit(2);
    });

    match profile {
        Profile::Single => run_sweep(&SweepConfig::single_servo(PRIMARY_ID), &[PRIMARY_ID]),
        Profile::Trio => run_sweep(&SweepConfig::servo_trio(TRIO_IDS), &TRIO_IDS),
        Profile::Scan => run_scan(),
    }
}

fn parse_profile() -> Result<Profile, String> {
    let mut args = env::args().skip(1);
    if let Some(arg) = args.next() {
        if let Some(value) = arg.strip_prefix("--profile=") {
            Profile::from_tag(value)
        } else if arg == "--profile" {
            if let Some(value) = args.next() {
                Profile::from_tag(&value)
            } else {
                Err("Expected value after --profile".to_string())
            }
        } else {
            Profile::from_tag(&arg)
        }
    } else {
        Ok(Profile::Single)
    }
}

/// Prints telemetry as it happens and retains the ring for the summary.
struct ConsoleSink {
    recorder: TelemetryRecorder,
}

impl ConsoleSink {
    fn new() -> Self {
        Self {
            recorder: TelemetryRecorder::new(),
        }
    }
}

impl EventSink for ConsoleSink {
    fn emit(&mut self, event: MotionEvent) {
        // Raw mode is active while the sweep runs; \r\n keeps the column.
        let mut out = io::stdout();
        write!(out, "{event}\r\n").ok();
        out.flush().ok();
        self.recorder.record(event);
    }
}

/// Key-driven control surface: any key advances, Esc or `q` cancels.
struct ConsoleHooks {
    cancelled: bool,
}

impl ConsoleHooks {
    fn new() -> Self {
        Self { cancelled: false }
    }

    fn is_cancel_key(code: KeyCode) -> bool {
        matches!(code, KeyCode::Esc | KeyCode::Char('q'))
    }
}

impl RunHooks for ConsoleHooks {
    fn await_advance(&mut self) -> AdvanceDecision {
        if self.cancelled {
            return AdvanceDecision::Abort;
        }
        let mut out = io::stdout();
        write!(out, "press any key for the next waypoint (Esc or q to quit)\r\n").ok();
        out.flush().ok();
        loop {
            match event::read() {
                Ok(Event::Key(key)) if key.kind == KeyEventKind::Press => {
                    if Self::is_cancel_key(key.code) {
                        return AdvanceDecision::Abort;
                    }
                    return AdvanceDecision::Advance;
                }
                Ok(_) => {}
                Err(_) => return AdvanceDecision::Abort,
            }
        }
    }

    fn cancel_requested(&mut self) -> bool {
        self.cancelled
    }

    fn between_polls(&mut self) {
        // Waiting for a key event paces the poll loop.
        if let Ok(true) = event::poll(POLL_INTERVAL)
            && let Ok(Event::Key(key)) = event::read()
            && key.kind == KeyEventKind::Press
            && Self::is_cancel_key(key.code)
        {
            self.cancelled = true;
        }
    }
}

fn run_sweep(config: &SweepConfig, ids: &[ServoId]) -> io::Result<()> {
    let mut bus = SimulatedBus::new(config.registers);
    for &id in ids {
        bus.attach(id, DX117_MODEL, START_POSITION);
    }

    let mut sink = ConsoleSink::new();
    let sequencer = WaypointSequencer::new(config, &mut bus, &mut sink)
        .map_err(|error| io::Error::other(format!("invalid configuration: {error}")))?;

    terminal::enable_raw_mode()?;
    let mut hooks = ConsoleHooks::new();
    let outcome = sequencer.run(&mut hooks);
    terminal::disable_raw_mode()?;

    match outcome {
        Ok(report) => {
            println!(
                "run finished: {} cycles, {} disable failures",
                report.cycles_completed,
                report.disable_failures.len()
            );
        }
        Err(error) => println!("run failed: {error}"),
    }
    for &id in ids {
        if let Some(position) = bus.present(id) {
            println!("servo {id} resting at {position}");
        }
    }
    println!("{} telemetry events retained", sink.recorder.len());
    Ok(())
}

fn run_scan() -> io::Result<()> {
    let mut bus = SimulatedBus::new(RegisterMap::dx());
    bus.attach(3, DX117_MODEL, START_POSITION);
    bus.attach(17, DX117_MODEL, START_POSITION);

    bus.open()
        .map_err(|error| io::Error::other(format!("open failed: {error}")))?;
    let found = scan_bus(&mut bus);
    bus.close();

    if found.is_empty() {
        println!("no servos answered");
    }
    for (id, model) in &found {
        println!("found id {id} (model {model})");
    }
    Ok(())
}

/// Pings every assignable id and collects the responders in order.
fn scan_bus<P: DeviceProtocol>(bus: &mut P) -> Vec<(ServoId, ModelNumber)> {
    (0..=MAX_SERVO_ID)
        .filter_map(|id| bus.ping(id).ok().map(|model| (id, model)))
        .collect()
}
