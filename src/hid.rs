//! DualShock-style HID adapter.
//!
//! Raw controller I/O is explicitly out of scope for the core engine; this
//! module is one concrete `DeviceSource`/`DeviceSink` pair wired in
//! `main.rs` so the binary has something real to run against. Uses the
//! `gilrs` crate for input, running polling in a background thread and
//! handing events to the engine thread over a bounded channel, the same
//! shape as the background-worker pattern used for hardware polling
//! elsewhere in this codebase.

use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

use crate::device::{DeviceEvent, DeviceSink, DeviceSource};
use crate::signal::{ControllerSignal, SignalTable};

/// Polls a physical gamepad via `gilrs` and exposes it as a `DeviceSource`.
pub struct GilrsSource {
    receiver: Receiver<DeviceEvent>,
    stop_tx: Sender<()>,
}

impl GilrsSource {
    /// Starts the background polling thread immediately. `poll_hz` governs
    /// how often the gilrs event queue is drained.
    pub fn new(signals: std::sync::Arc<SignalTable>, poll_hz: u32) -> Self {
        let (data_tx, data_rx) = bounded::<DeviceEvent>(256);
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let period = Duration::from_secs_f64(1.0 / poll_hz as f64);

        thread::spawn(move || gamepad_worker(signals, data_tx, stop_rx, period));

        Self {
            receiver: data_rx,
            stop_tx,
        }
    }
}

impl DeviceSource for GilrsSource {
    fn poll_event(&mut self) -> Option<DeviceEvent> {
        self.receiver.try_recv().ok()
    }
}

impl Drop for GilrsSource {
    fn drop(&mut self) {
        let _ = self.stop_tx.try_send(());
    }
}

fn gamepad_worker(signals: std::sync::Arc<SignalTable>, data_tx: Sender<DeviceEvent>, stop_rx: Receiver<()>, period: Duration) {
    use gilrs::{Axis, Button, EventType, Gilrs};

    let mut gilrs = match Gilrs::new() {
        Ok(g) => g,
        Err(e) => {
            tracing::error!("failed to initialize gamepad: {e}");
            return;
        }
    };

    tracing::info!("gamepad input thread started");
    let start = Instant::now();

    loop {
        let tick_start = Instant::now();
        if stop_rx.try_recv().is_ok() {
            break;
        }

        while let Some(raw) = gilrs.next_event() {
            let time = start.elapsed().as_millis() as u32;
            let event = match raw.event {
                EventType::ButtonPressed(button, _) => button_event(&signals, button, 1, time),
                EventType::ButtonReleased(button, _) => button_event(&signals, button, 0, time),
                EventType::AxisChanged(axis, value, _) => axis_event(&signals, axis, value, time),
                _ => None,
            };
            if let Some(event) = event {
                match data_tx.try_send(event) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => tracing::trace!("gamepad event dropped, engine not keeping up"),
                    Err(TrySendError::Disconnected(_)) => return,
                }
            }
        }

        let elapsed = tick_start.elapsed();
        if elapsed < period {
            spin_sleep::sleep(period - elapsed);
        }
    }

    tracing::info!("gamepad input thread exiting");
}

fn button_event(signals: &SignalTable, button: gilrs::Button, value: i16, time: u32) -> Option<DeviceEvent> {
    use gilrs::Button::*;
    let signal = match button {
        South => ControllerSignal::X,
        East => ControllerSignal::CIRCLE,
        West => ControllerSignal::SQUARE,
        North => ControllerSignal::TRIANGLE,
        LeftTrigger => ControllerSignal::L1,
        RightTrigger => ControllerSignal::R1,
        LeftTrigger2 => ControllerSignal::L2,
        RightTrigger2 => ControllerSignal::R2,
        Select => ControllerSignal::SHARE,
        Start => ControllerSignal::OPTIONS,
        Mode => ControllerSignal::PS,
        LeftThumb => ControllerSignal::L3,
        RightThumb => ControllerSignal::R3,
        _ => return None,
    };
    let idx = signals.get_by_signal(signal).button_index();
    Some(DeviceEvent::new(time, value, (idx >> 8) as u8, (idx & 0xff) as u8))
}

fn axis_event(signals: &SignalTable, axis: gilrs::Axis, value: f32, time: u32) -> Option<DeviceEvent> {
    use gilrs::Axis::*;
    let signal = match axis {
        LeftStickX => ControllerSignal::LX,
        LeftStickY => ControllerSignal::LY,
        RightStickX => ControllerSignal::RX,
        RightStickY => ControllerSignal::RY,
        DPadX => ControllerSignal::DX,
        DPadY => ControllerSignal::DY,
        LeftZ => ControllerSignal::L2,
        RightZ => ControllerSignal::R2,
        _ => return None,
    };
    let input = signals.get_by_signal(signal);
    let scaled = (value as f64 * crate::signal::JOYSTICK_MAX as f64) as i32;
    let value = crate::signal::joystick_limit(scaled);

    let idx = if matches!(input.class, crate::signal::SignalClass::Hybrid) {
        input.hybrid_index()
    } else {
        input.button_index()
    };
    Some(DeviceEvent::new(time, value, (idx >> 8) as u8, (idx & 0xff) as u8))
}

/// Forwards events unchanged to the console by writing them to the
/// physical gamepad's rumble-free passthrough report (no local hardware
/// target; logs instead).
pub struct LoggingSink;

impl DeviceSink for LoggingSink {
    fn apply_event(&mut self, event: DeviceEvent) {
        tracing::trace!(?event, "apply_event");
    }
}
