//! In-memory [`GpioDriver`] for tests and hardware-less runs.
//!
//! Pins, watchdogs and SPI channels are plain state behind a mutex. Edge
//! callbacks are invoked synchronously from whichever thread causes the edge,
//! never while the state lock is held, so handlers may call back into the
//! driver.
//!
//! A humidity/temperature responder can be attached to a pin. When the host
//! finishes a start pulse on that pin (drive low, switch to input, arm the
//! watchdog) the simulator plays back a complete frame of edges. A responder
//! returning `None` models a sensor that never answers: only the host edges
//! are seen and the watchdog fires.

use crate::error::{MonitorError, Result};
use crate::hardware::{CallbackId, Edge, EdgeHandler, GpioDriver, Level, PinMode, Pull};
use crate::sensors::decoder::frame_checksum;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Ticks between the end of one frame and the next start pulse.
pub const FRAME_INTERVAL_TICKS: u32 = 1_000_000;

/// Host start pulse length in ticks.
pub const START_PULSE_TICKS: u32 = 17_000;

/// Highest BCM GPIO number on the 40-pin header boards.
pub const MAX_PIN: u32 = 53;

const RESPONSE_DELAY_TICKS: u32 = 20;
const SYNC_PULSE_TICKS: u32 = 80;
const BIT_GAP_TICKS: u32 = 50;
const ZERO_PULSE_TICKS: u32 = 26;
const ONE_PULSE_TICKS: u32 = 70;

/// The two edges of the host start pulse beginning at `start`.
fn start_edges(start: u32) -> [(Edge, u32); 2] {
    [
        (Edge::Rising, start),
        (Edge::Falling, start.wrapping_add(START_PULSE_TICKS)),
    ]
}

/// Edge sequence of one complete frame, start pulse included.
///
/// `bytes` are sent in order, most significant bit first: humidity, humidity
/// decimal, temperature, temperature decimal, checksum.
pub fn frame_edges(start: u32, bytes: [u8; 5]) -> Vec<(Edge, u32)> {
    let mut edges = Vec::with_capacity(2 + 3 + 2 * 40 + 1);
    edges.extend(start_edges(start));

    let mut tick = start.wrapping_add(START_PULSE_TICKS);
    let mut push = |edge: Edge, delay: u32| {
        tick = tick.wrapping_add(delay);
        edges.push((edge, tick));
    };

    // sensor response: two sync pulses
    push(Edge::Rising, RESPONSE_DELAY_TICKS);
    push(Edge::Falling, SYNC_PULSE_TICKS);
    push(Edge::Rising, SYNC_PULSE_TICKS);

    for byte in bytes {
        for shift in (0..8).rev() {
            let one = (byte >> shift) & 1 == 1;
            push(Edge::Falling, BIT_GAP_TICKS);
            push(
                Edge::Rising,
                if one { ONE_PULSE_TICKS } else { ZERO_PULSE_TICKS },
            );
        }
    }
    push(Edge::Falling, BIT_GAP_TICKS);
    edges
}

type ClimateResponder = Box<dyn FnMut() -> Option<(u8, u8)> + Send>;
type AdcResponder = Box<dyn FnMut(u8) -> u16 + Send>;
type SharedHandler = Arc<Mutex<EdgeHandler>>;

#[derive(Debug, Clone, Copy)]
struct PinState {
    mode: PinMode,
    level: Level,
    pull: Pull,
    watchdog_ms: u32,
    start_requested: bool,
}

impl Default for PinState {
    fn default() -> Self {
        Self {
            mode: PinMode::Input,
            level: Level::High,
            pull: Pull::Off,
            watchdog_ms: 0,
            start_requested: false,
        }
    }
}

struct Registration {
    id: CallbackId,
    pin: u32,
    edge: Edge,
    handler: SharedHandler,
}

#[derive(Default)]
struct SimState {
    pins: HashMap<u32, PinState>,
    callbacks: Vec<Registration>,
    next_callback: u64,
    tick: u32,
    open_spi: HashMap<u32, (u32, u8)>,
    climate: HashMap<u32, ClimateResponder>,
    adc: Option<AdcResponder>,
    watchdog_fault: bool,
}

pub struct SimulatedGpio {
    state: Mutex<SimState>,
    fail_setup: bool,
}

impl SimulatedGpio {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SimState::default()),
            fail_setup: false,
        }
    }

    /// A driver whose initialisation and SPI open always fail.
    pub fn failing() -> Self {
        Self {
            fail_setup: true,
            ..Self::new()
        }
    }

    /// Answer start pulses on `pin` with frames from `responder`.
    pub fn attach_climate_source(
        &self,
        pin: u32,
        responder: impl FnMut() -> Option<(u8, u8)> + Send + 'static,
    ) {
        self.state.lock().climate.insert(pin, Box::new(responder));
    }

    /// Answer ADC conversions with raw values from `responder`.
    pub fn attach_adc(&self, responder: impl FnMut(u8) -> u16 + Send + 'static) {
        self.state.lock().adc = Some(Box::new(responder));
    }

    /// Current simulated tick.
    pub fn now(&self) -> u32 {
        self.state.lock().tick
    }

    pub fn advance(&self, ticks: u32) {
        let mut state = self.state.lock();
        state.tick = state.tick.wrapping_add(ticks);
    }

    /// Deliver one edge to the callbacks registered on `pin`.
    pub fn inject_edge(&self, pin: u32, edge: Edge, tick: u32) {
        self.dispatch(pin, &[(edge, tick)]);
    }

    /// Deliver an event the way pigpio reports it, as a raw callback level.
    pub fn inject_level(&self, pin: u32, level: u32, tick: u32) -> Result<()> {
        let edge = Edge::from_level(level).ok_or_else(|| MonitorError::Gpio {
            pin,
            reason: format!("unknown callback level {level}"),
        })?;
        self.inject_edge(pin, edge, tick);
        Ok(())
    }

    /// Drive an input pin from outside, e.g. a pressed button.
    pub fn set_input_level(&self, pin: u32, level: Level) {
        self.state.lock().pins.entry(pin).or_default().level = level;
    }

    /// While set, disarming a watchdog fails.
    pub fn set_watchdog_fault(&self, fault: bool) {
        self.state.lock().watchdog_fault = fault;
    }

    /// Simulate the pin watchdog expiring now.
    pub fn fire_watchdog(&self, pin: u32) {
        let now = self.now();
        self.dispatch(pin, &[(Edge::Either, now)]);
    }

    pub fn mode(&self, pin: u32) -> Option<PinMode> {
        self.state.lock().pins.get(&pin).map(|p| p.mode)
    }

    pub fn level(&self, pin: u32) -> Option<Level> {
        self.state.lock().pins.get(&pin).map(|p| p.level)
    }

    pub fn pull(&self, pin: u32) -> Option<Pull> {
        self.state.lock().pins.get(&pin).map(|p| p.pull)
    }

    /// Armed watchdog timeout on `pin`, 0 when disarmed.
    pub fn watchdog(&self, pin: u32) -> u32 {
        self.state
            .lock()
            .pins
            .get(&pin)
            .map_or(0, |p| p.watchdog_ms)
    }

    pub fn callback_count(&self) -> usize {
        self.state.lock().callbacks.len()
    }

    pub fn spi_is_open(&self, channel: u32) -> bool {
        self.state.lock().open_spi.contains_key(&channel)
    }

    fn dispatch(&self, pin: u32, edges: &[(Edge, u32)]) {
        for &(edge, tick) in edges {
            let handlers: Vec<SharedHandler> = {
                let mut state = self.state.lock();
                state.tick = tick;
                state
                    .callbacks
                    .iter()
                    .filter(|r| r.pin == pin && r.edge.accepts(edge))
                    .map(|r| Arc::clone(&r.handler))
                    .collect()
            };
            for handler in handlers {
                let mut handler = handler.lock();
                (*handler)(pin, edge, tick);
            }
        }
    }

    /// Play back the attached sensor's answer to a start pulse.
    fn respond(&self, pin: u32) {
        let (edges, silent) = {
            let mut state = self.state.lock();
            let Some(responder) = state.climate.get_mut(&pin) else {
                return;
            };
            let response = responder();
            let start = state.tick.wrapping_add(FRAME_INTERVAL_TICKS);
            match response {
                Some((humidity, temperature)) => {
                    let checksum = frame_checksum(humidity, temperature);
                    (
                        frame_edges(start, [humidity, 0, temperature, 0, checksum]),
                        false,
                    )
                }
                None => (start_edges(start).to_vec(), true),
            }
        };

        self.dispatch(pin, &edges);
        if silent {
            self.fire_watchdog(pin);
        }
    }

    fn check_pin(pin: u32) -> Result<()> {
        if pin > MAX_PIN {
            return Err(MonitorError::Gpio {
                pin,
                reason: format!("no such GPIO (0..={MAX_PIN})"),
            });
        }
        Ok(())
    }

    fn setup_error(&self) -> MonitorError {
        MonitorError::HardwareSetup("simulated driver refused to start".to_string())
    }
}

impl Default for SimulatedGpio {
    fn default() -> Self {
        Self::new()
    }
}

impl GpioDriver for SimulatedGpio {
    fn initialize(&self) -> Result<()> {
        if self.fail_setup {
            return Err(self.setup_error());
        }
        Ok(())
    }

    fn set_mode(&self, pin: u32, mode: PinMode) -> Result<()> {
        Self::check_pin(pin)?;
        let mut state = self.state.lock();
        let pin_state = state.pins.entry(pin).or_default();
        pin_state.mode = mode;
        if mode == PinMode::Input {
            // bus pull-up takes the released line high
            pin_state.level = Level::High;
        }
        Ok(())
    }

    fn digital_write(&self, pin: u32, level: Level) -> Result<()> {
        Self::check_pin(pin)?;
        let mut state = self.state.lock();
        let pin_state = state.pins.entry(pin).or_default();
        pin_state.mode = PinMode::Output;
        pin_state.level = level;
        if level == Level::Low {
            pin_state.start_requested = true;
        }
        Ok(())
    }

    fn digital_read(&self, pin: u32) -> Result<Level> {
        Self::check_pin(pin)?;
        Ok(self.level(pin).unwrap_or(Level::High))
    }

    fn set_pull_up_down(&self, pin: u32, pull: Pull) -> Result<()> {
        Self::check_pin(pin)?;
        self.state.lock().pins.entry(pin).or_default().pull = pull;
        Ok(())
    }

    fn set_watchdog(&self, pin: u32, timeout_ms: u32) -> Result<()> {
        Self::check_pin(pin)?;
        let start_pulse_done = {
            let mut state = self.state.lock();
            if timeout_ms == 0 && state.watchdog_fault {
                return Err(MonitorError::Gpio {
                    pin,
                    reason: "watchdog did not disarm".to_string(),
                });
            }
            let pin_state = state.pins.entry(pin).or_default();
            pin_state.watchdog_ms = timeout_ms;
            let done = timeout_ms > 0
                && pin_state.mode == PinMode::Input
                && pin_state.start_requested;
            if done {
                pin_state.start_requested = false;
            }
            done
        };

        if start_pulse_done {
            self.respond(pin);
        }
        Ok(())
    }

    fn register_edge_callback(
        &self,
        pin: u32,
        edge: Edge,
        handler: EdgeHandler,
    ) -> Result<CallbackId> {
        Self::check_pin(pin)?;
        let mut state = self.state.lock();
        state.next_callback += 1;
        let id = CallbackId(state.next_callback);
        state.callbacks.push(Registration {
            id,
            pin,
            edge,
            handler: Arc::new(Mutex::new(handler)),
        });
        Ok(id)
    }

    fn cancel_callback(&self, id: CallbackId) {
        self.state.lock().callbacks.retain(|r| r.id != id);
    }

    fn spi_open(&self, channel: u32, speed_hz: u32, mode: u8) -> Result<()> {
        if self.fail_setup {
            return Err(self.setup_error());
        }
        if channel > 1 {
            return Err(MonitorError::HardwareSetup(format!(
                "SPI channel {channel} not available"
            )));
        }
        self.state.lock().open_spi.insert(channel, (speed_hz, mode));
        Ok(())
    }

    fn spi_transfer(&self, channel: u32, tx: &[u8]) -> Result<Vec<u8>> {
        let mut state = self.state.lock();
        if !state.open_spi.contains_key(&channel) {
            return Err(MonitorError::Spi {
                channel,
                reason: "channel not open".to_string(),
            });
        }

        let mut rx = vec![0u8; tx.len()];
        if let [first, second, ..] = tx
            && rx.len() >= 3
        {
            let adc_channel = ((*first & 0x01) << 2) | (*second >> 6);
            let raw = state.adc.as_mut().map_or(0, |adc| adc(adc_channel)) & 0x0FFF;
            rx[1] = (raw >> 8) as u8;
            rx[2] = raw as u8;
        }
        Ok(rx)
    }

    fn spi_close(&self, channel: u32) {
        self.state.lock().open_spi.remove(&channel);
    }
}
