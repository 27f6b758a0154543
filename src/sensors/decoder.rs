//! Edge-timed frame decoder for the single-wire humidity/temperature sensor.
//!
//! A frame carries 40 bits, most significant bit first: humidity integer
//! byte, humidity decimal byte, temperature integer byte, temperature decimal
//! byte and an 8-bit checksum. Only the integer bytes and the checksum are
//! accumulated; the decimal bytes are read past and stay zero.
//!
//! The decoder is driven one edge at a time from the driver's callback
//! context. A bit's value comes from the tick distance between the last
//! falling edge and the next rising edge. A falling edge that arrives long
//! after the previous one marks the start of a new frame.
//!
//! Completed frames (and watchdog expiries) are handed to a [`FrameCell`],
//! which the poll loop reads without locking.

use crate::error::DecodeError;
use crate::hardware::{Edge, tick_diff};
use std::sync::atomic::{AtomicU64, Ordering};

/// A falling edge further than this from the previous one starts a new frame.
pub const FRAME_GAP_TICKS: u32 = 250_000;

/// Pulses at least this long decode as a 1 bit.
pub const ONE_BIT_TICKS: u32 = 50;

/// Pulses at least this long are not data; they poison the frame checksum.
pub const GARBAGE_PULSE_TICKS: u32 = 200;

/// Out-of-range checksum value that can never match a computed checksum.
const CHECKSUM_DISCARD: u16 = 256;

const FRAME_START: i8 = -2;
const LAST_BIT: i8 = 39;
const IDLE: i8 = 40;

/// Checksum the sensor is expected to send for a humidity/temperature pair.
pub fn frame_checksum(humidity: u8, temperature: u8) -> u8 {
    humidity.wrapping_add(temperature)
}

/// Humidity and temperature bytes of one completed frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DecodedReading {
    pub humidity: u8,
    pub temperature: u8,
    pub valid_checksum: bool,
    received_checksum: u16,
}

impl DecodedReading {
    /// A reading whose checksum is known to be good.
    pub fn new(humidity: u8, temperature: u8) -> Self {
        Self::from_frame(
            humidity,
            temperature,
            u16::from(frame_checksum(humidity, temperature)),
        )
    }

    fn from_frame(humidity: u8, temperature: u8, received_checksum: u16) -> Self {
        Self {
            humidity,
            temperature,
            valid_checksum: u16::from(frame_checksum(humidity, temperature))
                == received_checksum,
            received_checksum,
        }
    }

    /// Checksum as received; 256 when a garbage pulse discarded the frame.
    pub fn received_checksum(&self) -> u16 {
        self.received_checksum
    }

    /// An all-zero reading is what a faulted sensor produces.
    pub fn is_degenerate(&self) -> bool {
        self.humidity == 0 && self.temperature == 0
    }

    /// Turn a checksum mismatch into an explicit error.
    pub fn verified(self) -> Result<Self, DecodeError> {
        if self.valid_checksum {
            Ok(self)
        } else {
            Err(DecodeError::Checksum {
                computed: frame_checksum(self.humidity, self.temperature),
                received: self.received_checksum,
            })
        }
    }
}

/// What the decoder reports when a frame ends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameEvent {
    /// All 40 bits arrived. The checksum may still be wrong.
    Completed(DecodedReading),
    /// The watchdog fired before the frame finished.
    TimedOut { bit_index: i8 },
}

impl FrameEvent {
    pub fn into_result(self) -> Result<DecodedReading, DecodeError> {
        match self {
            FrameEvent::Completed(reading) => reading.verified(),
            FrameEvent::TimedOut { bit_index } => Err(DecodeError::Timeout { bit_index }),
        }
    }
}

/// Bit-position state machine for one sensor pin.
///
/// `bit_index` runs from -2 (frame start, two sync pulses pending) through 39
/// (last checksum bit) and rests at 40 while idle.
#[derive(Debug)]
pub struct EdgeDecoder {
    bit_index: i8,
    humidity: u8,
    temperature: u8,
    checksum: u16,
    last_falling_tick: u32,
    last_humidity: u8,
    last_temperature: u8,
}

impl EdgeDecoder {
    pub fn new() -> Self {
        Self {
            bit_index: IDLE,
            humidity: 0,
            temperature: 0,
            checksum: 0,
            last_falling_tick: 0,
            last_humidity: 0,
            last_temperature: 0,
        }
    }

    /// Humidity and temperature of the frame before the current one, taken
    /// when the current frame started. A timed-out frame leaves `(0, 0)`.
    pub fn previous_frame(&self) -> (u8, u8) {
        (self.last_humidity, self.last_temperature)
    }

    pub fn bit_index(&self) -> i8 {
        self.bit_index
    }

    pub fn is_idle(&self) -> bool {
        self.bit_index >= IDLE
    }

    /// Feed one edge. Returns an event when a frame completes or times out.
    pub fn handle(&mut self, edge: Edge, tick: u32) -> Option<FrameEvent> {
        match edge {
            Edge::Falling => {
                self.on_falling(tick);
                None
            }
            Edge::Rising => self.on_rising(tick),
            Edge::Either => self.on_watchdog(),
        }
    }

    fn on_falling(&mut self, tick: u32) {
        let diff = tick_diff(self.last_falling_tick, tick);
        self.last_falling_tick = tick;
        if diff <= FRAME_GAP_TICKS {
            return;
        }

        self.bit_index = FRAME_START;
        self.checksum = 0;
        self.last_humidity = self.humidity;
        self.last_temperature = self.temperature;
        self.humidity = 0;
        self.temperature = 0;
    }

    fn on_rising(&mut self, tick: u32) -> Option<FrameEvent> {
        let diff = tick_diff(self.last_falling_tick, tick);
        let bit = u8::from(diff >= ONE_BIT_TICKS);
        if diff >= GARBAGE_PULSE_TICKS {
            self.checksum = CHECKSUM_DISCARD;
        }

        let index = self.bit_index;
        let mut event = None;
        if index >= IDLE {
            // between frames
        } else if index >= 32 {
            self.checksum = if self.checksum >= CHECKSUM_DISCARD {
                CHECKSUM_DISCARD
            } else {
                (self.checksum << 1) | u16::from(bit)
            };
            if index == LAST_BIT {
                event = Some(FrameEvent::Completed(DecodedReading::from_frame(
                    self.humidity,
                    self.temperature,
                    self.checksum,
                )));
            }
        } else if (16..24).contains(&index) {
            self.temperature = (self.temperature << 1) | bit;
        } else if (0..8).contains(&index) {
            self.humidity = (self.humidity << 1) | bit;
        }

        self.bit_index = (index + 1).min(IDLE);
        event
    }

    fn on_watchdog(&mut self) -> Option<FrameEvent> {
        if self.is_idle() {
            return None;
        }
        let bit_index = self.bit_index;
        self.bit_index = IDLE;
        self.humidity = 0;
        self.temperature = 0;
        Some(FrameEvent::TimedOut { bit_index })
    }
}

impl Default for EdgeDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// A frame event tagged with a sequence number.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PublishedFrame {
    pub sequence: u32,
    pub event: FrameEvent,
}

const STATUS_EMPTY: u8 = 0;
const STATUS_COMPLETED: u8 = 1;
const STATUS_TIMED_OUT: u8 = 2;
const SEQUENCE_MASK: u32 = 0x00FF_FFFF;

/// Latest frame event, written from the edge context and read by the poll loop.
///
/// The event and its sequence number share one `AtomicU64`:
///
/// ```text
/// bits  0..8   humidity
/// bits  8..16  temperature
/// bits 16..32  received checksum, or the bit index of a timeout
/// bits 32..40  status
/// bits 40..64  sequence (24 bits, wrapping)
/// ```
///
/// so a reader always sees one whole frame. There is exactly one writer per
/// cell (the pin's edge callback).
#[derive(Debug, Default)]
pub struct FrameCell {
    packed: AtomicU64,
}

impl FrameCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, event: FrameEvent) {
        let previous = (self.packed.load(Ordering::Acquire) >> 40) as u32;
        let sequence = previous.wrapping_add(1) & SEQUENCE_MASK;
        self.packed.store(pack(sequence, event), Ordering::Release);
    }

    /// The most recent event, or `None` if nothing was published yet.
    pub fn load(&self) -> Option<PublishedFrame> {
        let packed = self.packed.load(Ordering::Acquire);
        let humidity = packed as u8;
        let temperature = (packed >> 8) as u8;
        let payload = (packed >> 16) as u16;
        let event = match (packed >> 32) as u8 {
            STATUS_COMPLETED => {
                FrameEvent::Completed(DecodedReading::from_frame(humidity, temperature, payload))
            }
            STATUS_TIMED_OUT => FrameEvent::TimedOut {
                bit_index: payload as u8 as i8,
            },
            _ => return None,
        };
        Some(PublishedFrame {
            sequence: (packed >> 40) as u32,
            event,
        })
    }
}

fn pack(sequence: u32, event: FrameEvent) -> u64 {
    let (status, humidity, temperature, payload) = match event {
        FrameEvent::Completed(reading) => (
            STATUS_COMPLETED,
            reading.humidity,
            reading.temperature,
            reading.received_checksum,
        ),
        FrameEvent::TimedOut { bit_index } => (STATUS_TIMED_OUT, 0, 0, u16::from(bit_index as u8)),
    };
    debug_assert_ne!(status, STATUS_EMPTY);
    u64::from(humidity)
        | u64::from(temperature) << 8
        | u64::from(payload) << 16
        | u64::from(status) << 32
        | u64::from(sequence) << 40
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::simulation::frame_edges;

    fn frame_bytes(humidity: u8, temperature: u8) -> [u8; 5] {
        [humidity, 0, temperature, 0, frame_checksum(humidity, temperature)]
    }

    fn feed(decoder: &mut EdgeDecoder, edges: &[(Edge, u32)]) -> Vec<FrameEvent> {
        edges
            .iter()
            .filter_map(|&(edge, tick)| decoder.handle(edge, tick))
            .collect()
    }

    #[test]
    fn test_valid_frame_decodes() {
        let mut decoder = EdgeDecoder::new();
        let events = feed(&mut decoder, &frame_edges(1_000_000, frame_bytes(55, 23)));

        assert_eq!(events.len(), 1);
        let FrameEvent::Completed(reading) = events[0] else {
            panic!("expected a completed frame, got {:?}", events[0]);
        };
        assert_eq!(reading.humidity, 55);
        assert_eq!(reading.temperature, 23);
        assert!(reading.valid_checksum);
        assert!(decoder.is_idle());
    }

    #[test]
    fn test_every_byte_value_roundtrips() {
        let mut decoder = EdgeDecoder::new();
        let mut start = 1_000_000u32;
        for (humidity, temperature) in [(0u8, 1u8), (255, 255), (128, 1), (170, 85)] {
            let events = feed(&mut decoder, &frame_edges(start, frame_bytes(humidity, temperature)));
            assert_eq!(
                events,
                vec![FrameEvent::Completed(DecodedReading::new(humidity, temperature))]
            );
            start = start.wrapping_add(1_000_000);
        }
    }

    #[test]
    fn test_single_bit_corruption_fails_checksum() {
        for bit in 0..8 {
            for byte in [0usize, 2] {
                let mut bytes = frame_bytes(40, 21);
                bytes[byte] ^= 1 << bit;

                let mut decoder = EdgeDecoder::new();
                let events = feed(&mut decoder, &frame_edges(1_000_000, bytes));
                let FrameEvent::Completed(reading) = events[0] else {
                    panic!("expected a completed frame");
                };
                assert!(!reading.valid_checksum, "byte {byte} bit {bit}");
                assert!(matches!(
                    reading.verified(),
                    Err(DecodeError::Checksum { .. })
                ));
            }
        }
    }

    #[test]
    fn test_decimal_bytes_are_ignored() {
        let mut decoder = EdgeDecoder::new();
        let bytes = [60, 0xAA, 20, 0x55, frame_checksum(60, 20)];
        let events = feed(&mut decoder, &frame_edges(1_000_000, bytes));
        assert_eq!(events, vec![FrameEvent::Completed(DecodedReading::new(60, 20))]);
    }

    #[test]
    fn test_garbage_pulse_poisons_checksum() {
        let mut edges = frame_edges(1_000_000, frame_bytes(50, 25));
        // stretch one humidity bit pulse past the garbage threshold
        let (index, _) = edges
            .iter()
            .enumerate()
            .filter(|(_, (edge, _))| *edge == Edge::Rising)
            .nth(5)
            .unwrap();
        let shift = GARBAGE_PULSE_TICKS;
        for edge in edges.iter_mut().skip(index) {
            edge.1 += shift;
        }

        let mut decoder = EdgeDecoder::new();
        let events = feed(&mut decoder, &edges);
        let FrameEvent::Completed(reading) = events[0] else {
            panic!("expected a completed frame");
        };
        assert!(!reading.valid_checksum);
        assert_eq!(reading.received_checksum(), 256);
    }

    #[test]
    fn test_short_falling_gap_does_not_restart() {
        let mut decoder = EdgeDecoder::new();
        decoder.handle(Edge::Falling, 1_000_000);
        assert_eq!(decoder.bit_index(), -2);
        decoder.handle(Edge::Rising, 1_000_020);
        assert_eq!(decoder.bit_index(), -1);

        decoder.handle(Edge::Falling, 1_000_100);
        assert_eq!(decoder.bit_index(), -1);
    }

    #[test]
    fn test_frame_start_across_tick_wrap() {
        let mut decoder = EdgeDecoder::new();
        let start = u32::MAX - 10_000;
        // previous frame ended well before the counter wrapped
        decoder.handle(Edge::Falling, start.wrapping_sub(500_000));
        let events = feed(&mut decoder, &frame_edges(start, frame_bytes(33, 44)));
        assert_eq!(events, vec![FrameEvent::Completed(DecodedReading::new(33, 44))]);
    }

    #[test]
    fn test_watchdog_mid_frame_times_out() {
        let edges = frame_edges(1_000_000, frame_bytes(50, 25));
        let mut decoder = EdgeDecoder::new();
        assert!(feed(&mut decoder, &edges[..20]).is_empty());
        let bit_index = decoder.bit_index();
        assert!((0..40).contains(&bit_index));

        let event = decoder.handle(Edge::Either, 2_000_000);
        assert_eq!(event, Some(FrameEvent::TimedOut { bit_index }));
        assert!(decoder.is_idle());
        assert_eq!(
            event.unwrap().into_result(),
            Err(DecodeError::Timeout { bit_index })
        );
    }

    #[test]
    fn test_frame_start_keeps_previous_values() {
        let mut decoder = EdgeDecoder::new();
        feed(&mut decoder, &frame_edges(1_000_000, frame_bytes(45, 19)));
        assert_eq!(decoder.previous_frame(), (0, 0));

        let edges = frame_edges(2_000_000, frame_bytes(47, 20));
        feed(&mut decoder, &edges[..2]);
        assert_eq!(decoder.bit_index(), -2);
        assert_eq!(decoder.previous_frame(), (45, 19));

        // cut the second frame short; its partial bytes are not kept
        feed(&mut decoder, &edges[2..30]);
        decoder.handle(Edge::Either, 2_100_000);
        feed(&mut decoder, &frame_edges(3_000_000, frame_bytes(50, 21))[..2]);
        assert_eq!(decoder.previous_frame(), (0, 0));
    }

    #[test]
    fn test_watchdog_while_idle_is_quiet() {
        let mut decoder = EdgeDecoder::new();
        assert_eq!(decoder.handle(Edge::Either, 5), None);
    }

    #[test]
    fn test_frame_cell_publishes_whole_frames() {
        let cell = FrameCell::new();
        assert_eq!(cell.load(), None);

        cell.publish(FrameEvent::Completed(DecodedReading::new(61, 19)));
        let first = cell.load().unwrap();
        assert_eq!(first.event, FrameEvent::Completed(DecodedReading::new(61, 19)));

        cell.publish(FrameEvent::TimedOut { bit_index: -2 });
        let second = cell.load().unwrap();
        assert_eq!(second.event, FrameEvent::TimedOut { bit_index: -2 });
        assert_eq!(second.sequence, first.sequence.wrapping_add(1) & SEQUENCE_MASK);
    }

    #[test]
    fn test_frame_cell_keeps_bad_checksum() {
        let mut decoder = EdgeDecoder::new();
        let mut bytes = frame_bytes(10, 10);
        bytes[4] = 0;
        let events = feed(&mut decoder, &frame_edges(1_000_000, bytes));

        let cell = FrameCell::new();
        cell.publish(events[0]);
        let published = cell.load().unwrap();
        assert_eq!(
            published.event.into_result(),
            Err(DecodeError::Checksum {
                computed: 20,
                received: 0
            })
        );
    }
}
