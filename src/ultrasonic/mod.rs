//! Interrupt driven ranging with an SRF04 / HC-SR04 ultrasonic sensor.
//!
//! [`Ultrasonic`] sends the trigger pulse from the main loop. The echo line
//! edge interrupt and the timer overflow interrupt feed [`Ranging::on_edge`]
//! and [`Ranging::on_overflow`], which time the echo pulse and publish a
//! [`Reading`] when the cycle ends. The main loop polls
//! [`Ultrasonic::is_measurement_in_progress`] and only trusts
//! [`Ultrasonic::last_distance`] once it returns false.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::CriticalSectionMutex;
use embedded_hal::{delay::DelayNs, digital::OutputPin};
use portable_atomic::{
    AtomicBool,
    Ordering::{Acquire, Relaxed, Release},
};

use crate::config::RangingConfig;

pub use distance::Distance;
pub use echo_handler::{EchoState, Edge};
pub use timer::OverflowTimer;

mod distance;
mod echo_handler;
mod timer;

/// Legacy encoding of [`Reading::Timeout`] in [`Reading::raw_mm`].
pub const TIMEOUT_SENTINEL_MM: u32 = 999;

/// Outcome of the last ranging cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Reading {
    /// No cycle has finished since start-up.
    #[default]
    Pending,
    /// Echo received and timed.
    Distance(Distance),
    /// No falling edge arrived before the overflow threshold.
    Timeout,
    /// The cycle was aborted by an out of sequence edge.
    Spurious,
}

impl Reading {
    pub fn distance(&self) -> Option<Distance> {
        match self {
            Self::Distance(distance) => Some(*distance),
            _ => None,
        }
    }

    /// Whole millimetres, [`TIMEOUT_SENTINEL_MM`] on timeout and 0 when nothing was measured.
    pub fn raw_mm(&self) -> u32 {
        match self {
            Self::Distance(distance) => distance.mm(),
            Self::Timeout => TIMEOUT_SENTINEL_MM,
            Self::Pending | Self::Spurious => 0,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RangingError<E> {
    /// A cycle is still running.
    Busy,
    /// No timer was handed to [`Ranging::attach`].
    NotAttached,
    /// Driving the trigger line failed.
    Trigger(E),
}

/// State of one ranging cycle, only touched inside a critical section.
struct Cycle<T> {
    state: EchoState,
    overflows: u32,
    reading: Reading,
    timer: Option<T>,
}

impl<T: OverflowTimer> Cycle<T> {
    fn restart_timer(&mut self) {
        self.overflows = 0;
        if let Some(timer) = self.timer.as_mut() {
            timer.restart();
        }
    }

    fn halt_timer(&mut self) {
        if let Some(timer) = self.timer.as_mut() {
            timer.halt();
        }
    }

    /// Counter value at the end of the echo, folding in a wrap the overflow
    /// handler hasn't seen yet.
    fn final_count(&mut self, counter_width: u32) -> u32 {
        let Some(timer) = self.timer.as_mut() else {
            return 0;
        };
        let count = timer.count();
        // a high count was read before the wrap, it belongs to the old period
        if timer.overflow_pending() && count < counter_width / 2 {
            timer.acknowledge_overflow();
            self.overflows = self.overflows.saturating_add(1);
        }
        count
    }
}

/// Ranging state shared between the main loop and the two interrupt handlers.
///
/// Meant to live in a `static`. `running` is the publication flag: it is
/// cleared with `Release` only after the reading is stored, so a main loop
/// that observes it false sees the final reading.
pub struct Ranging<T> {
    running: AtomicBool,
    cycle: CriticalSectionMutex<RefCell<Cycle<T>>>,
    config: RangingConfig,
}

impl<T: OverflowTimer> Ranging<T> {
    pub const fn new(config: RangingConfig) -> Self {
        Self {
            running: AtomicBool::new(false),
            cycle: CriticalSectionMutex::new(RefCell::new(Cycle {
                state: EchoState::Idle,
                overflows: 0,
                reading: Reading::Pending,
                timer: None,
            })),
            config,
        }
    }

    /// Hands the hardware timer over and resets the shared state.
    ///
    /// The timer stays halted until the first trigger.
    pub fn attach(&self, mut timer: T) {
        timer.halt();
        critical_section::with(|cs| {
            let mut cycle = self.cycle.borrow(cs).borrow_mut();
            cycle.state = EchoState::Idle;
            cycle.overflows = 0;
            cycle.reading = Reading::Pending;
            cycle.timer = Some(timer);
            self.running.store(false, Release);
        });
    }

    pub fn config(&self) -> &RangingConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Acquire)
    }

    pub fn is_attached(&self) -> bool {
        critical_section::with(|cs| self.cycle.borrow(cs).borrow().timer.is_some())
    }

    pub fn state(&self) -> EchoState {
        critical_section::with(|cs| self.cycle.borrow(cs).borrow().state)
    }

    /// Last published reading. Only meaningful while [`Self::is_running`] is false.
    pub fn reading(&self) -> Reading {
        critical_section::with(|cs| self.cycle.borrow(cs).borrow().reading)
    }

    /// Starts timing a cycle whose trigger pulse was just sent.
    fn arm<E>(&self) -> Result<(), RangingError<E>> {
        critical_section::with(|cs| {
            let mut cycle = self.cycle.borrow(cs).borrow_mut();
            if self.running.load(Relaxed) {
                return Err(RangingError::Busy);
            }
            if cycle.timer.is_none() {
                return Err(RangingError::NotAttached);
            }
            // counts overflows while waiting for the rising edge too
            cycle.restart_timer();
            cycle.state = EchoState::WaitingForRise;
            self.running.store(true, Release);
            Ok(())
        })
    }

    /// Ends the cycle: stops the timer, publishes `reading` and clears `running`.
    fn finish(&self, cycle: &mut Cycle<T>, reading: Reading) {
        cycle.halt_timer();
        cycle.state = EchoState::Idle;
        cycle.reading = reading;
        self.running.store(false, Release);
    }
}

/// Ranging controller owning the trigger line.
pub struct Ultrasonic<'r, Trig, Delay, T> {
    trig: Trig,
    delay: Delay,
    ranging: &'r Ranging<T>,
}

impl<'r, Trig, Delay, T> Ultrasonic<'r, Trig, Delay, T>
where
    Trig: OutputPin,
    Delay: DelayNs,
    T: OverflowTimer,
{
    /// Takes the trigger line and drives it low.
    pub fn new(mut trig: Trig, delay: Delay, ranging: &'r Ranging<T>) -> Result<Self, Trig::Error> {
        trig.set_low()?;
        Ok(Self {
            trig,
            delay,
            ranging,
        })
    }

    /// Sends a trigger pulse and arms the echo state machine.
    ///
    /// Returns right after the pulse, the cycle finishes in interrupt
    /// context. Busy-waits for the settle and pulse times (12 us by default).
    /// Fails with [`RangingError::Busy`] while the previous cycle runs.
    pub fn start_measurement(&mut self) -> Result<(), RangingError<Trig::Error>> {
        if self.ranging.is_running() {
            return Err(RangingError::Busy);
        }
        if !self.ranging.is_attached() {
            return Err(RangingError::NotAttached);
        }

        let config = self.ranging.config;
        self.trig.set_low().map_err(RangingError::Trigger)?;
        self.delay.delay_us(config.settle_us);
        self.trig.set_high().map_err(RangingError::Trigger)?;
        self.delay.delay_us(config.pulse_us);
        self.trig.set_low().map_err(RangingError::Trigger)?;

        self.ranging.arm()
    }

    pub fn is_measurement_in_progress(&self) -> bool {
        self.ranging.is_running()
    }

    /// Most recent reading. Only valid while no measurement is in progress.
    pub fn last_distance(&self) -> Reading {
        self.ranging.reading()
    }

    pub fn ranging(&self) -> &'r Ranging<T> {
        self.ranging
    }

    pub fn release(self) -> (Trig, Delay) {
        (self.trig, self.delay)
    }
}


#[cfg(test)]
mod tests {
    use super::mock::{MockDelay, MockPin, MockTimer, PinEvent, TimerProbe, Trace};
    use super::*;

    fn ultrasonic<'a, 'p>(
        ranging: &'a Ranging<MockTimer<'p>>,
        trace: &'a Trace,
    ) -> Ultrasonic<'a, MockPin<'a>, MockDelay<'a>, MockTimer<'p>> {
        Ultrasonic::new(MockPin(trace), MockDelay(trace), ranging).unwrap()
    }

    #[test]
    fn trigger_pulse_shape() {
        let probe = TimerProbe::default();
        let trace = Trace::default();
        let ranging = Ranging::new(RangingConfig::ATTINY84_10MHZ);
        ranging.attach(MockTimer(&probe));
        let mut sensor = ultrasonic(&ranging, &trace);
        trace.events.borrow_mut().clear();

        sensor.start_measurement().unwrap();

        assert_eq!(
            *trace.events.borrow(),
            [
                PinEvent::Low,
                PinEvent::DelayUs(2),
                PinEvent::High,
                PinEvent::DelayUs(10),
                PinEvent::Low,
            ]
        );
        assert!(sensor.is_measurement_in_progress());
        assert_eq!(ranging.state(), EchoState::WaitingForRise);
        assert!(probe.running.get());
        assert_eq!(probe.restarts.get(), 1);
    }

    #[test]
    fn new_drives_trigger_low() {
        let trace = Trace::default();
        let ranging: Ranging<MockTimer> = Ranging::new(RangingConfig::ATTINY84_10MHZ);
        let sensor = ultrasonic(&ranging, &trace);
        assert_eq!(*trace.events.borrow(), [PinEvent::Low]);
        assert!(!sensor.is_measurement_in_progress());
        assert_eq!(sensor.last_distance(), Reading::Pending);
    }

    #[test]
    fn busy_while_running() {
        let probe = TimerProbe::default();
        let trace = Trace::default();
        let ranging = Ranging::new(RangingConfig::ATTINY84_10MHZ);
        ranging.attach(MockTimer(&probe));
        let mut sensor = ultrasonic(&ranging, &trace);

        sensor.start_measurement().unwrap();
        ranging.on_edge(Edge::Rising);
        let pulses = trace.events.borrow().len();

        assert_eq!(sensor.start_measurement(), Err(RangingError::Busy));
        // no second pulse, running cycle untouched
        assert_eq!(trace.events.borrow().len(), pulses);
        assert_eq!(ranging.state(), EchoState::WaitingForFall);
        assert!(sensor.is_measurement_in_progress());
    }

    #[test]
    fn not_attached() {
        let trace = Trace::default();
        let ranging: Ranging<MockTimer> = Ranging::new(RangingConfig::ATTINY84_10MHZ);
        let mut sensor = ultrasonic(&ranging, &trace);
        assert_eq!(sensor.start_measurement(), Err(RangingError::NotAttached));
        assert!(!sensor.is_measurement_in_progress());
    }

    #[test]
    fn repeated_cycles() {
        let probe = TimerProbe::default();
        let trace = Trace::default();
        let ranging = Ranging::new(RangingConfig::ATTINY84_10MHZ);
        ranging.attach(MockTimer(&probe));
        let mut sensor = ultrasonic(&ranging, &trace);

        for ticks in [100u32, 1000, 300, 255] {
            assert!(!sensor.is_measurement_in_progress());
            sensor.start_measurement().unwrap();
            assert!(sensor.is_measurement_in_progress());

            ranging.on_edge(Edge::Rising);
            for _ in 0..ticks / 256 {
                ranging.on_overflow();
            }
            probe.count.set(ticks % 256);
            ranging.on_edge(Edge::Falling);

            assert!(!sensor.is_measurement_in_progress());
            let expected = Distance::from_ticks(ticks, ranging.config());
            assert_eq!(sensor.last_distance(), Reading::Distance(expected));
        }
    }

    #[test]
    fn clean_cycle_after_aborted_ones() {
        let probe = TimerProbe::default();
        let trace = Trace::default();
        let ranging = Ranging::new(RangingConfig::ATTINY84_10MHZ);
        ranging.attach(MockTimer(&probe));
        let mut sensor = ultrasonic(&ranging, &trace);

        // nothing in range
        sensor.start_measurement().unwrap();
        ranging.on_edge(Edge::Rising);
        for _ in 0..240 {
            ranging.on_overflow();
        }
        assert!(!sensor.is_measurement_in_progress());
        assert_eq!(sensor.last_distance(), Reading::Timeout);

        // echo line glitch
        sensor.start_measurement().unwrap();
        ranging.on_edge(Edge::Falling);
        assert!(!sensor.is_measurement_in_progress());
        assert_eq!(sensor.last_distance(), Reading::Spurious);

        // no overflow left over from the timed out cycle
        sensor.start_measurement().unwrap();
        ranging.on_edge(Edge::Rising);
        for _ in 0..3 {
            ranging.on_overflow();
        }
        probe.count.set(232);
        ranging.on_edge(Edge::Falling);
        assert!(!sensor.is_measurement_in_progress());
        assert_eq!(
            sensor.last_distance(),
            Reading::Distance(Distance::from_um(17_150))
        );
    }

    #[test]
    fn reading_helpers() {
        let distance = Distance::from_mm(420);
        assert_eq!(Reading::Distance(distance).distance(), Some(distance));
        assert_eq!(Reading::Distance(distance).raw_mm(), 420);
        assert_eq!(Reading::Timeout.distance(), None);
        assert_eq!(Reading::Timeout.raw_mm(), TIMEOUT_SENTINEL_MM);
        assert_eq!(Reading::Spurious.raw_mm(), 0);
        assert_eq!(Reading::default(), Reading::Pending);
    }
}
