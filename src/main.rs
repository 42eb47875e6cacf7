#![no_std]
#![no_main]
#![feature(impl_trait_in_assoc_type)]

use core::cell::RefCell;

use embassy_executor::Spawner;
use embassy_sync::blocking_mutex::CriticalSectionMutex;
use embassy_time::Timer;
use esp_backtrace as _;
use esp_hal::{
    analog::adc::{Adc, AdcConfig, AdcPin, Attenuation},
    delay::Delay,
    gpio::{Event, GpioPin, Input, Io, Level, Output, Pull},
    macros::handler,
    peripherals::ADC1,
    prelude::*,
    timer::{timg::TimerGroup, AnyTimer, PeriodicTimer},
};
use log::info;
use sonar_level::{
    adc::AnalogInput,
    config::{MonitorConfig, RangingConfig, TankGeometry},
    display::Hd44780,
    monitor::LevelMonitor,
    ultrasonic::{Edge, OverflowTimer, Ranging, Ultrasonic},
};

/// TIMG0 counts microseconds; an overflow is emulated every 256 of them.
const RANGING_CONFIG: RangingConfig = RangingConfig::new(1_000, 256);

static RANGING: Ranging<SonarTimer> = Ranging::new(RANGING_CONFIG);

static ECHO: CriticalSectionMutex<RefCell<Option<Input<'static>>>> =
    CriticalSectionMutex::new(RefCell::new(None));

/// 8-bit style overflow counter on top of a periodic TIMG alarm and the system timer.
struct SonarTimer {
    alarm: PeriodicTimer<'static, AnyTimer>,
    /// System time of the last counter wrap, in microseconds.
    base: u64,
}

impl SonarTimer {
    fn now_us() -> u64 {
        esp_hal::time::now().ticks()
    }
}

impl OverflowTimer for SonarTimer {
    fn restart(&mut self) {
        self.base = Self::now_us();
        let period_us =
            RANGING_CONFIG.counter_width as u64 * RANGING_CONFIG.tick_period_ns as u64 / 1_000;
        // a stale alarm from the previous cycle would shift the new base
        self.alarm.clear_interrupt();
        // called from interrupt context, nowhere to report a failure
        self.alarm.start(period_us.micros()).ok();
    }

    fn halt(&mut self) {
        self.alarm.cancel().ok();
    }

    fn count(&self) -> u32 {
        Self::now_us().saturating_sub(self.base) as u32
    }

    fn acknowledge_overflow(&mut self) {
        self.alarm.clear_interrupt();
        self.base += RANGING_CONFIG.counter_width as u64;
    }

    fn overflow_pending(&self) -> bool {
        Self::now_us().saturating_sub(self.base) >= RANGING_CONFIG.counter_width as u64
    }
}

/// ADC1 with a single enabled pin, exposed as channel 0.
struct Analog {
    adc: Adc<'static, ADC1>,
    pin: AdcPin<GpioPin<36>, ADC1>,
}

#[derive(Debug)]
enum AnalogError {
    UnknownChannel(u8),
    NotReady,
}

impl AnalogInput for Analog {
    type Error = AnalogError;

    fn read_channel(&mut self, channel: u8) -> Result<u16, AnalogError> {
        const MAX_POLLS: u32 = 10_000;

        if channel != 0 {
            return Err(AnalogError::UnknownChannel(channel));
        }
        for _ in 0..MAX_POLLS {
            if let Ok(sample) = self.adc.read_oneshot(&mut self.pin) {
                return Ok(sample);
            }
        }
        Err(AnalogError::NotReady)
    }
}

#[handler]
fn echo_isr() {
    let edge = critical_section::with(|cs| {
        let mut echo = ECHO.borrow(cs).borrow_mut();
        let echo = echo.as_mut()?;
        if !echo.is_interrupt_set() {
            return None;
        }
        echo.clear_interrupt();
        Some(Edge::from_level(echo.is_high()))
    });

    if let Some(edge) = edge {
        RANGING.on_edge(edge);
    }
}

#[handler]
fn overflow_isr() {
    RANGING.on_overflow();
}

#[esp_hal_embassy::main]
async fn main(_spawner: Spawner) -> ! {
    esp_println::logger::init_logger_from_env();

    let peripherals = esp_hal::init(esp_hal::Config::default());

    let timg1 = TimerGroup::new(peripherals.TIMG1);
    esp_hal_embassy::init(timg1.timer0);

    // sonar: echo on any edge with pull-up, trigger idles low
    let mut io = Io::new(peripherals.IO_MUX);
    io.set_interrupt_handler(echo_isr);
    let mut echo = Input::new(peripherals.GPIO18, Pull::Up);
    echo.listen(Event::AnyEdge);
    critical_section::with(|cs| ECHO.borrow(cs).replace(Some(echo)));

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    let mut alarm = PeriodicTimer::new(AnyTimer::from(timg0.timer0));
    alarm.set_interrupt_handler(overflow_isr);
    alarm.enable_interrupt(true);
    RANGING.attach(SonarTimer { alarm, base: 0 });

    let trig = Output::new(peripherals.GPIO5, Level::Low);
    let mut sensor =
        Ultrasonic::new(trig, Delay::new(), &RANGING).expect("trigger pin is infallible");

    // display on a 4-bit bus, RW tied to ground
    let lcd = Hd44780::new(
        Output::new(peripherals.GPIO13, Level::Low),
        Output::new(peripherals.GPIO12, Level::Low),
        (
            Output::new(peripherals.GPIO14, Level::Low),
            Output::new(peripherals.GPIO27, Level::Low),
            Output::new(peripherals.GPIO26, Level::Low),
            Output::new(peripherals.GPIO25, Level::Low),
        ),
        Delay::new(),
    )
    .expect("lcd pins are infallible");

    let mut adc_config = AdcConfig::new();
    let pin = adc_config.enable_pin(peripherals.GPIO36, Attenuation::Attenuation11dB);
    let analog = Analog {
        adc: Adc::new(peripherals.ADC1, adc_config),
        pin,
    };

    let config = MonitorConfig::DEFAULT;
    let mut monitor = LevelMonitor::new(lcd, analog, TankGeometry::DEFAULT, config);
    let mut led = Output::new(peripherals.GPIO2, Level::High);

    info!(
        "ranging: {} ns ticks, timeout after {} overflows",
        RANGING_CONFIG.tick_period_ns, RANGING_CONFIG.timeout_overflows
    );

    loop {
        if !sensor.is_measurement_in_progress() {
            // late echoes of the previous cycle die out
            Timer::after_millis(config.settle_ms.into()).await;
            if monitor.trigger(&mut sensor) {
                led.toggle();
            }
        }

        // the longest cycle ends well within one refresh period
        Timer::after_millis(config.refresh_ms.into()).await;
        monitor.refresh(sensor.last_distance());
    }
}
