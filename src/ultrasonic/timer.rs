use super::{EchoState, Ranging, Reading};

/// Free-running hardware counter clocked without prescaler, with an overflow interrupt.
///
/// Implementations only touch the peripheral. Overflow counting and the
/// timeout live in [`Ranging::on_overflow`].
pub trait OverflowTimer {
    /// Sets the counter to zero and lets it run.
    fn restart(&mut self);

    /// Stops counting. No further overflow interrupts until the next restart.
    fn halt(&mut self);

    /// Current counter value, below the configured counter width unless an
    /// overflow is pending.
    fn count(&self) -> u32;

    /// Clears the pending overflow, for peripherals that don't do it in hardware.
    fn acknowledge_overflow(&mut self) {}

    /// The counter wrapped and the overflow interrupt hasn't been serviced yet.
    ///
    /// Only consulted from the edge handler, which masks the overflow interrupt.
    fn overflow_pending(&self) -> bool {
        false
    }
}

impl<T: OverflowTimer> Ranging<T> {
    /// Timer overflow interrupt handler.
    ///
    /// Counts overflows while a cycle is active and ends it with
    /// [`Reading::Timeout`] once the configured threshold is reached, without
    /// waiting for a falling edge that may never come.
    pub fn on_overflow(&self) {
        critical_section::with(|cs| {
            let mut cycle = self.cycle.borrow(cs).borrow_mut();
            if let Some(timer) = cycle.timer.as_mut() {
                timer.acknowledge_overflow();
            }

            if cycle.state == EchoState::Idle {
                return;
            }

            cycle.overflows = cycle.overflows.saturating_add(1);
            if cycle.overflows >= self.config.timeout_overflows {
                self.finish(&mut cycle, Reading::Timeout);
            }
        });
    }
}
