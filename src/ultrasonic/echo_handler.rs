use super::{distance, Distance, OverflowTimer, Ranging, Reading};

/// Phase of the ranging state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EchoState {
    /// No cycle active.
    Idle,
    /// Trigger sent, waiting for the sensor to raise the echo line.
    WaitingForRise,
    /// Echo line high, timing in progress.
    WaitingForFall,
}

/// Transition seen on the echo line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Edge {
    Rising,
    Falling,
}

impl Edge {
    /// Edge that led to the level read right after the interrupt fired.
    pub fn from_level(is_high: bool) -> Self {
        if is_high {
            Self::Rising
        } else {
            Self::Falling
        }
    }
}

impl<T: OverflowTimer> Ranging<T> {
    /// Echo line interrupt handler, for both edges.
    ///
    /// Assumes the rise comes before the fall. Any edge that doesn't fit the
    /// current state aborts the cycle with [`Reading::Spurious`], there is no
    /// way to report an error from here.
    pub fn on_edge(&self, edge: Edge) {
        critical_section::with(|cs| {
            let mut cycle = self.cycle.borrow(cs).borrow_mut();
            match (cycle.state, edge) {
                (EchoState::WaitingForRise, Edge::Rising) => {
                    cycle.restart_timer();
                    cycle.state = EchoState::WaitingForFall;
                }
                (EchoState::WaitingForFall, Edge::Falling) => {
                    let count = cycle.final_count(self.config.counter_width);
                    cycle.halt_timer();
                    let ticks = distance::elapsed_ticks(cycle.overflows, count, &self.config);
                    let reading = Reading::Distance(Distance::from_ticks(ticks, &self.config));
                    self.finish(&mut cycle, reading);
                }
                _ => self.finish(&mut cycle, Reading::Spurious),
            }
        });
    }
}
