/// Blocking single-shot analog input.
pub trait AnalogInput {
    type Error;

    /// Converts `channel` and returns the raw sample.
    fn read_channel(&mut self, channel: u8) -> Result<u16, Self::Error>;
}
