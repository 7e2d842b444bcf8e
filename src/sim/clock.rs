/// A simulation clock counting ticks over a fixed run length.
///
/// The `Clock` provides methods to advance tick-by-tick or run a function
/// at each tick until completion.
///
/// # Examples
///
/// ```
/// use station_sim::sim::clock::Clock;
///
/// let mut clock = Clock::new(3);
/// let mut ticks = Vec::new();
///
/// let done: Result<(), ()> = clock.run(|tick| {
///     ticks.push(tick);
///     Ok(())
/// });
/// assert!(done.is_ok());
/// assert_eq!(ticks, vec![0, 1, 2]);
/// ```
pub struct Clock {
    /// Next tick to hand out
    current: u64,
    /// Total ticks in the run
    total: u64,
}

impl Clock {
    /// Creates a new clock with a specified number of ticks.
    ///
    /// # Arguments
    ///
    /// * `total` - The number of ticks the clock will hand out
    pub fn new(total: u64) -> Self {
        Self { current: 0, total }
    }

    /// Advances the clock by one tick.
    ///
    /// # Returns
    ///
    /// * `Some(tick)` - The tick number (starting from 0) before advancing
    /// * `None` - If the clock has handed out every tick
    pub fn tick(&mut self) -> Option<u64> {
        if self.current < self.total {
            let tick = self.current;
            self.current += 1;
            Some(tick)
        } else {
            None
        }
    }

    /// Runs a fallible function for each remaining tick, stopping at the
    /// first error.
    ///
    /// # Arguments
    ///
    /// * `f` - Called with the current tick number
    ///
    /// # Errors
    ///
    /// Returns the first error produced by `f`.
    pub fn run<E>(&mut self, mut f: impl FnMut(u64) -> Result<(), E>) -> Result<(), E> {
        while let Some(tick) = self.tick() {
            f(tick)?;
        }
        Ok(())
    }

    /// Ticks not yet handed out.
    pub fn remaining(&self) -> u64 {
        self.total - self.current
    }
}
