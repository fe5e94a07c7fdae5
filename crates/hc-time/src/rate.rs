const NS_PER_SEC: u128 = 1_000_000_000;

/// Largest supported power-of-two divider.
pub const MAX_TICK_SHIFT: u8 = 31;

/// A tick frequency of `base_hz / 2^shift`.
///
/// Prescaled device clocks are not whole numbers of hertz in general (320 Hz divided by 2^7 is
/// 2.5 Hz), so the rate is kept as a fraction and only turned into nanoseconds when a deadline
/// is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TickRate {
    base_hz: u32,
    shift: u8,
}

impl TickRate {
    /// # Panics
    ///
    /// Panics if `base_hz` is zero.
    pub const fn new(base_hz: u32) -> Self {
        assert!(base_hz != 0, "tick rate base frequency must be non-zero");
        Self { base_hz, shift: 0 }
    }

    /// Returns the base clock of `self` divided by `2^shift`.
    ///
    /// The divider replaces any divider already applied to `self`.
    ///
    /// # Panics
    ///
    /// Panics if `shift` exceeds [`MAX_TICK_SHIFT`].
    pub const fn prescaled(self, shift: u8) -> Self {
        assert!(shift <= MAX_TICK_SHIFT, "tick rate divider out of range");
        Self {
            base_hz: self.base_hz,
            shift,
        }
    }

    pub const fn base_hz(&self) -> u32 {
        self.base_hz
    }

    pub const fn shift(&self) -> u8 {
        self.shift
    }

    /// The rate as an exact `(numerator, denominator)` pair, in hertz.
    pub const fn as_fraction(&self) -> (u64, u64) {
        (self.base_hz as u64, 1u64 << self.shift)
    }

    /// The rate in whole hertz, if it is one.
    pub fn whole_hz(&self) -> Option<u32> {
        let divider = 1u32 << self.shift;
        (self.base_hz % divider == 0).then_some(self.base_hz / divider)
    }

    /// Nanoseconds taken by `ticks` ticks, rounded up.
    pub fn ns_for_ticks(&self, ticks: u64) -> u64 {
        let numer = ((ticks as u128) * NS_PER_SEC) << self.shift;
        let denom = self.base_hz as u128;
        u64::try_from((numer + denom - 1) / denom).unwrap_or(u64::MAX)
    }

    /// Whole ticks that fit in `ns` nanoseconds.
    pub fn ticks_in_ns(&self, ns: u64) -> u64 {
        let numer = (ns as u128) * (self.base_hz as u128);
        let denom = NS_PER_SEC << self.shift;
        u64::try_from(numer / denom).unwrap_or(u64::MAX)
    }

    /// Ticks needed to cover `ns` nanoseconds, rounded up.
    pub fn ticks_in_ns_ceil(&self, ns: u64) -> u64 {
        let numer = (ns as u128) * (self.base_hz as u128);
        let denom = NS_PER_SEC << self.shift;
        u64::try_from((numer + denom - 1) / denom).unwrap_or(u64::MAX)
    }
}
