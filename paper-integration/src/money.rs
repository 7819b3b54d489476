use rust_decimal::{Decimal, RoundingStrategy};

/// The fixed-point scale (decimal places) every monetary amount is rounded to before it is
/// persisted or compared. §4.7 requires "fixed-point decimal strings with a configured scale; no
/// floating-point" — [`rust_decimal::Decimal`] already stores values as scaled integers, so this
/// module only adds the *configured* rounding discipline on top of it.
pub const MONEY_SCALE: u32 = 2;

/// Round `amount` to [`MONEY_SCALE`] places, banker's rounding (round-half-to-even), matching how
/// exchanges settle fractional paise/cents.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointNearestEven)
}

/// Round a price to the nearest multiple of `tick_size`, rounding in the direction given by
/// `round_up`. Used by the Fill Engine (§4.10) for slippage and limit-price tick discipline.
pub fn round_to_tick(price: Decimal, tick_size: Decimal, round_up: bool) -> Decimal {
    if tick_size.is_zero() {
        return price;
    }

    let ticks = price / tick_size;
    let rounded_ticks = if round_up {
        ticks.ceil()
    } else {
        ticks.floor()
    };

    rounded_ticks * tick_size
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn rounds_up_to_tick() {
        assert_eq!(round_to_tick(dec!(100.07), dec!(0.05), true), dec!(100.10));
    }

    #[test]
    fn rounds_down_to_tick() {
        assert_eq!(round_to_tick(dec!(100.07), dec!(0.05), false), dec!(100.05));
    }

    #[test]
    fn exact_tick_is_unchanged() {
        assert_eq!(round_to_tick(dec!(100.05), dec!(0.05), true), dec!(100.05));
        assert_eq!(round_to_tick(dec!(100.05), dec!(0.05), false), dec!(100.05));
    }

    #[test]
    fn money_rounds_to_two_places() {
        assert_eq!(round_money(dec!(1000.505)), dec!(1000.50));
        assert_eq!(round_money(dec!(1000.515)), dec!(1000.52));
    }
}
