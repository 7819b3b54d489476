use paper_instrument::Instrument;
use paper_integration::{config::CoreConfig, money::round_to_tick, order::OrderType};
use rust_decimal::Decimal;

use crate::error::RiskError;

/// Tick-alignment epsilon applied when checking a `LIMIT` price against the instrument's
/// `tickSize` (§4.9 item 3).
const TICK_EPSILON: Decimal = Decimal::new(1, 6);

/// Cheap, synchronous inputs to [`check_acceptance`] - everything needed is either on the order
/// itself or already resolved from the Instrument Store and Price Oracle, so this check never
/// touches the Ledger or Position Store (§4.9 "Acceptance (cheap, synchronous)").
pub struct AcceptanceRequest<'a> {
    pub instrument: &'a Instrument,
    pub quantity: Decimal,
    pub order_type: OrderType,
    pub limit_price: Option<Decimal>,
    pub reference_price: Decimal,
    /// Signed quantity of the user's current position in this instrument, if any. `None` when
    /// flat.
    pub existing_position_qty: Option<Decimal>,
    /// Signed quantity this order would add (positive for BUY, negative for SELL).
    pub signed_order_qty: Decimal,
}

/// Run the acceptance checks of §4.9 in order, short-circuiting on the first violation.
pub fn check_acceptance(req: &AcceptanceRequest<'_>, config: &CoreConfig) -> Result<(), RiskError> {
    if req.quantity <= Decimal::ZERO {
        return Err(RiskError::QuantitySanity);
    }

    if let Some(existing_qty) = req.existing_position_qty {
        let is_reducing = existing_qty.signum() != req.signed_order_qty.signum() && !existing_qty.is_zero();
        if is_reducing && req.quantity != existing_qty.abs() {
            return Err(RiskError::PartialExitNotAllowed {
                open: existing_qty.abs().to_string(),
            });
        }
    }

    if matches!(req.order_type, OrderType::Limit) {
        let limit_price = req
            .limit_price
            .filter(|price| *price > Decimal::ZERO)
            .ok_or(RiskError::PriceTickValidation)?;

        let tick_size = req.instrument.tick_size;
        if tick_size > Decimal::ZERO {
            let rounded = round_to_tick(limit_price, tick_size, false);
            if (limit_price - rounded).abs() > TICK_EPSILON {
                return Err(RiskError::PriceTickValidation);
            }
        }
    }

    let effective_price = req.limit_price.unwrap_or(req.reference_price);
    if req.reference_price > Decimal::ZERO {
        let deviation = (effective_price - req.reference_price).abs() / req.reference_price;
        if deviation > Decimal::new(5, 1) {
            return Err(RiskError::FatFingerPrice);
        }
    }

    if let Some(max_notional) = config.max_notional_per_order {
        let notional = req.quantity * effective_price;
        if notional > max_notional {
            return Err(RiskError::MaxNotionalPerOrder);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use paper_instrument::{Exchange, InstrumentKey, InstrumentType};
    use rust_decimal_macros::dec;

    fn instrument(tick_size: Decimal) -> Instrument {
        Instrument {
            instrument_key: InstrumentKey::new("NSE_EQ|X"),
            trading_symbol: "X".into(),
            name: "X Ltd".into(),
            underlying: "X".into(),
            segment: "EQ".into(),
            exchange: Exchange::Nse,
            instrument_type: InstrumentType::Equity,
            option_type: None,
            strike: None,
            expiry: None,
            tick_size,
            lot_size: 1,
            prev_close: Some(dec!(100)),
        }
    }

    #[test]
    fn rejects_zero_quantity() {
        let instrument = instrument(dec!(0.05));
        let req = AcceptanceRequest {
            instrument: &instrument,
            quantity: Decimal::ZERO,
            order_type: OrderType::Market,
            limit_price: None,
            reference_price: dec!(100),
            existing_position_qty: None,
            signed_order_qty: Decimal::ZERO,
        };
        assert_eq!(
            check_acceptance(&req, &CoreConfig::default()),
            Err(RiskError::QuantitySanity)
        );
    }

    #[test]
    fn rejects_limit_price_off_the_tick_grid() {
        let instrument = instrument(dec!(0.05));
        let req = AcceptanceRequest {
            instrument: &instrument,
            quantity: dec!(10),
            order_type: OrderType::Limit,
            limit_price: Some(dec!(100.07)),
            reference_price: dec!(100),
            existing_position_qty: None,
            signed_order_qty: dec!(10),
        };
        assert_eq!(
            check_acceptance(&req, &CoreConfig::default()),
            Err(RiskError::PriceTickValidation)
        );
    }

    #[test]
    fn rejects_fat_finger_limit_price() {
        let instrument = instrument(dec!(0.05));
        let req = AcceptanceRequest {
            instrument: &instrument,
            quantity: dec!(10),
            order_type: OrderType::Limit,
            limit_price: Some(dec!(160)),
            reference_price: dec!(100),
            existing_position_qty: None,
            signed_order_qty: dec!(10),
        };
        assert_eq!(
            check_acceptance(&req, &CoreConfig::default()),
            Err(RiskError::FatFingerPrice)
        );
    }

    #[test]
    fn rejects_partial_exit_of_an_existing_position() {
        let instrument = instrument(dec!(0.05));
        let req = AcceptanceRequest {
            instrument: &instrument,
            quantity: dec!(5),
            order_type: OrderType::Market,
            limit_price: None,
            reference_price: dec!(100),
            existing_position_qty: Some(dec!(10)),
            signed_order_qty: dec!(-5),
        };
        assert_eq!(
            check_acceptance(&req, &CoreConfig::default()),
            Err(RiskError::PartialExitNotAllowed { open: "10".into() })
        );
    }

    #[test]
    fn accepts_a_full_exit_of_an_existing_position() {
        let instrument = instrument(dec!(0.05));
        let req = AcceptanceRequest {
            instrument: &instrument,
            quantity: dec!(10),
            order_type: OrderType::Market,
            limit_price: None,
            reference_price: dec!(100),
            existing_position_qty: Some(dec!(10)),
            signed_order_qty: dec!(-10),
        };
        assert!(check_acceptance(&req, &CoreConfig::default()).is_ok());
    }

    #[test]
    fn accepts_well_formed_limit_order_on_tick_grid() {
        let instrument = instrument(dec!(0.05));
        let req = AcceptanceRequest {
            instrument: &instrument,
            quantity: dec!(10),
            order_type: OrderType::Limit,
            limit_price: Some(dec!(100.10)),
            reference_price: dec!(100),
            existing_position_qty: None,
            signed_order_qty: dec!(10),
        };
        assert!(check_acceptance(&req, &CoreConfig::default()).is_ok());
    }
}
