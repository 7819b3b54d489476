use chrono::{DateTime, Utc};
use paper_instrument::{Instrument, InstrumentKey};
use paper_integration::{config::CoreConfig, order::OrderSide};
use paper_ledger::{Position, WalletProjection};
use rust_decimal::Decimal;

use crate::error::RiskError;

/// A single instrument's contribution to the post-trade portfolio, already projected forward by
/// the caller (§4.9 "Project post-trade positions from current MTM snapshot").
pub struct ProjectedPosition<'a> {
    pub instrument: &'a Instrument,
    pub signed_quantity: Decimal,
    pub mark_price: Decimal,
}

impl ProjectedPosition<'_> {
    fn notional(&self) -> Decimal {
        self.signed_quantity.abs() * self.mark_price
    }

    fn is_option_buy(&self) -> bool {
        self.signed_quantity > Decimal::ZERO
    }

    fn required_margin(&self) -> Decimal {
        self.notional() * self.instrument.margin_notional_multiplier(self.is_option_buy())
    }
}

/// Portfolio-level inputs to [`check_pretrade`] (§4.9 "Pre-trade risk (portfolio-level)").
/// `projected_positions` must contain one entry per instrument in the post-trade portfolio,
/// including the instrument being traded with its projected (not current) quantity.
pub struct PretradeRequest<'a> {
    pub side: OrderSide,
    pub traded_instrument_key: &'a InstrumentKey,
    pub wallet: &'a WalletProjection,
    pub projected_positions: &'a [ProjectedPosition<'a>],
    pub now: DateTime<Utc>,
}

/// Run the portfolio-level checks of §4.9 against a fully projected post-trade book.
pub fn check_pretrade(req: &PretradeRequest<'_>, config: &CoreConfig) -> Result<(), RiskError> {
    let equity = req.wallet.equity;

    let total_notional: Decimal = req
        .projected_positions
        .iter()
        .map(ProjectedPosition::notional)
        .sum();

    if equity > Decimal::ZERO {
        let effective_leverage = total_notional / equity;
        if effective_leverage > config.max_account_leverage {
            return Err(RiskError::LeverageExceeded);
        }
    }

    let traded = req
        .projected_positions
        .iter()
        .find(|p| &p.instrument.instrument_key == req.traded_instrument_key);

    if let Some(traded) = traded {
        let notional = traded.notional();

        if notional > config.max_position_notional_per_symbol {
            return Err(RiskError::PositionLimitExceeded);
        }

        if traded.instrument.instrument_type.is_derivative()
            && notional > config.max_derivative_notional
        {
            return Err(RiskError::DerivativeExposureTooHigh);
        }

        if equity > Decimal::ZERO {
            let concentration = notional / equity;
            if concentration > config.max_single_instrument_concentration {
                return Err(RiskError::ConcentrationRisk);
            }
        }

        if traded.instrument.instrument_type == paper_instrument::InstrumentType::Option {
            let is_increasing = matches!(req.side, OrderSide::Buy) == (traded.signed_quantity >= Decimal::ZERO);
            if is_increasing {
                if let Some(days) = traded.instrument.days_to_expiry(req.now) {
                    if days < 1 {
                        return Err(RiskError::ExpiryRiskBlock);
                    }
                }
            }
        }
    }

    let required_margin: Decimal = req
        .projected_positions
        .iter()
        .map(ProjectedPosition::required_margin)
        .sum();

    if required_margin > Decimal::ZERO {
        let buffer_ratio = equity / required_margin;
        if buffer_ratio <= config.min_margin_buffer_ratio {
            return Err(RiskError::InsufficientMarginBuffer);
        }
    }

    Ok(())
}

/// Convenience for building [`ProjectedPosition`]s from the user's current open positions plus one
/// hypothetical fill, used by callers that don't already carry a full post-trade snapshot.
pub fn project_positions<'a>(
    instruments: &'a [(&'a Instrument, Decimal)],
    mark_prices: &'a [Decimal],
) -> Vec<ProjectedPosition<'a>> {
    instruments
        .iter()
        .zip(mark_prices.iter())
        .map(|((instrument, signed_quantity), mark_price)| ProjectedPosition {
            instrument,
            signed_quantity: *signed_quantity,
            mark_price: *mark_price,
        })
        .collect()
}

/// Net a position's pre-trade quantity with a hypothetical order to get the post-trade quantity
/// used when constructing a [`ProjectedPosition`] for the instrument being traded.
pub fn project_quantity(existing: Option<&Position>, side: OrderSide, quantity: Decimal) -> Decimal {
    let existing_qty = existing.map(|p| p.signed_quantity).unwrap_or(Decimal::ZERO);
    existing_qty + Decimal::from(side.signum()) * quantity
}

#[cfg(test)]
mod tests {
    use super::*;
    use paper_instrument::{Exchange, InstrumentKey, InstrumentType};
    use rust_decimal_macros::dec;

    fn future() -> Instrument {
        Instrument {
            instrument_key: InstrumentKey::new("NSE_FO|FUT"),
            trading_symbol: "FUT".into(),
            name: "Future".into(),
            underlying: "NIFTY".into(),
            segment: "FO".into(),
            exchange: Exchange::Nse,
            instrument_type: InstrumentType::Future,
            option_type: None,
            strike: None,
            expiry: None,
            tick_size: dec!(0.05),
            lot_size: 50,
            prev_close: Some(dec!(20000)),
        }
    }

    fn option(key: &str) -> Instrument {
        Instrument {
            instrument_key: InstrumentKey::new(key),
            trading_symbol: key.into(),
            name: "Option".into(),
            underlying: "NIFTY".into(),
            segment: "FO".into(),
            exchange: Exchange::Nse,
            instrument_type: InstrumentType::Option,
            option_type: Some(paper_instrument::OptionType::Ce),
            strike: Some(dec!(20000)),
            expiry: Some(Utc::now() + chrono::Duration::days(30)),
            tick_size: dec!(0.05),
            lot_size: 50,
            prev_close: Some(dec!(100)),
        }
    }

    fn wallet(equity: Decimal) -> WalletProjection {
        WalletProjection {
            balance: equity,
            blocked_balance: Decimal::ZERO,
            equity,
            margin_status: paper_ledger::MarginStatus::Normal,
            account_state: paper_ledger::AccountState::Active,
        }
    }

    #[test]
    fn rejects_when_projected_leverage_exceeds_the_cap() {
        let future = future();
        let key = future.instrument_key.clone();
        let positions = vec![ProjectedPosition {
            instrument: &future,
            signed_quantity: dec!(30),
            mark_price: dec!(20000),
        }];
        let wallet = wallet(dec!(100_000));
        let req = PretradeRequest {
            side: OrderSide::Buy,
            traded_instrument_key: &key,
            wallet: &wallet,
            projected_positions: &positions,
            now: Utc::now(),
        };

        assert_eq!(
            check_pretrade(&req, &CoreConfig::default()),
            Err(RiskError::LeverageExceeded)
        );
    }

    #[test]
    fn rejects_when_margin_buffer_is_too_thin() {
        // Three option-buy legs, each comfortably under the 40% single-instrument concentration
        // cap and the 5x leverage cap on their own, but whose combined required margin (full
        // premium notional for an option buy) eats past the equity's 1.2x buffer.
        let traded = option("NSE_FO|OPT1");
        let other_a = option("NSE_FO|OPT2");
        let other_b = option("NSE_FO|OPT3");
        let key = traded.instrument_key.clone();
        let positions = vec![
            ProjectedPosition {
                instrument: &traded,
                signed_quantity: dec!(39),
                mark_price: dec!(100),
            },
            ProjectedPosition {
                instrument: &other_a,
                signed_quantity: dec!(39),
                mark_price: dec!(100),
            },
            ProjectedPosition {
                instrument: &other_b,
                signed_quantity: dec!(39),
                mark_price: dec!(100),
            },
        ];
        let wallet = wallet(dec!(10_000));
        let req = PretradeRequest {
            side: OrderSide::Buy,
            traded_instrument_key: &key,
            wallet: &wallet,
            projected_positions: &positions,
            now: Utc::now(),
        };

        assert_eq!(
            check_pretrade(&req, &CoreConfig::default()),
            Err(RiskError::InsufficientMarginBuffer)
        );
    }

    #[test]
    fn accepts_a_conservatively_sized_position() {
        let future = future();
        let key = future.instrument_key.clone();
        let positions = vec![ProjectedPosition {
            instrument: &future,
            signed_quantity: dec!(1),
            mark_price: dec!(20000),
        }];
        let wallet = wallet(dec!(100_000));
        let req = PretradeRequest {
            side: OrderSide::Buy,
            traded_instrument_key: &key,
            wallet: &wallet,
            projected_positions: &positions,
            now: Utc::now(),
        };

        assert!(check_pretrade(&req, &CoreConfig::default()).is_ok());
    }
}
