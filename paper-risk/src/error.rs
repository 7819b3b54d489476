use thiserror::Error;

/// Acceptance and pre-trade risk rejection reasons, one per code named in the order-rejection
/// taxonomy. `code()` returns the stable wire code a caller matches on; `Display` renders a
/// human-readable message.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum RiskError {
    #[error("quantity must be greater than zero")]
    QuantitySanity,

    #[error("partial exit not allowed: must close the full {open} lot position")]
    PartialExitNotAllowed { open: String },

    #[error("limit price must be positive and aligned to the instrument tick size")]
    PriceTickValidation,

    #[error("limit price deviates more than 50% from the reference price")]
    FatFingerPrice,

    #[error("order notional exceeds the per-order maximum")]
    MaxNotionalPerOrder,

    #[error("post-trade account leverage would exceed the configured maximum")]
    LeverageExceeded,

    #[error("post-trade position notional would exceed the per-symbol limit")]
    PositionLimitExceeded,

    #[error("post-trade derivative notional would exceed the configured maximum")]
    DerivativeExposureTooHigh,

    #[error("post-trade instrument concentration would exceed the configured maximum")]
    ConcentrationRisk,

    #[error("projected margin buffer would fall below the configured minimum ratio")]
    InsufficientMarginBuffer,

    #[error("option exposure cannot be increased within one day of expiry")]
    ExpiryRiskBlock,
}

impl RiskError {
    pub fn code(&self) -> &'static str {
        match self {
            RiskError::QuantitySanity => "QUANTITY_SANITY",
            RiskError::PartialExitNotAllowed { .. } => "PARTIAL_EXIT_NOT_ALLOWED",
            RiskError::PriceTickValidation => "PRICE_TICK_VALIDATION",
            RiskError::FatFingerPrice => "FAT_FINGER_PRICE",
            RiskError::MaxNotionalPerOrder => "MAX_NOTIONAL_PER_ORDER",
            RiskError::LeverageExceeded => "LEVERAGE_EXCEEDED",
            RiskError::PositionLimitExceeded => "POSITION_LIMIT_EXCEEDED",
            RiskError::DerivativeExposureTooHigh => "DERIVATIVE_EXPOSURE_TOO_HIGH",
            RiskError::ConcentrationRisk => "CONCENTRATION_RISK",
            RiskError::InsufficientMarginBuffer => "INSUFFICIENT_MARGIN_BUFFER",
            RiskError::ExpiryRiskBlock => "EXPIRY_RISK_BLOCK",
        }
    }
}
