//! Ordered "try this, else the next" policies
//!
//! Each fallback chain is a constant list walked by [`first_available`], so the
//! priority order lives in one place and can be tested on its own.

/// Walk `candidates` in order and return the first one `lookup` accepts
pub fn first_available<C: Copy, T>(
    candidates: &[C],
    mut lookup: impl FnMut(C) -> Option<T>,
) -> Option<(C, T)> {
    candidates
        .iter()
        .find_map(|&candidate| lookup(candidate).map(|value| (candidate, value)))
}

/// Swap amount columns usable as a concentration weight
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmountField {
    Usd,
    In,
    Out,
}

impl AmountField {
    pub fn column(&self) -> &'static str {
        match self {
            AmountField::Usd => "amount_usd",
            AmountField::In => "amount_in",
            AmountField::Out => "amount_out",
        }
    }
}

/// USD amount, then input amount, then output amount. No match means weight 1.0 per swap.
pub const AMOUNT_PRIORITY: [AmountField; 3] = [AmountField::Usd, AmountField::In, AmountField::Out];

/// Where a buy ratio may come from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuyRatioSource {
    /// Per-swap side labels in the ratio window
    SwapSides,
    /// Pre-aggregated buy/sell counts from periodic window metrics
    WindowMetrics,
}

pub const BUY_RATIO_SOURCES: [BuyRatioSource; 2] =
    [BuyRatioSource::SwapSides, BuyRatioSource::WindowMetrics];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_available_respects_order() {
        let hit = first_available(&AMOUNT_PRIORITY, |field| match field {
            AmountField::Usd => None,
            AmountField::In => Some(1),
            AmountField::Out => Some(2),
        });

        assert_eq!(hit, Some((AmountField::In, 1)));
    }

    #[test]
    fn test_first_available_exhausted() {
        let hit: Option<(BuyRatioSource, f64)> = first_available(&BUY_RATIO_SOURCES, |_| None);
        assert!(hit.is_none());
    }

    #[test]
    fn test_lookup_stops_at_first_match() {
        let mut tried = Vec::new();
        let _ = first_available(&BUY_RATIO_SOURCES, |source| {
            tried.push(source);
            Some(0.5)
        });

        assert_eq!(tried, vec![BuyRatioSource::SwapSides]);
    }
}
