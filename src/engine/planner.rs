//! Order planner.
//!
//! Turns the top of the book and the free balances into a priced, sized
//! buy and sell. Both are always computed; the prediction picks one.

use crate::types::{OrderBook, OrderProposal, PlanError, QuoteSide, Side};

/// Buy and sell prices around the book mid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prices {
    pub buy: f64,
    pub sell: f64,
}

/// Buy and sell quantities, both in base units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sizes {
    pub buy: f64,
    pub sell: f64,
}

/// Both candidate orders for one cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderPlan {
    pub prices: Prices,
    pub sizes: Sizes,
}

impl OrderPlan {
    pub fn proposal(&self, side: Side) -> OrderProposal {
        match side {
            Side::Buy => OrderProposal::limit(Side::Buy, self.prices.buy, self.sizes.buy),
            Side::Sell => OrderProposal::limit(Side::Sell, self.prices.sell, self.sizes.sell),
        }
    }
}

/// `mean * (1 ∓ premium)` around `mean = (bid + ask) / 2`.
pub fn compute_prices(bid: Option<f64>, ask: Option<f64>, premium: f64) -> Result<Prices, PlanError> {
    let bid = bid.ok_or(PlanError::MissingQuote(QuoteSide::Bid))?;
    let ask = ask.ok_or(PlanError::MissingQuote(QuoteSide::Ask))?;
    let mean = (bid + ask) / 2.0;
    Ok(Prices {
        buy: mean * (1.0 - premium),
        sell: mean * (1.0 + premium),
    })
}

/// The buy amount is what `trust * quote_balance` affords at `price_buy`;
/// the sell amount is `trust * base_balance`.
pub fn compute_sizes(
    quote_balance: f64,
    base_balance: f64,
    trust_fraction: f64,
    price_buy: f64,
) -> Result<Sizes, PlanError> {
    if !(price_buy > 0.0) {
        return Err(PlanError::NonPositivePrice(price_buy));
    }
    Ok(Sizes {
        buy: trust_fraction * quote_balance / price_buy,
        sell: trust_fraction * base_balance,
    })
}

/// Prices from the book, then sizes from the balances.
pub fn plan(
    book: &OrderBook,
    quote_balance: f64,
    base_balance: f64,
    premium: f64,
    trust_fraction: f64,
) -> Result<OrderPlan, PlanError> {
    let prices = compute_prices(book.best_bid(), book.best_ask(), premium)?;
    let sizes = compute_sizes(quote_balance, base_balance, trust_fraction, prices.buy)?;
    Ok(OrderPlan { prices, sizes })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BookLevel;

    #[test]
    fn test_prices_around_mean() {
        let p = compute_prices(Some(99.0), Some(101.0), 0.01).unwrap();
        assert!((p.buy - 99.0).abs() < 1e-9);
        assert!((p.sell - 101.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_premium_collapses_to_mean() {
        let p = compute_prices(Some(99.0), Some(101.0), 0.0).unwrap();
        assert_eq!(p.buy, 100.0);
        assert_eq!(p.sell, 100.0);
    }

    #[test]
    fn test_prices_bracket_mean() {
        for &(bid, ask) in &[(1.0, 1.0), (0.5, 0.7), (27_000.0, 27_010.0)] {
            for &premium in &[0.0, 0.001, 0.01, 0.2] {
                let p = compute_prices(Some(bid), Some(ask), premium).unwrap();
                let mean = (bid + ask) / 2.0;
                assert!(p.buy <= mean && mean <= p.sell);
                if premium > 0.0 {
                    assert!(p.buy < mean && mean < p.sell);
                }
            }
        }
    }

    #[test]
    fn test_missing_quotes() {
        assert_eq!(
            compute_prices(None, Some(101.0), 0.01),
            Err(PlanError::MissingQuote(QuoteSide::Bid))
        );
        assert_eq!(
            compute_prices(Some(99.0), None, 0.01),
            Err(PlanError::MissingQuote(QuoteSide::Ask))
        );
    }

    #[test]
    fn test_sizes() {
        let s = compute_sizes(1000.0, 2.0, 0.1, 99.0).unwrap();
        assert!((s.buy - 1.010101).abs() < 1e-6);
        assert!((s.sell - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_sizes_reject_non_positive_price() {
        assert_eq!(
            compute_sizes(1000.0, 2.0, 0.1, 0.0),
            Err(PlanError::NonPositivePrice(0.0))
        );
        assert!(compute_sizes(1000.0, 2.0, 0.1, -1.0).is_err());
    }

    #[test]
    fn test_plan_from_book() {
        let book = OrderBook {
            bids: vec![BookLevel { price: 99.0, amount: 1.0 }],
            asks: vec![BookLevel { price: 101.0, amount: 1.0 }],
        };
        let plan = plan(&book, 1000.0, 0.0, 0.01, 0.1).unwrap();
        let buy = plan.proposal(Side::Buy);
        assert_eq!(buy.side, Side::Buy);
        assert!((buy.price - 99.0).abs() < 1e-9);
        assert!((buy.amount - 1.010101).abs() < 1e-6);
        assert_eq!(plan.proposal(Side::Sell).amount, 0.0);

        let empty = OrderBook::default();
        assert!(matches!(
            super::plan(&empty, 1000.0, 0.0, 0.01, 0.1),
            Err(PlanError::MissingQuote(QuoteSide::Bid))
        ));
    }
}
