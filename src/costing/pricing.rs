//! Suggested selling prices

use serde::Serialize;

use super::numbers::{non_negative, round2};

/// Surcharge applied on top of the restaurant price for delivery
pub const DELIVERY_FEE: f64 = 0.12;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SuggestedPrices {
    pub restaurant_price: f64,
    pub delivery_price: f64,
}

/// Markup factor of a restaurant; zero or unset means no markup
pub fn effective_markup(factor: Option<f64>) -> f64 {
    match factor.map(non_negative) {
        Some(f) if f > 0.0 => f,
        _ => 1.0,
    }
}

/// Dining-room and delivery prices for a cost, rounded to cents
pub fn suggested_prices(cost: f64, markup_factor: Option<f64>) -> SuggestedPrices {
    let base = non_negative(cost) * effective_markup(markup_factor);
    SuggestedPrices {
        restaurant_price: round2(base),
        delivery_price: round2(base * (1.0 + DELIVERY_FEE)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_markup_and_delivery() {
        let prices = suggested_prices(10.0, Some(1.5));
        assert_eq!(prices.restaurant_price, 15.0);
        assert_eq!(prices.delivery_price, 16.8);
    }

    #[test]
    fn test_missing_markup_is_unity() {
        assert_eq!(suggested_prices(4.0, None).restaurant_price, 4.0);
        assert_eq!(suggested_prices(4.0, Some(0.0)).restaurant_price, 4.0);
        assert_eq!(suggested_prices(4.0, Some(0.0)).delivery_price, 4.48);
    }

    #[test]
    fn test_zero_cost() {
        let prices = suggested_prices(0.0, Some(3.0));
        assert_eq!(prices.restaurant_price, 0.0);
        assert_eq!(prices.delivery_price, 0.0);
    }
}
