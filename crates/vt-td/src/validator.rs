//! Pre-trade order validation.
//!
//! [`validate_batch`] is pure: it inspects the requests against the current
//! quotes and returns every problem it finds. An empty result means the batch
//! may be executed. Errors carry a field path such as
//! `orders[0].children[1].price`.

use serde::{Deserialize, Serialize};
use vt_core::{Instruction, OrderRequest, OrderType, PricePoint, Side};

use crate::ledger::EPSILON;

/// One rejected field of a submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: String, message: impl Into<String>) -> Self {
        Self { field, message: message.into() }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// What the validator needs to know about the market.
pub trait QuoteLookup {
    fn is_registered(&self, instrument: &str) -> bool;
    /// Latest aggregated point of `instrument`, if any tick arrived yet.
    fn current(&self, instrument: &str) -> Option<&PricePoint>;
}

/// Validate a whole submission.
pub fn validate_batch(requests: &[OrderRequest], quotes: &impl QuoteLookup) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    for (i, request) in requests.iter().enumerate() {
        validate_leg(request, None, &format!("orders[{i}]"), quotes, &mut errors);
    }
    errors
}

/// Validate one request and, recursively, its children.
pub fn validate(request: &OrderRequest, quotes: &impl QuoteLookup) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    validate_leg(request, None, "order", quotes, &mut errors);
    errors
}

fn validate_leg(
    request: &OrderRequest,
    parent: Option<&OrderRequest>,
    path: &str,
    quotes: &impl QuoteLookup,
    errors: &mut Vec<ValidationError>,
) {
    let field = |name: &str| format!("{path}.{name}");
    let is_container = request.instruction == Instruction::Group;

    // a zero-volume container has no transaction of its own
    let empty_container = is_container && request.volume == 0.0;
    if !request.volume.is_finite() || request.volume < 0.0 || (!empty_container && request.volume <= EPSILON) {
        errors.push(ValidationError::new(field("volume"), "volume must be positive"));
    }

    if let Some(parent) = parent.filter(|_| request.instruction == Instruction::Brace) {
        if parent.volume <= EPSILON {
            errors.push(ValidationError::new(field("instruction"), "bracket leg needs a parent with volume"));
        }
        if request.side != parent.side.opposite() {
            errors.push(ValidationError::new(field("side"), "bracket leg must be opposite to its parent"));
        }
        if request.order_type == OrderType::Market {
            errors.push(ValidationError::new(field("type"), "bracket leg cannot be a market order"));
        }
    }

    if !empty_container {
        validate_prices(request, entry_reference(request, parent), &field, quotes, errors);
    }

    for (i, child) in request.children.iter().enumerate() {
        validate_leg(child, Some(request), &format!("{path}.children[{i}]"), quotes, errors);
    }
}

/// Bracket legs of a resting parent only become live once the parent fills,
/// so they are checked against the parent's own price instead of the quote.
fn entry_reference(request: &OrderRequest, parent: Option<&OrderRequest>) -> Option<f64> {
    let parent = parent?;
    if request.instruction != Instruction::Brace || parent.order_type == OrderType::Market {
        return None;
    }
    parent.price
}

fn validate_prices(
    request: &OrderRequest,
    reference: Option<f64>,
    field: &dyn Fn(&str) -> String,
    quotes: &impl QuoteLookup,
    errors: &mut Vec<ValidationError>,
) {
    if !quotes.is_registered(&request.instrument) {
        errors.push(ValidationError::new(field("instrument"), format!("unknown instrument {}", request.instrument)));
        return;
    }
    let Some(point) = quotes.current(&request.instrument) else {
        errors.push(ValidationError::new(field("instrument"), format!("no quote for {}", request.instrument)));
        return;
    };
    let (Some(ask), Some(bid)) = (point.buy_price(), point.sell_price()) else {
        errors.push(ValidationError::new(field("instrument"), format!("no quote for {}", request.instrument)));
        return;
    };
    let (ask, bid) = reference.map_or((ask, bid), |r| (r, r));

    if request.order_type == OrderType::Market {
        return;
    }
    let Some(price) = request.price.filter(|p| p.is_finite() && *p > 0.0) else {
        errors.push(ValidationError::new(field("price"), "price must be positive"));
        return;
    };

    match (request.order_type, request.side) {
        (OrderType::Stop, Side::Buy) if price < ask => {
            errors.push(ValidationError::new(field("price"), format!("buy stop {price} below ask {ask}")));
        }
        (OrderType::Stop, Side::Sell) if price > bid => {
            errors.push(ValidationError::new(field("price"), format!("sell stop {price} above bid {bid}")));
        }
        (OrderType::Limit, Side::Buy) if price > ask => {
            errors.push(ValidationError::new(field("price"), format!("buy limit {price} above ask {ask}")));
        }
        (OrderType::Limit, Side::Sell) if price < bid => {
            errors.push(ValidationError::new(field("price"), format!("sell limit {price} below bid {bid}")));
        }
        (OrderType::StopLimit, side) => {
            let Some(activation) = request.activation_price.filter(|p| p.is_finite() && *p > 0.0) else {
                errors.push(ValidationError::new(field("activation_price"), "stop-limit needs an activation price"));
                return;
            };
            match side {
                Side::Buy if activation < ask => errors.push(ValidationError::new(
                    field("activation_price"),
                    format!("buy activation {activation} below ask {ask}"),
                )),
                Side::Sell if activation > bid => errors.push(ValidationError::new(
                    field("activation_price"),
                    format!("sell activation {activation} above bid {bid}"),
                )),
                _ => {}
            }
            match side {
                Side::Buy if price < activation => errors.push(ValidationError::new(
                    field("price"),
                    format!("buy stop-limit price {price} below activation {activation}"),
                )),
                Side::Sell if price > activation => errors.push(ValidationError::new(
                    field("price"),
                    format!("sell stop-limit price {price} above activation {activation}"),
                )),
                _ => {}
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ahash::AHashMap;

    struct Quotes(AHashMap<String, Option<PricePoint>>);

    impl QuoteLookup for Quotes {
        fn is_registered(&self, instrument: &str) -> bool {
            self.0.contains_key(instrument)
        }

        fn current(&self, instrument: &str) -> Option<&PricePoint> {
            self.0.get(instrument).and_then(Option::as_ref)
        }
    }

    fn quotes() -> Quotes {
        let mut m = AHashMap::new();
        m.insert("SPY".to_string(), Some(PricePoint::quote("SPY", 15.0, 15.0, 1)));
        m.insert("QQQ".to_string(), None);
        Quotes(m)
    }

    fn fields(errors: &[ValidationError]) -> Vec<&str> {
        errors.iter().map(|e| e.field.as_str()).collect()
    }

    #[test]
    fn accepts_well_formed_orders() {
        let q = quotes();
        let batch = vec![
            OrderRequest::market("SPY", Side::Buy, 1.0)
                .with_brace(OrderRequest::stop("SPY", Side::Sell, 1.0, 10.0))
                .with_brace(OrderRequest::limit("SPY", Side::Sell, 1.0, 20.0)),
            OrderRequest::stop("SPY", Side::Buy, 1.0, 25.0),
            OrderRequest::limit("SPY", Side::Buy, 1.0, 14.0),
            OrderRequest::stop_limit("SPY", Side::Sell, 1.0, 14.0, 13.5),
            OrderRequest::group("SPY", Side::Buy).with_leg(OrderRequest::market("SPY", Side::Sell, 2.0)),
        ];
        assert!(validate_batch(&batch, &q).is_empty());
    }

    #[test]
    fn rejects_limit_through_the_market() {
        let q = quotes();
        let errors = validate(&OrderRequest::limit("SPY", Side::Buy, 1.0, 16.0), &q);
        assert_eq!(fields(&errors), vec!["order.price"]);
        let errors = validate(&OrderRequest::limit("SPY", Side::Sell, 1.0, 14.0), &q);
        assert_eq!(fields(&errors), vec!["order.price"]);
    }

    #[test]
    fn rejects_stops_on_the_wrong_side() {
        let q = quotes();
        assert_eq!(validate(&OrderRequest::stop("SPY", Side::Buy, 1.0, 14.0), &q).len(), 1);
        assert_eq!(validate(&OrderRequest::stop("SPY", Side::Sell, 1.0, 16.0), &q).len(), 1);
    }

    #[test]
    fn stop_limit_rules() {
        let q = quotes();
        let mut missing = OrderRequest::stop_limit("SPY", Side::Buy, 1.0, 16.0, 16.5);
        missing.activation_price = None;
        assert_eq!(fields(&validate(&missing, &q)), vec!["order.activation_price"]);

        let below_ask = OrderRequest::stop_limit("SPY", Side::Buy, 1.0, 14.0, 16.0);
        assert_eq!(fields(&validate(&below_ask, &q)), vec!["order.activation_price"]);

        let price_below_activation = OrderRequest::stop_limit("SPY", Side::Buy, 1.0, 16.0, 15.5);
        assert_eq!(fields(&validate(&price_below_activation, &q)), vec!["order.price"]);

        assert!(validate(&OrderRequest::stop_limit("SPY", Side::Buy, 1.0, 16.0, 16.0), &q).is_empty());
    }

    #[test]
    fn rejects_bad_volume_and_missing_quote() {
        let q = quotes();
        let errors = validate_batch(
            &[
                OrderRequest::market("SPY", Side::Buy, 0.0),
                OrderRequest::market("QQQ", Side::Buy, 1.0),
                OrderRequest::market("IWM", Side::Buy, 1.0),
                OrderRequest::limit("SPY", Side::Buy, 1.0, -1.0),
            ],
            &q,
        );
        assert_eq!(
            fields(&errors),
            vec!["orders[0].volume", "orders[1].instrument", "orders[2].instrument", "orders[3].price"]
        );
        assert!(errors[2].message.contains("unknown"));
    }

    #[test]
    fn brace_must_oppose_parent_and_rest() {
        let q = quotes();
        let request = OrderRequest::market("SPY", Side::Buy, 1.0)
            .with_brace(OrderRequest::limit("SPY", Side::Buy, 1.0, 14.0))
            .with_brace(OrderRequest::market("SPY", Side::Sell, 1.0));
        let errors = validate(&request, &q);
        assert_eq!(fields(&errors), vec!["order.children[0].side", "order.children[1].type"]);
    }

    #[test]
    fn braces_of_resting_parent_use_entry_price() {
        let q = quotes();
        // entry above the market: the stop-loss sits above the current bid
        let request = OrderRequest::stop("SPY", Side::Buy, 1.0, 20.0)
            .with_brace(OrderRequest::stop("SPY", Side::Sell, 1.0, 18.0))
            .with_brace(OrderRequest::limit("SPY", Side::Sell, 1.0, 24.0));
        assert!(validate(&request, &q).is_empty());

        let wrong = OrderRequest::stop("SPY", Side::Buy, 1.0, 20.0)
            .with_brace(OrderRequest::stop("SPY", Side::Sell, 1.0, 21.0));
        assert_eq!(fields(&validate(&wrong, &q)), vec!["order.children[0].price"]);
    }

    #[test]
    fn rejects_volume_too_small_to_execute() {
        let q = quotes();
        let errors = validate(&OrderRequest::market("SPY", Side::Buy, 1e-13), &q);
        assert_eq!(fields(&errors), vec!["order.volume"]);

        let mut group = OrderRequest::group("SPY", Side::Buy).with_leg(OrderRequest::market("SPY", Side::Buy, 1.0));
        group.volume = 1e-13;
        assert_eq!(fields(&validate(&group, &q)), vec!["order.volume"]);
    }

    #[test]
    fn container_may_be_empty_but_not_negative() {
        let q = quotes();
        assert!(validate(&OrderRequest::group("SPY", Side::Buy), &q).is_empty());
        let mut negative = OrderRequest::group("SPY", Side::Buy);
        negative.volume = -1.0;
        assert_eq!(fields(&validate(&negative, &q)), vec!["order.volume"]);
    }
}
