// Allow our dollar.cents digit grouping convention (e.g., 100_00 = $100.00)
#![allow(clippy::inconsistent_digit_grouping)]

//! Tests for tastytrade API response parsing. No live connection needed.

#[cfg(feature = "tastytrade")]
mod tastytrade_tests {
    use allocbook::{OrderIntent, Price, Side, Symbol};
    use allocbook_broker::tastytrade::types::{
        BalanceData, Envelope, Items, MarketDataItem, OrderData, PlacedOrder, PositionItem,
        SessionData,
    };
    use allocbook_broker::tastytrade::{map_status, order_request};
    use allocbook_broker::{BrokerOrder, BrokerOrderState, PositionEffect};

    // ========================================================================
    // Sessions
    // ========================================================================

    #[test]
    fn parse_session() {
        let json = r#"{
            "data": {
                "user": { "email": "me@example.com", "username": "me" },
                "session-token": "abc123+C"
            },
            "context": "/sessions"
        }"#;
        let session: Envelope<SessionData> = serde_json::from_str(json).unwrap();
        assert_eq!(session.data.session_token, "abc123+C");
    }

    // ========================================================================
    // Positions
    // ========================================================================

    #[test]
    fn parse_long_position() {
        let json = r#"{
            "data": { "items": [
                {
                    "account-number": "5WT00000",
                    "symbol": "TQQQ",
                    "instrument-type": "Equity",
                    "quantity": "38",
                    "quantity-direction": "Long",
                    "average-open-price": "45.0",
                    "close-price": "50.12",
                    "multiplier": 1
                }
            ] }
        }"#;
        let positions: Envelope<Items<PositionItem>> = serde_json::from_str(json).unwrap();
        let p = &positions.data.items[0];
        assert_eq!(p.symbol, "TQQQ");
        assert_eq!(p.signed_quantity(), 38);
        assert_eq!(p.average_open_price.unwrap().to_cents(), 45_00);
        assert_eq!(p.close_price.unwrap().to_cents(), 50_12);
    }

    #[test]
    fn parse_short_position_numeric_fields() {
        let json = r#"{
            "symbol": "TQQQ",
            "quantity": 10,
            "quantity-direction": "Short",
            "average-open-price": 51.5
        }"#;
        let p: PositionItem = serde_json::from_str(json).unwrap();
        assert_eq!(p.signed_quantity(), -10);
        assert_eq!(p.average_open_price.unwrap().to_cents(), 51_50);
        assert!(p.close_price.is_none());
    }

    #[test]
    fn parse_empty_positions() {
        let json = r#"{ "data": { "items": [] } }"#;
        let positions: Envelope<Items<PositionItem>> = serde_json::from_str(json).unwrap();
        assert!(positions.data.items.is_empty());
    }

    #[test]
    fn bad_decimal_is_an_error() {
        let json = r#"{ "symbol": "TQQQ", "quantity": "lots", "quantity-direction": "Long" }"#;
        assert!(serde_json::from_str::<PositionItem>(json).is_err());
    }

    // ========================================================================
    // Balances and quotes
    // ========================================================================

    #[test]
    fn parse_balances() {
        let json = r#"{
            "data": {
                "account-number": "5WT00000",
                "cash-balance": "8100.5",
                "net-liquidating-value": "10000.25",
                "equity-buying-power": "16201.0"
            }
        }"#;
        let balances: Envelope<BalanceData> = serde_json::from_str(json).unwrap();
        assert_eq!(balances.data.net_liquidating_value.unwrap().to_cents(), 10_000_25);
        assert_eq!(balances.data.cash_balance.unwrap().to_cents(), 8_100_50);
    }

    #[test]
    fn parse_market_data() {
        let json = r#"{
            "data": { "items": [
                { "symbol": "TQQQ", "instrument-type": "Equity",
                  "bid": "49.99", "ask": "50.01", "last": "50.0", "mark": "50.0" }
            ] }
        }"#;
        let data: Envelope<Items<MarketDataItem>> = serde_json::from_str(json).unwrap();
        let item = &data.data.items[0];
        assert_eq!(item.bid.unwrap().to_cents(), 49_99);
        assert_eq!(item.ask.unwrap().to_cents(), 50_01);
        assert_eq!(item.last.unwrap().to_cents(), 50_00);
    }

    #[test]
    fn parse_market_data_without_book() {
        let json = r#"{ "symbol": "TQQQ", "last": 54.72 }"#;
        let item: MarketDataItem = serde_json::from_str(json).unwrap();
        assert!(item.bid.is_none());
        assert!(item.ask.is_none());
        assert_eq!(item.last.unwrap().to_cents(), 54_72);
    }

    // ========================================================================
    // Orders
    // ========================================================================

    #[test]
    fn buy_order_request_body() {
        let order = BrokerOrder {
            symbol: Symbol::new("TQQQ"),
            side: Side::Buy,
            quantity: 2,
            limit_price: Price(50_25),
            effect: PositionEffect::Open,
        };
        let body = serde_json::to_value(order_request(&order)).unwrap();
        assert_eq!(body["time-in-force"], "Day");
        assert_eq!(body["order-type"], "Limit");
        assert_eq!(body["price"], "50.25");
        assert_eq!(body["price-effect"], "Debit");
        assert_eq!(body["legs"][0]["instrument-type"], "Equity");
        assert_eq!(body["legs"][0]["symbol"], "TQQQ");
        assert_eq!(body["legs"][0]["quantity"], 2);
        assert_eq!(body["legs"][0]["action"], "Buy to Open");
    }

    #[test]
    fn sell_order_request_body() {
        let order = BrokerOrder {
            symbol: Symbol::new("TQQQ"),
            side: Side::Sell,
            quantity: 1,
            limit_price: Price(54_73),
            effect: PositionEffect::Close,
        };
        let body = serde_json::to_value(order_request(&order)).unwrap();
        assert_eq!(body["price"], "54.73");
        assert_eq!(body["price-effect"], "Credit");
        assert_eq!(body["legs"][0]["action"], "Sell to Close");
    }

    #[test]
    fn buy_against_short_closes() {
        let intent = OrderIntent::new(Symbol::new("TQQQ"), Side::Buy, 3, Price(50_25)).unwrap();
        let body = serde_json::to_value(order_request(&BrokerOrder::new(&intent, -3))).unwrap();
        assert_eq!(body["price-effect"], "Debit");
        assert_eq!(body["legs"][0]["action"], "Buy to Close");
    }

    #[test]
    fn sell_from_flat_opens() {
        let intent = OrderIntent::new(Symbol::new("TQQQ"), Side::Sell, 1, Price(54_73)).unwrap();
        let body = serde_json::to_value(order_request(&BrokerOrder::new(&intent, 0))).unwrap();
        assert_eq!(body["price-effect"], "Credit");
        assert_eq!(body["legs"][0]["action"], "Sell to Open");
    }

    #[test]
    fn parse_placed_order() {
        let json = r#"{
            "data": {
                "order": {
                    "id": 123456,
                    "status": "Received",
                    "legs": [ { "symbol": "TQQQ", "quantity": "2", "remaining-quantity": "2", "fills": [] } ]
                },
                "warnings": []
            }
        }"#;
        let placed: Envelope<PlacedOrder> = serde_json::from_str(json).unwrap();
        assert_eq!(placed.data.order.id, 123456);
        assert_eq!(placed.data.order.ordered_quantity(), 2);
        assert_eq!(placed.data.order.filled_quantity(), 0);
    }

    #[test]
    fn parse_partially_filled_order() {
        let json = r#"{
            "id": 7,
            "status": "Live",
            "legs": [ {
                "quantity": "10",
                "remaining-quantity": "4",
                "fills": [
                    { "quantity": "4", "fill-price": "50.20" },
                    { "quantity": "2", "fill-price": "50.26" }
                ]
            } ]
        }"#;
        let order: OrderData = serde_json::from_str(json).unwrap();
        assert_eq!(order.filled_quantity(), 6);
        assert_eq!(order.avg_fill_price_cents(), 50_22);
        assert_eq!(
            map_status(&order.status, order.filled_quantity()).unwrap(),
            BrokerOrderState::PartiallyFilled
        );
    }

    #[test]
    fn filled_from_remaining_without_fills() {
        let json = r#"{
            "id": 8, "status": "Filled",
            "legs": [ { "quantity": 3, "remaining-quantity": 0 } ]
        }"#;
        let order: OrderData = serde_json::from_str(json).unwrap();
        assert_eq!(order.filled_quantity(), 3);
        assert_eq!(order.avg_fill_price_cents(), 0);
    }

    // ========================================================================
    // Status mapping
    // ========================================================================

    #[test]
    fn status_mapping() {
        assert_eq!(map_status("Received", 0).unwrap(), BrokerOrderState::Pending);
        assert_eq!(map_status("Routed", 0).unwrap(), BrokerOrderState::Pending);
        assert_eq!(map_status("Live", 0).unwrap(), BrokerOrderState::Working);
        assert_eq!(map_status("Cancel Requested", 1).unwrap(), BrokerOrderState::PartiallyFilled);
        assert_eq!(map_status("Filled", 2).unwrap(), BrokerOrderState::Filled);
        assert_eq!(map_status("Cancelled", 0).unwrap(), BrokerOrderState::Cancelled);
        assert_eq!(map_status("Partially Removed", 1).unwrap(), BrokerOrderState::Cancelled);
        assert_eq!(map_status("Expired", 0).unwrap(), BrokerOrderState::Expired);
        assert_eq!(map_status("Rejected", 0).unwrap(), BrokerOrderState::Rejected);
    }

    #[test]
    fn unknown_status_is_parse_error() {
        assert!(map_status("Teleported", 0).is_err());
    }
}
