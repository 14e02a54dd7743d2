use proptest::prelude::*;

use common::{CloseReason, Error, ExitPolicy, InstrumentMeta, OpenPosition, OrderSide, Tick, TradePlan};
use risk::{ExitDecision, PositionManager, TradePlanner};
use strategy::profile::{LevelRule, LevelSource, ProfileMapping, SideRules, StrategyProfile};
use strategy::{fibonacci_levels, FibDirection};

fn side_strategy() -> impl Strategy<Value = OrderSide> {
    prop_oneof![Just(OrderSide::Buy), Just(OrderSide::Sell)]
}

proptest! {
    /// Any plan the planner accepts is bracketed and respects the minimum stop distance.
    #[test]
    fn accepted_plans_are_bracketed(
        low in 1.0f64..1000.0,
        span in 0.001f64..200.0,
        entry_pos in -0.5f64..1.5,
        spread in 0.0f64..0.5,
        min_stop in 0.0f64..5.0,
        side in side_strategy(),
        profile_idx in 0usize..4,
    ) {
        let high = low + span;
        let bid = (low + span * entry_pos).max(0.01);
        let tick = Tick { bid, ask: bid + spread };
        let meta = InstrumentMeta {
            min_stop_distance: min_stop,
            price_step: 0.001,
            lot_step: 0.01,
            min_lot_size: 0.01,
        };
        let profile = [
            StrategyProfile::BosBreakout,
            StrategyProfile::FibSniper,
            StrategyProfile::EmaCross,
            StrategyProfile::Custom(ProfileMapping {
                source: LevelSource::SeriesRange,
                buy: SideRules { stop_loss: LevelRule::level(0.5), take_profit: LevelRule::level(1.618) },
                sell: SideRules { stop_loss: LevelRule::level(0.5), take_profit: LevelRule::level(1.618) },
            }),
        ][profile_idx];
        let planner = TradePlanner::new(profile);
        let anchor = match side {
            OrderSide::Buy => FibDirection::Up,
            OrderSide::Sell => FibDirection::Down,
        };
        let levels = fibonacci_levels(high, low, anchor);
        let positions = PositionManager::default();

        match planner.plan(&positions, "X", side, &levels, &meta, tick, 1.0) {
            Ok(plan) => {
                prop_assert!(plan.is_well_ordered(), "{:?}", plan);
                prop_assert!(plan.stop_distance() >= min_stop - 1e-5, "{:?}", plan);
                prop_assert!(plan.target_distance() >= min_stop - 1e-5, "{:?}", plan);
                prop_assert_eq!(plan.entry_price, tick.entry_price(side));
            }
            Err(Error::InsufficientDistance { .. }) => {}
            Err(other) => prop_assert!(false, "unexpected error: {}", other),
        }
    }

    /// Random open/close sequences never allow two positions on one instrument.
    #[test]
    fn one_position_per_instrument(ops in prop::collection::vec((0usize..3, any::<bool>()), 1..60)) {
        let instruments = ["EURUSD", "GBPUSD", "USDJPY"];
        let mut manager = PositionManager::new(ExitPolicy::default());
        for (n, (idx, opening)) in ops.into_iter().enumerate() {
            let instrument = instruments[idx];
            let was_open = manager.is_open(instrument);
            if opening {
                let plan = TradePlan {
                    instrument: instrument.into(),
                    side: OrderSide::Buy,
                    entry_price: 100.0,
                    stop_loss: 99.0,
                    take_profit: 101.0,
                    volume: 1.0,
                };
                let result = manager.open(OpenPosition::from_plan(&plan, format!("T{n}")), plan);
                prop_assert_eq!(result.is_err(), was_open);
            } else {
                let result = manager.close(instrument, CloseReason::Profit);
                prop_assert_eq!(result.is_ok(), was_open);
            }
            prop_assert!(manager.open_instruments().len() <= instruments.len());
        }
    }

    /// Exit decisions follow the thresholds for both sides.
    #[test]
    fn exit_decision_matches_thresholds(
        entry in 1.0f64..1000.0,
        mark in 1.0f64..1000.0,
        volume in 0.01f64..10.0,
        side in side_strategy(),
    ) {
        let mut manager = PositionManager::new(ExitPolicy::default());
        let position = OpenPosition {
            instrument: "X".into(),
            side,
            entry_price: entry,
            volume,
            ticket_id: "T".into(),
        };
        let plan = TradePlan {
            instrument: "X".into(),
            side,
            entry_price: entry,
            stop_loss: entry,
            take_profit: entry,
            volume,
        };
        manager.open(position.clone(), plan).unwrap();
        let profit = PositionManager::profit(&position, mark);
        match manager.evaluate("X", mark).unwrap() {
            ExitDecision::Hold => prop_assert!(profit < 10.0 && profit > -30.0),
            ExitDecision::Close { reason: CloseReason::Profit, .. } => prop_assert!(profit >= 10.0),
            ExitDecision::Close { reason: CloseReason::StopLoss, .. } => prop_assert!(profit <= -30.0),
            ExitDecision::Close { reason: CloseReason::External, .. } => prop_assert!(false),
        }
    }
}
