use std::collections::HashMap;

use serde::Serialize;
use tracing::{info, warn};

use common::{CloseReason, Error, ExitPolicy, OpenPosition, OrderSide, Result, TradePlan};

/// Per-instrument position state.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum PositionState {
    #[default]
    Flat,
    Open {
        position: OpenPosition,
        /// Plan that opened the position; `None` for positions adopted from the broker.
        plan: Option<TradePlan>,
    },
}

/// Outcome of checking an open position against its exit policy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum ExitDecision {
    Hold,
    Close { reason: CloseReason, profit: f64 },
}

/// A position that just went OPEN -> FLAT.
#[derive(Debug, Clone, PartialEq)]
pub struct ClosedPosition {
    pub position: OpenPosition,
    pub plan: Option<TradePlan>,
    pub reason: CloseReason,
    /// Whether the exit policy asks for an equivalent re-entry.
    pub reopen: bool,
}

/// Owns the FLAT/OPEN state machine for every instrument.
///
/// At most one position per instrument. The execution loop holds the only
/// instance, so no locking is involved.
#[derive(Debug, Clone, Default)]
pub struct PositionManager {
    states: HashMap<String, PositionState>,
    default_policy: ExitPolicy,
    policies: HashMap<String, ExitPolicy>,
}

impl PositionManager {
    pub fn new(default_policy: ExitPolicy) -> Self {
        Self {
            states: HashMap::new(),
            default_policy,
            policies: HashMap::new(),
        }
    }

    /// Overrides the exit policy for one instrument.
    pub fn set_policy(&mut self, instrument: &str, policy: ExitPolicy) {
        self.policies.insert(instrument.to_string(), policy);
    }

    pub fn policy(&self, instrument: &str) -> &ExitPolicy {
        self.policies.get(instrument).unwrap_or(&self.default_policy)
    }

    pub fn state(&self, instrument: &str) -> &PositionState {
        static FLAT: PositionState = PositionState::Flat;
        self.states.get(instrument).unwrap_or(&FLAT)
    }

    pub fn is_open(&self, instrument: &str) -> bool {
        matches!(self.state(instrument), PositionState::Open { .. })
    }

    pub fn position(&self, instrument: &str) -> Option<&OpenPosition> {
        match self.state(instrument) {
            PositionState::Open { position, .. } => Some(position),
            PositionState::Flat => None,
        }
    }

    /// Instruments currently OPEN.
    pub fn open_instruments(&self) -> Vec<String> {
        let mut open: Vec<String> = self
            .states
            .iter()
            .filter(|(_, s)| matches!(s, PositionState::Open { .. }))
            .map(|(k, _)| k.clone())
            .collect();
        open.sort();
        open
    }

    pub fn ensure_flat(&self, instrument: &str) -> Result<()> {
        if self.is_open(instrument) {
            return Err(Error::PositionExists {
                instrument: instrument.to_string(),
            });
        }
        Ok(())
    }

    /// FLAT -> OPEN.
    pub fn open(&mut self, position: OpenPosition, plan: TradePlan) -> Result<()> {
        self.ensure_flat(&position.instrument)?;
        info!(
            pair = %position.instrument,
            side = %position.side,
            entry = position.entry_price,
            volume = position.volume,
            ticket = %position.ticket_id,
            "Position opened"
        );
        self.states.insert(
            position.instrument.clone(),
            PositionState::Open {
                position,
                plan: Some(plan),
            },
        );
        Ok(())
    }

    /// Unrealised profit of `position` at `mark`, in quote currency.
    pub fn profit(position: &OpenPosition, mark: f64) -> f64 {
        match position.side {
            OrderSide::Buy => (mark - position.entry_price) * position.volume,
            OrderSide::Sell => (position.entry_price - mark) * position.volume,
        }
    }

    /// Checks the open position on `instrument` against its exit policy.
    pub fn evaluate(&self, instrument: &str, mark: f64) -> Result<ExitDecision> {
        let position = self.position(instrument).ok_or_else(|| Error::NoOpenPosition {
            instrument: instrument.to_string(),
        })?;
        let policy = self.policy(instrument);
        let profit = Self::profit(position, mark);

        let decision = if profit >= policy.profit_threshold {
            ExitDecision::Close {
                reason: CloseReason::Profit,
                profit,
            }
        } else if profit <= -policy.loss_threshold {
            ExitDecision::Close {
                reason: CloseReason::StopLoss,
                profit,
            }
        } else {
            ExitDecision::Hold
        };
        Ok(decision)
    }

    /// OPEN -> FLAT.
    pub fn close(&mut self, instrument: &str, reason: CloseReason) -> Result<ClosedPosition> {
        let state = self.states.remove(instrument).unwrap_or_default();
        let PositionState::Open { position, plan } = state else {
            return Err(Error::NoOpenPosition {
                instrument: instrument.to_string(),
            });
        };
        let policy = self.policy(instrument);
        let reopen = plan.is_some()
            && match reason {
                CloseReason::Profit => policy.reopen_on_profit_close,
                CloseReason::StopLoss => policy.reopen_on_loss_close,
                CloseReason::External => false,
            };
        info!(pair = %instrument, reason = %reason, reopen, "Position closed");
        Ok(ClosedPosition {
            position,
            plan,
            reason,
            reopen,
        })
    }

    /// Reconciles local state with the broker's open positions.
    ///
    /// Local positions the broker no longer reports are closed with
    /// [`CloseReason::External`]; broker positions unknown locally are adopted.
    pub fn sync(&mut self, broker_positions: &[OpenPosition]) -> Vec<ClosedPosition> {
        let mut closed = Vec::new();
        for instrument in self.open_instruments() {
            let still_open = self.position(&instrument).is_some_and(|local| {
                broker_positions
                    .iter()
                    .any(|b| b.ticket_id == local.ticket_id)
            });
            if !still_open {
                if let Ok(c) = self.close(&instrument, CloseReason::External) {
                    closed.push(c);
                }
            }
        }

        for remote in broker_positions {
            if self.is_open(&remote.instrument) {
                continue;
            }
            warn!(
                pair = %remote.instrument,
                ticket = %remote.ticket_id,
                "Adopting broker position unknown locally"
            );
            self.states.insert(
                remote.instrument.clone(),
                PositionState::Open {
                    position: remote.clone(),
                    plan: None,
                },
            );
        }
        closed
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn plan(instrument: &str, side: OrderSide, entry: f64) -> TradePlan {
        let (sl, tp) = match side {
            OrderSide::Buy => (entry - 5.0, entry + 5.0),
            OrderSide::Sell => (entry + 5.0, entry - 5.0),
        };
        TradePlan {
            instrument: instrument.into(),
            side,
            entry_price: entry,
            stop_loss: sl,
            take_profit: tp,
            volume: 1.0,
        }
    }

    fn open(manager: &mut PositionManager, instrument: &str, side: OrderSide, entry: f64) {
        let plan = plan(instrument, side, entry);
        let position = OpenPosition::from_plan(&plan, format!("T-{instrument}"));
        manager.open(position, plan).unwrap();
    }

    #[test]
    fn profit_threshold_closes_with_profit() {
        let mut manager = PositionManager::new(ExitPolicy::default());
        open(&mut manager, "EURUSD", OrderSide::Buy, 100.0);
        let decision = manager.evaluate("EURUSD", 112.0).unwrap();
        assert_eq!(
            decision,
            ExitDecision::Close {
                reason: CloseReason::Profit,
                profit: 12.0
            }
        );
    }

    #[test]
    fn loss_threshold_closes_as_stop_loss() {
        let mut manager = PositionManager::new(ExitPolicy::default());
        open(&mut manager, "EURUSD", OrderSide::Sell, 100.0);
        assert_eq!(manager.evaluate("EURUSD", 120.0).unwrap(), ExitDecision::Hold);
        let decision = manager.evaluate("EURUSD", 130.0).unwrap();
        assert!(matches!(
            decision,
            ExitDecision::Close {
                reason: CloseReason::StopLoss,
                ..
            }
        ));
    }

    #[test]
    fn second_open_is_rejected() {
        let mut manager = PositionManager::new(ExitPolicy::default());
        open(&mut manager, "EURUSD", OrderSide::Buy, 100.0);
        let p = plan("EURUSD", OrderSide::Buy, 101.0);
        let err = manager
            .open(OpenPosition::from_plan(&p, "T2".into()), p)
            .unwrap_err();
        assert!(matches!(err, Error::PositionExists { .. }));
        assert!(manager.ensure_flat("EURUSD").is_err());
        assert!(manager.ensure_flat("GBPUSD").is_ok());
    }

    #[test]
    fn close_returns_to_flat_and_reports_reopen() {
        let mut manager = PositionManager::new(ExitPolicy::default());
        manager.set_policy(
            "EURUSD",
            ExitPolicy {
                reopen_on_profit_close: true,
                reopen_delay: Duration::from_millis(10),
                ..ExitPolicy::default()
            },
        );
        open(&mut manager, "EURUSD", OrderSide::Buy, 100.0);
        let closed = manager.close("EURUSD", CloseReason::Profit).unwrap();
        assert!(closed.reopen);
        assert_eq!(closed.plan.unwrap().entry_price, 100.0);
        assert!(!manager.is_open("EURUSD"));

        open(&mut manager, "EURUSD", OrderSide::Buy, 100.0);
        let closed = manager.close("EURUSD", CloseReason::StopLoss).unwrap();
        assert!(!closed.reopen);
    }

    #[test]
    fn closing_flat_instrument_fails() {
        let mut manager = PositionManager::new(ExitPolicy::default());
        let err = manager.close("EURUSD", CloseReason::Profit).unwrap_err();
        assert!(matches!(err, Error::NoOpenPosition { .. }));
        assert!(manager.evaluate("EURUSD", 1.0).is_err());
    }

    #[test]
    fn sync_closes_missing_and_adopts_unknown() {
        let mut manager = PositionManager::new(ExitPolicy {
            reopen_on_loss_close: true,
            ..ExitPolicy::default()
        });
        open(&mut manager, "EURUSD", OrderSide::Buy, 100.0);
        open(&mut manager, "GBPUSD", OrderSide::Sell, 1.25);

        let remote = OpenPosition {
            instrument: "USDJPY".into(),
            side: OrderSide::Buy,
            entry_price: 150.0,
            volume: 0.1,
            ticket_id: "X1".into(),
        };
        let gbp = manager.position("GBPUSD").unwrap().clone();
        let closed = manager.sync(&[gbp, remote]);

        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].position.instrument, "EURUSD");
        assert_eq!(closed[0].reason, CloseReason::External);
        assert!(!closed[0].reopen);
        assert!(manager.is_open("GBPUSD"));
        assert!(manager.is_open("USDJPY"));
        assert_eq!(manager.open_instruments(), vec!["GBPUSD", "USDJPY"]);
    }
}
