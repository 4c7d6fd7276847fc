//! Bounded Greeks history.

use std::collections::{HashMap, VecDeque};

use serde::Serialize;
use thetawatch_core::{GreeksSnapshot, PortfolioSnapshot};

/// Result of a history query.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "scope", content = "snapshots", rename_all = "snake_case")]
pub enum HistoryView {
    Symbol(Vec<GreeksSnapshot>),
    Portfolio(Vec<PortfolioSnapshot>),
}

impl HistoryView {
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Symbol(v) => v.len(),
            Self::Portfolio(v) => v.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Per-symbol and portfolio snapshot history, oldest first.
#[derive(Debug)]
pub struct GreeksHistory {
    limit: usize,
    symbols: HashMap<String, VecDeque<GreeksSnapshot>>,
    portfolio: VecDeque<PortfolioSnapshot>,
}

impl GreeksHistory {
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
            symbols: HashMap::new(),
            portfolio: VecDeque::new(),
        }
    }

    pub fn push_symbol(&mut self, snapshot: GreeksSnapshot) {
        let entries = self.symbols.entry(snapshot.symbol.clone()).or_default();
        entries.push_back(snapshot);
        while entries.len() > self.limit {
            entries.pop_front();
        }
    }

    pub fn push_portfolio(&mut self, snapshot: PortfolioSnapshot) {
        self.portfolio.push_back(snapshot);
        while self.portfolio.len() > self.limit {
            self.portfolio.pop_front();
        }
    }

    pub fn remove_symbol(&mut self, symbol: &str) {
        self.symbols.remove(symbol);
    }

    /// Most recent `limit` entries for a symbol, or for the portfolio when
    /// `symbol` is `None`.
    #[must_use]
    pub fn view(&self, symbol: Option<&str>, limit: usize) -> HistoryView {
        match symbol {
            Some(symbol) => HistoryView::Symbol(
                self.symbols
                    .get(symbol)
                    .map(|entries| tail(entries, limit))
                    .unwrap_or_default(),
            ),
            None => HistoryView::Portfolio(tail(&self.portfolio, limit)),
        }
    }
}

fn tail<T: Clone>(entries: &VecDeque<T>, limit: usize) -> Vec<T> {
    let skip = entries.len().saturating_sub(limit);
    entries.iter().skip(skip).cloned().collect()
}
