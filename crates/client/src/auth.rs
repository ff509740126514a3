//! Bearer credential supply.
//!
//! The runtime only needs to know whether a credential exists and what it is.
//! How it was obtained is the caller's business.

use arc_swap::ArcSwapOption;
use std::sync::Arc;

pub trait TokenProvider: Send + Sync {
    fn token(&self) -> Option<String>;

    fn is_authenticated(&self) -> bool {
        self.token().is_some()
    }
}

/// Token held in memory; can be replaced or cleared at runtime.
#[derive(Default)]
pub struct StaticToken {
    token: ArcSwapOption<String>,
}

impl StaticToken {
    pub fn new(token: Option<String>) -> Self {
        let token = token.filter(|t| !t.trim().is_empty()).map(Arc::new);
        Self {
            token: ArcSwapOption::new(token),
        }
    }

    pub fn set(&self, token: Option<String>) {
        self.token
            .store(token.filter(|t| !t.trim().is_empty()).map(Arc::new));
    }
}

impl TokenProvider for StaticToken {
    fn token(&self) -> Option<String> {
        self.token.load_full().map(|t| t.as_ref().clone())
    }
}
