use std::sync::Arc;

use super::config::Config;
use crate::mail::relay::{Dialer, SmtpDialer};

/// Shared, read-only request context.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub dialer: Arc<dyn Dialer>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self::with_dialer(config, Arc::new(SmtpDialer))
    }

    pub fn with_dialer(config: Config, dialer: Arc<dyn Dialer>) -> Self {
        Self {
            config: Arc::new(config),
            dialer,
        }
    }
}
