use std::sync::Arc;

use crate::auth::JwtValidator;
use crate::config::Settings;
use crate::fanout::FanoutService;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub jwt_validator: Arc<JwtValidator>,
    pub fanout: Arc<FanoutService>,
}

impl AppState {
    /// Build the state. The fan-out service is created stopped; call
    /// `fanout.start()` once the runtime is up.
    pub fn new(settings: Settings) -> Self {
        let jwt_validator = Arc::new(JwtValidator::new(&settings.jwt));
        let fanout = Arc::new(FanoutService::new(settings.stream.clone()));

        Self {
            settings: Arc::new(settings),
            jwt_validator,
            fanout,
        }
    }
}
