use deskpilot_core::RunController;

/// Shared application state accessible from all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub controller: RunController,
    /// Required `X-API-Key` value; `None` disables authentication.
    pub api_key: Option<String>,
}

impl AppState {
    pub fn new(controller: RunController, api_key: Option<String>) -> Self {
        Self {
            controller,
            api_key: deskpilot_schema::normalize_api_key(api_key),
        }
    }
}
