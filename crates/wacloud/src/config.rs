//! Cloud API account configuration.

/// Credentials and tuning for one Cloud API sender number.
#[derive(Debug, Clone)]
pub struct WaCloudConfig {
    /// Graph API bearer token.
    pub access_token: String,
    /// Sender phone number id assigned by the provider.
    pub phone_number_id: String,
    /// Token echoed during webhook subscription verification.
    pub verify_token: String,
    /// App secret for payload signature verification; `None` disables the check.
    pub app_secret: Option<String>,
    /// Graph API base URL.
    pub api_base: String,
    /// Per-send request timeout in seconds.
    pub send_timeout_secs: u64,
}

impl Default for WaCloudConfig {
    fn default() -> Self {
        Self {
            access_token: String::new(),
            phone_number_id: String::new(),
            verify_token: String::new(),
            app_secret: None,
            api_base: "https://graph.facebook.com/v21.0".into(),
            send_timeout_secs: 60,
        }
    }
}
