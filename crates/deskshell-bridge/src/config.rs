/// Connection settings for the UI side, read from the environment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BridgeConfig {
    pub backend_addr: String,
    pub dev_console: bool,
    /// Target stamped on records sent by the process-wide logger.
    pub log_target: Option<String>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            backend_addr: deskshell_util::DEFAULT_BACKEND_ADDR.into(),
            dev_console: cfg!(debug_assertions),
            log_target: None,
        }
    }
}

impl BridgeConfig {
    pub fn from_env() -> Self {
        Self {
            backend_addr: deskshell_util::backend_addr(),
            dev_console: deskshell_util::env_flag("DESKSHELL_DEV_CONSOLE")
                .unwrap_or(cfg!(debug_assertions)),
            log_target: None,
        }
    }

    pub fn with_addr(mut self, addr: impl Into<String>) -> Self {
        self.backend_addr = addr.into();
        self
    }

    pub fn with_log_target(mut self, target: impl Into<String>) -> Self {
        self.log_target = Some(target.into());
        self
    }
}
