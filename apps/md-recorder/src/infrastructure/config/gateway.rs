//! Gateway Settings File
//!
//! The JSON connection file handed to the gateway. Keys may be given in
//! English or with the Chinese names used by existing vnpy setups
//! (`用户名`, `行情服务器`, ...).

use std::fmt;
use std::path::Path;

use serde::Deserialize;

use super::settings::ConfigError;
use crate::application::ports::SessionCredentials;
use crate::application::services::connector::ConnectSettings;

/// Gateway connection settings.
#[derive(Clone, Deserialize)]
pub struct GatewaySettings {
    /// Investor / user id.
    #[serde(alias = "用户名")]
    pub user_id: String,
    /// Password.
    #[serde(alias = "密码")]
    pub password: String,
    /// Broker id.
    #[serde(alias = "经纪商代码")]
    pub broker_id: String,
    /// Trading front template.
    #[serde(alias = "交易服务器")]
    pub trading_server: String,
    /// Market data front template.
    #[serde(alias = "行情服务器")]
    pub market_data_server: String,
    /// Product / app id for terminal authentication.
    #[serde(alias = "产品名称", default)]
    pub app_id: String,
    /// Auth code for terminal authentication.
    #[serde(alias = "授权编码", default)]
    pub auth_code: String,
}

impl GatewaySettings {
    /// Read and parse a settings file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ReadSettings`] or [`ConfigError::ParseSettings`].
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadSettings {
            path: path.to_path_buf(),
            source,
        })?;

        serde_json::from_str(&contents).map_err(|source| ConfigError::ParseSettings {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Login credentials.
    #[must_use]
    pub fn session_credentials(&self) -> SessionCredentials {
        SessionCredentials {
            user_id: self.user_id.clone(),
            password: self.password.clone(),
            broker_id: self.broker_id.clone(),
        }
    }

    /// Everything the connector needs to connect.
    #[must_use]
    pub fn connect_settings(&self) -> ConnectSettings {
        ConnectSettings {
            trading_server: self.trading_server.clone(),
            market_data_server: self.market_data_server.clone(),
            credentials: self.session_credentials(),
        }
    }
}

impl fmt::Debug for GatewaySettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewaySettings")
            .field("user_id", &self.user_id)
            .field("password", &"[REDACTED]")
            .field("broker_id", &self.broker_id)
            .field("trading_server", &self.trading_server)
            .field("market_data_server", &self.market_data_server)
            .field("app_id", &self.app_id)
            .field("auth_code", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const VNPY_SETTINGS: &str = r#"{
        "用户名": "000001",
        "密码": "hunter2",
        "经纪商代码": "9999",
        "交易服务器": "180.168.146.187:{10201,10202}",
        "行情服务器": "180.168.146.187:{10211/10212}",
        "产品名称": "simnow_client_test",
        "授权编码": "0000000000000000",
        "柜台环境": "实盘"
    }"#;

    fn write(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn loads_vnpy_keys() {
        let file = write(VNPY_SETTINGS);
        let settings = GatewaySettings::load(file.path()).unwrap();

        assert_eq!(settings.user_id, "000001");
        assert_eq!(settings.broker_id, "9999");
        assert_eq!(settings.market_data_server, "180.168.146.187:{10211/10212}");
        assert_eq!(settings.app_id, "simnow_client_test");

        let connect = settings.connect_settings();
        assert_eq!(connect.trading_server, "180.168.146.187:{10201,10202}");
        assert_eq!(connect.credentials.password, "hunter2");
    }

    #[test]
    fn loads_english_keys_without_auth() {
        let file = write(
            r#"{"user_id":"u","password":"p","broker_id":"b",
                "trading_server":"tcp://1.2.3.4:1","market_data_server":"1.2.3.4:2"}"#,
        );
        let settings = GatewaySettings::load(file.path()).unwrap();
        assert_eq!(settings.market_data_server, "1.2.3.4:2");
        assert!(settings.auth_code.is_empty());
    }

    #[test]
    fn debug_redacts_secrets() {
        let file = write(VNPY_SETTINGS);
        let settings = GatewaySettings::load(file.path()).unwrap();
        let debug = format!("{settings:?}");
        assert!(!debug.contains("hunter2"));
        assert!(!debug.contains("0000000000000000"));
        assert!(debug.contains("[REDACTED]"));

        let debug = format!("{:?}", settings.session_credentials());
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn missing_file_and_bad_json() {
        let err = GatewaySettings::load(Path::new("/nonexistent/connect_ctp.json")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadSettings { .. }));

        let file = write(r#"{"用户名": "000001"}"#);
        let err = GatewaySettings::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseSettings { .. }));
    }
}
