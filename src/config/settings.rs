use std::time::Duration;

use serde::Deserialize;

/// Top-level configuration settings for the application.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Settings {
    pub server: ServerSettings,
    pub broker: BrokerSettings,
    pub publishers: PublisherSettings,
    pub shutdown: ShutdownSettings,
    pub logging: LoggingSettings,
}

/// Where the server listens and which path accepts the WebSocket upgrade.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub path: String,
}

impl ServerSettings {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Per-connection delivery limits.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct BrokerSettings {
    /// Frames queued per connection before sends start waiting.
    pub outbound_buffer: usize,
    pub send_timeout_ms: u64,
    /// Bound on the close handshake of a single connection.
    pub close_timeout_ms: u64,
}

impl BrokerSettings {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.close_timeout_ms)
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct PublisherSettings {
    pub time_interval_secs: u64,
    pub cpu_interval_secs: u64,
}

impl PublisherSettings {
    pub fn time_interval(&self) -> Duration {
        Duration::from_secs(self.time_interval_secs.max(1))
    }

    pub fn cpu_interval(&self) -> Duration {
        Duration::from_secs(self.cpu_interval_secs.max(1))
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ShutdownSettings {
    pub timeout_secs: u64,
}

impl ShutdownSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct LoggingSettings {
    pub level: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Every value is optional; missing ones are filled from `Settings::default()`.
#[derive(Debug, Default, Deserialize)]
pub struct PartialSettings {
    pub server: Option<PartialServerSettings>,
    pub broker: Option<PartialBrokerSettings>,
    pub publishers: Option<PartialPublisherSettings>,
    pub shutdown: Option<PartialShutdownSettings>,
    pub logging: Option<PartialLoggingSettings>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PartialServerSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub path: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PartialBrokerSettings {
    pub outbound_buffer: Option<usize>,
    pub send_timeout_ms: Option<u64>,
    pub close_timeout_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PartialPublisherSettings {
    pub time_interval_secs: Option<u64>,
    pub cpu_interval_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PartialShutdownSettings {
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PartialLoggingSettings {
    pub level: Option<String>,
}

impl PartialSettings {
    /// Fill every missing value from `default`.
    pub fn merge(self, default: Settings) -> Settings {
        let server = self.server.unwrap_or_default();
        let broker = self.broker.unwrap_or_default();
        let publishers = self.publishers.unwrap_or_default();
        let shutdown = self.shutdown.unwrap_or_default();
        let logging = self.logging.unwrap_or_default();

        Settings {
            server: ServerSettings {
                host: server.host.unwrap_or(default.server.host),
                port: server.port.unwrap_or(default.server.port),
                path: server.path.unwrap_or(default.server.path),
            },
            broker: BrokerSettings {
                outbound_buffer: broker
                    .outbound_buffer
                    .unwrap_or(default.broker.outbound_buffer),
                send_timeout_ms: broker
                    .send_timeout_ms
                    .unwrap_or(default.broker.send_timeout_ms),
                close_timeout_ms: broker
                    .close_timeout_ms
                    .unwrap_or(default.broker.close_timeout_ms),
            },
            publishers: PublisherSettings {
                time_interval_secs: publishers
                    .time_interval_secs
                    .unwrap_or(default.publishers.time_interval_secs),
                cpu_interval_secs: publishers
                    .cpu_interval_secs
                    .unwrap_or(default.publishers.cpu_interval_secs),
            },
            shutdown: ShutdownSettings {
                timeout_secs: shutdown
                    .timeout_secs
                    .unwrap_or(default.shutdown.timeout_secs),
            },
            logging: LoggingSettings {
                level: logging.level.unwrap_or(default.logging.level),
            },
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                host: "127.0.0.1".to_string(),
                port: 5000,
                path: "/".to_string(),
            },
            broker: BrokerSettings {
                outbound_buffer: 64,
                send_timeout_ms: 1000,
                close_timeout_ms: 3000,
            },
            publishers: PublisherSettings {
                time_interval_secs: 10,
                cpu_interval_secs: 5,
            },
            shutdown: ShutdownSettings { timeout_secs: 10 },
            logging: LoggingSettings {
                level: "info".to_string(),
            },
        }
    }
}
