use serde::Deserialize;

/// Root service configuration. Loaded from environment variables with the
/// prefix `LOYALTY__`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_node_id")]
    pub node_id: String,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub loyalty: LoyaltyConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

/// Loyalty program parameters. Tier thresholds are data, not code: the
/// ladder below is validated into a `TierPolicy` at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct LoyaltyConfig {
    #[serde(default = "default_tiers")]
    pub tiers: Vec<TierThreshold>,
    /// Days until newly earned points lapse when the earn request carries
    /// no explicit expiry. 0 = points never expire by default.
    #[serde(default = "default_expiry_days")]
    pub default_expiry_days: u32,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    #[serde(default = "default_history_page_limit")]
    pub history_page_limit: u32,
    #[serde(default = "default_history_max_limit")]
    pub history_max_limit: u32,
}

/// One rung of the tier ladder: the tier name and its inclusive lower
/// bound on lifetime points.
#[derive(Debug, Clone, Deserialize)]
pub struct TierThreshold {
    pub name: String,
    pub min_lifetime_points: i64,
}

// Default functions
fn default_node_id() -> String {
    "node-01".to_string()
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_http_port() -> u16 {
    8080
}
fn default_metrics_port() -> u16 {
    9091
}
fn default_tiers() -> Vec<TierThreshold> {
    [
        ("Bronze", 0),
        ("Silver", 200),
        ("Gold", 500),
        ("Platinum", 1000),
    ]
    .into_iter()
    .map(|(name, min_lifetime_points)| TierThreshold {
        name: name.to_string(),
        min_lifetime_points,
    })
    .collect()
}
fn default_expiry_days() -> u32 {
    365
}
fn default_sweep_interval_secs() -> u64 {
    86_400
}
fn default_history_page_limit() -> u32 {
    20
}
fn default_history_max_limit() -> u32 {
    100
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_http_port(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            port: default_metrics_port(),
        }
    }
}

impl Default for LoyaltyConfig {
    fn default() -> Self {
        Self {
            tiers: default_tiers(),
            default_expiry_days: default_expiry_days(),
            sweep_interval_secs: default_sweep_interval_secs(),
            history_page_limit: default_history_page_limit(),
            history_max_limit: default_history_max_limit(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            api: ApiConfig::default(),
            metrics: MetricsConfig::default(),
            loyalty: LoyaltyConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder().add_source(
            config::Environment::with_prefix("LOYALTY")
                .separator("__")
                .try_parsing(true)
                .list_separator(","),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }
}
