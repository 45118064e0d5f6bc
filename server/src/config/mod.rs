use std::env;
use std::net::SocketAddr;
use std::str::FromStr;

pub mod cors;
pub mod security;

pub use cors::create_cors_layer;
pub use security::create_security_headers_layer;

const DEFAULT_DATABASE_URL: &str = "postgres://localhost/boxoffice";
const DEFAULT_SUCCESS_URL: &str = "http://localhost:3000/orders/paid";
const DEFAULT_CANCEL_URL: &str = "http://localhost:3000/orders/cancelled";
const DEFAULT_CHECKOUT_URL: &str = "http://localhost:3001/checkout";

/// The part of the configuration the booking path consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingSettings {
    /// Currency for general-admission orders that name no ticket kind.
    pub default_currency: String,
    /// Check-in allowance for units whose kind sets none.
    pub default_max_check_ins: i32,
    pub payment_success_url: String,
    pub payment_cancel_url: String,
    /// Most ticket units a single order may create, summed over its kinds.
    pub max_units_per_order: u32,
}

impl Default for BookingSettings {
    fn default() -> Self {
        Self {
            default_currency: "USD".to_string(),
            default_max_check_ins: 1,
            payment_success_url: DEFAULT_SUCCESS_URL.to_string(),
            payment_cancel_url: DEFAULT_CANCEL_URL.to_string(),
            max_units_per_order: 50,
        }
    }
}

pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    pub host: String,
    pub port: u16,
    pub checkout_base_url: String,
    pub booking: BookingSettings,
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = BookingSettings::default();
        Self {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
            database_max_connections: parse_or("DATABASE_MAX_CONNECTIONS", 5),
            host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: parse_or("SERVER_PORT", 3001),
            checkout_base_url: env::var("PAYMENT_CHECKOUT_URL")
                .unwrap_or_else(|_| DEFAULT_CHECKOUT_URL.to_string()),
            booking: BookingSettings {
                default_currency: env::var("DEFAULT_CURRENCY")
                    .map(|c| c.trim().to_uppercase())
                    .unwrap_or(defaults.default_currency),
                default_max_check_ins: parse_or("DEFAULT_MAX_CHECK_INS", defaults.default_max_check_ins)
                    .max(1),
                payment_success_url: env::var("PAYMENT_SUCCESS_URL")
                    .unwrap_or(defaults.payment_success_url),
                payment_cancel_url: env::var("PAYMENT_CANCEL_URL")
                    .unwrap_or(defaults.payment_cancel_url),
                max_units_per_order: parse_or("MAX_UNITS_PER_ORDER", defaults.max_units_per_order)
                    .max(1),
            },
        }
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }
}

fn parse_or<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("Config: ignoring invalid {}='{}'", key, raw);
            default
        }),
        Err(_) => default,
    }
}
