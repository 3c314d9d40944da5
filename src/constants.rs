/// Application constants

pub const API_VERSION: &str = "v1";

// Indexer
pub const DEFAULT_NAMESPACE: &str = "budokan_1_0_7";
pub const TORII_SQL_PATH: &str = "sql";
pub const DEFAULT_SQL_REQUEST_TIMEOUT_SECS: u64 = 15;
pub const ENTITY_SYNC_BATCH_LIMIT: u32 = 1000;
pub const DEFAULT_ENTITY_SYNC_INTERVAL_SECS: u64 = 5;
pub const ENTITY_SYNC_BACKOFF_MAX_SECS: u64 = 120;

// Prices (Ekubo)
pub const DEFAULT_EKUBO_API_URL: &str = "https://mainnet-api.ekubo.org";
pub const TOKEN_USDC: &str = "0x053c91253bc9682c04929ca02ed00b3e423f6710d2ee7e0d5ebb06f3ecf368a8";
pub const EKUBO_PRICE_PERIOD_SECS: u64 = 3600;
pub const DEFAULT_PRICE_FETCH_TIMEOUT_MS: u64 = 10_000;

// Optimistic updates
pub const DEFAULT_CONFIRMATION_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_OPTIMISTIC_TTL_SECS: u64 = 120;
pub const OPTIMISTIC_SWEEP_INTERVAL_SECS: u64 = 10;

// Pagination
pub const DEFAULT_PAGE_LIMIT: u32 = 12;
pub const DEFAULT_PAGE_LIMIT_MAX: u32 = 100;

// WebSocket
pub const WS_HEARTBEAT_INTERVAL_SECS: u64 = 30;
pub const WS_CLIENT_TIMEOUT_SECS: u64 = 120;
