use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
}

/// Where registered users live.
#[derive(Debug, Clone, Deserialize)]
pub enum UserStoreConfig {
    Memory,
    Sheets(SheetsConfig),
}

#[derive(Debug, Clone, Deserialize)]
pub struct SheetsConfig {
    pub credentials_file: String,
    pub spreadsheet_name: String,
    /// When set, the Drive lookup by name is skipped.
    pub spreadsheet_id: Option<String>,
    pub worksheet: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub jwt: JwtConfig,
    pub gemini: GeminiConfig,
    pub user_store: UserStoreConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "pagesmith".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "pagesmith-users".into()),
            ttl_minutes: std::env::var("JWT_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(60 * 24),
        };

        let gemini = GeminiConfig {
            api_key: std::env::var("GEMINI_API_KEY")?,
            model: std::env::var("GEMINI_MODEL").unwrap_or_else(|_| "gemini-2.0-flash".into()),
            base_url: std::env::var("GEMINI_BASE_URL")
                .unwrap_or_else(|_| "https://generativelanguage.googleapis.com".into()),
        };

        let user_store = match std::env::var("USER_STORE").as_deref() {
            Ok("memory") => UserStoreConfig::Memory,
            Ok("sheets") | Err(_) => UserStoreConfig::Sheets(SheetsConfig {
                credentials_file: std::env::var("GOOGLE_CREDENTIALS_FILE")
                    .unwrap_or_else(|_| "credentials.json".into()),
                spreadsheet_name: std::env::var("SHEETS_SPREADSHEET_NAME")
                    .unwrap_or_else(|_| "Users".into()),
                spreadsheet_id: std::env::var("SHEETS_SPREADSHEET_ID").ok(),
                worksheet: std::env::var("SHEETS_WORKSHEET").unwrap_or_else(|_| "Sheet1".into()),
            }),
            Ok(other) => anyhow::bail!("unknown USER_STORE {other:?}, expected sheets or memory"),
        };

        Ok(Self {
            jwt,
            gemini,
            user_store,
        })
    }
}
