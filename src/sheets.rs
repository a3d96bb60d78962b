use anyhow::Context;
use async_trait::async_trait;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use time::{format_description::well_known::Rfc3339, Duration, OffsetDateTime};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::auth::{repo::UserStore, repo_types::User};
use crate::config::SheetsConfig;

const SHEETS_API: &str = "https://sheets.googleapis.com";
const DRIVE_API: &str = "https://www.googleapis.com";
const SCOPES: &str =
    "https://www.googleapis.com/auth/spreadsheets https://www.googleapis.com/auth/drive.readonly";
const HEADER: [&str; 4] = ["name", "email", "password_hash", "created_at"];

/// Fields of a Google service-account key file that the token exchange needs.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".into()
}

#[derive(Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

struct CachedToken {
    value: String,
    expires_at: OffsetDateTime,
}

/// OAuth access tokens for a service account, refreshed a minute before expiry.
pub struct ServiceAccountAuth {
    http: Client,
    key: ServiceAccountKey,
    cached: Mutex<Option<CachedToken>>,
}

impl ServiceAccountAuth {
    pub fn new(http: Client, key: ServiceAccountKey) -> Self {
        Self {
            http,
            key,
            cached: Mutex::new(None),
        }
    }

    #[cfg(test)]
    fn preauthorized(http: Client, token: &str) -> Self {
        Self {
            http,
            key: ServiceAccountKey {
                client_email: "test@example.iam.gserviceaccount.com".into(),
                private_key: String::new(),
                token_uri: default_token_uri(),
            },
            cached: Mutex::new(Some(CachedToken {
                value: token.into(),
                expires_at: OffsetDateTime::now_utc() + Duration::hours(1),
            })),
        }
    }

    pub async fn access_token(&self) -> anyhow::Result<String> {
        let mut cached = self.cached.lock().await;
        let now = OffsetDateTime::now_utc();
        if let Some(token) = cached.as_ref() {
            if token.expires_at - Duration::seconds(60) > now {
                return Ok(token.value.clone());
            }
        }

        let claims = AssertionClaims {
            iss: &self.key.client_email,
            scope: SCOPES,
            aud: &self.key.token_uri,
            iat: now.unix_timestamp(),
            exp: (now + Duration::hours(1)).unix_timestamp(),
        };
        let signing_key = EncodingKey::from_rsa_pem(self.key.private_key.as_bytes())
            .context("parse service account private key")?;
        let assertion = encode(&Header::new(Algorithm::RS256), &claims, &signing_key)
            .context("sign service account assertion")?;

        let resp: TokenResponse = self
            .http
            .post(&self.key.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await
            .context("token exchange")?
            .error_for_status()
            .context("token exchange")?
            .json()
            .await
            .context("token exchange response")?;

        debug!(client = %self.key.client_email, expires_in = resp.expires_in, "google access token issued");
        let value = resp.access_token.clone();
        *cached = Some(CachedToken {
            value: resp.access_token,
            expires_at: now + Duration::seconds(resp.expires_in),
        });
        Ok(value)
    }
}

#[derive(Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<String>>,
}

#[derive(Serialize)]
struct AppendBody {
    values: Vec<Vec<String>>,
}

#[derive(Deserialize)]
struct DriveFileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}

#[derive(Deserialize)]
struct DriveFile {
    id: String,
}

/// Users kept as rows of one worksheet: `name | email | password_hash | created_at`.
pub struct SheetsUserStore {
    http: Client,
    auth: ServiceAccountAuth,
    api_base: String,
    spreadsheet_id: String,
    worksheet: String,
}

impl SheetsUserStore {
    /// Loads the key file, resolves the spreadsheet and makes sure the header row exists.
    pub async fn connect(cfg: &SheetsConfig) -> anyhow::Result<Self> {
        let raw = tokio::fs::read_to_string(&cfg.credentials_file)
            .await
            .with_context(|| format!("read credentials file {}", cfg.credentials_file))?;
        let key: ServiceAccountKey =
            serde_json::from_str(&raw).context("parse service account credentials")?;

        let http = Client::new();
        let auth = ServiceAccountAuth::new(http.clone(), key);

        let spreadsheet_id = match &cfg.spreadsheet_id {
            Some(id) => id.clone(),
            None => find_spreadsheet(&http, &auth, DRIVE_API, &cfg.spreadsheet_name).await?,
        };
        info!(spreadsheet = %spreadsheet_id, worksheet = %cfg.worksheet, "using sheets user store");

        let store = Self::from_parts(http, auth, SHEETS_API, spreadsheet_id, &cfg.worksheet);
        store.ensure_header().await?;
        Ok(store)
    }

    pub fn from_parts(
        http: Client,
        auth: ServiceAccountAuth,
        api_base: &str,
        spreadsheet_id: String,
        worksheet: &str,
    ) -> Self {
        Self {
            http,
            auth,
            api_base: api_base.trim_end_matches('/').to_string(),
            spreadsheet_id,
            worksheet: worksheet.to_string(),
        }
    }

    fn values_url(&self, range: &str, suffix: &str) -> anyhow::Result<Url> {
        let mut url = Url::parse(&self.api_base).context("sheets api base url")?;
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("sheets api base url cannot have a path"))?
            .pop_if_empty()
            .extend(["v4", "spreadsheets", self.spreadsheet_id.as_str(), "values"])
            .push(&format!("{range}{suffix}"));
        Ok(url)
    }

    async fn read(&self, range: &str) -> anyhow::Result<Vec<Vec<String>>> {
        let token = self.auth.access_token().await?;
        let body: ValueRange = self
            .http
            .get(self.values_url(range, "")?)
            .bearer_auth(token)
            .send()
            .await
            .context("sheets values.get")?
            .error_for_status()
            .context("sheets values.get")?
            .json()
            .await
            .context("sheets values.get response")?;
        Ok(body.values)
    }

    async fn append_row(&self, row: Vec<String>) -> anyhow::Result<()> {
        let token = self.auth.access_token().await?;
        let range = format!("{}!A:D", self.worksheet);
        self.http
            .post(self.values_url(&range, ":append")?)
            .query(&[("valueInputOption", "RAW"), ("insertDataOption", "INSERT_ROWS")])
            .bearer_auth(token)
            .json(&AppendBody { values: vec![row] })
            .send()
            .await
            .context("sheets values.append")?
            .error_for_status()
            .context("sheets values.append")?;
        Ok(())
    }

    async fn ensure_header(&self) -> anyhow::Result<()> {
        let first = self.read(&format!("{}!A1:D1", self.worksheet)).await?;
        if first.iter().all(|row| row.is_empty()) {
            info!(worksheet = %self.worksheet, "writing header row");
            self.append_row(HEADER.iter().map(|h| h.to_string()).collect())
                .await?;
        }
        Ok(())
    }

    async fn users(&self) -> anyhow::Result<Vec<User>> {
        let rows = self.read(&format!("{}!A:D", self.worksheet)).await?;
        Ok(parse_rows(rows))
    }
}

#[async_trait]
impl UserStore for SheetsUserStore {
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        Ok(self
            .users()
            .await?
            .into_iter()
            .find(|u| u.email.eq_ignore_ascii_case(email)))
    }

    async fn append(&self, user: User) -> anyhow::Result<()> {
        let created_at = user
            .created_at
            .format(&Rfc3339)
            .context("format created_at")?;
        self.append_row(vec![
            user.name,
            user.email.to_lowercase(),
            user.password_hash,
            created_at,
        ])
        .await
    }
}

async fn find_spreadsheet(
    http: &Client,
    auth: &ServiceAccountAuth,
    drive_base: &str,
    name: &str,
) -> anyhow::Result<String> {
    let token = auth.access_token().await?;
    let query = format!(
        "name = '{}' and mimeType = 'application/vnd.google-apps.spreadsheet' and trashed = false",
        name.replace('\\', "\\\\").replace('\'', "\\'")
    );
    let list: DriveFileList = http
        .get(format!("{}/drive/v3/files", drive_base.trim_end_matches('/')))
        .query(&[("q", query.as_str()), ("fields", "files(id)")])
        .bearer_auth(token)
        .send()
        .await
        .context("drive files.list")?
        .error_for_status()
        .context("drive files.list")?
        .json()
        .await
        .context("drive files.list response")?;

    list.files
        .into_iter()
        .next()
        .map(|f| f.id)
        .with_context(|| format!("spreadsheet {name:?} not found or not shared with the service account"))
}

/// Header row and rows without an email or hash are skipped.
fn parse_rows(rows: Vec<Vec<String>>) -> Vec<User> {
    rows.into_iter()
        .filter(|row| !is_header(row))
        .filter_map(|row| {
            let mut cells = row.into_iter();
            let name = cells.next().unwrap_or_default();
            let email = cells.next().filter(|e| !e.trim().is_empty())?;
            let password_hash = cells.next().filter(|h| !h.is_empty())?;
            let created_at = match cells.next() {
                Some(ts) => OffsetDateTime::parse(&ts, &Rfc3339).unwrap_or_else(|e| {
                    warn!(error = %e, email = %email, "unreadable created_at");
                    OffsetDateTime::UNIX_EPOCH
                }),
                None => OffsetDateTime::UNIX_EPOCH,
            };
            Some(User {
                name,
                email: email.trim().to_lowercase(),
                password_hash,
                created_at,
            })
        })
        .collect()
}

fn is_header(row: &[String]) -> bool {
    matches!(row, [name, email, ..]
        if name.eq_ignore_ascii_case(HEADER[0]) && email.eq_ignore_ascii_case(HEADER[1]))
}
