use std::env;

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub server_host: String,
    pub server_port: u16,
    pub jwt_secret: String,
    pub google_api_key: Option<String>,
    pub vision_model: String,
    pub r2_bucket: Option<String>,
    pub r2_account_id: Option<String>,
    pub r2_access_key: Option<String>,
    pub r2_secret_key: Option<String>,
}

/// Credentials for the S3-compatible image bucket; present only when all
/// four variables are set.
#[derive(Clone, Debug)]
pub struct R2Config {
    pub bucket: String,
    pub account_id: String,
    pub access_key: String,
    pub secret_key: String,
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        dotenvy::dotenv().ok();

        Ok(Config {
            database_url: env::var("DATABASE_URL")?,
            server_host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
            jwt_secret: env::var("JWT_SECRET")?,
            google_api_key: env::var("GOOGLE_API_KEY").ok().filter(|s| !s.is_empty()),
            vision_model: env::var("VISION_MODEL")
                .unwrap_or_else(|_| "gemini-2.5-flash".to_string()),
            r2_bucket: env::var("R2_BUCKET").ok(),
            r2_account_id: env::var("R2_ACCOUNT_ID").ok(),
            r2_access_key: env::var("R2_ACCESS_KEY_ID").ok(),
            r2_secret_key: env::var("R2_SECRET_ACCESS_KEY").ok(),
        })
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }

    pub fn r2_config(&self) -> Option<R2Config> {
        Some(R2Config {
            bucket: self.r2_bucket.clone()?,
            account_id: self.r2_account_id.clone()?,
            access_key: self.r2_access_key.clone()?,
            secret_key: self.r2_secret_key.clone()?,
        })
    }
}
