//! Session acquisition and reuse. A successful interactive login exports the
//! browser's cookie set to a token file; later runs install those cookies
//! into a fresh browser before the first navigation, skipping the login form
//! entirely until the site invalidates the session.

use std::path::{Path, PathBuf};

use chromiumoxide::cdp::browser_protocol::network::{Cookie, CookieParam};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::SessionSection;

use super::automation::BrowserContext;
use super::error::{BrowserError, BrowserResult};
use super::human::HumanMotionController;

const LOGIN_SETTLE_SECONDS: u64 = 45;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    pub secure: bool,
    pub http_only: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionToken {
    pub cookies: Vec<StoredCookie>,
    pub saved_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn from_env() -> Option<Self> {
        let email = std::env::var("JOBSCOUT_EMAIL").ok()?;
        let password = std::env::var("JOBSCOUT_PASSWORD").ok()?;
        if email.is_empty() || password.is_empty() {
            None
        } else {
            Some(Self { email, password })
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionManager {
    token_path: PathBuf,
    config: SessionSection,
}

impl SessionManager {
    pub fn new(token_path: PathBuf, config: SessionSection) -> Self {
        Self { token_path, config }
    }

    pub fn token_path(&self) -> &Path {
        &self.token_path
    }

    pub fn has_saved_session(&self) -> bool {
        self.token_path.exists()
    }

    pub fn load(&self) -> BrowserResult<Option<SessionToken>> {
        if !self.token_path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&self.token_path)?;
        let token = serde_json::from_str(&raw)
            .map_err(|err| BrowserError::Session(format!("corrupt session token file: {err}")))?;
        Ok(Some(token))
    }

    pub fn save(&self, token: &SessionToken) -> BrowserResult<()> {
        if let Some(parent) = self.token_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_string_pretty(token)
            .map_err(|err| BrowserError::Session(format!("failed to encode session: {err}")))?;
        std::fs::write(&self.token_path, raw)?;
        Ok(())
    }

    /// Installs saved cookies into the context. Returns false when no token
    /// file exists yet.
    pub async fn restore(&self, context: &BrowserContext) -> BrowserResult<bool> {
        let Some(token) = self.load()? else {
            return Ok(false);
        };
        let cookies = token.cookies.iter().map(cookie_param).collect::<Vec<_>>();
        let count = cookies.len();
        context.page().set_cookies(cookies).await?;
        info!(
            count,
            saved_at = %token.saved_at,
            "restored saved session cookies"
        );
        Ok(true)
    }

    /// Interactive login: fills the credential form, submits, waits for the
    /// authenticated landing page, then exports and saves the cookie set.
    /// A rejected credential pair never reaches the authenticated selector
    /// and surfaces as a session error.
    pub async fn login(
        &self,
        context: &BrowserContext,
        human: &mut HumanMotionController,
        credentials: &Credentials,
    ) -> BrowserResult<()> {
        info!(url = %self.config.login_url, "starting interactive login");
        context.goto(&self.config.login_url).await?;

        let email_input = context.wait_for_element(&self.config.email_selector).await?;
        human.type_text(&email_input, &credentials.email).await?;
        human.idle().await?;

        let password_input = context
            .wait_for_element(&self.config.password_selector)
            .await?;
        human.type_text(&password_input, &credentials.password).await?;
        human.idle().await?;

        let submit = context.wait_for_element(&self.config.submit_selector).await?;
        human.click_element(&submit).await?;

        context
            .wait_for_element_within(&self.config.authenticated_selector, LOGIN_SETTLE_SECONDS)
            .await
            .map_err(|_| {
                BrowserError::Session(
                    "login did not reach an authenticated page; check credentials".to_string(),
                )
            })?;

        let token = self.capture(context).await?;
        self.save(&token)?;
        info!(path = %self.token_path.display(), "session token saved");
        Ok(())
    }

    pub async fn capture(&self, context: &BrowserContext) -> BrowserResult<SessionToken> {
        let cookies = context.page().get_cookies().await?;
        Ok(SessionToken {
            cookies: cookies.into_iter().map(stored_cookie).collect(),
            saved_at: Utc::now(),
        })
    }
}

fn cookie_param(cookie: &StoredCookie) -> CookieParam {
    let mut param = CookieParam::new(cookie.name.clone(), cookie.value.clone());
    param.domain = Some(cookie.domain.clone());
    param.path = Some(cookie.path.clone());
    param.secure = Some(cookie.secure);
    param.http_only = Some(cookie.http_only);
    param
}

fn stored_cookie(cookie: Cookie) -> StoredCookie {
    StoredCookie {
        name: cookie.name,
        value: cookie.value,
        domain: cookie.domain,
        path: cookie.path,
        secure: cookie.secure,
        http_only: cookie.http_only,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn session_section() -> SessionSection {
        SessionSection {
            login_url: "https://www.linkedin.com/login".into(),
            jobs_url: "https://www.linkedin.com/jobs/search/".into(),
            email_selector: "#username".into(),
            password_selector: "#password".into(),
            submit_selector: "button[type='submit']".into(),
            authenticated_selector: "input[aria-label]".into(),
        }
    }

    fn sample_token() -> SessionToken {
        SessionToken {
            cookies: vec![StoredCookie {
                name: "li_at".into(),
                value: "opaque-value".into(),
                domain: ".linkedin.com".into(),
                path: "/".into(),
                secure: true,
                http_only: true,
            }],
            saved_at: Utc::now(),
        }
    }

    #[test]
    fn save_then_load_roundtrips() {
        let dir = tempdir().unwrap();
        let manager = SessionManager::new(dir.path().join("session.json"), session_section());
        assert!(!manager.has_saved_session());
        assert!(manager.load().unwrap().is_none());

        manager.save(&sample_token()).unwrap();
        assert!(manager.has_saved_session());
        let loaded = manager.load().unwrap().unwrap();
        assert_eq!(loaded.cookies.len(), 1);
        assert_eq!(loaded.cookies[0].name, "li_at");
        assert_eq!(loaded.cookies[0].domain, ".linkedin.com");
    }

    #[test]
    fn save_creates_missing_parent_directory() {
        let dir = tempdir().unwrap();
        let manager =
            SessionManager::new(dir.path().join("state/session.json"), session_section());
        manager.save(&sample_token()).unwrap();
        assert!(manager.has_saved_session());
    }

    #[test]
    fn corrupt_token_file_is_a_session_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, "not json").unwrap();
        let manager = SessionManager::new(path, session_section());
        let err = manager.load().unwrap_err();
        assert!(matches!(err, BrowserError::Session(_)));
    }

    #[test]
    fn cookie_param_carries_domain_and_flags() {
        let stored = StoredCookie {
            name: "a".into(),
            value: "b".into(),
            domain: ".example.com".into(),
            path: "/".into(),
            secure: true,
            http_only: false,
        };
        let param = cookie_param(&stored);
        assert_eq!(param.name, "a");
        assert_eq!(param.domain.as_deref(), Some(".example.com"));
        assert_eq!(param.secure, Some(true));
        assert_eq!(param.http_only, Some(false));
    }
}
