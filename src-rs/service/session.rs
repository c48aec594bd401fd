use std::sync::RwLock;

use async_trait::async_trait;

use super::http_service::HttpGenerationService;

/// Auth and credit state owned by the hosting application.
#[async_trait]
pub trait Session: Send + Sync {
    fn auth_token(&self) -> Option<String>;

    /// Last known balance. `None` when it has never been fetched.
    fn cached_credits(&self) -> Option<u32>;

    /// Re-fetch the balance after a billed generation.
    async fn refresh_credits(&self);
}

pub struct StaticSession {
    token: Option<String>,
    credits: RwLock<Option<u32>>,
}

impl StaticSession {
    pub fn new(token: Option<String>, credits: Option<u32>) -> Self {
        Self {
            token,
            credits: RwLock::new(credits),
        }
    }

    pub fn set_credits(&self, credits: Option<u32>) {
        if let Ok(mut slot) = self.credits.write() {
            *slot = credits;
        }
    }
}

#[async_trait]
impl Session for StaticSession {
    fn auth_token(&self) -> Option<String> {
        self.token.clone()
    }

    fn cached_credits(&self) -> Option<u32> {
        self.credits.read().ok().and_then(|slot| *slot)
    }

    async fn refresh_credits(&self) {}
}

/// Session whose balance is re-read from the service's credits endpoint.
pub struct HttpSession {
    service: HttpGenerationService,
    token: Option<String>,
    credits: RwLock<Option<u32>>,
}

impl HttpSession {
    pub fn new(service: HttpGenerationService, token: Option<String>) -> Self {
        Self {
            service,
            token,
            credits: RwLock::new(None),
        }
    }
}

#[async_trait]
impl Session for HttpSession {
    fn auth_token(&self) -> Option<String> {
        self.token.clone()
    }

    fn cached_credits(&self) -> Option<u32> {
        self.credits.read().ok().and_then(|slot| *slot)
    }

    async fn refresh_credits(&self) {
        match self.service.fetch_credits(self.token.as_deref()).await {
            Ok(balance) => {
                if let Ok(mut slot) = self.credits.write() {
                    *slot = Some(balance);
                }
                tracing::debug!(balance, "credits refreshed");
            }
            Err(err) => tracing::warn!(%err, "credit refresh failed"),
        }
    }
}
