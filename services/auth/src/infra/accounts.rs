use reqwest::{Client, StatusCode};
use serde_json::json;

use ridepool_domain::id::UserId;

use crate::domain::repository::AccountPort;
use crate::domain::types::Account;
use crate::error::AuthServiceError;

/// [`AccountPort`] over the accounts service's HTTP API.
#[derive(Clone)]
pub struct HttpAccountPort {
    client: Client,
    base_url: String,
}

impl HttpAccountPort {
    pub fn new(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/accounts{path}", self.base_url)
    }

    fn phone_lookup(&self, phone: &str) -> reqwest::RequestBuilder {
        self.client.get(self.url("")).query(&[("phone", phone)])
    }

    async fn fetch(&self, request: reqwest::RequestBuilder) -> Result<Option<Account>, AuthServiceError> {
        let response = request
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("accounts request failed: {e}"))?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let account = response
                    .json::<Account>()
                    .await
                    .map_err(|e| anyhow::anyhow!("invalid account payload: {e}"))?;
                Ok(Some(account))
            }
            status => Err(anyhow::anyhow!("accounts service returned {status}").into()),
        }
    }
}

impl AccountPort for HttpAccountPort {
    async fn find_by_id(&self, id: UserId) -> Result<Option<Account>, AuthServiceError> {
        self.fetch(self.client.get(self.url(&format!("/{id}")))).await
    }

    async fn find_by_phone(&self, phone: &str) -> Result<Option<Account>, AuthServiceError> {
        self.fetch(self.phone_lookup(phone)).await
    }

    async fn create(&self, phone: &str) -> Result<Account, AuthServiceError> {
        let request = self
            .client
            .post(self.url(""))
            .json(&json!({ "phone_number": phone }));
        match self.fetch(request).await? {
            Some(account) => Ok(account),
            None => Err(anyhow::anyhow!("accounts service returned no account on create").into()),
        }
    }

    async fn save(&self, account: &Account) -> Result<(), AuthServiceError> {
        let response = self
            .client
            .put(self.url(&format!("/{}", account.id)))
            .json(account)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("accounts request failed: {e}"))?;
        match response.status() {
            StatusCode::NOT_FOUND => Err(AuthServiceError::AccountNotFound),
            status if status.is_success() => Ok(()),
            status => Err(anyhow::anyhow!("accounts service returned {status}").into()),
        }
    }
}
