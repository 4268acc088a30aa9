use crate::infrastructure::error::InfraError;
use crate::infrastructure::slot_mapper::WireSlotRecord;
use crate::infrastructure::slot_store::{normalized_owner_id, SaveAck, SlotStore};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, StatusCode};
use url::Url;

const SLOTS_SEGMENT: &str = "slots";

#[derive(Debug, Clone)]
pub struct ReqwestSlotApiClient {
    client: Client,
    base_url: Url,
    bearer_token: Option<String>,
}

impl ReqwestSlotApiClient {
    pub fn new(base_url: &str, bearer_token: Option<String>) -> Result<Self, InfraError> {
        let base_url = Url::parse(base_url.trim())
            .map_err(|error| InfraError::InvalidConfig(format!("invalid slot api base url: {error}")))?;
        if base_url.cannot_be_a_base() {
            return Err(InfraError::InvalidConfig(format!(
                "slot api base url cannot be a base: {base_url}"
            )));
        }
        Ok(Self {
            client: Client::new(),
            base_url,
            bearer_token: bearer_token
                .map(|token| token.trim().to_string())
                .filter(|token| !token.is_empty()),
        })
    }

    pub fn slots_endpoint(&self, owner_id: &str) -> Result<Url, InfraError> {
        let owner_id = normalized_owner_id(owner_id)?;
        let mut url = self.base_url.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                InfraError::InvalidConfig("slot api base url cannot be a base".to_string())
            })?;
            segments.pop_if_empty();
            segments.push(owner_id);
            segments.push(SLOTS_SEGMENT);
        }
        Ok(url)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.bearer_token.as_deref() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

pub(crate) fn http_error(status: StatusCode, body: &str) -> InfraError {
    if body.trim().is_empty() {
        InfraError::Http(format!("http {}", status.as_u16()))
    } else {
        InfraError::Http(format!("http {}; body={body}", status.as_u16()))
    }
}

pub(crate) fn parse_load_response(
    status: StatusCode,
    body: &str,
) -> Result<Option<Vec<WireSlotRecord>>, InfraError> {
    if status == StatusCode::NOT_FOUND {
        return Ok(None);
    }
    if !status.is_success() {
        return Err(http_error(status, body));
    }
    if body.trim().is_empty() {
        return Ok(Some(Vec::new()));
    }
    serde_json::from_str::<Vec<WireSlotRecord>>(body)
        .map(Some)
        .map_err(|error| InfraError::Http(format!("invalid slot payload: {error}; body={body}")))
}

#[async_trait]
impl SlotStore for ReqwestSlotApiClient {
    async fn load_slots(&self, owner_id: &str) -> Result<Option<Vec<WireSlotRecord>>, InfraError> {
        let endpoint = self.slots_endpoint(owner_id)?;
        let response = self
            .authorized(self.client.get(endpoint))
            .send()
            .await
            .map_err(|error| InfraError::Http(format!("network error while loading slots: {error}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| InfraError::Http(format!("failed reading slots response: {error}")))?;

        parse_load_response(status, &body)
    }

    async fn save_slots(
        &self,
        owner_id: &str,
        records: &[WireSlotRecord],
    ) -> Result<SaveAck, InfraError> {
        let endpoint = self.slots_endpoint(owner_id)?;
        let response = self
            .authorized(self.client.put(endpoint))
            .json(records)
            .send()
            .await
            .map_err(|error| InfraError::Http(format!("network error while saving slots: {error}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| InfraError::Http(format!("failed reading save response: {error}")))?;

        if !status.is_success() {
            return Err(http_error(status, &body));
        }
        Ok(SaveAck {
            owner_id: normalized_owner_id(owner_id)?.to_string(),
            record_count: records.len(),
            saved_at: Utc::now(),
        })
    }
}
