use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::debug;

use crate::client::{LocationAck, LocationReport, TrackingBackend};
use crate::error::AppError;
use crate::models::courier::Courier;
use crate::models::package::{NewPackage, Package, PackageStatus};
use crate::models::session::{Credentials, Session};

/// reqwest-backed client for the delivery REST API.
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("delivery-tracker/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| AppError::Internal(format!("failed to create http client: {err}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, AppError> {
        let response = self.client.get(self.url(path)).send().await?;
        let response = check_status(response).await?;
        Ok(response.json::<T>().await?)
    }
}

async fn check_status(response: Response) -> Result<Response, AppError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = response.text().await.unwrap_or_default();
    Err(AppError::Backend {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl TrackingBackend for HttpBackend {
    async fn login(&self, credentials: &Credentials) -> Result<Session, AppError> {
        let response = self
            .client
            .post(self.url("/login"))
            .json(credentials)
            .send()
            .await?;

        match check_status(response).await {
            Ok(response) => Ok(response.json::<Session>().await?),
            Err(AppError::Backend { status, message }) if (400..500).contains(&status) => {
                debug!(status, %message, "login rejected");
                Err(AppError::Unauthorized("Credenciales incorrectas".to_string()))
            }
            Err(err) => Err(err),
        }
    }

    async fn packages(&self) -> Result<Vec<Package>, AppError> {
        self.get_json("/packages").await
    }

    async fn create_package(&self, package: &NewPackage) -> Result<(), AppError> {
        let response = self
            .client
            .post(self.url("/packages"))
            .json(package)
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }

    async fn update_package_status(
        &self,
        id: i64,
        status: &PackageStatus,
    ) -> Result<(), AppError> {
        let response = self
            .client
            .put(self.url(&format!("/packages/{id}/status")))
            .json(&json!({ "status": status }))
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }

    async fn delete_package(&self, id: i64) -> Result<(), AppError> {
        let response = self
            .client
            .delete(self.url(&format!("/packages/{id}")))
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }

    async fn couriers(&self) -> Result<Vec<Courier>, AppError> {
        self.get_json("/deliveries").await
    }

    async fn courier_positions(&self) -> Result<Vec<Courier>, AppError> {
        self.get_json("/deliveries/map").await
    }

    async fn update_courier_availability(
        &self,
        id: i64,
        is_available: bool,
    ) -> Result<(), AppError> {
        let response = self
            .client
            .put(self.url(&format!("/deliveries/{id}/status")))
            .json(&json!({ "is_available": is_available }))
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }

    async fn report_location(&self, report: &LocationReport) -> Result<LocationAck, AppError> {
        let response = self
            .client
            .post(self.url(&format!(
                "/deliveries/{}/location",
                report.delivery_person_id
            )))
            .json(report)
            .send()
            .await?;
        let response = check_status(response).await?;

        let body = response.bytes().await?;
        if body.is_empty() {
            return Ok(LocationAck::default());
        }

        match serde_json::from_slice::<LocationAck>(&body) {
            Ok(ack) => Ok(ack),
            Err(err) => {
                debug!(error = %err, "location ack is not a courier payload");
                Ok(LocationAck::default())
            }
        }
    }
}
