//! Thin clients for the collaborators the preview page talks to: the invoice
//! backend, the thumbnail host and the auth provider.

use std::env;

use log::{debug, info};
use reqwest::blocking::{Client, multipart};
use serde::{Deserialize, Serialize};

use crate::error::ServiceError;
use crate::model::InvoiceRecord;

pub const STATUS_OK: u16 = 200;
pub const STATUS_NO_CONTENT: u16 = 204;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceResponse {
    pub status: u16,
}

/// What gets persisted: the record plus who saved it and how it looked.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SavePayload {
    #[serde(flatten)]
    pub record: InvoiceRecord,
    pub clerk_id: Option<String>,
    pub thumbnail_url: String,
    pub template: String,
}

impl SavePayload {
    pub fn new(record: &InvoiceRecord, user_id: Option<String>, thumbnail_url: String, template: &str) -> Self {
        let mut record = record.clone();
        // Carried by the outer payload.
        record.thumbnail_url = None;
        record.template = None;
        record.extra.remove("clerkId");
        Self {
            record,
            clerk_id: user_id,
            thumbnail_url,
            template: template.to_string(),
        }
    }
}

/// A PDF addressed to a customer.
#[derive(Debug, Clone)]
pub struct EmailAttachment {
    pub file_name: String,
    pub pdf: Vec<u8>,
    pub email: String,
}

pub trait InvoiceService: Send + Sync {
    fn save_invoice(&self, payload: &SavePayload, token: &str) -> Result<ServiceResponse, ServiceError>;
    fn delete_invoice(&self, id: &str, token: &str) -> Result<ServiceResponse, ServiceError>;
    fn send_invoice(&self, attachment: &EmailAttachment, token: &str) -> Result<ServiceResponse, ServiceError>;
}

pub trait ThumbnailUploader: Send + Sync {
    /// Uploads a `data:image/png;base64,...` image and returns its public URL.
    fn upload_thumbnail(&self, data_url: &str) -> Result<String, ServiceError>;
}

pub trait AuthProvider: Send + Sync {
    fn token(&self) -> Result<String, ServiceError>;
    fn user_id(&self) -> Option<String>;
}

pub struct HttpInvoiceService {
    base_url: String,
    client: Client,
}

impl HttpInvoiceService {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        Self {
            base_url: base_url.into(),
            client,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path.trim_start_matches('/'))
    }
}

impl InvoiceService for HttpInvoiceService {
    fn save_invoice(&self, payload: &SavePayload, token: &str) -> Result<ServiceResponse, ServiceError> {
        let url = self.endpoint("invoices");
        debug!("POST {}", url);
        let response = self.client.post(&url).bearer_auth(token).json(payload).send()?;
        Ok(ServiceResponse {
            status: response.status().as_u16(),
        })
    }

    fn delete_invoice(&self, id: &str, token: &str) -> Result<ServiceResponse, ServiceError> {
        let url = self.endpoint(&format!("invoices/{}", id));
        debug!("DELETE {}", url);
        let response = self.client.delete(&url).bearer_auth(token).send()?;
        Ok(ServiceResponse {
            status: response.status().as_u16(),
        })
    }

    fn send_invoice(&self, attachment: &EmailAttachment, token: &str) -> Result<ServiceResponse, ServiceError> {
        let url = self.endpoint("invoices/sendinvoice");
        debug!("POST {} ({} bytes to {})", url, attachment.pdf.len(), attachment.email);
        let file = multipart::Part::bytes(attachment.pdf.clone())
            .file_name(attachment.file_name.clone())
            .mime_str("application/pdf")?;
        let form = multipart::Form::new()
            .part("file", file)
            .text("email", attachment.email.clone());
        let response = self.client.post(&url).bearer_auth(token).multipart(form).send()?;
        Ok(ServiceResponse {
            status: response.status().as_u16(),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    pub upload_preset: String,
}

pub struct CloudinaryUploader {
    config: CloudinaryConfig,
    client: Client,
}

#[derive(Deserialize)]
struct UploadResponse {
    secure_url: Option<String>,
    url: Option<String>,
}

impl CloudinaryUploader {
    pub fn new(config: CloudinaryConfig) -> Self {
        Self {
            config,
            client: Client::new(),
        }
    }

    fn upload_url(&self) -> String {
        format!(
            "https://api.cloudinary.com/v1_1/{}/image/upload",
            self.config.cloud_name
        )
    }
}

impl ThumbnailUploader for CloudinaryUploader {
    fn upload_thumbnail(&self, data_url: &str) -> Result<String, ServiceError> {
        if self.config.cloud_name.is_empty() {
            return Err(ServiceError::Response("cloudinary cloud_name is not configured".to_string()));
        }
        let form = multipart::Form::new()
            .text("file", data_url.to_string())
            .text("upload_preset", self.config.upload_preset.clone());
        let response = self.client.post(self.upload_url()).multipart(form).send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(ServiceError::Status(status.as_u16()));
        }
        let body: UploadResponse = response.json()?;
        let url = body
            .secure_url
            .or(body.url)
            .ok_or_else(|| ServiceError::Response("upload response has no url".to_string()))?;
        info!("thumbnail uploaded to {}", url);
        Ok(url)
    }
}

pub const TOKEN_ENV: &str = "INVOICE_AUTH_TOKEN";
pub const USER_ENV: &str = "INVOICE_USER_ID";

/// Token and user id handed over by whoever signed the user in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StaticAuth {
    pub token: Option<String>,
    pub user_id: Option<String>,
}

impl StaticAuth {
    /// Environment variables win over configured values.
    pub fn from_env_or(configured: StaticAuth) -> Self {
        Self {
            token: env::var(TOKEN_ENV).ok().or(configured.token),
            user_id: env::var(USER_ENV).ok().or(configured.user_id),
        }
    }
}

impl AuthProvider for StaticAuth {
    fn token(&self) -> Result<String, ServiceError> {
        self.token
            .clone()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| ServiceError::Unauthenticated(format!("set {} or [auth].token", TOKEN_ENV)))
    }

    fn user_id(&self) -> Option<String> {
        self.user_id.clone()
    }
}
