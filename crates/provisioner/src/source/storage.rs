//! Object-store (blob) artifact source.
//!
//! Blobs are read with a plain GET against the account's blob endpoint,
//! authenticated either with a Shared Key signature or a SAS token. The
//! locator is `container/path/to/blob`.
//!
//! Credentials are resolved by the caller before the source is built; the
//! source never reads settings or prompts on its own.

use crate::error::{Error, Result};
use crate::source::{ArtifactSource, fetch_error, write_atomically};
use crate::types::{ArtifactDescriptor, DownloadType};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use sha2::Sha256;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

/// Blob service REST version sent with every request.
pub const STORAGE_API_VERSION: &str = "2020-10-02";

/// Characters escaped in each blob path segment.
const BLOB_SEGMENT_SET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

const DEFAULT_ENDPOINT_SUFFIX: &str = "core.windows.net";
const EMULATOR_ACCOUNT: &str = "devstoreaccount1";
const EMULATOR_KEY: &str =
    "Eby8vdM02xNOcqFlqUwJPLlmEtlCDXJ1OUzFT50uSRZ6IFsuFq2UVErCz4I6tq/K1SZFPTOtr/KBHBeksoGMGw==";
const EMULATOR_BLOB_ENDPOINT: &str = "http://127.0.0.1:10000/devstoreaccount1";

#[derive(Clone)]
enum StorageAuth {
    SharedKey(Vec<u8>),
    Sas(String),
}

/// Resolved storage account credentials.
#[derive(Clone)]
pub struct StorageCredentials {
    account_name: String,
    blob_endpoint: String,
    auth: StorageAuth,
}

impl StorageCredentials {
    /// Build credentials from an account name and base64 account key.
    pub fn from_account_key(
        account_name: impl Into<String>,
        account_key: &str,
        endpoint_suffix: Option<&str>,
    ) -> Result<Self> {
        let account_name = account_name.into();
        if account_name.trim().is_empty() {
            return Err(Error::InvalidCredentials("account name is empty".to_string()));
        }
        let key = decode_key(account_key)?;
        let suffix = endpoint_suffix.unwrap_or(DEFAULT_ENDPOINT_SUFFIX);
        Ok(Self {
            blob_endpoint: format!("https://{account_name}.blob.{suffix}"),
            account_name,
            auth: StorageAuth::SharedKey(key),
        })
    }

    /// Parse a storage connection string.
    ///
    /// Supports `AccountName`/`AccountKey`, `SharedAccessSignature`,
    /// `BlobEndpoint`, `DefaultEndpointsProtocol`, `EndpointSuffix` and
    /// `UseDevelopmentStorage=true`. Keys are matched case-insensitively.
    pub fn from_connection_string(connection_string: &str) -> Result<Self> {
        let mut parts: HashMap<String, String> = HashMap::new();
        for segment in connection_string.split(';') {
            let segment = segment.trim();
            if segment.is_empty() {
                continue;
            }
            let (key, value) = segment.split_once('=').ok_or_else(|| {
                Error::InvalidCredentials(format!("malformed segment '{segment}'"))
            })?;
            parts.insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
        }

        if parts
            .get("usedevelopmentstorage")
            .is_some_and(|v| v.eq_ignore_ascii_case("true"))
        {
            return Ok(Self {
                account_name: EMULATOR_ACCOUNT.to_string(),
                blob_endpoint: EMULATOR_BLOB_ENDPOINT.to_string(),
                auth: StorageAuth::SharedKey(decode_key(EMULATOR_KEY)?),
            });
        }

        let account_name = parts.get("accountname").cloned().unwrap_or_default();

        let auth = if let Some(key) = parts.get("accountkey") {
            StorageAuth::SharedKey(decode_key(key)?)
        } else if let Some(sas) = parts.get("sharedaccesssignature") {
            StorageAuth::Sas(sas.trim_start_matches('?').to_string())
        } else {
            return Err(Error::InvalidCredentials(
                "connection string has neither AccountKey nor SharedAccessSignature".to_string(),
            ));
        };

        if matches!(auth, StorageAuth::SharedKey(_)) && account_name.is_empty() {
            return Err(Error::InvalidCredentials(
                "connection string is missing AccountName".to_string(),
            ));
        }

        let blob_endpoint = match parts.get("blobendpoint") {
            Some(endpoint) => endpoint.trim_end_matches('/').to_string(),
            None => {
                if account_name.is_empty() {
                    return Err(Error::InvalidCredentials(
                        "connection string needs AccountName or BlobEndpoint".to_string(),
                    ));
                }
                let protocol = parts
                    .get("defaultendpointsprotocol")
                    .map_or("https", String::as_str);
                let suffix = parts
                    .get("endpointsuffix")
                    .map_or(DEFAULT_ENDPOINT_SUFFIX, String::as_str);
                format!("{protocol}://{account_name}.blob.{suffix}")
            }
        };

        Ok(Self {
            account_name,
            blob_endpoint,
            auth,
        })
    }

    /// Storage account name.
    #[must_use]
    pub fn account_name(&self) -> &str {
        &self.account_name
    }

    /// Blob service endpoint, without a trailing slash.
    #[must_use]
    pub fn blob_endpoint(&self) -> &str {
        &self.blob_endpoint
    }

    /// Whether requests are authorized with a SAS token.
    #[must_use]
    pub fn uses_sas(&self) -> bool {
        matches!(self.auth, StorageAuth::Sas(_))
    }
}

impl fmt::Debug for StorageCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let auth = match self.auth {
            StorageAuth::SharedKey(_) => "SharedKey(<redacted>)",
            StorageAuth::Sas(_) => "Sas(<redacted>)",
        };
        f.debug_struct("StorageCredentials")
            .field("account_name", &self.account_name)
            .field("blob_endpoint", &self.blob_endpoint)
            .field("auth", &auth)
            .finish()
    }
}

fn decode_key(key: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(key.trim())
        .map_err(|e| Error::InvalidCredentials(format!("account key is not valid base64: {e}")))
}

/// Downloads an artifact from a blob container.
pub struct StorageArtifact {
    agent: ureq::Agent,
    descriptor: ArtifactDescriptor,
    credentials: StorageCredentials,
}

impl StorageArtifact {
    /// Create a source for the blob named by `descriptor.remote_locator`.
    #[must_use]
    pub fn new(descriptor: ArtifactDescriptor, credentials: StorageCredentials) -> Self {
        Self {
            agent: ureq::Agent::new_with_defaults(),
            descriptor,
            credentials,
        }
    }

    /// `container/blob`, with each segment percent-encoded.
    fn blob_path(&self) -> Result<String> {
        let path = self.descriptor.remote_locator.trim_start_matches('/');
        match path.split_once('/') {
            Some((container, blob)) if !container.is_empty() && !blob.is_empty() => Ok(path
                .split('/')
                .map(|segment| utf8_percent_encode(segment, BLOB_SEGMENT_SET).to_string())
                .collect::<Vec<_>>()
                .join("/")),
            _ => Err(Error::config(format!(
                "blob locator '{}' must be 'container/blob'",
                self.descriptor.remote_locator
            ))),
        }
    }

    /// Full blob URL, without any SAS query.
    pub fn blob_url(&self) -> Result<String> {
        Ok(format!(
            "{}/{}",
            self.credentials.blob_endpoint,
            self.blob_path()?
        ))
    }

    /// Path component of the blob URL, used in the canonical resource.
    fn url_path(&self) -> Result<String> {
        let endpoint = &self.credentials.blob_endpoint;
        let after_scheme = endpoint
            .split_once("://")
            .map_or(endpoint.as_str(), |(_, rest)| rest);
        let endpoint_path = after_scheme.find('/').map_or("", |i| &after_scheme[i..]);
        Ok(format!("{endpoint_path}/{}", self.blob_path()?))
    }
}

/// Build the Shared Key string-to-sign for a body-less blob GET.
fn string_to_sign(date: &str, account: &str, url_path: &str) -> String {
    // VERB followed by eleven empty standard headers.
    format!(
        "GET\n\n\n\n\n\n\n\n\n\n\n\nx-ms-date:{date}\nx-ms-version:{STORAGE_API_VERSION}\n/{account}{url_path}"
    )
}

/// Compute the `Authorization` header value for a blob GET.
fn authorization(key: &[u8], date: &str, account: &str, url_path: &str) -> Result<String> {
    let mut mac = Hmac::<Sha256>::new_from_slice(key)
        .map_err(|e| Error::InvalidCredentials(e.to_string()))?;
    mac.update(string_to_sign(date, account, url_path).as_bytes());
    let signature = STANDARD.encode(mac.finalize().into_bytes());
    Ok(format!("SharedKey {account}:{signature}"))
}

fn rfc1123_now() -> String {
    chrono::Utc::now()
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}

impl ArtifactSource for StorageArtifact {
    fn kind(&self) -> DownloadType {
        DownloadType::Storage
    }

    fn descriptor(&self) -> &ArtifactDescriptor {
        &self.descriptor
    }

    fn fetch(&self, destination: &Path) -> Result<()> {
        let url = self.blob_url()?;
        log::info!(
            "Downloading {} from storage account {}",
            self.descriptor.local_file_name,
            self.credentials.account_name
        );

        let date = rfc1123_now();
        let request = match &self.credentials.auth {
            StorageAuth::SharedKey(key) => {
                let auth = authorization(
                    key,
                    &date,
                    &self.credentials.account_name,
                    &self.url_path()?,
                )?;
                self.agent.get(&url).header("Authorization", &auth)
            }
            StorageAuth::Sas(token) => self.agent.get(&format!("{url}?{token}")),
        };

        let mut response = request
            .header("x-ms-date", &date)
            .header("x-ms-version", STORAGE_API_VERSION)
            .call()
            .map_err(|e| fetch_error(&self.descriptor, e))?;

        let bytes = write_atomically(
            &mut response.body_mut().as_reader(),
            destination,
            &self.descriptor,
        )?;

        log::info!(
            "Downloaded {} ({} bytes) to {}",
            self.descriptor.local_file_name,
            bytes,
            destination.display()
        );
        Ok(())
    }
}
