//! Client identity lookup through the selected server's getIP endpoint

use crate::{
    client::Transport,
    error::{AppError, Result},
    models::ClientIdentity,
    servers::ServerEndpoints,
    types::DistanceUnit,
};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

/// What the getIP endpoint reported about the client
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IpInfo {
    /// One-line summary prepared by the server (IP, ISP, distance)
    pub summary: String,
    pub client: ClientIdentity,
}

/// Looks up the client's public identity
#[async_trait]
pub trait IpInfoProvider: Send + Sync {
    async fn lookup(&self, server: &ServerEndpoints) -> Result<IpInfo>;
}

#[derive(Debug, Deserialize)]
struct GetIpResponse {
    #[serde(rename = "processedString", default)]
    processed_string: String,
    #[serde(rename = "rawIspInfo", default)]
    raw_isp_info: serde_json::Value,
}

/// Queries `getIpURL?isp=true&distance=<unit>` on the selected server
pub struct HttpIpInfoProvider {
    transport: Arc<dyn Transport>,
    distance: DistanceUnit,
}

impl HttpIpInfoProvider {
    pub fn new(transport: Arc<dyn Transport>, distance: DistanceUnit) -> Self {
        Self { transport, distance }
    }
}

#[async_trait]
impl IpInfoProvider for HttpIpInfoProvider {
    async fn lookup(&self, server: &ServerEndpoints) -> Result<IpInfo> {
        let url = server.getip_url(self.distance.as_str());
        let response = self.transport.get(&url).await?.error_for_status("getIP endpoint")?;
        parse_getip_body(&response.body)
    }
}

/// Decode a getIP body; a body that is not JSON is a bare IP address
pub fn parse_getip_body(body: &str) -> Result<IpInfo> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Err(AppError::parse("getIP endpoint returned an empty body"));
    }

    let parsed: GetIpResponse = match serde_json::from_str(trimmed) {
        Ok(parsed) => parsed,
        Err(_) => {
            return Ok(IpInfo {
                summary: trimmed.to_string(),
                client: ClientIdentity::from_ip(trimmed),
            })
        }
    };

    // rawIspInfo is an empty string when the server has no ISP database
    let mut client = match parsed.raw_isp_info {
        serde_json::Value::Object(_) => serde_json::from_value::<ClientIdentity>(parsed.raw_isp_info)?,
        _ => ClientIdentity::default(),
    };

    if client.ip.is_empty() {
        client.ip = parsed
            .processed_string
            .split(" - ")
            .next()
            .unwrap_or_default()
            .trim()
            .to_string();
    }

    Ok(IpInfo {
        summary: parsed.processed_string,
        client,
    })
}
