//! Request/response bodies for the Boundary (spec §6 HTTP surface).

use serde::{Deserialize, Serialize};

use crate::manager::{CreateStreamRequest, UpdateStreamRequest};
use crate::model::{Protocol, Stream};

#[derive(Debug, Deserialize)]
pub struct CreateStreamDto {
    pub uri: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub protocol: Protocol,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub recording: bool,
    #[serde(default)]
    pub data_retention_hours: i64,
}

fn default_true() -> bool {
    true
}

impl From<CreateStreamDto> for CreateStreamRequest {
    fn from(dto: CreateStreamDto) -> Self {
        CreateStreamRequest {
            uri: dto.uri,
            username: dto.username,
            password: dto.password,
            protocol: dto.protocol,
            enabled: dto.enabled,
            recording: dto.recording,
            data_retention_hours: dto.data_retention_hours,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateStreamDto {
    pub username: Option<String>,
    pub password: Option<String>,
    pub enabled: Option<bool>,
    pub recording: Option<bool>,
    pub data_retention_hours: Option<i64>,
}

impl From<UpdateStreamDto> for UpdateStreamRequest {
    fn from(dto: UpdateStreamDto) -> Self {
        UpdateStreamRequest {
            username: dto.username,
            password: dto.password,
            enabled: dto.enabled,
            recording: dto.recording,
            data_retention_hours: dto.data_retention_hours,
        }
    }
}

/// Stream response, including the runtime fields `Stream` itself skips when
/// serialized (spec §C: `pid` surfaces when running).
#[derive(Debug, Serialize)]
pub struct StreamDto {
    pub id: i64,
    pub uri: String,
    pub username: String,
    pub protocol: Protocol,
    pub enabled: bool,
    pub recording: bool,
    pub data_retention_hours: i64,
    pub created: u64,
    pub status: String,
    pub pid: Option<u32>,
}

impl From<&Stream> for StreamDto {
    fn from(s: &Stream) -> Self {
        StreamDto {
            id: s.id,
            uri: s.uri.clone(),
            username: s.username.clone(),
            protocol: s.protocol,
            enabled: s.enabled,
            recording: s.recording,
            data_retention_hours: s.data_retention_hours,
            created: s.created,
            status: format!("{:?}", s.status),
            pid: s.pid,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StartStreamResponse {
    pub wait_cycles: u32,
}

/// One entry of the supplemented `GET /videos` listing (spec §C).
#[derive(Debug, Serialize)]
pub struct VideoDaysDto {
    pub stream_id: i64,
    pub days: Vec<String>,
}
