use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::domain;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "assets")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    #[sea_orm(unique)]
    pub sha256: String,
    pub perceptual_hash: i64,
    pub path: String,
    pub mime: String,
    pub width: i32,
    pub height: i32,
    pub orientation: i32,
    pub taken_at: Option<DateTimeUtc>,
    pub camera: Option<String>,
    pub gps_lat: Option<f64>,
    pub gps_lon: Option<f64>,
    pub size_bytes: i64,
    pub imported_at: DateTimeUtc,
    pub status: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn into_domain(self) -> domain::Asset {
        let mut sha = [0u8; 32];
        if let Ok(bytes) = hex::decode(&self.sha256) {
            if bytes.len() == 32 {
                sha.copy_from_slice(&bytes);
            }
        }
        domain::Asset {
            id: self.id.parse().unwrap_or_default(),
            path: self.path,
            sha256: sha,
            perceptual_hash: self.perceptual_hash as u64,
            mime: self.mime,
            width: self.width as u32,
            height: self.height as u32,
            orientation: self.orientation as u16,
            taken_at: self.taken_at.map(|d| DateTime::<Utc>::from(d)),
            camera: self.camera,
            gps: match (self.gps_lat, self.gps_lon) {
                (Some(lat), Some(lon)) => Some((lat, lon)),
                _ => None,
            },
            size_bytes: self.size_bytes as u64,
            imported_at: self.imported_at,
            status: match self.status.as_str() {
                "missing" => domain::AssetStatus::Missing,
                "error" => domain::AssetStatus::Error,
                _ => domain::AssetStatus::Active,
            },
        }
    }
}

pub fn active_model_from(asset: &domain::Asset) -> ActiveModel {
    use sea_orm::ActiveValue::Set;
    ActiveModel {
        id: Set(asset.id.to_string()),
        sha256: Set(asset.sha256_hex()),
        perceptual_hash: Set(asset.perceptual_hash as i64),
        path: Set(asset.path.clone()),
        mime: Set(asset.mime.clone()),
        width: Set(asset.width as i32),
        height: Set(asset.height as i32),
        orientation: Set(asset.orientation as i32),
        taken_at: Set(asset.taken_at.map(Into::into)),
        camera: Set(asset.camera.clone()),
        gps_lat: Set(asset.gps.map(|g| g.0)),
        gps_lon: Set(asset.gps.map(|g| g.1)),
        size_bytes: Set(asset.size_bytes as i64),
        imported_at: Set(asset.imported_at),
        status: Set(asset.status.to_string()),
    }
}
