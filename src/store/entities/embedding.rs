use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::domain;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "embeddings")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    #[sea_orm(indexed)]
    pub asset_id: String,
    pub modality: String,
    pub model_name: String,
    pub model_version: String,
    pub dim: i32,
    pub device: String,
    pub vector_ref: String,
    pub checksum: String,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn into_domain(self) -> domain::Embedding {
        let mut checksum = [0u8; 32];
        if let Ok(bytes) = hex::decode(&self.checksum) {
            if bytes.len() == 32 {
                checksum.copy_from_slice(&bytes);
            }
        }
        domain::Embedding {
            id: self.id.parse().unwrap_or_default(),
            asset_id: self.asset_id.parse().unwrap_or_default(),
            modality: self.modality.parse().unwrap_or(domain::Modality::Image),
            model_name: self.model_name,
            model_version: self.model_version,
            dim: self.dim as u32,
            device: self.device,
            vector_ref: self.vector_ref,
            checksum,
            created_at: self.created_at,
        }
    }
}

pub fn active_model_from(embedding: &domain::Embedding) -> ActiveModel {
    use sea_orm::ActiveValue::Set;
    ActiveModel {
        id: Set(embedding.id.to_string()),
        asset_id: Set(embedding.asset_id.to_string()),
        modality: Set(embedding.modality.to_string()),
        model_name: Set(embedding.model_name.clone()),
        model_version: Set(embedding.model_version.clone()),
        dim: Set(embedding.dim as i32),
        device: Set(embedding.device.clone()),
        vector_ref: Set(embedding.vector_ref.clone()),
        checksum: Set(hex::encode(embedding.checksum)),
        created_at: Set(embedding.created_at),
    }
}
