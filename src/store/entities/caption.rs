use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::domain;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "captions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    #[sea_orm(indexed)]
    pub asset_id: String,
    pub text: String,
    pub provider: String,
    pub model_version: String,
    pub user_edited: bool,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn into_domain(self) -> domain::Caption {
        domain::Caption {
            id: self.id.parse().unwrap_or_default(),
            asset_id: self.asset_id.parse().unwrap_or_default(),
            text: self.text,
            provider: self.provider,
            model_version: self.model_version,
            user_edited: self.user_edited,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

pub fn active_model_from(caption: &domain::Caption) -> ActiveModel {
    use sea_orm::ActiveValue::Set;
    ActiveModel {
        id: Set(caption.id.to_string()),
        asset_id: Set(caption.asset_id.to_string()),
        text: Set(caption.text.clone()),
        provider: Set(caption.provider.clone()),
        model_version: Set(caption.model_version.clone()),
        user_edited: Set(caption.user_edited),
        created_at: Set(caption.created_at),
        updated_at: Set(caption.updated_at),
    }
}
