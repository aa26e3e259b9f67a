use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::domain;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "face_detections")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    #[sea_orm(indexed)]
    pub asset_id: String,
    pub face_index: i32,
    pub bbox_x: i32,
    pub bbox_y: i32,
    pub bbox_w: i32,
    pub bbox_h: i32,
    pub confidence: f32,
    pub embedding_ref: Option<String>,
    pub embedding_pending: bool,
    #[sea_orm(indexed)]
    pub person_id: Option<String>,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn into_domain(self) -> domain::FaceDetection {
        domain::FaceDetection {
            id: self.id.parse().unwrap_or_default(),
            asset_id: self.asset_id.parse().unwrap_or_default(),
            face_index: self.face_index as u32,
            bbox: domain::face::BoundingBox {
                x: self.bbox_x as u32,
                y: self.bbox_y as u32,
                w: self.bbox_w as u32,
                h: self.bbox_h as u32,
            },
            confidence: self.confidence,
            embedding_ref: self.embedding_ref,
            embedding_pending: self.embedding_pending,
            person_id: self.person_id.and_then(|s| s.parse().ok()),
            created_at: self.created_at,
        }
    }
}

pub fn active_model_from(face: &domain::FaceDetection) -> ActiveModel {
    use sea_orm::ActiveValue::Set;
    ActiveModel {
        id: Set(face.id.to_string()),
        asset_id: Set(face.asset_id.to_string()),
        face_index: Set(face.face_index as i32),
        bbox_x: Set(face.bbox.x as i32),
        bbox_y: Set(face.bbox.y as i32),
        bbox_w: Set(face.bbox.w as i32),
        bbox_h: Set(face.bbox.h as i32),
        confidence: Set(face.confidence),
        embedding_ref: Set(face.embedding_ref.clone()),
        embedding_pending: Set(face.embedding_pending),
        person_id: Set(face.person_id.map(|id| id.to_string())),
        created_at: Set(face.created_at),
    }
}
