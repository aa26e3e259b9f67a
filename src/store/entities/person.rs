use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::domain;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "persons")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub display_name: Option<String>,
    /// MessagePack-encoded `Vec<f32>` centroid.
    pub centroid: Vec<u8>,
    pub member_count: i32,
    pub active: bool,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn into_domain(self) -> Result<domain::Person, rmp_serde::decode::Error> {
        let centroid: Vec<f32> = rmp_serde::from_slice(&self.centroid)?;
        Ok(domain::Person {
            id: self.id.parse().unwrap_or_default(),
            display_name: self.display_name,
            centroid,
            member_count: self.member_count as u32,
            active: self.active,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

pub fn active_model_from(person: &domain::Person) -> Result<ActiveModel, rmp_serde::encode::Error> {
    use sea_orm::ActiveValue::Set;
    let centroid = rmp_serde::to_vec(&person.centroid)?;
    Ok(ActiveModel {
        id: Set(person.id.to_string()),
        display_name: Set(person.display_name.clone()),
        centroid: Set(centroid),
        member_count: Set(person.member_count as i32),
        active: Set(person.active),
        created_at: Set(person.created_at),
        updated_at: Set(person.updated_at),
    })
}
