//! Initial migration: creates the assets, tasks, embeddings, captions,
//! face_detections and persons tables plus their query indexes.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Assets::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Assets::Id).string().not_null().primary_key())
                    .col(ColumnDef::new(Assets::Sha256).string().not_null().unique_key())
                    .col(ColumnDef::new(Assets::PerceptualHash).big_integer().not_null())
                    .col(ColumnDef::new(Assets::Path).string().not_null())
                    .col(ColumnDef::new(Assets::Mime).string().not_null())
                    .col(ColumnDef::new(Assets::Width).integer().not_null())
                    .col(ColumnDef::new(Assets::Height).integer().not_null())
                    .col(ColumnDef::new(Assets::Orientation).integer().not_null())
                    .col(ColumnDef::new(Assets::TakenAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(Assets::Camera).string())
                    .col(ColumnDef::new(Assets::GpsLat).double())
                    .col(ColumnDef::new(Assets::GpsLon).double())
                    .col(ColumnDef::new(Assets::SizeBytes).big_integer().not_null())
                    .col(
                        ColumnDef::new(Assets::ImportedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Assets::Status).string().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_assets_perceptual_hash")
                    .table(Assets::Table)
                    .col(Assets::PerceptualHash)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Tasks::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Tasks::Id).string().not_null().primary_key())
                    .col(ColumnDef::new(Tasks::TypeName).string().not_null())
                    .col(ColumnDef::new(Tasks::Payload).binary().not_null())
                    .col(ColumnDef::new(Tasks::State).string().not_null())
                    .col(ColumnDef::new(Tasks::Priority).integer().not_null())
                    .col(ColumnDef::new(Tasks::RetryCount).integer().not_null())
                    .col(ColumnDef::new(Tasks::MaxRetries).integer().not_null())
                    .col(ColumnDef::new(Tasks::LastError).string())
                    .col(
                        ColumnDef::new(Tasks::ScheduledAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Tasks::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Tasks::StartedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(Tasks::FinishedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(Tasks::ProgressCurrent).big_integer())
                    .col(ColumnDef::new(Tasks::ProgressTotal).big_integer())
                    .col(
                        ColumnDef::new(Tasks::CancelRequested)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(Tasks::IdempotencyKey).string().unique_key())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_tasks_claim_order")
                    .table(Tasks::Table)
                    .col(Tasks::State)
                    .col(Tasks::Priority)
                    .col(Tasks::ScheduledAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Embeddings::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Embeddings::Id).string().not_null().primary_key())
                    .col(ColumnDef::new(Embeddings::AssetId).string().not_null())
                    .col(ColumnDef::new(Embeddings::Modality).string().not_null())
                    .col(ColumnDef::new(Embeddings::ModelName).string().not_null())
                    .col(ColumnDef::new(Embeddings::ModelVersion).string().not_null())
                    .col(ColumnDef::new(Embeddings::Dim).integer().not_null())
                    .col(ColumnDef::new(Embeddings::Device).string().not_null())
                    .col(ColumnDef::new(Embeddings::VectorRef).string().not_null())
                    .col(ColumnDef::new(Embeddings::Checksum).string().not_null())
                    .col(
                        ColumnDef::new(Embeddings::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(Embeddings::Table, Embeddings::AssetId)
                            .to(Assets::Table, Assets::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_embeddings_identity")
                    .table(Embeddings::Table)
                    .col(Embeddings::AssetId)
                    .col(Embeddings::Modality)
                    .col(Embeddings::ModelName)
                    .col(Embeddings::ModelVersion)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Captions::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Captions::Id).string().not_null().primary_key())
                    .col(ColumnDef::new(Captions::AssetId).string().not_null())
                    .col(ColumnDef::new(Captions::Text).text().not_null())
                    .col(ColumnDef::new(Captions::Provider).string().not_null())
                    .col(ColumnDef::new(Captions::ModelVersion).string().not_null())
                    .col(
                        ColumnDef::new(Captions::UserEdited)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Captions::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Captions::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(Captions::Table, Captions::AssetId)
                            .to(Assets::Table, Assets::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_captions_asset_provider_version")
                    .table(Captions::Table)
                    .col(Captions::AssetId)
                    .col(Captions::Provider)
                    .col(Captions::ModelVersion)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Persons::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Persons::Id).string().not_null().primary_key())
                    .col(ColumnDef::new(Persons::DisplayName).string())
                    .col(ColumnDef::new(Persons::Centroid).binary().not_null())
                    .col(
                        ColumnDef::new(Persons::MemberCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Persons::Active)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(Persons::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Persons::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(FaceDetections::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(FaceDetections::Id).string().not_null().primary_key())
                    .col(ColumnDef::new(FaceDetections::AssetId).string().not_null())
                    .col(ColumnDef::new(FaceDetections::FaceIndex).integer().not_null())
                    .col(ColumnDef::new(FaceDetections::BboxX).integer().not_null())
                    .col(ColumnDef::new(FaceDetections::BboxY).integer().not_null())
                    .col(ColumnDef::new(FaceDetections::BboxW).integer().not_null())
                    .col(ColumnDef::new(FaceDetections::BboxH).integer().not_null())
                    .col(ColumnDef::new(FaceDetections::Confidence).float().not_null())
                    .col(ColumnDef::new(FaceDetections::EmbeddingRef).string())
                    .col(
                        ColumnDef::new(FaceDetections::EmbeddingPending)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(ColumnDef::new(FaceDetections::PersonId).string())
                    .col(
                        ColumnDef::new(FaceDetections::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(FaceDetections::Table, FaceDetections::AssetId)
                            .to(Assets::Table, Assets::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(FaceDetections::Table, FaceDetections::PersonId)
                            .to(Persons::Table, Persons::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_face_detections_asset")
                    .table(FaceDetections::Table)
                    .col(FaceDetections::AssetId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_face_detections_person")
                    .table(FaceDetections::Table)
                    .col(FaceDetections::PersonId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(FaceDetections::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Persons::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Captions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Embeddings::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Tasks::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Assets::Table).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(Iden)]
enum Assets {
    Table,
    Id,
    Sha256,
    PerceptualHash,
    Path,
    Mime,
    Width,
    Height,
    Orientation,
    TakenAt,
    Camera,
    GpsLat,
    GpsLon,
    SizeBytes,
    ImportedAt,
    Status,
}

#[derive(Iden)]
enum Tasks {
    Table,
    Id,
    TypeName,
    Payload,
    State,
    Priority,
    RetryCount,
    MaxRetries,
    LastError,
    ScheduledAt,
    CreatedAt,
    StartedAt,
    FinishedAt,
    ProgressCurrent,
    ProgressTotal,
    CancelRequested,
    IdempotencyKey,
}

#[derive(Iden)]
enum Embeddings {
    Table,
    Id,
    AssetId,
    Modality,
    ModelName,
    ModelVersion,
    Dim,
    Device,
    VectorRef,
    Checksum,
    CreatedAt,
}

#[derive(Iden)]
enum Captions {
    Table,
    Id,
    AssetId,
    Text,
    Provider,
    ModelVersion,
    UserEdited,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum Persons {
    Table,
    Id,
    DisplayName,
    Centroid,
    MemberCount,
    Active,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum FaceDetections {
    Table,
    Id,
    AssetId,
    FaceIndex,
    BboxX,
    BboxY,
    BboxW,
    BboxH,
    Confidence,
    EmbeddingRef,
    EmbeddingPending,
    PersonId,
    CreatedAt,
}
