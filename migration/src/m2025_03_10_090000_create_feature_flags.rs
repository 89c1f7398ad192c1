//! Migration to create feature flags and their targeting filters.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(FeatureFlags::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(FeatureFlags::Id).uuid().not_null().primary_key())
                    .col(
                        ColumnDef::new(FeatureFlags::Name)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(FeatureFlags::Description).text().null())
                    .col(
                        ColumnDef::new(FeatureFlags::Enabled)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(FeatureFlags::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(FeatureFlags::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(FeatureFlagFilters::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(FeatureFlagFilters::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(FeatureFlagFilters::FeatureFlagId)
                            .uuid()
                            .not_null(),
                    )
                    .col(ColumnDef::new(FeatureFlagFilters::FilterType).string().not_null())
                    .col(ColumnDef::new(FeatureFlagFilters::Value).text().null())
                    .col(
                        ColumnDef::new(FeatureFlagFilters::SortOrder)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-feature_flag_filters-feature_flag_id")
                            .from(FeatureFlagFilters::Table, FeatureFlagFilters::FeatureFlagId)
                            .to(FeatureFlags::Table, FeatureFlags::Id)
                            .on_update(ForeignKeyAction::Cascade)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(FeatureFlagFilters::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(FeatureFlags::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum FeatureFlags {
    Table,
    Id,
    Name,
    Description,
    Enabled,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum FeatureFlagFilters {
    Table,
    Id,
    FeatureFlagId,
    FilterType,
    Value,
    SortOrder,
}
