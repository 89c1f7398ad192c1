//! Migration to create the subscription_products table.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SubscriptionProducts::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SubscriptionProducts::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(SubscriptionProducts::Title)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(SubscriptionProducts::Description).text().null())
                    .col(
                        ColumnDef::new(SubscriptionProducts::SortOrder)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(SubscriptionProducts::Model).string().not_null())
                    .col(
                        ColumnDef::new(SubscriptionProducts::Public)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(SubscriptionProducts::Active)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(ColumnDef::new(SubscriptionProducts::Badge).string().null())
                    .col(ColumnDef::new(SubscriptionProducts::Features).json_binary().null())
                    .col(
                        ColumnDef::new(SubscriptionProducts::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(SubscriptionProducts::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(SubscriptionProducts::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum SubscriptionProducts {
    Table,
    Id,
    Title,
    Description,
    SortOrder,
    Model,
    Public,
    Active,
    Badge,
    Features,
    CreatedAt,
    UpdatedAt,
}
