//! Migration to create usage-based prices and their tiers.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SubscriptionUsageBasedPrices::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SubscriptionUsageBasedPrices::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(SubscriptionUsageBasedPrices::ProductId).uuid().not_null())
                    .col(ColumnDef::new(SubscriptionUsageBasedPrices::Unit).string().not_null())
                    .col(ColumnDef::new(SubscriptionUsageBasedPrices::UnitTitle).string().not_null())
                    .col(
                        ColumnDef::new(SubscriptionUsageBasedPrices::UnitTitlePlural)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(SubscriptionUsageBasedPrices::Currency).string().not_null())
                    .col(
                        ColumnDef::new(SubscriptionUsageBasedPrices::BillingPeriod)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(SubscriptionUsageBasedPrices::TiersMode).string().not_null())
                    .col(
                        ColumnDef::new(SubscriptionUsageBasedPrices::Aggregation)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SubscriptionUsageBasedPrices::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-usage_based_prices-product_id")
                            .from(SubscriptionUsageBasedPrices::Table, SubscriptionUsageBasedPrices::ProductId)
                            .to(SubscriptionProducts::Table, SubscriptionProducts::Id)
                            .on_update(ForeignKeyAction::Cascade)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(SubscriptionUsageBasedTiers::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SubscriptionUsageBasedTiers::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(SubscriptionUsageBasedTiers::UsageBasedPriceId)
                            .uuid()
                            .not_null(),
                    )
                    .col(ColumnDef::new(SubscriptionUsageBasedTiers::FromUnits).big_integer().not_null())
                    .col(ColumnDef::new(SubscriptionUsageBasedTiers::ToUnits).big_integer().null())
                    .col(ColumnDef::new(SubscriptionUsageBasedTiers::PerUnitPrice).double().null())
                    .col(ColumnDef::new(SubscriptionUsageBasedTiers::FlatFeePrice).double().null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-usage_based_tiers-usage_based_price_id")
                            .from(SubscriptionUsageBasedTiers::Table, SubscriptionUsageBasedTiers::UsageBasedPriceId)
                            .to(SubscriptionUsageBasedPrices::Table, SubscriptionUsageBasedPrices::Id)
                            .on_update(ForeignKeyAction::Cascade)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(SubscriptionUsageBasedTiers::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(SubscriptionUsageBasedPrices::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum SubscriptionUsageBasedPrices {
    Table,
    Id,
    ProductId,
    Unit,
    UnitTitle,
    UnitTitlePlural,
    Currency,
    BillingPeriod,
    TiersMode,
    Aggregation,
    CreatedAt,
}

#[derive(DeriveIden)]
enum SubscriptionUsageBasedTiers {
    Table,
    Id,
    UsageBasedPriceId,
    FromUnits,
    ToUnits,
    PerUnitPrice,
    FlatFeePrice,
}

#[derive(DeriveIden)]
enum SubscriptionProducts {
    Table,
    Id,
}
