//! Migration to create the subscription_prices table.
//!
//! One row per (product, billing period, currency). Amounts are stored in
//! major currency units.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SubscriptionPrices::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SubscriptionPrices::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(SubscriptionPrices::ProductId).uuid().not_null())
                    .col(
                        ColumnDef::new(SubscriptionPrices::BillingPeriod)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(SubscriptionPrices::Currency).string().not_null())
                    .col(ColumnDef::new(SubscriptionPrices::Amount).double().not_null())
                    .col(
                        ColumnDef::new(SubscriptionPrices::Active)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(SubscriptionPrices::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-subscription_prices-product_id")
                            .from(SubscriptionPrices::Table, SubscriptionPrices::ProductId)
                            .to(SubscriptionProducts::Table, SubscriptionProducts::Id)
                            .on_update(ForeignKeyAction::Cascade)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_subscription_prices_product_period_currency")
                    .table(SubscriptionPrices::Table)
                    .col(SubscriptionPrices::ProductId)
                    .col(SubscriptionPrices::BillingPeriod)
                    .col(SubscriptionPrices::Currency)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(SubscriptionPrices::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum SubscriptionPrices {
    Table,
    Id,
    ProductId,
    BillingPeriod,
    Currency,
    Amount,
    Active,
    CreatedAt,
}

#[derive(DeriveIden)]
enum SubscriptionProducts {
    Table,
    Id,
}
