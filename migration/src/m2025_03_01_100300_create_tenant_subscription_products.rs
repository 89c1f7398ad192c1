//! Migration to create the tenant_subscription_products table.
//!
//! Links a tenant to the products it is subscribed to. Feature-flag
//! `tenant.subscription.*` filters read from here.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(TenantSubscriptionProducts::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(TenantSubscriptionProducts::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(TenantSubscriptionProducts::TenantId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(TenantSubscriptionProducts::ProductId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(TenantSubscriptionProducts::Active)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(TenantSubscriptionProducts::Quantity)
                            .integer()
                            .not_null()
                            .default(1),
                    )
                    .col(
                        ColumnDef::new(TenantSubscriptionProducts::EndsAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(TenantSubscriptionProducts::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-tenant_subscription_products-tenant_id")
                            .from(
                                TenantSubscriptionProducts::Table,
                                TenantSubscriptionProducts::TenantId,
                            )
                            .to(Tenants::Table, Tenants::Id)
                            .on_update(ForeignKeyAction::Cascade)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-tenant_subscription_products-product_id")
                            .from(
                                TenantSubscriptionProducts::Table,
                                TenantSubscriptionProducts::ProductId,
                            )
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
                    .name("idx_tenant_subscription_products_tenant_product")
                    .table(TenantSubscriptionProducts::Table)
                    .col(TenantSubscriptionProducts::TenantId)
                    .col(TenantSubscriptionProducts::ProductId)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(
                Table::drop()
                    .table(TenantSubscriptionProducts::Table)
                    .to_owned(),
            )
            .await
    }
}

#[derive(DeriveIden)]
enum TenantSubscriptionProducts {
    Table,
    Id,
    TenantId,
    ProductId,
    Active,
    Quantity,
    EndsAt,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Tenants {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum SubscriptionProducts {
    Table,
    Id,
}
