//! Database migrations for the back-office service.
//!
//! This module contains all database migrations using SeaORM Migration.

pub use sea_orm_migration::prelude::*;

mod m2024_01_01_000001_create_tenants;
mod m2025_03_01_100000_create_subscription_products;
mod m2025_03_01_100100_create_subscription_prices;
mod m2025_03_01_100200_create_usage_based_prices;
mod m2025_03_01_100300_create_tenant_subscription_products;
mod m2025_03_10_090000_create_feature_flags;
mod m2025_03_20_090000_create_formulas;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2024_01_01_000001_create_tenants::Migration),
            Box::new(m2025_03_01_100000_create_subscription_products::Migration),
            Box::new(m2025_03_01_100100_create_subscription_prices::Migration),
            Box::new(m2025_03_01_100200_create_usage_based_prices::Migration),
            Box::new(m2025_03_01_100300_create_tenant_subscription_products::Migration),
            Box::new(m2025_03_10_090000_create_feature_flags::Migration),
            Box::new(m2025_03_20_090000_create_formulas::Migration),
        ]
    }
}
