//! Migration to create formulas, their ordered components and calculation logs.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Formulas::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Formulas::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Formulas::Name).string().not_null().unique_key())
                    .col(ColumnDef::new(Formulas::Description).text().null())
                    .col(ColumnDef::new(Formulas::ResultAs).string().not_null())
                    .col(
                        ColumnDef::new(Formulas::CalculationTrigger)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Formulas::WithLogs)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Formulas::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Formulas::UpdatedAt)
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
                    .table(FormulaComponents::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(FormulaComponents::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(FormulaComponents::FormulaId).uuid().not_null())
                    .col(ColumnDef::new(FormulaComponents::SortOrder).integer().not_null())
                    .col(
                        ColumnDef::new(FormulaComponents::ComponentType)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(FormulaComponents::Value).text().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-formula_components-formula_id")
                            .from(FormulaComponents::Table, FormulaComponents::FormulaId)
                            .to(Formulas::Table, Formulas::Id)
                            .on_update(ForeignKeyAction::Cascade)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(FormulaLogs::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(FormulaLogs::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(FormulaLogs::FormulaId).uuid().not_null())
                    .col(ColumnDef::new(FormulaLogs::Expression).text().not_null())
                    .col(ColumnDef::new(FormulaLogs::Variables).json_binary().null())
                    .col(ColumnDef::new(FormulaLogs::Result).text().null())
                    .col(ColumnDef::new(FormulaLogs::Error).text().null())
                    .col(
                        ColumnDef::new(FormulaLogs::DurationMs)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(FormulaLogs::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-formula_logs-formula_id")
                            .from(FormulaLogs::Table, FormulaLogs::FormulaId)
                            .to(Formulas::Table, Formulas::Id)
                            .on_update(ForeignKeyAction::Cascade)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(FormulaLogs::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(FormulaComponents::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Formulas::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Formulas {
    Table,
    Id,
    Name,
    Description,
    ResultAs,
    CalculationTrigger,
    WithLogs,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum FormulaComponents {
    Table,
    Id,
    FormulaId,
    SortOrder,
    ComponentType,
    Value,
}

#[derive(DeriveIden)]
enum FormulaLogs {
    Table,
    Id,
    FormulaId,
    Expression,
    Variables,
    Result,
    Error,
    DurationMs,
    CreatedAt,
}
