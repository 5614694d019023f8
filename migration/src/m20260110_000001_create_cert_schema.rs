use sea_orm_migration::prelude::extension::postgres::Type;
use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    #[allow(clippy::match_wildcard_for_single_variants)]
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Enable UUID extension for PostgreSQL
        if manager.get_database_backend() == sea_orm::DatabaseBackend::Postgres {
            manager
                .get_connection()
                .execute_unprepared("CREATE EXTENSION IF NOT EXISTS \"uuid-ossp\";")
                .await?;
        }

        // Create custom enum types for PostgreSQL (text fallback on SQLite)
        if manager.get_database_backend() == sea_orm::DatabaseBackend::Postgres {
            manager
                .create_type(
                    Type::create()
                        .as_enum(ServiceMethod::Table)
                        .values([
                            ServiceMethod::VisualTesting,
                            ServiceMethod::LiquidPenetrantTesting,
                            ServiceMethod::MagneticParticleTesting,
                            ServiceMethod::RadiographicTesting,
                            ServiceMethod::UltrasonicTesting,
                        ])
                        .to_owned(),
                )
                .await?;

            manager
                .create_type(
                    Type::create()
                        .as_enum(CertificateType::Table)
                        .values([CertificateType::Initial, CertificateType::Recertificate])
                        .to_owned(),
                )
                .await?;
        }

        // Create trainees table
        let mut trainees_table = Table::create()
            .table(Trainees::Table)
            .if_not_exists()
            .col(
                ColumnDef::new(Trainees::SerialNumber)
                    .string()
                    .not_null()
                    .unique_key(),
            )
            .col(ColumnDef::new(Trainees::PersonName).string().not_null())
            .col(ColumnDef::new(Trainees::Country).string())
            .col(ColumnDef::new(Trainees::State).string())
            .col(ColumnDef::new(Trainees::StreetAddress).text())
            .col(
                ColumnDef::new(Trainees::CreatedAt)
                    .timestamp_with_time_zone()
                    .not_null()
                    .default(Expr::current_timestamp()),
            )
            .col(
                ColumnDef::new(Trainees::LastUpdated)
                    .timestamp_with_time_zone()
                    .not_null()
                    .default(Expr::current_timestamp()),
            )
            .to_owned();

        // Add ID column with appropriate type and default based on database backend
        match manager.get_database_backend() {
            sea_orm::DatabaseBackend::Postgres => {
                trainees_table.col(
                    ColumnDef::new(Trainees::Id)
                        .uuid()
                        .not_null()
                        .primary_key()
                        .default(Expr::cust("uuid_generate_v4()")),
                );
            }
            sea_orm::DatabaseBackend::Sqlite => {
                trainees_table.col(ColumnDef::new(Trainees::Id).uuid().not_null().primary_key());
            }
            _ => {
                return Err(DbErr::Custom("Unsupported database backend".to_string()));
            }
        }

        manager.create_table(trainees_table).await?;

        // Create certificates table
        let mut certificates_table = Table::create()
            .table(Certificates::Table)
            .if_not_exists()
            .col(ColumnDef::new(Certificates::TraineeId).uuid().not_null())
            .col(
                ColumnDef::new(Certificates::ExpiryDate)
                    .timestamp_with_time_zone()
                    .not_null(),
            )
            .col(
                ColumnDef::new(Certificates::CreatedAt)
                    .timestamp_with_time_zone()
                    .not_null()
                    .default(Expr::current_timestamp()),
            )
            .col(
                ColumnDef::new(Certificates::LastUpdated)
                    .timestamp_with_time_zone()
                    .not_null()
                    .default(Expr::current_timestamp()),
            )
            .foreign_key(
                ForeignKey::create()
                    .name("certificates_trainee_id_fkey")
                    .from(Certificates::Table, Certificates::TraineeId)
                    .to(Trainees::Table, Trainees::Id)
                    .on_delete(ForeignKeyAction::Cascade)
                    .on_update(ForeignKeyAction::NoAction),
            )
            .to_owned();

        match manager.get_database_backend() {
            sea_orm::DatabaseBackend::Postgres => {
                certificates_table.col(
                    ColumnDef::new(Certificates::Id)
                        .uuid()
                        .not_null()
                        .primary_key()
                        .default(Expr::cust("uuid_generate_v4()")),
                );
                certificates_table.col(
                    ColumnDef::new(Certificates::ServiceMethod)
                        .custom(ServiceMethod::Table)
                        .not_null(),
                );
                certificates_table.col(
                    ColumnDef::new(Certificates::CertificateType)
                        .custom(CertificateType::Table)
                        .not_null(),
                );
            }
            sea_orm::DatabaseBackend::Sqlite => {
                certificates_table.col(
                    ColumnDef::new(Certificates::Id)
                        .uuid()
                        .not_null()
                        .primary_key(),
                );
                certificates_table.col(
                    ColumnDef::new(Certificates::ServiceMethod)
                        .text()
                        .not_null(),
                );
                certificates_table.col(
                    ColumnDef::new(Certificates::CertificateType)
                        .text()
                        .not_null(),
                );
            }
            _ => {
                return Err(DbErr::Custom("Unsupported database backend".to_string()));
            }
        }

        manager.create_table(certificates_table).await?;

        // One certificate per (trainee, service method)
        manager
            .create_index(
                Index::create()
                    .name("idx_certificates_trainee_method")
                    .table(Certificates::Table)
                    .col(Certificates::TraineeId)
                    .col(Certificates::ServiceMethod)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_certificates_expiry_date")
                    .table(Certificates::Table)
                    .col(Certificates::ExpiryDate)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Certificates::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Trainees::Table).if_exists().to_owned())
            .await?;

        if manager.get_database_backend() == sea_orm::DatabaseBackend::Postgres {
            manager
                .drop_type(Type::drop().name(ServiceMethod::Table).if_exists().to_owned())
                .await?;
            manager
                .drop_type(
                    Type::drop()
                        .name(CertificateType::Table)
                        .if_exists()
                        .to_owned(),
                )
                .await?;
        }

        Ok(())
    }
}

#[derive(DeriveIden)]
enum Trainees {
    Table,
    Id,
    SerialNumber,
    PersonName,
    Country,
    State,
    StreetAddress,
    CreatedAt,
    LastUpdated,
}

#[derive(DeriveIden)]
enum Certificates {
    Table,
    Id,
    TraineeId,
    ServiceMethod,
    CertificateType,
    ExpiryDate,
    CreatedAt,
    LastUpdated,
}

#[derive(DeriveIden)]
enum ServiceMethod {
    Table,
    VisualTesting,
    LiquidPenetrantTesting,
    MagneticParticleTesting,
    RadiographicTesting,
    UltrasonicTesting,
}

#[derive(DeriveIden)]
enum CertificateType {
    Table,
    Initial,
    Recertificate,
}
