use super::certificates::models::Certificate;
use chrono::{DateTime, Utc};
use crudcrate::{CRUDResource, EntityToModels};
use sea_orm::entity::prelude::*;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, EntityToModels)]
#[sea_orm(table_name = "trainees")]
#[crudcrate(
    generate_router,
    api_struct = "Trainee",
    name_singular = "trainee",
    name_plural = "trainees",
    description = "Trainees are the people tracked by the registry. Each trainee is identified by a unique serial number and holds at most one certificate per service method.",
    fn_get_one = get_one_trainee,
)]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    #[crudcrate(primary_key, update_model = false, create_model = false, on_create = Uuid::new_v4())]
    pub id: Uuid,
    #[sea_orm(unique, column_type = "Text")]
    #[crudcrate(sortable, filterable, fulltext)]
    pub serial_number: String,
    #[sea_orm(column_type = "Text")]
    #[crudcrate(sortable, filterable, fulltext)]
    pub person_name: String,
    #[sea_orm(column_type = "Text", nullable)]
    #[crudcrate(sortable, filterable, fulltext)]
    pub country: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    #[crudcrate(sortable, filterable, fulltext)]
    pub state: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    #[crudcrate(filterable, fulltext)]
    pub street_address: Option<String>,
    #[crudcrate(update_model = false, create_model = false, on_create = chrono::Utc::now(), sortable, list_model = false)]
    pub created_at: DateTime<Utc>,
    #[crudcrate(update_model = false, create_model = false, on_update = chrono::Utc::now(), on_create = chrono::Utc::now(), sortable)]
    pub last_updated: DateTime<Utc>,
    #[sea_orm(ignore)]
    #[crudcrate(non_db_attr = true, default = None, list_model = false, create_model = false, update_model = false)]
    pub certificates: Option<Vec<Certificate>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::certificates::models::Entity")]
    Certificates,
}

impl Related<super::certificates::models::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Certificates.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Custom `get_one` that loads the trainee's certificates alongside the record
async fn get_one_trainee(db: &DatabaseConnection, id: Uuid) -> Result<Trainee, DbErr> {
    let rows = Entity::find_by_id(id)
        .find_with_related(super::certificates::models::Entity)
        .all(db)
        .await?;

    let (trainee_model, certificate_models) = rows
        .into_iter()
        .next()
        .ok_or_else(|| DbErr::RecordNotFound("Trainee not found".to_string()))?;

    let mut trainee: Trainee = trainee_model.into();
    trainee.certificates = Some(
        certificate_models
            .into_iter()
            .map(std::convert::Into::into)
            .collect(),
    );

    Ok(trainee)
}
