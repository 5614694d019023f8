use chrono::{DateTime, Utc};
use crudcrate::EntityToModels;
use sea_orm::entity::prelude::*;
// Import after EntityToModels to avoid conflicts
use uuid::Uuid;

/// The five NDT service methods a trainee can hold a certificate for.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, EnumIter, DeriveActiveEnum, ToSchema, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "service_method")]
#[serde(rename_all = "snake_case")]
pub enum ServiceMethod {
    #[sea_orm(string_value = "visual_testing")]
    VisualTesting,
    #[sea_orm(string_value = "liquid_penetrant_testing")]
    LiquidPenetrantTesting,
    #[sea_orm(string_value = "magnetic_particle_testing")]
    MagneticParticleTesting,
    #[sea_orm(string_value = "radiographic_testing")]
    RadiographicTesting,
    #[sea_orm(string_value = "ultrasonic_testing")]
    UltrasonicTesting,
}

impl ServiceMethod {
    /// Sheet column order used by the source workbooks.
    pub const ALL: [ServiceMethod; 5] = [
        ServiceMethod::VisualTesting,
        ServiceMethod::LiquidPenetrantTesting,
        ServiceMethod::MagneticParticleTesting,
        ServiceMethod::RadiographicTesting,
        ServiceMethod::UltrasonicTesting,
    ];

    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            ServiceMethod::VisualTesting => "VT",
            ServiceMethod::LiquidPenetrantTesting => "PT",
            ServiceMethod::MagneticParticleTesting => "MT",
            ServiceMethod::RadiographicTesting => "RT",
            ServiceMethod::UltrasonicTesting => "UT",
        }
    }

    #[must_use]
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_ascii_uppercase().as_str() {
            "VT" => Some(ServiceMethod::VisualTesting),
            "PT" => Some(ServiceMethod::LiquidPenetrantTesting),
            "MT" => Some(ServiceMethod::MagneticParticleTesting),
            "RT" => Some(ServiceMethod::RadiographicTesting),
            "UT" => Some(ServiceMethod::UltrasonicTesting),
            _ => None,
        }
    }
}

#[derive(
    Debug, Copy, Clone, PartialEq, Eq, EnumIter, DeriveActiveEnum, ToSchema, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "certificate_type")]
#[serde(rename_all = "snake_case")]
pub enum CertificateType {
    #[sea_orm(string_value = "initial")]
    Initial,
    #[sea_orm(string_value = "recertificate")]
    Recertificate,
}

impl CertificateType {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            CertificateType::Initial => "Initial",
            CertificateType::Recertificate => "Recertificate",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, EntityToModels)]
#[sea_orm(table_name = "certificates")]
#[crudcrate(api_struct = "Certificate")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    #[crudcrate(primary_key, update_model = false, create_model = false, on_create = Uuid::new_v4())]
    pub id: Uuid,
    #[crudcrate(sortable, filterable)]
    pub trainee_id: Uuid,
    #[crudcrate(sortable, filterable, enum_field)]
    pub service_method: ServiceMethod,
    #[crudcrate(sortable, filterable, enum_field)]
    pub certificate_type: CertificateType,
    #[crudcrate(sortable, filterable)]
    pub expiry_date: DateTime<Utc>,
    #[crudcrate(update_model = false, create_model = false, on_create = chrono::Utc::now(), sortable, list_model = false)]
    pub created_at: DateTime<Utc>,
    #[crudcrate(update_model = false, create_model = false, on_update = chrono::Utc::now(), on_create = chrono::Utc::now(), sortable)]
    pub last_updated: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "crate::trainees::models::Entity",
        from = "Column::TraineeId",
        to = "crate::trainees::models::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Trainees,
}

impl Related<crate::trainees::models::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Trainees.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry_date < now
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_codes_round_trip() {
        for method in ServiceMethod::ALL {
            assert_eq!(ServiceMethod::from_code(method.code()), Some(method));
        }
        assert_eq!(ServiceMethod::from_code(" ut "), Some(ServiceMethod::UltrasonicTesting));
        assert_eq!(ServiceMethod::from_code("XX"), None);
    }

    #[test]
    fn sheet_order_is_vt_pt_mt_rt_ut() {
        let codes: Vec<&str> = ServiceMethod::ALL.iter().map(|m| m.code()).collect();
        assert_eq!(codes, vec!["VT", "PT", "MT", "RT", "UT"]);
    }
}
