use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// The slice of an employee's profile that attendance cares about.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
#[schema(
    example = json!({
        "id": 1000,
        "display_name": "Somchai P.",
        "allow_offsite_checkin": false,
        "is_active": true
    })
)]
pub struct EmployeeProfile {
    #[schema(example = 1000)]
    pub id: u64,

    #[schema(example = "Somchai P.")]
    pub display_name: String,

    /// Field staff may check in away from every registered location.
    #[schema(example = false)]
    pub allow_offsite_checkin: bool,

    #[schema(example = true)]
    pub is_active: bool,
}
