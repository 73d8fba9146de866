use sqlx::MySqlPool;

use crate::model::employee::EmployeeProfile;

pub async fn fetch_profile(pool: &MySqlPool, id: u64) -> Result<Option<EmployeeProfile>, sqlx::Error> {
    sqlx::query_as::<_, EmployeeProfile>(
        r#"
        SELECT id, display_name, allow_offsite_checkin, is_active
        FROM employees
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}
