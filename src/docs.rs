use crate::api::attendance::{CheckInRequest, CheckOutRequest, EditRecordRequest, SplitResponse};
use crate::api::location::{LocationInput, ShiftInput};
use crate::attendance::checkin::CheckInPlan;
use crate::attendance::geofence::{LocationCheckResult, LocationDistance};
use crate::attendance::hours::HoursBreakdown;
use crate::attendance::shift_matcher::ShiftMatch;
use crate::attendance::sweep::{SweepFailure, SweepReport};
use crate::model::attendance::{AttendanceRecord, CheckInType, EditEntry, RecordStatus};
use crate::model::employee::EmployeeProfile;
use crate::model::location::{Coordinate, DayHours, Location, Shift, WeeklyHours};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi, openapi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "HRM Attendance API",
        version = "1.0.0",
        description = r#"
## Attendance & Geofencing

Time tracking for employees who work at one or more registered sites.

### 🔹 Key Features
- **Geofenced check-in**
  - Distance to every active location, nearest first
  - Off-site check-in for employees allowed to work away
- **Shifts**
  - Explicit selection or automatic match to the nearest start
  - Grace period and late minutes
  - Overnight shifts
- **Hours**
  - Regular and overtime split, break deduction
- **Auto checkout**
  - Records left open past the daily cutoff are closed for review
- **Corrections**
  - HR/Admin edits with full audit history, overnight split

### 🔐 Security
Endpoints under the API prefix need a **JWT Bearer** access token.
`/cron/auto-checkout` takes the shared cron secret as its bearer token.

---
Built with **Rust**, **Actix Web**, **SQLx**, and **Utoipa**.
"#,
    ),
    paths(
        crate::api::attendance::check_in,
        crate::api::attendance::check_out,
        crate::api::attendance::location_check,
        crate::api::attendance::my_records,
        crate::api::attendance::get_record,
        crate::api::attendance::edit_record,
        crate::api::attendance::split_record,

        crate::api::location::list_locations,
        crate::api::location::get_location,
        crate::api::location::create_location,
        crate::api::location::update_location,
        crate::api::location::delete_location,

        crate::api::cron::auto_checkout
    ),
    components(
        schemas(
            CheckInRequest,
            CheckOutRequest,
            EditRecordRequest,
            SplitResponse,
            CheckInPlan,
            LocationCheckResult,
            LocationDistance,
            ShiftMatch,
            HoursBreakdown,
            SweepReport,
            SweepFailure,
            AttendanceRecord,
            EditEntry,
            RecordStatus,
            CheckInType,
            EmployeeProfile,
            Coordinate,
            DayHours,
            WeeklyHours,
            Shift,
            Location,
            LocationInput,
            ShiftInput
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Attendance", description = "Check-in, check-out and record corrections"),
        (name = "Location", description = "Registered locations and their shifts"),
        (name = "Cron", description = "Scheduled jobs"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).bearer_format("JWT").build()),
        );
    }
}
