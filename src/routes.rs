use crate::{
    api::{attendance, cron, location},
    auth::middleware::auth_middleware,
    config::Config,
};
use actix_governor::{
    Governor, GovernorConfigBuilder, PeerIpKeyExtractor, governor::middleware::NoOpMiddleware,
};
use actix_web::{middleware::from_fn, web};
use std::sync::Arc;

// Helper to build per-route limiter
fn build_limiter(requests_per_min: u32) -> Governor<PeerIpKeyExtractor, NoOpMiddleware> {
    let requests_per_min = requests_per_min.max(1);
    let cfg = GovernorConfigBuilder::default()
        .per_millisecond((60_000 / requests_per_min as u64).max(1))
        .burst_size(requests_per_min)
        .key_extractor(PeerIpKeyExtractor)
        .finish()
        .expect("period and burst size are non-zero");
    Governor::new(&cfg)
}

pub fn configure(cfg: &mut web::ServiceConfig, config: Config) {
    let checkin_limiter = Arc::new(build_limiter(config.rate_checkin_per_min));
    let protected_limiter = Arc::new(build_limiter(config.rate_protected_per_min));

    // Scheduler hook, guarded by the cron secret instead of a user token
    cfg.service(
        web::scope("/cron")
            .wrap(protected_limiter.clone())
            .route("/auto-checkout", web::post().to(cron::auto_checkout)),
    );

    // Protected routes
    cfg.service(
        web::scope(&config.api_prefix)
            .wrap(from_fn(auth_middleware)) // authentication
            .wrap(protected_limiter) // rate limiting
            .service(
                web::scope("/attendance")
                    // /attendance/check-in
                    .service(
                        web::resource("/check-in")
                            .wrap(checkin_limiter.clone())
                            .route(web::post().to(attendance::check_in)),
                    )
                    // /attendance/check-out
                    .service(
                        web::resource("/check-out")
                            .wrap(checkin_limiter)
                            .route(web::put().to(attendance::check_out)),
                    )
                    .service(web::resource("/location-check").route(web::get().to(attendance::location_check)))
                    .service(web::resource("/me").route(web::get().to(attendance::my_records)))
                    // /attendance/records/{id}
                    .service(
                        web::resource("/records/{id}")
                            .route(web::get().to(attendance::get_record))
                            .route(web::patch().to(attendance::edit_record)),
                    )
                    .service(
                        web::resource("/records/{id}/split").route(web::post().to(attendance::split_record)),
                    ),
            )
            .service(
                web::scope("/locations")
                    // /locations
                    .service(
                        web::resource("")
                            .route(web::get().to(location::list_locations))
                            .route(web::post().to(location::create_location)),
                    )
                    // /locations/{id}
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(location::get_location))
                            .route(web::put().to(location::update_location))
                            .route(web::delete().to(location::delete_location)),
                    ),
            ),
    );
}

// CHECK-IN
//  └─ Authorization: Bearer access_token
//       └─ geofence → shift match → record (checked_in)

// DAILY CUTOFF
//  └─ POST /cron/auto-checkout with Authorization: Bearer CRON_SECRET
//       └─ every record still open is closed (pending by default)
