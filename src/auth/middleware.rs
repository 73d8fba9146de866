use crate::auth::auth::AuthUser;
use crate::auth::jwt::verify_token;
use crate::config::Config;
use crate::model::role::Role;
use actix_web::middleware::Next;
use actix_web::{
    Error, HttpMessage, HttpResponse,
    body::BoxBody,
    dev::{ServiceRequest, ServiceResponse},
    web::Data,
};
use serde_json::json;

fn reject(req: ServiceRequest, body: serde_json::Value) -> Result<ServiceResponse<BoxBody>, Error> {
    let resp = HttpResponse::Unauthorized().json(body);
    Ok(req.into_response(resp.map_into_boxed_body()))
}

pub async fn auth_middleware(req: ServiceRequest, next: Next<BoxBody>) -> Result<ServiceResponse<BoxBody>, Error> {
    let config = req
        .app_data::<Data<Config>>()
        .ok_or_else(|| actix_web::error::ErrorInternalServerError("App config missing"))?;

    let header = req
        .headers()
        .get("Authorization")
        .map(|h| h.to_str().map(str::to_owned));

    let header_value = match header {
        Some(Ok(v)) => v,
        Some(Err(_)) => return reject(req, json!({"error": "Invalid Authorization header encoding"})),
        None => return reject(req, json!({"error": "Missing Authorization header"})),
    };

    let Some(token) = header_value.strip_prefix("Bearer ") else {
        return reject(req, json!({"error": "Authorization header must start with Bearer"}));
    };

    let claims = match verify_token(token, &config.jwt_secret) {
        Ok(c) => c,
        Err(e) => return reject(req, json!({"error": "Invalid or expired token", "details": e})),
    };

    let Some(role) = Role::from_id(claims.role) else {
        return reject(req, json!({"error": "Invalid role"}));
    };

    let auth_user = AuthUser {
        user_id: claims.user_id,
        username: claims.sub,
        role,
        employee_id: claims.employee_id,
    };
    tracing::debug!(user_id = auth_user.user_id, role = ?auth_user.role, "Authenticated request");

    req.extensions_mut().insert(auth_user);

    next.call(req).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::generate_access_token;
    use crate::config::tests::test_config;
    use actix_web::middleware::from_fn;
    use actix_web::{App, Responder, http::StatusCode, test, web};

    async fn whoami(user: AuthUser) -> impl Responder {
        HttpResponse::Ok().body(user.editor())
    }

    #[actix_web::test]
    async fn missing_header_is_unauthorized() {
        let app = test::init_service(
            App::new()
                .app_data(Data::new(test_config()))
                .service(web::scope("/api").wrap(from_fn(auth_middleware)).route("/me", web::get().to(whoami))),
        )
        .await;

        let resp = test::call_service(&app, test::TestRequest::get().uri("/api/me").to_request()).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn bad_token_is_unauthorized() {
        let app = test::init_service(
            App::new()
                .app_data(Data::new(test_config()))
                .service(web::scope("/api").wrap(from_fn(auth_middleware)).route("/me", web::get().to(whoami))),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/api/me")
            .insert_header(("Authorization", "Bearer not-a-jwt"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn valid_token_reaches_handler() {
        let config = test_config();
        let token = generate_access_token(3, "somsri".into(), 2, Some(1000), &config.jwt_secret, 60).unwrap();
        let app = test::init_service(
            App::new()
                .app_data(Data::new(config))
                .service(web::scope("/api").wrap(from_fn(auth_middleware)).route("/me", web::get().to(whoami))),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/api/me")
            .insert_header(("Authorization", format!("Bearer {token}")))
            .to_request();
        let body = test::call_and_read_body(&app, req).await;
        assert_eq!(body, "hr:somsri");
    }
}
