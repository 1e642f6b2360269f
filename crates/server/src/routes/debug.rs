use actix_web::{get, http::header, HttpRequest, HttpResponse};
use std::collections::BTreeMap;

use crate::identity::ClientIdentity;
use crate::types::ClientInfoResponse;

/// Echo what the server sees of the caller, for checking proxy headers
#[get("/debug/client-info")]
pub async fn client_info(req: HttpRequest) -> actix_web::Result<HttpResponse> {
    let identity = ClientIdentity::from_request(&req);

    let headers: BTreeMap<String, String> = req
        .headers()
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect();

    let user_agent = req
        .headers()
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let info = req.connection_info();
    let url = format!("{}://{}{}", info.scheme(), info.host(), req.uri());

    Ok(HttpResponse::Ok().json(ClientInfoResponse {
        client_ip: identity.key().to_string(),
        source: identity.source(),
        headers,
        method: req.method().to_string(),
        url,
        user_agent,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test, App};

    #[actix_web::test]
    async fn test_client_info_reports_resolved_identity() {
        let app = test::init_service(App::new().service(client_info)).await;

        let req = test::TestRequest::get()
            .uri("/debug/client-info?probe=1")
            .insert_header(("X-Real-IP", "198.51.100.23"))
            .insert_header((header::USER_AGENT, "curl/8.5.0"))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["client_ip"], "198.51.100.23");
        assert_eq!(body["source"], "real_ip");
        assert_eq!(body["method"], "GET");
        assert_eq!(body["user_agent"], "curl/8.5.0");
        assert_eq!(body["headers"]["x-real-ip"], "198.51.100.23");
        assert!(body["url"].as_str().unwrap().ends_with("/debug/client-info?probe=1"));
    }
}
