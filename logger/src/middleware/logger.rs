use actix_web::body::{self, BoxBody, MessageBody};
use actix_web::dev::Payload;
use actix_web::web::{self, Bytes};
use actix_web::{
    Error,
    dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
};
use actix_web::{HttpMessage, HttpResponse, ResponseError};
use chrono::Utc;
use colored::Colorize;
use db::{Tables, models::log::RequestLog};
use futures::StreamExt;
use futures::future::{LocalBoxFuture, Ready, ready};
use log::{debug, info};
use serde_json::{Map, Value, json};
use sqlx::PgPool;
use sqlx::types::ipnetwork::IpNetwork;
use std::net::{IpAddr, Ipv4Addr};
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;
use url::form_urlencoded;
use uuid::Uuid;

/// Where handled requests are persisted. `None` pool disables persistence.
#[derive(Clone)]
pub struct RequestLogSink {
    pool: Option<Arc<PgPool>>,
    tables: Tables,
}

impl RequestLogSink {
    pub fn new(pool: Option<Arc<PgPool>>, tables: Tables) -> Self {
        Self { pool, tables }
    }
}

pub struct LoggerMiddleware {
    sink: RequestLogSink,
    console: bool,
}

impl LoggerMiddleware {
    pub fn new(sink: RequestLogSink, console: bool) -> Self {
        Self { sink, console }
    }
}

impl<S, B> Transform<S, ServiceRequest> for LoggerMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: actix_web::body::MessageBody + 'static,
    <B as MessageBody>::Error: ResponseError,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Transform = LoggerMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(LoggerMiddlewareService {
            service: Arc::new(service),
            sink: self.sink.clone(),
            console: self.console,
        }))
    }
}

pub struct LoggerMiddlewareService<S> {
    service: Arc<S>,
    sink: RequestLogSink,
    console: bool,
}

/// Query string as a JSON object of decoded values.
pub fn query_params(query_string: &str) -> Value {
    let params: Map<String, Value> = form_urlencoded::parse(query_string.as_bytes())
        .map(|(key, value)| (key.into_owned(), json!(value)))
        .collect();
    Value::Object(params)
}

/// `userId` from the JSON body, else from the query string.
pub fn request_user_id(body: &Value, params: &Value) -> Option<i64> {
    let from = |value: &Value| match value.get("userId") {
        Some(Value::Number(number)) => number.as_i64(),
        Some(Value::String(text)) => text.parse().ok(),
        _ => None,
    };
    from(body).or_else(|| from(params))
}

fn client_ip(raw: Option<&str>) -> IpNetwork {
    let unspecified = IpNetwork::from(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
    let Some(raw) = raw else {
        return unspecified;
    };
    IpNetwork::from_str(raw)
        .or_else(|_| {
            // "ip:port" as reported for direct peers
            raw.rsplit_once(':')
                .map(|(host, _)| host.trim_matches(['[', ']']))
                .ok_or(())
                .and_then(|host| IpNetwork::from_str(host).map_err(|_| ()))
        })
        .unwrap_or(unspecified)
}

impl<S, B> Service<ServiceRequest> for LoggerMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: actix_web::body::MessageBody + 'static,
    <B as MessageBody>::Error: ResponseError,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, mut req: ServiceRequest) -> Self::Future {
        let started = Instant::now();
        let method = req.method().to_string();
        let path = req.path().to_string();
        let params = query_params(req.query_string());
        let ip_address = client_ip(req.connection_info().realip_remote_addr());
        let user_agent = req
            .headers()
            .get("User-Agent")
            .and_then(|ua| ua.to_str().ok())
            .unwrap_or_default()
            .to_string();

        let srv = Arc::clone(&self.service);
        let sink = self.sink.clone();
        let console = self.console;

        Box::pin(async move {
            // Copy request body from payload and reconstruct it
            let mut payload = req.take_payload();
            let body_bytes = extract_body(&mut payload).await?;
            let request_body = if !body_bytes.is_empty() {
                serde_json::from_slice::<Value>(&body_bytes).unwrap_or(Value::Null)
            } else {
                Value::Null
            };
            let new_stream: Pin<
                Box<dyn futures::Stream<Item = Result<Bytes, actix_web::error::PayloadError>>>,
            > = futures::stream::once(async move {
                Ok::<Bytes, actix_web::error::PayloadError>(body_bytes)
            })
            .boxed();
            req.set_payload(Payload::from(new_stream));

            let res = srv.call(req).await?;

            let status = res.status();
            let status_code = i32::from(status.as_u16());
            let duration_ms = i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX);
            let user_id = request_user_id(&request_body, &params);

            // Copy response body and reconstruct response
            let (req, res) = res.into_parts();
            let headers = res.headers().clone();
            let response_body_bytes = body::to_bytes(res.into_body()).await?;
            let response_body =
                serde_json::from_slice::<Value>(&response_body_bytes).unwrap_or(Value::Null);
            let mut new_res = HttpResponse::build(status);
            for (key, value) in headers.iter() {
                new_res.insert_header((key.clone(), value.clone()));
            }
            let res = ServiceResponse::new(req, new_res.body(response_body_bytes));

            if console {
                let colored_status = match status_code {
                    200..=299 => status_code.to_string().green(),
                    300..=399 => status_code.to_string().yellow(),
                    400..=499 => status_code.to_string().bright_red(),
                    _ => status_code.to_string().red(),
                };

                let colored_method = match method.as_str() {
                    "GET" => method.blue(),
                    "POST" => method.yellow(),
                    "PUT" => method.purple(),
                    "DELETE" => method.red(),
                    _ => method.normal(),
                };

                info!(
                    "[{}] {} {} {} user_id={} params={}",
                    colored_status,
                    colored_method,
                    path.bright_white(),
                    format!("({}ms)", duration_ms).bright_black(),
                    user_id
                        .map_or("None".to_string(), |id| id.to_string())
                        .bright_blue(),
                    params.to_string().bright_cyan(),
                );

                if request_body.as_object().is_some_and(|body| !body.is_empty()) {
                    debug!("  Request: {}", request_body.to_string().bright_green());
                }
                if status_code >= 400
                    || response_body.as_object().is_some_and(|body| !body.is_empty())
                {
                    debug!("  Response: {}", response_body.to_string().bright_yellow());
                }
            }

            if let Some(pool) = sink.pool.as_deref() {
                let entry = RequestLog {
                    id: Uuid::nil(), // assigned by the database
                    timestamp: Utc::now().naive_utc(),
                    method,
                    path,
                    status_code,
                    duration_ms,
                    user_id,
                    params: Some(params),
                    request_body: Some(request_body),
                    response_body: Some(response_body),
                    ip_address,
                    user_agent,
                };
                if let Err(error) = db::log::insert_log(pool, &sink.tables, entry).await {
                    log::error!("Failed to persist request log: {}", error);
                }
            }

            Ok(res)
        })
    }
}

async fn extract_body(payload: &mut Payload) -> Result<Bytes, Error> {
    let mut body = web::BytesMut::new();
    while let Some(chunk) = payload.next().await {
        let chunk = chunk?;
        body.extend_from_slice(&chunk);
    }
    Ok(body.freeze())
}

#[cfg(test)]
mod tests {
    use actix_web::{App, HttpResponse, test as actix_test, web};

    use super::*;

    #[test]
    fn query_params_become_a_json_object() {
        assert_eq!(
            query_params("trackingNumber=9400&carrier=usps&debug"),
            json!({ "trackingNumber": "9400", "carrier": "usps", "debug": "" })
        );
        assert_eq!(
            query_params("trackingNumber=94%2000&note=a+b"),
            json!({ "trackingNumber": "94 00", "note": "a b" })
        );
        assert_eq!(query_params(""), json!({}));
    }

    #[test]
    fn user_id_comes_from_body_then_query() {
        let params = json!({ "userId": "12" });

        assert_eq!(request_user_id(&json!({ "userId": 7 }), &params), Some(7));
        assert_eq!(request_user_id(&Value::Null, &params), Some(12));
        assert_eq!(request_user_id(&json!({}), &json!({})), None);
    }

    #[test]
    fn peer_addresses_with_ports_are_parsed() {
        assert_eq!(client_ip(Some("10.0.0.5")).ip().to_string(), "10.0.0.5");
        assert_eq!(client_ip(Some("10.0.0.5:4312")).ip().to_string(), "10.0.0.5");
        assert_eq!(client_ip(Some("garbage")).ip().to_string(), "0.0.0.0");
        assert_eq!(client_ip(None).ip().to_string(), "0.0.0.0");
    }

    #[actix_web::test]
    async fn passes_request_and_response_bodies_through() {
        let middleware = LoggerMiddleware::new(
            RequestLogSink::new(None, Tables::with_suffix("_dev")),
            false,
        );
        let app = actix_test::init_service(App::new().wrap(middleware).route(
            "/echo",
            web::post().to(|body: web::Json<Value>| async move {
                HttpResponse::Ok().json(body.into_inner())
            }),
        ))
        .await;

        let body: Value = actix_test::call_and_read_body_json(
            &app,
            actix_test::TestRequest::post()
                .uri("/echo")
                .set_json(json!({ "userId": 3 }))
                .to_request(),
        )
        .await;

        assert_eq!(body, json!({ "userId": 3 }));
    }
}
