use altroute_client::{
    AltRouteError, FailoverResolver, InterceptedRequest, InterceptedResponse, RequestInterceptor,
    SchemeTask,
};
use altroute_core::ServerConfig;
use bytes::Bytes;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::HeaderValue;
use reqwest::Method;
use std::sync::{Arc, Mutex};
use url::Url;
use wiremock::matchers::{body_string, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Debug)]
enum Event {
    Response(InterceptedResponse),
    Data(Bytes),
    Finished,
    Failed(AltRouteError),
}

#[derive(Default)]
struct RecordingTask {
    events: Mutex<Vec<Event>>,
}

impl RecordingTask {
    fn take(&self) -> Vec<Event> {
        std::mem::take(&mut *self.events.lock().unwrap())
    }
}

impl SchemeTask for RecordingTask {
    fn did_receive_response(&self, response: InterceptedResponse) {
        self.events.lock().unwrap().push(Event::Response(response));
    }

    fn did_receive_data(&self, data: Bytes) {
        self.events.lock().unwrap().push(Event::Data(data));
    }

    fn did_finish(&self) {
        self.events.lock().unwrap().push(Event::Finished);
    }

    fn did_fail(&self, error: AltRouteError) {
        self.events.lock().unwrap().push(Event::Failed(error));
    }
}

fn interceptor(jar: Arc<Jar>) -> RequestInterceptor {
    let resolver = FailoverResolver::builder(ServerConfig::default())
        .providers(Vec::new())
        .build();
    RequestInterceptor::new(resolver, jar)
}

fn synthetic(uri: &str) -> String {
    uri.replacen("http://", "coreios://", 1)
}

#[tokio::test]
async fn serves_page_over_synthetic_scheme() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/page"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header(
                    "content-security-policy",
                    "frame-src 'self' blob: https://captcha.example; img-src 'self'",
                )
                .insert_header("link", format!("<{}/style.css>", server.uri()).as_str())
                .set_body_string("<html>hello</html>"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let task = Arc::new(RecordingTask::default());
    let url = format!("{}/page", synthetic(&server.uri()));
    interceptor(Arc::new(Jar::default()))
        .start(InterceptedRequest::get(url.clone()), task.clone())
        .await;

    let events = task.take();
    let Some(Event::Response(head)) = events.first() else {
        panic!("expected response first, got {events:?}");
    };
    assert_eq!(head.status, 200);
    assert_eq!(head.url, url);

    let csp = head.headers["content-security-policy"].to_str().unwrap();
    assert!(csp.contains("coreios://127.0.0.1 "), "{csp}");
    assert!(csp.contains("img-src coreios: coreioss: 'self'"), "{csp}");
    assert!(csp.contains("coreioss://captcha.example"), "{csp}");

    let link = head.headers["link"].to_str().unwrap();
    assert!(link.starts_with("<coreios://127.0.0.1"), "{link}");

    let body: Vec<u8> = events
        .iter()
        .filter_map(|e| match e {
            Event::Data(chunk) => Some(chunk.to_vec()),
            _ => None,
        })
        .flatten()
        .collect();
    assert_eq!(body, b"<html>hello</html>");
    assert!(matches!(events.last(), Some(Event::Finished)));
}

#[tokio::test]
async fn forwards_method_body_and_origin() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/core/v4/users"))
        .and(body_string("Token=abc"))
        .and(header("origin", server.uri().as_str()))
        .respond_with(ResponseTemplate::new(201).set_body_string("ok"))
        .expect(1)
        .mount(&server)
        .await;

    let task = Arc::new(RecordingTask::default());
    let base = synthetic(&server.uri());
    let origin = HeaderValue::from_str(&base).unwrap();
    let request = InterceptedRequest::new(Method::POST, format!("{base}/core/v4/users"))
        .header("origin", origin)
        .body("Token=abc");

    interceptor(Arc::new(Jar::default()))
        .start(request, task.clone())
        .await;

    let events = task.take();
    assert!(matches!(&events[0], Event::Response(head) if head.status == 201));
    assert!(matches!(events.last(), Some(Event::Finished)));
}

#[tokio::test]
async fn shares_cookie_jar_both_ways() {
    let server = MockServer::start().await;
    let jar = Arc::new(Jar::default());
    let real = Url::parse(&server.uri()).unwrap();
    jar.add_cookie_str("Session-Id=abc", &real);

    Mock::given(method("GET"))
        .and(header("cookie", "Session-Id=abc"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", "Tag=beta; Path=/")
                .set_body_string("ok"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let task = Arc::new(RecordingTask::default());
    interceptor(Arc::clone(&jar))
        .start(
            InterceptedRequest::get(format!("{}/", synthetic(&server.uri()))),
            task.clone(),
        )
        .await;

    assert!(matches!(task.take().last(), Some(Event::Finished)));
    let stored = jar.cookies(&real).unwrap();
    assert!(stored.to_str().unwrap().contains("Tag=beta"));
}

#[tokio::test]
async fn unreachable_host_fails_the_task() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let task = Arc::new(RecordingTask::default());
    interceptor(Arc::new(Jar::default()))
        .start(
            InterceptedRequest::get(format!("coreios://127.0.0.1:{port}/")),
            task.clone(),
        )
        .await;

    let events = task.take();
    assert_eq!(events.len(), 1);
    assert!(matches!(&events[0], Event::Failed(AltRouteError::Connection(_))));
}

#[tokio::test]
async fn missing_url_fails_the_task() {
    let task = Arc::new(RecordingTask::default());
    interceptor(Arc::new(Jar::default()))
        .start(InterceptedRequest::get(""), task.clone())
        .await;

    let events = task.take();
    assert!(matches!(events.as_slice(), [Event::Failed(AltRouteError::MissingUrl)]));
}

#[tokio::test]
async fn api_suffix_survives_round_trip() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/path"))
        .respond_with(ResponseTemplate::new(200).set_body_string("captcha"))
        .expect(1)
        .mount(&server)
        .await;

    let task = Arc::new(RecordingTask::default());
    let url = format!("coreios://localhost-api:{}/path", server.address().port());
    interceptor(Arc::new(Jar::default()))
        .start(InterceptedRequest::get(url.clone()), task.clone())
        .await;

    let events = task.take();
    let Some(Event::Response(head)) = events.first() else {
        panic!("expected response first, got {events:?}");
    };
    assert_eq!(head.status, 200);
    assert_eq!(head.url, url);

    let body: Vec<u8> = events
        .iter()
        .filter_map(|e| match e {
            Event::Data(chunk) => Some(chunk.to_vec()),
            _ => None,
        })
        .flatten()
        .collect();
    assert_eq!(body, b"captcha");
    assert!(matches!(events.last(), Some(Event::Finished)));
}
