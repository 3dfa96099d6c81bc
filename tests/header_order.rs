use wraith::{Cookie, RequestOptions, Session};

mod helpers;
use helpers::init_tracing;
use helpers::mock_server::{response, MockHttpServer};

async fn capture(options: RequestOptions) -> helpers::mock_server::CapturedRequest {
    let server = MockHttpServer::new().await.unwrap();
    let url = format!("{}/page", server.url());
    let handle = server.start(|_| response(200, &[], b"ok"));

    let session = Session::init(false);
    let resp = session.send(&url, options, "GET").await.unwrap();
    assert_eq!(resp.status, 200);

    let mut requests = handle.requests();
    assert_eq!(requests.len(), 1);
    requests.remove(0)
}

#[tokio::test]
async fn test_default_browser_order() {
    init_tracing();

    let options = RequestOptions::default()
        .header("accept-language", "en-US")
        .header("X-Custom", "1")
        .header("accept", "*/*");
    let request = capture(options).await;

    assert_eq!(request.request_line(), "GET /page HTTP/1.1");
    assert_eq!(
        request.header_names(),
        vec!["Host", "User-Agent", "accept", "accept-language", "X-Custom"]
    );
    assert!(request.header("user-agent").unwrap().contains("Mozilla"));
}

#[tokio::test]
async fn test_custom_order_then_insertion_order() {
    init_tracing();

    let options = RequestOptions::default()
        .header("accept-language", "en-US")
        .header("X-Custom", "1")
        .header("accept", "*/*")
        .header_order(["x-custom", "accept"]);
    let request = capture(options).await;

    assert_eq!(
        request.header_names(),
        vec!["X-Custom", "accept", "accept-language", "Host", "User-Agent"]
    );
}

#[tokio::test]
async fn test_order_as_provided() {
    init_tracing();

    let options = RequestOptions::default()
        .header("accept-language", "en-US")
        .header("X-Custom", "1")
        .header("accept", "*/*")
        .order_as_provided(true);
    let request = capture(options).await;

    assert_eq!(
        request.header_names(),
        vec!["accept-language", "X-Custom", "accept", "Host", "User-Agent"]
    );
}

#[tokio::test]
async fn test_user_agent_and_cookies() {
    init_tracing();

    let options = RequestOptions::default()
        .user_agent("wraith-test/1.0")
        .cookie(Cookie::new("a", "1"))
        .cookie(Cookie::new("b", "2"));
    let request = capture(options).await;

    assert_eq!(request.header("User-Agent").as_deref(), Some("wraith-test/1.0"));
    assert_eq!(request.header("Cookie").as_deref(), Some("a=1; b=2"));
    let names = request.header_names();
    assert_eq!(names.iter().filter(|n| n.eq_ignore_ascii_case("user-agent")).count(), 1);
}

#[tokio::test]
async fn test_caller_content_length_is_replaced() {
    init_tracing();

    let server = MockHttpServer::new().await.unwrap();
    let url = server.url();
    let handle = server.start(|_| response(200, &[], b"ok"));

    let session = Session::init(false);
    let options = RequestOptions::default()
        .header("Content-Length", "999")
        .header("Content-Type", "text/plain")
        .body("hello");
    let resp = session.send(&url, options, "POST").await.unwrap();
    assert_eq!(resp.status, 200);

    let requests = handle.requests();
    assert_eq!(requests[0].header("content-length").as_deref(), Some("5"));
    assert_eq!(requests[0].body, b"hello");
}
