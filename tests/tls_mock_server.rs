use wraith::{RequestOptions, Session};

mod helpers;
use helpers::init_tracing;
use helpers::mock_server::{response, MockHttpServer};
use helpers::tls::{h1_fixture, TlsFixture};

/// TLS 1.2 only: no supported_versions extension, ECDHE-ECDSA / ECDHE-RSA AES-128-GCM.
const TLS12_JA3: &str = "771,49195-49199,0-10-11-13,29-23,0";

#[tokio::test]
async fn test_h1_tls_with_browser_profile() {
    init_tracing();

    let TlsFixture { acceptor, ca_pem } = h1_fixture();
    let server = MockHttpServer::new().await.unwrap();
    let url = server.url_tls();
    let handle = server.start_tls(acceptor, |_| response(200, &[], b"Hello"));

    let session = Session::builder().add_root_certificate(ca_pem).build();
    let resp = session
        .send(&url, RequestOptions::default().fingerprint("chrome"), "GET")
        .await
        .unwrap();

    assert_eq!(resp.status, 200);
    assert_eq!(resp.body, "Hello");

    let requests = handle.requests();
    assert_eq!(requests[0].tls_version.as_deref(), Some("TLSv1.3"));
}

#[tokio::test]
async fn test_ja3_limits_protocol_version() {
    init_tracing();

    let TlsFixture { acceptor, ca_pem } = h1_fixture();
    let server = MockHttpServer::new().await.unwrap();
    let url = server.url_tls();
    let handle = server.start_tls(acceptor, |_| response(200, &[], b"Hello"));

    let session = Session::builder().add_root_certificate(ca_pem).build();
    let resp = session
        .send(&url, RequestOptions::default().fingerprint(TLS12_JA3), "GET")
        .await
        .unwrap();

    assert_eq!(resp.status, 200);
    assert_eq!(handle.requests()[0].tls_version.as_deref(), Some("TLSv1.2"));
}

#[tokio::test]
async fn test_untrusted_certificate_is_a_tls_failure() {
    init_tracing();

    let TlsFixture { acceptor, .. } = h1_fixture();
    let server = MockHttpServer::new().await.unwrap();
    let url = server.url_tls();
    let handle = server.start_tls(acceptor, |_| response(200, &[], b"Hello"));

    let session = Session::init(false);
    let resp = session.send(&url, RequestOptions::default(), "GET").await.unwrap();

    assert_eq!(resp.status, 421);
    assert!(resp.body.starts_with("Request returned a TLS Error"), "body: {}", resp.body);
    assert!(handle.requests().is_empty());
}

#[tokio::test]
async fn test_tls_connection_reuse() {
    init_tracing();

    let TlsFixture { acceptor, ca_pem } = h1_fixture();
    let server = MockHttpServer::new().await.unwrap();
    let url = server.url_tls();
    let handle = server.start_tls(acceptor, |req| response(200, &[], req.path().as_bytes()));

    let session = Session::builder().add_root_certificate(ca_pem).build();
    for path in ["/one", "/two"] {
        let resp = session
            .send(&format!("{}{}", url, path), RequestOptions::default(), "GET")
            .await
            .unwrap();
        assert_eq!(resp.body, path);
    }
    assert_eq!(handle.connection_count(), 1);
}
