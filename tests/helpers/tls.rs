use boring::pkey::PKey;
use boring::ssl::{select_next_proto, AlpnError, SslAcceptor, SslMethod};
use boring::x509::X509;

/// Server side of a TLS test: an acceptor and the PEM to trust on the client.
pub struct TlsFixture {
    pub acceptor: SslAcceptor,
    /// Self-signed, so it doubles as the root certificate.
    pub ca_pem: Vec<u8>,
}

/// Acceptor for 127.0.0.1/localhost with a fresh self-signed certificate.
/// Negotiates `http/1.1` when the client offers it and accepts TLS 1.2 and 1.3.
pub fn h1_fixture() -> TlsFixture {
    let names = vec!["127.0.0.1".to_string(), "localhost".to_string()];
    let certified = rcgen::generate_simple_self_signed(names).expect("generate certificate");
    let cert_pem = certified.cert.pem();

    let key = PKey::private_key_from_pem(certified.signing_key.serialize_pem().as_bytes())
        .expect("parse private key");
    let cert = X509::from_pem(cert_pem.as_bytes()).expect("parse certificate");

    let mut builder =
        SslAcceptor::mozilla_intermediate_v5(SslMethod::tls()).expect("acceptor builder");
    builder.set_private_key(&key).expect("set private key");
    builder.set_certificate(&cert).expect("set certificate");
    builder.set_alpn_select_callback(|_, offered| {
        select_next_proto(b"\x08http/1.1", offered).ok_or(AlpnError::NOACK)
    });

    TlsFixture {
        acceptor: builder.build(),
        ca_pem: cert_pem.into_bytes(),
    }
}
