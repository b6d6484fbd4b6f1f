//! Loopback services shared by the integration tests

#![allow(dead_code)]

use openssl::asn1::Asn1Time;
use openssl::bn::BigNum;
use openssl::hash::MessageDigest;
use openssl::pkey::{PKey, Private};
use openssl::rsa::Rsa;
use openssl::ssl::{Ssl, SslAcceptor, SslMethod};
use openssl::x509::{X509Builder, X509NameBuilder, X509};
use std::pin::Pin;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio_openssl::SslStream;

/// How long accepted connections are held open
const HOLD: Duration = Duration::from_secs(5);

/// Bind a loopback listener whose neighbouring ports (±2) are free, so a
/// range scan around it has exactly one open port.
pub async fn isolated_listener() -> TcpListener {
    for _ in 0..50 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        if port < 3 || port > 65533 {
            continue;
        }
        let neighbours_free = [port - 2, port - 1, port + 1, port + 2]
            .iter()
            .all(|&p| std::net::TcpListener::bind(("127.0.0.1", p)).is_ok());
        if neighbours_free {
            return listener;
        }
    }
    panic!("could not find a loopback port with free neighbours");
}

/// Accept connections and never send anything
pub async fn spawn_silent() -> u16 {
    let listener = isolated_listener().await;
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                tokio::time::sleep(HOLD).await;
                drop(stream);
            });
        }
    });
    port
}

/// Greet every connection with `banner` and keep it open
pub async fn spawn_banner(banner: &'static str) -> u16 {
    let listener = isolated_listener().await;
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let _ = stream.write_all(banner.as_bytes()).await;
                tokio::time::sleep(HOLD).await;
            });
        }
    });
    port
}

/// Complete a TLS handshake with every connection using a throwaway certificate
pub async fn spawn_tls() -> u16 {
    let (key, cert) = self_signed();
    let mut builder = SslAcceptor::mozilla_intermediate_v5(SslMethod::tls()).unwrap();
    builder.set_private_key(&key).unwrap();
    builder.set_certificate(&cert).unwrap();
    let acceptor = builder.build();

    let listener = isolated_listener().await;
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let Ok(ssl) = Ssl::new(acceptor.context()) else {
                continue;
            };
            let Ok(mut tls) = SslStream::new(ssl, stream) else {
                continue;
            };
            tokio::spawn(async move {
                if Pin::new(&mut tls).accept().await.is_ok() {
                    tokio::time::sleep(HOLD).await;
                }
            });
        }
    });
    port
}

fn self_signed() -> (PKey<Private>, X509) {
    let key = PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap();

    let mut name = X509NameBuilder::new().unwrap();
    name.append_entry_by_text("CN", "localhost").unwrap();
    let name = name.build();

    let mut builder = X509Builder::new().unwrap();
    builder.set_version(2).unwrap();
    let serial = BigNum::from_u32(1).unwrap().to_asn1_integer().unwrap();
    builder.set_serial_number(&serial).unwrap();
    builder.set_subject_name(&name).unwrap();
    builder.set_issuer_name(&name).unwrap();
    builder.set_pubkey(&key).unwrap();
    builder
        .set_not_before(&Asn1Time::days_from_now(0).unwrap())
        .unwrap();
    builder
        .set_not_after(&Asn1Time::days_from_now(1).unwrap())
        .unwrap();
    builder.sign(&key, MessageDigest::sha256()).unwrap();

    (key, builder.build())
}
