//! End-to-end exchanges between real client and server endpoints over
//! loopback, plain and encrypted.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use linewire_cipher::{
    generate_private_key, keys, CipherMode, KeySize, KeyStrength, RsaCipher, SymmetricCipher,
};
use linewire_transport::{
    AesEndpoint, ConcurrencyMode, RsaEndpoint, SocketEndpoint, TransportError, NEW_LINE_REPLACER,
};

fn shared_aes_pair(mode: CipherMode) -> (SymmetricCipher, SymmetricCipher) {
    let iv = keys::generate_base64_iv();
    let key = keys::generate_base64_key(KeySize::Bits256);
    (
        SymmetricCipher::from_base64(mode, &iv, &key).unwrap(),
        SymmetricCipher::from_base64(mode, &iv, &key).unwrap(),
    )
}

#[tokio::test]
async fn plain_request_response() {
    let server = Arc::new(SocketEndpoint::server(ConcurrencyMode::Single));
    let routine_side = server.clone();
    let port = server
        .start_listener(0, move || {
            let server = routine_side.clone();
            async move {
                while server.continue_listening() {
                    let Ok(connection) = server.accept_request().await else { break };
                    if let Ok(Some(request)) = server.read_content_from(&connection).await {
                        let _ = server
                            .write_content_to(&connection, format!("echo: {request}"))
                            .await;
                    }
                }
            }
        })
        .await
        .unwrap();

    let client = SocketEndpoint::client("127.0.0.1", port);
    client.write_content("hello").await.unwrap();
    assert_eq!(client.read_content().await.unwrap().as_deref(), Some("echo: hello"));

    // The client closed the connection after reading; a second exchange
    // dials a fresh one.
    client.write_content("world").await.unwrap();
    assert_eq!(client.read_content().await.unwrap().as_deref(), Some("echo: world"));
    assert_eq!(client.read_last_content().as_deref(), Some("echo: world"));

    server.stop_listener();
    assert!(!server.continue_listening());
}

#[tokio::test]
async fn pooled_server_serves_clients_without_crosstalk() {
    let server = Arc::new(SocketEndpoint::server(ConcurrencyMode::Pooled));
    let routine_side = server.clone();
    let port = server
        .start_listener(0, move || {
            let server = routine_side.clone();
            async move {
                while server.continue_listening() {
                    let Ok(connection) = server.accept_request().await else { break };
                    let server = server.clone();
                    tokio::spawn(async move {
                        while let Ok(Some(request)) =
                            server.read_content_from(&connection).await
                        {
                            if server
                                .write_content_to(&connection, format!("{request}/ack"))
                                .await
                                .is_err()
                            {
                                break;
                            }
                        }
                    });
                }
            }
        })
        .await
        .unwrap();

    let exchange = |tag: &'static str| async move {
        let client = SocketEndpoint::client("127.0.0.1", port);
        client.write_content(tag).await.unwrap();
        client.read_content().await.unwrap()
    };
    let (a, b, c) = tokio::join!(exchange("alpha"), exchange("beta"), exchange("gamma"));
    assert_eq!(a.as_deref(), Some("alpha/ack"));
    assert_eq!(b.as_deref(), Some("beta/ack"));
    assert_eq!(c.as_deref(), Some("gamma/ack"));

    server.stop_listener();
}

#[tokio::test]
async fn plain_server_sees_clean_close_as_none() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let server = Arc::new(SocketEndpoint::server(ConcurrencyMode::Single));
    let routine_side = server.clone();
    let port = server
        .start_listener(0, move || {
            let server = routine_side.clone();
            let tx = tx.clone();
            async move {
                if let Ok(connection) = server.accept_request().await {
                    let first = server.read_content_from(&connection).await;
                    let second = server.read_content_from(&connection).await;
                    let _ = tx.send((first, second));
                }
            }
        })
        .await
        .unwrap();

    let client = SocketEndpoint::client("127.0.0.1", port);
    client.write_content("goodbye").await.unwrap();
    client.close_communication().await;

    let (first, second) = rx.recv().await.unwrap();
    assert_eq!(first.unwrap().as_deref(), Some("goodbye"));
    assert_eq!(second.unwrap(), None);

    server.stop_listener();
}

#[tokio::test]
async fn encrypted_exchange_preserves_embedded_newlines() {
    let (server_cipher, client_cipher) = shared_aes_pair(CipherMode::Cbc);
    let server = Arc::new(AesEndpoint::server(ConcurrencyMode::Single, server_cipher));
    let routine_side = server.clone();
    let port = server
        .start_listener(0, move || {
            let server = routine_side.clone();
            async move {
                while server.continue_listening() {
                    let Ok(connection) = server.accept_request().await else { break };
                    if let Ok(Some(request)) = server.read_content_from(&connection).await {
                        let _ = server.write_content_to(&connection, request).await;
                    }
                }
            }
        })
        .await
        .unwrap();

    let client = AesEndpoint::client("127.0.0.1", port, client_cipher);
    let multi_line = "first line\nsecond line\nthird";
    client.write_content(multi_line).await.unwrap();
    let reply = client.read_content().await.unwrap();
    assert_eq!(reply.as_deref(), Some(multi_line));
    assert_eq!(client.read_last_content().as_deref(), Some(multi_line));

    // The cached raw line on the plain layer is ciphertext, not plaintext.
    let raw = client.transport().read_last_content().unwrap();
    assert!(!raw.contains("first line"));

    server.stop_listener();
}

#[tokio::test]
async fn reserved_token_is_rejected_before_encryption() {
    let (server_cipher, client_cipher) = shared_aes_pair(CipherMode::Ctr);
    let server = Arc::new(AesEndpoint::server(ConcurrencyMode::Single, server_cipher));
    let routine_side = server.clone();
    let port = server
        .start_listener(0, move || {
            let server = routine_side.clone();
            async move {
                while server.continue_listening() {
                    let Ok(connection) = server.accept_request().await else { break };
                    if let Ok(Some(request)) = server.read_content_from(&connection).await {
                        let _ = server.write_content_to(&connection, request).await;
                    }
                }
            }
        })
        .await
        .unwrap();

    let client = AesEndpoint::client("127.0.0.1", port, client_cipher);
    let poisoned = format!("prefix {NEW_LINE_REPLACER} suffix");
    let err = client.write_content(poisoned).await.unwrap_err();
    assert!(matches!(err, TransportError::ReservedToken));

    // The endpoint stays usable on a fresh connection.
    client.write_content("still alive").await.unwrap();
    assert_eq!(client.read_content().await.unwrap().as_deref(), Some("still alive"));

    server.stop_listener();
}

#[tokio::test]
async fn aes_key_rotation_mid_session() {
    let (server_cipher, client_cipher) = shared_aes_pair(CipherMode::Ofb);
    let server = Arc::new(AesEndpoint::server(ConcurrencyMode::Single, server_cipher));
    let routine_side = server.clone();
    let port = server
        .start_listener(0, move || {
            let server = routine_side.clone();
            async move {
                while server.continue_listening() {
                    let Ok(connection) = server.accept_request().await else { break };
                    if let Ok(Some(request)) = server.read_content_from(&connection).await {
                        let _ = server.write_content_to(&connection, request).await;
                    }
                }
            }
        })
        .await
        .unwrap();

    let client = AesEndpoint::client("127.0.0.1", port, client_cipher);
    client.write_content("under the old key").await.unwrap();
    assert_eq!(
        client.read_content().await.unwrap().as_deref(),
        Some("under the old key")
    );

    let new_iv = keys::generate_base64_iv();
    let new_key = keys::generate_base64_key(KeySize::Bits128);
    server.change_cipher_keys_base64(&new_iv, &new_key).unwrap();
    client.change_cipher_keys_base64(&new_iv, &new_key).unwrap();

    client.write_content("under the new key").await.unwrap();
    assert_eq!(
        client.read_content().await.unwrap().as_deref(),
        Some("under the new key")
    );

    server.stop_listener();
}

#[tokio::test]
async fn rsa_exchange() {
    let pair = generate_private_key(KeyStrength::Low).unwrap();
    let private_text = pair.base64_private_key().unwrap();
    let public_text = pair.base64_public_key().unwrap();

    let server_cipher = RsaCipher::from_base64(&private_text, &public_text).unwrap();
    let client_cipher = RsaCipher::from_base64(&private_text, &public_text).unwrap();

    let server = Arc::new(RsaEndpoint::server(ConcurrencyMode::Single, server_cipher));
    let routine_side = server.clone();
    let port = server
        .start_listener(0, move || {
            let server = routine_side.clone();
            async move {
                while server.continue_listening() {
                    let Ok(connection) = server.accept_request().await else { break };
                    if let Ok(Some(request)) = server.read_content_from(&connection).await {
                        let _ = server.write_content_to(&connection, request).await;
                    }
                }
            }
        })
        .await
        .unwrap();

    let client = RsaEndpoint::client("127.0.0.1", port, client_cipher);
    client.write_content("asymmetric payload").await.unwrap();
    assert_eq!(
        client.read_content().await.unwrap().as_deref(),
        Some("asymmetric payload")
    );

    server.stop_listener();
}

#[tokio::test]
async fn stop_listener_refuses_new_exchanges() {
    let server = Arc::new(SocketEndpoint::server(ConcurrencyMode::Single));
    let routine_side = server.clone();
    let port = server
        .start_listener(0, move || {
            let server = routine_side.clone();
            async move {
                while server.continue_listening() {
                    let Ok(connection) = server.accept_request().await else { break };
                    if let Ok(Some(request)) = server.read_content_from(&connection).await {
                        let _ = server.write_content_to(&connection, request).await;
                    }
                }
            }
        })
        .await
        .unwrap();

    let client = SocketEndpoint::client("127.0.0.1", port);
    client.write_content("before stop").await.unwrap();
    assert_eq!(client.read_content().await.unwrap().as_deref(), Some("before stop"));

    server.stop_listener();
    // Give the aborted routine a moment to release the socket.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!SocketEndpoint::ping_host("127.0.0.1", port, Duration::from_millis(200)).await);

    // The stored routine can be dispatched again on the same port.
    let restarted = server.restart_listener().await.unwrap();
    assert_eq!(restarted, port);
    let client = SocketEndpoint::client("127.0.0.1", port);
    client.write_content("after restart").await.unwrap();
    assert_eq!(client.read_content().await.unwrap().as_deref(), Some("after restart"));

    server.stop_listener();
}

#[tokio::test]
async fn close_communication_releases_blocked_read() {
    // Server that accepts and then never says anything.
    let server = Arc::new(SocketEndpoint::server(ConcurrencyMode::Single));
    let routine_side = server.clone();
    let port = server
        .start_listener(0, move || {
            let server = routine_side.clone();
            async move {
                let _ = server.accept_request().await;
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
        })
        .await
        .unwrap();

    let client = Arc::new(SocketEndpoint::client("127.0.0.1", port));
    client.write_content("anyone there").await.unwrap();

    let reader_side = client.clone();
    let pending = tokio::spawn(async move { reader_side.read_content().await });
    tokio::time::sleep(Duration::from_millis(50)).await;

    client.close_communication().await;
    let outcome = tokio::time::timeout(Duration::from_secs(2), pending)
        .await
        .expect("read still blocked after close_communication")
        .unwrap();
    assert_eq!(outcome.unwrap(), None);

    server.stop_listener();
}

#[tokio::test]
async fn stop_listener_releases_blocked_accept() {
    let server = Arc::new(SocketEndpoint::server(ConcurrencyMode::Single));
    let port = server.start_listener(0, || async {}).await.unwrap();

    // An accept awaited outside any routine task must still be released.
    let accept_side = server.clone();
    let pending = tokio::spawn(async move { accept_side.accept_request().await });
    tokio::time::sleep(Duration::from_millis(50)).await;

    server.stop_listener();
    let outcome = tokio::time::timeout(Duration::from_secs(2), pending)
        .await
        .expect("accept still blocked after stop_listener")
        .unwrap();
    assert!(matches!(outcome, Err(TransportError::ListenerNotStarted)));
    let _ = port;
}

#[tokio::test]
async fn default_responses() {
    let server = Arc::new(SocketEndpoint::server(ConcurrencyMode::Single));
    server.set_default_success_response("200");
    server.set_default_error_response("500");
    let routine_side = server.clone();
    let port = server
        .start_listener(0, move || {
            let server = routine_side.clone();
            async move {
                while server.continue_listening() {
                    let Ok(connection) = server.accept_request().await else { break };
                    match server.read_content_from(&connection).await {
                        Ok(Some(request)) if request == "do it" => {
                            let _ = server.send_success_response_to(&connection).await;
                        }
                        Ok(Some(_)) => {
                            let _ = server.send_error_response_to(&connection).await;
                        }
                        _ => {}
                    }
                }
            }
        })
        .await
        .unwrap();

    let client = SocketEndpoint::client("127.0.0.1", port);
    client.write_content("do it").await.unwrap();
    assert_eq!(client.read_content().await.unwrap().as_deref(), Some("200"));

    client.write_content("do what now").await.unwrap();
    assert_eq!(client.read_content().await.unwrap().as_deref(), Some("500"));

    server.stop_listener();
}
