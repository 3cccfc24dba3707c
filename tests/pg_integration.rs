mod pg_test_support;

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use mirage::protocol::{ErrorFieldCode, StartupParameters};
use pg_test_support::{SEEDED_USERS, TestClient, TestServer};

const TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::test(flavor = "multi_thread")]
async fn test_select_seeded_rows() {
    let server = TestServer::start().await;
    let mut client = server.connect("postgres").await;

    let result = client.query("SELECT * FROM users").await;
    assert!(result.error.is_none(), "{:?}", result.error);
    assert_eq!(result.tag.as_deref(), Some("SELECT 5"));
    assert_eq!(result.columns, vec!["id", "name"]);
    assert_eq!(result.rows.len(), SEEDED_USERS);
    assert!(result.rows.iter().all(|row| row.len() == 2));

    let alices = client.query("select name from user where name = 'Alice'").await;
    assert_eq!(alices.tag.as_deref(), Some("SELECT 2"));
    assert_eq!(alices.columns, vec!["name"]);

    client.terminate().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_insert_then_select_by_id() {
    let server = TestServer::start().await;
    let mut client = server.connect("postgres").await;

    let inserted = client
        .query("INSERT INTO users (id, name) VALUES ('abc-123', 'Alice')")
        .await;
    assert_eq!(inserted.tag.as_deref(), Some("INSERT 0 1"));
    assert!(inserted.columns.is_empty());

    let found = client.query("SELECT * FROM users WHERE id = 'abc-123'").await;
    assert_eq!(found.tag.as_deref(), Some("SELECT 1"));
    assert_eq!(
        found.rows,
        vec![vec![Some("abc-123".to_string()), Some("Alice".to_string())]]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_update_delete_and_count() {
    let server = TestServer::start().await;
    let mut client = server.connect("postgres").await;

    let updated = client
        .query("UPDATE users SET name = 'Zed' WHERE id = 'u2'")
        .await;
    assert_eq!(updated.tag.as_deref(), Some("UPDATE 1"));

    let deleted = client.query("DELETE FROM users WHERE id = 'u3'").await;
    assert_eq!(deleted.tag.as_deref(), Some("DELETE 1"));

    let count = client.query("SELECT count(*) FROM users").await;
    assert_eq!(count.columns, vec!["count"]);
    assert_eq!(count.rows, vec![vec![Some("4".to_string())]]);

    let zed = client.query("SELECT name FROM users WHERE id = 'u2'").await;
    assert_eq!(zed.rows, vec![vec![Some("Zed".to_string())]]);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_query_error_keeps_connection_usable() {
    let server = TestServer::start().await;
    let mut client = server.connect("postgres").await;

    let failed = client.query("SELECT * FROM missing").await;
    assert_eq!(failed.sql_state(), Some("42601"));
    assert!(failed.tag.is_none());

    let ok = client.query("SELECT 1").await;
    assert!(ok.error.is_none());
    assert_eq!(ok.tag.as_deref(), Some("SELECT 1"));
    assert_eq!(ok.rows, vec![vec![Some("1".to_string())]]);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_empty_query_and_session_commands() {
    let server = TestServer::start().await;
    let mut client = server.connect("postgres").await;

    let empty = client.query(" ; ").await;
    assert!(empty.empty);
    assert!(empty.tag.is_none());

    let begin = client.query("BEGIN").await;
    assert_eq!(begin.tag.as_deref(), Some("BEGIN"));

    let set = client.query("SET client_encoding = 'UTF8'").await;
    assert_eq!(set.tag.as_deref(), Some("SET"));

    let user = client.query("SELECT current_user").await;
    assert_eq!(user.rows, vec![vec![Some("postgres".to_string())]]);

    let database = client.query("select current_database()").await;
    assert_eq!(database.rows, vec![vec![Some("postgres".to_string())]]);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_md5_authentication() {
    let server = TestServer::start_with_password("app", "secret", "accounts").await;

    let mut client = TestClient::connect(
        server.addr,
        StartupParameters::new("app", Some("accounts")),
        Some("secret"),
    )
    .await
    .unwrap();
    let user = client.query("SELECT current_user").await;
    assert_eq!(user.rows, vec![vec![Some("app".to_string())]]);

    let rejected = TestClient::connect(
        server.addr,
        StartupParameters::new("app", Some("accounts")),
        Some("wrong"),
    )
    .await
    .err()
    .expect("wrong password should be rejected");
    assert_eq!(rejected.error_field(ErrorFieldCode::SqlState), Some("28P01"));

    let unknown = TestClient::connect(
        server.addr,
        StartupParameters::new("mallory", Some("accounts")),
        Some("secret"),
    )
    .await
    .err()
    .expect("unknown user should be rejected");
    assert_eq!(unknown.error_field(ErrorFieldCode::SqlState), Some("28P01"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_wrong_database_is_rejected() {
    let server = TestServer::start_with_password("app", "secret", "accounts").await;

    let rejected = TestClient::connect(
        server.addr,
        StartupParameters::new("app", Some("payroll")),
        Some("secret"),
    )
    .await
    .err()
    .expect("wrong database should be rejected");
    assert_eq!(rejected.error_field(ErrorFieldCode::Severity), Some("FATAL"));
    assert_eq!(rejected.error_field(ErrorFieldCode::SqlState), Some("3D000"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_concurrent_inserts_are_all_stored() {
    const CLIENTS: usize = 4;
    const INSERTS: usize = 25;

    let server = TestServer::start().await;
    let addr = server.addr;

    let tasks: Vec<_> = (0..CLIENTS)
        .map(|c| {
            tokio::spawn(async move {
                let mut client =
                    TestClient::connect(addr, StartupParameters::new("postgres", None), None)
                        .await
                        .unwrap();
                for i in 0..INSERTS {
                    let sql = format!(
                        "INSERT INTO users (id, name) VALUES ('c{c}-{i}', 'client {c}')"
                    );
                    let result = client.query(&sql).await;
                    assert_eq!(result.tag.as_deref(), Some("INSERT 0 1"), "{sql}");
                }
                client.terminate().await;
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    let expected = SEEDED_USERS + CLIENTS * INSERTS;
    assert_eq!(server.store.len("user").unwrap(), expected);
    assert_eq!(server.store.list("user").unwrap().len(), expected);

    let mut client = server.connect("postgres").await;
    let result = client.query("SELECT * FROM users").await;
    assert_eq!(result.tag, Some(format!("SELECT {expected}")));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_shutdown_closes_idle_connections() {
    let mut server = TestServer::start().await;
    let mut first = server.connect("postgres").await;
    let mut second = server.connect("postgres").await;
    assert_ne!(first.process_id, second.process_id);

    server.shutdown(TIMEOUT).await;

    first.expect_closed(TIMEOUT).await;
    second.expect_closed(TIMEOUT).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_shutdown_drops_unfinished_handshakes() {
    let mut server = TestServer::start_with_password("app", "secret", "accounts").await;

    // connected, never sends a startup packet
    let mut silent = server.connect_raw().await;

    // StartupMessage for app/accounts, then never answers the MD5 challenge
    let mut challenged = server.connect_raw().await;
    let body = b"user\0app\0database\0accounts\0\0";
    challenged.write_i32(8 + body.len() as i32).await.unwrap();
    challenged.write_i32(3 << 16).await.unwrap();
    challenged.write_all(body).await.unwrap();
    challenged.flush().await.unwrap();

    assert_eq!(challenged.read_u8().await.unwrap(), b'R');
    let len = challenged.read_i32().await.unwrap();
    let mut auth = vec![0u8; (len - 4) as usize];
    challenged.read_exact(&mut auth).await.unwrap();
    assert_eq!(&auth[..4], [0, 0, 0, 5], "expected AuthenticationMD5Password");

    server.shutdown(TIMEOUT).await;

    for stream in [&mut silent, &mut challenged] {
        let mut buf = [0u8; 1];
        let res = tokio::time::timeout(TIMEOUT, stream.read(&mut buf)).await;
        assert!(
            matches!(res, Ok(Ok(0)) | Ok(Err(_))),
            "connection should be closed: {res:?}"
        );
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_ssl_request_declined_then_plaintext_startup() {
    let server = TestServer::start().await;
    let mut stream = server.connect_raw().await;

    // SSLRequest: length(8) + code(80877103)
    stream.write_i32(8).await.unwrap();
    stream.write_i32(80877103).await.unwrap();
    stream.flush().await.unwrap();
    assert_eq!(stream.read_u8().await.unwrap(), b'N');

    // StartupMessage: length(23) + version(3.0) + user(postgres) + \0\0
    stream.write_i32(23).await.unwrap();
    stream.write_i32(3 << 16).await.unwrap();
    stream.write_all(b"user\0postgres\0\0").await.unwrap();
    stream.flush().await.unwrap();

    let mut tags = Vec::new();
    loop {
        let tag = stream.read_u8().await.unwrap();
        let len = stream.read_i32().await.unwrap();
        let mut body = vec![0u8; (len - 4) as usize];
        stream.read_exact(&mut body).await.unwrap();

        if tag == b'R' {
            assert_eq!(body, [0, 0, 0, 0], "trust mode should send AuthenticationOk");
        }
        tags.push(tag);
        if tag == b'Z' {
            assert_eq!(body, [b'I']);
            break;
        }
    }

    assert_eq!(tags.first(), Some(&b'R'));
    assert!(tags.contains(&b'S'));
    assert!(tags.contains(&b'K'));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_cancel_request_closes_connection() {
    let server = TestServer::start().await;
    let client = server.connect("postgres").await;

    let mut stream = server.connect_raw().await;
    // CancelRequest: length(16) + code(80877102) + pid + secret
    stream.write_i32(16).await.unwrap();
    stream.write_i32(80877102).await.unwrap();
    stream.write_i32(client.process_id).await.unwrap();
    stream.write_i32(0).await.unwrap();
    stream.flush().await.unwrap();

    let mut buf = [0u8; 1];
    let res = tokio::time::timeout(TIMEOUT, stream.read(&mut buf)).await;
    match res {
        Ok(Ok(0)) => {}
        Ok(Ok(_)) => panic!("cancel request should get no reply"),
        Ok(Err(_)) => {}
        Err(_) => panic!("timed out waiting for the cancel connection to close"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_garbage_message_type_is_fatal() {
    let server = TestServer::start().await;
    let mut stream = server.connect_raw().await;

    stream.write_i32(23).await.unwrap();
    stream.write_i32(3 << 16).await.unwrap();
    stream.write_all(b"user\0postgres\0\0").await.unwrap();
    loop {
        let tag = stream.read_u8().await.unwrap();
        let len = stream.read_i32().await.unwrap();
        let mut body = vec![0u8; (len - 4) as usize];
        stream.read_exact(&mut body).await.unwrap();
        if tag == b'Z' {
            break;
        }
    }

    stream.write_u8(b'?').await.unwrap();
    stream.write_i32(4).await.unwrap();
    stream.flush().await.unwrap();

    assert_eq!(stream.read_u8().await.unwrap(), b'E');
    let len = stream.read_i32().await.unwrap();
    let mut body = vec![0u8; (len - 4) as usize];
    stream.read_exact(&mut body).await.unwrap();
    let text = String::from_utf8_lossy(&body);
    assert!(text.contains("FATAL"), "{text}");
    assert!(text.contains("08P01"), "{text}");

    let mut rest = Vec::new();
    let closed = tokio::time::timeout(TIMEOUT, stream.read_to_end(&mut rest)).await;
    assert!(closed.is_ok(), "server should close after a protocol violation");
}
