mod common;

use std::net::SocketAddr;
use std::time::Duration;

use axum::http::StatusCode;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use uuid::Uuid;

use common::{app, id_of, unique, TestApp};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn open_socket(addr: SocketAddr, token: &str) -> Socket {
    let mut request = format!("ws://{}/ws", addr)
        .into_client_request()
        .expect("websocket request");
    request
        .headers_mut()
        .insert("cookie", format!("token={}", token).parse().unwrap());

    let (socket, _response) = tokio_tungstenite::connect_async(request)
        .await
        .expect("websocket connect");
    socket
}

async fn go_online(socket: &mut Socket) {
    socket
        .send(Message::Text(r#"{"event":"online"}"#.to_string()))
        .await
        .expect("send online frame");
}

/// Presence changes land asynchronously after a frame or a close.
async fn wait_for_presence(app: &TestApp, user_id: Uuid, online: bool) {
    for _ in 0..100 {
        if app.state.presence.is_online(user_id).await == online {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("user {} never became online={}", user_id, online);
}

async fn next_text_frame(socket: &mut Socket) -> Value {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(2), socket.next())
            .await
            .expect("no frame before timeout")
            .expect("socket closed")
            .expect("frame");
        match frame {
            Message::Text(text) => return serde_json::from_str(&text).expect("json frame"),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("expected text frame, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn socket_without_session_is_refused() {
    let app = app().await;
    let addr = app.serve().await;

    let request = format!("ws://{}/ws", addr).into_client_request().unwrap();
    match tokio_tungstenite::connect_async(request).await {
        Err(tokio_tungstenite::tungstenite::Error::Http(response)) => {
            assert_eq!(response.status().as_u16(), StatusCode::UNAUTHORIZED.as_u16());
        }
        other => panic!("expected an http rejection, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn online_socket_receives_notifications_until_closed() {
    let app = app().await;
    let addr = app.serve().await;
    let chef = app.create_user("Chef").await;
    let fan = app.create_user("Fan").await;
    let recipe = app.create_recipe(&chef, &unique("Gnocchi")).await;

    let mut socket = open_socket(addr, &chef.token).await;
    assert!(!app.state.presence.is_online(chef.id).await);

    go_online(&mut socket).await;
    wait_for_presence(app, chef.id, true).await;

    let liked = app
        .put(&format!("/recipes/{}/like", id_of(&recipe)), Some(&fan.token))
        .await;
    assert_eq!(liked.status, StatusCode::OK);

    let frame = next_text_frame(&mut socket).await;
    assert_eq!(frame["event"], "getNotification");
    assert_eq!(frame["data"]["receiver_id"], chef.id.to_string());
    assert_eq!(frame["data"]["event"], "liked");
    assert_eq!(frame["data"]["sender"]["name"], "Fan");
    assert_eq!(frame["data"]["recipe_slug"], recipe["slug"]);
    assert_eq!(frame["data"]["read"], false);

    socket.close(None).await.expect("close socket");
    wait_for_presence(app, chef.id, false).await;
}

#[tokio::test]
async fn closing_a_replaced_socket_keeps_the_newer_one() {
    let app = app().await;
    let addr = app.serve().await;
    let chef = app.create_user("Chef").await;

    let mut first = open_socket(addr, &chef.token).await;
    go_online(&mut first).await;
    wait_for_presence(app, chef.id, true).await;
    let first_connection = app.state.presence.connection_id(chef.id).await;

    let mut second = open_socket(addr, &chef.token).await;
    go_online(&mut second).await;
    for _ in 0..100 {
        if app.state.presence.connection_id(chef.id).await != first_connection {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let second_connection = app.state.presence.connection_id(chef.id).await;
    assert_ne!(second_connection, first_connection);

    first.close(None).await.expect("close first socket");
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(app.state.presence.connection_id(chef.id).await, second_connection);

    second.close(None).await.expect("close second socket");
    wait_for_presence(app, chef.id, false).await;
}
