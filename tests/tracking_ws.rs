//! End-to-end tracking over a real WebSocket

use std::time::Duration;

use delivery_oms::{
    transport::{create_router, ApiState},
    AppConfig, DeliveryAddress, OrderItem, OrderRequest, PaymentMethod,
};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::{net::TcpStream, time::timeout};
use tokio_tungstenite::{
    connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream,
};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WAIT: Duration = Duration::from_secs(5);

async fn spawn_server() -> (String, ApiState) {
    let mut config = AppConfig::default();
    config.tracking.idle_timeout_ms = 200;

    let state = ApiState::new(config).unwrap();
    let _forwarder = state.hub.spawn_status_forwarder();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = create_router(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr.to_string(), state)
}

fn order_request() -> OrderRequest {
    OrderRequest {
        items: vec![OrderItem {
            menu_item_id: "suya".to_string(),
            name: "Beef Suya".to_string(),
            quantity: 1,
            unit_price: 2500,
            note: None,
        }],
        delivery_address: DeliveryAddress {
            full_name: "Ada Obi".to_string(),
            phone: "+2348000000000".to_string(),
            email: "ada@example.com".to_string(),
            address: "12 Admiralty Way".to_string(),
            city: "Lagos".to_string(),
            landmark: None,
            latitude: Some(6.43),
            longitude: Some(3.42),
        },
        scheduled_time: None,
        payment_method: PaymentMethod::Card,
        discount_code: None,
        special_instructions: None,
    }
}

async fn next_json(client: &mut Client) -> Value {
    loop {
        let message = timeout(WAIT, client.next())
            .await
            .expect("timed out waiting for message")
            .expect("stream closed")
            .expect("websocket error");
        if let Message::Text(text) = message {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

async fn next_of_type(client: &mut Client, kind: &str) -> Value {
    loop {
        let message = next_json(client).await;
        if message["type"] == kind {
            return message;
        }
    }
}

#[tokio::test]
async fn test_tracking_session_end_to_end() {
    let (addr, state) = spawn_server().await;
    let order = state.lifecycle.create_order(order_request()).await.unwrap();
    let code = order.order_code.as_str().to_string();

    let (mut client, _) = connect_async(format!("ws://{addr}/api/tracking/ws/{code}"))
        .await
        .unwrap();

    let initial = next_json(&mut client).await;
    assert_eq!(initial["type"], "initial");
    assert_eq!(initial["order_code"], code.as_str());
    assert_eq!(initial["status"], "pending");
    assert!(initial["rider"].is_null());

    client
        .send(Message::Text(json!({ "type": "ping" }).to_string()))
        .await
        .unwrap();
    let pong = next_of_type(&mut client, "pong").await;
    assert_eq!(pong, json!({ "type": "pong" }));

    // Idle sessions still see the rider move
    let synthetic = next_of_type(&mut client, "location_update").await;
    assert_eq!(synthetic["order_id"], order.id.to_string());
    assert!(synthetic["rider_location"]["latitude"].is_number());
    assert!(synthetic["estimated_arrival"].is_string());

    let http = reqwest::Client::new();
    let response = http
        .post(format!("http://{addr}/api/tracking/rider/location"))
        .json(&json!({ "order_id": code, "latitude": 6.5, "longitude": 3.35, "heading": 90.0 }))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());

    let live = loop {
        let update = next_of_type(&mut client, "location_update").await;
        if update["rider_location"]["latitude"] == 6.5 {
            break update;
        }
    };
    assert_eq!(live["rider_location"]["longitude"], 3.35);
    assert_eq!(live["rider_location"]["heading"], 90.0);

    let response = http
        .patch(format!("http://{addr}/api/orders/{code}"))
        .json(&json!({ "status": "confirmed", "rider_id": "rider-1" }))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());

    let status = next_of_type(&mut client, "status_update").await;
    assert_eq!(status["status"], "confirmed");
    assert!(status["timestamp"].is_string());

    client.close(None).await.unwrap();
    timeout(WAIT, async {
        while state.hub.session_count() > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("session was not released");
}

#[tokio::test]
async fn test_unknown_order_rejected_before_upgrade() {
    let (addr, _state) = spawn_server().await;

    let result = connect_async(format!("ws://{addr}/api/tracking/ws/CC-20240101-NOPE00")).await;

    match result {
        Err(tokio_tungstenite::tungstenite::Error::Http(response)) => {
            assert_eq!(response.status(), 404);
        }
        Err(other) => panic!("expected HTTP rejection, got {other:?}"),
        Ok(_) => panic!("upgrade should have been refused"),
    }
}

#[tokio::test]
async fn test_plain_http_request_requires_upgrade() {
    let (addr, state) = spawn_server().await;
    let order = state.lifecycle.create_order(order_request()).await.unwrap();

    let response = reqwest::get(format!("http://{addr}/api/tracking/ws/{}", order.id))
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::UPGRADE_REQUIRED);
}
